use super::model::{IngestSummary, RegionRow};
use crate::error::{PersistenceError, TransitionError};
use crate::model::{Match, MatchRecord, Odds, ProcessingState, Region};
use chrono::{DateTime, Duration, SubsecRound, Utc};
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::{debug, info, instrument, warn};

pub type Pool = SqlitePool;
type Result<T, E = PersistenceError> = std::result::Result<T, E>;

/// Matches are kept this many days past kickoff.
pub const RETENTION_DAYS: i64 = 2;

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let pool = SqlitePool::connect(&normalized).await?;
    // Enable WAL and stricter durability.
    sqlx::query("PRAGMA journal_mode=WAL;")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous=FULL;")
        .execute(&pool)
        .await?;
    Ok(pool)
}

/// If using a file-backed SQLite URL, expand a leading `~/`, ensure the parent
/// directory exists and ask SQLite to create the file. In-memory URLs pass through.
fn prepare_sqlite_url(url: &str) -> String {
    if !url.starts_with("sqlite:") || url.starts_with("sqlite::memory") {
        return url.to_string();
    }

    let rest = &url["sqlite:".len()..];
    let path_with_query = rest.strip_prefix("//").unwrap_or(rest);
    let (path_part, query_part) = match path_with_query.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path_with_query, None),
    };
    if path_part.is_empty() {
        return url.to_string();
    }

    let expanded_path = match (path_part.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(rest), Ok(home)) => format!("{}/{}", home.trim_end_matches('/'), rest),
        _ => path_part.to_string(),
    };

    if let Some(parent) = std::path::Path::new(&expanded_path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    let query = match query_part {
        Some(q) if q.contains("mode=") => q.to_string(),
        Some(q) => format!("{}&mode=rwc", q),
        None => "mode=rwc".to_string(),
    };
    format!("sqlite://{}?{}", expanded_path, query)
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Stored timestamps are whole-second UTC so their text form sorts chronologically.
pub fn db_time(dt: DateTime<Utc>) -> DateTime<Utc> {
    dt.trunc_subsecs(0)
}

/// Evict matches older than the retention window, then insert every record whose
/// `match_code` is not stored yet.
#[instrument(skip_all, fields(incoming = records.len()))]
pub async fn upsert_ingested(
    pool: &Pool,
    records: &[MatchRecord],
    now: DateTime<Utc>,
) -> Result<IngestSummary> {
    let now = db_time(now);
    let cutoff = now - Duration::days(RETENTION_DAYS);
    let mut tx = pool.begin().await?;

    let evicted = sqlx::query("DELETE FROM matches WHERE kickoff_datetime < ?")
        .bind(cutoff)
        .execute(&mut *tx)
        .await?
        .rows_affected();
    let mut summary = IngestSummary {
        evicted,
        ..Default::default()
    };

    for record in records {
        let kickoff = match record.kickoff() {
            Some(k) if !record.match_code.trim().is_empty() => k,
            _ => {
                warn!(
                    match_code = %record.match_code,
                    match_datetime = %record.match_datetime,
                    "skipping malformed match record"
                );
                summary.skipped_invalid += 1;
                continue;
            }
        };
        let odds = Odds::from_value(record.odds.clone());
        let res = sqlx::query(
            "INSERT INTO matches (match_code, region, team, home, away, kickoff_datetime, time_zone, provider, odds, state, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) ON CONFLICT(match_code) DO NOTHING",
        )
        .bind(record.match_code.trim())
        .bind(&record.region)
        .bind(&record.team)
        .bind(&record.home)
        .bind(&record.away)
        .bind(db_time(kickoff))
        .bind(&record.time_zone)
        .bind(&record.provider)
        .bind(odds.to_json_string())
        .bind(ProcessingState::Unprocessed.as_str())
        .bind(now)
        .execute(&mut *tx)
        .await?;
        if res.rows_affected() == 1 {
            summary.inserted += 1;
        } else {
            summary.skipped_duplicates += 1;
        }
    }

    tx.commit().await?;
    info!(
        inserted = summary.inserted,
        skipped_duplicates = summary.skipped_duplicates,
        skipped_invalid = summary.skipped_invalid,
        evicted = summary.evicted,
        "ingested matches"
    );
    Ok(summary)
}

/// Atomically move up to `max_count` UNPROCESSED matches kicking off after
/// `not_before` to IN_PROGRESS, earliest kickoff first (ties by match code).
/// A row can only be returned by one claim.
#[instrument(skip_all, fields(max_count = max_count))]
pub async fn claim_batch(
    pool: &Pool,
    max_count: u32,
    not_before: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<Vec<Match>> {
    if max_count == 0 {
        return Ok(Vec::new());
    }
    let from = ProcessingState::Unprocessed;
    let to = from.transition(ProcessingState::InProgress)?;

    let rows = sqlx::query(
        "UPDATE matches SET state = ?, processed_started_at = ? \
         WHERE state = ? AND id IN ( \
             SELECT id FROM matches WHERE state = ? AND kickoff_datetime > ? \
             ORDER BY kickoff_datetime ASC, match_code ASC LIMIT ?) \
         RETURNING *",
    )
    .bind(to.as_str())
    .bind(db_time(now))
    .bind(from.as_str())
    .bind(from.as_str())
    .bind(db_time(not_before))
    .bind(i64::from(max_count))
    .fetch_all(pool)
    .await?;

    let mut batch = rows
        .iter()
        .map(match_from_row)
        .collect::<Result<Vec<_>>>()?;
    batch.sort_by(|a, b| {
        a.kickoff_datetime
            .cmp(&b.kickoff_datetime)
            .then_with(|| a.match_code.cmp(&b.match_code))
    });
    Ok(batch)
}

/// Number of matches completed on or after `since`.
#[instrument(skip_all)]
pub async fn count_completed_since(pool: &Pool, since: DateTime<Utc>) -> Result<i64> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM matches WHERE state = ? AND process_completed_at >= ?",
    )
    .bind(ProcessingState::Completed.as_str())
    .bind(db_time(since))
    .fetch_one(pool)
    .await?;
    Ok(count)
}

/// IN_PROGRESS → COMPLETED. Returns false if the match was already terminal.
pub async fn mark_completed(pool: &Pool, match_code: &str, now: DateTime<Utc>) -> Result<bool> {
    mark_terminal(pool, match_code, ProcessingState::Completed, now).await
}

/// IN_PROGRESS → FAILED. Returns false if the match was already terminal.
pub async fn mark_failed(pool: &Pool, match_code: &str, now: DateTime<Utc>) -> Result<bool> {
    mark_terminal(pool, match_code, ProcessingState::Failed, now).await
}

#[instrument(skip_all, fields(match_code = match_code, target = target.as_str()))]
async fn mark_terminal(
    pool: &Pool,
    match_code: &str,
    target: ProcessingState,
    now: DateTime<Utc>,
) -> Result<bool> {
    let column = match target {
        ProcessingState::Completed => "process_completed_at",
        ProcessingState::Failed => "processed_failed_at",
        other => {
            return Err(TransitionError {
                from: ProcessingState::InProgress,
                to: other,
            }
            .into())
        }
    };

    let mut tx = pool.begin().await?;
    let state: Option<String> = sqlx::query_scalar("SELECT state FROM matches WHERE match_code = ?")
        .bind(match_code)
        .fetch_optional(&mut *tx)
        .await?;
    let Some(state) = state else {
        return Err(PersistenceError::MatchNotFound(match_code.to_string()));
    };
    let current = ProcessingState::parse_state(&state)
        .ok_or_else(|| PersistenceError::Corrupt(format!("match {} has state {}", match_code, state)))?;
    if current.is_terminal() {
        debug!(state = current.as_str(), "match already terminal");
        return Ok(false);
    }
    current.transition(target)?;

    let sql = format!(
        "UPDATE matches SET state = ?, {} = ? WHERE match_code = ? AND state = ?",
        column
    );
    let res = sqlx::query(&sql)
        .bind(target.as_str())
        .bind(db_time(now))
        .bind(match_code)
        .bind(current.as_str())
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(res.rows_affected() == 1)
}

pub async fn get_match(pool: &Pool, match_code: &str) -> Result<Option<Match>> {
    let row = sqlx::query("SELECT * FROM matches WHERE match_code = ?")
        .bind(match_code)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(match_from_row).transpose()
}

/// Row counts per processing state, for status reporting.
pub async fn count_by_state(pool: &Pool) -> Result<Vec<(ProcessingState, i64)>> {
    let rows = sqlx::query("SELECT state, COUNT(*) AS n FROM matches GROUP BY state ORDER BY state")
        .fetch_all(pool)
        .await?;
    rows.iter()
        .map(|row| -> Result<(ProcessingState, i64)> {
            let state: String = row.try_get("state")?;
            let state = ProcessingState::parse_state(&state)
                .ok_or_else(|| PersistenceError::Corrupt(format!("unknown state {}", state)))?;
            Ok((state, row.try_get::<i64, _>("n")?))
        })
        .collect()
}

fn match_from_row(row: &SqliteRow) -> Result<Match> {
    let state: String = row.try_get("state")?;
    let state = ProcessingState::parse_state(&state)
        .ok_or_else(|| PersistenceError::Corrupt(format!("unknown state {}", state)))?;
    let odds: String = row.try_get("odds")?;
    Ok(Match {
        id: row.try_get("id")?,
        match_code: row.try_get("match_code")?,
        region: row.try_get("region")?,
        team: row.try_get("team")?,
        home_team: row.try_get("home")?,
        away_team: row.try_get("away")?,
        kickoff_datetime: row.try_get("kickoff_datetime")?,
        time_zone: row.try_get("time_zone")?,
        provider: row.try_get("provider")?,
        odds: Odds::from_json_str(&odds),
        state,
        processed_started_at: row.try_get("processed_started_at")?,
        process_completed_at: row.try_get("process_completed_at")?,
        processed_failed_at: row.try_get("processed_failed_at")?,
        created_at: row.try_get("created_at")?,
    })
}

/// Insert regions not stored yet (matched by name). Returns how many were new.
#[instrument(skip_all, fields(incoming = regions.len()))]
pub async fn upsert_regions(pool: &Pool, regions: &[Region]) -> Result<usize> {
    let mut tx = pool.begin().await?;
    let mut inserted = 0;
    for region in regions {
        let name = region.name.trim();
        if name.is_empty() {
            continue;
        }
        let res = sqlx::query(
            "INSERT INTO regions (name, leagues) VALUES (?, ?) ON CONFLICT(name) DO NOTHING",
        )
        .bind(name)
        .bind(region.leagues.to_string())
        .execute(&mut *tx)
        .await?;
        inserted += res.rows_affected() as usize;
    }
    tx.commit().await?;
    Ok(inserted)
}

pub async fn list_regions(pool: &Pool) -> Result<Vec<RegionRow>> {
    let rows = sqlx::query(
        "SELECT r.id, r.name, r.leagues, \
                EXISTS(SELECT 1 FROM selected_regions s WHERE s.region_id = r.id) AS selected \
         FROM regions r ORDER BY r.name",
    )
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| -> Result<RegionRow> {
            let leagues: String = row.try_get("leagues")?;
            Ok(RegionRow {
                id: row.try_get("id")?,
                name: row.try_get("name")?,
                leagues: serde_json::from_str(&leagues).unwrap_or(Value::Null),
                selected: row.try_get::<i64, _>("selected")? != 0,
            })
        })
        .collect()
}

/// Replace the selection with `region_ids`. An empty or unknown selection is rejected.
#[instrument(skip_all, fields(count = region_ids.len()))]
pub async fn save_selected_regions(pool: &Pool, region_ids: &[i64]) -> Result<()> {
    if region_ids.is_empty() {
        return Err(PersistenceError::Rejected("no regions selected".into()));
    }
    let mut tx = pool.begin().await?;
    for id in region_ids {
        let known: Option<i64> = sqlx::query_scalar("SELECT id FROM regions WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        if known.is_none() {
            return Err(PersistenceError::Rejected(format!("unknown region id {}", id)));
        }
    }
    sqlx::query("DELETE FROM selected_regions")
        .execute(&mut *tx)
        .await?;
    for id in region_ids {
        sqlx::query("INSERT INTO selected_regions (region_id) VALUES (?) ON CONFLICT(region_id) DO NOTHING")
            .bind(id)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;
    Ok(())
}

pub async fn selected_region_names(pool: &Pool) -> Result<Vec<String>> {
    let names: Vec<String> = sqlx::query_scalar(
        "SELECT r.name FROM regions r JOIN selected_regions s ON s.region_id = r.id ORDER BY r.name",
    )
    .fetch_all(pool)
    .await?;
    Ok(names)
}
