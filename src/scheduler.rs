//! Ingestion and generation triggers driving matches from provider to article.
use anyhow::Context;
use chrono::{DateTime, Duration as ChronoDuration, NaiveTime, TimeZone, Utc};
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, info_span, instrument, warn, Instrument};
use uuid::Uuid;

use crate::config::{self, Config, FileOptions, ImageOptions, OptionsStore, Settings};
use crate::db::{self, IngestSummary, Pool};
use crate::error::PipelineError;
use crate::model::{GeneratedArticle, ImageContext, Match};
use crate::openai::{OpenAiClient, TextGenerator};
use crate::prompt;
use crate::publish::{PublishSink, SqlitePublishSink};
use crate::sport_api::{SportApiClient, SportsData};

/// Everything the engine needs, built once at startup.
#[derive(Clone)]
pub struct AppContext {
    pub pool: Pool,
    pub sports: Arc<dyn SportsData>,
    pub writer: Arc<dyn TextGenerator>,
    pub sink: Arc<dyn PublishSink>,
    pub options: Arc<dyn OptionsStore>,
}

impl AppContext {
    /// Load the config file, open the database and construct the real clients.
    /// The returned config is the startup snapshot; cycles re-read the file.
    pub async fn bootstrap(config_path: &Path) -> anyhow::Result<(Self, Config)> {
        let cfg = config::load(Some(config_path))
            .with_context(|| format!("failed to load {}", config_path.display()))?;
        cfg.ensure_dirs().context("failed to create data dir")?;

        let pool = db::init_pool(&cfg.database_url())
            .await
            .context("failed to open database")?;
        db::run_migrations(&pool)
            .await
            .context("failed to run migrations")?;

        let timeout = Duration::from_secs(cfg.app.request_timeout_secs);
        let sports = SportApiClient::with_base_url(&cfg.api.sport_api_base_url, timeout)?;
        let writer = OpenAiClient::with_base_url(&cfg.api.openai_api_base_url, timeout)?;

        let ctx = Self {
            pool: pool.clone(),
            sports: Arc::new(sports),
            writer: Arc::new(writer),
            sink: Arc::new(SqlitePublishSink::new(pool)),
            options: Arc::new(FileOptions::new(config_path)),
        };
        Ok((ctx, cfg))
    }
}

/// Why a generation cycle ended before processing anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleStop {
    ConfigUnavailable,
    MissingCredentials,
    DailyCapReached,
    NothingToClaim,
    StoreUnavailable,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub claimed: usize,
    pub completed: usize,
    pub failed: usize,
    pub stopped: Option<CycleStop>,
}

impl CycleReport {
    fn stopped(reason: CycleStop) -> Self {
        Self {
            stopped: Some(reason),
            ..Default::default()
        }
    }
}

enum MatchOutcome {
    Completed,
    Failed,
}

pub struct SchedulingEngine {
    ctx: AppContext,
}

impl SchedulingEngine {
    pub fn new(ctx: AppContext) -> Self {
        Self { ctx }
    }

    pub async fn ingest(&self) -> Option<IngestSummary> {
        self.ingest_at(Utc::now()).await
    }

    /// Pull upcoming fixtures into the store. Every failure is logged and
    /// yields `None`.
    #[instrument(skip_all)]
    pub async fn ingest_at(&self, now: DateTime<Utc>) -> Option<IngestSummary> {
        let settings = match self.ctx.options.resolve() {
            Ok(cfg) => cfg.settings(),
            Err(e) => {
                error!(error = %e, "failed to resolve configuration");
                return None;
            }
        };
        if settings.sport_api_key.is_empty() {
            warn!("sport API key not configured; skipping ingestion");
            return None;
        }

        let mut records = match self.ctx.sports.fetch_upcoming(&settings.sport_api_key).await {
            Ok(records) => records,
            Err(e) => {
                error!(error = %e, "failed to fetch upcoming matches");
                return None;
            }
        };

        let regions = match db::selected_region_names(&self.ctx.pool).await {
            Ok(names) => names,
            Err(e) => {
                error!(error = %e, "failed to read region selection");
                return None;
            }
        };
        if !regions.is_empty() {
            let before = records.len();
            records.retain(|r| regions.iter().any(|name| name == &r.region));
            info!(kept = records.len(), dropped = before - records.len(), "applied region selection");
        }

        match db::upsert_ingested(&self.ctx.pool, &records, now).await {
            Ok(summary) => Some(summary),
            Err(e) => {
                error!(error = %e, "failed to store upcoming matches");
                None
            }
        }
    }

    pub async fn process(&self) -> CycleReport {
        self.process_at(Utc::now()).await
    }

    /// Run one generation cycle as of `now`.
    pub async fn process_at(&self, now: DateTime<Utc>) -> CycleReport {
        let cycle_id = Uuid::new_v4();
        let report = self
            .generation_cycle(now)
            .instrument(info_span!("generation_cycle", %cycle_id))
            .await;
        info!(
            %cycle_id,
            claimed = report.claimed,
            completed = report.completed,
            failed = report.failed,
            stopped = ?report.stopped,
            "generation cycle finished"
        );
        report
    }

    async fn generation_cycle(&self, now: DateTime<Utc>) -> CycleReport {
        let cfg = match self.ctx.options.resolve() {
            Ok(cfg) => cfg,
            Err(e) => {
                error!(error = %e, "failed to resolve configuration");
                return CycleReport::stopped(CycleStop::ConfigUnavailable);
            }
        };
        let settings = cfg.settings();
        if settings.sport_api_key.is_empty() || settings.openai_api_key.is_empty() {
            warn!("API keys not configured; skipping generation");
            return CycleReport::stopped(CycleStop::MissingCredentials);
        }

        let midnight = Utc.from_utc_datetime(&now.date_naive().and_time(NaiveTime::MIN));
        let done_today = match db::count_completed_since(&self.ctx.pool, midnight).await {
            Ok(n) => n,
            Err(e) => {
                error!(error = %e, "failed to count completed matches");
                return CycleReport::stopped(CycleStop::StoreUnavailable);
            }
        };
        if done_today >= i64::from(settings.max_games_per_day) {
            warn!(done_today, cap = settings.max_games_per_day, "daily cap reached");
            return CycleReport::stopped(CycleStop::DailyCapReached);
        }

        let batch = match db::claim_batch(&self.ctx.pool, settings.max_games_per_hour, now, now).await {
            Ok(batch) => batch,
            Err(e) => {
                error!(error = %e, "failed to claim matches");
                return CycleReport::stopped(CycleStop::StoreUnavailable);
            }
        };
        if batch.is_empty() {
            info!("no unprocessed matches");
            return CycleReport::stopped(CycleStop::NothingToClaim);
        }

        let mut report = CycleReport {
            claimed: batch.len(),
            ..Default::default()
        };
        for (index, m) in batch.iter().enumerate() {
            let publish_at = publish_time(now, index, settings.post_intervals);
            let run = self.process_match(&settings, &cfg.image, m, publish_at, now);
            let outcome = match AssertUnwindSafe(run).catch_unwind().await {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(e)) => {
                    error!(match_code = %m.match_code, error = %e, "match processing failed");
                    self.fail_best_effort(&m.match_code, now).await;
                    MatchOutcome::Failed
                }
                Err(panic) => {
                    error!(
                        match_code = %m.match_code,
                        panic = panic_message(panic.as_ref()),
                        "match processing panicked"
                    );
                    self.fail_best_effort(&m.match_code, now).await;
                    MatchOutcome::Failed
                }
            };
            match outcome {
                MatchOutcome::Completed => report.completed += 1,
                MatchOutcome::Failed => report.failed += 1,
            }
        }
        report
    }

    #[instrument(skip_all, fields(match_code = %m.match_code))]
    async fn process_match(
        &self,
        settings: &Settings,
        image: &ImageOptions,
        m: &Match,
        publish_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<MatchOutcome, PipelineError> {
        let Some(stats) = self
            .ctx
            .sports
            .fetch_statistics(&settings.sport_api_key, &m.match_code)
            .await
        else {
            warn!("statistics unavailable; marking failed");
            db::mark_failed(&self.ctx.pool, &m.match_code, now).await?;
            return Ok(MatchOutcome::Failed);
        };

        let prompt = prompt::build(m, &stats, &settings.ai_content_prompt);
        let Some(body) = self
            .ctx
            .writer
            .generate_article(&settings.openai_api_key, &settings.openai_model, &prompt)
            .await
        else {
            warn!("article generation returned nothing; marking failed");
            db::mark_failed(&self.ctx.pool, &m.match_code, now).await?;
            return Ok(MatchOutcome::Failed);
        };

        let mut title = self
            .ctx
            .writer
            .generate_title(&body, &settings.openai_api_key)
            .await;
        if title.trim().is_empty() {
            title = prompt::fallback_title(&body);
        }

        let mut image_url = settings.featured_image_url.clone();
        if settings.dalle_image_generation {
            let context = ImageContext::from(m);
            if let Some(url) = self
                .ctx
                .writer
                .generate_image(&settings.openai_api_key, image, Some(&context))
                .await
            {
                image_url = Some(url);
            }
        }

        let article_id = self
            .ctx
            .sink
            .schedule(GeneratedArticle {
                title,
                body,
                publish_at,
                author_id: settings.post_author,
                category_id: settings.post_category,
                image_url,
            })
            .await?;

        // The article is already with the sink. Marking the row FAILED now would
        // contradict it, so a store error here leaves the row IN_PROGRESS.
        if let Err(e) = db::mark_completed(&self.ctx.pool, &m.match_code, now).await {
            error!(
                article_id = article_id.0,
                error = %e,
                "article scheduled but completion not recorded; leaving match in progress"
            );
            return Ok(MatchOutcome::Completed);
        }
        info!(article_id = article_id.0, %publish_at, "match completed");
        Ok(MatchOutcome::Completed)
    }

    async fn fail_best_effort(&self, match_code: &str, now: DateTime<Utc>) {
        if let Err(e) = db::mark_failed(&self.ctx.pool, match_code, now).await {
            error!(match_code, error = %e, "failed to mark match failed");
        }
    }

    /// Run both triggers until `shutdown` resolves. Ingestion fires at startup.
    /// A cycle in progress finishes before shutdown is observed.
    pub async fn run(
        &self,
        ingest_every: Duration,
        generate_every: Duration,
        shutdown: impl Future<Output = ()>,
    ) {
        let mut ingest_tick = tokio::time::interval(ingest_every);
        ingest_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut generate_tick = tokio::time::interval(generate_every);
        generate_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        info!(
            ingest_every_secs = ingest_every.as_secs(),
            generate_every_secs = generate_every.as_secs(),
            "scheduler started"
        );
        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("shutdown requested");
                    break;
                }
                _ = ingest_tick.tick() => {
                    self.ingest().await;
                }
                _ = generate_tick.tick() => {
                    self.process().await;
                }
            }
        }
    }
}

/// `now + 1h + index * interval_minutes`.
pub fn publish_time(now: DateTime<Utc>, index: usize, interval_minutes: u32) -> DateTime<Utc> {
    let offset = i64::try_from(index)
        .unwrap_or(i64::MAX / 60)
        .saturating_mul(i64::from(interval_minutes));
    now + ChronoDuration::hours(1) + ChronoDuration::minutes(offset)
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_times_are_staggered() {
        let now = Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).unwrap();
        assert_eq!(publish_time(now, 0, 10), now + ChronoDuration::minutes(60));
        assert_eq!(publish_time(now, 2, 10), now + ChronoDuration::minutes(80));
        assert_eq!(publish_time(now, 3, 5), now + ChronoDuration::minutes(75));
    }

    #[test]
    fn panic_payloads_render() {
        let boxed: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(boxed.as_ref()), "boom");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(boxed.as_ref()), "bang");
        let boxed: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(boxed.as_ref()), "unknown panic");
    }
}
