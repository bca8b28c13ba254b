use chrono::{DateTime, FixedOffset, NaiveDateTime, Offset, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::TransitionError;

/// Lifecycle of a stored match. Persisted as its `as_str` form.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ProcessingState {
    Unprocessed,
    InProgress,
    Completed,
    Failed,
}

impl ProcessingState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingState::Unprocessed => "UNPROCESSED",
            ProcessingState::InProgress => "IN_PROGRESS",
            ProcessingState::Completed => "COMPLETED",
            ProcessingState::Failed => "FAILED",
        }
    }

    pub fn parse_state(s: &str) -> Option<Self> {
        match s {
            "UNPROCESSED" => Some(ProcessingState::Unprocessed),
            "IN_PROGRESS" => Some(ProcessingState::InProgress),
            "COMPLETED" => Some(ProcessingState::Completed),
            "FAILED" => Some(ProcessingState::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ProcessingState::Completed | ProcessingState::Failed)
    }

    /// Validate a move to `next`. Only UNPROCESSED→IN_PROGRESS and
    /// IN_PROGRESS→{COMPLETED, FAILED} are legal.
    pub fn transition(self, next: ProcessingState) -> Result<ProcessingState, TransitionError> {
        use ProcessingState::*;
        match (self, next) {
            (Unprocessed, InProgress) | (InProgress, Completed) | (InProgress, Failed) => Ok(next),
            _ => Err(TransitionError {
                from: self,
                to: next,
            }),
        }
    }
}

/// Betting odds keyed by the provider's raw market keys ("1", "x", "u_2_5", ...).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct Odds(pub BTreeMap<String, Value>);

impl Odds {
    /// Anything other than a JSON object (the provider sends `[]` for "no odds")
    /// becomes an empty map.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Odds(map.into_iter().collect()),
            _ => Odds::default(),
        }
    }

    pub fn from_json_str(raw: &str) -> Self {
        serde_json::from_str::<Value>(raw)
            .map(Odds::from_value)
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Display form of one market; absent or null keys render as `N/A`.
    pub fn display(&self, key: &str) -> String {
        match self.0.get(key) {
            None | Some(Value::Null) => "N/A".to_string(),
            Some(v) => display_value(v),
        }
    }

    pub fn to_json_string(&self) -> String {
        serde_json::to_string(&self.0).unwrap_or_else(|_| "{}".to_string())
    }
}

/// An upcoming fixture as delivered by the data provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MatchRecord {
    #[serde(deserialize_with = "string_or_number")]
    pub match_code: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub team: String,
    #[serde(default)]
    pub home: String,
    #[serde(default)]
    pub away: String,
    pub match_datetime: String,
    #[serde(default)]
    pub time_zone: String,
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub odds: Value,
}

impl MatchRecord {
    /// Kickoff in UTC, reading a naive `match_datetime` in the record's `time_zone`.
    pub fn kickoff(&self) -> Option<DateTime<Utc>> {
        parse_kickoff_in(&self.match_datetime, zone_offset(&self.time_zone))
    }
}

/// Offset for a provider zone label. `UTC`, `GMT`, `Z` and an empty label are UTC,
/// `+02:00` style labels are fixed offsets. Named zones such as `Europe/London`
/// cannot be resolved without a zone database and are read as UTC.
pub fn zone_offset(label: &str) -> FixedOffset {
    let label = label.trim();
    if label.is_empty() || ["UTC", "GMT", "Z"].iter().any(|z| label.eq_ignore_ascii_case(z)) {
        return Utc.fix();
    }
    label.parse::<FixedOffset>().unwrap_or_else(|_| Utc.fix())
}

/// Accepts RFC 3339 or a naive `YYYY-MM-DD HH:MM[:SS]` timestamp, the latter read as UTC.
pub fn parse_kickoff(raw: &str) -> Option<DateTime<Utc>> {
    parse_kickoff_in(raw, Utc.fix())
}

/// Like [`parse_kickoff`], but a naive timestamp is read at `offset`.
/// RFC 3339 input always keeps its own offset.
pub fn parse_kickoff_in(raw: &str, offset: FixedOffset) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .and_then(|naive| offset.from_local_datetime(&naive).single())
        .map(|dt| dt.with_timezone(&Utc))
}

/// A fixture stored in the match table.
#[derive(Debug, Clone, PartialEq)]
pub struct Match {
    pub id: i64,
    pub match_code: String,
    pub region: String,
    pub team: String,
    pub home_team: String,
    pub away_team: String,
    pub kickoff_datetime: DateTime<Utc>,
    pub time_zone: String,
    pub provider: String,
    pub odds: Odds,
    pub state: ProcessingState,
    pub processed_started_at: Option<DateTime<Utc>>,
    pub process_completed_at: Option<DateTime<Utc>>,
    pub processed_failed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// One historical result in a statistics set.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HistoricalMatch {
    #[serde(default)]
    pub home_team_name: Option<String>,
    #[serde(default)]
    pub away_team_name: Option<String>,
    #[serde(default)]
    pub home_ht_score: Option<Value>,
    #[serde(default)]
    pub away_ht_score: Option<Value>,
    #[serde(default)]
    pub home_ft_score: Option<Value>,
    #[serde(default)]
    pub away_ft_score: Option<Value>,
    #[serde(default)]
    pub match_date: Option<String>,
}

/// Per-match statistics. A missing key means the provider had nothing for it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Statistics {
    #[serde(default)]
    pub home_matches: Option<Vec<HistoricalMatch>>,
    #[serde(default)]
    pub away_matches: Option<Vec<HistoricalMatch>>,
    #[serde(default)]
    pub head_to_head: Option<Vec<HistoricalMatch>>,
}

/// A league grouping offered by the data provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Region {
    pub name: String,
    #[serde(default)]
    pub leagues: Value,
}

/// Team context for illustrative image prompts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageContext {
    pub home: String,
    pub away: String,
}

impl From<&Match> for ImageContext {
    fn from(m: &Match) -> Self {
        ImageContext {
            home: m.home_team.clone(),
            away: m.away_team.clone(),
        }
    }
}

/// Identifier returned by a publish sink.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ArticleId(pub i64);

/// A finished article, handed to the publish sink exactly once.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneratedArticle {
    pub title: String,
    pub body: String,
    pub publish_at: DateTime<Utc>,
    pub author_id: i64,
    pub category_id: Option<i64>,
    pub image_url: Option<String>,
}

/// Render a loosely typed provider value the way it reads in prose.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {}",
            other
        ))),
    }
}
