//! Client for the football data provider.
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::UpstreamError;
use crate::model::{HistoricalMatch, MatchRecord, Region, Statistics};

pub const SPORT_API_BASE: &str = "https://app.scalesp.com/api/v1/football/";

/// The three statistic sets fetched per match, in request order.
const STAT_SETS: [&str; 3] = ["home-matches", "away-matches", "head-to-head"];

#[async_trait]
pub trait SportsData: Send + Sync {
    async fn fetch_regions(&self, api_key: &str) -> Result<Vec<Region>, UpstreamError>;

    /// Upcoming fixtures. An empty provider list is `Ok(vec![])`.
    async fn fetch_upcoming(&self, api_key: &str) -> Result<Vec<MatchRecord>, UpstreamError>;

    /// All three statistic sets, or `None` if any one of them failed.
    async fn fetch_statistics(&self, api_key: &str, match_code: &str) -> Option<Statistics>;
}

#[derive(Clone)]
pub struct SportApiClient {
    http: Client,
    base_url: Url,
}

impl fmt::Debug for SportApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SportApiClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl SportApiClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        Self::with_base_url(SPORT_API_BASE, timeout)
    }

    pub fn with_base_url(base_url: &str, timeout: Duration) -> Result<Self> {
        let mut base_url = Url::parse(base_url).context("invalid sport API base URL")?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let http = Client::builder()
            .user_agent("sports-writer/0.1")
            .no_proxy()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { http, base_url })
    }

    /// Appends `segments` to the base URL, percent-encoding each one so a
    /// provider value cannot introduce extra path segments or a query.
    fn endpoint_url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("sport API base URL cannot carry a path"))?
            .pop_if_empty()
            .extend(segments.iter().copied());
        Ok(url)
    }

    pub fn build_request(&self, api_key: &str, segments: &[&str]) -> Result<reqwest::Request> {
        let endpoint = self.endpoint_url(segments)?;
        self.http
            .get(endpoint)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Accept", "application/json")
            .build()
            .context("failed to build sport API request")
    }

    async fn get_json(&self, api_key: &str, segments: &[&str]) -> Result<Value, UpstreamError> {
        let endpoint = segments.join("/");
        let path = endpoint.as_str();
        let request = self
            .build_request(api_key, segments)
            .map_err(|e| UpstreamError::Payload {
                endpoint: path.to_string(),
                message: format!("{:#}", e),
            })?;
        debug!(url = %request.url(), "sport API request");

        let res = self
            .http
            .execute(request)
            .await
            .map_err(|source| UpstreamError::Transport {
                endpoint: path.to_string(),
                source,
            })?;
        let status = res.status();
        let body = res.text().await.map_err(|source| UpstreamError::Transport {
            endpoint: path.to_string(),
            source,
        })?;
        if status != StatusCode::OK {
            warn!(endpoint = path, status = status.as_u16(), "sport API request failed");
            return Err(UpstreamError::Status {
                endpoint: path.to_string(),
                status: status.as_u16(),
                body: excerpt(&body),
            });
        }
        serde_json::from_str(&body).map_err(|source| {
            warn!(endpoint = path, "failed to decode sport API response");
            UpstreamError::Decode {
                endpoint: path.to_string(),
                source,
            }
        })
    }
}

#[async_trait]
impl SportsData for SportApiClient {
    async fn fetch_regions(&self, api_key: &str) -> Result<Vec<Region>, UpstreamError> {
        let payload = self.get_json(api_key, &["regions"]).await?;
        decode_list("regions", payload)
    }

    async fn fetch_upcoming(&self, api_key: &str) -> Result<Vec<MatchRecord>, UpstreamError> {
        let payload = self.get_json(api_key, &["games"]).await?;
        decode_list("games", payload)
    }

    async fn fetch_statistics(&self, api_key: &str, match_code: &str) -> Option<Statistics> {
        let mut sets = Vec::with_capacity(STAT_SETS.len());
        for set in STAT_SETS {
            let segments = ["stats", match_code, set];
            let path = segments.join("/");
            let payload = match self.get_json(api_key, &segments).await {
                Ok(v) => v,
                Err(e) => {
                    warn!(match_code, error = %e, "statistics request failed");
                    return None;
                }
            };
            match decode_list::<HistoricalMatch>(&path, payload) {
                Ok(list) => sets.push(list),
                Err(e) => {
                    warn!(match_code, error = %e, "statistics payload rejected");
                    return None;
                }
            }
        }
        let mut sets = sets.into_iter();
        Some(Statistics {
            home_matches: sets.next(),
            away_matches: sets.next(),
            head_to_head: sets.next(),
        })
    }
}

fn provider_error(endpoint: &str, payload: &Value) -> Option<UpstreamError> {
    let err = payload.get("error").filter(|err| !err.is_null())?;
    Some(UpstreamError::Payload {
        endpoint: endpoint.to_string(),
        message: match err {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        },
    })
}

/// Unwrap a `{"data": [...]}` envelope, skipping entries that do not decode.
fn decode_list<T: DeserializeOwned>(endpoint: &str, payload: Value) -> Result<Vec<T>, UpstreamError> {
    if let Some(err) = provider_error(endpoint, &payload) {
        return Err(err);
    }
    let items = match payload {
        Value::Object(mut map) => match map.remove("data") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items,
            Some(_) => {
                return Err(UpstreamError::Payload {
                    endpoint: endpoint.to_string(),
                    message: "`data` is not a list".into(),
                })
            }
        },
        Value::Array(items) => items,
        _ => {
            return Err(UpstreamError::Payload {
                endpoint: endpoint.to_string(),
                message: "unexpected response shape".into(),
            })
        }
    };

    let mut out = Vec::with_capacity(items.len());
    for item in items {
        match serde_json::from_value(item) {
            Ok(v) => out.push(v),
            Err(e) => warn!(endpoint, error = %e, "skipping malformed entry"),
        }
    }
    Ok(out)
}

fn excerpt(body: &str) -> String {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}
