//! Error types shared by the clients, the store and the scheduling engine.
use thiserror::Error;

use crate::model::ProcessingState;

/// Failure talking to either external API. Always recoverable: callers log it
/// and treat the operation as yielding nothing.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{endpoint} returned HTTP {status}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },
    #[error("invalid JSON from {endpoint}: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("{endpoint} reported an error: {message}")]
    Payload { endpoint: String, message: String },
}

/// A rejected setting. The sanitiser substitutes a safe default and reports this.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("match {0} not found")]
    MatchNotFound(String),
    #[error("corrupt row: {0}")]
    Corrupt(String),
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error("{0}")]
    Rejected(String),
}

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("illegal state transition {} -> {}", from.as_str(), to.as_str())]
pub struct TransitionError {
    pub from: ProcessingState,
    pub to: ProcessingState,
}

/// Why a single match could not be advanced. Never escapes the match loop.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error("unexpected error: {0}")]
    Unexpected(#[from] anyhow::Error),
}
