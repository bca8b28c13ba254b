//! Database view models returned by repositories.
//!
//! Keep these structs focused on the data returned by queries. Business logic
//! should live in higher layers.

use serde_json::Value;

/// Outcome of one ingestion pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub inserted: usize,
    pub skipped_duplicates: usize,
    pub skipped_invalid: usize,
    pub evicted: u64,
}

/// A stored region with its selection flag.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionRow {
    pub id: i64,
    pub name: String,
    pub leagues: Value,
    pub selected: bool,
}
