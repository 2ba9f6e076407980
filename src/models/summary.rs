use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One cached summarizer response, keyed by (item_id, model, source_hash).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarizationLogEntry {
    pub id: i64,
    pub item_id: i64,
    pub model: String,
    pub source_hash: String,
    pub summary: String,
    pub prompt_version: String,
    pub tokens_in: i64,
    pub tokens_out: i64,
    pub cost_cents: i64,
    pub created_at: DateTime<Utc>,
}

/// Result of a summarize call. Failures are reported in `error`, never raised.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SummaryOutcome {
    pub summary: Option<String>,
    pub cached: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SyncError {
    pub item_id: i64,
    pub title: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncStats {
    pub processed: usize,
    pub summarized: usize,
    pub errors: Vec<SyncError>,
}

impl SyncStats {
    pub fn absorb(&mut self, other: SyncStats) {
        self.processed += other.processed;
        self.summarized += other.summarized;
        self.errors.extend(other.errors);
    }
}
