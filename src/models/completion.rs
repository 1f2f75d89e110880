use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// One completion of a recurring source. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRecord {
    pub id: String,
    pub source_id: String,
    /// Local timestamp with the offset it was recorded in.
    pub completed_at: DateTime<FixedOffset>,
}
