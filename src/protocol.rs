use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Inbound messages on the collector stream, tagged by `type`.
///
/// Field casing mirrors the wire exactly: the collector emits camelCase for
/// the page bookkeeping fields and snake_case for the timing fields.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamMessage {
    Runs {
        #[serde(default)]
        data: Vec<Value>,
        #[serde(default)]
        page: u32,
        #[serde(default, rename = "totalRuns")]
        total_runs: u64,
        #[serde(default)]
        phase: Option<String>,
        #[serde(default, rename = "hasMore")]
        has_more: bool,
        #[serde(default)]
        elapsed_time: Option<f64>,
        #[serde(default)]
        eta_seconds: Option<f64>,
    },
    PhaseComplete {
        #[serde(default)]
        phase: Option<String>,
        #[serde(default, rename = "totalRuns")]
        total_runs: u64,
        #[serde(default)]
        elapsed_time: Option<f64>,
    },
    JobProgress {
        #[serde(default)]
        runs_processed: u64,
        #[serde(default)]
        total_runs: u64,
        #[serde(default)]
        jobs_collected: u64,
        #[serde(default)]
        elapsed_time: Option<f64>,
        #[serde(default)]
        eta_seconds: Option<f64>,
    },
    Complete {
        #[serde(default, rename = "totalPages")]
        total_pages: u32,
        #[serde(default, rename = "totalJobs")]
        total_jobs: u64,
    },
    Error {
        message: String,
    },
    /// Informational only; ignored by the pipeline.
    Log {
        #[serde(default)]
        message: String,
    },
}

/// Date bounds accepted on a start request. They are deliberately not
/// forwarded to the collector — filtering happens locally so the store holds
/// full history.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DateRange {
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub end: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StartRequest {
    pub repo: String,
    #[serde(default)]
    pub filters: DateRange,
    #[serde(default)]
    pub owner_id: Option<String>,
}

/// Structured answer to a start request. Busy and cache-hit outcomes are
/// responses, not errors, so callers can present a retry-later affordance.
#[derive(Debug, Clone, Serialize)]
pub struct StartResponse {
    pub success: bool,
    pub busy: bool,
    pub cached: bool,
    pub is_complete: bool,
    pub item_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_repo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl StartResponse {
    pub fn busy(current_repo: String, is_complete: bool, item_count: usize) -> Self {
        Self {
            success: false,
            busy: true,
            cached: false,
            is_complete,
            item_count,
            current_repo: Some(current_repo),
            message: None,
        }
    }

    pub fn cached(item_count: usize) -> Self {
        Self {
            success: true,
            busy: false,
            cached: true,
            is_complete: true,
            item_count,
            current_repo: None,
            message: None,
        }
    }

    pub fn started() -> Self {
        Self {
            success: true,
            busy: false,
            cached: false,
            is_complete: false,
            item_count: 0,
            current_repo: None,
            message: Some("collection started".to_string()),
        }
    }
}
