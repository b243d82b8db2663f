use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Terminal status of a run or job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Conclusion {
    Success,
    Failure,
    Cancelled,
    Skipped,
    TimedOut,
    Other,
}

impl Conclusion {
    pub fn parse(s: &str) -> Self {
        match s {
            "success" => Self::Success,
            "failure" => Self::Failure,
            "cancelled" => Self::Cancelled,
            "skipped" => Self::Skipped,
            "timed_out" => Self::TimedOut,
            _ => Self::Other,
        }
    }
}

impl std::fmt::Display for Conclusion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Failure => write!(f, "failure"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Skipped => write!(f, "skipped"),
            Self::TimedOut => write!(f, "timed_out"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// A sub-unit of a run with its own outcome and duration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub name: String,
    pub conclusion: Option<Conclusion>,
    pub duration: f64,
}

/// One workflow execution, normalized to canonical field names.
///
/// The collector's records drift across schema versions (actor vs
/// issuer_name vs triggering_actor, branch vs head_branch, duration vs
/// build_duration, ...). `from_value` is the single place those aliases are
/// resolved; everything downstream sees only this shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: i64,
    pub workflow_name: Option<String>,
    pub branch: Option<String>,
    pub actor: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub conclusion: Option<Conclusion>,
    pub duration: f64,
    pub event: Option<String>,
    pub commit_sha: Option<String>,
    pub html_url: Option<String>,
    #[serde(default)]
    pub jobs: Vec<Job>,
}

fn pick_str(entry: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| entry.get(k).and_then(|v| v.as_str()))
        .map(|s| s.to_string())
}

fn pick_f64(entry: &Value, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|k| entry.get(k).and_then(|v| v.as_f64()))
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // The backend's SQL layer emits naive "YYYY-MM-DD HH:MM:SS" timestamps
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    None
}

impl Run {
    /// Adapt one raw record from the stream into a canonical run.
    ///
    /// Returns `None` only when the record has no usable id; every other
    /// field degrades to absent rather than failing the whole page.
    pub fn from_value(entry: &Value) -> Option<Run> {
        let id = entry
            .get("id")
            .or_else(|| entry.get("id_build"))
            .and_then(|v| v.as_i64())?;

        let jobs = entry
            .get("jobs")
            .and_then(|v| v.as_array())
            .map(|arr| arr.iter().filter_map(Job::from_value).collect())
            .unwrap_or_default();

        Some(Run {
            id,
            workflow_name: pick_str(entry, &["workflow_name", "name"]),
            branch: pick_str(entry, &["branch", "head_branch"]),
            actor: pick_str(entry, &["actor", "issuer_name", "triggering_actor"]),
            created_at: pick_str(entry, &["created_at"])
                .as_deref()
                .and_then(parse_timestamp),
            conclusion: pick_str(entry, &["conclusion"])
                .as_deref()
                .map(Conclusion::parse),
            duration: pick_f64(entry, &["duration", "build_duration"]).unwrap_or(0.0),
            event: pick_str(entry, &["event", "workflow_event_trigger"]),
            commit_sha: pick_str(entry, &["commit_sha", "head_sha"]),
            html_url: pick_str(entry, &["html_url"]),
            jobs,
        })
    }

    /// UTC calendar day of `created_at`, the grouping key for all daily views.
    pub fn day(&self) -> Option<NaiveDate> {
        self.created_at.map(|dt| dt.date_naive())
    }

    /// Valid duration for statistics: strictly positive and finite.
    pub fn valid_duration(&self) -> Option<f64> {
        (self.duration > 0.0 && self.duration.is_finite()).then_some(self.duration)
    }
}

impl Job {
    pub fn from_value(entry: &Value) -> Option<Job> {
        let name = pick_str(entry, &["name", "job_name"])?;
        Some(Job {
            name,
            conclusion: pick_str(entry, &["conclusion"])
                .as_deref()
                .map(Conclusion::parse),
            duration: pick_f64(entry, &["duration", "job_duration"]).unwrap_or(0.0),
        })
    }
}
