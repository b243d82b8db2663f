use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::DashboardError;

/// Headline numbers from the collector's non-streaming `/metrics` endpoint,
/// used when a full streamed collection is not warranted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackMetrics {
    pub repo: String,
    #[serde(default)]
    pub total_runs: u64,
    #[serde(default)]
    pub success_rate: f64,
    #[serde(default, alias = "successful")]
    pub successful_runs: u64,
    #[serde(default, alias = "failed")]
    pub failed_runs: u64,
}

/// Bounded-timeout GET against the fallback endpoint; the client injected
/// here already carries the request timeout.
pub async fn fetch_metrics(
    client: &reqwest::Client,
    base_url: &str,
    repo: &str,
) -> Result<FallbackMetrics, DashboardError> {
    let url = format!("{base_url}/metrics");
    debug!(%repo, %url, "fetching fallback metrics");

    let resp = client
        .get(&url)
        .query(&[("repo", repo)])
        .send()
        .await
        .map_err(|e| DashboardError::BackendUnreachable(e.to_string()))?;

    if !resp.status().is_success() {
        return Err(DashboardError::BackendUnreachable(format!(
            "metrics endpoint returned {}",
            resp.status()
        )));
    }

    let mut metrics: FallbackMetrics = resp
        .json()
        .await
        .map_err(|e| DashboardError::BackendUnreachable(e.to_string()))?;
    if metrics.repo.is_empty() {
        metrics.repo = repo.to_string();
    }
    Ok(metrics)
}
