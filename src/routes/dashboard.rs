use axum::extract::{Query, State};
use axum::response::Json;
use chrono::NaiveDate;
use serde::Deserialize;

use crate::aggregate::{self, AggregatedView};
use crate::error::DashboardError;
use crate::fallback::{self, FallbackMetrics};
use crate::filter::FilterSpec;
use crate::state::SharedState;

/// Query parameters for the filtered dashboard view. Multi-select fields are
/// comma-separated; absent means "all".
#[derive(Debug, Deserialize)]
pub struct DashboardParams {
    pub repo: String,
    pub workflow: Option<String>,
    pub branch: Option<String>,
    pub actor: Option<String>,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

fn split_selection(raw: &Option<String>) -> Vec<String> {
    match raw {
        Some(value) => value
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        None => Vec::new(),
    }
}

impl From<&DashboardParams> for FilterSpec {
    fn from(p: &DashboardParams) -> Self {
        FilterSpec {
            workflow: split_selection(&p.workflow),
            branch: split_selection(&p.branch),
            actor: split_selection(&p.actor),
            start_date: p.start,
            end_date: p.end,
        }
        .normalized()
    }
}

/// Recompute the filtered view from the current snapshot, rehydrating from
/// the cache when the in-memory store has nothing for the repository.
pub async fn dashboard(
    State(state): State<SharedState>,
    Query(params): Query<DashboardParams>,
) -> Result<Json<AggregatedView>, DashboardError> {
    let spec = FilterSpec::from(&params);

    let mut snapshot = state.store.read().await.snapshot(&params.repo);
    if snapshot.is_empty() {
        if let Some((runs, _)) = state
            .cache
            .load_runs(&params.repo)
            .map_err(|e| DashboardError::Cache(e.to_string()))?
        {
            state.store.write().await.replace(&params.repo, runs.clone());
            snapshot = runs;
        }
    }

    Ok(Json(aggregate::build_view(&params.repo, &snapshot, &spec)))
}

#[derive(Debug, Deserialize)]
pub struct MetricsParams {
    pub repo: String,
}

/// Non-streaming fallback path: headline numbers straight from the collector.
pub async fn metrics_fallback(
    State(state): State<SharedState>,
    Query(params): Query<MetricsParams>,
) -> Result<Json<FallbackMetrics>, DashboardError> {
    let metrics = fallback::fetch_metrics(
        &state.http_client,
        &state.config.fallback_url,
        &params.repo,
    )
    .await?;
    Ok(Json(metrics))
}
