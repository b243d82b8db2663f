use axum::extract::{Query, State};
use axum::response::Json;
use serde::{Deserialize, Serialize};

use crate::cache::CacheStatus;
use crate::error::DashboardError;
use crate::state::SharedState;

#[derive(Debug, Deserialize)]
pub struct CacheParams {
    pub repo: String,
}

pub async fn status(
    State(state): State<SharedState>,
    Query(params): Query<CacheParams>,
) -> Result<Json<CacheStatus>, DashboardError> {
    let status = state
        .cache
        .cache_status(&params.repo)
        .map_err(|e| DashboardError::Cache(e.to_string()))?;
    Ok(Json(status))
}

#[derive(Debug, Deserialize)]
pub struct ClearRequest {
    #[serde(default)]
    pub repo: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ClearResponse {
    pub success: bool,
}

/// Drop one repository's cached history, or everything when no key is given.
/// The in-memory store is cleared alongside so readers cannot resurrect it.
pub async fn clear(
    State(state): State<SharedState>,
    Json(req): Json<ClearRequest>,
) -> Result<Json<ClearResponse>, DashboardError> {
    state
        .cache
        .clear(req.repo.as_deref())
        .map_err(|e| DashboardError::Cache(e.to_string()))?;
    state.store.write().await.clear(req.repo.as_deref());
    Ok(Json(ClearResponse { success: true }))
}
