use axum::extract::State;
use axum::response::Json;
use serde::{Deserialize, Serialize};

use crate::error::DashboardError;
use crate::protocol::{StartRequest, StartResponse};
use crate::session::{self, SessionStatus};
use crate::state::SharedState;

pub async fn start(
    State(state): State<SharedState>,
    Json(req): Json<StartRequest>,
) -> Result<Json<StartResponse>, DashboardError> {
    let response = session::start_session(&state, req).await?;
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
pub struct CancelRequest {
    #[serde(default)]
    pub repo: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub cancelled: bool,
}

pub async fn cancel(
    State(state): State<SharedState>,
    Json(req): Json<CancelRequest>,
) -> Json<CancelResponse> {
    let cancelled = session::cancel_session(&state, req.repo.as_deref()).await;
    Json(CancelResponse { cancelled })
}

pub async fn status(State(state): State<SharedState>) -> Json<SessionStatus> {
    let session = state.session.read().await;
    let collected = match &session.repo {
        Some(repo) => state.store.read().await.len(repo),
        None => 0,
    };
    Json(session.to_status(collected))
}
