use axum::extract::State;
use axum::response::Json;
use serde::Serialize;

use crate::session::SessionPhase;
use crate::state::SharedState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub phase: SessionPhase,
    pub repo: Option<String>,
}

pub async fn health(State(state): State<SharedState>) -> Json<HealthResponse> {
    let session = state.session.read().await;
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        phase: session.phase,
        repo: session.repo.clone(),
    })
}
