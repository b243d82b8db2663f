use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

#[derive(Debug, thiserror::Error)]
pub enum DashboardError {
    #[error("Unable to connect to the collector backend: {0}")]
    BackendUnreachable(String),

    #[error("Invalid repository name: {0}")]
    InvalidRepository(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("{0}")]
    Other(String),
}

impl IntoResponse for DashboardError {
    fn into_response(self) -> Response {
        let status = match &self {
            DashboardError::BackendUnreachable(_) => StatusCode::BAD_GATEWAY,
            DashboardError::InvalidRepository(_) => StatusCode::BAD_REQUEST,
            DashboardError::Cache(_) => StatusCode::INTERNAL_SERVER_ERROR,
            DashboardError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = serde_json::json!({
            "error": self.to_string(),
        });

        (status, axum::Json(body)).into_response()
    }
}
