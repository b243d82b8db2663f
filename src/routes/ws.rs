use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::debug;

use crate::aggregate;
use crate::filter::FilterSpec;
use crate::session::{self, ProgressUpdate};
use crate::state::SharedState;

#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub repo: String,
    /// Registering an owner id binds any session started with the same id to
    /// this subscriber: its disconnect cancels the stream (the tab-close
    /// analog).
    #[serde(default)]
    pub owner_id: Option<String>,
}

pub async fn dashboard_ws(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    State(state): State<SharedState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, params))
}

async fn handle_socket(mut socket: WebSocket, state: SharedState, params: WsParams) {
    // Send an initial snapshot so the dashboard renders before the first
    // progress frame; rehydrate from cache when the store is cold.
    let mut snapshot = state.store.read().await.snapshot(&params.repo);
    if snapshot.is_empty() {
        if let Ok(Some((runs, _))) = state.cache.load_runs(&params.repo) {
            state
                .store
                .write()
                .await
                .replace(&params.repo, runs.clone());
            snapshot = runs;
        }
    }
    let status = {
        let session = state.session.read().await;
        session.to_status(snapshot.len())
    };
    let initial = ProgressUpdate {
        view: aggregate::build_view(&params.repo, &snapshot, &FilterSpec::default()),
        is_complete: status.is_complete,
        status,
    };
    if let Ok(json) = serde_json::to_string(&initial) {
        if socket.send(Message::Text(json.into())).await.is_err() {
            return;
        }
    }

    let mut rx = state.progress_tx.subscribe();
    let mut shutdown_rx = state.shutdown_tx.subscribe();

    loop {
        tokio::select! {
            // Shutdown notification — tell client and close
            _ = shutdown_rx.recv() => {
                let _ = socket.send(Message::Text(r#"{"type":"shutdown"}"#.into())).await;
                let _ = socket.send(Message::Close(None)).await;
                break;
            }
            // Progress frame from the session controller
            result = rx.recv() => {
                match result {
                    Ok(update) => {
                        if update.view.repo != params.repo {
                            continue;
                        }
                        if let Ok(json) = serde_json::to_string(&update) {
                            if socket.send(Message::Text(json.into())).await.is_err() {
                                break;
                            }
                        }
                    }
                    // A slow subscriber lags rather than blocking ingestion;
                    // the next frame carries the full rebuilt view anyway.
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(skipped, "subscriber lagged behind progress frames");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            // Client messages — handle ping/pong/close
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {} // Ignore text/binary from client
                }
            }
        }
    }

    if let Some(owner_id) = &params.owner_id {
        session::cancel_if_owned(&state, owner_id).await;
    }
    debug!("dashboard subscriber disconnected");
}
