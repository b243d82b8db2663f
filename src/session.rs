use chrono::{DateTime, Utc};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::aggregate::{self, AggregatedView};
use crate::config::{
    COLLECTION_END_DATE, COLLECTION_START_DATE, STREAM_DEADLINE_SECS,
};
use crate::error::DashboardError;
use crate::filter::FilterSpec;
use crate::model::Run;
use crate::protocol::{StartRequest, StartResponse, StreamMessage};
use crate::state::SharedState;

// ============================================================================
// State types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Idle,
    Connecting,
    StreamingRuns,
    StreamingJobs,
    Complete,
    Error,
    Cancelled,
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Connecting => write!(f, "connecting"),
            Self::StreamingRuns => write!(f, "streaming_runs"),
            Self::StreamingJobs => write!(f, "streaming_jobs"),
            Self::Complete => write!(f, "complete"),
            Self::Error => write!(f, "error"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// The durable status object, mirrored to the cache after every change so a
/// rehydrating client sees where the last collection left off.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStatus {
    pub is_streaming: bool,
    pub is_complete: bool,
    pub repo: Option<String>,
    pub phase: SessionPhase,
    pub total_runs: u64,
    pub collected_runs: usize,
    pub total_jobs: u64,
    pub page: u32,
    pub phase1_elapsed: Option<f64>,
    pub phase2_elapsed: Option<f64>,
    pub error: Option<String>,
}

impl SessionStatus {
    pub fn idle() -> Self {
        Self {
            is_streaming: false,
            is_complete: false,
            repo: None,
            phase: SessionPhase::Idle,
            total_runs: 0,
            collected_runs: 0,
            total_jobs: 0,
            page: 0,
            phase1_elapsed: None,
            phase2_elapsed: None,
            error: None,
        }
    }
}

/// Mutable state of the (at most one) active streaming session.
pub struct SessionState {
    pub phase: SessionPhase,
    pub repo: Option<String>,
    pub owner_id: Option<String>,
    pub session_id: Option<Uuid>,
    pub started_at: Option<DateTime<Utc>>,
    pub page: u32,
    pub total_runs: u64,
    pub total_jobs: u64,
    pub phase1_elapsed: Option<f64>,
    pub phase2_elapsed: Option<f64>,
    pub error: Option<String>,
    pub cancel_tx: Option<watch::Sender<bool>>,
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            phase: SessionPhase::Idle,
            repo: None,
            owner_id: None,
            session_id: None,
            started_at: None,
            page: 0,
            total_runs: 0,
            total_jobs: 0,
            phase1_elapsed: None,
            phase2_elapsed: None,
            error: None,
            cancel_tx: None,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(
            self.phase,
            SessionPhase::Connecting | SessionPhase::StreamingRuns | SessionPhase::StreamingJobs
        )
    }

    pub fn to_status(&self, collected_runs: usize) -> SessionStatus {
        SessionStatus {
            is_streaming: self.is_active(),
            is_complete: self.phase == SessionPhase::Complete,
            repo: self.repo.clone(),
            phase: self.phase,
            total_runs: self.total_runs,
            collected_runs,
            total_jobs: self.total_jobs,
            page: self.page,
            phase1_elapsed: self.phase1_elapsed,
            phase2_elapsed: self.phase2_elapsed,
            error: self.error.clone(),
        }
    }

    /// Begin a fresh session for `repo`, superseding whatever came before.
    /// Returns the cancellation receiver the stream task selects on.
    pub fn begin(&mut self, repo: &str, owner_id: Option<String>) -> (Uuid, watch::Receiver<bool>) {
        // Supersede: if an old task is still draining, its socket closes and
        // the session-id guard makes its remaining writes no-ops.
        if let Some(tx) = self.cancel_tx.take() {
            let _ = tx.send(true);
        }
        let session_id = Uuid::new_v4();
        let (cancel_tx, cancel_rx) = watch::channel(false);
        *self = Self {
            phase: SessionPhase::Connecting,
            repo: Some(repo.to_string()),
            owner_id,
            session_id: Some(session_id),
            started_at: Some(Utc::now()),
            page: 0,
            total_runs: 0,
            total_jobs: 0,
            phase1_elapsed: None,
            phase2_elapsed: None,
            error: None,
            cancel_tx: Some(cancel_tx),
        };
        (session_id, cancel_rx)
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

/// One frame of the progress-callback contract: the freshly rebuilt view,
/// the durable status, and the terminal flag. The final frame of any session
/// always carries `is_complete = true`.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressUpdate {
    pub view: AggregatedView,
    pub status: SessionStatus,
    pub is_complete: bool,
}

/// How the stream loop wants to end after a message.
#[derive(Debug, PartialEq, Eq)]
pub enum StreamDisposition {
    Continue,
    Complete,
    SoftComplete,
    Failed(String),
}

// ============================================================================
// Public entry points
// ============================================================================

fn validate_repo(repo: &str) -> Result<(), DashboardError> {
    let mut parts = repo.split('/');
    let owner = parts.next().unwrap_or_default();
    let name = parts.next().unwrap_or_default();
    let extra = parts.next();
    if owner.is_empty() || name.is_empty() || extra.is_some() || repo.contains(char::is_whitespace)
    {
        return Err(DashboardError::InvalidRepository(repo.to_string()));
    }
    Ok(())
}

/// Handle a start request: busy arbitration, cache short-circuit, or a fresh
/// stream. Busy and cache-hit are structured responses, not errors.
pub async fn start_session(
    state: &SharedState,
    req: StartRequest,
) -> Result<StartResponse, DashboardError> {
    validate_repo(&req.repo)?;
    let repo = req.repo.clone();

    {
        let session = state.session.read().await;
        if session.is_active() && session.repo.as_deref() != Some(repo.as_str()) {
            let current = session.repo.clone().unwrap_or_default();
            drop(session);
            let item_count = state.store.read().await.len(&current);
            let cache_complete = state
                .cache
                .cache_status(&current)
                .map(|s| s.is_complete)
                .unwrap_or(false);
            info!(%repo, %current, "start request rejected: another repository is streaming");
            return Ok(StartResponse::busy(current, cache_complete, item_count));
        }
    }

    // Complete cache short-circuits to a cache-hit; date filters are applied
    // locally so they never invalidate the cached history.
    let cached = state
        .cache
        .load_runs(&repo)
        .map_err(|e| DashboardError::Cache(e.to_string()))?;
    if let Some((runs, true)) = cached {
        let item_count = runs.len();
        info!(%repo, item_count, "serving collection from complete cache");
        state.store.write().await.replace(&repo, runs);
        {
            let mut session = state.session.write().await;
            if !session.is_active() {
                session.phase = SessionPhase::Complete;
                session.repo = Some(repo.clone());
                session.total_runs = item_count as u64;
                session.error = None;
            }
        }
        let _ = state.cache.set_current_repo(&repo);
        persist_status(state, &repo).await;
        broadcast_progress(state, &repo, true).await;
        return Ok(StartResponse::cached(item_count));
    }

    // Fresh collection: reset this repository's slice of the store and cache
    state.store.write().await.clear(Some(&repo));
    state
        .cache
        .store_runs(&repo, &[], false)
        .map_err(|e| DashboardError::Cache(e.to_string()))?;
    let _ = state.cache.set_current_repo(&repo);

    let (session_id, cancel_rx) = state
        .session
        .write()
        .await
        .begin(&repo, req.owner_id.clone());
    persist_status(state, &repo).await;

    info!(%repo, %session_id, "starting collection stream");
    let task_state = state.clone();
    let task_repo = repo.clone();
    tokio::spawn(async move {
        run_stream(task_state, task_repo, session_id, cancel_rx).await;
    });

    Ok(StartResponse::started())
}

/// Cancel the active session. With a repo given, only cancels when it owns
/// the active stream; closing the socket is the sole cancellation primitive.
pub async fn cancel_session(state: &SharedState, repo: Option<&str>) -> bool {
    let session = state.session.read().await;
    if !session.is_active() {
        return false;
    }
    if let Some(repo) = repo {
        if session.repo.as_deref() != Some(repo) {
            return false;
        }
    }
    if let Some(tx) = &session.cancel_tx {
        let _ = tx.send(true);
        true
    } else {
        false
    }
}

/// The tab-close analog: a disconnecting subscriber cancels the session it
/// started.
pub async fn cancel_if_owned(state: &SharedState, owner_id: &str) {
    let owned = {
        let session = state.session.read().await;
        session.is_active() && session.owner_id.as_deref() == Some(owner_id)
    };
    if owned {
        info!(owner_id, "session owner disconnected, cancelling stream");
        cancel_session(state, None).await;
    }
}

// ============================================================================
// Stream task
// ============================================================================

pub fn build_stream_url(
    backend_url: &str,
    repo: &str,
    token: Option<&str>,
) -> Result<Url, DashboardError> {
    let mut url = Url::parse(backend_url)
        .map_err(|e| DashboardError::Other(format!("invalid backend url: {e}")))?;
    url.path_segments_mut()
        .map_err(|_| DashboardError::Other("backend url cannot be a base".to_string()))?
        .push("data")
        .push(repo); // '/' inside the repo key is percent-encoded here
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("aggregationPeriod", "day");
        if let Some(token) = token {
            query.append_pair("token", token);
        }
        query.append_pair("startDate", COLLECTION_START_DATE);
        query.append_pair("endDate", COLLECTION_END_DATE);
    }
    Ok(url)
}

async fn run_stream(
    state: SharedState,
    repo: String,
    session_id: Uuid,
    mut cancel_rx: watch::Receiver<bool>,
) {
    let url = match build_stream_url(
        &state.config.backend_url,
        &repo,
        state.config.token.as_deref(),
    ) {
        Ok(url) => url,
        Err(e) => {
            finalize_error(&state, &repo, session_id, e.to_string()).await;
            return;
        }
    };

    let mut ws = match tokio_tungstenite::connect_async(url.as_str()).await {
        Ok((ws, _)) => ws,
        Err(e) => {
            warn!(%repo, error = %e, "collector connection failed");
            finalize_error(
                &state,
                &repo,
                session_id,
                format!(
                    "Unable to connect to the collector backend at {}. Please verify it is running and reachable.",
                    state.config.backend_url
                ),
            )
            .await;
            return;
        }
    };

    set_phase(&state, session_id, SessionPhase::StreamingRuns).await;
    persist_status(&state, &repo).await;

    // Safety deadline: a stream that never completes is soft-completed with
    // whatever was collected.
    let deadline = tokio::time::sleep(Duration::from_secs(STREAM_DEADLINE_SECS));
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            changed = cancel_rx.changed() => {
                if changed.is_err() || *cancel_rx.borrow() {
                    let _ = ws.close(None).await;
                    finalize_cancelled(&state, &repo, session_id).await;
                    return;
                }
            }
            _ = &mut deadline => {
                warn!(%repo, "collection deadline reached, closing stream");
                let _ = ws.close(None).await;
                if state.store.read().await.is_empty(&repo) {
                    finalize_error(&state, &repo, session_id, "Collection timed out".to_string()).await;
                } else {
                    finalize_soft_complete(&state, &repo, session_id).await;
                }
                return;
            }
            msg = ws.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let parsed: Result<StreamMessage, _> = serde_json::from_str(&text);
                        let message = match parsed {
                            Ok(message) => message,
                            Err(e) => {
                                warn!(%repo, error = %e, "unparseable stream message, skipping");
                                continue;
                            }
                        };
                        match handle_stream_message(&state, &repo, session_id, message).await {
                            StreamDisposition::Continue => {}
                            StreamDisposition::Complete => {
                                let _ = ws.close(None).await;
                                finalize_complete(&state, &repo, session_id).await;
                                return;
                            }
                            StreamDisposition::SoftComplete => {
                                let _ = ws.close(None).await;
                                finalize_soft_complete(&state, &repo, session_id).await;
                                return;
                            }
                            StreamDisposition::Failed(message) => {
                                let _ = ws.close(None).await;
                                finalize_error(&state, &repo, session_id, message).await;
                                return;
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if ws.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        warn!(%repo, error = %e, "stream error");
                        break;
                    }
                    Some(Ok(_)) => {} // binary/pong frames carry nothing for us
                }
            }
        }
    }

    // Socket closed without an explicit completion signal. Partial data is
    // still useful: keep it and mark it complete rather than failing.
    if state.store.read().await.is_empty(&repo) {
        finalize_error(
            &state,
            &repo,
            session_id,
            format!(
                "Unable to connect to the collector backend at {}. Please verify it is running and reachable.",
                state.config.backend_url
            ),
        )
        .await;
    } else {
        finalize_soft_complete(&state, &repo, session_id).await;
    }
}

/// Apply one inbound message to the store and session. Exposed so the state
/// machine can be driven in tests without a live socket.
pub async fn handle_stream_message(
    state: &SharedState,
    repo: &str,
    session_id: Uuid,
    message: StreamMessage,
) -> StreamDisposition {
    if !is_current_session(state, session_id).await {
        // A superseding or cancelled session: drop everything that was still
        // in flight.
        return StreamDisposition::Continue;
    }

    match message {
        StreamMessage::Runs {
            data,
            page,
            total_runs,
            phase,
            has_more,
            elapsed_time,
            ..
        } => {
            let runs: Vec<Run> = data.iter().filter_map(Run::from_value).collect();
            let outcome = state.store.write().await.merge(repo, runs);
            let collected = state.store.read().await.len(repo);
            debug!(
                %repo, page, added = outcome.added, updated = outcome.updated,
                collected, has_more, "merged runs page"
            );

            {
                let mut session = state.session.write().await;
                session.page = page;
                session.total_runs = total_runs;
                if phase.as_deref() == Some("jobs") {
                    session.phase = SessionPhase::StreamingJobs;
                    session.phase2_elapsed = elapsed_time;
                } else {
                    session.phase = SessionPhase::StreamingRuns;
                }
            }
            persist_runs(state, repo, false).await;
            persist_status(state, repo).await;
            broadcast_progress(state, repo, false).await;
            StreamDisposition::Continue
        }
        StreamMessage::PhaseComplete {
            total_runs,
            elapsed_time,
            ..
        } => {
            info!(%repo, total_runs, "run collection phase complete, collecting jobs");
            {
                let mut session = state.session.write().await;
                session.phase = SessionPhase::StreamingJobs;
                session.total_runs = total_runs;
                session.phase1_elapsed = elapsed_time;
            }
            persist_status(state, repo).await;
            broadcast_progress(state, repo, false).await;
            StreamDisposition::Continue
        }
        StreamMessage::JobProgress {
            jobs_collected,
            total_runs,
            elapsed_time,
            ..
        } => {
            {
                let mut session = state.session.write().await;
                session.phase = SessionPhase::StreamingJobs;
                if total_runs > 0 {
                    session.total_runs = total_runs;
                }
                session.total_jobs = jobs_collected;
                session.phase2_elapsed = elapsed_time;
            }
            persist_status(state, repo).await;
            broadcast_progress(state, repo, false).await;
            StreamDisposition::Continue
        }
        StreamMessage::Complete { total_jobs, .. } => {
            if total_jobs > 0 {
                state.session.write().await.total_jobs = total_jobs;
            }
            StreamDisposition::Complete
        }
        StreamMessage::Error { message } => {
            if state.store.read().await.is_empty(repo) {
                StreamDisposition::Failed(message)
            } else {
                warn!(%repo, %message, "collector error after partial data, keeping what we have");
                StreamDisposition::SoftComplete
            }
        }
        StreamMessage::Log { message } => {
            debug!(%repo, "collector: {message}");
            StreamDisposition::Continue
        }
    }
}

// ============================================================================
// Finalizers
// ============================================================================

async fn is_current_session(state: &SharedState, session_id: Uuid) -> bool {
    state.session.read().await.session_id == Some(session_id)
}

async fn set_phase(state: &SharedState, session_id: Uuid, phase: SessionPhase) {
    let mut session = state.session.write().await;
    if session.session_id == Some(session_id) {
        session.phase = phase;
    }
}

pub async fn finalize_complete(state: &SharedState, repo: &str, session_id: Uuid) {
    if !is_current_session(state, session_id).await {
        return;
    }
    let collected = state.store.read().await.len(repo);
    info!(%repo, collected, "collection complete");
    {
        let mut session = state.session.write().await;
        session.phase = SessionPhase::Complete;
        session.total_runs = collected as u64;
        session.cancel_tx = None;
    }
    persist_runs(state, repo, true).await;
    persist_status(state, repo).await;
    broadcast_progress(state, repo, true).await;
}

/// Mid-stream close after some data arrived: spec'd as a soft-complete, the
/// partial history is kept and marked reusable.
pub async fn finalize_soft_complete(state: &SharedState, repo: &str, session_id: Uuid) {
    finalize_complete(state, repo, session_id).await;
}

pub async fn finalize_error(state: &SharedState, repo: &str, session_id: Uuid, message: String) {
    if !is_current_session(state, session_id).await {
        return;
    }
    warn!(%repo, %message, "collection failed");
    {
        let mut session = state.session.write().await;
        session.phase = SessionPhase::Error;
        session.error = Some(message);
        session.cancel_tx = None;
    }
    persist_status(state, repo).await;
    broadcast_progress(state, repo, true).await;
}

pub async fn finalize_cancelled(state: &SharedState, repo: &str, session_id: Uuid) {
    if !is_current_session(state, session_id).await {
        return;
    }
    info!(%repo, "collection cancelled");
    {
        let mut session = state.session.write().await;
        session.phase = SessionPhase::Cancelled;
        session.cancel_tx = None;
        session.owner_id = None;
    }
    persist_status(state, repo).await;
    broadcast_progress(state, repo, true).await;
}

// ============================================================================
// Persistence + progress fan-out
// ============================================================================

async fn persist_runs(state: &SharedState, repo: &str, is_complete: bool) {
    let snapshot = state.store.read().await.snapshot(repo);
    if let Err(e) = state.cache.store_runs(repo, &snapshot, is_complete) {
        warn!(%repo, error = %e, "failed to persist runs to cache");
    }
}

async fn persist_status(state: &SharedState, repo: &str) {
    let collected = state.store.read().await.len(repo);
    let status = state.session.read().await.to_status(collected);
    if let Err(e) = state.cache.save_status(&status) {
        warn!(%repo, error = %e, "failed to persist session status");
    }
}

/// Rebuild the unfiltered view for the streaming repository and fan it out.
/// Invoked at least once per merged batch; the terminal call carries
/// `is_complete = true`.
pub async fn broadcast_progress(state: &SharedState, repo: &str, is_complete: bool) {
    let snapshot = state.store.read().await.snapshot(repo);
    let view = aggregate::build_view(repo, &snapshot, &FilterSpec::default());
    let status = state.session.read().await.to_status(snapshot.len());
    let _ = state.progress_tx.send(ProgressUpdate {
        view,
        status,
        is_complete,
    });
}
