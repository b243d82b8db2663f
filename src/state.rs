use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};

use crate::cache::CacheDb;
use crate::config::{DashboardConfig, FALLBACK_TIMEOUT_SECS, PROGRESS_CHANNEL_CAPACITY};
use crate::session::{ProgressUpdate, SessionState};
use crate::store::RunStore;

pub type SharedState = Arc<DashboardState>;

pub struct DashboardState {
    pub config: DashboardConfig,
    pub store: RwLock<RunStore>,
    pub session: RwLock<SessionState>,
    pub cache: CacheDb,
    pub progress_tx: broadcast::Sender<ProgressUpdate>,
    pub shutdown_tx: broadcast::Sender<()>,
    pub http_client: reqwest::Client,
}

impl DashboardState {
    pub fn new(config: DashboardConfig) -> anyhow::Result<Self> {
        let cache = CacheDb::new(&config.cache_db)?;
        Ok(Self::with_cache(config, cache))
    }

    /// In-memory cache variant for tests.
    pub fn in_memory(config: DashboardConfig) -> anyhow::Result<Self> {
        let cache = CacheDb::in_memory()?;
        Ok(Self::with_cache(config, cache))
    }

    fn with_cache(config: DashboardConfig, cache: CacheDb) -> Self {
        let (progress_tx, _) = broadcast::channel(PROGRESS_CHANNEL_CAPACITY);
        let (shutdown_tx, _) = broadcast::channel(1);
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(FALLBACK_TIMEOUT_SECS))
            .build()
            .expect("Failed to create HTTP client");
        Self {
            config,
            store: RwLock::new(RunStore::new()),
            session: RwLock::new(SessionState::new()),
            cache,
            progress_tx,
            shutdown_tx,
            http_client,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CliArgs, DEFAULT_BACKEND_WS_URL, DEFAULT_FALLBACK_HTTP_URL};
    use crate::session::SessionPhase;
    use clap::Parser;

    fn test_state() -> DashboardState {
        let args = CliArgs::parse_from(["gha-dashboard"]);
        DashboardState::in_memory(DashboardConfig::from_args(args)).unwrap()
    }

    #[tokio::test]
    async fn test_state_construction() {
        let state = test_state();
        assert_eq!(state.config.backend_url, DEFAULT_BACKEND_WS_URL);
        assert_eq!(state.config.fallback_url, DEFAULT_FALLBACK_HTTP_URL);

        let session = state.session.read().await;
        assert_eq!(session.phase, SessionPhase::Idle);
        assert!(session.repo.is_none());
        assert!(!session.is_active());
    }

    #[tokio::test]
    async fn test_progress_channel_fanout() {
        let state = test_state();
        let mut rx = state.progress_tx.subscribe();
        let update = ProgressUpdate {
            view: crate::aggregate::AggregatedView::empty("o/r"),
            status: crate::session::SessionStatus::idle(),
            is_complete: false,
        };
        state.progress_tx.send(update).unwrap();
        let received = rx.try_recv().unwrap();
        assert_eq!(received.view.repo, "o/r");
    }
}
