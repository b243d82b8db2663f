use clap::Parser;
use std::path::PathBuf;

/// GHA Dashboard — streams workflow-run telemetry from the collector backend
/// and serves chart-ready aggregates to the extension UI.
#[derive(Parser, Debug, Clone)]
#[command(name = "gha-dashboard")]
pub struct CliArgs {
    /// Service HTTP port
    #[arg(long = "port", default_value_t = DEFAULT_SERVICE_PORT)]
    pub port: u16,

    /// Collector backend WebSocket base URL
    #[arg(long = "backend-url", default_value = DEFAULT_BACKEND_WS_URL)]
    pub backend_url: String,

    /// Non-streaming metrics fallback base URL
    #[arg(long = "fallback-url", default_value = DEFAULT_FALLBACK_HTTP_URL)]
    pub fallback_url: String,

    /// Path to the run cache database (defaults to the user data dir)
    #[arg(long = "cache-db")]
    pub cache_db: Option<PathBuf>,

    /// GitHub API token forwarded to the collector
    #[arg(long = "token")]
    pub token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DashboardConfig {
    pub port: u16,
    pub backend_url: String,
    pub fallback_url: String,
    pub cache_db: PathBuf,
    pub token: Option<String>,
}

impl DashboardConfig {
    pub fn from_args(args: CliArgs) -> Self {
        let cache_db = args.cache_db.unwrap_or_else(default_cache_db);
        Self {
            port: args.port,
            backend_url: args.backend_url,
            fallback_url: args.fallback_url,
            cache_db,
            token: args.token,
        }
    }
}

pub fn default_cache_db() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("gha-dashboard")
        .join("runs.db")
}

// Port constants
pub const DEFAULT_SERVICE_PORT: u16 = 9880;
pub const DEFAULT_BACKEND_WS_URL: &str = "ws://localhost:3000";
pub const DEFAULT_FALLBACK_HTTP_URL: &str = "http://localhost:5000";

// Stream constants
pub const STREAM_DEADLINE_SECS: u64 = 180; // safety deadline for a full collection
pub const PROGRESS_CHANNEL_CAPACITY: usize = 64;
// The collection request pins a wide-open date range; user date filters are
// applied locally so the store always holds full history.
pub const COLLECTION_START_DATE: &str = "2000-01-01";
pub const COLLECTION_END_DATE: &str = "2100-01-01";

// Fallback path constants
pub const FALLBACK_TIMEOUT_SECS: u64 = 20;

// Aggregation constants
pub const TOP_GROUP_LIMIT: usize = 10;
pub const SPIKE_FAILURE_RATE_FACTOR: f64 = 2.0;
pub const SPIKE_DURATION_FACTOR: f64 = 1.5;
pub const SPIKE_RUN_COUNT_FACTOR: f64 = 1.8;
pub const WORSENING_WINDOW: usize = 10;
pub const WORSENING_RATIO: f64 = 1.5;
pub const WORSENING_MAX_POINTS: usize = 3;
pub const WORSENING_MIN_SPACING_DAYS: i64 = 30;
