//! Configuration types.
//!
//! Everything is env-var driven with sensible defaults; only the feed
//! credentials are required (without them acquisition is skipped and the
//! agent dispatches whatever is already in the inbox).

use std::time::Duration;

use secrecy::SecretString;

/// Registry-feed connection settings.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// Feed endpoint base URL.
    pub base_url: String,
    pub login: String,
    pub password: SecretString,
    /// Per-request timeout.
    pub request_timeout: Duration,
}

impl FeedConfig {
    /// Build from `EFRSB_*` environment variables.
    ///
    /// Returns `None` when any of URL / login / password is missing, which
    /// disables acquisition for the process lifetime.
    pub fn from_env() -> Option<Self> {
        let base_url = std::env::var("EFRSB_BASE_URL").ok()?;
        let login = std::env::var("EFRSB_LOGIN").ok()?;
        let password = std::env::var("EFRSB_PASSWORD").ok()?;

        let request_timeout_secs: u64 = std::env::var("EFRSB_REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(60);

        Some(Self {
            base_url,
            login,
            password: SecretString::from(password),
            request_timeout: Duration::from_secs(request_timeout_secs),
        })
    }
}

/// Agent-level settings.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Pause between cycle completions. A new cycle is armed only after the
    /// previous one finishes, so cycles never overlap.
    pub cycle_interval: Duration,
    /// How far back the very first acquisition looks.
    pub initial_lookback: Duration,
    /// Local database path.
    pub db_path: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            cycle_interval: Duration::from_secs(3600), // 60 minutes
            initial_lookback: Duration::from_secs(3600),
            db_path: "./data/efrsb-agent.db".to_string(),
        }
    }
}

impl AgentConfig {
    /// Build from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let cycle_interval = std::env::var("EFRSB_CYCLE_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.cycle_interval);

        let initial_lookback = std::env::var("EFRSB_INITIAL_LOOKBACK_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.initial_lookback);

        let db_path =
            std::env::var("EFRSB_DB_PATH").unwrap_or(defaults.db_path);

        Self {
            cycle_interval,
            initial_lookback,
            db_path,
        }
    }
}
