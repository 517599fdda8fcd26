//! Session configuration.

use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

/// Default warning margin before true expiry: 30 seconds.
pub const DEFAULT_WARNING_MARGIN_MS: u64 = 30_000;

/// Default session lifetime for tokens that carry no `exp`: 60 seconds.
pub const DEFAULT_SESSION_TIMEOUT_MS: u64 = 60_000;

/// Upper bound for the warning dialog countdown.
pub const MAX_DIALOG_WINDOW: Duration = Duration::from_secs(30);

const DEFAULT_API_URL: &str = "http://localhost:5000/api";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Configuration for the session core.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Base URL of the CRM REST API; the Auth endpoints live under `{api_url}/Auth`.
    pub api_url: String,
    /// How long before expiry the user is warned.
    pub warning_margin: Duration,
    /// Fallback lifetime applied when an access token has no `exp` claim.
    pub session_timeout: Duration,
    /// Directory holding the persisted identity.
    pub storage_dir: PathBuf,
    /// Request timeout for Auth API calls.
    pub http_timeout: Duration,
}

impl SessionConfig {
    /// Reads configuration from environment variables with sensible defaults.
    ///
    /// | Variable                    | Default                      |
    /// |-----------------------------|------------------------------|
    /// | `CRM_API_URL`               | `http://localhost:5000/api`  |
    /// | `SESSION_WARNING_MARGIN_MS` | `30000`                      |
    /// | `SESSION_TIMEOUT_MS`        | `60000`                      |
    /// | `CRM_SESSION_DIR`           | `<data dir>/crmdesk`         |
    /// | `CRM_HTTP_TIMEOUT_SECS`     | `30`                         |
    pub fn from_env() -> Self {
        Self {
            api_url: std::env::var("CRM_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.into()),
            warning_margin: Duration::from_millis(env_u64(
                "SESSION_WARNING_MARGIN_MS",
                DEFAULT_WARNING_MARGIN_MS,
            )),
            session_timeout: Duration::from_millis(env_u64(
                "SESSION_TIMEOUT_MS",
                DEFAULT_SESSION_TIMEOUT_MS,
            )),
            storage_dir: std::env::var("CRM_SESSION_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| default_storage_dir()),
            http_timeout: Duration::from_secs(env_u64(
                "CRM_HTTP_TIMEOUT_SECS",
                DEFAULT_HTTP_TIMEOUT_SECS,
            )),
        }
    }

    /// Countdown shown by the warning dialog: never longer than the margin.
    pub fn dialog_window(&self) -> Duration {
        MAX_DIALOG_WINDOW.min(self.warning_margin)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.into(),
            warning_margin: Duration::from_millis(DEFAULT_WARNING_MARGIN_MS),
            session_timeout: Duration::from_millis(DEFAULT_SESSION_TIMEOUT_MS),
            storage_dir: default_storage_dir(),
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
        }
    }
}

/// `<platform data dir>/crmdesk`, or `./crmdesk` when there is none.
pub fn default_storage_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("crmdesk")
}

fn env_u64(name: &str, default: u64) -> u64 {
    match std::env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(var = name, value = %raw, "ignoring unparsable setting");
            default
        }),
        Err(_) => default,
    }
}
