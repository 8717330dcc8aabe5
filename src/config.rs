use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

const DEFAULT_BASE_URL: &str = "http://localhost:8000";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_NOTIFICATION_TTL_SECS: u64 = 3;
/// Upper bound for any configured duration.
const MAX_SECS: u64 = 24 * 60 * 60;

/// Runtime settings for the client, read from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_base_url: String,
    pub request_timeout: Duration,
    pub notification_ttl: Duration,
    pub credentials_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            notification_ttl: Duration::from_secs(DEFAULT_NOTIFICATION_TTL_SECS),
            credentials_path: default_credentials_path(),
        }
    }
}

impl Config {
    /// Reads `SUPPORT_*` variables. Call `dotenvy::dotenv()` first to pick up
    /// a `.env` file.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let api_base_url = lookup("SUPPORT_API_BASE_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty())
            .unwrap_or(defaults.api_base_url);

        let request_timeout = secs(&lookup, "SUPPORT_REQUEST_TIMEOUT_SECS")
            .unwrap_or(defaults.request_timeout);
        let notification_ttl = secs(&lookup, "SUPPORT_NOTIFICATION_TTL_SECS")
            .unwrap_or(defaults.notification_ttl);

        let credentials_path = lookup("SUPPORT_CREDENTIALS_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.credentials_path);

        Self { api_base_url, request_timeout, notification_ttl, credentials_path }
    }
}

fn secs(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<Duration> {
    let raw = lookup(key)?;
    match raw.trim().parse::<u64>() {
        Ok(n) if (1..=MAX_SECS).contains(&n) => Some(Duration::from_secs(n)),
        Ok(n) => {
            warn!("Ignoring {key}={n}: must be between 1 and {MAX_SECS} seconds");
            None
        }
        Err(e) => {
            warn!("Ignoring {key}={raw:?}: {e}");
            None
        }
    }
}

fn default_credentials_path() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("smart-support").join("auth.json"))
        .unwrap_or_else(|| PathBuf::from("auth.json"))
}
