use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::sync_client::RetryPolicy;

pub const DEFAULT_CONFIG_FILE: &str = "market_sync.json";
pub const DEFAULT_STORE_PATH: &str = "data/market_history.db";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 500;
const DEFAULT_RETRY_MAX_DELAY_MS: u64 = 8_000;

pub const ENV_WEBHOOK_URL: &str = "MARKET_SYNC_WEBHOOK_URL";
pub const ENV_STORE_PATH: &str = "MARKET_SYNC_STORE_PATH";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Sqlite,
    Csv,
}

impl StoreKind {
    pub fn infer_from_path(path: &Path) -> Self {
        let is_csv = path
            .extension()
            .and_then(|s| s.to_str())
            .map(|s| s.eq_ignore_ascii_case("csv"))
            .unwrap_or(false);
        if is_csv {
            StoreKind::Csv
        } else {
            StoreKind::Sqlite
        }
    }
}

/// On-disk config; every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfigFile {
    pub webhook_url: Option<String>,
    pub store_path: Option<String>,
    pub store_kind: Option<StoreKind>,
    pub request_timeout_secs: Option<u64>,
    pub max_attempts: Option<u32>,
    pub retry_base_delay_ms: Option<u64>,
    pub retry_max_delay_ms: Option<u64>,
}

/// Values given on the command line; they win over file and environment.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub config_path: Option<PathBuf>,
    pub store_path: Option<PathBuf>,
    pub store_kind: Option<StoreKind>,
    pub webhook_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub webhook_url: Option<String>,
    pub store_path: PathBuf,
    pub store_kind: StoreKind,
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
}

fn non_empty(raw: Option<String>) -> Option<String> {
    raw.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

pub fn read_config_file(path: &Path) -> Result<AppConfigFile, String> {
    let text = fs::read_to_string(path)
        .map_err(|e| format!("read config {} failed: {e}", path.to_string_lossy()))?;
    serde_json::from_str(&text)
        .map_err(|e| format!("invalid config {}: {e}", path.to_string_lossy()))
}

impl AppConfig {
    /// defaults ← file ← environment ← overrides.
    pub fn resolve<F>(overrides: &ConfigOverrides, env: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let file = match &overrides.config_path {
            Some(path) => read_config_file(path)?,
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.is_file() {
                    read_config_file(default_path)?
                } else {
                    AppConfigFile::default()
                }
            }
        };
        Self::from_layers(file, overrides, env)
    }

    pub fn from_layers<F>(
        file: AppConfigFile,
        overrides: &ConfigOverrides,
        env: F,
    ) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let webhook_url = non_empty(overrides.webhook_url.clone())
            .or_else(|| non_empty(env(ENV_WEBHOOK_URL)))
            .or_else(|| non_empty(file.webhook_url));

        let store_path = overrides
            .store_path
            .clone()
            .or_else(|| non_empty(env(ENV_STORE_PATH)).map(PathBuf::from))
            .or_else(|| non_empty(file.store_path).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STORE_PATH));

        let store_kind = overrides
            .store_kind
            .or(file.store_kind)
            .unwrap_or_else(|| StoreKind::infer_from_path(&store_path));

        let timeout_secs = file
            .request_timeout_secs
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS);
        if timeout_secs == 0 {
            return Err("request_timeout_secs must be at least 1".to_string());
        }
        let max_attempts = file.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS);
        if max_attempts == 0 {
            return Err("max_attempts must be at least 1".to_string());
        }
        let base_delay_ms = file.retry_base_delay_ms.unwrap_or(DEFAULT_RETRY_BASE_DELAY_MS);
        let max_delay_ms = file
            .retry_max_delay_ms
            .unwrap_or(DEFAULT_RETRY_MAX_DELAY_MS)
            .max(base_delay_ms);

        Ok(Self {
            webhook_url,
            store_path,
            store_kind,
            request_timeout: Duration::from_secs(timeout_secs),
            retry: RetryPolicy {
                max_attempts,
                base_delay: Duration::from_millis(base_delay_ms),
                max_delay: Duration::from_millis(max_delay_ms),
            },
        })
    }

    pub fn require_webhook_url(&self) -> Result<&str, String> {
        self.webhook_url.as_deref().ok_or_else(|| {
            format!("webhook url is required: set webhook_url in the config file or {ENV_WEBHOOK_URL}")
        })
    }
}
