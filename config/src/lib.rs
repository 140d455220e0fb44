//! Configuration loading for the demo catalog.
//!
//! Configuration comes from three layers, highest precedence first:
//!
//! 1. Explicit [`Overrides`] (CLI flags)
//! 2. Environment variables (`DEMO_CATALOG_BACKEND_URL`, `DEMO_CATALOG_TOKEN`)
//! 3. The TOML file at `~/.demo-catalog/config.toml` (or `DEMO_CATALOG_CONFIG`)
//!
//! String values in the file may reference environment variables with
//! `${VAR}` syntax, which keeps tokens out of the file itself.
//!
//! ```toml
//! [backend]
//! url = "http://localhost:8000"
//! token = "${DEMO_CATALOG_TOKEN}"
//! request_timeout_secs = 30
//!
//! [polling]
//! interval_ms = 2000
//!
//! [retry]
//! max_retries = 2
//!
//! [logging]
//! level = "info"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs};

use serde::Deserialize;
use thiserror::Error;
use url::Url;

use catalog_types::BearerToken;

pub const CONFIG_PATH_ENV: &str = "DEMO_CATALOG_CONFIG";
pub const BACKEND_URL_ENV: &str = "DEMO_CATALOG_BACKEND_URL";
pub const TOKEN_ENV: &str = "DEMO_CATALOG_TOKEN";

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2000);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_MAX_RETRIES: u32 = 2;
pub const DEFAULT_RETRY_INITIAL_DELAY: Duration = Duration::from_millis(500);
pub const DEFAULT_RETRY_MAX_DELAY: Duration = Duration::from_secs(8);
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Raw file contents. Every field is optional; see [`Settings`] for the
/// resolved, validated form.
#[derive(Debug, Default, Deserialize)]
pub struct CatalogConfig {
    pub backend: Option<BackendConfig>,
    pub polling: Option<PollingConfig>,
    pub retry: Option<RetryConfig>,
    pub logging: Option<LoggingConfig>,
}

#[derive(Default, Deserialize)]
pub struct BackendConfig {
    pub url: Option<String>,
    pub token: Option<String>,
    pub request_timeout_secs: Option<u64>,
    pub connect_timeout_secs: Option<u64>,
}

// Manual Debug impl to prevent leaking the token in logs.
impl std::fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendConfig")
            .field("url", &self.url)
            .field(
                "token",
                &if self.token.is_some() {
                    "[REDACTED]"
                } else {
                    "None"
                },
            )
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .finish()
    }
}

/// Status polling cadence. One global interval; there is no per-app tuning.
#[derive(Debug, Default, Deserialize)]
pub struct PollingConfig {
    pub interval_ms: Option<u64>,
}

/// Retry policy for idempotent catalog fetches.
#[derive(Debug, Default, Deserialize)]
pub struct RetryConfig {
    pub max_retries: Option<u32>,
    pub initial_delay_ms: Option<u64>,
    pub max_delay_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LoggingConfig {
    /// `tracing` filter directive used when `RUST_LOG` is unset.
    pub level: Option<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error(
        "backend URL is not set; use --backend-url, {BACKEND_URL_ENV}, or [backend] url in the config file"
    )]
    MissingBackendUrl,
    #[error("invalid backend URL '{url}': {source}")]
    InvalidBackendUrl {
        url: String,
        source: url::ParseError,
    },
    #[error("backend URL '{0}' must use http or https")]
    UnsupportedScheme(String),
    #[error("polling interval must be greater than zero")]
    InvalidPollInterval,
}

impl ConfigError {
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            ConfigError::Read { path, .. } | ConfigError::Parse { path, .. } => Some(path),
            _ => None,
        }
    }
}

/// Values supplied by the caller that outrank both env and file.
#[derive(Default)]
pub struct Overrides {
    pub backend_url: Option<String>,
    pub token: Option<String>,
}

impl Overrides {
    /// Fill unset fields from the process environment.
    #[must_use]
    pub fn with_env(self) -> Self {
        self.with_env_keys(BACKEND_URL_ENV, TOKEN_ENV)
    }

    fn with_env_keys(mut self, backend_url_key: &str, token_key: &str) -> Self {
        if self.backend_url.is_none() {
            self.backend_url = non_empty_env(backend_url_key);
        }
        if self.token.is_none() {
            self.token = non_empty_env(token_key);
        }
        self
    }
}

impl std::fmt::Debug for Overrides {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Overrides")
            .field("backend_url", &self.backend_url)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

/// Fully resolved and validated configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    pub backend_url: Url,
    pub token: Option<BearerToken>,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub poll_interval: Duration,
    pub max_retries: u32,
    pub retry_initial_delay: Duration,
    pub retry_max_delay: Duration,
    pub log_level: String,
}

impl Settings {
    pub fn resolve(
        config: Option<&CatalogConfig>,
        overrides: Overrides,
    ) -> Result<Self, ConfigError> {
        let backend = config.and_then(|c| c.backend.as_ref());
        let polling = config.and_then(|c| c.polling.as_ref());
        let retry = config.and_then(|c| c.retry.as_ref());
        let logging = config.and_then(|c| c.logging.as_ref());

        let raw_url = overrides
            .backend_url
            .or_else(|| backend.and_then(|b| b.url.as_deref()).map(expand_env_vars))
            .filter(|url| !url.trim().is_empty())
            .ok_or(ConfigError::MissingBackendUrl)?;
        let backend_url = parse_backend_url(raw_url.trim())?;

        let token = overrides
            .token
            .or_else(|| backend.and_then(|b| b.token.as_deref()).map(expand_env_vars));
        let token = BearerToken::from_optional(token.as_deref());

        let poll_interval = match polling.and_then(|p| p.interval_ms) {
            Some(0) => return Err(ConfigError::InvalidPollInterval),
            Some(ms) => Duration::from_millis(ms),
            None => DEFAULT_POLL_INTERVAL,
        };

        let secs_or = |value: Option<u64>, default: Duration| {
            value
                .filter(|secs| *secs > 0)
                .map_or(default, Duration::from_secs)
        };
        let millis_or = |value: Option<u64>, default: Duration| {
            value.map_or(default, Duration::from_millis)
        };

        Ok(Self {
            backend_url,
            token,
            request_timeout: secs_or(
                backend.and_then(|b| b.request_timeout_secs),
                DEFAULT_REQUEST_TIMEOUT,
            ),
            connect_timeout: secs_or(
                backend.and_then(|b| b.connect_timeout_secs),
                DEFAULT_CONNECT_TIMEOUT,
            ),
            poll_interval,
            max_retries: retry
                .and_then(|r| r.max_retries)
                .unwrap_or(DEFAULT_MAX_RETRIES),
            retry_initial_delay: millis_or(
                retry.and_then(|r| r.initial_delay_ms),
                DEFAULT_RETRY_INITIAL_DELAY,
            ),
            retry_max_delay: millis_or(
                retry.and_then(|r| r.max_delay_ms),
                DEFAULT_RETRY_MAX_DELAY,
            ),
            log_level: logging
                .and_then(|l| l.level.as_deref())
                .map(str::trim)
                .filter(|level| !level.is_empty())
                .unwrap_or(DEFAULT_LOG_LEVEL)
                .to_string(),
        })
    }
}

fn parse_backend_url(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(|source| ConfigError::InvalidBackendUrl {
        url: raw.to_string(),
        source,
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::UnsupportedScheme(raw.to_string()));
    }
    Ok(url)
}

/// Replace `${VAR}` references with the variable's value (empty if unset).
pub fn expand_env_vars(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        let Some(end_rel) = rest[start + 2..].find('}') else {
            break;
        };
        out.push_str(&rest[..start]);
        let var = &rest[start + 2..start + 2 + end_rel];
        if !var.is_empty() {
            out.push_str(&env::var(var).unwrap_or_default());
        }
        rest = &rest[start + 2 + end_rel + 1..];
    }

    out.push_str(rest);
    out
}

impl CatalogConfig {
    /// Load from the default location. `Ok(None)` when no file exists.
    pub fn load() -> Result<Option<Self>, ConfigError> {
        match config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(None),
        }
    }

    /// Load from an explicit path. `Ok(None)` when the file does not exist.
    pub fn load_from(path: &Path) -> Result<Option<Self>, ConfigError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No config file");
            return Ok(None);
        }

        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!("Failed to read config at {:?}: {}", path, err);
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: err,
                });
            }
        };

        match toml::from_str(&content) {
            Ok(config) => Ok(Some(config)),
            Err(err) => {
                tracing::warn!("Failed to parse config at {:?}: {}", path, err);
                Err(ConfigError::Parse {
                    path: path.to_path_buf(),
                    source: err,
                })
            }
        }
    }

    #[must_use]
    pub fn path() -> Option<PathBuf> {
        config_path()
    }
}

/// `DEMO_CATALOG_CONFIG` if set, else `~/.demo-catalog/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    if let Some(explicit) = non_empty_env(CONFIG_PATH_ENV) {
        return Some(PathBuf::from(explicit));
    }
    dirs::home_dir().map(|home| home.join(".demo-catalog").join("config.toml"))
}
