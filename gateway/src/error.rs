//! Gateway failure types.
//!
//! Three operations, three propagation policies:
//!
//! | Error | Raised by | Reaches the user |
//! |-------|-----------|------------------|
//! | [`FetchError`] | `list_apps`, `health` | Yes, as a catalog load error |
//! | [`PollError`] | `app_status` | No, logged and dropped |
//! | [`StartError`] | `start_app` | Yes, message shown verbatim |

use thiserror::Error;

/// Fallback shown when the backend rejects a start without explaining why.
pub const DEFAULT_START_ERROR: &str = "Failed to start app";

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("request failed: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("invalid response body: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("invalid app name: {0:?}")]
    InvalidName(String),
}

impl FetchError {
    /// HTTP status when the backend answered with a non-2xx response.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// A single app's status poll failed.
#[derive(Debug, Error)]
#[error("status poll for '{app}' failed: {source}")]
pub struct PollError {
    pub app: String,
    #[source]
    pub source: FetchError,
}

impl PollError {
    #[must_use]
    pub fn new(app: impl Into<String>, source: FetchError) -> Self {
        Self {
            app: app.into(),
            source,
        }
    }
}

/// The backend refused (or could not be asked) to start an app.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct StartError {
    pub message: String,
    /// HTTP status of the rejection, if the backend answered at all.
    pub status: Option<u16>,
}

impl StartError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
        }
    }

    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Extract the user-facing message from a rejection body.
    ///
    /// Precedence: `detail`, then `error`, then [`DEFAULT_START_ERROR`].
    /// Non-JSON bodies and non-string fields fall through to the default.
    #[must_use]
    pub fn from_rejection_body(status: u16, body: &str) -> Self {
        let payload: Option<serde_json::Value> = serde_json::from_str(body).ok();
        let message = payload
            .as_ref()
            .and_then(|json| {
                ["detail", "error"].iter().find_map(|key| {
                    json.get(key)
                        .and_then(serde_json::Value::as_str)
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                })
            })
            .unwrap_or(DEFAULT_START_ERROR);

        Self::new(message).with_status(status)
    }
}
