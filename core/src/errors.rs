//! Failures surfaced by the catalog session, and their user-facing wording.

use std::fmt::Write;

use thiserror::Error;

use catalog_gateway::{FetchError, StartError};

/// The last catalog load failed. Cleared by the next successful load.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct CatalogLoadError {
    pub message: String,
    pub status: Option<u16>,
}

impl CatalogLoadError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
        }
    }

    #[must_use]
    pub fn is_auth(&self) -> bool {
        self.status.is_some_and(|s| s == 401 || s == 403) || is_auth_error(&self.message)
    }
}

impl From<&FetchError> for CatalogLoadError {
    fn from(err: &FetchError) -> Self {
        Self {
            message: err.to_string(),
            status: err.status(),
        }
    }
}

impl From<FetchError> for CatalogLoadError {
    fn from(err: FetchError) -> Self {
        Self::from(&err)
    }
}

/// Failure of a request made through a [`crate::CatalogHandle`].
#[derive(Debug, Clone, Error)]
pub enum SessionError {
    #[error("failed to load apps: {0}")]
    Load(#[source] CatalogLoadError),
    #[error(transparent)]
    Start(StartError),
    #[error("catalog session has shut down")]
    Closed,
}

#[must_use]
pub fn is_auth_error(raw: &str) -> bool {
    let lower = raw.to_ascii_lowercase();
    let mentions_token = lower.contains("token")
        || lower.contains("authorization")
        || lower.contains("credential");
    let auth_words = lower.contains("invalid")
        || lower.contains("expired")
        || lower.contains("missing")
        || lower.contains("unauthorized")
        || lower.contains("forbidden");
    let has_code = lower.contains("401") || lower.contains("403");

    (mentions_token && auth_words)
        || (mentions_token && has_code)
        || (has_code && (lower.contains("unauthorized") || lower.contains("forbidden")))
}

/// Render a load failure for the terminal, with a fix hint for auth failures.
#[must_use]
pub fn describe_load_error(err: &CatalogLoadError, config_hint: &str) -> String {
    let mut content = String::from("Failed to load apps.");
    if err.is_auth() {
        let _ = write!(
            content,
            "\n\nThe backend rejected the request as unauthorized.\n\nFix:\n- Set DEMO_CATALOG_TOKEN (env) or add `token` under [backend] in {config_hint}.\n- Then retry."
        );
    }
    let detail = err.message.trim();
    if !detail.is_empty() {
        content.push_str("\n\nDetails: ");
        content.push_str(detail);
    }
    content
}
