//! Remote app snapshots and the backend's response envelopes.
//!
//! The client never constructs an [`App`] from scratch except as a
//! placeholder for a name it has not seen listed yet; it receives snapshots
//! from the backend and replaces them wholesale.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

use crate::AppState;

/// Deserialize an optional field, degrading any malformed value to `None`.
///
/// The deployment payload is free-form on the remote side, so a wrong type at
/// any level must not make the whole snapshot unreadable.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

/// A deployable demo app as described by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct App {
    /// Unique, stable identifier. Used directly as the catalog key.
    pub name: String,
    #[serde(default, deserialize_with = "lenient")]
    pub description: Option<String>,
    /// Only meaningful while the app is running.
    #[serde(default, deserialize_with = "lenient")]
    pub url: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub active_deployment: Option<ActiveDeployment>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ActiveDeployment {
    #[serde(default, deserialize_with = "lenient")]
    pub status: Option<DeploymentStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeploymentStatus {
    /// Free-form remote state, e.g. `SUCCEEDED`, `PENDING`, `RUNNING`.
    #[serde(default, deserialize_with = "lenient")]
    pub state: Option<String>,
}

impl App {
    /// Placeholder snapshot for a name with no known remote description.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            url: None,
            active_deployment: None,
        }
    }

    /// Snapshot with the given remote deployment state.
    #[must_use]
    pub fn with_deployment_state(mut self, state: impl Into<String>) -> Self {
        self.active_deployment = Some(ActiveDeployment {
            status: Some(DeploymentStatus {
                state: Some(state.into()),
            }),
        });
        self
    }

    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// `active_deployment.status.state`, if every level is present.
    #[must_use]
    pub fn deployment_state(&self) -> Option<&str> {
        self.active_deployment
            .as_ref()?
            .status
            .as_ref()?
            .state
            .as_deref()
    }
}

/// Body of `GET /databricks/apps`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppsList {
    #[serde(default)]
    pub apps: Vec<App>,
}

/// Body of `GET /databricks/apps/{name}/status`.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusReport {
    pub app: App,
    /// Server-asserted state, kept raw so an unknown value can be ignored
    /// instead of failing the whole poll.
    #[serde(default, deserialize_with = "lenient")]
    pub state: Option<String>,
}

impl StatusReport {
    #[must_use]
    pub fn new(app: App, state: Option<AppState>) -> Self {
        Self {
            app,
            state: state.map(|s| s.as_str().to_string()),
        }
    }

    /// The server override, when present and recognised.
    #[must_use]
    pub fn state_override(&self) -> Option<AppState> {
        self.state.as_deref().and_then(|raw| raw.parse().ok())
    }

    /// True when the server sent a state this client does not understand.
    #[must_use]
    pub fn has_unrecognized_override(&self) -> bool {
        self.state.is_some() && self.state_override().is_none()
    }
}

/// Body of a successful `POST /databricks/apps/{name}/start`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StartAck {
    #[serde(default = "default_success")]
    pub success: bool,
    #[serde(default, deserialize_with = "lenient")]
    pub message: Option<String>,
}

const fn default_success() -> bool {
    true
}

impl Default for StartAck {
    fn default() -> Self {
        Self {
            success: true,
            message: None,
        }
    }
}

/// Body of `GET /health`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HealthStatus {
    pub status: String,
}

impl HealthStatus {
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.status.eq_ignore_ascii_case("healthy")
    }
}
