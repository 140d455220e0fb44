//! Client-side lifecycle state of a catalog app.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::App;

/// Deployment state reported by the remote when an app is up.
const DEPLOYMENT_SUCCEEDED: &str = "SUCCEEDED";
/// Deployment states that mean the app is still coming up.
const DEPLOYMENT_TRANSITIONAL: [&str; 2] = ["PENDING", "RUNNING"];

/// Three-valued lifecycle of an app as shown to the user.
///
/// The wire form (used by the status endpoint's server override) is the
/// lowercase variant name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppState {
    /// Not running.
    #[default]
    Off,
    /// Start requested, or the remote reports a transitional deployment.
    Loading,
    /// Confirmed running; the app URL is usable.
    On,
}

const APP_STATE_VALUES: &[&str] = &["off", "loading", "on"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid app state '{raw}'; expected one of: {expected:?}")]
pub struct AppStateParseError {
    raw: String,
    expected: &'static [&'static str],
}

impl AppStateParseError {
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }
}

impl AppState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            AppState::Off => "off",
            AppState::Loading => "loading",
            AppState::On => "on",
        }
    }

    #[must_use]
    pub const fn is_loading(self) -> bool {
        matches!(self, AppState::Loading)
    }
}

impl fmt::Display for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppState {
    type Err = AppStateParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "off" => Ok(AppState::Off),
            "loading" => Ok(AppState::Loading),
            "on" => Ok(AppState::On),
            other => Err(AppStateParseError {
                raw: other.to_string(),
                expected: APP_STATE_VALUES,
            }),
        }
    }
}

/// Derive the lifecycle state from a remote app snapshot.
///
/// Total: a missing `active_deployment`, `status`, or `state` at any level,
/// or any value other than the recognised ones, yields [`AppState::Off`].
/// The comparison is exact; the remote reports these values in upper case.
#[must_use]
pub fn derive_state(app: &App) -> AppState {
    match app.deployment_state() {
        Some(DEPLOYMENT_SUCCEEDED) => AppState::On,
        Some(state) if DEPLOYMENT_TRANSITIONAL.contains(&state) => AppState::Loading,
        _ => AppState::Off,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app_with_state(state: &str) -> App {
        serde_json::from_value(serde_json::json!({
            "name": "alpha",
            "active_deployment": { "status": { "state": state } }
        }))
        .unwrap()
    }

    #[test]
    fn succeeded_is_on() {
        assert_eq!(derive_state(&app_with_state("SUCCEEDED")), AppState::On);
    }

    #[test]
    fn pending_and_running_are_loading() {
        assert_eq!(derive_state(&app_with_state("PENDING")), AppState::Loading);
        assert_eq!(derive_state(&app_with_state("RUNNING")), AppState::Loading);
    }

    #[test]
    fn terminal_and_unknown_states_are_off() {
        for state in ["CANCELLED", "FAILED", "STOPPED", "", "succeeded", "pending"] {
            assert_eq!(
                derive_state(&app_with_state(state)),
                AppState::Off,
                "state {state:?}"
            );
        }
    }

    #[test]
    fn missing_nested_fields_are_off() {
        let payloads = [
            serde_json::json!({ "name": "a" }),
            serde_json::json!({ "name": "a", "active_deployment": null }),
            serde_json::json!({ "name": "a", "active_deployment": {} }),
            serde_json::json!({ "name": "a", "active_deployment": { "status": null } }),
            serde_json::json!({ "name": "a", "active_deployment": { "status": {} } }),
            serde_json::json!({ "name": "a", "active_deployment": { "status": { "state": null } } }),
        ];
        for payload in payloads {
            let app: App = serde_json::from_value(payload.clone()).unwrap();
            assert_eq!(derive_state(&app), AppState::Off, "payload {payload}");
        }
    }

    #[test]
    fn non_string_state_degrades_to_off() {
        let app: App = serde_json::from_value(serde_json::json!({
            "name": "a",
            "active_deployment": { "status": { "state": 42 } }
        }))
        .unwrap();
        assert_eq!(derive_state(&app), AppState::Off);
    }

    #[test]
    fn parse_wire_values() {
        assert_eq!("off".parse::<AppState>().unwrap(), AppState::Off);
        assert_eq!("loading".parse::<AppState>().unwrap(), AppState::Loading);
        assert_eq!(" on ".parse::<AppState>().unwrap(), AppState::On);

        let err = "starting".parse::<AppState>().unwrap_err();
        assert_eq!(err.raw(), "starting");
    }

    #[test]
    fn serde_uses_lowercase() {
        assert_eq!(
            serde_json::to_string(&AppState::Loading).unwrap(),
            "\"loading\""
        );
        let state: AppState = serde_json::from_str("\"on\"").unwrap();
        assert_eq!(state, AppState::On);
    }
}
