//! Core domain types for the demo catalog.
//!
//! This crate contains pure domain types with no IO, no async, and minimal dependencies.
//! Everything here can be used from any layer of the application.

// Pedantic lint configuration - these are intentional design choices
#![allow(clippy::missing_errors_doc)] // Result-returning functions are self-explanatory

mod app;
mod name;
mod state;
mod token;

pub use app::{
    ActiveDeployment, App, AppsList, DeploymentStatus, HealthStatus, StartAck, StatusReport,
};
pub use name::{AppName, EmptyAppNameError};
pub use state::{AppState, AppStateParseError, derive_state};
pub use token::{BearerToken, EmptyTokenError};
