//! Client-side lifecycle reconciliation for the demo catalog.
//!
//! [`Reconciler`] holds the catalog and applies every state transition;
//! [`spawn_session`] runs one on a task and exposes it through a
//! [`CatalogHandle`].

mod catalog;
pub mod errors;
mod reconciler;
pub mod scheduler;
mod session;

#[cfg(test)]
mod test_support;

pub use catalog::{Catalog, CatalogEntry};
pub use errors::{CatalogLoadError, SessionError, describe_load_error, is_auth_error};
pub use reconciler::Reconciler;
pub use scheduler::{PollScheduler, SchedulerTransition};
pub use session::{CatalogHandle, CatalogView, SessionOptions, spawn_session};
