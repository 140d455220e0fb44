//! State transitions for the catalog.
//!
//! Every mutation goes through [`Reconciler`], which re-evaluates the
//! [`PollScheduler`] afterwards so polling runs exactly while some app is
//! loading. The `apply_*` methods fold an already-obtained gateway result and
//! never await; the async wrappers call the gateway and then fold, for callers
//! that do not need concurrency.

use std::time::Duration;

use futures_util::future::join_all;
use tracing::{debug, info, warn};

use catalog_gateway::{FetchError, Gateway, PollError, StartError};
use catalog_types::{App, AppState, StartAck, StatusReport, derive_state};

use crate::catalog::Catalog;
use crate::errors::CatalogLoadError;
use crate::scheduler::{PollScheduler, SchedulerTransition};

#[derive(Debug)]
pub struct Reconciler {
    catalog: Catalog,
    load_error: Option<CatalogLoadError>,
    loaded: bool,
    scheduler: PollScheduler,
}

impl Reconciler {
    #[must_use]
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            catalog: Catalog::default(),
            load_error: None,
            loaded: false,
            scheduler: PollScheduler::new(poll_interval),
        }
    }

    #[inline]
    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    #[inline]
    #[must_use]
    pub fn load_error(&self) -> Option<&CatalogLoadError> {
        self.load_error.as_ref()
    }

    /// Whether at least one catalog load has completed, successfully or not.
    #[inline]
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    #[inline]
    #[must_use]
    pub fn is_polling(&self) -> bool {
        self.scheduler.is_active()
    }

    #[inline]
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        self.scheduler.period()
    }

    #[inline]
    pub fn scheduler_mut(&mut self) -> &mut PollScheduler {
        &mut self.scheduler
    }

    /// Fold a catalog fetch.
    ///
    /// Success replaces every entry and clears the load error. Failure empties
    /// the catalog and records the error.
    pub fn apply_catalog(
        &mut self,
        result: Result<Vec<App>, FetchError>,
    ) -> Result<usize, CatalogLoadError> {
        self.loaded = true;
        let outcome = match result {
            Ok(apps) => {
                self.catalog.replace_all(apps);
                self.load_error = None;
                info!(apps = self.catalog.len(), "Catalog loaded");
                Ok(self.catalog.len())
            }
            Err(err) => {
                warn!(error = %err, "Catalog load failed");
                let load_error = CatalogLoadError::from(&err);
                self.catalog.clear();
                self.load_error = Some(load_error.clone());
                Err(load_error)
            }
        };
        self.after_mutation();
        outcome
    }

    /// Fold a start request.
    ///
    /// Acceptance moves the app to [`AppState::Loading`] whatever it was
    /// before. Rejection leaves the catalog untouched.
    pub fn apply_start(
        &mut self,
        name: &str,
        result: Result<StartAck, StartError>,
    ) -> Result<StartAck, StartError> {
        match &result {
            Ok(ack) => {
                debug!(app = name, message = ack.message.as_deref(), "Marking app loading");
                self.catalog.set_state(name, AppState::Loading);
                self.after_mutation();
            }
            Err(err) => {
                debug!(app = name, status = err.status, error = %err, "Start not applied");
            }
        }
        result
    }

    /// Fold one status report into the catalog.
    ///
    /// The server-asserted state wins when present; otherwise the state is
    /// derived from the snapshot. Returns whether anything changed.
    pub fn reconcile(
        &mut self,
        name: &str,
        mut app: App,
        state_override: Option<AppState>,
    ) -> bool {
        // The catalog key is authoritative; snapshots are stored under it.
        if app.name != name {
            warn!(
                app = name,
                reported = %app.name,
                "Snapshot names a different app; keeping the requested name"
            );
            app.name = name.to_string();
        }
        let state = state_override.unwrap_or_else(|| derive_state(&app));
        let previous = self.catalog.state(name);
        let changed = self.catalog.upsert(name, app, state);
        if changed && previous != Some(state) {
            debug!(app = name, from = ?previous, to = %state, "App state changed");
        }
        self.after_mutation();
        changed
    }

    /// Fold a poll result. Failures are logged and leave the catalog as is.
    pub fn apply_status(&mut self, name: &str, result: Result<StatusReport, PollError>) -> bool {
        match result {
            Ok(report) => {
                let state_override = report.state_override();
                self.reconcile(name, report.app, state_override)
            }
            Err(err) => {
                warn!(app = name, error = %err, "Status poll failed; will retry on next tick");
                false
            }
        }
    }

    pub async fn load_catalog<G: Gateway>(
        &mut self,
        gateway: &G,
    ) -> Result<usize, CatalogLoadError> {
        let result = gateway.list_apps().await;
        self.apply_catalog(result)
    }

    pub async fn request_start<G: Gateway>(
        &mut self,
        gateway: &G,
        name: &str,
    ) -> Result<StartAck, StartError> {
        let result = gateway.start_app(name).await;
        self.apply_start(name, result)
    }

    /// Poll every loading app concurrently and fold the results.
    ///
    /// Returns how many apps were polled.
    pub async fn poll_once<G: Gateway>(&mut self, gateway: &G) -> usize {
        let names = self.catalog.loading_names();
        let results = join_all(names.iter().map(|name| gateway.app_status(name))).await;
        for (name, result) in names.iter().zip(results) {
            self.apply_status(name, result);
        }
        names.len()
    }

    fn after_mutation(&mut self) {
        match self.scheduler.reevaluate(self.catalog.has_loading()) {
            SchedulerTransition::Started => {
                debug!(period = ?self.scheduler.period(), "Status polling started");
            }
            SchedulerTransition::Stopped => debug!("Status polling stopped"),
            SchedulerTransition::Unchanged => {}
        }
    }
}
