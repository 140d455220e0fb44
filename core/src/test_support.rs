use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use catalog_gateway::{FetchError, Gateway, PollError, StartError};
use catalog_types::{App, StartAck, StatusReport};

/// Scripted in-memory [`Gateway`]. Status replies are queued per app and
/// consumed in order; an app with an empty queue answers with HTTP 500.
#[derive(Default)]
pub(crate) struct FakeGateway {
    state: Mutex<FakeState>,
}

#[derive(Default)]
struct FakeState {
    apps: Vec<App>,
    list_failure: Option<u16>,
    start_rejections: HashMap<String, StartError>,
    statuses: HashMap<String, VecDeque<(Duration, Result<StatusReport, u16>)>>,
    list_calls: usize,
    start_calls: Vec<String>,
    status_calls: Vec<String>,
}

impl FakeGateway {
    pub(crate) fn with_apps(apps: Vec<App>) -> Self {
        let gateway = Self::default();
        gateway.set_apps(apps);
        gateway
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut FakeState) -> R) -> R {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut state)
    }

    pub(crate) fn set_apps(&self, apps: Vec<App>) {
        self.with_state(|s| {
            s.apps = apps;
            s.list_failure = None;
        });
    }

    pub(crate) fn fail_list(&self, status: u16) {
        self.with_state(|s| s.list_failure = Some(status));
    }

    pub(crate) fn reject_start(&self, name: &str, err: StartError) {
        self.with_state(|s| s.start_rejections.insert(name.to_string(), err));
    }

    pub(crate) fn push_status(&self, name: &str, report: StatusReport) {
        self.push_status_after(name, Duration::ZERO, report);
    }

    pub(crate) fn push_status_after(&self, name: &str, delay: Duration, report: StatusReport) {
        self.with_state(|s| {
            s.statuses
                .entry(name.to_string())
                .or_default()
                .push_back((delay, Ok(report)));
        });
    }

    pub(crate) fn push_status_error(&self, name: &str, status: u16) {
        self.with_state(|s| {
            s.statuses
                .entry(name.to_string())
                .or_default()
                .push_back((Duration::ZERO, Err(status)));
        });
    }

    pub(crate) fn list_calls(&self) -> usize {
        self.with_state(|s| s.list_calls)
    }

    pub(crate) fn start_calls(&self) -> Vec<String> {
        self.with_state(|s| s.start_calls.clone())
    }

    pub(crate) fn status_calls(&self) -> Vec<String> {
        self.with_state(|s| s.status_calls.clone())
    }
}

fn status_error(status: u16) -> FetchError {
    FetchError::Status {
        status,
        body: "scripted failure".to_string(),
    }
}

impl Gateway for FakeGateway {
    async fn list_apps(&self) -> Result<Vec<App>, FetchError> {
        self.with_state(|s| {
            s.list_calls += 1;
            match s.list_failure {
                Some(status) => Err(status_error(status)),
                None => Ok(s.apps.clone()),
            }
        })
    }

    async fn app_status(&self, name: &str) -> Result<StatusReport, PollError> {
        let (delay, reply) = self.with_state(|s| {
            s.status_calls.push(name.to_string());
            s.statuses
                .get_mut(name)
                .and_then(VecDeque::pop_front)
                .unwrap_or((Duration::ZERO, Err(500)))
        });
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        reply.map_err(|status| PollError::new(name, status_error(status)))
    }

    async fn start_app(&self, name: &str) -> Result<StartAck, StartError> {
        self.with_state(|s| {
            s.start_calls.push(name.to_string());
            match s.start_rejections.get(name) {
                Some(err) => Err(err.clone()),
                None => Ok(StartAck {
                    success: true,
                    message: Some(format!("Started {name}")),
                }),
            }
        })
    }
}
