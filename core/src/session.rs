//! The catalog session: one task owning the [`Reconciler`].
//!
//! All catalog mutations happen on the session task, one at a time. Gateway
//! calls run concurrently as futures owned by that task; their results come
//! back as completions and are folded in completion order. Observers get a
//! [`CatalogView`] snapshot over a `watch` channel after every change.
//!
//! A poll is tagged with the app's start epoch when it is issued. Accepting a
//! start bumps the epoch, so a poll that was in flight across a restart cannot
//! overwrite the freshly set `Loading` state with what it saw before.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use futures_util::future::BoxFuture;
use futures_util::stream::FuturesUnordered;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use catalog_gateway::{FetchError, Gateway, PollError, StartError};
use catalog_types::{App, AppState, StartAck, StatusReport};

use crate::catalog::CatalogEntry;
use crate::errors::{CatalogLoadError, SessionError};
use crate::reconciler::Reconciler;

const COMMAND_BUFFER: usize = 32;

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub poll_interval: Duration,
    /// Issue a catalog load as soon as the session starts.
    pub load_on_start: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            load_on_start: true,
        }
    }
}

/// Point-in-time copy of everything an observer can see.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogView {
    pub entries: Vec<CatalogEntry>,
    pub load_error: Option<CatalogLoadError>,
    /// False until the first catalog load completes.
    pub loaded: bool,
    pub polling: bool,
    /// Bumped on every published change.
    pub revision: u64,
}

impl CatalogView {
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&CatalogEntry> {
        self.entries.iter().find(|entry| entry.app.name == name)
    }

    #[must_use]
    pub fn state(&self, name: &str) -> Option<AppState> {
        self.get(name).map(|entry| entry.state)
    }

    #[must_use]
    pub fn loading_count(&self) -> usize {
        self.entries.iter().filter(|e| e.state.is_loading()).count()
    }

    fn of(reconciler: &Reconciler, revision: u64) -> Self {
        Self {
            entries: reconciler.catalog().entries().to_vec(),
            load_error: reconciler.load_error().cloned(),
            loaded: reconciler.is_loaded(),
            polling: reconciler.is_polling(),
            revision,
        }
    }
}

enum Command {
    Reload {
        reply: oneshot::Sender<Result<usize, CatalogLoadError>>,
    },
    Start {
        name: String,
        reply: oneshot::Sender<Result<StartAck, StartError>>,
    },
    Shutdown,
}

enum Completion {
    Catalog {
        result: Result<Vec<App>, FetchError>,
        reply: Option<oneshot::Sender<Result<usize, CatalogLoadError>>>,
    },
    Start {
        name: String,
        result: Result<StartAck, StartError>,
        reply: oneshot::Sender<Result<StartAck, StartError>>,
    },
    Status {
        name: String,
        epoch: u64,
        result: Result<StatusReport, PollError>,
    },
}

enum Event {
    Command(Option<Command>),
    Tick,
    Completed(Completion),
}

/// Cloneable front end to a running session.
#[derive(Debug, Clone)]
pub struct CatalogHandle {
    commands: mpsc::Sender<Command>,
    view: watch::Receiver<CatalogView>,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Reload { .. } => f.write_str("Reload"),
            Command::Start { name, .. } => f.debug_struct("Start").field("name", name).finish(),
            Command::Shutdown => f.write_str("Shutdown"),
        }
    }
}

impl CatalogHandle {
    /// Fetch the catalog again and wait for it to be folded.
    pub async fn reload(&self) -> Result<usize, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Reload { reply }).await?;
        rx.await
            .map_err(|_| SessionError::Closed)?
            .map_err(SessionError::Load)
    }

    /// Ask the backend to start `name` and wait for the answer.
    ///
    /// On success the app is already `Loading` in the published view.
    pub async fn start(&self, name: impl Into<String>) -> Result<StartAck, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Start {
            name: name.into(),
            reply,
        })
        .await?;
        rx.await
            .map_err(|_| SessionError::Closed)?
            .map_err(SessionError::Start)
    }

    #[must_use]
    pub fn view(&self) -> CatalogView {
        self.view.borrow().clone()
    }

    /// A receiver that is notified on every published change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<CatalogView> {
        self.view.clone()
    }

    /// Wait until the published view satisfies `predicate`.
    ///
    /// Checks the current view first.
    pub async fn wait_until<F>(&self, mut predicate: F) -> Result<CatalogView, SessionError>
    where
        F: FnMut(&CatalogView) -> bool,
    {
        let mut rx = self.view.clone();
        let view = rx
            .wait_for(|view| predicate(view))
            .await
            .map_err(|_| SessionError::Closed)?;
        Ok(view.clone())
    }

    /// Stop the session. In-flight requests are abandoned.
    pub async fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown).await;
    }

    async fn send(&self, command: Command) -> Result<(), SessionError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| SessionError::Closed)
    }
}

/// Spawn a session on the current runtime.
///
/// The task ends on [`CatalogHandle::shutdown`] or once every handle is
/// dropped.
pub fn spawn_session<G: Gateway>(
    gateway: Arc<G>,
    options: SessionOptions,
) -> (CatalogHandle, JoinHandle<()>) {
    let (commands_tx, commands_rx) = mpsc::channel(COMMAND_BUFFER);
    let (view_tx, view_rx) = watch::channel(CatalogView::default());

    let session = CatalogSession {
        gateway,
        reconciler: Reconciler::new(options.poll_interval),
        commands: commands_rx,
        view: view_tx,
        in_flight: FuturesUnordered::new(),
        start_epochs: HashMap::new(),
        ticks: 0,
    };
    let task = tokio::spawn(session.run(options.load_on_start));

    (
        CatalogHandle {
            commands: commands_tx,
            view: view_rx,
        },
        task,
    )
}

struct CatalogSession<G> {
    gateway: Arc<G>,
    reconciler: Reconciler,
    commands: mpsc::Receiver<Command>,
    view: watch::Sender<CatalogView>,
    in_flight: FuturesUnordered<BoxFuture<'static, Completion>>,
    start_epochs: HashMap<String, u64>,
    ticks: u64,
}

impl<G: Gateway> CatalogSession<G> {
    async fn run(mut self, load_on_start: bool) {
        debug!(period = ?self.reconciler.poll_interval(), "Catalog session started");
        if load_on_start {
            self.issue_load(None);
        }

        loop {
            let event = tokio::select! {
                command = self.commands.recv() => Event::Command(command),
                () = self.reconciler.scheduler_mut().tick() => Event::Tick,
                Some(done) = self.in_flight.next(), if !self.in_flight.is_empty() => {
                    Event::Completed(done)
                }
            };

            match event {
                Event::Command(None | Some(Command::Shutdown)) => break,
                Event::Command(Some(command)) => self.handle_command(command),
                Event::Tick => self.issue_polls(),
                Event::Completed(done) => self.fold(done),
            }
        }

        if !self.in_flight.is_empty() {
            debug!(abandoned = self.in_flight.len(), "Dropping in-flight requests");
        }
        info!(ticks = self.ticks, "Catalog session stopped");
    }

    fn handle_command(&mut self, command: Command) {
        debug!(?command, "Session command");
        match command {
            Command::Reload { reply } => self.issue_load(Some(reply)),
            Command::Start { name, reply } => {
                let gateway = Arc::clone(&self.gateway);
                self.in_flight.push(Box::pin(async move {
                    let result = gateway.start_app(&name).await;
                    Completion::Start {
                        name,
                        result,
                        reply,
                    }
                }));
            }
            Command::Shutdown => {}
        }
    }

    fn issue_load(&mut self, reply: Option<oneshot::Sender<Result<usize, CatalogLoadError>>>) {
        let gateway = Arc::clone(&self.gateway);
        self.in_flight.push(Box::pin(async move {
            let result = gateway.list_apps().await;
            Completion::Catalog { result, reply }
        }));
    }

    fn issue_polls(&mut self) {
        self.ticks += 1;
        let names = self.reconciler.catalog().loading_names();
        debug!(tick = self.ticks, apps = names.len(), "Polling loading apps");

        for name in names {
            let epoch = self.epoch(&name);
            let gateway = Arc::clone(&self.gateway);
            self.in_flight.push(Box::pin(async move {
                let result = gateway.app_status(&name).await;
                Completion::Status {
                    name,
                    epoch,
                    result,
                }
            }));
        }
    }

    /// Apply a finished request, publish, then answer the caller, so a
    /// caller woken by the reply already sees the new view.
    fn fold(&mut self, done: Completion) {
        match done {
            Completion::Catalog { result, reply } => {
                let outcome = self.reconciler.apply_catalog(result);
                self.publish();
                if let Some(reply) = reply {
                    let _ = reply.send(outcome);
                }
            }
            Completion::Start {
                name,
                result,
                reply,
            } => {
                let outcome = self.reconciler.apply_start(&name, result);
                if outcome.is_ok() {
                    *self.start_epochs.entry(name).or_default() += 1;
                }
                self.publish();
                let _ = reply.send(outcome);
            }
            Completion::Status {
                name,
                epoch,
                result,
            } => {
                let current = self.epoch(&name);
                if epoch < current {
                    debug!(app = %name, epoch, current, "Dropping poll issued before restart");
                    return;
                }
                if self.reconciler.apply_status(&name, result) {
                    self.publish();
                }
            }
        }
    }

    fn epoch(&self, name: &str) -> u64 {
        self.start_epochs.get(name).copied().unwrap_or(0)
    }

    fn publish(&self) {
        let reconciler = &self.reconciler;
        self.view.send_if_modified(|current| {
            let next = CatalogView::of(reconciler, current.revision);
            if *current == next {
                return false;
            }
            *current = CatalogView {
                revision: current.revision + 1,
                ..next
            };
            true
        });
    }
}
