//! Subcommand implementations.

use std::future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at, timeout_at};

use catalog_core::{
    CatalogEntry, CatalogHandle, CatalogView, SessionError, SessionOptions, describe_load_error,
    spawn_session,
};
use catalog_gateway::{Gateway, HttpGateway};
use catalog_types::{AppName, AppState, derive_state};

use crate::render::{catalog_lines, display_name, entry_line, transitions};

/// What every subcommand needs.
pub(crate) struct CommandContext {
    pub(crate) gateway: Arc<HttpGateway>,
    pub(crate) poll_interval: Duration,
    /// Where the user should put settings, for error hints.
    pub(crate) config_hint: String,
}

impl CommandContext {
    fn session(&self) -> CatalogHandle {
        let (handle, _task) = spawn_session(Arc::clone(&self.gateway), SessionOptions {
            poll_interval: self.poll_interval,
            load_on_start: true,
        });
        handle
    }

    async fn loaded_session(&self) -> Result<(CatalogHandle, CatalogView)> {
        let handle = self.session();
        let view = handle
            .wait_until(|view| view.loaded)
            .await
            .context("catalog session ended before the first load")?;
        if let Some(err) = &view.load_error {
            bail!(describe_load_error(err, &self.config_hint));
        }
        Ok((handle, view))
    }
}

pub(crate) async fn list(ctx: &CommandContext) -> Result<()> {
    let (handle, view) = ctx.loaded_session().await?;
    for line in catalog_lines(&view, &ctx.config_hint) {
        println!("{line}");
    }
    handle.shutdown().await;
    Ok(())
}

pub(crate) async fn status(ctx: &CommandContext, name: &AppName) -> Result<()> {
    let report = ctx
        .gateway
        .app_status(name)
        .await
        .with_context(|| format!("failed to fetch status of {name}"))?;
    let state = report
        .state_override()
        .unwrap_or_else(|| derive_state(&report.app));
    println!(
        "{}",
        entry_line(&CatalogEntry {
            app: report.app,
            state,
        })
    );
    Ok(())
}

pub(crate) async fn start(
    ctx: &CommandContext,
    name: &AppName,
    wait: bool,
    wait_timeout: Duration,
) -> Result<()> {
    let (handle, before) = ctx.loaded_session().await?;
    let pretty = display_name(name);

    match handle.start(name.as_str()).await {
        Ok(ack) => match ack.message.as_deref() {
            Some(message) => println!("Starting {pretty}: {message}"),
            None => println!("Starting {pretty}"),
        },
        Err(SessionError::Start(err)) => bail!(err.message),
        Err(err) => return Err(err).context("start request did not complete"),
    }

    if !wait {
        handle.shutdown().await;
        return Ok(());
    }

    let outcome = follow_until_settled(&handle, name, before, Instant::now() + wait_timeout).await;
    handle.shutdown().await;
    let entry = outcome?;
    match entry.state {
        AppState::On => {
            match entry.launch_url() {
                Some(url) => println!("{pretty} is running at {url}"),
                None => println!("{pretty} is running"),
            }
            Ok(())
        }
        AppState::Off | AppState::Loading => {
            bail!("{pretty} stopped before it finished starting")
        }
    }
}

/// Print transitions until `name` leaves `Loading`.
async fn follow_until_settled(
    handle: &CatalogHandle,
    name: &str,
    mut previous: CatalogView,
    deadline: Instant,
) -> Result<CatalogEntry> {
    let mut views = handle.subscribe();
    loop {
        let current = views.borrow_and_update().clone();
        for line in transitions(&previous, &current) {
            println!("{line}");
        }
        match current.get(name) {
            Some(entry) if entry.state.is_loading() => {}
            Some(entry) => return Ok(entry.clone()),
            None => bail!("{name} is no longer listed by the backend"),
        }
        previous = current;

        timeout_at(deadline, views.changed())
            .await
            .with_context(|| format!("timed out waiting for {name} to start"))?
            .context("catalog session ended")?;
    }
}

/// Print every state change until Ctrl-C, reloading the catalog every
/// `refresh` if set.
pub(crate) async fn watch(ctx: &CommandContext, refresh: Option<Duration>) -> Result<()> {
    let (handle, mut previous) = ctx.loaded_session().await?;
    for line in catalog_lines(&previous, &ctx.config_hint) {
        println!("{line}");
    }

    let mut views = handle.subscribe();
    let mut refresh = refresh.map(|period| {
        let mut timer = interval_at(Instant::now() + period, period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        timer
    });
    let interrupted = tokio::signal::ctrl_c();
    tokio::pin!(interrupted);
    loop {
        tokio::select! {
            () = next_refresh(refresh.as_mut()) => {
                if let Err(err) = handle.reload().await {
                    tracing::debug!(error = %err, "Catalog refresh failed");
                }
            }
            changed = views.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = views.borrow_and_update().clone();
                if current.load_error.is_some() && current.load_error != previous.load_error {
                    for line in catalog_lines(&current, &ctx.config_hint) {
                        println!("{line}");
                    }
                }
                for line in transitions(&previous, &current) {
                    println!("{line}");
                }
                previous = current;
            }
            signal = &mut interrupted => {
                signal.context("failed to listen for Ctrl-C")?;
                break;
            }
        }
    }

    handle.shutdown().await;
    Ok(())
}

async fn next_refresh(timer: Option<&mut Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => future::pending().await,
    }
}

pub(crate) async fn health(ctx: &CommandContext) -> Result<()> {
    let health = ctx
        .gateway
        .health()
        .await
        .with_context(|| format!("backend at {} is unreachable", ctx.gateway.base_url()))?;
    if !health.is_healthy() {
        bail!("backend reports status {:?}", health.status);
    }
    println!("{} is {}", ctx.gateway.base_url(), health.status);
    Ok(())
}
