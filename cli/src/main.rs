//! demo-catalog - browse and start demo apps from the terminal.
//!
//! # Architecture
//!
//! The CLI wires [`catalog_config`] (settings), [`catalog_gateway`] (HTTP
//! backend) and [`catalog_core`] (catalog session) together and renders the
//! published views as plain lines.
//!
//! ```text
//! main() -> Settings::resolve -> HttpGateway -> spawn_session -> CatalogHandle
//!                                                                    |
//!                                                                    v
//!                                                  list | start --wait | watch
//! ```
//!
//! Logs go to stderr so stdout stays parseable.

mod commands;
mod render;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use catalog_config::{CatalogConfig, Overrides, Settings};
use catalog_gateway::{GatewayOptions, HttpGateway, RetryConfig};
use catalog_types::AppName;

use crate::commands::CommandContext;

const DEFAULT_WAIT_SECS: u64 = 600;

#[derive(Parser)]
#[command(name = "demo-catalog", version)]
#[command(about = "Browse and start demo apps", long_about = None)]
struct Cli {
    /// Config file (default: $DEMO_CATALOG_CONFIG or ~/.demo-catalog/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Backend base URL (overrides $DEMO_CATALOG_BACKEND_URL and the config file)
    #[arg(long, global = true, value_name = "URL")]
    backend_url: Option<String>,

    /// Bearer token (overrides $DEMO_CATALOG_TOKEN and the config file)
    #[arg(long, global = true, value_name = "TOKEN")]
    token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List every app with its current state
    List,
    /// Show one app's current state
    Status { name: AppName },
    /// Start an app
    Start {
        name: AppName,
        /// Follow the app until it is running or has stopped
        #[arg(long)]
        wait: bool,
        /// Give up waiting after this many seconds
        #[arg(long, value_name = "N", default_value_t = DEFAULT_WAIT_SECS, requires = "wait")]
        timeout_secs: u64,
    },
    /// Print state changes until Ctrl-C
    Watch {
        /// Reload the whole catalog every N seconds
        #[arg(long, value_name = "N")]
        refresh_secs: Option<u64>,
    },
    /// Probe the backend health endpoint
    Health,
}

fn init_tracing(default_level: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .with(env_filter)
        .init();
}

fn load_settings(cli: &Cli) -> Result<(Settings, String)> {
    let (file, path) = match &cli.config {
        Some(path) => (CatalogConfig::load_from(path)?, Some(path.clone())),
        None => (CatalogConfig::load()?, CatalogConfig::path()),
    };
    let config_hint = path.map_or_else(
        || "~/.demo-catalog/config.toml".to_string(),
        |p| p.display().to_string(),
    );

    let overrides = Overrides {
        backend_url: cli.backend_url.clone(),
        token: cli.token.clone(),
    }
    .with_env();
    let settings = Settings::resolve(file.as_ref(), overrides)
        .with_context(|| format!("invalid configuration (see {config_hint})"))?;
    Ok((settings, config_hint))
}

fn build_gateway(settings: &Settings) -> Result<HttpGateway> {
    let options = GatewayOptions {
        request_timeout: settings.request_timeout,
        connect_timeout: settings.connect_timeout,
        retry: RetryConfig {
            max_retries: settings.max_retries,
            initial_delay: settings.retry_initial_delay,
            max_delay: settings.retry_max_delay,
            ..RetryConfig::default()
        },
    };
    HttpGateway::new(settings.backend_url.clone(), settings.token.clone(), options)
        .context("failed to create backend client")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let (settings, config_hint) = load_settings(&cli)?;
    init_tracing(&settings.log_level);
    tracing::debug!(
        backend = %settings.backend_url,
        has_token = settings.token.is_some(),
        "Settings resolved"
    );

    let ctx = CommandContext {
        gateway: Arc::new(build_gateway(&settings)?),
        poll_interval: settings.poll_interval,
        config_hint,
    };

    match &cli.command {
        Command::List => commands::list(&ctx).await,
        Command::Status { name } => commands::status(&ctx, name).await,
        Command::Start {
            name,
            wait,
            timeout_secs,
        } => commands::start(&ctx, name, *wait, Duration::from_secs(*timeout_secs)).await,
        Command::Watch { refresh_secs } => {
            let refresh = refresh_secs
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs);
            commands::watch(&ctx, refresh).await
        }
        Command::Health => commands::health(&ctx).await,
    }
}
