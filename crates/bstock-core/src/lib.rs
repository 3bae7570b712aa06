use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use bstock_client::{BeaconClient, ClientConfig};
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, info};

pub mod commands;
pub mod executor;
pub mod i18n;
pub mod markdown;
pub mod notifier;
pub mod services;
pub mod state;
pub mod transport;

use notifier::{Notifier, TracingNotifier};
use state::{AppContext, PollOptions};

/// Rejections of user input. The payload is the localized message shown to
/// the user.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InputError {
    #[error("{0}")]
    Empty(&'static str),
    #[error("{0}")]
    Invalid(&'static str),
    #[error("{0}")]
    AlreadyTracked(&'static str),
    #[error("{0}")]
    IntervalTooShort(&'static str),
    #[error("unknown language '{0}'")]
    UnknownLanguage(String),
}

/// Configuration inputs required to bootstrap the checker core.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Optional override for the directory holding the item store.
    pub data_dir: Option<PathBuf>,
    /// Optional override for the storefront bare article ids expand against.
    pub site_base_url: Option<String>,
    /// Pause between consecutive items of one poll.
    pub request_delay: Duration,
    pub request_timeout: Option<Duration>,
    /// Timestamp captured during process initialization for diagnostics.
    pub boot_timestamp: OffsetDateTime,
    pub mode: ServerMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerMode {
    Stdio,
    Headless,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            site_base_url: None,
            request_delay: PollOptions::default().request_delay,
            request_timeout: None,
            boot_timestamp: OffsetDateTime::now_utc(),
            mode: ServerMode::Stdio,
        }
    }
}

#[derive(Clone)]
pub struct CoreRuntime {
    config: ServerConfig,
    executor: executor::CommandExecutor,
}

impl CoreRuntime {
    pub fn executor(&self) -> executor::CommandExecutor {
        self.executor.clone()
    }

    pub fn context(&self) -> Arc<AppContext> {
        self.executor.context()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Arms the scheduler from persisted settings and serves requests until
    /// the transport closes.
    pub async fn serve(&self) -> Result<()> {
        let context = self.executor.context();
        let interval = services::scheduler::restore(&context).await;
        debug!(target: "bstock_core", interval_minutes = ?interval, "scheduler restored");

        let outcome = match self.config.mode {
            ServerMode::Stdio => transport::serve_stdio(self.executor.clone()).await,
            ServerMode::Headless => {
                debug!(target: "bstock_core", "Headless mode: skipping transport loop");
                Ok(())
            }
        };

        services::scheduler::shutdown(&context).await;
        outcome
    }

    /// Runs automatic checks until `shutdown` resolves. The timer is armed
    /// even when the stored settings have automatic checks turned off;
    /// `interval_override` replaces the stored interval.
    pub async fn watch<F>(&self, interval_override: Option<u32>, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()>,
    {
        let context = self.executor.context();
        let minutes = match interval_override {
            Some(minutes) => minutes,
            None => context.store.settings().await.check_interval_minutes,
        };
        let interval = services::scheduler::configure(&context, true, minutes).await;
        info!(target: "bstock_core", interval_minutes = ?interval, "watching tracked items");

        shutdown.await;
        services::scheduler::shutdown(&context).await;
        info!(target: "bstock_core", "watch stopped");
        Ok(())
    }
}

pub async fn bootstrap(config: ServerConfig) -> Result<CoreRuntime> {
    bootstrap_with_notifier(config, Arc::new(TracingNotifier)).await
}

pub async fn bootstrap_with_notifier(
    config: ServerConfig,
    notifier: Arc<dyn Notifier>,
) -> Result<CoreRuntime> {
    let mut client_config = ClientConfig::default();
    if let Some(dir) = &config.data_dir {
        client_config.data_dir = dir.clone();
    }
    if let Some(site) = &config.site_base_url {
        client_config.site_base_url = site.clone();
    }
    if let Some(timeout) = config.request_timeout {
        client_config.request_timeout = timeout;
    }

    let client = BeaconClient::with_config(client_config).context("failed to build HTTP client")?;
    let store = client.open_store().await?;

    debug!(
        target: "bstock_core",
        data_dir = %client.data_dir().display(),
        "BeaconClient initialized"
    );

    let options = PollOptions {
        request_delay: config.request_delay,
        site_base_url: client.config().site_base_url.clone(),
        ..PollOptions::default()
    };
    let context = Arc::new(AppContext::new(Arc::new(client), store, notifier, options));
    commands::register_commands(context.clone()).await;

    info!(
        target: "bstock_core",
        data_dir = ?config.data_dir,
        boot_timestamp = %config.boot_timestamp,
        mode = ?config.mode,
        "Core runtime starting"
    );

    let executor = executor::CommandExecutor::new(context);
    Ok(CoreRuntime { config, executor })
}

pub async fn run(config: ServerConfig) -> Result<()> {
    bootstrap(config).await?.serve().await
}


pub use executor::{CommandExecutor, CommandExecutorError};
