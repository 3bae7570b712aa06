use std::{ffi::OsString, path::PathBuf};

use anyhow::Result;
use bstock_core::{run, ServerConfig, ServerMode};

const DATA_DIR_ENV: &str = "BEACON_DATA_DIR";
const HEADLESS_ENV: &str = "BEACON_HEADLESS";

/// Launches the stdio command server using environment-informed defaults.
pub async fn run_server() -> Result<()> {
    let config = config_from(|key| std::env::var_os(key));

    tracing::info!(
        target: "bstock_daemon",
        data_dir = ?config.data_dir,
        mode = ?config.mode,
        "Starting command server"
    );
    run(config).await
}

/// Builds the server configuration from an environment lookup.
pub fn config_from<F>(lookup: F) -> ServerConfig
where
    F: Fn(&str) -> Option<OsString>,
{
    ServerConfig {
        data_dir: lookup(DATA_DIR_ENV).map(PathBuf::from),
        mode: resolve_mode(lookup(HEADLESS_ENV)),
        ..ServerConfig::default()
    }
}

fn resolve_mode(value: Option<OsString>) -> ServerMode {
    match value {
        Some(value) if value == "1" || value.eq_ignore_ascii_case("true") => ServerMode::Headless,
        _ => ServerMode::Stdio,
    }
}
