use std::{fs, path::PathBuf, sync::Arc, time::Duration};

use anyhow::{anyhow, Context, Result};
use bstock_core::{
    bootstrap_with_notifier, notifier::Notifier, CommandExecutor, CommandExecutorError,
    ServerMode,
};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use indicatif::ProgressBar;
use output::{OutputFormat, Renderer};
use progress::spinner;
use serde_json::{json, Value};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Debug, Parser, Clone)]
#[command(
    name = "bstock",
    version,
    about = "Track storefront product pages and get told when B-Stock shows up."
)]
struct Cli {
    /// Preferred renderer for command output.
    #[arg(long, global = true, value_enum)]
    format: Option<OutputFormat>,
    /// Settings file (TOML, YAML or JSON). Defaults to `beacon.toml` in the config directory.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Override the directory holding tracked items and results.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
    /// Disable ANSI colors in CLI output.
    #[arg(long, global = true)]
    no_color: bool,
    /// Suppress non-critical CLI output.
    #[arg(long, global = true)]
    quiet: bool,
    /// Disable progress indicators for long-running tasks.
    #[arg(long, global = true)]
    no_progress: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand, Clone)]
enum Command {
    /// Run the command server over STDIO (JSON-RPC transport).
    Serve,
    /// Start tracking a product page by URL or article ID.
    Add { input: String },
    /// Stop tracking an item.
    Remove { input: String },
    /// Remove several items by identifier.
    Clear {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Report whether a URL or article ID is tracked.
    Tracked { input: String },
    /// List tracked items.
    List,
    /// Show the latest result per item.
    Results,
    /// Check one page, or every tracked item when no input is given.
    Check { input: Option<String> },
    /// Configure automatic checks.
    Schedule {
        #[arg(value_enum)]
        state: Toggle,
        /// Minutes between automatic checks.
        #[arg(long)]
        interval: Option<i64>,
        /// Turn availability notifications on or off.
        #[arg(long, value_enum)]
        notifications: Option<Toggle>,
    },
    /// Set the language of status messages and notifications.
    Language { code: String },
    /// Summarise items, availability and settings.
    Status,
    /// Keep running and check on a timer until interrupted.
    Watch {
        /// Minutes between checks; defaults to the stored interval.
        #[arg(long)]
        interval: Option<u32>,
    },
    /// Inspect and invoke registered commands directly.
    Commands {
        #[command(subcommand)]
        command: RawCommand,
    },
    /// Show recent commands and polls, oldest first.
    Activity {
        /// Maximum number of entries to display (0 = all).
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Generate shell completion scripts.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Debug, Subcommand, Clone)]
enum RawCommand {
    /// List registered commands and their descriptions.
    List,
    /// Execute a command by name with optional JSON arguments.
    Call {
        name: String,
        /// Arguments expressed as JSON (`{"key": "value"}`) or @path to a JSON file.
        #[arg(short, long)]
        arguments: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Toggle {
    On,
    Off,
}

impl Toggle {
    fn enabled(self) -> bool {
        self == Toggle::On
    }
}

impl Cli {
    fn progress_enabled(&self) -> bool {
        !self.quiet && !self.no_progress
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli)?;

    if cli.no_color {
        std::env::set_var("NO_COLOR", "1");
    }

    if let Command::Completions { shell } = &cli.command {
        let mut command = Cli::command();
        clap_complete::generate(*shell, &mut command, "bstock", &mut std::io::stdout());
        return Ok(());
    }

    let settings = settings::load(cli.config.as_deref())?;
    let mut config = settings.server_config(bstock_daemon::config_from(|key| std::env::var_os(key)));
    if let Some(dir) = &cli.data_dir {
        config.data_dir = Some(dir.clone());
    }
    config.mode = match cli.command {
        Command::Serve => ServerMode::Stdio,
        _ => ServerMode::Headless,
    };

    let notifier: Arc<dyn Notifier> = Arc::new(alerts::StderrNotifier::new(cli.quiet));
    let runtime = bootstrap_with_notifier(config, notifier).await?;
    let executor = runtime.executor();
    let renderer = Renderer::new(cli.format.or(settings.format).unwrap_or(OutputFormat::Markdown));

    match &cli.command {
        Command::Serve => runtime.serve().await,
        Command::Completions { .. } => Ok(()),
        Command::Add { input } => {
            run_command(&cli, &renderer, &executor, "add_item", json!({ "input": input })).await
        }
        Command::Remove { input } => {
            run_command(&cli, &renderer, &executor, "remove_item", json!({ "url": input })).await
        }
        Command::Clear { ids } => {
            run_command(&cli, &renderer, &executor, "clear_items", json!({ "ids": ids })).await
        }
        Command::Tracked { input } => {
            run_command(&cli, &renderer, &executor, "is_tracked", json!({ "url": input })).await
        }
        Command::List => run_command(&cli, &renderer, &executor, "list_items", json!({})).await,
        Command::Results => {
            let response = call(&cli, &executor, "list_results", json!({}), None).await?;
            if !cli.quiet {
                renderer.results(&response)?;
            }
            Ok(())
        }
        Command::Check { input } => {
            let (name, arguments, label) = match input {
                Some(input) => ("check_one", json!({ "url": input }), format!("Checking {input}...")),
                None => ("check_all", json!({}), "Checking tracked items...".to_string()),
            };
            let response = call(&cli, &executor, name, arguments, Some(label)).await?;
            if !cli.quiet {
                renderer.command_response(&response)?;
            }
            Ok(())
        }
        Command::Schedule {
            state,
            interval,
            notifications,
        } => {
            let mut arguments = json!({ "enabled": state.enabled() });
            if let Some(minutes) = interval {
                arguments["intervalMinutes"] = json!(minutes);
            }
            if let Some(toggle) = notifications {
                arguments["notificationsEnabled"] = json!(toggle.enabled());
            }
            run_command(&cli, &renderer, &executor, "update_schedule_settings", arguments).await
        }
        Command::Language { code } => {
            run_command(&cli, &renderer, &executor, "set_language", json!({ "language": code }))
                .await
        }
        Command::Status => run_command(&cli, &renderer, &executor, "status", json!({})).await,
        Command::Watch { interval } => {
            info!(target: "bstock_cli", "watching; press Ctrl-C to stop");
            runtime
                .watch(*interval, async {
                    if let Err(error) = tokio::signal::ctrl_c().await {
                        tracing::warn!(target: "bstock_cli", error = %error, "failed to listen for Ctrl-C");
                    }
                })
                .await
        }
        Command::Commands { command } => handle_raw_command(command.clone(), &cli, &renderer, &executor).await,
        Command::Activity { limit } => handle_activity_command(*limit, &cli, &renderer, &executor).await,
    }
}

/// Calls `name` and renders its response unless `--quiet` is set.
async fn run_command(
    cli: &Cli,
    renderer: &Renderer,
    executor: &CommandExecutor,
    name: &str,
    arguments: Value,
) -> Result<()> {
    let response = call(cli, executor, name, arguments, None).await?;
    if !cli.quiet {
        renderer.command_response(&response)?;
    }
    Ok(())
}

async fn call(
    cli: &Cli,
    executor: &CommandExecutor,
    name: &str,
    arguments: Value,
    label: Option<String>,
) -> Result<bstock_core::state::CommandResponse> {
    let spinner = label.and_then(|label| spinner(cli.progress_enabled(), label));
    match executor.call_command(name, arguments).await {
        Ok(response) => {
            finish_spinner(spinner);
            Ok(response)
        }
        Err(error) => {
            finish_spinner(spinner);
            match error {
                CommandExecutorError::Rejected { reason, .. } => Err(anyhow!("{reason}")),
                CommandExecutorError::UnknownCommand(_) => Err(anyhow!("unknown command: {name}")),
                CommandExecutorError::Execution { source, .. } => {
                    Err(source.context(format!("command `{name}` failed")))
                }
            }
        }
    }
}

async fn handle_raw_command(
    command: RawCommand,
    cli: &Cli,
    renderer: &Renderer,
    executor: &CommandExecutor,
) -> Result<()> {
    match command {
        RawCommand::List => {
            let definitions = executor.list_commands().await;
            if cli.quiet {
                return Ok(());
            }
            renderer.command_definitions(&definitions)?;
        }
        RawCommand::Call { name, arguments } => {
            let payload = parse_arguments(arguments)?;
            let response = call(cli, executor, &name, payload, Some(format!("Calling `{name}`..."))).await?;
            if !cli.quiet {
                renderer.command_response(&response)?;
            }
        }
    }

    Ok(())
}

async fn handle_activity_command(
    limit: usize,
    cli: &Cli,
    renderer: &Renderer,
    executor: &CommandExecutor,
) -> Result<()> {
    if cli.quiet {
        return Ok(());
    }

    let entries = executor.context().state.activity.snapshot().await;
    if entries.is_empty() {
        renderer.no_activity()?;
        return Ok(());
    }

    let total = entries.len();
    let start = if limit == 0 {
        0
    } else {
        total.saturating_sub(limit)
    };
    let sliced: Vec<_> = entries.into_iter().skip(start).collect();
    renderer.activity(&sliced)?;
    Ok(())
}

fn init_tracing(cli: &Cli) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,bstock_cli=info"));
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .without_time()
        .with_ansi(!cli.no_color)
        .compact()
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|error| anyhow!("failed to initialize logging: {error}"))
}

fn parse_arguments(arguments: Option<String>) -> Result<Value> {
    match arguments {
        Some(raw) if raw.starts_with('@') => {
            let path = raw.trim_start_matches('@');
            let contents =
                fs::read_to_string(path).with_context(|| format!("failed to read {path}"))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("invalid JSON arguments in {path}"))
        }
        Some(raw) => serde_json::from_str(&raw).context("invalid JSON arguments"),
        None => Ok(Value::Object(serde_json::Map::new())),
    }
}

fn finish_spinner(spinner: Option<ProgressBar>) {
    if let Some(progress) = spinner {
        progress.finish_and_clear();
    }
}

mod settings {
    use std::path::{Path, PathBuf};

    use anyhow::{Context, Result};
    use bstock_core::ServerConfig;
    use config::{Config, Environment, File};
    use directories::ProjectDirs;
    use serde::Deserialize;

    use super::{Duration, OutputFormat};

    const DEFAULT_FILE_NAME: &str = "beacon.toml";
    const ENV_PREFIX: &str = "BEACON";

    /// Values read from the settings file and `BEACON_*` variables.
    #[derive(Debug, Default, Deserialize)]
    #[serde(default)]
    pub struct CliSettings {
        pub data_dir: Option<PathBuf>,
        pub site_url: Option<String>,
        pub request_delay_ms: Option<u64>,
        pub request_timeout_secs: Option<u64>,
        pub format: Option<OutputFormat>,
    }

    impl CliSettings {
        /// Overlays these settings on top of `base`.
        pub fn server_config(&self, base: ServerConfig) -> ServerConfig {
            let mut config = base;
            if let Some(dir) = &self.data_dir {
                config.data_dir = Some(dir.clone());
            }
            if let Some(site) = &self.site_url {
                config.site_base_url = Some(site.clone());
            }
            if let Some(delay) = self.request_delay_ms {
                config.request_delay = Duration::from_millis(delay);
            }
            if let Some(timeout) = self.request_timeout_secs {
                config.request_timeout = Some(Duration::from_secs(timeout));
            }
            config
        }
    }

    fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("de", "BStockBeacon", "bstock-beacon")
            .map(|dirs| dirs.config_dir().join(DEFAULT_FILE_NAME))
    }

    /// An explicit `path` must exist; the default file is optional.
    pub fn load(path: Option<&Path>) -> Result<CliSettings> {
        let mut builder = Config::builder();
        match path {
            Some(path) => builder = builder.add_source(File::from(path.to_path_buf()).required(true)),
            None => {
                if let Some(path) = default_path() {
                    builder = builder.add_source(File::from(path).required(false));
                }
            }
        }

        builder
            .add_source(Environment::with_prefix(ENV_PREFIX))
            .build()
            .context("failed to read settings")?
            .try_deserialize()
            .context("invalid settings")
    }

}

mod alerts {
    use anyhow::Result;
    use async_trait::async_trait;
    use bstock_core::notifier::{Notification, Notifier};
    use tracing::info;

    /// Prints availability alerts to stderr so they show up next to `watch` logs.
    #[derive(Debug, Clone, Copy)]
    pub struct StderrNotifier {
        quiet: bool,
    }

    impl StderrNotifier {
        pub fn new(quiet: bool) -> Self {
            Self { quiet }
        }
    }

    #[async_trait]
    impl Notifier for StderrNotifier {
        async fn notify(&self, notification: &Notification) -> Result<()> {
            info!(
                target: "bstock_cli",
                item = %notification.item_id,
                "notification delivered"
            );
            if !self.quiet {
                eprintln!("🔔 {}: {}", notification.title, notification.message);
                if let Some(url) = &notification.url {
                    eprintln!("   {url}");
                }
            }
            Ok(())
        }
    }
}

mod output {
    use std::fmt::Write;

    use anyhow::Result;
    use bstock_core::state::{ActivityEntry, CommandDefinition, CommandResponse};
    use clap::ValueEnum;
    use serde::Deserialize;
    use serde_json::{self, json, Value};

    #[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum, Deserialize)]
    #[serde(rename_all = "lowercase")]
    pub enum OutputFormat {
        Json,
        Markdown,
        Table,
        Text,
    }

    #[derive(Copy, Clone, Debug)]
    pub struct Renderer {
        format: OutputFormat,
    }

    impl Renderer {
        pub fn new(format: OutputFormat) -> Self {
            Self { format }
        }

        pub fn command_definitions(&self, definitions: &[CommandDefinition]) -> Result<()> {
            match self.format {
                OutputFormat::Json => {
                    let payload = json!({ "commands": definitions });
                    println!("{}", serde_json::to_string_pretty(&payload)?);
                }
                OutputFormat::Markdown => {
                    println!("| Command | Description |");
                    println!("| --- | --- |");
                    for entry in definitions {
                        println!("| `{}` | {} |", entry.name, sanitize(&entry.description));
                    }
                }
                OutputFormat::Table => {
                    let rows: Vec<Vec<String>> = definitions
                        .iter()
                        .map(|entry| {
                            vec![
                                entry.name.clone(),
                                truncate(&sanitize(&entry.description), 80),
                            ]
                        })
                        .collect();
                    render_table(&["Command", "Description"], &rows);
                }
                OutputFormat::Text => {
                    for entry in definitions {
                        println!("• {} — {}", entry.name, entry.description);
                    }
                }
            }
            Ok(())
        }

        pub fn command_response(&self, response: &CommandResponse) -> Result<()> {
            match self.format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(response)?);
                }
                OutputFormat::Markdown => {
                    for content in &response.content {
                        println!("{}", content.text.trim());
                        println!();
                    }
                }
                OutputFormat::Text => {
                    for content in &response.content {
                        println!("{}", strip_markdown(content.text.trim()));
                    }
                }
                OutputFormat::Table => {
                    let rows: Vec<Vec<String>> = response
                        .content
                        .iter()
                        .flat_map(|content| content.text.lines())
                        .map(|line| vec![truncate(&strip_markdown(line), 120)])
                        .collect();
                    render_table(&["Output"], &rows);
                }
            }
            Ok(())
        }

        /// Renders `list_results` metadata as one row per item.
        pub fn results(&self, response: &CommandResponse) -> Result<()> {
            let rows: Vec<&Value> = response
                .metadata
                .as_ref()
                .and_then(|metadata| metadata.get("results"))
                .and_then(Value::as_array)
                .map(|rows| rows.iter().collect())
                .unwrap_or_default();

            let cells: Vec<Vec<String>> = rows.iter().map(|row| result_cells(row)).collect();
            match self.format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&rows)?);
                }
                OutputFormat::Markdown => {
                    println!("| Item | Status | Price | B-Stock | Checked |");
                    println!("| --- | --- | ---: | ---: | --- |");
                    for row in &cells {
                        println!("| {} |", row.join(" | "));
                    }
                }
                OutputFormat::Table => {
                    render_table(&["Item", "Status", "Price", "B-Stock", "Checked"], &cells);
                }
                OutputFormat::Text => {
                    for row in &cells {
                        println!("{} — {} (price {}, B-Stock {}) at {}", row[0], row[1], row[2], row[3], row[4]);
                    }
                }
            }
            Ok(())
        }

        pub fn activity(&self, entries: &[ActivityEntry]) -> Result<()> {
            if self.format == OutputFormat::Json {
                println!("{}", serde_json::to_string_pretty(entries)?);
                return Ok(());
            }

            let rows: Vec<Vec<String>> = entries.iter().map(activity_cells).collect();
            match self.format {
                OutputFormat::Json => {}
                OutputFormat::Markdown => {
                    println!("| Timestamp | Activity | Outcome | Detail |");
                    println!("| --- | --- | --- | --- |");
                    for row in &rows {
                        println!("| {} |", row.join(" | "));
                    }
                }
                OutputFormat::Table => {
                    render_table(&["Timestamp", "Activity", "Outcome", "Detail"], &rows);
                }
                OutputFormat::Text => {
                    for row in &rows {
                        println!("[{}] {} ({}) {}", row[0], row[1], row[2], row[3]);
                    }
                }
            }
            Ok(())
        }

        pub fn no_activity(&self) -> Result<()> {
            match self.format {
                OutputFormat::Json => println!("[]"),
                OutputFormat::Markdown | OutputFormat::Text | OutputFormat::Table => {
                    println!("Nothing recorded yet.");
                }
            }
            Ok(())
        }
    }

    fn activity_cells(entry: &ActivityEntry) -> Vec<String> {
        let timestamp = entry.timestamp().to_string();
        match entry {
            ActivityEntry::Command {
                command,
                latency_ms,
                outcome,
                error,
                ..
            } => vec![
                timestamp,
                format!("`{command}`"),
                format!("{outcome:?}").to_lowercase(),
                error
                    .as_deref()
                    .map_or_else(|| format!("{latency_ms} ms"), sanitize),
            ],
            ActivityEntry::Poll(report) => {
                let mut detail = format!(
                    "{} checked, {} available, {} errors",
                    report.checked, report.available, report.errors
                );
                if report.notified > 0 {
                    let _ = write!(detail, ", {} notified", report.notified);
                }
                if report.abandoned > 0 {
                    let _ = write!(detail, ", {} left unchecked", report.abandoned);
                }
                vec![
                    timestamp,
                    format!("{:?} poll", report.trigger).to_lowercase(),
                    if report.abandoned > 0 { "cancelled" } else { "done" }.to_string(),
                    detail,
                ]
            }
        }
    }

    fn result_cells(row: &Value) -> Vec<String> {
        let text = |value: Option<&Value>| {
            value
                .and_then(Value::as_str)
                .map_or_else(|| "-".to_string(), str::to_string)
        };
        let result = &row["result"];
        let flagged = |field: &str, changed: &str| {
            let mut cell = text(result.get(field));
            if result.get(changed).and_then(Value::as_bool).unwrap_or(false) {
                cell.push_str(" *");
            }
            cell
        };
        vec![
            text(row.get("name").or_else(|| row.get("id"))),
            text(result.get("status")),
            flagged("price", "priceChanged"),
            flagged("bStockPrice", "bStockPriceChanged"),
            text(result.get("timestamp")),
        ]
    }

    fn render_table(headers: &[&str], rows: &[Vec<String>]) {
        let mut widths: Vec<usize> = headers.iter().map(|header| header.chars().count()).collect();
        for row in rows {
            for (idx, cell) in row.iter().enumerate() {
                widths[idx] = widths[idx].max(cell.chars().count());
            }
        }

        fn render_line(columns: &[&str], widths: &[usize]) -> String {
            let mut line = String::new();
            for (idx, value) in columns.iter().enumerate() {
                let width = widths[idx];
                let _ = write!(line, "| {value:width$} ");
            }
            line.push('|');
            line
        }

        println!("{}", render_line(headers, &widths));
        let separator: String = widths
            .iter()
            .map(|width| format!("|{:-^1$}", "", width + 2))
            .collect();
        println!("{separator}|");

        for row in rows {
            let cols: Vec<&str> = row.iter().map(String::as_str).collect();
            println!("{}", render_line(&cols, &widths));
        }
    }

    fn sanitize(value: &str) -> String {
        value
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn strip_markdown(line: &str) -> String {
        line.trim_start_matches('#').trim().replace("**", "").replace('`', "")
    }

    fn truncate(value: &str, max: usize) -> String {
        if value.chars().count() <= max {
            value.to_string()
        } else {
            let mut truncated = value
                .chars()
                .take(max.saturating_sub(1))
                .collect::<String>();
            truncated.push('…');
            truncated
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn result_cells_mark_changed_prices() {
            let row = json!({
                "id": "123456",
                "name": "Harley Benton ST-20",
                "result": {
                    "status": "available",
                    "timestamp": "2026-01-01T10:00:00Z",
                    "price": "199.00",
                    "bStockPrice": "149.00",
                    "priceChanged": false,
                    "bStockPriceChanged": true
                }
            });
            assert_eq!(
                result_cells(&row),
                [
                    "Harley Benton ST-20",
                    "available",
                    "199.00",
                    "149.00 *",
                    "2026-01-01T10:00:00Z"
                ]
            );
        }

        #[test]
        fn activity_rows_describe_polls_and_commands() {
            use bstock_core::{
                services::poller::{PollReport, PollTrigger},
                state::CommandOutcome,
            };
            use time::OffsetDateTime;

            let poll = ActivityEntry::Poll(PollReport {
                trigger: PollTrigger::Scheduled,
                started_at: OffsetDateTime::UNIX_EPOCH,
                checked: 1,
                available: 1,
                errors: 0,
                notified: 1,
                dropped: 0,
                abandoned: 2,
            });
            let cells = activity_cells(&poll);
            assert_eq!(cells[1], "scheduled poll");
            assert_eq!(cells[2], "cancelled");
            assert_eq!(
                cells[3],
                "1 checked, 1 available, 0 errors, 1 notified, 2 left unchecked"
            );

            let rejected = ActivityEntry::Command {
                command: "add_item".to_string(),
                timestamp: OffsetDateTime::UNIX_EPOCH,
                latency_ms: 3,
                outcome: CommandOutcome::Rejected,
                error: Some("This item is already tracked".to_string()),
            };
            let cells = activity_cells(&rejected);
            assert_eq!(cells[1..], ["`add_item`", "rejected", "This item is already tracked"]);
        }

        #[test]
        fn strip_markdown_removes_emphasis_and_headers() {
            assert_eq!(strip_markdown("## **Checked:** `3`"), "Checked: 3");
        }
    }
}

mod progress {
    use std::time::Duration;

    use indicatif::{ProgressBar, ProgressStyle};

    pub fn spinner(message_enabled: bool, message: impl Into<String>) -> Option<ProgressBar> {
        if !message_enabled {
            return None;
        }
        let progress = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        progress.set_style(style);
        progress.set_message(message.into());
        progress.enable_steady_tick(Duration::from_millis(80));
        Some(progress)
    }
}
