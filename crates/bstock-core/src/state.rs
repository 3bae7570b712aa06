use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
    time::Duration,
};

use bstock_client::{
    FactsExtractor, ItemStore, PageFetcher, RegexExtractor, DEFAULT_SITE_BASE_URL,
};
use futures::future::BoxFuture;
use serde::Serialize;
use serde_json::Value;
use time::OffsetDateTime;
use tokio::sync::{Mutex, RwLock};

use crate::{
    notifier::Notifier,
    services::{poller::PollReport, scheduler::SchedulerHandle},
};

/// Timing and addressing knobs for polling.
#[derive(Debug, Clone)]
pub struct PollOptions {
    /// Pause between consecutive items of one poll.
    pub request_delay: Duration,
    /// Delay before the first scheduled poll after the timer is armed.
    pub startup_delay: Duration,
    /// Storefront used to expand bare article ids into URLs.
    pub site_base_url: String,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            request_delay: Duration::from_millis(500),
            startup_delay: Duration::from_secs(6),
            site_base_url: DEFAULT_SITE_BASE_URL.to_string(),
        }
    }
}

#[derive(Clone)]
pub struct AppContext {
    pub fetcher: Arc<dyn PageFetcher>,
    pub extractor: Arc<dyn FactsExtractor>,
    pub store: Arc<ItemStore>,
    pub notifier: Arc<dyn Notifier>,
    pub options: PollOptions,
    pub state: Arc<ServerState>,
    pub commands: Arc<CommandRegistry>,
}

impl AppContext {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        store: ItemStore,
        notifier: Arc<dyn Notifier>,
        options: PollOptions,
    ) -> Self {
        Self {
            fetcher,
            extractor: Arc::new(RegexExtractor),
            store: Arc::new(store),
            notifier,
            options,
            state: Arc::new(ServerState::default()),
            commands: Arc::new(CommandRegistry::default()),
        }
    }
}

#[derive(Default)]
pub struct ServerState {
    /// Held for the duration of a poll so manual and scheduled polls never interleave.
    pub poll_lock: Mutex<()>,
    pub scheduler: Mutex<Option<SchedulerHandle>>,
    pub activity: ActivityLog,
}

/// How a command call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandOutcome {
    Ok,
    /// The user's input was refused; nothing was changed.
    Rejected,
    Failed,
}

/// One line of the activity log: a command call or a finished poll.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ActivityEntry {
    #[serde(rename_all = "camelCase")]
    Command {
        command: String,
        #[serde(with = "time::serde::rfc3339")]
        timestamp: OffsetDateTime,
        latency_ms: u64,
        outcome: CommandOutcome,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    Poll(PollReport),
}

impl ActivityEntry {
    pub fn timestamp(&self) -> OffsetDateTime {
        match self {
            Self::Command { timestamp, .. } => *timestamp,
            Self::Poll(report) => report.started_at,
        }
    }
}

/// Bounded, oldest-first record of what the checker has been doing.
#[derive(Default)]
pub struct ActivityLog {
    entries: Mutex<VecDeque<ActivityEntry>>,
}

impl ActivityLog {
    pub const CAPACITY: usize = 200;

    pub async fn record(&self, entry: ActivityEntry) {
        let mut entries = self.entries.lock().await;
        if entries.len() == Self::CAPACITY {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    pub async fn snapshot(&self) -> Vec<ActivityEntry> {
        self.entries.lock().await.iter().cloned().collect()
    }

    /// Most recent poll still held in the log.
    pub async fn last_poll(&self) -> Option<PollReport> {
        self.entries
            .lock()
            .await
            .iter()
            .rev()
            .find_map(|entry| match entry {
                ActivityEntry::Poll(report) => Some(report.clone()),
                ActivityEntry::Command { .. } => None,
            })
    }
}

#[derive(Clone, Serialize)]
pub struct CommandDefinition {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommandResponse {
    pub content: Vec<CommandContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommandContent {
    pub r#type: String,
    pub text: String,
}

pub type CommandFuture = BoxFuture<'static, anyhow::Result<CommandResponse>>;
pub type CommandHandler =
    Arc<dyn Fn(Arc<AppContext>, serde_json::Value) -> CommandFuture + Send + Sync>;

#[derive(Clone)]
pub struct CommandEntry {
    pub definition: CommandDefinition,
    pub handler: CommandHandler,
}

#[derive(Clone, Default)]
pub struct CommandRegistry {
    inner: Arc<RwLock<HashMap<String, CommandEntry>>>,
}

impl CommandRegistry {
    pub async fn insert(&self, entry: CommandEntry) {
        self.inner
            .write()
            .await
            .insert(entry.definition.name.clone(), entry);
    }

    pub async fn get(&self, name: &str) -> Option<CommandEntry> {
        self.inner.read().await.get(name).cloned()
    }

    pub async fn definitions(&self) -> Vec<CommandDefinition> {
        let mut definitions: Vec<_> = self
            .inner
            .read()
            .await
            .values()
            .map(|entry| entry.definition.clone())
            .collect();
        definitions.sort_by(|a, b| a.name.cmp(&b.name));
        definitions
    }
}

impl CommandResponse {
    #[must_use]
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}
