//! Persistent item store.
//!
//! [`ItemStore`] is the single owner of the persisted [`StoreDocument`]. Every
//! read-modify-write runs under one mutex and is flushed to disk before the
//! lock is released, so command handlers and the poller never race each other.

pub mod disk;

use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

pub use disk::DiskStore;

use crate::{
    identifier::identifier_or_raw,
    types::{CheckResult, CheckStatus, ResultMap, Settings, StoreDocument, TrackedItem},
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to access store file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to deserialize store file {path:?}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to serialize store document: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("store task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum AddOutcome {
    Added { item: TrackedItem },
    AlreadyTracked { item: TrackedItem },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveOutcome {
    pub removed_ids: Vec<String>,
}

impl RemoveOutcome {
    pub fn removed(&self) -> bool {
        !self.removed_ids.is_empty()
    }
}

/// Items and prior results captured at the start of a poll.
#[derive(Debug, Clone, Default)]
pub struct PollSnapshot {
    pub items: Vec<TrackedItem>,
    pub previous: ResultMap,
}

#[derive(Debug)]
pub struct ItemStore {
    disk: DiskStore,
    document: Mutex<StoreDocument>,
}

impl ItemStore {
    pub const FILE_NAME: &'static str = "state.json";

    /// Loads the document at `path`, starting empty when there is none yet.
    pub async fn open<P: Into<PathBuf>>(path: P) -> Result<Self, StoreError> {
        let disk = DiskStore::new(path);
        let document = disk
            .load::<StoreDocument>()
            .await?
            .map(|entry| entry.value)
            .unwrap_or_default();

        info!(
            target: "bstock_store",
            path = %disk.path().display(),
            items = document.items.len(),
            results = document.results.len(),
            "item store opened"
        );

        Ok(Self {
            disk,
            document: Mutex::new(document),
        })
    }

    pub fn path(&self) -> &Path {
        self.disk.path()
    }

    pub async fn snapshot(&self) -> StoreDocument {
        self.document.lock().await.clone()
    }

    pub async fn items(&self) -> Vec<TrackedItem> {
        self.document.lock().await.items.clone()
    }

    pub async fn results(&self) -> ResultMap {
        self.document.lock().await.results.clone()
    }

    pub async fn settings(&self) -> Settings {
        self.document.lock().await.settings.clone()
    }

    /// Looks an item up by the identifier derived from `input` or by exact URL.
    pub async fn find(&self, input: &str) -> Option<TrackedItem> {
        let id = identifier_or_raw(input);
        let url = input.trim();
        self.document
            .lock()
            .await
            .items
            .iter()
            .find(|item| item.id == id || item.url == url)
            .cloned()
    }

    pub async fn add_item(&self, item: TrackedItem) -> Result<AddOutcome, StoreError> {
        self.mutate(|document| {
            if let Some(existing) = document
                .items
                .iter()
                .find(|tracked| tracked.id == item.id || tracked.url == item.url)
            {
                return AddOutcome::AlreadyTracked {
                    item: existing.clone(),
                };
            }
            document.items.push(item.clone());
            AddOutcome::Added { item }
        })
        .await
    }

    /// Removes every item matching `input` by id or URL together with its results.
    pub async fn remove(&self, input: &str) -> Result<RemoveOutcome, StoreError> {
        let id = identifier_or_raw(input);
        let url = input.trim().to_string();
        self.mutate(move |document| {
            remove_where(document, |item| item.id == id || item.url == url)
        })
        .await
    }

    pub async fn remove_ids(&self, ids: &[String]) -> Result<RemoveOutcome, StoreError> {
        self.mutate(|document| remove_where(document, |item| ids.contains(&item.id)))
            .await
            .map(|outcome| {
                debug!(target: "bstock_store", removed = outcome.removed_ids.len(), "bulk removal");
                outcome
            })
    }

    /// Captures items and results, then marks every item as `checking`.
    pub async fn begin_poll(&self, message: &str) -> Result<PollSnapshot, StoreError> {
        self.mutate(|document| {
            let snapshot = PollSnapshot {
                items: document.items.clone(),
                previous: document.results.clone(),
            };
            for item in &snapshot.items {
                let placeholder = CheckResult::checking(snapshot.previous.get(&item.id), message);
                document.results.insert(item.id.clone(), placeholder);
            }
            snapshot
        })
        .await
    }

    /// Undoes the `checking` placeholders of items a poll never got to.
    /// Each one gets its pre-poll result back, or no result if it had none.
    /// Returns how many placeholders were rolled back.
    pub async fn abandon_poll(
        &self,
        ids: &[String],
        previous: &ResultMap,
    ) -> Result<usize, StoreError> {
        self.mutate(|document| {
            let mut restored = 0;
            for id in ids {
                let pending = document
                    .results
                    .get(id)
                    .is_some_and(|result| result.status == CheckStatus::Checking);
                if !pending {
                    continue;
                }
                match previous.get(id) {
                    Some(result) => {
                        document.results.insert(id.clone(), result.clone());
                    }
                    None => {
                        document.results.remove(id);
                    }
                }
                restored += 1;
            }
            restored
        })
        .await
    }

    /// Stores `result` for `id`. Returns `false` without writing when the item
    /// was removed in the meantime.
    pub async fn put_result(&self, id: &str, result: CheckResult) -> Result<bool, StoreError> {
        let written = self
            .mutate(|document| {
                if !document.items.iter().any(|item| item.id == id) {
                    return false;
                }
                document.results.insert(id.to_string(), result);
                true
            })
            .await?;
        if !written {
            debug!(target: "bstock_store", item = id, "dropping result for untracked item");
        }
        Ok(written)
    }

    /// Sets the display name of an item that does not have one yet.
    pub async fn backfill_name(&self, id: &str, name: &str) -> Result<bool, StoreError> {
        self.mutate(|document| {
            match document
                .items
                .iter_mut()
                .find(|item| item.id == id && item.name.is_none())
            {
                Some(item) => {
                    item.name = Some(name.to_string());
                    true
                }
                None => false,
            }
        })
        .await
    }

    pub async fn update_settings<F>(&self, update: F) -> Result<Settings, StoreError>
    where
        F: FnOnce(&mut Settings),
    {
        self.mutate(|document| {
            update(&mut document.settings);
            document.settings.clone()
        })
        .await
    }

    /// Applies `change` to a copy of the document and commits it only once it
    /// is on disk.
    async fn mutate<R, F>(&self, change: F) -> Result<R, StoreError>
    where
        F: FnOnce(&mut StoreDocument) -> R,
    {
        let mut guard = self.document.lock().await;
        let mut next = guard.clone();
        let output = change(&mut next);
        if next != *guard {
            self.disk.store(next.clone()).await?;
            *guard = next;
        }
        Ok(output)
    }
}

fn remove_where<P>(document: &mut StoreDocument, matches: P) -> RemoveOutcome
where
    P: Fn(&TrackedItem) -> bool,
{
    let (removed, kept): (Vec<_>, Vec<_>) = document.items.drain(..).partition(|item| matches(item));
    document.items = kept;
    for item in &removed {
        document.results.remove(&item.id);
        document.results.remove(&item.url);
    }
    RemoveOutcome {
        removed_ids: removed.into_iter().map(|item| item.id).collect(),
    }
}
