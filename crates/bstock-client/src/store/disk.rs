use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};
use time::OffsetDateTime;
use tokio::{fs, task};
use tracing::debug;

use super::StoreError;
use crate::types::StoredEntry;

/// A single JSON document on disk, wrapped in a [`StoredEntry`] envelope.
#[derive(Debug)]
pub struct DiskStore {
    path: PathBuf,
}

impl DiskStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load<T>(&self) -> Result<Option<StoredEntry<T>>, StoreError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let path = self.path.clone();
        if !fs::try_exists(&path).await.map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })? {
            return Ok(None);
        }

        let data = fs::read(&path).await.map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })?;
        if data.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }

        // Bare documents (no envelope) are accepted for hand-edited files.
        let entry = task::spawn_blocking(move || {
            match serde_json::from_slice::<StoredEntry<T>>(&data) {
                Ok(entry) => Ok(entry),
                Err(_) => serde_json::from_slice::<T>(&data)
                    .map(|value| StoredEntry {
                        value,
                        stored_at: OffsetDateTime::UNIX_EPOCH,
                    })
                    .map_err(|source| StoreError::Corrupt { path, source }),
            }
        })
        .await??;

        Ok(Some(entry))
    }

    /// Writes through a sibling temp file so a crash never leaves a torn document.
    pub async fn store<T>(&self, value: T) -> Result<(), StoreError>
    where
        T: Serialize + Send + 'static,
    {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|source| StoreError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        let entry = StoredEntry {
            value,
            stored_at: OffsetDateTime::now_utc(),
        };
        let payload = task::spawn_blocking(move || serde_json::to_vec_pretty(&entry)).await??;

        let staging = self.path.with_extension("json.tmp");
        fs::write(&staging, payload)
            .await
            .map_err(|source| StoreError::Io {
                path: staging.clone(),
                source,
            })?;
        fs::rename(&staging, &self.path)
            .await
            .map_err(|source| StoreError::Io {
                path: self.path.clone(),
                source,
            })?;

        debug!(target: "bstock_store", file = ?self.path, "wrote store document");
        Ok(())
    }
}
