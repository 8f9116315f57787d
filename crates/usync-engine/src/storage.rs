//! Tab-shared storage.
//!
//! A key/value store visible to every tab (execution context) of one
//! process. Writes are last-writer-wins; there is no locking. Every mutation
//! fires a `StorageChange` that carries the writer's `TabId`, so a tab can
//! ignore its own writes the way a browser never delivers a `storage` event
//! to the tab that caused it.

use crate::error::StorageResult;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::broadcast;
use tracing::{debug, trace};
use uuid::Uuid;

/// Identifier of one tab / execution context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TabId(Uuid);

impl TabId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TabId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TabId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Mutation signal.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageChange {
    pub key: String,
    /// Tab that performed the write.
    pub origin: TabId,
    /// New value; `None` when the key was removed.
    pub value: Option<String>,
}

/// Storage shared between tabs.
pub trait TabStorage: Send + Sync {
    fn get(&self, key: &str) -> StorageResult<Option<String>>;
    fn set(&self, origin: TabId, key: &str, value: &str) -> StorageResult<()>;
    fn remove(&self, origin: TabId, key: &str) -> StorageResult<()>;
    fn subscribe(&self) -> broadcast::Receiver<StorageChange>;
}

/// In-process storage, optionally written through to a JSON file.
///
/// The file is read once by `open` and rewritten whole on every mutation, so
/// it must not be shared by two processes: each would overwrite the other's
/// entries and neither would see the other's changes.
pub struct LocalStorage {
    entries: RwLock<HashMap<String, String>>,
    path: Option<PathBuf>,
    changes: broadcast::Sender<StorageChange>,
}

impl LocalStorage {
    /// Volatile storage.
    pub fn in_memory() -> Self {
        Self::with_entries(HashMap::new(), None)
    }

    /// Durable storage backed by `path`. Existing entries are loaded.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            if raw.trim().is_empty() {
                HashMap::new()
            } else {
                serde_json::from_str(&raw)?
            }
        } else {
            HashMap::new()
        };
        debug!(path = %path.display(), entries = entries.len(), "Opened storage");
        Ok(Self::with_entries(entries, Some(path)))
    }

    fn with_entries(entries: HashMap<String, String>, path: Option<PathBuf>) -> Self {
        let (changes, _) = broadcast::channel(64);
        Self {
            entries: RwLock::new(entries),
            path,
            changes,
        }
    }

    /// Write all entries to the backing file (temp file + rename).
    fn flush(&self, entries: &HashMap<String, String>) -> StorageResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, serde_json::to_vec(entries)?)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    fn publish(&self, change: StorageChange) {
        // No receivers is normal when a single tab is open
        if self.changes.send(change).is_err() {
            trace!("No storage listeners");
        }
    }
}

impl TabStorage for LocalStorage {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, origin: TabId, key: &str, value: &str) -> StorageResult<()> {
        {
            let mut entries = self.entries.write();
            let mut next = entries.clone();
            next.insert(key.to_string(), value.to_string());
            // Memory only changes once the file holds the same entries
            self.flush(&next)?;
            *entries = next;
        }
        self.publish(StorageChange {
            key: key.to_string(),
            origin,
            value: Some(value.to_string()),
        });
        Ok(())
    }

    fn remove(&self, origin: TabId, key: &str) -> StorageResult<()> {
        {
            let mut entries = self.entries.write();
            if !entries.contains_key(key) {
                return Ok(());
            }
            let mut next = entries.clone();
            next.remove(key);
            self.flush(&next)?;
            *entries = next;
        }
        self.publish(StorageChange {
            key: key.to_string(),
            origin,
            value: None,
        });
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StorageChange> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_remove() {
        let storage = LocalStorage::in_memory();
        let tab = TabId::new();

        storage.set(tab, "k", "v1").unwrap();
        storage.set(tab, "k", "v2").unwrap();
        assert_eq!(storage.get("k").unwrap().as_deref(), Some("v2"));

        storage.remove(tab, "k").unwrap();
        assert!(storage.get("k").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_changes_carry_origin() {
        let storage = LocalStorage::in_memory();
        let mut rx = storage.subscribe();
        let tab = TabId::new();

        storage.set(tab, "k", "v").unwrap();
        storage.remove(tab, "k").unwrap();

        let set = rx.recv().await.unwrap();
        assert_eq!(set.origin, tab);
        assert_eq!(set.value.as_deref(), Some("v"));

        let removed = rx.recv().await.unwrap();
        assert_eq!(removed.key, "k");
        assert!(removed.value.is_none());
    }

    #[test]
    fn test_remove_missing_key_is_silent() {
        let storage = LocalStorage::in_memory();
        let mut rx = storage.subscribe();

        storage.remove(TabId::new(), "absent").unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_file_backed_survives_reopen() {
        let dir = std::env::temp_dir().join(format!("usync-storage-{}", Uuid::new_v4()));
        let path = dir.join("storage.json");

        let storage = LocalStorage::open(&path).unwrap();
        storage.set(TabId::new(), "usync:user", "{}").unwrap();
        drop(storage);

        let reopened = LocalStorage::open(&path).unwrap();
        assert_eq!(reopened.get("usync:user").unwrap().as_deref(), Some("{}"));

        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn test_failed_write_changes_nothing() {
        let blocker = std::env::temp_dir().join(format!("usync-blocker-{}", Uuid::new_v4()));
        std::fs::write(&blocker, "not a directory").unwrap();
        let storage = LocalStorage::open(blocker.join("storage.json")).unwrap();
        let mut rx = storage.subscribe();

        assert!(storage.set(TabId::new(), "k", "v").is_err());

        assert!(storage.get("k").unwrap().is_none());
        assert!(rx.try_recv().is_err());
        let _ = std::fs::remove_file(blocker);
    }

    #[test]
    fn test_failed_remove_keeps_entry() {
        let dir = std::env::temp_dir().join(format!("usync-storage-{}", Uuid::new_v4()));
        let path = dir.join("storage.json");
        let storage = LocalStorage::open(&path).unwrap();
        let tab = TabId::new();
        storage.set(tab, "k", "v").unwrap();
        let mut rx = storage.subscribe();

        // Replace the directory with a file so the next flush fails
        std::fs::remove_dir_all(&dir).unwrap();
        std::fs::write(&dir, "not a directory").unwrap();

        assert!(storage.remove(tab, "k").is_err());
        assert_eq!(storage.get("k").unwrap().as_deref(), Some("v"));
        assert!(rx.try_recv().is_err());
        let _ = std::fs::remove_file(dir);
    }

    #[test]
    fn test_tab_ids_unique() {
        assert_ne!(TabId::new(), TabId::new());
    }
}
