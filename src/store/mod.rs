//! Per-guild JSON document persistence
//!
//! Every concern (guild configuration, whitelist, mutes, ...) lives in its own
//! JSON file shaped as `{"<root>": {"<guild_id>": {...}}}`. Documents are held in
//! memory and rewritten in full after each mutation. Updates are applied as
//! closures under the entry's lock, so two handlers touching the same guild never
//! overwrite each other's changes.

mod config;
mod error;
mod members;
mod mutes;
mod voice;
mod warnings;

pub use config::{AntinukeSettings, GuildConfig, GuildConfigStore, NightmodeSettings};
pub use error::{StoreError, StoreResult};
pub use members::UserSetStore;
pub use mutes::{MuteLedger, MuteRecord};
pub use voice::{JoinToCreateConfig, JoinToCreateRegistry};
pub use warnings::{Warning, WarningStore};

use dashmap::DashMap;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{info, warn};

/// In-memory view of a JSON document keyed by guild id
pub struct JsonDocument<T> {
    root: &'static str,
    path: Option<PathBuf>,
    entries: DashMap<u64, T>,
    write_lock: Mutex<()>,
}

impl<T> std::fmt::Debug for JsonDocument<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonDocument")
            .field("root", &self.root)
            .field("path", &self.path)
            .field("entries", &self.entries.len())
            .finish()
    }
}

/// Result of parsing a document file
struct Parsed<T> {
    entries: Vec<(u64, T)>,
    /// Entries (or the whole file) that could not be read
    rejected: usize,
}

impl<T> JsonDocument<T>
where
    T: Clone + Serialize + DeserializeOwned + Send + Sync,
{
    /// Create a document that is never written to disk
    #[must_use]
    pub fn in_memory(root: &'static str) -> Self {
        Self {
            root,
            path: None,
            entries: DashMap::new(),
            write_lock: Mutex::new(()),
        }
    }

    /// Open a document backed by `path`.
    ///
    /// Entries are read one by one and an unreadable entry is skipped. If anything
    /// was skipped the file is copied to `<path>.bak` first, since the next
    /// mutation rewrites it with the entries that did load.
    pub async fn open(path: impl Into<PathBuf>, root: &'static str) -> Self {
        let path = path.into();
        let document = Self {
            root,
            path: Some(path.clone()),
            entries: DashMap::new(),
            write_lock: Mutex::new(()),
        };

        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "No data document yet, starting empty");
                return document;
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read data document, starting empty");
                return document;
            }
        };

        let parsed = Self::parse(&content, root);
        if parsed.rejected > 0 {
            let backup = backup_path(&path);
            match tokio::fs::copy(&path, &backup).await {
                Ok(_) => warn!(
                    path = %path.display(),
                    backup = %backup.display(),
                    rejected = parsed.rejected,
                    "Data document had unreadable entries, kept a backup"
                ),
                Err(e) => warn!(
                    path = %path.display(),
                    error = %e,
                    "Could not back up data document"
                ),
            }
        }
        for (guild_id, value) in parsed.entries {
            document.entries.insert(guild_id, value);
        }
        info!(
            path = %path.display(),
            guilds = document.entries.len(),
            "Loaded data document"
        );
        document
    }

    fn parse(content: &str, root: &str) -> Parsed<T> {
        let section = match serde_json::from_str::<Value>(content) {
            Ok(Value::Object(mut document)) => document.remove(root),
            Ok(_) => {
                warn!(root, "Data document is not a JSON object");
                return Parsed { entries: Vec::new(), rejected: 1 };
            }
            Err(e) => {
                warn!(root, error = %e, "Corrupt data document");
                return Parsed { entries: Vec::new(), rejected: 1 };
            }
        };

        let section = match section {
            None | Some(Value::Null) => serde_json::Map::new(),
            Some(Value::Object(section)) => section,
            Some(_) => {
                warn!(root, "Data document section is not an object");
                return Parsed { entries: Vec::new(), rejected: 1 };
            }
        };

        let mut parsed = Parsed {
            entries: Vec::with_capacity(section.len()),
            rejected: 0,
        };
        for (key, value) in section {
            let Ok(guild_id) = key.parse::<u64>() else {
                warn!(key = %key, "Skipping entry with a non-numeric guild id");
                parsed.rejected += 1;
                continue;
            };
            match serde_json::from_value::<T>(value) {
                Ok(value) => parsed.entries.push((guild_id, value)),
                Err(e) => {
                    warn!(guild_id, error = %e, "Skipping unreadable entry");
                    parsed.rejected += 1;
                }
            }
        }
        parsed
    }

    /// Get a clone of the value stored for a guild
    #[must_use]
    pub fn get(&self, guild_id: u64) -> Option<T> {
        self.entries.get(&guild_id).map(|entry| entry.value().clone())
    }

    /// Clones of every entry
    #[must_use]
    pub fn entries(&self) -> Vec<(u64, T)> {
        self.entries
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect()
    }

    /// Get the value for a guild, inserting and persisting `default` on a miss
    ///
    /// # Errors
    /// Returns an error if the document cannot be persisted after insertion.
    pub async fn get_or_create(
        &self,
        guild_id: u64,
        default: impl FnOnce() -> T,
    ) -> StoreResult<T> {
        let (value, created) = {
            let mut created = false;
            let entry = self.entries.entry(guild_id).or_insert_with(|| {
                created = true;
                default()
            });
            (entry.value().clone(), created)
        };

        if created {
            self.persist().await?;
        }
        Ok(value)
    }

    /// Atomically mutate a guild's entry, creating it from `default` if needed
    ///
    /// # Errors
    /// Returns an error if the document cannot be persisted.
    pub async fn update<R>(
        &self,
        guild_id: u64,
        default: impl FnOnce() -> T,
        mutate: impl FnOnce(&mut T) -> R,
    ) -> StoreResult<R> {
        let result = {
            let mut entry = self.entries.entry(guild_id).or_insert_with(default);
            mutate(entry.value_mut())
        };

        self.persist().await?;
        Ok(result)
    }

    /// Atomically mutate an existing entry; returns `None` without writing if the
    /// guild has no entry
    ///
    /// # Errors
    /// Returns an error if the document cannot be persisted.
    pub async fn update_existing<R>(
        &self,
        guild_id: u64,
        mutate: impl FnOnce(&mut T) -> R,
    ) -> StoreResult<Option<R>> {
        let result = self
            .entries
            .get_mut(&guild_id)
            .map(|mut entry| mutate(entry.value_mut()));

        if result.is_some() {
            self.persist().await?;
        }
        Ok(result)
    }

    /// Remove a guild's entry
    ///
    /// # Errors
    /// Returns an error if the document cannot be persisted.
    pub async fn remove(&self, guild_id: u64) -> StoreResult<Option<T>> {
        let removed = self.entries.remove(&guild_id).map(|(_, value)| value);
        if removed.is_some() {
            self.persist().await?;
        }
        Ok(removed)
    }

    /// Write the whole document to disk
    async fn persist(&self) -> StoreResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        // Snapshot under the write lock so the file always reflects the latest state
        let _guard = self.write_lock.lock().await;
        let section: BTreeMap<String, T> = self
            .entries
            .iter()
            .map(|entry| (entry.key().to_string(), entry.value().clone()))
            .collect();
        let mut document = BTreeMap::new();
        document.insert(self.root, section);
        let json = serde_json::to_string_pretty(&document)?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(path, json).await?;
        Ok(())
    }
}

fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".bak");
    PathBuf::from(name)
}
