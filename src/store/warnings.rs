use super::{JsonDocument, StoreResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serenity::all::{GuildId, UserId};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warning {
    pub id: u32,
    pub moderator_id: UserId,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

/// Warnings keyed by guild, then by user id
#[derive(Debug)]
pub struct WarningStore {
    document: JsonDocument<BTreeMap<u64, Vec<Warning>>>,
}

impl WarningStore {
    pub const FILE_NAME: &'static str = "warnings.json";

    pub async fn open(data_dir: &Path) -> Self {
        Self {
            document: JsonDocument::open(data_dir.join(Self::FILE_NAME), "guilds").await,
        }
    }

    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            document: JsonDocument::in_memory("guilds"),
        }
    }

    /// Append a warning and return its id
    ///
    /// Ids start at 1 per user and follow the highest id still on record, so an
    /// id is never handed out twice while the earlier warning exists.
    ///
    /// # Errors
    /// Returns an error if the document cannot be persisted.
    pub async fn add(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        moderator_id: UserId,
        reason: impl Into<String>,
    ) -> StoreResult<u32> {
        let reason = reason.into();
        self.document
            .update(guild_id.get(), BTreeMap::new, |users| {
                let warnings = users.entry(user_id.get()).or_default();
                let id = warnings.iter().map(|w| w.id).max().unwrap_or(0) + 1;
                warnings.push(Warning {
                    id,
                    moderator_id,
                    reason,
                    timestamp: Utc::now(),
                });
                id
            })
            .await
    }

    #[must_use]
    pub fn list(&self, guild_id: GuildId, user_id: UserId) -> Vec<Warning> {
        self.document
            .get(guild_id.get())
            .and_then(|mut users| users.remove(&user_id.get()))
            .unwrap_or_default()
    }

    /// Remove one warning by id; returns whether it existed
    ///
    /// # Errors
    /// Returns an error if the document cannot be persisted.
    pub async fn remove(&self, guild_id: GuildId, user_id: UserId, id: u32) -> StoreResult<bool> {
        if !self.list(guild_id, user_id).iter().any(|w| w.id == id) {
            return Ok(false);
        }
        Ok(self
            .document
            .update_existing(guild_id.get(), |users| {
                let Some(warnings) = users.get_mut(&user_id.get()) else {
                    return false;
                };
                let before = warnings.len();
                warnings.retain(|w| w.id != id);
                let removed = warnings.len() != before;
                if warnings.is_empty() {
                    users.remove(&user_id.get());
                }
                removed
            })
            .await?
            .unwrap_or(false))
    }

    /// Drop all of a user's warnings; returns `false` if there were none
    ///
    /// # Errors
    /// Returns an error if the document cannot be persisted.
    pub async fn clear(&self, guild_id: GuildId, user_id: UserId) -> StoreResult<bool> {
        if self.list(guild_id, user_id).is_empty() {
            return Ok(false);
        }
        Ok(self
            .document
            .update_existing(guild_id.get(), |users| {
                users.remove(&user_id.get()).is_some()
            })
            .await?
            .unwrap_or(false))
    }
}
