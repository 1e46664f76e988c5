use super::{JsonDocument, StoreResult};
use serenity::all::{GuildId, UserId};
use std::collections::BTreeSet;
use std::path::Path;

/// A per-guild set of user ids.
///
/// Backs both the antinuke whitelist and the extra owner list.
#[derive(Debug)]
pub struct UserSetStore {
    document: JsonDocument<BTreeSet<UserId>>,
}

impl UserSetStore {
    pub const WHITELIST_FILE: &'static str = "whitelist.json";
    pub const EXTRA_OWNERS_FILE: &'static str = "extra_owners.json";

    pub async fn open(data_dir: &Path, file_name: &str) -> Self {
        Self {
            document: JsonDocument::open(data_dir.join(file_name), "guilds").await,
        }
    }

    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            document: JsonDocument::in_memory("guilds"),
        }
    }

    #[must_use]
    pub fn contains(&self, guild_id: GuildId, user_id: UserId) -> bool {
        self.document
            .get(guild_id.get())
            .is_some_and(|users| users.contains(&user_id))
    }

    /// Returns `false` if the user was already present
    ///
    /// # Errors
    /// Returns an error if the document cannot be persisted.
    pub async fn add(&self, guild_id: GuildId, user_id: UserId) -> StoreResult<bool> {
        self.document
            .update(guild_id.get(), BTreeSet::new, |users| users.insert(user_id))
            .await
    }

    /// Returns `false` if the user was not present
    ///
    /// # Errors
    /// Returns an error if the document cannot be persisted.
    pub async fn remove(&self, guild_id: GuildId, user_id: UserId) -> StoreResult<bool> {
        Ok(self
            .document
            .update_existing(guild_id.get(), |users| users.remove(&user_id))
            .await?
            .unwrap_or(false))
    }

    /// Clear a guild's set; returns the number of users removed
    ///
    /// # Errors
    /// Returns an error if the document cannot be persisted.
    pub async fn reset(&self, guild_id: GuildId) -> StoreResult<usize> {
        Ok(self
            .document
            .remove(guild_id.get())
            .await?
            .map_or(0, |users| users.len()))
    }

    #[must_use]
    pub fn list(&self, guild_id: GuildId) -> Vec<UserId> {
        self.document
            .get(guild_id.get())
            .map(|users| users.into_iter().collect())
            .unwrap_or_default()
    }
}
