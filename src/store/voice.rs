use super::{JsonDocument, StoreResult};
use serde::{Deserialize, Serialize};
use serenity::all::{ChannelId, GuildId, UserId};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Join-to-create state for one guild
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinToCreateConfig {
    /// The hub voice channel members join to get their own channel
    pub setup_channel: Option<ChannelId>,
    pub category: Option<ChannelId>,
    #[serde(default)]
    pub temp_channels: BTreeSet<ChannelId>,
    /// Temp channel id -> owner
    #[serde(default)]
    pub owners: BTreeMap<u64, UserId>,
}

impl JoinToCreateConfig {
    #[must_use]
    pub fn is_hub(&self, channel_id: ChannelId) -> bool {
        self.setup_channel == Some(channel_id)
    }

    #[must_use]
    pub fn is_temp(&self, channel_id: ChannelId) -> bool {
        self.temp_channels.contains(&channel_id)
    }

    #[must_use]
    pub fn owner_of(&self, channel_id: ChannelId) -> Option<UserId> {
        self.owners.get(&channel_id.get()).copied()
    }
}

#[derive(Debug)]
pub struct JoinToCreateRegistry {
    document: JsonDocument<JoinToCreateConfig>,
}

impl JoinToCreateRegistry {
    pub const FILE_NAME: &'static str = "join_to_create.json";

    pub async fn open(data_dir: &Path) -> Self {
        Self {
            document: JsonDocument::open(data_dir.join(Self::FILE_NAME), "channels").await,
        }
    }

    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            document: JsonDocument::in_memory("channels"),
        }
    }

    /// Read without creating; guilds that never ran setup have no entry
    #[must_use]
    pub fn get(&self, guild_id: GuildId) -> Option<JoinToCreateConfig> {
        self.document.get(guild_id.get())
    }

    /// Point the guild at a hub channel, and optionally a category for temp channels
    ///
    /// # Errors
    /// Returns an error if the document cannot be persisted.
    pub async fn configure(
        &self,
        guild_id: GuildId,
        hub: ChannelId,
        category: Option<ChannelId>,
    ) -> StoreResult<()> {
        self.document
            .update(guild_id.get(), JoinToCreateConfig::default, |config| {
                config.setup_channel = Some(hub);
                if category.is_some() {
                    config.category = category;
                }
            })
            .await
    }

    /// Forget the guild's setup; returns the temp channels that were tracked
    ///
    /// # Errors
    /// Returns an error if the document cannot be persisted.
    pub async fn reset(&self, guild_id: GuildId) -> StoreResult<Vec<ChannelId>> {
        Ok(self
            .document
            .remove(guild_id.get())
            .await?
            .map(|config| config.temp_channels.into_iter().collect())
            .unwrap_or_default())
    }

    /// Track a freshly created temp channel and its owner
    ///
    /// # Errors
    /// Returns an error if the document cannot be persisted.
    pub async fn register_temp(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        owner: UserId,
    ) -> StoreResult<()> {
        self.document
            .update(guild_id.get(), JoinToCreateConfig::default, |config| {
                config.temp_channels.insert(channel_id);
                config.owners.insert(channel_id.get(), owner);
            })
            .await
    }

    /// Stop tracking a temp channel
    ///
    /// # Errors
    /// Returns an error if the document cannot be persisted.
    pub async fn forget_temp(&self, guild_id: GuildId, channel_id: ChannelId) -> StoreResult<bool> {
        Ok(self
            .document
            .update_existing(guild_id.get(), |config| {
                config.owners.remove(&channel_id.get());
                config.temp_channels.remove(&channel_id)
            })
            .await?
            .unwrap_or(false))
    }

    /// Hand a temp channel to a new owner
    ///
    /// # Errors
    /// Returns an error if the document cannot be persisted.
    pub async fn set_owner(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        owner: UserId,
    ) -> StoreResult<()> {
        self.document
            .update(guild_id.get(), JoinToCreateConfig::default, |config| {
                config.owners.insert(channel_id.get(), owner);
            })
            .await
    }
}
