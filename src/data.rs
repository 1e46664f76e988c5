use std::{ops::Deref, sync::Arc};

use crate::moderation::UnmuteTasks;
use crate::settings::BotSettings;
use crate::store::{GuildConfigStore, JoinToCreateRegistry, MuteLedger, UserSetStore, WarningStore};
use crate::voice::Cooldowns;
use dashmap::DashMap;
use serenity::all::{GuildId, UserId};
use tokio::time::Instant;

/// Shared bot state, cheap to clone
#[derive(Debug, Clone)]
pub struct Data(pub Arc<DataInner>);

#[derive(Debug)]
pub struct DataInner {
    pub settings: BotSettings,
    pub guild_configs: GuildConfigStore,
    pub whitelist: UserSetStore,
    pub extra_owners: UserSetStore,
    pub mutes: MuteLedger,
    pub warnings: WarningStore,
    pub join_to_create: JoinToCreateRegistry,
    /// Pending timed unmutes
    pub unmute_tasks: UnmuteTasks,
    /// Join-to-create hub cooldowns
    pub voice_cooldowns: Cooldowns,
    /// Start instants of in-flight commands, keyed by invocation id
    pub command_timings: DashMap<u64, Instant>,
}

impl Deref for Data {
    type Target = DataInner;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Data {
    /// Open every data document under the configured data directory
    pub async fn load(settings: BotSettings) -> Self {
        let dir = settings.data_dir.clone();
        let inner = DataInner {
            guild_configs: GuildConfigStore::open(&dir, settings.prefix.clone()).await,
            whitelist: UserSetStore::open(&dir, UserSetStore::WHITELIST_FILE).await,
            extra_owners: UserSetStore::open(&dir, UserSetStore::EXTRA_OWNERS_FILE).await,
            mutes: MuteLedger::open(&dir).await,
            warnings: WarningStore::open(&dir).await,
            join_to_create: JoinToCreateRegistry::open(&dir).await,
            unmute_tasks: UnmuteTasks::default(),
            voice_cooldowns: Cooldowns::default(),
            command_timings: DashMap::new(),
            settings,
        };
        Self(Arc::new(inner))
    }

    /// State that never touches the disk
    #[must_use]
    pub fn in_memory(settings: BotSettings) -> Self {
        let inner = DataInner {
            guild_configs: GuildConfigStore::in_memory(settings.prefix.clone()),
            whitelist: UserSetStore::in_memory(),
            extra_owners: UserSetStore::in_memory(),
            mutes: MuteLedger::in_memory(),
            warnings: WarningStore::in_memory(),
            join_to_create: JoinToCreateRegistry::in_memory(),
            unmute_tasks: UnmuteTasks::default(),
            voice_cooldowns: Cooldowns::default(),
            command_timings: DashMap::new(),
            settings,
        };
        Self(Arc::new(inner))
    }

    /// Configured owner or an extra owner of this guild
    #[must_use]
    pub fn is_owner(&self, guild_id: GuildId, user_id: UserId) -> bool {
        self.settings.is_owner(user_id) || self.extra_owners.contains(guild_id, user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_owner_sources() {
        let settings = BotSettings {
            owner_ids: vec![UserId::new(1)],
            ..BotSettings::default()
        };
        let data = Data::in_memory(settings);
        let guild = GuildId::new(10);

        assert!(data.is_owner(guild, UserId::new(1)));
        assert!(!data.is_owner(guild, UserId::new(2)));

        data.extra_owners.add(guild, UserId::new(2)).await.unwrap();
        assert!(data.is_owner(guild, UserId::new(2)));
        assert!(!data.is_owner(GuildId::new(11), UserId::new(2)));
    }

    #[tokio::test]
    async fn test_load_creates_nothing_until_written() {
        let dir = tempfile::tempdir().unwrap();
        let settings = BotSettings {
            data_dir: dir.path().to_path_buf(),
            ..BotSettings::default()
        };
        let data = Data::load(settings).await;
        assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());

        data.whitelist
            .add(GuildId::new(1), UserId::new(2))
            .await
            .unwrap();
        assert!(dir.path().join(UserSetStore::WHITELIST_FILE).exists());
    }
}
