use super::{JsonDocument, StoreResult};
use serde::{Deserialize, Serialize};
use serenity::all::{ChannelId, GuildId, RoleId};
use std::collections::BTreeSet;
use std::path::Path;

pub const DEFAULT_PREFIX: &str = ",";

/// Antinuke toggle for a guild
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AntinukeSettings {
    pub enabled: bool,
}

impl Default for AntinukeSettings {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Nightmode window, in local wall-clock hours
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NightmodeSettings {
    pub enabled: bool,
    pub start_hour: u32,
    pub end_hour: u32,
}

impl Default for NightmodeSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            start_hour: 22,
            end_hour: 6,
        }
    }
}

impl NightmodeSettings {
    /// Whether channels should be locked at `hour`.
    ///
    /// A window whose start is after its end wraps past midnight; equal bounds
    /// cover the whole day.
    #[must_use]
    pub fn is_active_at(&self, hour: u32) -> bool {
        if !self.enabled {
            return false;
        }
        if self.start_hour < self.end_hour {
            self.start_hour <= hour && hour < self.end_hour
        } else {
            hour >= self.start_hour || hour < self.end_hour
        }
    }
}

/// Per-guild settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildConfig {
    #[serde(default = "default_prefix")]
    pub prefix: String,
    #[serde(default)]
    pub mod_roles: BTreeSet<RoleId>,
    #[serde(default)]
    pub admin_roles: BTreeSet<RoleId>,
    #[serde(default)]
    pub muted_role: Option<RoleId>,
    #[serde(default)]
    pub ignored_channels: BTreeSet<ChannelId>,
    #[serde(default)]
    pub media_channels: BTreeSet<ChannelId>,
    #[serde(default)]
    pub antinuke: AntinukeSettings,
    #[serde(default)]
    pub nightmode: NightmodeSettings,
}

fn default_prefix() -> String {
    DEFAULT_PREFIX.to_string()
}

impl Default for GuildConfig {
    fn default() -> Self {
        Self::with_prefix(DEFAULT_PREFIX)
    }
}

impl GuildConfig {
    #[must_use]
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            mod_roles: BTreeSet::new(),
            admin_roles: BTreeSet::new(),
            muted_role: None,
            ignored_channels: BTreeSet::new(),
            media_channels: BTreeSet::new(),
            antinuke: AntinukeSettings::default(),
            nightmode: NightmodeSettings::default(),
        }
    }
}

/// Guild configuration documents, created lazily with defaults
#[derive(Debug)]
pub struct GuildConfigStore {
    document: JsonDocument<GuildConfig>,
    default_prefix: String,
}

impl GuildConfigStore {
    pub const FILE_NAME: &'static str = "server_config.json";

    pub async fn open(data_dir: &Path, default_prefix: impl Into<String>) -> Self {
        Self {
            document: JsonDocument::open(data_dir.join(Self::FILE_NAME), "guilds").await,
            default_prefix: default_prefix.into(),
        }
    }

    #[must_use]
    pub fn in_memory(default_prefix: impl Into<String>) -> Self {
        Self {
            document: JsonDocument::in_memory("guilds"),
            default_prefix: default_prefix.into(),
        }
    }

    fn defaults(&self) -> GuildConfig {
        GuildConfig::with_prefix(self.default_prefix.clone())
    }

    /// Get a guild's config, creating and persisting the defaults on first access
    ///
    /// # Errors
    /// Returns an error if a freshly created config cannot be persisted.
    pub async fn get(&self, guild_id: GuildId) -> StoreResult<GuildConfig> {
        self.document
            .get_or_create(guild_id.get(), || self.defaults())
            .await
    }

    /// Read a guild's config without creating it
    #[must_use]
    pub fn peek(&self, guild_id: GuildId) -> Option<GuildConfig> {
        self.document.get(guild_id.get())
    }

    /// Prefix for a guild, falling back to the global default
    #[must_use]
    pub fn prefix_for(&self, guild_id: Option<GuildId>) -> String {
        guild_id
            .and_then(|id| self.peek(id))
            .map_or_else(|| self.default_prefix.clone(), |config| config.prefix)
    }

    /// Atomically modify a guild's config
    ///
    /// # Errors
    /// Returns an error if the document cannot be persisted.
    pub async fn update<R>(
        &self,
        guild_id: GuildId,
        mutate: impl FnOnce(&mut GuildConfig) -> R,
    ) -> StoreResult<R> {
        self.document
            .update(guild_id.get(), || self.defaults(), mutate)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nightmode_wrapping_window() {
        let window = NightmodeSettings {
            enabled: true,
            start_hour: 22,
            end_hour: 6,
        };
        assert!(window.is_active_at(23));
        assert!(window.is_active_at(2));
        assert!(window.is_active_at(22));
        assert!(!window.is_active_at(6));
        assert!(!window.is_active_at(10));
    }

    #[test]
    fn test_nightmode_plain_and_degenerate_windows() {
        let daytime = NightmodeSettings {
            enabled: true,
            start_hour: 9,
            end_hour: 17,
        };
        assert!(daytime.is_active_at(9));
        assert!(daytime.is_active_at(16));
        assert!(!daytime.is_active_at(17));
        assert!(!daytime.is_active_at(3));

        // Equal bounds lock all day
        let always = NightmodeSettings {
            enabled: true,
            start_hour: 4,
            end_hour: 4,
        };
        assert!((0..24).all(|hour| always.is_active_at(hour)));

        let disabled = NightmodeSettings::default();
        assert!((0..24).all(|hour| !disabled.is_active_at(hour)));
    }

    #[tokio::test]
    async fn test_default_config_is_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let store = GuildConfigStore::open(dir.path(), ",").await;

        let config = store.get(GuildId::new(42)).await.unwrap();
        assert_eq!(config.prefix, ",");
        assert!(config.antinuke.enabled);
        assert!(!config.nightmode.enabled);
        assert_eq!(config.nightmode.start_hour, 22);
        assert_eq!(config.nightmode.end_hour, 6);
        assert!(config.muted_role.is_none());

        let raw = std::fs::read_to_string(dir.path().join(GuildConfigStore::FILE_NAME)).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed["guilds"]["42"]["prefix"], ",");
        assert_eq!(parsed["guilds"]["42"]["antinuke"]["enabled"], true);
    }

    #[tokio::test]
    async fn test_prefix_falls_back_to_default() {
        let store = GuildConfigStore::in_memory("!");
        assert_eq!(store.prefix_for(None), "!");
        assert_eq!(store.prefix_for(Some(GuildId::new(7))), "!");
        // peeking must not have created anything
        assert!(store.peek(GuildId::new(7)).is_none());

        store
            .update(GuildId::new(7), |config| config.prefix = "?".to_string())
            .await
            .unwrap();
        assert_eq!(store.prefix_for(Some(GuildId::new(7))), "?");
    }

    #[tokio::test]
    async fn test_concurrent_role_updates_are_not_lost() {
        let store = std::sync::Arc::new(GuildConfigStore::in_memory(","));
        let guild = GuildId::new(1);

        let mut handles = Vec::new();
        for id in 1..=20u64 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .update(guild, |config| config.mod_roles.insert(RoleId::new(id)))
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.get(guild).await.unwrap().mod_roles.len(), 20);
    }

    #[tokio::test]
    async fn test_partial_configs_load_without_wiping_others() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(GuildConfigStore::FILE_NAME);
        std::fs::write(
            &path,
            r#"{"guilds": {
                "1": {"prefix": "!", "antinuke": {"enabled": false}},
                "2": {"mod_roles": [55]}
            }}"#,
        )
        .unwrap();

        let store = GuildConfigStore::open(dir.path(), ",").await;
        let first = store.peek(GuildId::new(1)).unwrap();
        assert_eq!(first.prefix, "!");
        assert!(!first.antinuke.enabled);
        let second = store.peek(GuildId::new(2)).unwrap();
        assert_eq!(second.prefix, DEFAULT_PREFIX);
        assert!(second.mod_roles.contains(&RoleId::new(55)));

        store
            .update(GuildId::new(3), |config| config.prefix = "?".to_string())
            .await
            .unwrap();
        let reloaded = GuildConfigStore::open(dir.path(), ",").await;
        assert_eq!(reloaded.prefix_for(Some(GuildId::new(1))), "!");
        assert!(reloaded.peek(GuildId::new(2)).is_some());
        assert_eq!(reloaded.prefix_for(Some(GuildId::new(3))), "?");
    }
}
