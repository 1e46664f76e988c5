//! Process-wide settings
//!
//! Loaded from `config/escudo.yaml` when present, then overridden from the
//! environment.

use serde::{Deserialize, Serialize};
use serenity::all::UserId;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

pub const SETTINGS_FILE: &str = "config/escudo.yaml";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Failed to read settings: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid settings file: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid owner id: {0}")]
    InvalidOwnerId(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BotSettings {
    /// Default command prefix for guilds that have not set their own
    pub prefix: String,
    /// Users with owner authority in every guild
    pub owner_ids: Vec<UserId>,
    /// Directory holding the JSON data documents
    pub data_dir: PathBuf,
    /// Name of the text channel antinuke incidents are posted to
    pub log_channel: String,
    pub nightmode_interval_secs: u64,
}

impl Default for BotSettings {
    fn default() -> Self {
        Self {
            prefix: ",".to_string(),
            owner_ids: Vec::new(),
            data_dir: PathBuf::from("data"),
            log_channel: "escudo-logs".to_string(),
            nightmode_interval_secs: 300,
        }
    }
}

impl BotSettings {
    /// Load from [`SETTINGS_FILE`] and the process environment
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be parsed, or an override is
    /// malformed.
    pub async fn load() -> Result<Self, SettingsError> {
        Self::load_from(Path::new(SETTINGS_FILE), |key| std::env::var(key).ok()).await
    }

    /// Load from `path`, applying overrides from `env`
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be parsed, or an override is
    /// malformed.
    pub async fn load_from(
        path: &Path,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, SettingsError> {
        let mut settings = match tokio::fs::read_to_string(path).await {
            Ok(content) => {
                info!(path = %path.display(), "Loaded settings file");
                serde_yaml::from_str(&content)?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "No settings file, using defaults");
                Self::default()
            }
            Err(e) => return Err(e.into()),
        };
        settings.apply_overrides(env)?;
        Ok(settings)
    }

    fn apply_overrides(
        &mut self,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<(), SettingsError> {
        if let Some(prefix) = env("ESCUDO_PREFIX") {
            self.prefix = prefix;
        }
        if let Some(dir) = env("ESCUDO_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(owners) = env("OWNER_IDS") {
            self.owner_ids = owners
                .split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(|id| {
                    id.parse::<u64>()
                        .ok()
                        .filter(|id| *id != 0)
                        .map(UserId::new)
                        .ok_or_else(|| SettingsError::InvalidOwnerId(id.to_string()))
                })
                .collect::<Result<_, _>>()?;
        }
        Ok(())
    }

    #[must_use]
    pub fn is_owner(&self, user_id: UserId) -> bool {
        self.owner_ids.contains(&user_id)
    }
}
