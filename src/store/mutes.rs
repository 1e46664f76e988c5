use super::{JsonDocument, StoreResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serenity::all::{GuildId, UserId};
use std::collections::BTreeMap;
use std::path::Path;

/// An active mute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MuteRecord {
    pub moderator_id: UserId,
    pub reason: String,
    pub created_at: DateTime<Utc>,
    /// `None` for a permanent mute
    pub expire_at: Option<DateTime<Utc>>,
}

impl MuteRecord {
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expire_at.is_some_and(|expire_at| expire_at <= now)
    }
}

/// Mute records keyed by guild, then by user id
#[derive(Debug)]
pub struct MuteLedger {
    document: JsonDocument<BTreeMap<u64, MuteRecord>>,
}

impl MuteLedger {
    pub const FILE_NAME: &'static str = "mutes.json";

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

    /// Record a mute, replacing any previous record for the pair
    ///
    /// # Errors
    /// Returns an error if the document cannot be persisted.
    pub async fn add(&self, guild_id: GuildId, user_id: UserId, record: MuteRecord) -> StoreResult<()> {
        self.document
            .update(guild_id.get(), BTreeMap::new, |records| {
                records.insert(user_id.get(), record);
            })
            .await
    }

    #[must_use]
    pub fn get(&self, guild_id: GuildId, user_id: UserId) -> Option<MuteRecord> {
        self.document
            .get(guild_id.get())
            .and_then(|records| records.get(&user_id.get()).cloned())
    }

    /// Whether the user is muted right now
    ///
    /// # Errors
    /// Returns an error if an expired record cannot be deleted.
    pub async fn is_muted(&self, guild_id: GuildId, user_id: UserId) -> StoreResult<bool> {
        self.is_muted_at(guild_id, user_id, Utc::now()).await
    }

    /// Whether the user is muted at `now`. An expired record is deleted on sight.
    ///
    /// # Errors
    /// Returns an error if an expired record cannot be deleted.
    pub async fn is_muted_at(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let Some(record) = self.get(guild_id, user_id) else {
            return Ok(false);
        };
        if record.is_expired_at(now) {
            self.remove(guild_id, user_id).await?;
            return Ok(false);
        }
        Ok(true)
    }

    /// Delete a record; returns whether one existed
    ///
    /// # Errors
    /// Returns an error if the document cannot be persisted.
    pub async fn remove(&self, guild_id: GuildId, user_id: UserId) -> StoreResult<bool> {
        if self.get(guild_id, user_id).is_none() {
            return Ok(false);
        }
        Ok(self
            .document
            .update_existing(guild_id.get(), |records| {
                records.remove(&user_id.get()).is_some()
            })
            .await?
            .unwrap_or(false))
    }

    /// Every record in a guild
    #[must_use]
    pub fn records_in(&self, guild_id: GuildId) -> Vec<(UserId, MuteRecord)> {
        self.document
            .get(guild_id.get())
            .map(|records| {
                records
                    .into_iter()
                    .map(|(user_id, record)| (UserId::new(user_id), record))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Every record that carries an expiry, across all guilds
    #[must_use]
    pub fn timed_records(&self) -> Vec<(GuildId, UserId, DateTime<Utc>)> {
        self.document
            .entries()
            .into_iter()
            .flat_map(|(guild_id, records)| {
                records.into_iter().filter_map(move |(user_id, record)| {
                    record
                        .expire_at
                        .map(|expire_at| (GuildId::new(guild_id), UserId::new(user_id), expire_at))
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(expire_at: Option<DateTime<Utc>>) -> MuteRecord {
        MuteRecord {
            moderator_id: UserId::new(1),
            reason: "spam".to_string(),
            created_at: Utc::now(),
            expire_at,
        }
    }

    #[tokio::test]
    async fn test_lazy_expiry_deletes_record() {
        let ledger = MuteLedger::in_memory();
        let guild = GuildId::new(5);
        let user = UserId::new(50);
        let past = Utc::now() - Duration::seconds(1);

        ledger.add(guild, user, record(Some(past))).await.unwrap();
        assert!(ledger.get(guild, user).is_some());

        assert!(!ledger.is_muted(guild, user).await.unwrap());
        assert!(ledger.get(guild, user).is_none());
    }

    #[tokio::test]
    async fn test_permanent_and_future_mutes_are_active() {
        let ledger = MuteLedger::in_memory();
        let guild = GuildId::new(5);
        let future = Utc::now() + Duration::minutes(10);

        ledger.add(guild, UserId::new(1), record(None)).await.unwrap();
        ledger
            .add(guild, UserId::new(2), record(Some(future)))
            .await
            .unwrap();

        assert!(ledger.is_muted(guild, UserId::new(1)).await.unwrap());
        assert!(ledger.is_muted(guild, UserId::new(2)).await.unwrap());
        // Observed after the expiry passes
        assert!(
            !ledger
                .is_muted_at(guild, UserId::new(2), future + Duration::seconds(1))
                .await
                .unwrap()
        );
        assert!(ledger.is_muted(guild, UserId::new(1)).await.unwrap());
    }

    #[tokio::test]
    async fn test_timed_records_lists_only_expiring_mutes() {
        let ledger = MuteLedger::in_memory();
        let future = Utc::now() + Duration::hours(1);
        ledger
            .add(GuildId::new(1), UserId::new(10), record(None))
            .await
            .unwrap();
        ledger
            .add(GuildId::new(2), UserId::new(20), record(Some(future)))
            .await
            .unwrap();

        let timed = ledger.timed_records();
        assert_eq!(timed, vec![(GuildId::new(2), UserId::new(20), future)]);
        assert_eq!(ledger.records_in(GuildId::new(1)).len(), 1);
    }

    #[tokio::test]
    async fn test_remove_missing_record() {
        let ledger = MuteLedger::in_memory();
        assert!(!ledger.remove(GuildId::new(1), UserId::new(1)).await.unwrap());
    }
}
