//! Role-based mutes with timed expiry, and channel locks

mod duration;
pub mod lock;
mod tasks;

pub use duration::{DurationError, MAX_MUTE, format_duration, parse_duration};
pub use tasks::UnmuteTasks;

use crate::gateway::{GatewayError, RoleBlueprint, SharedGateway};
use crate::store::{MuteRecord, StoreError};
use crate::{CONSOLE_TARGET, Data};
use chrono::{DateTime, Utc};
use serenity::all::{GuildId, PermissionOverwriteType, Permissions, RoleId, UserId};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Name of the role looked up (or created) when no mute role is configured
pub const MUTE_ROLE_NAME: &str = "Muted";

#[derive(Debug, Error)]
pub enum ModerationError {
    #[error("User is already muted")]
    AlreadyMuted,

    #[error("User is not muted")]
    NotMuted,

    #[error(transparent)]
    InvalidDuration(#[from] DurationError),

    #[error("Could not set up the mute role: {0}")]
    MuteRoleUnavailable(GatewayError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type ModerationResult<T> = Result<T, ModerationError>;

/// A mute to apply
#[derive(Debug, Clone)]
pub struct MuteRequest {
    pub guild_id: GuildId,
    pub user_id: UserId,
    pub moderator_id: UserId,
    /// `None` mutes until manually unmuted
    pub duration: Option<Duration>,
    pub reason: String,
}

/// Applies and lifts mutes, keeping the ledger and the unmute tasks in step
#[derive(Clone)]
pub struct MuteService {
    data: Data,
    gateway: SharedGateway,
}

impl MuteService {
    #[must_use]
    pub fn new(data: Data, gateway: SharedGateway) -> Self {
        Self { data, gateway }
    }

    /// The configured mute role, or one named [`MUTE_ROLE_NAME`], without creating it
    async fn existing_mute_role(&self, guild_id: GuildId) -> ModerationResult<Option<RoleId>> {
        let config = self.data.guild_configs.get(guild_id).await?;
        if let Some(role_id) = config.muted_role {
            if self.gateway.role_exists(guild_id, role_id).await? {
                return Ok(Some(role_id));
            }
        }
        Ok(self
            .gateway
            .find_role_by_name(guild_id, MUTE_ROLE_NAME)
            .await?)
    }

    /// Find or create the guild's mute role and remember it in the config
    ///
    /// # Errors
    /// Returns [`ModerationError::MuteRoleUnavailable`] if the role cannot be created.
    pub async fn resolve_mute_role(&self, guild_id: GuildId) -> ModerationResult<RoleId> {
        let configured = self.data.guild_configs.get(guild_id).await?.muted_role;
        let role_id = match self.existing_mute_role(guild_id).await? {
            Some(role_id) => role_id,
            None => self.create_mute_role(guild_id).await?,
        };
        if configured != Some(role_id) {
            self.data
                .guild_configs
                .update(guild_id, |config| config.muted_role = Some(role_id))
                .await?;
        }
        Ok(role_id)
    }

    async fn create_mute_role(&self, guild_id: GuildId) -> ModerationResult<RoleId> {
        let role_id = self
            .gateway
            .create_role(
                guild_id,
                &RoleBlueprint::named(MUTE_ROLE_NAME),
                "ESCUDO: mute role setup",
            )
            .await
            .map_err(ModerationError::MuteRoleUnavailable)?;

        // Only channels that exist right now get the overwrite
        let channels = self.gateway.all_channels(guild_id).await.unwrap_or_else(|e| {
            warn!(guild_id = %guild_id, error = %e, "Could not list channels for mute role");
            Vec::new()
        });
        let deny = Permissions::SEND_MESSAGES | Permissions::SPEAK | Permissions::ADD_REACTIONS;
        for channel_id in channels {
            if let Err(e) = self
                .gateway
                .set_overwrite(
                    channel_id,
                    PermissionOverwriteType::Role(role_id),
                    Permissions::empty(),
                    deny,
                )
                .await
            {
                warn!(channel_id = %channel_id, error = %e, "Could not apply mute role overwrite");
            }
        }
        info!(guild_id = %guild_id, role_id = %role_id, "Created mute role");
        Ok(role_id)
    }

    /// Whether the user is muted now; an expired record counts as not muted
    ///
    /// # Errors
    /// Returns an error if an expired record cannot be deleted.
    pub async fn is_muted(&self, guild_id: GuildId, user_id: UserId) -> ModerationResult<bool> {
        Ok(self.data.mutes.is_muted(guild_id, user_id).await?)
    }

    /// Mute a member
    ///
    /// # Errors
    /// Fails with [`ModerationError::AlreadyMuted`] for an active mute, or when the
    /// role cannot be resolved or assigned; nothing is recorded in that case.
    pub async fn mute(&self, request: MuteRequest) -> ModerationResult<MuteRecord> {
        let MuteRequest {
            guild_id,
            user_id,
            moderator_id,
            duration,
            reason,
        } = request;

        if let Some(duration) = duration {
            if duration > MAX_MUTE {
                return Err(DurationError::TooLong.into());
            }
        }
        if self.is_muted(guild_id, user_id).await? {
            return Err(ModerationError::AlreadyMuted);
        }

        let role_id = self.resolve_mute_role(guild_id).await?;
        self.gateway
            .add_member_role(guild_id, user_id, role_id, &format!("Muted: {reason}"))
            .await?;

        // A timer left over from a lazily expired mute must not lift this one
        self.data.unmute_tasks.cancel(guild_id, user_id);

        let created_at = Utc::now();
        let expire_at = duration
            .and_then(|d| chrono::Duration::from_std(d).ok())
            .map(|d| created_at + d);
        let record = MuteRecord {
            moderator_id,
            reason,
            created_at,
            expire_at,
        };
        self.data.mutes.add(guild_id, user_id, record.clone()).await?;

        if let (Some(duration), Some(expire_at)) = (duration, expire_at) {
            self.schedule_unmute(guild_id, user_id, duration, expire_at);
        }
        info!(
            guild_id = %guild_id,
            user_id = %user_id,
            moderator_id = %moderator_id,
            duration = ?duration,
            "Member muted"
        );
        Ok(record)
    }

    /// Lift an active mute
    ///
    /// # Errors
    /// Fails with [`ModerationError::NotMuted`] without touching anything when there
    /// is no active mute, or if the role cannot be removed.
    pub async fn unmute(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        moderator_id: UserId,
        reason: &str,
    ) -> ModerationResult<()> {
        if !self.is_muted(guild_id, user_id).await? {
            return Err(ModerationError::NotMuted);
        }

        if let Some(role_id) = self.existing_mute_role(guild_id).await? {
            match self
                .gateway
                .remove_member_role(guild_id, user_id, role_id, &format!("Unmuted: {reason}"))
                .await
            {
                Ok(()) => {}
                // Member left the guild; the record still goes
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e.into()),
            }
        }

        self.data.mutes.remove(guild_id, user_id).await?;
        self.data.unmute_tasks.cancel(guild_id, user_id);
        info!(
            guild_id = %guild_id,
            user_id = %user_id,
            moderator_id = %moderator_id,
            "Member unmuted"
        );
        Ok(())
    }

    /// Unmute every member on the guild's ledger; returns how many succeeded
    ///
    /// # Errors
    /// Returns an error only if the ledger cannot be read.
    pub async fn unmute_all(
        &self,
        guild_id: GuildId,
        moderator_id: UserId,
    ) -> ModerationResult<usize> {
        let mut unmuted = 0;
        for (user_id, _) in self.data.mutes.records_in(guild_id) {
            match self
                .unmute(guild_id, user_id, moderator_id, "Mass unmute")
                .await
            {
                Ok(()) => unmuted += 1,
                Err(ModerationError::NotMuted) => {}
                Err(e) => {
                    warn!(guild_id = %guild_id, user_id = %user_id, error = %e, "Mass unmute failed for member");
                }
            }
        }
        Ok(unmuted)
    }

    /// Spawn the deferred unmute for a pair, replacing any pending one
    ///
    /// The task only lifts the mute whose expiry is `expire_at`.
    pub fn schedule_unmute(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        after: Duration,
        expire_at: DateTime<Utc>,
    ) {
        let generation = self.data.unmute_tasks.next_generation();
        let service = self.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            service.expire(guild_id, user_id, expire_at).await;
            service
                .data
                .unmute_tasks
                .finish(guild_id, user_id, generation);
        });
        self.data
            .unmute_tasks
            .insert(guild_id, user_id, generation, handle.abort_handle());
    }

    /// Body of a scheduled unmute
    ///
    /// A record replaced since scheduling is left alone. A missing record was
    /// already expired lazily, so only the role is left to remove.
    async fn expire(&self, guild_id: GuildId, user_id: UserId, expire_at: DateTime<Utc>) {
        let current = self.data.mutes.get(guild_id, user_id);
        if let Some(record) = &current {
            if record.expire_at != Some(expire_at) {
                info!(guild_id = %guild_id, user_id = %user_id, "Skipping stale unmute");
                return;
            }
        }

        match self.existing_mute_role(guild_id).await {
            Ok(Some(role_id)) => {
                if let Err(e) = self
                    .gateway
                    .remove_member_role(guild_id, user_id, role_id, "Mute expired")
                    .await
                {
                    if !e.is_not_found() {
                        warn!(guild_id = %guild_id, user_id = %user_id, error = %e, "Failed to remove expired mute role");
                    }
                }
            }
            Ok(None) => {}
            Err(e) => {
                warn!(guild_id = %guild_id, user_id = %user_id, error = %e, "Failed to resolve mute role on expiry");
            }
        }

        if current.is_some() {
            if let Err(e) = self.data.mutes.remove(guild_id, user_id).await {
                warn!(guild_id = %guild_id, user_id = %user_id, error = %e, "Failed to delete expired mute");
            }
        }
        if let Err(e) = self
            .gateway
            .direct_message(user_id, "Mute Expired", "Your mute has expired.")
            .await
        {
            info!(user_id = %user_id, error = %e, "Could not DM user about expired mute");
        }
        info!(guild_id = %guild_id, user_id = %user_id, "Mute expired");
    }

    /// Reschedule timed mutes after a restart; past-due ones are lifted at once.
    ///
    /// Returns the number of tasks scheduled or run.
    pub async fn rearm(&self) -> usize {
        let records = self.data.mutes.timed_records();
        let now = Utc::now();
        let count = records.len();
        for (guild_id, user_id, expire_at) in records {
            let remaining = (expire_at - now).to_std().unwrap_or(Duration::ZERO);
            self.schedule_unmute(guild_id, user_id, remaining, expire_at);
        }
        info!(target: CONSOLE_TARGET, count, "Rearmed timed mutes");
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::MockGateway;
    use crate::settings::BotSettings;
    use std::sync::Arc;

    const GUILD: u64 = 10;
    const MUTED_ROLE: u64 = 500;

    fn request(duration: Option<Duration>) -> MuteRequest {
        MuteRequest {
            guild_id: GuildId::new(GUILD),
            user_id: UserId::new(20),
            moderator_id: UserId::new(30),
            duration,
            reason: "spam".to_string(),
        }
    }

    async fn data_with_mute_role() -> Data {
        let data = Data::in_memory(BotSettings::default());
        data.guild_configs
            .update(GuildId::new(GUILD), |config| {
                config.muted_role = Some(RoleId::new(MUTED_ROLE));
            })
            .await
            .unwrap();
        data
    }

    fn gateway_with_role() -> MockGateway {
        let mut gateway = MockGateway::new();
        gateway.expect_role_exists().returning(|_, _| Ok(true));
        gateway.expect_direct_message().returning(|_, _, _| Ok(()));
        gateway
    }

    #[tokio::test]
    async fn test_unmute_when_not_muted_changes_nothing() {
        let data = data_with_mute_role().await;
        let mut gateway = MockGateway::new();
        gateway.expect_remove_member_role().never();
        let service = MuteService::new(data.clone(), Arc::new(gateway));

        let result = service
            .unmute(GuildId::new(GUILD), UserId::new(20), UserId::new(30), "test")
            .await;
        assert!(matches!(result, Err(ModerationError::NotMuted)));
        assert!(data.mutes.records_in(GuildId::new(GUILD)).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_mute_expires() {
        let data = data_with_mute_role().await;
        let mut gateway = gateway_with_role();
        gateway
            .expect_add_member_role()
            .withf(|_, user, role, _| user.get() == 20 && role.get() == MUTED_ROLE)
            .times(1)
            .returning(|_, _, _, _| Ok(()));
        gateway
            .expect_remove_member_role()
            .times(1)
            .returning(|_, _, _, _| Ok(()));
        let service = MuteService::new(data.clone(), Arc::new(gateway));
        let guild = GuildId::new(GUILD);
        let user = UserId::new(20);

        let duration = parse_duration("10m").unwrap();
        let record = service.mute(request(Some(duration))).await.unwrap();
        assert!(record.expire_at.is_some());
        assert!(service.is_muted(guild, user).await.unwrap());
        assert!(data.unmute_tasks.is_scheduled(guild, user));

        tokio::time::sleep(Duration::from_secs(601)).await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        assert!(data.mutes.get(guild, user).is_none());
        assert!(!data.unmute_tasks.is_scheduled(guild, user));
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_remute_survives_old_timer() {
        let data = data_with_mute_role().await;
        let mut gateway = gateway_with_role();
        gateway
            .expect_add_member_role()
            .times(2)
            .returning(|_, _, _, _| Ok(()));
        gateway.expect_remove_member_role().never();
        let service = MuteService::new(data.clone(), Arc::new(gateway));
        let guild = GuildId::new(GUILD);
        let user = UserId::new(20);

        service.mute(request(Some(Duration::from_secs(600)))).await.unwrap();
        // Wall clock says the mute is over before the timer fires
        let mut lapsed = data.mutes.get(guild, user).unwrap();
        lapsed.expire_at = Some(Utc::now() - chrono::Duration::seconds(1));
        data.mutes.add(guild, user, lapsed).await.unwrap();

        service.mute(request(None)).await.unwrap();
        assert!(!data.unmute_tasks.is_scheduled(guild, user));

        tokio::time::sleep(Duration::from_secs(601)).await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        let record = data.mutes.get(guild, user).unwrap();
        assert!(record.expire_at.is_none());
    }

    #[tokio::test]
    async fn test_expire_ignores_replaced_record() {
        let data = data_with_mute_role().await;
        let mut gateway = MockGateway::new();
        gateway.expect_remove_member_role().never();
        gateway.expect_direct_message().never();
        let service = MuteService::new(data.clone(), Arc::new(gateway));
        let guild = GuildId::new(GUILD);
        let user = UserId::new(20);
        let later = Utc::now() + chrono::Duration::hours(2);
        data.mutes
            .add(
                guild,
                user,
                MuteRecord {
                    moderator_id: UserId::new(30),
                    reason: "longer".to_string(),
                    created_at: Utc::now(),
                    expire_at: Some(later),
                },
            )
            .await
            .unwrap();

        service
            .expire(guild, user, later - chrono::Duration::hours(1))
            .await;
        assert_eq!(data.mutes.get(guild, user).unwrap().expire_at, Some(later));
    }

    #[tokio::test]
    async fn test_double_mute_is_rejected() {
        let data = data_with_mute_role().await;
        let mut gateway = gateway_with_role();
        gateway
            .expect_add_member_role()
            .times(1)
            .returning(|_, _, _, _| Ok(()));
        let service = MuteService::new(data, Arc::new(gateway));

        service.mute(request(None)).await.unwrap();
        let second = service.mute(request(None)).await;
        assert!(matches!(second, Err(ModerationError::AlreadyMuted)));
    }

    #[tokio::test]
    async fn test_failed_role_assignment_records_nothing() {
        let data = data_with_mute_role().await;
        let mut gateway = gateway_with_role();
        gateway
            .expect_add_member_role()
            .returning(|_, _, _, _| Err(GatewayError::Forbidden("role hierarchy".to_string())));
        let service = MuteService::new(data.clone(), Arc::new(gateway));

        let result = service.mute(request(None)).await;
        assert!(matches!(result, Err(ModerationError::Gateway(GatewayError::Forbidden(_)))));
        assert!(data.mutes.get(GuildId::new(GUILD), UserId::new(20)).is_none());
    }

    #[tokio::test]
    async fn test_mute_role_is_created_when_missing() {
        let data = Data::in_memory(BotSettings::default());
        let mut gateway = MockGateway::new();
        gateway
            .expect_find_role_by_name()
            .returning(|_, _| Ok(None));
        gateway
            .expect_create_role()
            .withf(|_, blueprint, _| blueprint.name == MUTE_ROLE_NAME)
            .times(1)
            .returning(|_, _, _| Ok(RoleId::new(777)));
        gateway
            .expect_all_channels()
            .returning(|_| Ok(vec![serenity::all::ChannelId::new(1), serenity::all::ChannelId::new(2)]));
        gateway
            .expect_set_overwrite()
            .withf(|_, target, _, deny| {
                matches!(target, PermissionOverwriteType::Role(id) if id.get() == 777)
                    && deny.contains(Permissions::SEND_MESSAGES | Permissions::SPEAK)
            })
            .times(2)
            .returning(|_, _, _, _| Ok(()));
        let service = MuteService::new(data.clone(), Arc::new(gateway));

        let role = service.resolve_mute_role(GuildId::new(GUILD)).await.unwrap();
        assert_eq!(role, RoleId::new(777));
        assert_eq!(
            data.guild_configs.peek(GuildId::new(GUILD)).unwrap().muted_role,
            Some(RoleId::new(777))
        );
    }

    #[tokio::test]
    async fn test_over_long_duration_is_rejected_before_any_call() {
        let data = data_with_mute_role().await;
        let service = MuteService::new(data, Arc::new(MockGateway::new()));
        let result = service
            .mute(request(Some(MAX_MUTE + Duration::from_secs(1))))
            .await;
        assert!(matches!(
            result,
            Err(ModerationError::InvalidDuration(DurationError::TooLong))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_schedules_pending_mutes() {
        let data = data_with_mute_role().await;
        let guild = GuildId::new(GUILD);
        data.mutes
            .add(
                guild,
                UserId::new(1),
                MuteRecord {
                    moderator_id: UserId::new(9),
                    reason: "timed".to_string(),
                    created_at: Utc::now(),
                    expire_at: Some(Utc::now() + chrono::Duration::hours(1)),
                },
            )
            .await
            .unwrap();
        data.mutes
            .add(
                guild,
                UserId::new(2),
                MuteRecord {
                    moderator_id: UserId::new(9),
                    reason: "forever".to_string(),
                    created_at: Utc::now(),
                    expire_at: None,
                },
            )
            .await
            .unwrap();
        let service = MuteService::new(data.clone(), Arc::new(gateway_with_role()));

        assert_eq!(service.rearm().await, 1);
        assert!(data.unmute_tasks.is_scheduled(guild, UserId::new(1)));
        assert!(!data.unmute_tasks.is_scheduled(guild, UserId::new(2)));
        data.unmute_tasks.cancel(guild, UserId::new(1));
    }
}
