//! Join to Create: personal voice channels spawned from a hub channel
//!
//! Joining the hub creates `<name>'s Channel` under the configured category and
//! moves the member into it. The channel is deleted once the last member leaves.
//! Management actions are limited to the registered owner or members who can
//! manage channels.

mod cooldown;

pub use cooldown::Cooldowns;

use crate::gateway::{ChannelBlueprint, Gateway, GatewayError, everyone_role};
use crate::store::{JoinToCreateConfig, StoreError};
use crate::{Data, EVENT_TARGET};
use serenity::all::{ChannelId, GuildId, PermissionOverwriteType, Permissions, UserId};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Minimum time between two hub joins by the same member
pub const HUB_COOLDOWN: Duration = Duration::from_secs(10);
pub const MAX_NAME_LENGTH: usize = 100;
pub const MAX_USER_LIMIT: u32 = 99;

pub const HUB_CHANNEL_NAME: &str = "➕ Join to Create";
pub const CATEGORY_NAME: &str = "Join to Create";

const CREATE_REASON: &str = "ESCUDO: Join to Create";
const SETUP_REASON: &str = "Setting up Join to Create system";

#[derive(Debug, Error)]
pub enum VoiceError {
    #[error("Join to Create is not set up in this server")]
    NotConfigured,

    #[error("This is not a Join to Create channel")]
    NotTempChannel,

    #[error("Only the channel owner can do that")]
    NotOwner,

    #[error("The channel owner <@{0}> is still in the channel")]
    OwnerPresent(UserId),

    #[error("You cannot target the channel owner")]
    TargetIsOwner,

    #[error("Channel name must be between 1 and {MAX_NAME_LENGTH} characters")]
    InvalidName,

    #[error("User limit must be between 0 and {MAX_USER_LIMIT}, got {0}")]
    InvalidLimit(u32),

    #[error("That member is not in this channel")]
    NotInChannel,

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type VoiceResult<T> = Result<T, VoiceError>;

/// A member's voice channel change
#[derive(Debug, Clone)]
pub struct VoiceUpdate {
    pub guild_id: GuildId,
    pub user_id: UserId,
    pub display_name: String,
    pub before: Option<ChannelId>,
    pub after: Option<ChannelId>,
}

/// What happened when a member entered the hub
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HubJoin {
    Created(ChannelId),
    /// Joined again inside the cooldown window and was disconnected
    CooledDown,
    Failed,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct VoiceOutcome {
    pub hub: Option<HubJoin>,
    /// A temp channel deleted because it emptied
    pub removed: Option<ChannelId>,
}

/// Who is asking for a management action
#[derive(Debug, Clone, Copy)]
pub struct Requester {
    pub user_id: UserId,
    /// Guild-level manage-channels overrides ownership
    pub can_manage_channels: bool,
}

pub struct JoinToCreate<'a> {
    data: &'a Data,
    gateway: &'a dyn Gateway,
}

impl<'a> JoinToCreate<'a> {
    #[must_use]
    pub fn new(data: &'a Data, gateway: &'a dyn Gateway) -> Self {
        Self { data, gateway }
    }

    /// Configure the hub channel and the category temp channels go in.
    ///
    /// Without a hub, a [`HUB_CHANNEL_NAME`] voice channel is created, inside a new
    /// [`CATEGORY_NAME`] category unless one is given. Returns the hub.
    ///
    /// # Errors
    /// Returns an error if a channel cannot be created or the registry cannot be
    /// persisted.
    pub async fn setup(
        &self,
        guild_id: GuildId,
        hub: Option<ChannelId>,
        category: Option<ChannelId>,
    ) -> VoiceResult<ChannelId> {
        let (hub, category) = match hub {
            Some(hub) => (hub, category),
            None => {
                let category = match category {
                    Some(category) => category,
                    None => {
                        self.gateway
                            .create_channel(
                                guild_id,
                                &ChannelBlueprint::category(CATEGORY_NAME),
                                SETUP_REASON,
                            )
                            .await?
                    }
                };
                let hub = self
                    .gateway
                    .create_channel(
                        guild_id,
                        &ChannelBlueprint::voice(HUB_CHANNEL_NAME, Some(category)),
                        SETUP_REASON,
                    )
                    .await?;
                (hub, Some(category))
            }
        };

        self.data
            .join_to_create
            .configure(guild_id, hub, category)
            .await?;
        info!(guild_id = %guild_id, hub = %hub, category = ?category, "Join to Create configured");
        Ok(hub)
    }

    /// Delete all temp channels and forget the setup; returns how many were deleted
    ///
    /// # Errors
    /// Returns an error if the registry cannot be persisted.
    pub async fn remove(&self, guild_id: GuildId) -> VoiceResult<usize> {
        if self.data.join_to_create.get(guild_id).is_none() {
            return Err(VoiceError::NotConfigured);
        }
        let mut deleted = 0;
        for channel_id in self.data.join_to_create.reset(guild_id).await? {
            match self.gateway.delete_channel(channel_id, CREATE_REASON).await {
                Ok(()) => deleted += 1,
                Err(e) if e.is_not_found() => {}
                Err(e) => warn!(channel_id = %channel_id, error = %e, "Failed to delete temp channel"),
            }
        }
        info!(guild_id = %guild_id, deleted, "Join to Create removed");
        Ok(deleted)
    }

    /// React to a voice state change
    ///
    /// # Errors
    /// Returns an error if the registry cannot be persisted.
    pub async fn on_voice_update(&self, update: &VoiceUpdate) -> VoiceResult<VoiceOutcome> {
        let mut outcome = VoiceOutcome::default();
        if update.before == update.after {
            return Ok(outcome);
        }
        let Some(config) = self.data.join_to_create.get(update.guild_id) else {
            return Ok(outcome);
        };

        if let Some(after) = update.after {
            if config.is_hub(after) {
                outcome.hub = Some(self.enter_hub(&config, update).await?);
            }
        }

        if let Some(before) = update.before {
            if !config.is_hub(before)
                && config.is_temp(before)
                && self.gateway.voice_members(update.guild_id, before).is_empty()
            {
                self.delete_temp(update.guild_id, before).await?;
                outcome.removed = Some(before);
            }
        }

        Ok(outcome)
    }

    async fn enter_hub(
        &self,
        config: &JoinToCreateConfig,
        update: &VoiceUpdate,
    ) -> VoiceResult<HubJoin> {
        let VoiceUpdate {
            guild_id, user_id, ..
        } = *update;

        if !self.data.voice_cooldowns.try_acquire(user_id, HUB_COOLDOWN) {
            debug!(target: EVENT_TARGET, user_id = %user_id, "Hub join on cooldown");
            self.disconnect(guild_id, user_id).await;
            return Ok(HubJoin::CooledDown);
        }

        let name: String = format!("{}'s Channel", update.display_name)
            .chars()
            .take(MAX_NAME_LENGTH)
            .collect();
        let blueprint = ChannelBlueprint::voice(name, config.category);
        let channel_id = match self
            .gateway
            .create_channel(guild_id, &blueprint, CREATE_REASON)
            .await
        {
            Ok(channel_id) => channel_id,
            Err(e) => {
                warn!(guild_id = %guild_id, user_id = %user_id, error = %e, "Failed to create temp channel");
                self.disconnect(guild_id, user_id).await;
                return Ok(HubJoin::Failed);
            }
        };
        self.data
            .join_to_create
            .register_temp(guild_id, channel_id, user_id)
            .await?;

        if let Err(e) = self
            .gateway
            .move_member(guild_id, user_id, Some(channel_id))
            .await
        {
            warn!(guild_id = %guild_id, user_id = %user_id, error = %e, "Failed to move member into temp channel");
            self.disconnect(guild_id, user_id).await;
            self.delete_temp(guild_id, channel_id).await?;
            return Ok(HubJoin::Failed);
        }

        if let Err(e) = self
            .gateway
            .direct_message(
                user_id,
                "Your voice channel is ready",
                "You own this channel. Manage it with `name`, `limit`, `vlock`, `vunlock`, `permit`, `deny` and `ckick`.",
            )
            .await
        {
            debug!(user_id = %user_id, error = %e, "Could not DM temp channel instructions");
        }
        info!(guild_id = %guild_id, user_id = %user_id, channel_id = %channel_id, "Created temp voice channel");
        Ok(HubJoin::Created(channel_id))
    }

    async fn disconnect(&self, guild_id: GuildId, user_id: UserId) {
        if let Err(e) = self.gateway.move_member(guild_id, user_id, None).await {
            debug!(guild_id = %guild_id, user_id = %user_id, error = %e, "Could not disconnect member");
        }
    }

    async fn delete_temp(&self, guild_id: GuildId, channel_id: ChannelId) -> VoiceResult<()> {
        match self.gateway.delete_channel(channel_id, CREATE_REASON).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => warn!(channel_id = %channel_id, error = %e, "Failed to delete temp channel"),
        }
        self.data
            .join_to_create
            .forget_temp(guild_id, channel_id)
            .await?;
        Ok(())
    }

    fn temp_config(&self, guild_id: GuildId, channel_id: ChannelId) -> VoiceResult<JoinToCreateConfig> {
        self.data
            .join_to_create
            .get(guild_id)
            .filter(|config| config.is_temp(channel_id))
            .ok_or(VoiceError::NotTempChannel)
    }

    /// Check that `requester` may manage the channel; returns the registered owner
    ///
    /// # Errors
    /// [`VoiceError::NotTempChannel`] or [`VoiceError::NotOwner`].
    pub fn ensure_controller(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        requester: Requester,
    ) -> VoiceResult<Option<UserId>> {
        let owner = self.temp_config(guild_id, channel_id)?.owner_of(channel_id);
        if requester.can_manage_channels || owner == Some(requester.user_id) {
            Ok(owner)
        } else {
            Err(VoiceError::NotOwner)
        }
    }

    /// Take over a channel whose owner is gone; returns the previous owner
    ///
    /// # Errors
    /// [`VoiceError::OwnerPresent`] while the owner is still connected.
    pub async fn claim(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        requester: UserId,
    ) -> VoiceResult<Option<UserId>> {
        let owner = self.temp_config(guild_id, channel_id)?.owner_of(channel_id);
        if let Some(owner) = owner {
            if owner != requester
                && self
                    .gateway
                    .voice_members(guild_id, channel_id)
                    .contains(&owner)
            {
                return Err(VoiceError::OwnerPresent(owner));
            }
        }
        self.data
            .join_to_create
            .set_owner(guild_id, channel_id, requester)
            .await?;
        info!(guild_id = %guild_id, channel_id = %channel_id, owner = %requester, "Temp channel claimed");
        Ok(owner)
    }

    /// # Errors
    /// Fails on invalid names, missing ownership or a platform error.
    pub async fn rename(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        requester: Requester,
        name: &str,
    ) -> VoiceResult<()> {
        let name = name.trim();
        if name.is_empty() || name.chars().count() > MAX_NAME_LENGTH {
            return Err(VoiceError::InvalidName);
        }
        self.ensure_controller(guild_id, channel_id, requester)?;
        self.gateway.rename_channel(channel_id, name).await?;
        Ok(())
    }

    /// # Errors
    /// Fails on limits above [`MAX_USER_LIMIT`], missing ownership or a platform error.
    pub async fn set_limit(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        requester: Requester,
        limit: u32,
    ) -> VoiceResult<()> {
        if limit > MAX_USER_LIMIT {
            return Err(VoiceError::InvalidLimit(limit));
        }
        self.ensure_controller(guild_id, channel_id, requester)?;
        self.gateway.set_user_limit(channel_id, limit).await?;
        Ok(())
    }

    /// Deny connect for `@everyone` (`locked`) or allow it again
    ///
    /// # Errors
    /// Fails on missing ownership or a platform error.
    pub async fn set_locked(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        requester: Requester,
        locked: bool,
    ) -> VoiceResult<()> {
        self.ensure_controller(guild_id, channel_id, requester)?;
        let (allow, deny) = if locked {
            (Permissions::empty(), Permissions::CONNECT)
        } else {
            (Permissions::CONNECT, Permissions::empty())
        };
        self.gateway
            .set_overwrite(channel_id, everyone_role(guild_id), allow, deny)
            .await?;
        Ok(())
    }

    /// Disconnect a member and keep them out
    ///
    /// # Errors
    /// Fails when targeting the owner or someone not in the channel.
    pub async fn kick(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        requester: Requester,
        target: UserId,
    ) -> VoiceResult<()> {
        let owner = self.ensure_controller(guild_id, channel_id, requester)?;
        if owner == Some(target) {
            return Err(VoiceError::TargetIsOwner);
        }
        if !self
            .gateway
            .voice_members(guild_id, channel_id)
            .contains(&target)
        {
            return Err(VoiceError::NotInChannel);
        }
        self.gateway
            .set_overwrite(
                channel_id,
                PermissionOverwriteType::Member(target),
                Permissions::empty(),
                Permissions::CONNECT,
            )
            .await?;
        self.gateway.move_member(guild_id, target, None).await?;
        Ok(())
    }

    /// Allow a member to connect even while locked
    ///
    /// # Errors
    /// Fails on missing ownership or a platform error.
    pub async fn permit(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        requester: Requester,
        target: UserId,
    ) -> VoiceResult<()> {
        self.ensure_controller(guild_id, channel_id, requester)?;
        self.gateway
            .set_overwrite(
                channel_id,
                PermissionOverwriteType::Member(target),
                Permissions::CONNECT,
                Permissions::empty(),
            )
            .await?;
        Ok(())
    }

    /// Forbid a member from connecting, disconnecting them if present
    ///
    /// # Errors
    /// Fails when targeting the owner, on missing ownership or a platform error.
    pub async fn deny(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        requester: Requester,
        target: UserId,
    ) -> VoiceResult<()> {
        let owner = self.ensure_controller(guild_id, channel_id, requester)?;
        if owner == Some(target) {
            return Err(VoiceError::TargetIsOwner);
        }
        self.gateway
            .set_overwrite(
                channel_id,
                PermissionOverwriteType::Member(target),
                Permissions::empty(),
                Permissions::CONNECT,
            )
            .await?;
        if self
            .gateway
            .voice_members(guild_id, channel_id)
            .contains(&target)
        {
            self.disconnect(guild_id, target).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{ChannelShape, MockGateway};
    use crate::settings::BotSettings;
    use mockall::predicate::eq;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU64, Ordering};

    const GUILD: u64 = 1;
    const HUB: u64 = 10;
    const CATEGORY: u64 = 11;
    const TEMP: u64 = 20;
    const OWNER: u64 = 100;

    async fn configured() -> Data {
        let data = Data::in_memory(BotSettings::default());
        data.join_to_create
            .configure(
                GuildId::new(GUILD),
                ChannelId::new(HUB),
                Some(ChannelId::new(CATEGORY)),
            )
            .await
            .unwrap();
        data
    }

    async fn with_temp_channel() -> Data {
        let data = configured().await;
        data.join_to_create
            .register_temp(GuildId::new(GUILD), ChannelId::new(TEMP), UserId::new(OWNER))
            .await
            .unwrap();
        data
    }

    fn join_hub(user: u64) -> VoiceUpdate {
        VoiceUpdate {
            guild_id: GuildId::new(GUILD),
            user_id: UserId::new(user),
            display_name: "Alice".to_string(),
            before: None,
            after: Some(ChannelId::new(HUB)),
        }
    }

    fn member(user: u64) -> Requester {
        Requester {
            user_id: UserId::new(user),
            can_manage_channels: false,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_hub_join_creates_channel_then_cooldown_disconnects() {
        let data = configured().await;
        let mut gateway = MockGateway::new();
        gateway
            .expect_create_channel()
            .withf(|_, blueprint, _| {
                blueprint.name == "Alice's Channel" && blueprint.category == Some(ChannelId::new(CATEGORY))
            })
            .times(1)
            .returning(|_, _, _| Ok(ChannelId::new(TEMP)));
        gateway
            .expect_move_member()
            .with(eq(GuildId::new(GUILD)), eq(UserId::new(OWNER)), eq(Some(ChannelId::new(TEMP))))
            .times(1)
            .returning(|_, _, _| Ok(()));
        gateway
            .expect_move_member()
            .with(eq(GuildId::new(GUILD)), eq(UserId::new(OWNER)), eq(None))
            .times(1)
            .returning(|_, _, _| Ok(()));
        gateway.expect_direct_message().returning(|_, _, _| Ok(()));
        let service = JoinToCreate::new(&data, &gateway);

        let first = service.on_voice_update(&join_hub(OWNER)).await.unwrap();
        assert_eq!(first.hub, Some(HubJoin::Created(ChannelId::new(TEMP))));
        let config = data.join_to_create.get(GuildId::new(GUILD)).unwrap();
        assert!(config.is_temp(ChannelId::new(TEMP)));
        assert_eq!(config.owner_of(ChannelId::new(TEMP)), Some(UserId::new(OWNER)));

        tokio::time::advance(Duration::from_secs(3)).await;
        let second = service.on_voice_update(&join_hub(OWNER)).await.unwrap();
        assert_eq!(second.hub, Some(HubJoin::CooledDown));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejoin_after_leaving_waits_for_cooldown() {
        let data = configured().await;
        let mut gateway = MockGateway::new();
        let next_channel = Arc::new(AtomicU64::new(TEMP));
        gateway
            .expect_create_channel()
            .times(2)
            .returning(move |_, _, _| Ok(ChannelId::new(next_channel.fetch_add(1, Ordering::SeqCst))));
        gateway.expect_move_member().returning(|_, _, _| Ok(()));
        gateway.expect_voice_members().returning(|_, _| Vec::new());
        gateway
            .expect_delete_channel()
            .with(eq(ChannelId::new(TEMP)), mockall::predicate::always())
            .times(1)
            .returning(|_, _| Ok(()));
        gateway.expect_direct_message().returning(|_, _, _| Ok(()));
        let service = JoinToCreate::new(&data, &gateway);

        let first = service.on_voice_update(&join_hub(OWNER)).await.unwrap();
        assert_eq!(first.hub, Some(HubJoin::Created(ChannelId::new(TEMP))));

        let leave = VoiceUpdate {
            before: Some(ChannelId::new(TEMP)),
            after: None,
            ..join_hub(OWNER)
        };
        let left = service.on_voice_update(&leave).await.unwrap();
        assert_eq!(left.removed, Some(ChannelId::new(TEMP)));

        tokio::time::advance(Duration::from_secs(5)).await;
        let early = service.on_voice_update(&join_hub(OWNER)).await.unwrap();
        assert_eq!(early.hub, Some(HubJoin::CooledDown));

        // The refused attempt did not restart the window
        tokio::time::advance(Duration::from_secs(5)).await;
        let again = service.on_voice_update(&join_hub(OWNER)).await.unwrap();
        assert_eq!(again.hub, Some(HubJoin::Created(ChannelId::new(TEMP + 1))));
    }

    #[tokio::test]
    async fn test_setup_without_hub_creates_category_and_hub() {
        let data = Data::in_memory(BotSettings::default());
        let mut gateway = MockGateway::new();
        gateway
            .expect_create_channel()
            .withf(|_, blueprint, _| blueprint.shape == ChannelShape::Category)
            .times(1)
            .returning(|_, _, _| Ok(ChannelId::new(CATEGORY)));
        gateway
            .expect_create_channel()
            .withf(|_, blueprint, _| {
                blueprint.name == HUB_CHANNEL_NAME && blueprint.category == Some(ChannelId::new(CATEGORY))
            })
            .times(1)
            .returning(|_, _, _| Ok(ChannelId::new(HUB)));
        let service = JoinToCreate::new(&data, &gateway);

        let hub = service.setup(GuildId::new(GUILD), None, None).await.unwrap();
        assert_eq!(hub, ChannelId::new(HUB));
        let config = data.join_to_create.get(GuildId::new(GUILD)).unwrap();
        assert!(config.is_hub(ChannelId::new(HUB)));
        assert_eq!(config.category, Some(ChannelId::new(CATEGORY)));
    }

    #[tokio::test]
    async fn test_setup_with_existing_hub_creates_nothing() {
        let data = Data::in_memory(BotSettings::default());
        let gateway = MockGateway::new();
        let service = JoinToCreate::new(&data, &gateway);

        let hub = service
            .setup(GuildId::new(GUILD), Some(ChannelId::new(HUB)), None)
            .await
            .unwrap();
        assert_eq!(hub, ChannelId::new(HUB));
        let config = data.join_to_create.get(GuildId::new(GUILD)).unwrap();
        assert!(config.is_hub(ChannelId::new(HUB)));
        assert!(config.category.is_none());
    }

    #[tokio::test]
    async fn test_empty_temp_channel_is_deleted() {
        let data = with_temp_channel().await;
        let mut gateway = MockGateway::new();
        gateway.expect_voice_members().returning(|_, _| Vec::new());
        gateway
            .expect_delete_channel()
            .with(eq(ChannelId::new(TEMP)), mockall::predicate::always())
            .times(1)
            .returning(|_, _| Ok(()));
        let service = JoinToCreate::new(&data, &gateway);

        let update = VoiceUpdate {
            guild_id: GuildId::new(GUILD),
            user_id: UserId::new(OWNER),
            display_name: "Alice".to_string(),
            before: Some(ChannelId::new(TEMP)),
            after: None,
        };
        let outcome = service.on_voice_update(&update).await.unwrap();
        assert_eq!(outcome.removed, Some(ChannelId::new(TEMP)));
        assert!(!data
            .join_to_create
            .get(GuildId::new(GUILD))
            .unwrap()
            .is_temp(ChannelId::new(TEMP)));
    }

    #[tokio::test]
    async fn test_occupied_temp_channel_is_kept() {
        let data = with_temp_channel().await;
        let mut gateway = MockGateway::new();
        gateway
            .expect_voice_members()
            .returning(|_, _| vec![UserId::new(5)]);
        gateway.expect_delete_channel().never();
        let service = JoinToCreate::new(&data, &gateway);

        let update = VoiceUpdate {
            guild_id: GuildId::new(GUILD),
            user_id: UserId::new(OWNER),
            display_name: "Alice".to_string(),
            before: Some(ChannelId::new(TEMP)),
            after: None,
        };
        assert_eq!(service.on_voice_update(&update).await.unwrap(), VoiceOutcome::default());
    }

    #[tokio::test]
    async fn test_claim_rejected_while_owner_present() {
        let data = with_temp_channel().await;
        let mut gateway = MockGateway::new();
        gateway
            .expect_voice_members()
            .returning(|_, _| vec![UserId::new(OWNER), UserId::new(200)]);
        let service = JoinToCreate::new(&data, &gateway);

        let result = service
            .claim(GuildId::new(GUILD), ChannelId::new(TEMP), UserId::new(200))
            .await;
        assert!(matches!(result, Err(VoiceError::OwnerPresent(owner)) if owner.get() == OWNER));
        assert_eq!(
            data.join_to_create
                .get(GuildId::new(GUILD))
                .unwrap()
                .owner_of(ChannelId::new(TEMP)),
            Some(UserId::new(OWNER))
        );
    }

    #[tokio::test]
    async fn test_claim_after_owner_left() {
        let data = with_temp_channel().await;
        let mut gateway = MockGateway::new();
        gateway
            .expect_voice_members()
            .returning(|_, _| vec![UserId::new(200)]);
        let service = JoinToCreate::new(&data, &gateway);

        let previous = service
            .claim(GuildId::new(GUILD), ChannelId::new(TEMP), UserId::new(200))
            .await
            .unwrap();
        assert_eq!(previous, Some(UserId::new(OWNER)));
        assert!(service
            .ensure_controller(GuildId::new(GUILD), ChannelId::new(TEMP), member(200))
            .is_ok());
        assert!(matches!(
            service.ensure_controller(GuildId::new(GUILD), ChannelId::new(TEMP), member(OWNER)),
            Err(VoiceError::NotOwner)
        ));
    }

    #[tokio::test]
    async fn test_owner_gating_and_validation() {
        let data = with_temp_channel().await;
        let mut gateway = MockGateway::new();
        gateway
            .expect_set_user_limit()
            .with(eq(ChannelId::new(TEMP)), eq(5))
            .times(1)
            .returning(|_, _| Ok(()));
        let service = JoinToCreate::new(&data, &gateway);
        let (guild, channel) = (GuildId::new(GUILD), ChannelId::new(TEMP));

        assert!(matches!(
            service.set_limit(guild, channel, member(OWNER), 100).await,
            Err(VoiceError::InvalidLimit(100))
        ));
        assert!(matches!(
            service.set_limit(guild, channel, member(300), 5).await,
            Err(VoiceError::NotOwner)
        ));
        assert!(matches!(
            service.rename(guild, channel, member(OWNER), &"x".repeat(101)).await,
            Err(VoiceError::InvalidName)
        ));
        assert!(matches!(
            service.set_limit(guild, ChannelId::new(HUB), member(OWNER), 5).await,
            Err(VoiceError::NotTempChannel)
        ));

        let moderator = Requester {
            user_id: UserId::new(300),
            can_manage_channels: true,
        };
        service.set_limit(guild, channel, moderator, 5).await.unwrap();
    }

    #[tokio::test]
    async fn test_kick_cannot_target_owner() {
        let data = with_temp_channel().await;
        let mut gateway = MockGateway::new();
        gateway
            .expect_voice_members()
            .returning(|_, _| vec![UserId::new(OWNER), UserId::new(200)]);
        gateway
            .expect_set_overwrite()
            .withf(|_, target, _, deny| {
                matches!(target, PermissionOverwriteType::Member(id) if id.get() == 200)
                    && *deny == Permissions::CONNECT
            })
            .times(1)
            .returning(|_, _, _, _| Ok(()));
        gateway
            .expect_move_member()
            .with(eq(GuildId::new(GUILD)), eq(UserId::new(200)), eq(None))
            .times(1)
            .returning(|_, _, _| Ok(()));
        let service = JoinToCreate::new(&data, &gateway);
        let (guild, channel) = (GuildId::new(GUILD), ChannelId::new(TEMP));

        assert!(matches!(
            service.kick(guild, channel, member(OWNER), UserId::new(OWNER)).await,
            Err(VoiceError::TargetIsOwner)
        ));
        assert!(matches!(
            service.kick(guild, channel, member(OWNER), UserId::new(999)).await,
            Err(VoiceError::NotInChannel)
        ));
        service
            .kick(guild, channel, member(OWNER), UserId::new(200))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_remove_deletes_tracked_channels() {
        let data = with_temp_channel().await;
        let mut gateway = MockGateway::new();
        gateway
            .expect_delete_channel()
            .times(1)
            .returning(|_, _| Ok(()));
        let service = JoinToCreate::new(&data, &gateway);

        assert_eq!(service.remove(GuildId::new(GUILD)).await.unwrap(), 1);
        assert!(data.join_to_create.get(GuildId::new(GUILD)).is_none());
        assert!(matches!(
            service.remove(GuildId::new(GUILD)).await,
            Err(VoiceError::NotConfigured)
        ));
    }
}
