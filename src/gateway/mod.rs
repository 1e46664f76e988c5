//! Platform boundary
//!
//! Everything the bot does to Discord goes through the [`Gateway`] trait so the
//! rule engine, mute scheduler and voice service can be driven by a mock in tests.

mod discord;

pub use discord::SerenityGateway;

use serenity::all::{
    ChannelId, ChannelType, GuildChannel, GuildId, PermissionOverwrite, PermissionOverwriteType,
    Permissions, Role, RoleId, UserId,
};
use std::sync::Arc;
use thiserror::Error;

/// Errors returned by platform calls
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The bot lacks the permission (HTTP 403)
    #[error("Missing permissions: {0}")]
    Forbidden(String),

    /// The target no longer exists (HTTP 404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Any other Discord failure
    #[error("Discord API error: {0}")]
    Discord(Box<serenity::Error>),
}

impl From<serenity::Error> for GatewayError {
    fn from(error: serenity::Error) -> Self {
        use serenity::http::HttpError;

        if let serenity::Error::Http(HttpError::UnsuccessfulRequest(response)) = &error {
            match response.status_code.as_u16() {
                403 => return Self::Forbidden(response.error.message.clone()),
                404 => return Self::NotFound(response.error.message.clone()),
                _ => {}
            }
        }
        Self::Discord(Box::new(error))
    }
}

impl GatewayError {
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Audit-log action kinds the antinuke cares about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditKind {
    MemberBan,
    ChannelDelete,
    RoleDelete,
    MemberRoleUpdate,
}

/// The most recent audit entry for an action kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEntry {
    pub actor: UserId,
    /// Raw id of the affected object (user, channel or role)
    pub target: Option<u64>,
}

impl AuditEntry {
    #[must_use]
    pub fn targets(&self, id: u64) -> bool {
        self.target == Some(id)
    }
}

/// Type-specific channel attributes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelShape {
    Text {
        topic: Option<String>,
        nsfw: bool,
    },
    Voice {
        bitrate: Option<u32>,
        user_limit: Option<u32>,
    },
    Category,
}

/// Enough of a channel to create it again
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelBlueprint {
    pub name: String,
    pub category: Option<ChannelId>,
    pub position: Option<u16>,
    pub shape: ChannelShape,
}

impl ChannelBlueprint {
    /// Capture a deleted channel. Only text, voice and category channels can be recreated.
    #[must_use]
    pub fn from_channel(channel: &GuildChannel) -> Option<Self> {
        let shape = match channel.kind {
            ChannelType::Text => ChannelShape::Text {
                topic: channel.topic.clone(),
                nsfw: channel.nsfw,
            },
            ChannelType::Voice => ChannelShape::Voice {
                bitrate: channel.bitrate,
                user_limit: channel.user_limit,
            },
            ChannelType::Category => ChannelShape::Category,
            _ => return None,
        };
        Some(Self {
            name: channel.name.clone(),
            category: channel.parent_id,
            position: Some(channel.position),
            shape,
        })
    }

    #[must_use]
    pub fn category(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            category: None,
            position: None,
            shape: ChannelShape::Category,
        }
    }

    /// A plain voice channel under `category`
    #[must_use]
    pub fn voice(name: impl Into<String>, category: Option<ChannelId>) -> Self {
        Self {
            name: name.into(),
            category,
            position: None,
            shape: ChannelShape::Voice {
                bitrate: None,
                user_limit: None,
            },
        }
    }
}

/// Enough of a role to create it again
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleBlueprint {
    pub name: String,
    pub permissions: Permissions,
    pub colour: u32,
    pub hoist: bool,
    pub mentionable: bool,
}

impl RoleBlueprint {
    #[must_use]
    pub fn from_role(role: &Role) -> Self {
        Self {
            name: role.name.clone(),
            permissions: role.permissions,
            colour: role.colour.0,
            hoist: role.hoist,
            mentionable: role.mentionable,
        }
    }

    /// A permissionless role with the given name
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            permissions: Permissions::empty(),
            colour: 0,
            hoist: false,
            mentionable: false,
        }
    }
}

/// Abstract platform capability
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait Gateway: Send + Sync {
    /// The bot's own user id
    fn bot_user_id(&self) -> UserId;

    /// Guilds the bot is currently in
    fn guild_ids(&self) -> Vec<GuildId>;

    /// Most recent audit-log entry of `kind`
    async fn latest_audit_entry(
        &self,
        guild_id: GuildId,
        kind: AuditKind,
    ) -> GatewayResult<Option<AuditEntry>>;

    async fn ban(&self, guild_id: GuildId, user_id: UserId, reason: &str) -> GatewayResult<()>;

    async fn unban(&self, guild_id: GuildId, user_id: UserId, reason: &str) -> GatewayResult<()>;

    async fn kick(&self, guild_id: GuildId, user_id: UserId, reason: &str) -> GatewayResult<()>;

    async fn create_channel(
        &self,
        guild_id: GuildId,
        blueprint: &ChannelBlueprint,
        reason: &str,
    ) -> GatewayResult<ChannelId>;

    async fn delete_channel(&self, channel_id: ChannelId, reason: &str) -> GatewayResult<()>;

    async fn rename_channel(&self, channel_id: ChannelId, name: &str) -> GatewayResult<()>;

    /// Set a voice channel's member limit; 0 removes it
    async fn set_user_limit(&self, channel_id: ChannelId, limit: u32) -> GatewayResult<()>;

    async fn create_role(
        &self,
        guild_id: GuildId,
        blueprint: &RoleBlueprint,
        reason: &str,
    ) -> GatewayResult<RoleId>;

    async fn role_exists(&self, guild_id: GuildId, role_id: RoleId) -> GatewayResult<bool>;

    async fn find_role_by_name(&self, guild_id: GuildId, name: &str)
    -> GatewayResult<Option<RoleId>>;

    /// Roles held by the member that carry the administrator permission
    async fn admin_roles_of(&self, guild_id: GuildId, user_id: UserId)
    -> GatewayResult<Vec<RoleId>>;

    async fn add_member_role(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        role_id: RoleId,
        reason: &str,
    ) -> GatewayResult<()>;

    async fn remove_member_role(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        role_id: RoleId,
        reason: &str,
    ) -> GatewayResult<()>;

    async fn text_channels(&self, guild_id: GuildId) -> GatewayResult<Vec<ChannelId>>;

    async fn all_channels(&self, guild_id: GuildId) -> GatewayResult<Vec<ChannelId>>;

    /// The channel's current overwrite for a role or member, if it has one
    async fn overwrite_of(
        &self,
        channel_id: ChannelId,
        target: PermissionOverwriteType,
    ) -> GatewayResult<Option<PermissionOverwrite>>;

    /// Replace the permission overwrite for a role or member on a channel
    async fn set_overwrite(
        &self,
        channel_id: ChannelId,
        target: PermissionOverwriteType,
        allow: Permissions,
        deny: Permissions,
    ) -> GatewayResult<()>;

    /// Move a member to `channel_id`, or disconnect them when `None`
    async fn move_member(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        channel_id: Option<ChannelId>,
    ) -> GatewayResult<()>;

    /// Members currently connected to a voice channel, from the cache
    fn voice_members(&self, guild_id: GuildId, channel_id: ChannelId) -> Vec<UserId>;

    /// Post an embed to the guild's log channel, if it has one
    async fn post_log(&self, guild_id: GuildId, title: &str, description: &str)
    -> GatewayResult<()>;

    async fn direct_message(&self, user_id: UserId, title: &str, description: &str)
    -> GatewayResult<()>;
}

/// Shared handle to the gateway
pub type SharedGateway = Arc<dyn Gateway>;

/// The `@everyone` role of a guild shares the guild's id
#[must_use]
pub fn everyone_role(guild_id: GuildId) -> PermissionOverwriteType {
    PermissionOverwriteType::Role(RoleId::new(guild_id.get()))
}
