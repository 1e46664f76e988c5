use super::{
    AuditEntry, AuditKind, ChannelBlueprint, ChannelShape, Gateway, GatewayResult, RoleBlueprint,
};
use crate::embeds;
use serenity::all::{
    Cache, ChannelId, ChannelType, Context, CreateChannel, CreateMessage, EditChannel, EditRole,
    GuildId, Http, PermissionOverwrite, PermissionOverwriteType, Permissions, RoleId, UserId,
};
use serenity::model::guild::audit_log::{Action, ChannelAction, MemberAction, RoleAction};
use std::sync::Arc;
use tracing::debug;

/// [`Gateway`] backed by serenity's HTTP client and cache
#[derive(Clone)]
pub struct SerenityGateway {
    http: Arc<Http>,
    cache: Arc<Cache>,
    log_channel: String,
}

impl SerenityGateway {
    #[must_use]
    pub fn new(http: Arc<Http>, cache: Arc<Cache>, log_channel: impl Into<String>) -> Self {
        Self {
            http,
            cache,
            log_channel: log_channel.into(),
        }
    }

    #[must_use]
    pub fn from_context(ctx: &Context, log_channel: impl Into<String>) -> Self {
        Self::new(ctx.http.clone(), ctx.cache.clone(), log_channel)
    }

    fn audit_action(kind: AuditKind) -> Action {
        match kind {
            AuditKind::MemberBan => Action::Member(MemberAction::BanAdd),
            AuditKind::ChannelDelete => Action::Channel(ChannelAction::Delete),
            AuditKind::RoleDelete => Action::Role(RoleAction::Delete),
            AuditKind::MemberRoleUpdate => Action::Member(MemberAction::RoleUpdate),
        }
    }

    async fn find_log_channel(&self, guild_id: GuildId) -> GatewayResult<Option<ChannelId>> {
        let channels = guild_id.channels(&self.http).await?;
        Ok(channels
            .values()
            .find(|channel| channel.kind == ChannelType::Text && channel.name == self.log_channel)
            .map(|channel| channel.id))
    }
}

#[async_trait::async_trait]
impl Gateway for SerenityGateway {
    fn bot_user_id(&self) -> UserId {
        self.cache.current_user().id
    }

    fn guild_ids(&self) -> Vec<GuildId> {
        self.cache.guilds()
    }

    async fn latest_audit_entry(
        &self,
        guild_id: GuildId,
        kind: AuditKind,
    ) -> GatewayResult<Option<AuditEntry>> {
        let logs = guild_id
            .audit_logs(&self.http, Some(Self::audit_action(kind)), None, None, Some(1))
            .await?;
        Ok(logs.entries.into_iter().next().map(|entry| AuditEntry {
            actor: entry.user_id,
            target: entry.target_id.map(|id| id.get()),
        }))
    }

    async fn ban(&self, guild_id: GuildId, user_id: UserId, reason: &str) -> GatewayResult<()> {
        let http: &Http = &self.http;
        guild_id.ban_with_reason(http, user_id, 0, reason).await?;
        Ok(())
    }

    async fn unban(&self, guild_id: GuildId, user_id: UserId, reason: &str) -> GatewayResult<()> {
        debug!(guild_id = %guild_id, user_id = %user_id, reason, "Unbanning user");
        let http: &Http = &self.http;
        guild_id.unban(http, user_id).await?;
        Ok(())
    }

    async fn kick(&self, guild_id: GuildId, user_id: UserId, reason: &str) -> GatewayResult<()> {
        let http: &Http = &self.http;
        guild_id.kick_with_reason(http, user_id, reason).await?;
        Ok(())
    }

    async fn create_channel(
        &self,
        guild_id: GuildId,
        blueprint: &ChannelBlueprint,
        reason: &str,
    ) -> GatewayResult<ChannelId> {
        let mut builder = CreateChannel::new(blueprint.name.clone()).audit_log_reason(reason);
        if let Some(category) = blueprint.category {
            builder = builder.category(category);
        }
        if let Some(position) = blueprint.position {
            builder = builder.position(position);
        }
        builder = match &blueprint.shape {
            ChannelShape::Text { topic, nsfw } => {
                let mut text = builder.kind(ChannelType::Text).nsfw(*nsfw);
                if let Some(topic) = topic {
                    text = text.topic(topic.clone());
                }
                text
            }
            ChannelShape::Voice {
                bitrate,
                user_limit,
            } => {
                let mut voice = builder.kind(ChannelType::Voice);
                if let Some(bitrate) = bitrate {
                    voice = voice.bitrate(*bitrate);
                }
                if let Some(limit) = user_limit {
                    voice = voice.user_limit(*limit);
                }
                voice
            }
            ChannelShape::Category => builder.kind(ChannelType::Category),
        };

        let http: &Http = &self.http;
        let channel = guild_id.create_channel(http, builder).await?;
        Ok(channel.id)
    }

    async fn delete_channel(&self, channel_id: ChannelId, reason: &str) -> GatewayResult<()> {
        debug!(channel_id = %channel_id, reason, "Deleting channel");
        let http: &Http = &self.http;
        channel_id.delete(http).await?;
        Ok(())
    }

    async fn rename_channel(&self, channel_id: ChannelId, name: &str) -> GatewayResult<()> {
        let http: &Http = &self.http;
        channel_id
            .edit(http, EditChannel::new().name(name))
            .await?;
        Ok(())
    }

    async fn set_user_limit(&self, channel_id: ChannelId, limit: u32) -> GatewayResult<()> {
        let http: &Http = &self.http;
        channel_id
            .edit(http, EditChannel::new().user_limit(limit))
            .await?;
        Ok(())
    }

    async fn create_role(
        &self,
        guild_id: GuildId,
        blueprint: &RoleBlueprint,
        reason: &str,
    ) -> GatewayResult<RoleId> {
        let builder = EditRole::new()
            .name(blueprint.name.clone())
            .permissions(blueprint.permissions)
            .colour(blueprint.colour)
            .hoist(blueprint.hoist)
            .mentionable(blueprint.mentionable)
            .audit_log_reason(reason);
        let http: &Http = &self.http;
        let role = guild_id.create_role(http, builder).await?;
        Ok(role.id)
    }

    async fn role_exists(&self, guild_id: GuildId, role_id: RoleId) -> GatewayResult<bool> {
        Ok(guild_id.roles(&self.http).await?.contains_key(&role_id))
    }

    async fn find_role_by_name(
        &self,
        guild_id: GuildId,
        name: &str,
    ) -> GatewayResult<Option<RoleId>> {
        Ok(guild_id
            .roles(&self.http)
            .await?
            .values()
            .find(|role| role.name == name)
            .map(|role| role.id))
    }

    async fn admin_roles_of(
        &self,
        guild_id: GuildId,
        user_id: UserId,
    ) -> GatewayResult<Vec<RoleId>> {
        let http: &Http = &self.http;
        let member = guild_id.member(http, user_id).await?;
        let roles = guild_id.roles(&self.http).await?;
        Ok(member
            .roles
            .iter()
            .filter(|role_id| {
                roles
                    .get(role_id)
                    .is_some_and(|role| role.permissions.administrator())
            })
            .copied()
            .collect())
    }

    async fn add_member_role(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        role_id: RoleId,
        reason: &str,
    ) -> GatewayResult<()> {
        self.http
            .add_member_role(guild_id, user_id, role_id, Some(reason))
            .await?;
        Ok(())
    }

    async fn remove_member_role(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        role_id: RoleId,
        reason: &str,
    ) -> GatewayResult<()> {
        self.http
            .remove_member_role(guild_id, user_id, role_id, Some(reason))
            .await?;
        Ok(())
    }

    async fn text_channels(&self, guild_id: GuildId) -> GatewayResult<Vec<ChannelId>> {
        Ok(guild_id
            .channels(&self.http)
            .await?
            .values()
            .filter(|channel| channel.kind == ChannelType::Text)
            .map(|channel| channel.id)
            .collect())
    }

    async fn all_channels(&self, guild_id: GuildId) -> GatewayResult<Vec<ChannelId>> {
        Ok(guild_id.channels(&self.http).await?.into_keys().collect())
    }

    async fn overwrite_of(
        &self,
        channel_id: ChannelId,
        target: PermissionOverwriteType,
    ) -> GatewayResult<Option<PermissionOverwrite>> {
        let http: &Http = &self.http;
        let channel = channel_id.to_channel(http).await?;
        Ok(channel.guild().and_then(|channel| {
            channel
                .permission_overwrites
                .into_iter()
                .find(|overwrite| overwrite.kind == target)
        }))
    }

    async fn set_overwrite(
        &self,
        channel_id: ChannelId,
        target: PermissionOverwriteType,
        allow: Permissions,
        deny: Permissions,
    ) -> GatewayResult<()> {
        let http: &Http = &self.http;
        channel_id
            .create_permission(
                http,
                PermissionOverwrite {
                    allow,
                    deny,
                    kind: target,
                },
            )
            .await?;
        Ok(())
    }

    async fn move_member(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        channel_id: Option<ChannelId>,
    ) -> GatewayResult<()> {
        let http: &Http = &self.http;
        match channel_id {
            Some(channel_id) => guild_id.move_member(http, user_id, channel_id).await?,
            None => guild_id.disconnect_member(http, user_id).await?,
        };
        Ok(())
    }

    fn voice_members(&self, guild_id: GuildId, channel_id: ChannelId) -> Vec<UserId> {
        self.cache
            .guild(guild_id)
            .map(|guild| {
                guild
                    .voice_states
                    .values()
                    .filter(|state| state.channel_id == Some(channel_id))
                    .map(|state| state.user_id)
                    .collect()
            })
            .unwrap_or_default()
    }

    async fn post_log(
        &self,
        guild_id: GuildId,
        title: &str,
        description: &str,
    ) -> GatewayResult<()> {
        let Some(channel_id) = self.find_log_channel(guild_id).await? else {
            debug!(guild_id = %guild_id, channel = %self.log_channel, "No log channel in guild");
            return Ok(());
        };
        let http: &Http = &self.http;
        channel_id
            .send_message(
                http,
                CreateMessage::new().embed(embeds::warning(title, description)),
            )
            .await?;
        Ok(())
    }

    async fn direct_message(
        &self,
        user_id: UserId,
        title: &str,
        description: &str,
    ) -> GatewayResult<()> {
        let http: &Http = &self.http;
        user_id
            .direct_message(http, CreateMessage::new().embed(embeds::info(title, description)))
            .await?;
        Ok(())
    }
}
