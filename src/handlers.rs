use crate::antinuke::RuleEngine;
use crate::gateway::{ChannelBlueprint, Gateway, RoleBlueprint, SerenityGateway};
use crate::voice::{JoinToCreate, VoiceUpdate};
use crate::{Data, EVENT_TARGET};
use poise::serenity_prelude::{
    self as serenity, Context, EventHandler, GuildChannel, GuildId, GuildMemberUpdateEvent, Member,
    Message, Ready, Role, RoleId, User, VoiceState,
};
use regex::Regex;
use std::sync::LazyLock;
use tracing::{debug, info, warn};

static URL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://\S+").expect("url pattern is valid"));

/// Whether a message counts as media for media-only channels
#[must_use]
pub fn is_media_message(attachments: usize, embeds: usize, content: &str) -> bool {
    attachments > 0 || embeds > 0 || URL_PATTERN.is_match(content)
}

/// Does any of `roles` (or `@everyone`) carry administrator, per the cache
fn holds_administrator(ctx: &Context, guild_id: GuildId, roles: &[RoleId]) -> Option<bool> {
    let guild = ctx.cache.guild(guild_id)?;
    let everyone = RoleId::new(guild_id.get());
    Some(
        std::iter::once(&everyone)
            .chain(roles)
            .filter_map(|role_id| guild.roles.get(role_id))
            .any(|role| role.permissions.administrator()),
    )
}

pub struct Handler {
    data: Data,
}

impl Handler {
    #[must_use]
    pub const fn new(data: Data) -> Self {
        Self { data }
    }

    fn gateway(&self, ctx: &Context) -> SerenityGateway {
        SerenityGateway::from_context(ctx, self.data.settings.log_channel.clone())
    }
}

#[serenity::async_trait]
impl EventHandler for Handler {
    /// Called when the bot is ready, but the cache may not be fully populated yet.
    async fn ready(&self, ctx: Context, ready: Ready) {
        let user_name = ready.user.name.clone();
        let shard_id = ctx.shard_id;
        info!("Connected as {user_name}, shard {shard_id}");
    }

    /// Called when the cache is fully populated.
    async fn cache_ready(&self, ctx: Context, guilds: Vec<GuildId>) {
        let guild_count_cache = ctx.cache.guild_count();
        let guild_count = guilds.len();
        if guild_count != guild_count_cache {
            warn!(
                "Cache guild count mismatch: {guild_count_cache} (cache) vs {guild_count} (actual)"
            );
        }
        info!("Cache ready! The bot is in {guild_count} guild(s)");
    }

    async fn guild_ban_addition(&self, ctx: Context, guild_id: GuildId, banned_user: User) {
        let gateway = self.gateway(&ctx);
        match RuleEngine::new(&self.data, &gateway)
            .on_member_ban(guild_id, banned_user.id, &banned_user.name)
            .await
        {
            Ok(verdict) => debug!(target: EVENT_TARGET, guild_id = %guild_id, ?verdict, "Ban screened"),
            Err(e) => warn!(target: EVENT_TARGET, guild_id = %guild_id, error = %e, "Antinuke ban check failed"),
        }
    }

    async fn channel_delete(
        &self,
        ctx: Context,
        channel: GuildChannel,
        _messages: Option<Vec<Message>>,
    ) {
        let gateway = self.gateway(&ctx);
        let blueprint = ChannelBlueprint::from_channel(&channel);
        match RuleEngine::new(&self.data, &gateway)
            .on_channel_delete(
                channel.guild_id,
                channel.id.get(),
                &channel.name,
                blueprint.as_ref(),
            )
            .await
        {
            Ok(verdict) => debug!(target: EVENT_TARGET, channel_id = %channel.id, ?verdict, "Channel deletion screened"),
            Err(e) => warn!(target: EVENT_TARGET, channel_id = %channel.id, error = %e, "Antinuke channel check failed"),
        }
    }

    async fn guild_role_delete(
        &self,
        ctx: Context,
        guild_id: GuildId,
        removed_role_id: RoleId,
        removed_role_data_if_available: Option<Role>,
    ) {
        let gateway = self.gateway(&ctx);
        let blueprint = removed_role_data_if_available
            .as_ref()
            .map(RoleBlueprint::from_role);
        match RuleEngine::new(&self.data, &gateway)
            .on_role_delete(guild_id, removed_role_id, blueprint.as_ref())
            .await
        {
            Ok(verdict) => debug!(target: EVENT_TARGET, role_id = %removed_role_id, ?verdict, "Role deletion screened"),
            Err(e) => warn!(target: EVENT_TARGET, role_id = %removed_role_id, error = %e, "Antinuke role check failed"),
        }
    }

    async fn guild_member_update(
        &self,
        ctx: Context,
        old_if_available: Option<Member>,
        _new: Option<Member>,
        event: GuildMemberUpdateEvent,
    ) {
        // Without the previous roles a grant cannot be told apart from a no-op
        let Some(old) = old_if_available else {
            return;
        };
        let guild_id = event.guild_id;
        let (Some(was_admin), Some(is_admin)) = (
            holds_administrator(&ctx, guild_id, &old.roles),
            holds_administrator(&ctx, guild_id, &event.roles),
        ) else {
            return;
        };

        let gateway = self.gateway(&ctx);
        match RuleEngine::new(&self.data, &gateway)
            .on_member_update(guild_id, event.user.id, &event.user.name, was_admin, is_admin)
            .await
        {
            Ok(verdict) => debug!(target: EVENT_TARGET, user_id = %event.user.id, ?verdict, "Member update screened"),
            Err(e) => warn!(target: EVENT_TARGET, user_id = %event.user.id, error = %e, "Antinuke member check failed"),
        }
    }

    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let Some(guild_id) = new.guild_id else {
            return;
        };
        let update = VoiceUpdate {
            guild_id,
            user_id: new.user_id,
            display_name: new.member.as_ref().map_or_else(
                || new.user_id.to_string(),
                |member| member.display_name().to_string(),
            ),
            before: old.and_then(|state| state.channel_id),
            after: new.channel_id,
        };

        let gateway = self.gateway(&ctx);
        match JoinToCreate::new(&self.data, &gateway)
            .on_voice_update(&update)
            .await
        {
            Ok(outcome) => debug!(target: EVENT_TARGET, user_id = %update.user_id, ?outcome, "Voice update handled"),
            Err(e) => warn!(target: EVENT_TARGET, user_id = %update.user_id, error = %e, "Join to Create failed"),
        }
    }

    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.bot {
            return;
        }
        let Some(guild_id) = msg.guild_id else {
            return;
        };
        let is_media_channel = self
            .data
            .guild_configs
            .peek(guild_id)
            .is_some_and(|config| config.media_channels.contains(&msg.channel_id));
        if !is_media_channel
            || is_media_message(msg.attachments.len(), msg.embeds.len(), &msg.content)
        {
            return;
        }

        if let Err(e) = msg.delete(&ctx).await {
            warn!(target: EVENT_TARGET, channel_id = %msg.channel_id, error = %e, "Failed to delete non-media message");
            return;
        }
        let gateway = self.gateway(&ctx);
        if let Err(e) = gateway
            .direct_message(
                msg.author.id,
                "Media Only Channel",
                &format!(
                    "<#{}> only allows images, videos, files and links.",
                    msg.channel_id
                ),
            )
            .await
        {
            debug!(user_id = %msg.author.id, error = %e, "Could not DM media-only notice");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handler_implements_event_handler() {
        fn assert_impl<T: EventHandler>() {}
        assert_impl::<Handler>();
    }

    #[test]
    fn test_media_detection() {
        assert!(is_media_message(1, 0, ""));
        assert!(is_media_message(0, 1, "look"));
        assert!(is_media_message(0, 0, "see https://example.com/cat.png"));
        assert!(is_media_message(0, 0, "http://example.com"));
        assert!(!is_media_message(0, 0, "just chatting"));
        assert!(!is_media_message(0, 0, "example.com without scheme"));
    }
}
