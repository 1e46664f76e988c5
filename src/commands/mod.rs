//! poise command surface
//!
//! Commands are grouped by subsystem. Every command is guild-only and guarded by
//! one of the authority checks below.

mod antinuke;
mod general;
mod moderation;
mod voice;

use crate::embeds;
use crate::gateway::SerenityGateway;
use crate::permissions::{Authority, CallerFacts, resolve_authority};
use crate::{Context, Data, Error};
use poise::CreateReply;
use serenity::all::{ChannelId, CreateEmbed, GuildId, Permissions, RoleId, UserId};
use std::sync::Arc;
use std::time::Duration;

/// How long a reaction confirmation waits before giving up
pub const CONFIRM_TIMEOUT: Duration = Duration::from_secs(30);

const CONFIRM_EMOJI: char = '✅';
const CANCEL_EMOJI: char = '❌';

/// Every command the framework registers
#[must_use]
pub fn all() -> Vec<poise::Command<Data, Error>> {
    vec![
        general::ping(),
        general::prefix(),
        antinuke::antinuke(),
        antinuke::whitelist(),
        antinuke::unwhitelist(),
        antinuke::wlisted(),
        antinuke::whitelistreset(),
        antinuke::nightmode(),
        antinuke::extraowner(),
        antinuke::mainrole(),
        antinuke::admin(),
        antinuke::mod_role(),
        moderation::warn(),
        moderation::warnings(),
        moderation::unwarn(),
        moderation::clearwarns(),
        moderation::mute(),
        moderation::unmute(),
        moderation::unmuteall(),
        moderation::ban(),
        moderation::unban(),
        moderation::kick(),
        moderation::lock(),
        moderation::unlock(),
        moderation::lockall(),
        moderation::unlockall(),
        moderation::ignore(),
        moderation::ignored(),
        moderation::mediachannel(),
        voice::setup(),
        voice::remove(),
        voice::limit(),
        voice::name(),
        voice::vlock(),
        voice::vunlock(),
        voice::claim(),
        voice::ckick(),
        voice::permit(),
        voice::deny(),
    ]
}

/// Prefix options with the per-guild prefix and mention prefix
#[must_use]
pub fn prefix_options() -> poise::PrefixFrameworkOptions<Data, Error> {
    poise::PrefixFrameworkOptions {
        dynamic_prefix: Some(|ctx| {
            Box::pin(async move {
                Ok(Some(ctx.data.guild_configs.prefix_for(ctx.guild_id)))
            })
        }),
        mention_as_prefix: true,
        case_insensitive_commands: true,
        ..Default::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, poise::ChoiceParameter)]
pub enum Toggle {
    #[name = "on"]
    #[name = "enable"]
    On,
    #[name = "off"]
    #[name = "disable"]
    Off,
}

impl Toggle {
    #[must_use]
    pub const fn enabled(self) -> bool {
        matches!(self, Self::On)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, poise::ChoiceParameter)]
pub enum ListAction {
    #[name = "add"]
    #[name = "+"]
    Add,
    #[name = "remove"]
    #[name = "-"]
    Remove,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, poise::ChoiceParameter)]
pub enum RoleTier {
    #[name = "admin"]
    Admin,
    #[name = "mod"]
    Mod,
}

impl RoleTier {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Mod => "mod",
        }
    }
}

/// Send a single embed as the command's reply
pub async fn reply(ctx: Context<'_>, embed: CreateEmbed) -> Result<(), Error> {
    ctx.send(CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Gateway for services that outlive the invocation
#[must_use]
pub fn gateway(ctx: Context<'_>) -> Arc<SerenityGateway> {
    Arc::new(SerenityGateway::from_context(
        ctx.serenity_context(),
        ctx.data().settings.log_channel.clone(),
    ))
}

/// Guild id of a guild-only invocation
pub fn guild_id(ctx: Context<'_>) -> Result<GuildId, Error> {
    ctx.guild_id()
        .ok_or_else(|| "This command can only be used in a server".into())
}

/// Guild-level permissions of a member, computed from the cache
#[must_use]
pub fn member_permissions(
    ctx: Context<'_>,
    guild_id: GuildId,
    user_id: UserId,
    roles: &[RoleId],
) -> Permissions {
    let Some(guild) = ctx.cache().guild(guild_id) else {
        return Permissions::empty();
    };
    if guild.owner_id == user_id {
        return Permissions::all();
    }
    std::iter::once(RoleId::new(guild_id.get()))
        .chain(roles.iter().copied())
        .filter_map(|role_id| guild.roles.get(&role_id))
        .fold(Permissions::empty(), |acc, role| acc | role.permissions)
}

/// The invoking member's guild permissions
pub async fn author_permissions(ctx: Context<'_>) -> Permissions {
    let Some(guild_id) = ctx.guild_id() else {
        return Permissions::empty();
    };
    let roles = ctx
        .author_member()
        .await
        .map(|member| member.roles.clone())
        .unwrap_or_default();
    member_permissions(ctx, guild_id, ctx.author().id, &roles)
}

/// Resolve how much the invoking member may do
pub async fn caller_authority(ctx: Context<'_>) -> Result<Authority, Error> {
    let Some(guild_id) = ctx.guild_id() else {
        return Ok(Authority::Member);
    };
    let user_id = ctx.author().id;
    let roles = ctx
        .author_member()
        .await
        .map(|member| member.roles.clone())
        .unwrap_or_default();
    let permissions = member_permissions(ctx, guild_id, user_id, &roles);
    let config = ctx
        .data()
        .guild_configs
        .peek(guild_id)
        .unwrap_or_default();

    Ok(resolve_authority(
        &config,
        &CallerFacts {
            is_owner: ctx.data().is_owner(guild_id, user_id),
            permissions,
            roles: &roles,
        },
    ))
}

async fn require(ctx: Context<'_>, level: Authority) -> Result<bool, Error> {
    if caller_authority(ctx).await? >= level {
        return Ok(true);
    }
    let needed = match level {
        Authority::Owner => "an owner",
        Authority::Admin => "an administrator",
        Authority::Mod | Authority::Member => "a moderator",
    };
    reply(
        ctx,
        embeds::error(
            "Missing Permissions",
            &format!("You must be {needed} to use this command."),
        ),
    )
    .await?;
    Ok(false)
}

pub async fn is_owner(ctx: Context<'_>) -> Result<bool, Error> {
    require(ctx, Authority::Owner).await
}

pub async fn is_admin(ctx: Context<'_>) -> Result<bool, Error> {
    require(ctx, Authority::Admin).await
}

pub async fn is_mod(ctx: Context<'_>) -> Result<bool, Error> {
    require(ctx, Authority::Mod).await
}

/// Voice channel the invoking member is connected to, per the cache
#[must_use]
pub fn author_voice_channel(ctx: Context<'_>) -> Option<ChannelId> {
    let guild = ctx.guild()?;
    guild
        .voice_states
        .get(&ctx.author().id)
        .and_then(|state| state.channel_id)
}

/// Ask the author to confirm with a reaction
///
/// Returns `false` on the cancel reaction or when nobody answers within
/// [`CONFIRM_TIMEOUT`].
pub async fn confirm(ctx: Context<'_>, title: &str, description: &str) -> Result<bool, Error> {
    let handle = ctx
        .send(CreateReply::default().embed(embeds::warning(title, description)))
        .await?;
    let message = handle.message().await?;
    message.react(ctx, CONFIRM_EMOJI).await?;
    message.react(ctx, CANCEL_EMOJI).await?;

    let confirm = CONFIRM_EMOJI.to_string();
    let cancel = CANCEL_EMOJI.to_string();
    let answer = message
        .await_reaction(ctx.serenity_context())
        .author_id(ctx.author().id)
        .filter(move |reaction| {
            reaction.emoji.unicode_eq(&confirm) || reaction.emoji.unicode_eq(&cancel)
        })
        .timeout(CONFIRM_TIMEOUT)
        .await;

    Ok(answer.is_some_and(|reaction| reaction.emoji.unicode_eq(&CONFIRM_EMOJI.to_string())))
}

/// Render user ids as a mention list, or a placeholder when empty
#[must_use]
pub fn mention_list<I, T>(ids: I, empty: &str) -> String
where
    I: IntoIterator<Item = T>,
    T: std::fmt::Display,
{
    let lines: Vec<String> = ids.into_iter().map(|id| format!("• {id}")).collect();
    if lines.is_empty() {
        empty.to_string()
    } else {
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_command_names_are_unique() {
        let commands = all();
        let mut seen = HashSet::new();
        for command in &commands {
            assert!(seen.insert(command.name.clone()), "duplicate command {}", command.name);
            for alias in &command.aliases {
                assert!(seen.insert(alias.clone()), "duplicate alias {alias}");
            }
        }
        assert_eq!(commands.len(), 39);
    }

    #[test]
    fn test_every_command_is_guild_only() {
        for command in all() {
            assert!(command.guild_only, "{} must be guild only", command.name);
            assert!(
                command.prefix_action.is_some(),
                "{} must be a prefix command",
                command.name
            );
        }
    }

    #[test]
    fn test_checks_cover_privileged_commands() {
        // Voice channel actions are gated by channel ownership instead
        let unchecked = [
            "ping", "limit", "name", "vlock", "vunlock", "claim", "ckick", "permit", "deny",
        ];
        for command in all() {
            assert_eq!(
                command.checks.is_empty(),
                unchecked.contains(&command.name.as_str()),
                "unexpected check setup on {}",
                command.name
            );
        }
    }

    #[test]
    fn test_choice_helpers() {
        assert!(Toggle::On.enabled());
        assert!(!Toggle::Off.enabled());
        assert_eq!(RoleTier::Admin.label(), "admin");
        assert_eq!(RoleTier::Mod.label(), "mod");
    }

    #[test]
    fn test_mention_list() {
        assert_eq!(mention_list(Vec::<String>::new(), "none"), "none");
        assert_eq!(
            mention_list(["<@1>", "<@2>"], "none"),
            "• <@1>\n• <@2>"
        );
    }
}
