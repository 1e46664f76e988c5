use super::{confirm, gateway, guild_id, is_admin, is_mod, mention_list, reply};
use crate::gateway::{Gateway, GatewayError};
use crate::moderation::{
    ModerationError, MuteRequest, MuteService, format_duration, parse_duration,
};
use crate::moderation::lock as channel_lock;
use crate::{Context, Error, embeds};
use poise::command;
use serenity::all::{GuildChannel, Member, Mentionable, User, UserId};
use tracing::{debug, info};

const NO_REASON: &str = "No reason provided";

fn reason_or_default(reason: Option<String>) -> String {
    reason
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty())
        .unwrap_or_else(|| NO_REASON.to_string())
}

fn mute_service(ctx: Context<'_>) -> MuteService {
    MuteService::new(ctx.data().clone(), gateway(ctx))
}

/// Warn a member
#[command(prefix_command, slash_command, guild_only, check = "is_mod")]
pub async fn warn(
    ctx: Context<'_>,
    #[description = "Member to warn"] member: Member,
    #[description = "Reason"]
    #[rest]
    reason: Option<String>,
) -> Result<(), Error> {
    let guild_id = guild_id(ctx)?;
    if member.user.id == ctx.author().id {
        return reply(ctx, embeds::error("Self-Warn Prevented", "You cannot warn yourself.")).await;
    }

    let reason = reason_or_default(reason);
    let id = ctx
        .data()
        .warnings
        .add(guild_id, member.user.id, ctx.author().id, reason.clone())
        .await?;

    if let Err(e) = gateway(ctx)
        .direct_message(
            member.user.id,
            "You have been warned",
            &format!("**Reason:** {reason}"),
        )
        .await
    {
        debug!(user_id = %member.user.id, error = %e, "Could not DM warning");
    }

    reply(
        ctx,
        embeds::success(
            "User Warned",
            &format!(
                "{} has been warned (warning #{id}).\n**Reason:** {reason}",
                member.mention()
            ),
        ),
    )
    .await
}

/// View a member's warnings
#[command(
    prefix_command,
    slash_command,
    guild_only,
    aliases("warns"),
    check = "is_mod"
)]
pub async fn warnings(
    ctx: Context<'_>,
    #[description = "Member to look up"] member: Member,
) -> Result<(), Error> {
    let guild_id = guild_id(ctx)?;
    let warnings = ctx.data().warnings.list(guild_id, member.user.id);
    let lines = warnings.iter().map(|w| {
        format!(
            "`#{}` {} by {} on {}",
            w.id,
            w.reason,
            w.moderator_id.mention(),
            w.timestamp.format("%Y-%m-%d %H:%M UTC")
        )
    });
    reply(
        ctx,
        embeds::info(
            &format!("Warnings for {}", member.display_name()),
            &mention_list(lines, "This user has no warnings."),
        ),
    )
    .await
}

/// Remove one warning from a member
#[command(prefix_command, slash_command, guild_only, check = "is_mod")]
pub async fn unwarn(
    ctx: Context<'_>,
    #[description = "Member"] member: Member,
    #[description = "Warning id"] warning_id: u32,
) -> Result<(), Error> {
    let guild_id = guild_id(ctx)?;
    if ctx
        .data()
        .warnings
        .remove(guild_id, member.user.id, warning_id)
        .await?
    {
        reply(
            ctx,
            embeds::success(
                "Warning Removed",
                &format!("Warning #{warning_id} has been removed from {}.", member.mention()),
            ),
        )
        .await
    } else {
        reply(
            ctx,
            embeds::error(
                "Warning Not Found",
                &format!("{} has no warning #{warning_id}.", member.mention()),
            ),
        )
        .await
    }
}

/// Clear all of a member's warnings
#[command(
    prefix_command,
    slash_command,
    guild_only,
    aliases("clearwarnings"),
    check = "is_admin"
)]
pub async fn clearwarns(
    ctx: Context<'_>,
    #[description = "Member"] member: Member,
) -> Result<(), Error> {
    let guild_id = guild_id(ctx)?;
    if ctx.data().warnings.clear(guild_id, member.user.id).await? {
        reply(
            ctx,
            embeds::success(
                "Warnings Cleared",
                &format!("All warnings for {} have been cleared.", member.mention()),
            ),
        )
        .await
    } else {
        reply(
            ctx,
            embeds::info(
                "No Warnings",
                &format!("{} has no warnings.", member.mention()),
            ),
        )
        .await
    }
}

/// Mute a member, optionally for a duration like 10m, 2h or 1d
#[command(prefix_command, slash_command, guild_only, check = "is_mod")]
pub async fn mute(
    ctx: Context<'_>,
    #[description = "Member to mute"] member: Member,
    #[description = "Duration, e.g. 10m, 2h, 1d"] duration: Option<String>,
    #[description = "Reason"]
    #[rest]
    reason: Option<String>,
) -> Result<(), Error> {
    let guild_id = guild_id(ctx)?;
    if member.user.id == ctx.author().id {
        return reply(ctx, embeds::error("Self-Mute Prevented", "You cannot mute yourself.")).await;
    }

    let duration = match duration.as_deref().map(parse_duration).transpose() {
        Ok(duration) => duration,
        Err(e) => return reply(ctx, embeds::error("Invalid Duration", &e.to_string())).await,
    };

    let reason = reason_or_default(reason);
    let request = MuteRequest {
        guild_id,
        user_id: member.user.id,
        moderator_id: ctx.author().id,
        duration,
        reason: reason.clone(),
    };
    match mute_service(ctx).mute(request).await {
        Ok(_) => {
            let length = duration.map_or_else(|| "indefinitely".to_string(), |d| {
                format!("for {}", format_duration(d))
            });
            reply(
                ctx,
                embeds::success(
                    "User Muted",
                    &format!("{} has been muted {length}.\n**Reason:** {reason}", member.mention()),
                ),
            )
            .await
        }
        Err(ModerationError::AlreadyMuted) => {
            reply(
                ctx,
                embeds::error(
                    "Already Muted",
                    &format!("{} is already muted.", member.mention()),
                ),
            )
            .await
        }
        Err(ModerationError::InvalidDuration(e)) => {
            reply(ctx, embeds::error("Invalid Duration", &e.to_string())).await
        }
        Err(e @ ModerationError::MuteRoleUnavailable(_)) => {
            reply(ctx, embeds::error("Mute Failed", &e.to_string())).await
        }
        Err(e) => Err(e.into()),
    }
}

/// Lift a member's mute
#[command(prefix_command, slash_command, guild_only, check = "is_mod")]
pub async fn unmute(
    ctx: Context<'_>,
    #[description = "Member to unmute"] member: Member,
    #[description = "Reason"]
    #[rest]
    reason: Option<String>,
) -> Result<(), Error> {
    let guild_id = guild_id(ctx)?;
    let reason = reason_or_default(reason);
    match mute_service(ctx)
        .unmute(guild_id, member.user.id, ctx.author().id, &reason)
        .await
    {
        Ok(()) => {
            reply(
                ctx,
                embeds::success(
                    "User Unmuted",
                    &format!("{} has been unmuted.", member.mention()),
                ),
            )
            .await
        }
        Err(ModerationError::NotMuted) => {
            reply(
                ctx,
                embeds::error("Not Muted", &format!("{} is not muted.", member.mention())),
            )
            .await
        }
        Err(e) => Err(e.into()),
    }
}

/// Unmute every muted member in this server
#[command(prefix_command, slash_command, guild_only, check = "is_admin")]
pub async fn unmuteall(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = guild_id(ctx)?;
    let count = mute_service(ctx)
        .unmute_all(guild_id, ctx.author().id)
        .await?;
    if count == 0 {
        reply(ctx, embeds::info("No Muted Users", "There are no muted users in this server."))
            .await
    } else {
        reply(
            ctx,
            embeds::success("Mass Unmute", &format!("Unmuted {count} user(s).")),
        )
        .await
    }
}

/// Toggle whether a channel is skipped by nightmode locks
#[command(prefix_command, slash_command, guild_only, check = "is_admin")]
pub async fn ignore(
    ctx: Context<'_>,
    #[description = "Channel, defaults to this one"] channel: Option<GuildChannel>,
) -> Result<(), Error> {
    let guild_id = guild_id(ctx)?;
    let channel_id = channel.map_or_else(|| ctx.channel_id(), |c| c.id);
    let now_ignored = ctx
        .data()
        .guild_configs
        .update(guild_id, |config| toggle(&mut config.ignored_channels, channel_id))
        .await?;

    let description = if now_ignored {
        format!("{} is now ignored.", channel_id.mention())
    } else {
        format!("{} is no longer ignored.", channel_id.mention())
    };
    reply(ctx, embeds::success("Ignored Channels Updated", &description)).await
}

/// List ignored channels
#[command(prefix_command, slash_command, guild_only, check = "is_mod")]
pub async fn ignored(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = guild_id(ctx)?;
    let channels = ctx
        .data()
        .guild_configs
        .peek(guild_id)
        .map(|config| config.ignored_channels)
        .unwrap_or_default();
    reply(
        ctx,
        embeds::info(
            "Ignored Channels",
            &mention_list(
                channels.iter().map(|id| id.mention()),
                "No channels are ignored.",
            ),
        ),
    )
    .await
}

/// Toggle media-only mode for a channel
#[command(
    prefix_command,
    slash_command,
    guild_only,
    aliases("media"),
    check = "is_admin"
)]
pub async fn mediachannel(
    ctx: Context<'_>,
    #[description = "Channel, defaults to this one"] channel: Option<GuildChannel>,
) -> Result<(), Error> {
    let guild_id = guild_id(ctx)?;
    let channel_id = channel.map_or_else(|| ctx.channel_id(), |c| c.id);
    let now_media = ctx
        .data()
        .guild_configs
        .update(guild_id, |config| toggle(&mut config.media_channels, channel_id))
        .await?;

    let description = if now_media {
        format!(
            "{} is now media-only. Messages without images, videos, files or links will be deleted.",
            channel_id.mention()
        )
    } else {
        format!("{} is no longer media-only.", channel_id.mention())
    };
    reply(ctx, embeds::success("Media Channel Updated", &description)).await
}

/// DM a member before they lose access to the server
async fn notify(ctx: Context<'_>, user_id: UserId, title: &str, reason: &str) {
    if let Err(e) = gateway(ctx)
        .direct_message(user_id, title, &format!("**Reason:** {reason}"))
        .await
    {
        debug!(user_id = %user_id, error = %e, "Could not DM member");
    }
}

/// Ban a member from the server
#[command(prefix_command, slash_command, guild_only, check = "is_mod")]
pub async fn ban(
    ctx: Context<'_>,
    #[description = "Member to ban"] member: Member,
    #[description = "Reason"]
    #[rest]
    reason: Option<String>,
) -> Result<(), Error> {
    let guild_id = guild_id(ctx)?;
    if member.user.id == ctx.author().id {
        return reply(ctx, embeds::error("Self-Ban Prevented", "You cannot ban yourself.")).await;
    }

    let reason = reason_or_default(reason);
    notify(ctx, member.user.id, "You have been banned", &reason).await;
    match gateway(ctx)
        .ban(
            guild_id,
            member.user.id,
            &format!("{reason} | Banned by {}", ctx.author().name),
        )
        .await
    {
        Ok(()) => {
            info!(guild_id = %guild_id, user_id = %member.user.id, moderator_id = %ctx.author().id, "Member banned");
            reply(
                ctx,
                embeds::success(
                    "User Banned",
                    &format!("{} was banned.\n**Reason:** {reason}", member.mention()),
                ),
            )
            .await
        }
        Err(GatewayError::Forbidden(_)) => {
            reply(
                ctx,
                embeds::error("Ban Failed", "I don't have permission to ban this user."),
            )
            .await
        }
        Err(e) => Err(e.into()),
    }
}

/// Lift a ban by user id or mention
#[command(prefix_command, slash_command, guild_only, check = "is_mod")]
pub async fn unban(
    ctx: Context<'_>,
    #[description = "User to unban"] user: User,
    #[description = "Reason"]
    #[rest]
    reason: Option<String>,
) -> Result<(), Error> {
    let guild_id = guild_id(ctx)?;
    let reason = reason_or_default(reason);
    match gateway(ctx)
        .unban(
            guild_id,
            user.id,
            &format!("{reason} | Unbanned by {}", ctx.author().name),
        )
        .await
    {
        Ok(()) => {
            info!(guild_id = %guild_id, user_id = %user.id, moderator_id = %ctx.author().id, "User unbanned");
            reply(
                ctx,
                embeds::success(
                    "User Unbanned",
                    &format!("{} was unbanned.\n**Reason:** {reason}", user.name),
                ),
            )
            .await
        }
        Err(GatewayError::NotFound(_)) => {
            reply(
                ctx,
                embeds::error(
                    "User Not Banned",
                    &format!("{} is not banned from this server.", user.name),
                ),
            )
            .await
        }
        Err(GatewayError::Forbidden(_)) => {
            reply(ctx, embeds::error("Unban Failed", "I don't have permission to unban users."))
                .await
        }
        Err(e) => Err(e.into()),
    }
}

/// Kick a member from the server
#[command(prefix_command, slash_command, guild_only, check = "is_mod")]
pub async fn kick(
    ctx: Context<'_>,
    #[description = "Member to kick"] member: Member,
    #[description = "Reason"]
    #[rest]
    reason: Option<String>,
) -> Result<(), Error> {
    let guild_id = guild_id(ctx)?;
    if member.user.id == ctx.author().id {
        return reply(ctx, embeds::error("Self-Kick Prevented", "You cannot kick yourself.")).await;
    }

    let reason = reason_or_default(reason);
    notify(ctx, member.user.id, "You have been kicked", &reason).await;
    match gateway(ctx)
        .kick(
            guild_id,
            member.user.id,
            &format!("{reason} | Kicked by {}", ctx.author().name),
        )
        .await
    {
        Ok(()) => {
            info!(guild_id = %guild_id, user_id = %member.user.id, moderator_id = %ctx.author().id, "Member kicked");
            reply(
                ctx,
                embeds::success(
                    "User Kicked",
                    &format!("{} was kicked.\n**Reason:** {reason}", member.mention()),
                ),
            )
            .await
        }
        Err(GatewayError::Forbidden(_)) => {
            reply(
                ctx,
                embeds::error("Kick Failed", "I don't have permission to kick this user."),
            )
            .await
        }
        Err(e) => Err(e.into()),
    }
}

async fn lock_one(ctx: Context<'_>, channel: Option<GuildChannel>, locked: bool) -> Result<(), Error> {
    let guild_id = guild_id(ctx)?;
    let channel_id = channel.map_or_else(|| ctx.channel_id(), |c| c.id);
    match channel_lock::set_channel_locked(gateway(ctx).as_ref(), guild_id, channel_id, locked).await {
        Ok(()) => {
            let (title, state) = if locked {
                ("Channel Locked", "locked")
            } else {
                ("Channel Unlocked", "unlocked")
            };
            reply(
                ctx,
                embeds::success(title, &format!("{} has been {state}.", channel_id.mention())),
            )
            .await
        }
        Err(GatewayError::Forbidden(_)) => {
            reply(
                ctx,
                embeds::error("Missing Permissions", "I don't have permission to manage that channel."),
            )
            .await
        }
        Err(e) => Err(e.into()),
    }
}

/// Stop @everyone from sending messages in a channel
#[command(prefix_command, slash_command, guild_only, check = "is_mod")]
pub async fn lock(
    ctx: Context<'_>,
    #[description = "Channel, defaults to this one"]
    #[channel_types("Text")]
    channel: Option<GuildChannel>,
) -> Result<(), Error> {
    lock_one(ctx, channel, true).await
}

/// Let @everyone send messages in a channel again
#[command(prefix_command, slash_command, guild_only, check = "is_mod")]
pub async fn unlock(
    ctx: Context<'_>,
    #[description = "Channel, defaults to this one"]
    #[channel_types("Text")]
    channel: Option<GuildChannel>,
) -> Result<(), Error> {
    lock_one(ctx, channel, false).await
}

async fn lock_every(ctx: Context<'_>, locked: bool) -> Result<(), Error> {
    let guild_id = guild_id(ctx)?;
    let (verb, title, done) = if locked {
        ("lock", "Lock All", "Mass Lock Complete")
    } else {
        ("unlock", "Unlock All", "Mass Unlock Complete")
    };
    let confirmed = confirm(
        ctx,
        &format!("{title} Confirmation"),
        &format!(
            "Are you sure you want to {verb} all text channels? Ignored channels are skipped.\n\nReact with ✅ to confirm or ❌ to cancel."
        ),
    )
    .await?;
    if !confirmed {
        return reply(
            ctx,
            embeds::info(&format!("{title} Cancelled"), "Operation has been cancelled."),
        )
        .await;
    }

    let skip = ctx
        .data()
        .guild_configs
        .peek(guild_id)
        .map(|config| config.ignored_channels)
        .unwrap_or_default();
    let changed = channel_lock::set_guild_locked(gateway(ctx).as_ref(), guild_id, locked, &skip).await?;
    info!(guild_id = %guild_id, locked, channels = changed, "Mass channel lock update");
    reply(
        ctx,
        embeds::success(
            done,
            &format!("Successfully {verb}ed {changed} text channel(s)."),
        ),
    )
    .await
}

/// Lock every text channel in the server
#[command(prefix_command, slash_command, guild_only, check = "is_admin")]
pub async fn lockall(ctx: Context<'_>) -> Result<(), Error> {
    lock_every(ctx, true).await
}

/// Unlock every text channel, including ones locked by nightmode
#[command(prefix_command, slash_command, guild_only, check = "is_admin")]
pub async fn unlockall(ctx: Context<'_>) -> Result<(), Error> {
    lock_every(ctx, false).await
}

/// Flip membership of `item`; returns whether it is now present
fn toggle<T: Ord>(set: &mut std::collections::BTreeSet<T>, item: T) -> bool {
    if set.remove(&item) {
        false
    } else {
        set.insert(item);
        true
    }
}
