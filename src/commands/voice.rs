use super::{author_permissions, author_voice_channel, confirm, gateway, guild_id, is_admin, reply};
use crate::gateway::GatewayError;
use crate::voice::{JoinToCreate, Requester, VoiceError, VoiceResult};
use crate::{Context, Error, embeds};
use poise::command;
use serenity::all::{ChannelId, GuildChannel, GuildId, Member, Mentionable};

/// Turn a service result into a reply; user-facing failures become error embeds
async fn respond<T>(
    ctx: Context<'_>,
    result: VoiceResult<T>,
    success: impl FnOnce(T) -> (String, String),
) -> Result<(), Error> {
    match result {
        Ok(value) => {
            let (title, description) = success(value);
            reply(ctx, embeds::success(&title, &description)).await
        }
        Err(e @ (VoiceError::Store(_) | VoiceError::Gateway(GatewayError::Discord(_)))) => {
            Err(e.into())
        }
        Err(VoiceError::Gateway(GatewayError::Forbidden(_))) => {
            reply(
                ctx,
                embeds::error(
                    "Missing Permissions",
                    "I don't have permission to manage that channel.",
                ),
            )
            .await
        }
        Err(e) => reply(ctx, embeds::error("Join to Create", &e.to_string())).await,
    }
}

/// The author's current channel plus who they are, or an error reply
async fn requester_channel(ctx: Context<'_>) -> Result<Option<(GuildId, ChannelId, Requester)>, Error> {
    let guild_id = guild_id(ctx)?;
    let Some(channel_id) = author_voice_channel(ctx) else {
        reply(
            ctx,
            embeds::error("Not in Voice", "You need to be in a voice channel to use this command."),
        )
        .await?;
        return Ok(None);
    };
    let requester = Requester {
        user_id: ctx.author().id,
        can_manage_channels: author_permissions(ctx).await.manage_channels(),
    };
    Ok(Some((guild_id, channel_id, requester)))
}

/// Set up Join to Create, creating the hub channel when none is given
#[command(
    prefix_command,
    slash_command,
    guild_only,
    aliases("setupj2c", "j2csetup"),
    check = "is_admin"
)]
pub async fn setup(
    ctx: Context<'_>,
    #[description = "Existing voice channel to use as the hub"]
    #[channel_types("Voice")]
    channel: Option<GuildChannel>,
    #[description = "Category for the temporary channels"]
    #[channel_types("Category")]
    category: Option<GuildChannel>,
) -> Result<(), Error> {
    let guild_id = guild_id(ctx)?;
    let gateway = gateway(ctx);
    let result = JoinToCreate::new(ctx.data(), gateway.as_ref())
        .setup(
            guild_id,
            channel.map(|c| c.id),
            category.map(|c| c.id),
        )
        .await;
    respond(ctx, result, |hub| {
        (
            "Join to Create Setup".to_string(),
            format!(
                "Join to Create system has been set up with {} as the creation channel.",
                hub.mention()
            ),
        )
    })
    .await
}

/// Remove Join to Create and delete its temporary channels
#[command(
    prefix_command,
    slash_command,
    guild_only,
    aliases("removej2c", "j2cremove"),
    check = "is_admin"
)]
pub async fn remove(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = guild_id(ctx)?;
    if ctx.data().join_to_create.get(guild_id).is_none() {
        return reply(
            ctx,
            embeds::error("Not Set Up", &VoiceError::NotConfigured.to_string()),
        )
        .await;
    }
    let confirmed = confirm(
        ctx,
        "Confirm Removal",
        "Are you sure you want to remove the Join to Create system? All temporary channels will be deleted.\n\nReact with ✅ to confirm or ❌ to cancel.",
    )
    .await?;
    if !confirmed {
        return reply(
            ctx,
            embeds::info("Removal Cancelled", "Join to Create system removal has been cancelled."),
        )
        .await;
    }

    let gateway = gateway(ctx);
    let result = JoinToCreate::new(ctx.data(), gateway.as_ref())
        .remove(guild_id)
        .await;
    respond(ctx, result, |deleted| {
        (
            "Join to Create Removed".to_string(),
            format!("Join to Create system has been removed. {deleted} temporary channels were deleted."),
        )
    })
    .await
}

/// Set the user limit of your voice channel (0 for unlimited)
#[command(prefix_command, slash_command, guild_only, aliases("vlimit"))]
pub async fn limit(
    ctx: Context<'_>,
    #[description = "User limit, 0 to 99"] limit: u32,
) -> Result<(), Error> {
    let Some((guild_id, channel_id, requester)) = requester_channel(ctx).await? else {
        return Ok(());
    };
    let gateway = gateway(ctx);
    let result = JoinToCreate::new(ctx.data(), gateway.as_ref())
        .set_limit(guild_id, channel_id, requester, limit)
        .await;
    respond(ctx, result, |()| {
        let description = if limit == 0 {
            "Your channel no longer has a user limit.".to_string()
        } else {
            format!("Your channel now allows {limit} user(s).")
        };
        ("User Limit Updated".to_string(), description)
    })
    .await
}

/// Rename your voice channel
#[command(prefix_command, slash_command, guild_only, aliases("rename", "vname"))]
pub async fn name(
    ctx: Context<'_>,
    #[description = "New channel name"]
    #[rest]
    new_name: String,
) -> Result<(), Error> {
    let Some((guild_id, channel_id, requester)) = requester_channel(ctx).await? else {
        return Ok(());
    };
    let gateway = gateway(ctx);
    let result = JoinToCreate::new(ctx.data(), gateway.as_ref())
        .rename(guild_id, channel_id, requester, &new_name)
        .await;
    respond(ctx, result, |()| {
        (
            "Channel Renamed".to_string(),
            format!("Your channel is now called **{}**.", new_name.trim()),
        )
    })
    .await
}

/// Lock your voice channel
#[command(prefix_command, slash_command, guild_only)]
pub async fn vlock(ctx: Context<'_>) -> Result<(), Error> {
    set_locked(ctx, true).await
}

/// Unlock your voice channel
#[command(prefix_command, slash_command, guild_only)]
pub async fn vunlock(ctx: Context<'_>) -> Result<(), Error> {
    set_locked(ctx, false).await
}

async fn set_locked(ctx: Context<'_>, locked: bool) -> Result<(), Error> {
    let Some((guild_id, channel_id, requester)) = requester_channel(ctx).await? else {
        return Ok(());
    };
    let gateway = gateway(ctx);
    let result = JoinToCreate::new(ctx.data(), gateway.as_ref())
        .set_locked(guild_id, channel_id, requester, locked)
        .await;
    respond(ctx, result, |()| {
        if locked {
            (
                "Channel Locked".to_string(),
                "Nobody else can join your channel.".to_string(),
            )
        } else {
            (
                "Channel Unlocked".to_string(),
                "Everyone can join your channel again.".to_string(),
            )
        }
    })
    .await
}

/// Claim a voice channel whose owner has left
#[command(prefix_command, slash_command, guild_only, aliases("vclaim"))]
pub async fn claim(ctx: Context<'_>) -> Result<(), Error> {
    let Some((guild_id, channel_id, requester)) = requester_channel(ctx).await? else {
        return Ok(());
    };
    let gateway = gateway(ctx);
    let result = JoinToCreate::new(ctx.data(), gateway.as_ref())
        .claim(guild_id, channel_id, requester.user_id)
        .await;
    respond(ctx, result, |_previous| {
        (
            "Channel Claimed".to_string(),
            format!("{} now owns this channel.", requester.user_id.mention()),
        )
    })
    .await
}

/// Kick a member from your voice channel
#[command(prefix_command, slash_command, guild_only, aliases("channelkick"))]
pub async fn ckick(
    ctx: Context<'_>,
    #[description = "Member to kick"] member: Member,
) -> Result<(), Error> {
    let Some((guild_id, channel_id, requester)) = requester_channel(ctx).await? else {
        return Ok(());
    };
    let gateway = gateway(ctx);
    let result = JoinToCreate::new(ctx.data(), gateway.as_ref())
        .kick(guild_id, channel_id, requester, member.user.id)
        .await;
    respond(ctx, result, |()| {
        (
            "Member Kicked".to_string(),
            format!("{} has been kicked from your channel.", member.mention()),
        )
    })
    .await
}

/// Allow a member into your voice channel
#[command(prefix_command, slash_command, guild_only, aliases("allow", "vpermit"))]
pub async fn permit(
    ctx: Context<'_>,
    #[description = "Member to allow"] member: Member,
) -> Result<(), Error> {
    let Some((guild_id, channel_id, requester)) = requester_channel(ctx).await? else {
        return Ok(());
    };
    let gateway = gateway(ctx);
    let result = JoinToCreate::new(ctx.data(), gateway.as_ref())
        .permit(guild_id, channel_id, requester, member.user.id)
        .await;
    respond(ctx, result, |()| {
        (
            "Member Permitted".to_string(),
            format!("{} can now join your channel.", member.mention()),
        )
    })
    .await
}

/// Block a member from your voice channel
#[command(prefix_command, slash_command, guild_only, aliases("vdeny"))]
pub async fn deny(
    ctx: Context<'_>,
    #[description = "Member to block"] member: Member,
) -> Result<(), Error> {
    let Some((guild_id, channel_id, requester)) = requester_channel(ctx).await? else {
        return Ok(());
    };
    let gateway = gateway(ctx);
    let result = JoinToCreate::new(ctx.data(), gateway.as_ref())
        .deny(guild_id, channel_id, requester, member.user.id)
        .await;
    respond(ctx, result, |()| {
        (
            "Member Denied".to_string(),
            format!("{} can no longer join your channel.", member.mention()),
        )
    })
    .await
}
