use crate::gateway::{Gateway, GatewayResult, everyone_role};
use serenity::all::{ChannelId, GuildId, Permissions};
use std::collections::BTreeSet;
use tracing::debug;

/// `@everyone` overwrite bits after a lock or unlock
///
/// Only the send-messages bit moves. Unlocking leaves it unset rather than
/// allowed so the category's permissions apply again.
#[must_use]
pub fn send_overwrite(
    allow: Permissions,
    deny: Permissions,
    locked: bool,
) -> (Permissions, Permissions) {
    let allow = allow.difference(Permissions::SEND_MESSAGES);
    if locked {
        (allow, deny | Permissions::SEND_MESSAGES)
    } else {
        (allow, deny.difference(Permissions::SEND_MESSAGES))
    }
}

/// Lock or unlock one channel for `@everyone`, keeping the rest of its overwrite
///
/// # Errors
/// Returns the gateway error if the overwrite cannot be read or written.
pub async fn set_channel_locked(
    gateway: &dyn Gateway,
    guild_id: GuildId,
    channel_id: ChannelId,
    locked: bool,
) -> GatewayResult<()> {
    let target = everyone_role(guild_id);
    let (allow, deny) = gateway
        .overwrite_of(channel_id, target)
        .await?
        .map_or((Permissions::empty(), Permissions::empty()), |overwrite| {
            (overwrite.allow, overwrite.deny)
        });
    let (new_allow, new_deny) = send_overwrite(allow, deny, locked);
    if (new_allow, new_deny) == (allow, deny) {
        return Ok(());
    }
    gateway
        .set_overwrite(channel_id, target, new_allow, new_deny)
        .await
}

/// Lock or unlock every text channel not in `skip`; returns how many succeeded
///
/// # Errors
/// Fails only if the channel list cannot be fetched; per-channel failures are
/// logged and skipped.
pub async fn set_guild_locked(
    gateway: &dyn Gateway,
    guild_id: GuildId,
    locked: bool,
    skip: &BTreeSet<ChannelId>,
) -> GatewayResult<usize> {
    let mut changed = 0;
    for channel_id in gateway
        .text_channels(guild_id)
        .await?
        .into_iter()
        .filter(|id| !skip.contains(id))
    {
        match set_channel_locked(gateway, guild_id, channel_id, locked).await {
            Ok(()) => changed += 1,
            Err(e) => debug!(channel_id = %channel_id, locked, error = %e, "Could not update channel lock"),
        }
    }
    Ok(changed)
}
