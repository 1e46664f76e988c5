use super::{
    ListAction, RoleTier, Toggle, confirm, guild_id, is_admin, is_owner, mention_list, reply,
};
use crate::{Context, Error, embeds};
use poise::command;
use serenity::all::{Mentionable, Role, User};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, poise::ChoiceParameter)]
pub enum NightmodeAction {
    #[name = "on"]
    On,
    #[name = "off"]
    Off,
    #[name = "setup"]
    Setup,
}

/// Show or toggle antinuke protection
#[command(
    prefix_command,
    slash_command,
    guild_only,
    aliases("an"),
    check = "is_admin"
)]
pub async fn antinuke(
    ctx: Context<'_>,
    #[description = "Turn protection on or off"] status: Option<Toggle>,
) -> Result<(), Error> {
    let guild_id = guild_id(ctx)?;
    let Some(status) = status else {
        let enabled = ctx.data().guild_configs.get(guild_id).await?.antinuke.enabled;
        return reply(
            ctx,
            embeds::info(
                "Antinuke Status",
                &format!("Antinuke protection is currently **{}**.", enabled_label(enabled)),
            ),
        )
        .await;
    };

    let enabled = status.enabled();
    ctx.data()
        .guild_configs
        .update(guild_id, |config| config.antinuke.enabled = enabled)
        .await?;
    info!(guild_id = %guild_id, enabled, "Antinuke toggled");
    reply(
        ctx,
        embeds::success(
            "Antinuke Updated",
            &format!("Antinuke protection is now **{}**.", enabled_label(enabled)),
        ),
    )
    .await
}

/// Exempt a user from antinuke
#[command(
    prefix_command,
    slash_command,
    guild_only,
    aliases("wl"),
    check = "is_admin"
)]
pub async fn whitelist(
    ctx: Context<'_>,
    #[description = "User to trust"] user: User,
) -> Result<(), Error> {
    let guild_id = guild_id(ctx)?;
    if ctx.data().whitelist.add(guild_id, user.id).await? {
        reply(
            ctx,
            embeds::success(
                "User Whitelisted",
                &format!("{} has been added to the whitelist.", user.mention()),
            ),
        )
        .await
    } else {
        reply(
            ctx,
            embeds::info(
                "Already Whitelisted",
                &format!("{} is already whitelisted.", user.mention()),
            ),
        )
        .await
    }
}

/// Remove a user from the antinuke whitelist
#[command(
    prefix_command,
    slash_command,
    guild_only,
    aliases("unwl"),
    check = "is_admin"
)]
pub async fn unwhitelist(
    ctx: Context<'_>,
    #[description = "User to remove"] user: User,
) -> Result<(), Error> {
    let guild_id = guild_id(ctx)?;
    if ctx.data().whitelist.remove(guild_id, user.id).await? {
        reply(
            ctx,
            embeds::success(
                "User Removed",
                &format!("{} has been removed from the whitelist.", user.mention()),
            ),
        )
        .await
    } else {
        reply(
            ctx,
            embeds::error(
                "Not Whitelisted",
                &format!("{} is not whitelisted.", user.mention()),
            ),
        )
        .await
    }
}

/// List whitelisted users
#[command(
    prefix_command,
    slash_command,
    guild_only,
    aliases("wlist"),
    check = "is_admin"
)]
pub async fn wlisted(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = guild_id(ctx)?;
    let users = ctx.data().whitelist.list(guild_id);
    reply(
        ctx,
        embeds::info(
            "Whitelisted Users",
            &mention_list(users.iter().map(|id| id.mention()), "No users are whitelisted."),
        ),
    )
    .await
}

/// Clear the whitelist after confirmation
#[command(
    prefix_command,
    slash_command,
    guild_only,
    aliases("wlreset"),
    check = "is_admin"
)]
pub async fn whitelistreset(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = guild_id(ctx)?;
    if ctx.data().whitelist.list(guild_id).is_empty() {
        return reply(
            ctx,
            embeds::info("Whitelist Empty", "There are no whitelisted users to remove."),
        )
        .await;
    }

    let confirmed = confirm(
        ctx,
        "Reset Whitelist",
        "This removes every whitelisted user. React with ✅ to confirm or ❌ to cancel.",
    )
    .await?;
    if !confirmed {
        return reply(
            ctx,
            embeds::info("Cancelled", "The whitelist was left unchanged."),
        )
        .await;
    }

    let removed = ctx.data().whitelist.reset(guild_id).await?;
    info!(guild_id = %guild_id, removed, "Whitelist reset");
    reply(
        ctx,
        embeds::success(
            "Whitelist Reset",
            &format!("Removed {removed} user(s) from the whitelist."),
        ),
    )
    .await
}

/// Show, toggle or schedule nightmode
#[command(
    prefix_command,
    slash_command,
    guild_only,
    aliases("nm"),
    check = "is_admin"
)]
pub async fn nightmode(
    ctx: Context<'_>,
    #[description = "on, off or setup"] action: Option<NightmodeAction>,
    #[description = "Start hour (0-23)"] start: Option<u32>,
    #[description = "End hour (0-23)"] end: Option<u32>,
) -> Result<(), Error> {
    let guild_id = guild_id(ctx)?;
    let data = ctx.data();

    match action {
        None => {
            let settings = data.guild_configs.get(guild_id).await?.nightmode;
            reply(
                ctx,
                embeds::info(
                    "Nightmode Status",
                    &format!(
                        "Nightmode is **{}**.\nActive from `{:02}:00` to `{:02}:00`.",
                        enabled_label(settings.enabled),
                        settings.start_hour,
                        settings.end_hour
                    ),
                ),
            )
            .await
        }
        Some(NightmodeAction::On | NightmodeAction::Off) => {
            let enabled = action == Some(NightmodeAction::On);
            data.guild_configs
                .update(guild_id, |config| config.nightmode.enabled = enabled)
                .await?;
            info!(guild_id = %guild_id, enabled, "Nightmode toggled");
            reply(
                ctx,
                embeds::success(
                    "Nightmode Updated",
                    &format!("Nightmode is now **{}**.", enabled_label(enabled)),
                ),
            )
            .await
        }
        Some(NightmodeAction::Setup) => {
            let (Some(start), Some(end)) = (start, end) else {
                return reply(
                    ctx,
                    embeds::error("Missing Hours", "Usage: `nightmode setup <start> <end>`"),
                )
                .await;
            };
            if !valid_hours(start, end) {
                return reply(
                    ctx,
                    embeds::error("Invalid Hours", "Hours must be between 0 and 23."),
                )
                .await;
            }
            data.guild_configs
                .update(guild_id, |config| {
                    config.nightmode.start_hour = start;
                    config.nightmode.end_hour = end;
                })
                .await?;
            reply(
                ctx,
                embeds::success(
                    "Nightmode Scheduled",
                    &format!("Nightmode will run from `{start:02}:00` to `{end:02}:00`."),
                ),
            )
            .await
        }
    }
}

/// Add or remove an extra owner for this server
#[command(prefix_command, slash_command, guild_only, check = "is_owner")]
pub async fn extraowner(
    ctx: Context<'_>,
    #[description = "User to promote or demote"] user: User,
    #[description = "add or remove"] action: Option<ListAction>,
) -> Result<(), Error> {
    let guild_id = guild_id(ctx)?;
    let owners = &ctx.data().extra_owners;

    match action.unwrap_or(ListAction::Add) {
        ListAction::Add => {
            if owners.add(guild_id, user.id).await? {
                info!(guild_id = %guild_id, user_id = %user.id, "Extra owner added");
                reply(
                    ctx,
                    embeds::success(
                        "Extra Owner Added",
                        &format!("{} has been added as an extra owner.", user.mention()),
                    ),
                )
                .await
            } else {
                reply(
                    ctx,
                    embeds::info(
                        "Already an Owner",
                        &format!("{} is already an extra owner.", user.mention()),
                    ),
                )
                .await
            }
        }
        ListAction::Remove => {
            if owners.remove(guild_id, user.id).await? {
                info!(guild_id = %guild_id, user_id = %user.id, "Extra owner removed");
                reply(
                    ctx,
                    embeds::success(
                        "Extra Owner Removed",
                        &format!("{} has been removed from extra owners.", user.mention()),
                    ),
                )
                .await
            } else {
                reply(
                    ctx,
                    embeds::error(
                        "Not an Owner",
                        &format!("{} is not an extra owner.", user.mention()),
                    ),
                )
                .await
            }
        }
    }
}

/// Toggle a main admin or mod role, or list them
#[command(prefix_command, slash_command, guild_only, check = "is_admin")]
pub async fn mainrole(
    ctx: Context<'_>,
    #[description = "admin or mod"] tier: RoleTier,
    #[description = "Role to toggle"] role: Option<Role>,
) -> Result<(), Error> {
    manage_tier(ctx, tier, role).await
}

/// Toggle a main admin role, or list them
#[command(
    prefix_command,
    slash_command,
    guild_only,
    aliases("adminrole"),
    check = "is_admin"
)]
pub async fn admin(
    ctx: Context<'_>,
    #[description = "Role to toggle"] role: Option<Role>,
) -> Result<(), Error> {
    manage_tier(ctx, RoleTier::Admin, role).await
}

/// Toggle a main mod role, or list them
#[command(
    prefix_command,
    slash_command,
    guild_only,
    rename = "mod",
    aliases("modrole"),
    check = "is_admin"
)]
pub async fn mod_role(
    ctx: Context<'_>,
    #[description = "Role to toggle"] role: Option<Role>,
) -> Result<(), Error> {
    manage_tier(ctx, RoleTier::Mod, role).await
}

async fn manage_tier(ctx: Context<'_>, tier: RoleTier, role: Option<Role>) -> Result<(), Error> {
    let guild_id = guild_id(ctx)?;
    let configs = &ctx.data().guild_configs;

    let Some(role) = role else {
        let config = configs.get(guild_id).await?;
        let roles = match tier {
            RoleTier::Admin => config.admin_roles,
            RoleTier::Mod => config.mod_roles,
        };
        return reply(
            ctx,
            embeds::info(
                &format!("Main {} Roles", tier.label()),
                &mention_list(
                    roles.iter().map(|id| id.mention()),
                    &format!("No {} roles are set.", tier.label()),
                ),
            ),
        )
        .await;
    };

    let role_id = role.id;
    let added = configs
        .update(guild_id, |config| {
            let roles = match tier {
                RoleTier::Admin => &mut config.admin_roles,
                RoleTier::Mod => &mut config.mod_roles,
            };
            if roles.remove(&role_id) {
                false
            } else {
                roles.insert(role_id);
                true
            }
        })
        .await?;

    let verb = if added { "added to" } else { "removed from" };
    reply(
        ctx,
        embeds::success(
            "Main Role Updated",
            &format!("{} has been {verb} the {} roles.", role.mention(), tier.label()),
        ),
    )
    .await
}

const fn enabled_label(enabled: bool) -> &'static str {
    if enabled { "enabled" } else { "disabled" }
}

const fn valid_hours(start: u32, end: u32) -> bool {
    start < 24 && end < 24
}
