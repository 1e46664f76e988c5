use super::{guild_id, is_admin, reply};
use crate::{Context, Error, embeds};
use poise::command;

/// Longest prefix a guild may set
pub const MAX_PREFIX_LENGTH: usize = 3;

/// Basic ping command
/// This command is used to check if the bot is responsive.
#[command(prefix_command, slash_command, guild_only)]
pub async fn ping(ctx: Context<'_>) -> Result<(), Error> {
    let latency = ctx.ping().await;
    reply(
        ctx,
        embeds::info("Pong!", &format!("Gateway latency: `{}ms`", latency.as_millis())),
    )
    .await
}

/// Show or change the command prefix for this server
#[command(prefix_command, slash_command, guild_only, check = "is_admin")]
pub async fn prefix(
    ctx: Context<'_>,
    #[description = "New prefix, up to 3 characters"] new_prefix: Option<String>,
) -> Result<(), Error> {
    let guild_id = guild_id(ctx)?;
    let Some(new_prefix) = new_prefix else {
        let current = ctx.data().guild_configs.prefix_for(Some(guild_id));
        return reply(
            ctx,
            embeds::info("Current Prefix", &format!("The current prefix is `{current}`")),
        )
        .await;
    };

    if !is_valid_prefix(&new_prefix) {
        return reply(
            ctx,
            embeds::error(
                "Invalid Prefix",
                &format!("Prefix must be {MAX_PREFIX_LENGTH} characters or less."),
            ),
        )
        .await;
    }

    let stored = new_prefix.clone();
    ctx.data()
        .guild_configs
        .update(guild_id, move |config| config.prefix = stored)
        .await?;
    reply(
        ctx,
        embeds::success(
            "Prefix Changed",
            &format!("Prefix has been changed to `{new_prefix}`"),
        ),
    )
    .await
}

fn is_valid_prefix(prefix: &str) -> bool {
    !prefix.trim().is_empty() && prefix.chars().count() <= MAX_PREFIX_LENGTH
}
