//! Nightmode: periodically lock text channels during a guild's configured hours

use crate::gateway::{Gateway, SharedGateway};
use crate::moderation::lock;
use crate::{CONSOLE_TARGET, Data};
use chrono::Timelike;
use serenity::all::GuildId;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

/// Lock every non-ignored text channel of one guild if its window covers `hour`.
///
/// Only the send permission of each channel's `@everyone` overwrite changes.
/// Returns the number of channels locked. Guilds without a stored config are
/// skipped; per-channel failures are logged and skipped.
pub async fn enforce_guild(data: &Data, gateway: &dyn Gateway, guild_id: GuildId, hour: u32) -> usize {
    let Some(config) = data.guild_configs.peek(guild_id) else {
        return 0;
    };
    if !config.nightmode.is_active_at(hour) {
        return 0;
    }

    match lock::set_guild_locked(gateway, guild_id, true, &config.ignored_channels).await {
        Ok(locked) => locked,
        Err(e) => {
            warn!(guild_id = %guild_id, error = %e, "Nightmode could not list channels");
            0
        }
    }
}

/// One tick across every guild the bot is in
pub async fn run_tick(data: &Data, gateway: &dyn Gateway, hour: u32) -> usize {
    let mut locked = 0;
    for guild_id in gateway.guild_ids() {
        locked += enforce_guild(data, gateway, guild_id, hour).await;
    }
    if locked > 0 {
        info!(hour, channels = locked, "Nightmode locked channels");
    }
    locked
}

/// Spawn the nightmode loop on a fixed interval, using the local wall-clock hour
pub fn spawn(data: Data, gateway: SharedGateway, period: Duration) -> JoinHandle<()> {
    info!(target: CONSOLE_TARGET, period_secs = period.as_secs(), "Starting nightmode scheduler");
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let hour = chrono::Local::now().hour();
            run_tick(&data, gateway.as_ref(), hour).await;
        }
    })
}
