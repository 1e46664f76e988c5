use std::{env, sync::Arc, time::Duration};

use escudo::gateway::{SerenityGateway, SharedGateway};
use escudo::handlers::Handler;
use escudo::moderation::MuteService;
use escudo::settings::BotSettings;
use escudo::{Data, Error, commands, embeds, logging, nightmode};
use poise::serenity_prelude::{self as serenity};
use serenity::GatewayIntents;
use tracing::{error, info, warn};

/// Main function to run the bot
async fn async_main() -> Result<(), Error> {
    // Initialize logging
    logging::init()?;

    let settings = BotSettings::load().await?;
    let token = env::var("DISCORD_TOKEN").map_err(|_| "DISCORD_TOKEN must be set")?;

    // Set up the bot's data
    let data = Data::load(settings).await;
    let handler_data = data.clone();

    // Configure the Poise framework
    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: commands::all(),
            prefix_options: commands::prefix_options(),
            pre_command: |ctx| {
                Box::pin(async move {
                    logging::log_command_start(ctx);
                })
            },
            post_command: |ctx| {
                Box::pin(async move {
                    logging::log_command_end(ctx);
                })
            },
            on_error: |error| {
                Box::pin(async move {
                    logging::log_command_error(&error);
                    if let poise::FrameworkError::Command { error, ctx, .. } = error {
                        let embed = embeds::error("Command Failed", &error.to_string());
                        if let Err(e) = commands::reply(ctx, embed).await {
                            warn!(error = %e, "Could not report command error");
                        }
                    }
                })
            },
            ..Default::default()
        })
        .setup(move |ctx, _ready, framework| {
            Box::pin(async move {
                logging::log_console("Registering commands globally".to_string());
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;

                let gateway: SharedGateway = Arc::new(SerenityGateway::from_context(
                    ctx,
                    data.settings.log_channel.clone(),
                ));
                nightmode::spawn(
                    data.clone(),
                    gateway.clone(),
                    Duration::from_secs(data.settings.nightmode_interval_secs),
                );
                let rearmed = MuteService::new(data.clone(), gateway).rearm().await;
                info!(rearmed, "Restored timed mutes");

                Ok(data)
            })
        })
        .build();

    // Member updates and voice states need the members intent and the cache
    let intents = GatewayIntents::non_privileged()
        | GatewayIntents::MESSAGE_CONTENT
        | GatewayIntents::GUILD_MEMBERS;
    let mut client = serenity::ClientBuilder::new(token, intents)
        .event_handler(Handler::new(handler_data))
        .framework(framework)
        .await?;

    info!("Starting bot...");
    if let Err(err) = client.start().await {
        error!(error = %err, "Client stopped with an error");
        return Err(err.into());
    }

    Ok(())
}

fn main() {
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("Error building runtime: {err}");
            std::process::exit(1);
        }
    };

    // Handle any errors that occurred during execution
    if let Err(err) = runtime.block_on(async_main()) {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}
