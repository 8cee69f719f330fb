use anyhow::Result;
use clap::Parser;
use dotenv::dotenv;
use poise::serenity_prelude as serenity;
use std::sync::Arc;
use tracing::{error, info};

/// Discord bot for the UnionCraft community: member verification, support
/// tickets, and game-server status queries
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Skip re-registering slash commands on startup
    #[arg(long)]
    skip_command_sync: bool,
}

mod commands;
mod config;
mod error;
mod events;
mod managers;
mod messages;
mod query;

use commands::{embed, ip, players, status, ticket, verificacion, version};
use config::BotConfig;
use events::{
    handle_interaction, handle_member_add, handle_member_remove, handle_message,
    notify_interaction_failure,
};
use managers::{
    create_shared_ticket_manager, create_shared_timer_manager,
    create_shared_verification_manager, SharedTicketManager, SharedTimerManager,
    SharedVerificationManager,
};
use query::QueryClient;

type Error = Box<dyn std::error::Error + Send + Sync>;
type Context<'a> = poise::Context<'a, Data, Error>;

/// Shared application state
pub struct Data {
    pub config: Arc<BotConfig>,
    pub verification: SharedVerificationManager,
    pub tickets: SharedTicketManager,
    pub timers: SharedTimerManager,
    pub query: Arc<QueryClient>,
}

async fn event_handler(
    ctx: &serenity::Context,
    event: &serenity::FullEvent,
    _framework: poise::FrameworkContext<'_, Data, Error>,
    data: &Data,
) -> Result<(), Error> {
    match event {
        serenity::FullEvent::Message { new_message } => {
            if let Err(e) = handle_message(ctx, new_message, data).await {
                error!("Failed to handle message: {}", e);
            }
        }
        serenity::FullEvent::GuildMemberAddition { new_member } => {
            if let Err(e) = handle_member_add(ctx, new_member, data).await {
                error!("Failed to handle new member: {}", e);
            }
        }
        serenity::FullEvent::GuildMemberRemoval { user, .. } => {
            if let Err(e) = handle_member_remove(ctx, user, data).await {
                error!("Failed to handle member removal: {}", e);
            }
        }
        serenity::FullEvent::InteractionCreate { interaction } => {
            if let Err(e) = handle_interaction(ctx, interaction, data).await {
                error!("Failed to handle interaction: {}", e);
                notify_interaction_failure(ctx, interaction).await;
            }
        }
        _ => {}
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let args = Args::parse();

    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_level(true),
        )
        .with(tracing_subscriber::filter::LevelFilter::INFO)
        .init();

    let config = Arc::new(BotConfig::from_env()?);

    // Extract bot/application ID from token (first part before the dot, base64 encoded)
    if let Some(bot_id_b64) = config.token.split('.').next() {
        use base64::Engine;
        let decoded = base64::engine::general_purpose::STANDARD_NO_PAD
            .decode(bot_id_b64)
            .or_else(|_| base64::engine::general_purpose::URL_SAFE_NO_PAD.decode(bot_id_b64));
        if let Ok(decoded) = decoded {
            if let Ok(id_str) = String::from_utf8(decoded) {
                info!("Bot ID: {}", id_str);
            }
        }
    }

    let timers = create_shared_timer_manager();
    let verification = create_shared_verification_manager(&config);
    let tickets = create_shared_ticket_manager(config.clone(), timers.clone());
    let query = Arc::new(QueryClient::new(&config.mc_host, config.mc_port));

    let skip_command_sync = args.skip_command_sync;
    let token = config.token.clone();
    let guild_id = config.guild_id;

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: vec![
                status(),
                players(),
                ip(),
                version(),
                verificacion(),
                ticket(),
                embed(),
            ],
            event_handler: |ctx, event, framework, data| {
                Box::pin(event_handler(ctx, event, framework, data))
            },
            pre_command: |ctx| {
                Box::pin(async move {
                    info!(
                        "Command '{}' invoked by {} (ID: {})",
                        ctx.command().qualified_name,
                        ctx.author().name,
                        ctx.author().id,
                    );
                })
            },
            on_error: |error| {
                Box::pin(async move {
                    match error {
                        poise::FrameworkError::Command { error, ctx, .. } => {
                            error!(
                                "Error in command '{}': {}",
                                ctx.command().qualified_name,
                                error
                            );
                            let _ = ctx.say("❌ Ocurrió un error al ejecutar el comando.").await;
                        }
                        poise::FrameworkError::ArgumentParse {
                            error, input, ctx, ..
                        } => {
                            error!(
                                "Argument parse error in '{}': {} (input: {:?})",
                                ctx.command().qualified_name,
                                error,
                                input
                            );
                        }
                        other => {
                            error!("Framework error: {}", other);
                        }
                    }
                })
            },
            ..Default::default()
        })
        .setup(move |ctx, ready, framework| {
            let config = config.clone();
            let verification = verification.clone();
            let tickets = tickets.clone();
            let timers = timers.clone();
            let query = query.clone();

            Box::pin(async move {
                info!("Bot logged in as: {}", ready.user.name);

                if skip_command_sync {
                    info!("--skip-command-sync: Not re-registering slash commands");
                } else {
                    poise::builtins::register_in_guild(
                        ctx,
                        &framework.options().commands,
                        guild_id,
                    )
                    .await?;
                    info!(
                        "Registered {} commands in guild {}",
                        framework.options().commands.len(),
                        guild_id
                    );
                }

                Ok(Data {
                    config,
                    verification,
                    tickets,
                    timers,
                    query,
                })
            })
        })
        .build();

    let intents = serenity::GatewayIntents::non_privileged()
        | serenity::GatewayIntents::MESSAGE_CONTENT
        | serenity::GatewayIntents::GUILD_MEMBERS;
    info!("Requesting privileged intents: MESSAGE_CONTENT, GUILD_MEMBERS");

    let mut client = serenity::ClientBuilder::new(token, intents)
        .framework(framework)
        .await?;

    info!("Starting bot...");
    if let Err(e) = client.start().await {
        let err_str = e.to_string();
        if err_str.contains("Disallowed") || err_str.contains("intents") {
            error!(
                "Failed to start bot: {}. Enable MESSAGE_CONTENT and GUILD_MEMBERS \
                 in the Discord Developer Portal (Bot -> Privileged Gateway Intents).",
                e
            );
        }
        return Err(e.into());
    }

    Ok(())
}
