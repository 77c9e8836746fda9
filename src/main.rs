use anyhow::Result;
use clap::Parser;
use dotenv::dotenv;
use poise::serenity_prelude as serenity;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Discord bot that renews VPN keys once an operator confirms a payment
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Register slash commands per guild instead of globally (faster for testing)
    #[arg(long, short = 's')]
    sync_commands: bool,

    /// Specific guild ID to sync commands to (for testing)
    #[arg(long)]
    guild_id: Option<u64>,

    /// Run one renewal reminder sweep right after start-up
    #[arg(long)]
    sweep_now: bool,
}

mod commands;
mod config;
mod error;
mod events;
mod logging;
mod managers;
mod messages;
mod models;
mod provisioning;
mod scheduler;
mod state;
mod transport;

use commands::{getkey, help, logs, ping, start, status};
use config::BotConfig;
use events::{handle_component, handle_message};
use logging::SharedLogBuffer;
use managers::{
    AccountManager, PaymentWorkflow, RenewalNotifier, SharedAccountManager, SharedPaymentWorkflow,
};
use provisioning::SharedProvisioner;
use state::{JsonRecordStore, SharedRecordStore};
use transport::{DiscordMessenger, SharedMessenger};

type Error = Box<dyn std::error::Error + Send + Sync>;
type Context<'a> = poise::Context<'a, Data, Error>;

/// Prefix for text commands sent by DM
pub const COMMAND_PREFIX: &str = "!";

/// Shared application state
pub struct Data {
    pub workflow: SharedPaymentWorkflow,
    pub accounts: SharedAccountManager,
    pub log_buffer: SharedLogBuffer,
    /// Keeps the reminder job alive
    _reminders: tokio_cron_scheduler::JobScheduler,
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
        serenity::FullEvent::InteractionCreate { interaction } => {
            if let Some(component) = interaction.as_message_component() {
                if let Err(e) = handle_component(ctx, component, data).await {
                    error!("Failed to handle button press: {}", e);
                }
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

    let config = BotConfig::from_env()?;
    let log_buffer = logging::init_tracing(config.log_level, config.log_buffer_size);

    if config.operator_ids.is_empty() {
        warn!("OPERATOR_IDS is empty: submitted payments cannot be reviewed");
    } else {
        info!("{} operator(s) configured", config.operator_ids.len());
    }

    // Ensure state directory exists
    tokio::fs::create_dir_all(&config.state_path).await?;

    info!("Loading records...");
    let store: SharedRecordStore = Arc::new(JsonRecordStore::open(config.records_path()).await?);

    info!(
        "Using provisioning panel at {} ({:?})",
        config.panel.base_url, config.panel_auth
    );
    let panel = provisioning::build_panel_client(&config.panel, &config.panel_auth)?;
    if let Err(e) = panel.authenticate().await {
        // Calls log in lazily, so the bot can still start while the panel is down
        warn!("Initial panel login failed: {}", e);
    }
    let provisioner: SharedProvisioner = Arc::new(panel);

    let sync_commands = args.sync_commands;
    let target_guild_id = args.guild_id;
    let sweep_now = args.sweep_now;
    if sync_commands {
        info!("--sync-commands: Will register commands per-guild");
    }
    if let Some(gid) = target_guild_id {
        info!("--guild-id: Targeting specific guild {}", gid);
    }

    let setup_config = config.clone();

    // Build framework
    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: vec![start(), getkey(), status(), help(), ping(), logs()],
            prefix_options: poise::PrefixFrameworkOptions {
                prefix: Some(COMMAND_PREFIX.to_string()),
                ..Default::default()
            },
            event_handler: |ctx, event, framework, data| {
                Box::pin(event_handler(ctx, event, framework, data))
            },
            pre_command: |ctx| {
                Box::pin(async move {
                    info!(
                        "Command '{}' invoked by {} (ID: {})",
                        ctx.command().qualified_name,
                        ctx.author().name,
                        ctx.author().id
                    );
                })
            },
            on_error: |error| {
                Box::pin(async move {
                    match error {
                        poise::FrameworkError::Command { error, ctx, .. } => {
                            error!("Error in command '{}': {}", ctx.command().qualified_name, error);
                            let _ = ctx.say("Something went wrong. Please try again later.").await;
                        }
                        poise::FrameworkError::ArgumentParse { error, input, ctx, .. } => {
                            error!("Argument parse error in '{}': {} (input: {:?})", ctx.command().qualified_name, error, input);
                        }
                        other => {
                            error!("Other framework error: {}", other);
                        }
                    }
                })
            },
            ..Default::default()
        })
        .setup(move |ctx, ready, framework| {
            let config = setup_config.clone();
            let store = store.clone();
            let provisioner = provisioner.clone();
            let log_buffer = log_buffer.clone();

            Box::pin(async move {
                info!("Bot logged in as: {}", ready.user.name);

                if sync_commands || target_guild_id.is_some() {
                    let guilds: Vec<serenity::GuildId> = match target_guild_id {
                        Some(gid) => vec![serenity::GuildId::new(gid)],
                        None => ready.guilds.iter().map(|g| g.id).collect(),
                    };
                    for guild_id in &guilds {
                        if let Err(e) = poise::builtins::register_in_guild(
                            ctx,
                            &framework.options().commands,
                            *guild_id,
                        )
                        .await
                        {
                            error!("Failed to register commands for guild {}: {}", guild_id, e);
                        } else {
                            info!("Registered {} commands for guild {}", framework.options().commands.len(), guild_id);
                        }
                    }
                } else {
                    info!("Registering commands globally...");
                    if let Err(e) =
                        poise::builtins::register_globally(ctx, &framework.options().commands).await
                    {
                        error!("Failed to register commands globally: {}", e);
                    }
                }

                let messenger: SharedMessenger = Arc::new(DiscordMessenger::new(ctx.http.clone()));

                let workflow = Arc::new(PaymentWorkflow::new(
                    store.clone(),
                    provisioner.clone(),
                    messenger.clone(),
                    config.operator_ids.iter().copied(),
                    config.request_deadline,
                ));
                let accounts = Arc::new(AccountManager::new(
                    store.clone(),
                    provisioner,
                    config.request_deadline,
                ));
                let notifier = Arc::new(RenewalNotifier::new(
                    store,
                    messenger,
                    config.request_deadline,
                ));

                let reminders =
                    scheduler::start_reminders(notifier.clone(), &config.reminder_cron).await?;

                if sweep_now {
                    tokio::spawn(async move {
                        match notifier.sweep_from(chrono::Utc::now()).await {
                            Ok(reminded) => info!("Start-up sweep reminded {} users", reminded),
                            Err(e) => error!("Start-up sweep failed: {}", e),
                        }
                    });
                }

                Ok(Data {
                    workflow,
                    accounts,
                    log_buffer,
                    _reminders: reminders,
                })
            })
        })
        .build();

    let intents = serenity::GatewayIntents::non_privileged()
        | serenity::GatewayIntents::DIRECT_MESSAGES
        | serenity::GatewayIntents::MESSAGE_CONTENT;

    let mut client = serenity::ClientBuilder::new(&config.discord_token, intents)
        .framework(framework)
        .await?;

    info!("Starting bot...");
    if let Err(e) = client.start().await {
        error!("Failed to start bot: {}", e);
        return Err(e.into());
    }
    warn!("Bot ended.");

    Ok(())
}
