use tracing::{info, warn};

use crate::messages;
use crate::{Context, Error};

/// Register with the bot
#[poise::command(prefix_command, slash_command)]
pub async fn start(ctx: Context<'_>) -> Result<(), Error> {
    let author = ctx.author();
    let display_name = author.global_name.as_deref().unwrap_or(&author.name);

    let text = match ctx
        .data()
        .accounts
        .register(author.id.get(), display_name)
        .await
    {
        Ok(user) => messages::registered(user.id),
        Err(e) => {
            warn!("Registration failed for {}: {}", author.id, e);
            e.user_message().to_string()
        }
    };
    reply(ctx, text).await
}

/// Get a new access key
#[poise::command(prefix_command, slash_command)]
pub async fn getkey(ctx: Context<'_>) -> Result<(), Error> {
    let text = match ctx.data().accounts.issue_key(ctx.author().id.get()).await {
        Ok(key) => messages::key_issued(&key.id, key.expires_at),
        Err(e) => {
            warn!("Key issue failed for {}: {}", ctx.author().id, e);
            e.user_message().to_string()
        }
    };
    reply(ctx, text).await
}

/// Show when your key expires
#[poise::command(prefix_command, slash_command)]
pub async fn status(ctx: Context<'_>) -> Result<(), Error> {
    let text = match ctx.data().accounts.key_status(ctx.author().id.get()).await {
        Ok(expires_at) => messages::key_status(expires_at),
        Err(e) => {
            info!("Status lookup for {} failed: {}", ctx.author().id, e);
            e.user_message().to_string()
        }
    };
    reply(ctx, text).await
}

async fn reply(ctx: Context<'_>, text: String) -> Result<(), Error> {
    ctx.send(poise::CreateReply::default().content(text).ephemeral(true))
        .await?;
    Ok(())
}
