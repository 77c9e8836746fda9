use async_trait::async_trait;
use poise::serenity_prelude as serenity;
use std::sync::Arc;
use tracing::debug;

use super::Messenger;
use crate::error::Result;
use crate::models::{Decision, DecisionAction, Handle, MessageRef};

/// Delivers messages as Discord DMs through the bot's HTTP client
pub struct DiscordMessenger {
    http: Arc<serenity::Http>,
}

impl DiscordMessenger {
    pub fn new(http: Arc<serenity::Http>) -> Self {
        Self { http }
    }

    async fn dm_channel(&self, handle: Handle) -> Result<serenity::PrivateChannel> {
        Ok(serenity::UserId::new(handle)
            .create_dm_channel(&self.http)
            .await?)
    }
}

fn decision_button(decision: &Decision) -> serenity::CreateButton {
    let (label, style) = match decision.action {
        DecisionAction::Confirm => ("✅ Confirm", serenity::ButtonStyle::Success),
        DecisionAction::Reject => ("❌ Reject", serenity::ButtonStyle::Danger),
    };
    serenity::CreateButton::new(decision.to_string())
        .label(label)
        .style(style)
}

#[async_trait]
impl Messenger for DiscordMessenger {
    async fn notify(&self, handle: Handle, text: &str) -> Result<()> {
        let channel = self.dm_channel(handle).await?;
        channel
            .send_message(&self.http, serenity::CreateMessage::new().content(text))
            .await?;
        debug!("Sent DM to {}", handle);
        Ok(())
    }

    async fn notify_with_decision(
        &self,
        operator: Handle,
        proof_ref: &str,
        caption: &str,
        options: &[Decision],
    ) -> Result<()> {
        let embed = serenity::CreateEmbed::new()
            .title("Payment proof")
            .description(caption)
            .image(proof_ref)
            .color(0x3498db);
        let buttons: Vec<serenity::CreateButton> = options.iter().map(decision_button).collect();

        let channel = self.dm_channel(operator).await?;
        channel
            .send_message(
                &self.http,
                serenity::CreateMessage::new()
                    .embed(embed)
                    .components(vec![serenity::CreateActionRow::Buttons(buttons)]),
            )
            .await?;
        Ok(())
    }

    async fn update_decision_affordance(&self, message: &MessageRef, text: &str) -> Result<()> {
        serenity::ChannelId::new(message.channel_id)
            .edit_message(
                &self.http,
                serenity::MessageId::new(message.message_id),
                serenity::EditMessage::new().content(text).components(vec![]),
            )
            .await?;
        Ok(())
    }
}
