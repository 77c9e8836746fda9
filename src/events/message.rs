use poise::serenity_prelude as serenity;
use tracing::{debug, warn};

use crate::models::InboundEvent;
use crate::{Data, Error};

/// Handle incoming messages
pub async fn handle_message(
    _ctx: &serenity::Context,
    msg: &serenity::Message,
    data: &Data,
) -> Result<(), Error> {
    // Ignore bot messages
    if msg.author.bot {
        return Ok(());
    }

    // Payments and rejection reasons only arrive by DM
    if msg.guild_id.is_some() {
        return Ok(());
    }

    let Some(event) = inbound_event(msg) else {
        return Ok(());
    };

    debug!("Processing DM from: {}", msg.author.name);
    if let Err(e) = data.workflow.handle_event(event).await {
        warn!("DM from {} not processed: {}", msg.author.id, e);
    }
    Ok(())
}

/// Classify a DM: an image attachment is a payment proof, other text may be a rejection reason
fn inbound_event(msg: &serenity::Message) -> Option<InboundEvent> {
    let sender = msg.author.id.get();

    if let Some(image) = msg.attachments.iter().find(|a| is_image(a)) {
        let display_name = msg
            .author
            .global_name
            .clone()
            .unwrap_or_else(|| msg.author.name.clone());
        return Some(InboundEvent::ProofSubmitted {
            sender,
            display_name,
            proof_ref: image.url.clone(),
        });
    }

    let text = msg.content.trim();
    if text.is_empty() || is_command(text) {
        return None;
    }
    Some(InboundEvent::FreeText {
        sender,
        text: text.to_string(),
    })
}

fn is_image(attachment: &serenity::Attachment) -> bool {
    attachment
        .content_type
        .as_deref()
        .is_some_and(|t| t.starts_with("image/"))
}

fn is_command(text: &str) -> bool {
    text.starts_with(crate::COMMAND_PREFIX) || text.starts_with('/')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commands_are_not_free_text() {
        assert!(is_command("!getkey"));
        assert!(is_command("/status"));
        assert!(!is_command("invalid screenshot"));
    }
}
