use poise::serenity_prelude as serenity;
use tracing::{info, warn};

use crate::models::{Decision, InboundEvent, MessageRef};
use crate::{Data, Error};

/// Handle a press on one of the confirm/reject buttons
pub async fn handle_component(
    ctx: &serenity::Context,
    component: &serenity::ComponentInteraction,
    data: &Data,
) -> Result<(), Error> {
    // Acknowledge first so Discord does not show the interaction as failed
    component
        .create_response(&ctx.http, serenity::CreateInteractionResponse::Acknowledge)
        .await?;

    let decision: Decision = match component.data.custom_id.parse() {
        Ok(decision) => decision,
        Err(e) => {
            warn!("Dropping button press from {}: {}", component.user.id, e);
            return Ok(());
        }
    };

    info!(
        "Decision '{}' pressed by {} ({})",
        decision, component.user.name, component.user.id
    );

    let event = InboundEvent::DecisionPressed {
        operator: component.user.id.get(),
        decision,
        message: MessageRef {
            channel_id: component.channel_id.get(),
            message_id: component.message.id.get(),
        },
    };
    if let Err(e) = data.workflow.handle_event(event).await {
        warn!("Decision '{}' not applied: {}", decision, e);
    }
    Ok(())
}
