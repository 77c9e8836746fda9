//! Outbound chat surface used by the payment workflow and reminders.

pub mod discord;

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::Result;
use crate::models::{Decision, Handle, MessageRef};

pub use discord::DiscordMessenger;

#[async_trait]
pub trait Messenger: Send + Sync {
    /// Send a direct message
    async fn notify(&self, handle: Handle, text: &str) -> Result<()>;

    /// Show an operator the proof with one button per decision
    async fn notify_with_decision(
        &self,
        operator: Handle,
        proof_ref: &str,
        caption: &str,
        options: &[Decision],
    ) -> Result<()>;

    /// Replace the decision buttons on `message` with `text`
    async fn update_decision_affordance(&self, message: &MessageRef, text: &str) -> Result<()>;
}

pub type SharedMessenger = Arc<dyn Messenger>;
