// src/messages.rs
use chrono::{DateTime, Utc};

use crate::models::{PaymentId, PaymentStatus, UserId};

pub const REGISTER_FIRST: &str = "Please register first with /start.";
pub const NO_KEY: &str = "You don't have an active key. Request one with /getkey.";
pub const PROOF_RECEIVED: &str = "Your payment was sent for review.";
pub const PROOF_NOT_SAVED: &str = "Could not save your payment. Please try again later.";
pub const RENEWAL_FAILED: &str =
    "Could not extend your subscription. Please contact an operator directly.";

pub const CONFIRMED_AFFORDANCE: &str = "✅ Payment confirmed";
pub const REASON_PROMPT: &str = "✍️ Send the rejection reason as a message";
pub const REASON_DELIVERED: &str = "Comment sent to the user.";
pub const REASON_NOT_RECORDED: &str =
    "The rejection could not be saved and the user was not notified. Press reject again to retry.";
pub const REASON_RECORDED_UNDELIVERED: &str =
    "The rejection was saved, but the user could not be notified.";

/// User-visible date format
pub fn format_date(at: DateTime<Utc>) -> String {
    at.format("%d.%m.%Y").to_string()
}

pub fn registered(user_id: UserId) -> String {
    format!("You are registered! Your ID in the system: {}", user_id)
}

pub fn key_issued(key_id: &str, expires_at: DateTime<Utc>) -> String {
    format!(
        "Your new key: `{}`\nValid until {}",
        key_id,
        format_date(expires_at)
    )
}

pub fn key_status(expires_at: DateTime<Utc>) -> String {
    format!("Your key is active until {}", format_date(expires_at))
}

pub fn proof_caption(display_name: &str, user_id: UserId, payment_id: PaymentId) -> String {
    format!(
        "New payment #{} from **{}** (ID {})",
        payment_id, display_name, user_id
    )
}

pub fn payment_confirmed(expires_at: DateTime<Utc>) -> String {
    format!(
        "✅ **Payment confirmed!**\n\nYour subscription now runs until {}.",
        format_date(expires_at)
    )
}

pub fn payment_rejected(comment: &str) -> String {
    format!("❌ **Payment rejected:** {}", comment)
}

pub fn already_resolved(payment_id: PaymentId, status: PaymentStatus) -> String {
    format!("Payment #{} is already {}.", payment_id, status)
}

pub fn renewal_reminder(expires_at: DateTime<Utc>) -> String {
    format!(
        "⏰ **Payment reminder**\n\nYour key is valid until {}. Send a payment screenshot here to renew it.",
        format_date(expires_at)
    )
}

pub fn help_text() -> String {
    "**Getting connected**\n\n\
    • /start registers you\n\
    • /getkey issues your key\n\
    • /status shows when it expires\n\
    • Send a payment screenshot here to renew\n\n\
    **Client apps (Xray/VLESS)**\n\
    iOS: Shadowrocket or Streisand\n\
    Android: V2rayNG or Nekobox\n\
    Windows: V2RayN\n\
    Linux/macOS: Xray-core from the terminal"
        .to_string()
}
