use thiserror::Error;

#[derive(Error, Debug)]
pub enum BotError {
    // Configuration errors
    #[error("Invalid config: {message}")]
    Config { message: String },

    // Record store errors
    #[error("Failed to load records from '{path}': {source}")]
    StateLoad {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse records file '{path}': {source}")]
    StateParse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to save records to '{path}': {source}")]
    StateSave {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to persist change: {message}")]
    Persistence { message: String },

    #[error("User not found: {user_id}")]
    UserNotFound { user_id: i64 },

    #[error("Payment not found: {payment_id}")]
    PaymentNotFound { payment_id: i64 },

    // Workflow errors
    #[error("Sender {handle} is not registered")]
    UnregisteredUser { handle: u64 },

    #[error("User {user_id} has no key to extend")]
    MissingKey { user_id: i64 },

    #[error("Malformed decision '{raw}'")]
    MalformedDecision { raw: String },

    // Provisioning errors
    #[error("Provisioning panel error: {message}")]
    Provisioning { message: String },

    #[error("Provisioning panel rejected the session again after re-authentication")]
    AuthExhausted,

    #[error("Provisioning panel login failed: {message}")]
    AuthFailed { message: String },

    #[error("Key not found on provisioning panel: {key_id}")]
    KeyNotFound { key_id: String },

    #[error("Operation '{operation}' timed out")]
    Timeout { operation: String },

    // Discord errors
    #[error("Discord API error: {message}")]
    Discord { message: String },

    // Generic errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl BotError {
    /// True for failures of the provisioning panel, including an exhausted
    /// re-authentication budget.
    pub fn is_provisioning(&self) -> bool {
        matches!(
            self,
            BotError::Provisioning { .. }
                | BotError::AuthExhausted
                | BotError::AuthFailed { .. }
                | BotError::Timeout { .. }
        )
    }

    /// Text shown to the subscriber when an operation on their behalf fails.
    pub fn user_message(&self) -> &'static str {
        match self {
            BotError::UnregisteredUser { .. } => messages::REGISTER_FIRST,
            BotError::MissingKey { .. } => messages::NO_KEY,
            BotError::KeyNotFound { .. } => "Your key was not found. Request a new one with /getkey.",
            e if e.is_provisioning() => "The key service is unavailable. Please try again later.",
            _ => "Something went wrong. Please try again later.",
        }
    }
}

impl From<serenity::Error> for BotError {
    fn from(err: serenity::Error) -> Self {
        BotError::Discord {
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for BotError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            BotError::Timeout {
                operation: err
                    .url()
                    .map(|u| u.path().to_string())
                    .unwrap_or_else(|| "panel request".to_string()),
            }
        } else {
            BotError::Provisioning {
                message: err.to_string(),
            }
        }
    }
}

impl From<std::io::Error> for BotError {
    fn from(err: std::io::Error) -> Self {
        BotError::Internal {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for BotError {
    fn from(err: serde_json::Error) -> Self {
        BotError::Internal {
            message: err.to_string(),
        }
    }
}

impl From<tokio_cron_scheduler::JobSchedulerError> for BotError {
    fn from(err: tokio_cron_scheduler::JobSchedulerError) -> Self {
        BotError::Internal {
            message: format!("scheduler: {}", err),
        }
    }
}

pub type Result<T> = std::result::Result<T, BotError>;

use crate::messages;
use poise::serenity_prelude as serenity;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_exhausted_is_provisioning_failure() {
        assert!(BotError::AuthExhausted.is_provisioning());
        assert!(BotError::Timeout {
            operation: "extend".to_string()
        }
        .is_provisioning());
        assert!(!BotError::Persistence {
            message: "disk full".to_string()
        }
        .is_provisioning());
    }

    #[test]
    fn test_user_messages() {
        assert_eq!(
            BotError::UnregisteredUser { handle: 1 }.user_message(),
            messages::REGISTER_FIRST
        );
        assert_eq!(
            BotError::MissingKey { user_id: 1 }.user_message(),
            messages::NO_KEY
        );
        assert!(BotError::KeyNotFound {
            key_id: "abc".to_string()
        }
        .user_message()
        .contains("new one"));
        assert!(BotError::AuthExhausted.user_message().contains("try again later"));
    }
}
