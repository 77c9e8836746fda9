// src/models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::BotError;

/// Stable numeric identity of a person on the chat transport.
pub type Handle = u64;
pub type UserId = i64;
pub type PaymentId = i64;

/// A key issued on the provisioning panel. Key id and expiry only exist together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedKey {
    pub id: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub handle: Handle,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<IssuedKey>,
    pub status: String,
}

impl User {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.key.as_ref().map(|k| k.expires_at)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Confirmed,
    Rejected,
}

impl PaymentStatus {
    pub fn is_pending(self) -> bool {
        self == PaymentStatus::Pending
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Confirmed => "confirmed",
            PaymentStatus::Rejected => "rejected",
        };
        write!(f, "{}", s)
    }
}

/// Terminal outcome of an operator review.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Confirmed,
    Rejected { comment: String },
}

impl Resolution {
    /// Rejection with the operator's reason. Blank reasons are refused.
    pub fn rejected(comment: &str) -> Option<Self> {
        let comment = comment.trim();
        if comment.is_empty() {
            None
        } else {
            Some(Resolution::Rejected {
                comment: comment.to_string(),
            })
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub user_id: UserId,
    /// Opaque reference to the uploaded proof (attachment URL)
    pub proof_ref: String,
    pub status: PaymentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Payment {
    pub fn new(id: PaymentId, user_id: UserId, proof_ref: String) -> Self {
        Self {
            id,
            user_id,
            proof_ref,
            status: PaymentStatus::Pending,
            comment: None,
            created_at: Utc::now(),
        }
    }

    /// Apply a terminal transition. Returns false, leaving the payment
    /// untouched, when it has already been resolved.
    pub fn resolve(&mut self, resolution: &Resolution) -> bool {
        if !self.status.is_pending() {
            return false;
        }
        match resolution {
            Resolution::Confirmed => {
                self.status = PaymentStatus::Confirmed;
                self.comment = None;
            }
            Resolution::Rejected { comment } => {
                self.status = PaymentStatus::Rejected;
                self.comment = Some(comment.clone());
            }
        }
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecisionAction {
    Confirm,
    Reject,
}

/// Operator decision carried by a button press, encoded as `confirm:<id>` / `reject:<id>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Decision {
    pub action: DecisionAction,
    pub payment_id: PaymentId,
}

impl Decision {
    pub fn confirm(payment_id: PaymentId) -> Self {
        Self {
            action: DecisionAction::Confirm,
            payment_id,
        }
    }

    pub fn reject(payment_id: PaymentId) -> Self {
        Self {
            action: DecisionAction::Reject,
            payment_id,
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let action = match self.action {
            DecisionAction::Confirm => "confirm",
            DecisionAction::Reject => "reject",
        };
        write!(f, "{}:{}", action, self.payment_id)
    }
}

impl FromStr for Decision {
    type Err = BotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || BotError::MalformedDecision { raw: s.to_string() };

        let (action, id) = s.split_once(':').ok_or_else(malformed)?;
        let action = match action {
            "confirm" => DecisionAction::Confirm,
            "reject" => DecisionAction::Reject,
            _ => return Err(malformed()),
        };
        let payment_id = id.parse::<PaymentId>().map_err(|_| malformed())?;

        Ok(Self { action, payment_id })
    }
}

/// Message carrying an operator's decision buttons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageRef {
    pub channel_id: u64,
    pub message_id: u64,
}

/// Inbound event delivered by the chat transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    ProofSubmitted {
        sender: Handle,
        display_name: String,
        proof_ref: String,
    },
    DecisionPressed {
        operator: Handle,
        decision: Decision,
        message: MessageRef,
    },
    FreeText {
        sender: Handle,
        text: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_parsing() {
        assert_eq!("confirm:7".parse::<Decision>().unwrap(), Decision::confirm(7));
        assert_eq!("reject:42".parse::<Decision>().unwrap(), Decision::reject(42));

        for raw in ["confirm", "approve:7", "reject:x", "confirm:7:1", ""] {
            assert!(matches!(
                raw.parse::<Decision>(),
                Err(BotError::MalformedDecision { .. })
            ));
        }
    }

    #[test]
    fn test_decision_custom_id() {
        assert_eq!(Decision::reject(9).to_string(), "reject:9");
    }

    #[test]
    fn test_payment_resolves_once() {
        let mut payment = Payment::new(1, 1, "proof".to_string());
        assert!(payment.resolve(&Resolution::rejected("blurry").unwrap()));
        assert_eq!(payment.status, PaymentStatus::Rejected);
        assert_eq!(payment.comment.as_deref(), Some("blurry"));

        assert!(!payment.resolve(&Resolution::Confirmed));
        assert_eq!(payment.status, PaymentStatus::Rejected);
        assert_eq!(payment.comment.as_deref(), Some("blurry"));
    }

    #[test]
    fn test_blank_rejection_refused() {
        assert!(Resolution::rejected("   ").is_none());
    }

    #[test]
    fn test_payment_status_serialization() {
        let json = serde_json::to_string(&PaymentStatus::Confirmed).unwrap();
        assert_eq!(json, "\"confirmed\"");
    }
}
