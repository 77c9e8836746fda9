use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::reason_tracker::ReasonTracker;
use super::within;
use crate::error::{BotError, Result};
use crate::messages;
use crate::models::{
    Decision, DecisionAction, Handle, InboundEvent, MessageRef, PaymentId, PaymentStatus,
    Resolution,
};
use crate::provisioning::{SharedProvisioner, KEY_VALIDITY_DAYS};
use crate::state::SharedRecordStore;
use crate::transport::SharedMessenger;

/// What an inbound event did to the payment it concerned
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionOutcome {
    Submitted(PaymentId),
    Confirmed {
        payment_id: PaymentId,
        expires_at: DateTime<Utc>,
    },
    /// User holds no key; the payment stays pending
    MissingKey(PaymentId),
    AwaitingReason(PaymentId),
    Rejected(PaymentId),
    AlreadyResolved(PaymentId, PaymentStatus),
    /// Another transition resolved the payment between our read and our write
    Superseded(PaymentId),
    Ignored,
}

/// Drives a payment from proof submission to confirmation or rejection.
///
/// Every transition makes its external call first and commits the store
/// change only after it succeeds; a failure leaves the payment pending.
pub struct PaymentWorkflow {
    store: SharedRecordStore,
    provisioner: SharedProvisioner,
    messenger: SharedMessenger,
    tracker: ReasonTracker,
    operators: BTreeSet<Handle>,
    deadline: Duration,
}

impl PaymentWorkflow {
    pub fn new(
        store: SharedRecordStore,
        provisioner: SharedProvisioner,
        messenger: SharedMessenger,
        operators: impl IntoIterator<Item = Handle>,
        deadline: Duration,
    ) -> Self {
        Self {
            store,
            provisioner,
            messenger,
            tracker: ReasonTracker::new(),
            operators: operators.into_iter().collect(),
            deadline,
        }
    }

    pub fn is_operator(&self, handle: Handle) -> bool {
        self.operators.contains(&handle)
    }

    pub fn tracker(&self) -> &ReasonTracker {
        &self.tracker
    }

    /// Route an inbound event to its transition
    pub async fn handle_event(&self, event: InboundEvent) -> Result<TransitionOutcome> {
        match event {
            InboundEvent::ProofSubmitted {
                sender,
                display_name,
                proof_ref,
            } => self.submit_proof(sender, &display_name, &proof_ref).await,
            InboundEvent::DecisionPressed {
                operator,
                decision,
                message,
            } => self.handle_decision(operator, decision, message).await,
            InboundEvent::FreeText { sender, text } => {
                self.capture_rejection_reason(sender, &text).await
            }
        }
    }

    /// Record a new pending payment and show it to every operator
    pub async fn submit_proof(
        &self,
        sender: Handle,
        display_name: &str,
        proof_ref: &str,
    ) -> Result<TransitionOutcome> {
        let result = self.create_pending_payment(sender, display_name, proof_ref).await;
        match &result {
            Ok(_) => self.notify(sender, messages::PROOF_RECEIVED).await,
            Err(e @ BotError::UnregisteredUser { .. }) => {
                info!("Proof from unregistered sender {} ignored", sender);
                self.notify(sender, e.user_message()).await
            }
            Err(e) => {
                error!("Failed to record payment from {}: {}", sender, e);
                self.notify(sender, messages::PROOF_NOT_SAVED).await
            }
        };
        result
    }

    async fn create_pending_payment(
        &self,
        sender: Handle,
        display_name: &str,
        proof_ref: &str,
    ) -> Result<TransitionOutcome> {
        let user = self
            .within("getUserByHandle", self.store.get_user_by_handle(sender))
            .await?
            .ok_or(BotError::UnregisteredUser { handle: sender })?;

        let payment = self
            .within("createPayment", self.store.create_payment(user.id, proof_ref))
            .await?;
        info!(
            payment_id = payment.id,
            user_id = user.id,
            "Payment submitted for review"
        );

        let caption = messages::proof_caption(display_name, user.id, payment.id);
        let options = [Decision::confirm(payment.id), Decision::reject(payment.id)];
        for operator in &self.operators {
            if let Err(e) = self
                .messenger
                .notify_with_decision(*operator, proof_ref, &caption, &options)
                .await
            {
                warn!(
                    "Failed to show payment {} to operator {}: {}",
                    payment.id, operator, e
                );
            }
        }

        Ok(TransitionOutcome::Submitted(payment.id))
    }

    /// Apply an operator's button press
    pub async fn handle_decision(
        &self,
        operator: Handle,
        decision: Decision,
        message: MessageRef,
    ) -> Result<TransitionOutcome> {
        if !self.is_operator(operator) {
            warn!("Ignoring decision '{}' from non-operator {}", decision, operator);
            return Ok(TransitionOutcome::Ignored);
        }

        let result = match decision.action {
            DecisionAction::Confirm => self.confirm(operator, decision.payment_id, message).await,
            DecisionAction::Reject => {
                self.request_rejection_reason(operator, decision.payment_id, message)
                    .await
            }
        };

        match result {
            Err(BotError::PaymentNotFound { .. }) => {
                let err = BotError::MalformedDecision {
                    raw: decision.to_string(),
                };
                warn!("Dropping decision from {}: {}", operator, err);
                Err(err)
            }
            other => other,
        }
    }

    /// Extend the owner's key and mark the payment confirmed
    pub async fn confirm(
        &self,
        operator: Handle,
        payment_id: PaymentId,
        message: MessageRef,
    ) -> Result<TransitionOutcome> {
        let payment = self
            .within("getPayment", self.store.get_payment(payment_id))
            .await?;
        if !payment.status.is_pending() {
            debug!(payment_id, status = %payment.status, "Confirm on resolved payment ignored");
            return Ok(TransitionOutcome::AlreadyResolved(payment_id, payment.status));
        }

        let user = self
            .within("getUserById", self.store.get_user_by_id(payment.user_id))
            .await?;
        let Some(key) = user.key.clone() else {
            info!(
                payment_id,
                user_id = user.id,
                "Cannot confirm payment: user has no key"
            );
            self.notify(user.handle, messages::NO_KEY).await;
            return Ok(TransitionOutcome::MissingKey(payment_id));
        };

        let expires_at = match self
            .within(
                "extendKey",
                self.provisioner.extend_key(&key.id, KEY_VALIDITY_DAYS),
            )
            .await
        {
            Ok(expires_at) => expires_at,
            Err(e) => {
                error!(payment_id, key_id = %key.id, "Failed to extend key: {}", e);
                self.notify(user.handle, messages::RENEWAL_FAILED).await;
                return Err(e);
            }
        };

        if let Err(e) = self
            .within(
                "setUserKey",
                self.store.set_user_key(user.id, &key.id, expires_at),
            )
            .await
        {
            error!(payment_id, key_id = %key.id, "Key extended but new expiry not saved: {}", e);
            self.notify(user.handle, messages::RENEWAL_FAILED).await;
            return Err(e);
        }

        match self
            .within(
                "setPaymentStatus",
                self.store.set_payment_status(payment_id, &Resolution::Confirmed),
            )
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                // TODO: decide with stakeholders whether the extension should be revoked here
                warn!(
                    payment_id,
                    key_id = %key.id,
                    "Payment resolved by another operator after the key was extended"
                );
                return Ok(TransitionOutcome::Superseded(payment_id));
            }
            Err(e) => {
                error!(payment_id, "Failed to mark payment confirmed: {}", e);
                self.notify(user.handle, messages::RENEWAL_FAILED).await;
                return Err(e);
            }
        }

        info!(
            payment_id,
            user_id = user.id,
            operator,
            expires_at = %expires_at,
            "Payment confirmed"
        );
        self.notify(user.handle, &messages::payment_confirmed(expires_at))
            .await;
        self.update_affordance(&message, messages::CONFIRMED_AFFORDANCE)
            .await;

        Ok(TransitionOutcome::Confirmed {
            payment_id,
            expires_at,
        })
    }

    /// Remember that `operator` owes a reason for rejecting `payment_id`
    pub async fn request_rejection_reason(
        &self,
        operator: Handle,
        payment_id: PaymentId,
        message: MessageRef,
    ) -> Result<TransitionOutcome> {
        let payment = self
            .within("getPayment", self.store.get_payment(payment_id))
            .await?;
        if !payment.status.is_pending() {
            debug!(payment_id, status = %payment.status, "Reject on resolved payment ignored");
            return Ok(TransitionOutcome::AlreadyResolved(payment_id, payment.status));
        }

        if let Some(previous) = self.tracker.set(operator, payment_id) {
            if previous != payment_id {
                info!(
                    "Operator {} moved pending rejection from payment {} to {}",
                    operator, previous, payment_id
                );
            }
        }
        self.update_affordance(&message, messages::REASON_PROMPT).await;

        Ok(TransitionOutcome::AwaitingReason(payment_id))
    }

    /// Use an operator's text message as the reason for their pending rejection
    pub async fn capture_rejection_reason(
        &self,
        sender: Handle,
        text: &str,
    ) -> Result<TransitionOutcome> {
        if !self.is_operator(sender) {
            return Ok(TransitionOutcome::Ignored);
        }
        let Some(resolution) = Resolution::rejected(text) else {
            return Ok(TransitionOutcome::Ignored);
        };
        let Some(payment_id) = self.tracker.take(sender) else {
            return Ok(TransitionOutcome::Ignored);
        };

        match self.record_rejection(sender, payment_id, &resolution).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                error!(payment_id, "Failed to record rejection: {}", e);
                self.notify(sender, messages::REASON_NOT_RECORDED).await;
                Err(e)
            }
        }
    }

    async fn record_rejection(
        &self,
        operator: Handle,
        payment_id: PaymentId,
        resolution: &Resolution,
    ) -> Result<TransitionOutcome> {
        let Resolution::Rejected { comment } = resolution else {
            return Err(BotError::Internal {
                message: "rejection expected".to_string(),
            });
        };

        let payment = self
            .within("getPayment", self.store.get_payment(payment_id))
            .await?;
        let user = self
            .within("getUserById", self.store.get_user_by_id(payment.user_id))
            .await?;

        // Persist before telling anyone
        let applied = self
            .within(
                "setPaymentStatus",
                self.store.set_payment_status(payment_id, resolution),
            )
            .await?;
        if !applied {
            let status = self
                .within("getPayment", self.store.get_payment(payment_id))
                .await
                .map(|p| p.status)
                .unwrap_or(payment.status);
            info!(payment_id, %status, "Rejection reason arrived for resolved payment");
            self.notify(operator, &messages::already_resolved(payment_id, status))
                .await;
            return Ok(TransitionOutcome::Superseded(payment_id));
        }

        info!(payment_id, user_id = user.id, operator, "Payment rejected");
        if self
            .notify(user.handle, &messages::payment_rejected(comment))
            .await
        {
            self.notify(operator, messages::REASON_DELIVERED).await;
        } else {
            self.notify(operator, messages::REASON_RECORDED_UNDELIVERED)
                .await;
        }

        Ok(TransitionOutcome::Rejected(payment_id))
    }

    async fn within<T>(
        &self,
        operation: &'static str,
        fut: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        within(self.deadline, operation, fut).await
    }

    /// Best-effort direct message; returns whether it was delivered
    async fn notify(&self, handle: Handle, text: &str) -> bool {
        match self.messenger.notify(handle, text).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to message {}: {}", handle, e);
                false
            }
        }
    }

    async fn update_affordance(&self, message: &MessageRef, text: &str) {
        if let Err(e) = self
            .messenger
            .update_decision_affordance(message, text)
            .await
        {
            warn!("Failed to update decision message: {}", e);
        }
    }
}

pub type SharedPaymentWorkflow = Arc<PaymentWorkflow>;
