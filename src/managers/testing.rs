//! Fakes for the workflow's collaborators.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{BotError, Result};
use crate::models::{
    Decision, Handle, IssuedKey, MessageRef, Payment, PaymentId, Resolution, User, UserId,
};
use crate::provisioning::{Provisioner, KEY_VALIDITY_DAYS};
use crate::state::record_store::RecordStore;
use crate::state::JsonRecordStore;
use crate::transport::Messenger;

#[derive(Default)]
pub struct RecordingMessenger {
    pub notes: Mutex<Vec<(Handle, String)>>,
    pub decisions: Mutex<Vec<(Handle, String, Vec<Decision>)>>,
    pub affordances: Mutex<Vec<(MessageRef, String)>>,
    pub unreachable: Mutex<HashSet<Handle>>,
}

impl RecordingMessenger {
    pub fn notes_for(&self, handle: Handle) -> Vec<String> {
        self.notes
            .lock()
            .iter()
            .filter(|(h, _)| *h == handle)
            .map(|(_, text)| text.clone())
            .collect()
    }

    pub fn last_affordance(&self) -> Option<String> {
        self.affordances.lock().last().map(|(_, text)| text.clone())
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn notify(&self, handle: Handle, text: &str) -> Result<()> {
        if self.unreachable.lock().contains(&handle) {
            return Err(BotError::Discord {
                message: "cannot DM user".to_string(),
            });
        }
        self.notes.lock().push((handle, text.to_string()));
        Ok(())
    }

    async fn notify_with_decision(
        &self,
        operator: Handle,
        _proof_ref: &str,
        caption: &str,
        options: &[Decision],
    ) -> Result<()> {
        self.decisions
            .lock()
            .push((operator, caption.to_string(), options.to_vec()));
        Ok(())
    }

    async fn update_decision_affordance(&self, message: &MessageRef, text: &str) -> Result<()> {
        self.affordances.lock().push((*message, text.to_string()));
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeProvisioner {
    pub extend_calls: Mutex<Vec<(String, i64)>>,
    pub deleted: Mutex<Vec<String>>,
    pub expiries: Mutex<HashMap<String, DateTime<Utc>>>,
    pub fail_extend: AtomicBool,
    pub fail_create: AtomicBool,
}

impl FakeProvisioner {
    pub fn extend_count(&self) -> usize {
        self.extend_calls.lock().len()
    }
}

#[async_trait]
impl Provisioner for FakeProvisioner {
    async fn create_key(&self, subscriber: UserId) -> Result<IssuedKey> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(BotError::Provisioning {
                message: "createKey: panel down".to_string(),
            });
        }
        let key = IssuedKey {
            id: format!("key-{}", subscriber),
            expires_at: Utc::now() + Duration::days(KEY_VALIDITY_DAYS),
        };
        self.expiries.lock().insert(key.id.clone(), key.expires_at);
        Ok(key)
    }

    async fn extend_key(&self, key_id: &str, days: i64) -> Result<DateTime<Utc>> {
        self.extend_calls.lock().push((key_id.to_string(), days));
        if self.fail_extend.load(Ordering::SeqCst) {
            return Err(BotError::AuthExhausted);
        }
        let expires_at = Utc::now() + Duration::days(days);
        self.expiries.lock().insert(key_id.to_string(), expires_at);
        Ok(expires_at)
    }

    async fn delete_key(&self, key_id: &str) -> Result<()> {
        self.deleted.lock().push(key_id.to_string());
        Ok(())
    }

    async fn query_expiry(&self, key_id: &str) -> Result<DateTime<Utc>> {
        self.expiries
            .lock()
            .get(key_id)
            .copied()
            .ok_or_else(|| BotError::KeyNotFound {
                key_id: key_id.to_string(),
            })
    }
}

/// In-memory store whose writes and listings can be made to fail or stall
pub struct FlakyStore {
    inner: JsonRecordStore,
    pub fail_key_writes: AtomicBool,
    pub fail_status_writes: AtomicBool,
    pub fail_lists: AtomicBool,
    pub stall_lists: AtomicBool,
}

impl Default for FlakyStore {
    fn default() -> Self {
        Self {
            inner: JsonRecordStore::in_memory(),
            fail_key_writes: AtomicBool::new(false),
            fail_status_writes: AtomicBool::new(false),
            fail_lists: AtomicBool::new(false),
            stall_lists: AtomicBool::new(false),
        }
    }
}

fn write_failure(operation: &str) -> BotError {
    BotError::Persistence {
        message: format!("{}: disk unavailable", operation),
    }
}

#[async_trait]
impl RecordStore for FlakyStore {
    async fn upsert_user(&self, handle: Handle, display_name: &str) -> Result<User> {
        self.inner.upsert_user(handle, display_name).await
    }

    async fn get_user_by_handle(&self, handle: Handle) -> Result<Option<User>> {
        self.inner.get_user_by_handle(handle).await
    }

    async fn get_user_by_id(&self, user_id: UserId) -> Result<User> {
        self.inner.get_user_by_id(user_id).await
    }

    async fn set_user_key(
        &self,
        user_id: UserId,
        key_id: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        if self.fail_key_writes.load(Ordering::SeqCst) {
            return Err(write_failure("setUserKey"));
        }
        self.inner.set_user_key(user_id, key_id, expires_at).await
    }

    async fn create_payment(&self, user_id: UserId, proof_ref: &str) -> Result<Payment> {
        self.inner.create_payment(user_id, proof_ref).await
    }

    async fn set_payment_status(
        &self,
        payment_id: PaymentId,
        resolution: &Resolution,
    ) -> Result<bool> {
        if self.fail_status_writes.load(Ordering::SeqCst) {
            return Err(write_failure("setPaymentStatus"));
        }
        self.inner.set_payment_status(payment_id, resolution).await
    }

    async fn get_payment(&self, payment_id: PaymentId) -> Result<Payment> {
        self.inner.get_payment(payment_id).await
    }

    async fn list_users_expiring_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<User>> {
        if self.stall_lists.load(Ordering::SeqCst) {
            tokio::time::sleep(std::time::Duration::from_secs(30)).await;
        }
        if self.fail_lists.load(Ordering::SeqCst) {
            return Err(BotError::Persistence {
                message: "listUsersExpiringBetween: disk unavailable".to_string(),
            });
        }
        self.inner.list_users_expiring_between(from, to).await
    }
}
