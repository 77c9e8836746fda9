use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::{BotError, Result};
use crate::models::{Handle, IssuedKey, Payment, PaymentId, Resolution, User, UserId};

const SCHEMA_VERSION: u32 = 1;
const DEFAULT_USER_STATUS: &str = "active";

/// Durable store of users and payments.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Create the user on first contact, refreshing the display name otherwise.
    async fn upsert_user(&self, handle: Handle, display_name: &str) -> Result<User>;

    async fn get_user_by_handle(&self, handle: Handle) -> Result<Option<User>>;

    async fn get_user_by_id(&self, user_id: UserId) -> Result<User>;

    async fn set_user_key(&self, user_id: UserId, key_id: &str, expires_at: DateTime<Utc>)
        -> Result<()>;

    async fn create_payment(&self, user_id: UserId, proof_ref: &str) -> Result<Payment>;

    /// Resolve a payment only if it is still pending. `Ok(false)` means it was
    /// already resolved and nothing changed.
    async fn set_payment_status(&self, payment_id: PaymentId, resolution: &Resolution)
        -> Result<bool>;

    async fn get_payment(&self, payment_id: PaymentId) -> Result<Payment>;

    /// Users whose key expires in `[from, to)`.
    async fn list_users_expiring_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<User>>;
}

pub type SharedRecordStore = Arc<dyn RecordStore>;

/// On-disk document holding every record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Records {
    /// Schema version for migrations
    pub version: u32,

    pub next_user_id: UserId,

    pub next_payment_id: PaymentId,

    pub users: BTreeMap<UserId, User>,

    pub payments: BTreeMap<PaymentId, Payment>,
}

impl Default for Records {
    fn default() -> Self {
        Self {
            version: SCHEMA_VERSION,
            next_user_id: 1,
            next_payment_id: 1,
            users: BTreeMap::new(),
            payments: BTreeMap::new(),
        }
    }
}

impl Records {
    fn user_by_handle(&self, handle: Handle) -> Option<&User> {
        self.users.values().find(|u| u.handle == handle)
    }
}

/// JSON-file record store. Every write is applied to a copy, saved, and only
/// then made visible, so a failed save leaves readers on the previous state.
pub struct JsonRecordStore {
    path: Option<PathBuf>,
    records: RwLock<Records>,
}

impl JsonRecordStore {
    /// Store that never touches disk.
    #[cfg(test)]
    pub fn in_memory() -> Self {
        Self {
            path: None,
            records: RwLock::new(Records::default()),
        }
    }

    /// Load from a JSON file, or start empty if it does not exist yet
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let path_str = path.display().to_string();

        let records = match tokio::fs::read_to_string(&path).await {
            Ok(content) => {
                let records: Records =
                    serde_json::from_str(&content).map_err(|e| BotError::StateParse {
                        path: path_str.clone(),
                        source: e,
                    })?;
                info!(
                    "Loaded {} users and {} payments from {}",
                    records.users.len(),
                    records.payments.len(),
                    path_str
                );
                records
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No records file at {}, starting empty", path_str);
                Records::default()
            }
            Err(e) => {
                return Err(BotError::StateLoad {
                    path: path_str,
                    source: e,
                })
            }
        };

        Ok(Self {
            path: Some(path),
            records: RwLock::new(records),
        })
    }

    async fn save(&self, records: &Records) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let path_str = path.display().to_string();
        let content = serde_json::to_string_pretty(records)?;

        // Write to temp file first, then rename for atomicity
        let temp_path = format!("{}.tmp", path_str);
        tokio::fs::write(&temp_path, &content)
            .await
            .map_err(|e| BotError::StateSave {
                path: path_str.clone(),
                source: e,
            })?;
        tokio::fs::rename(&temp_path, path)
            .await
            .map_err(|e| BotError::StateSave {
                path: path_str,
                source: e,
            })?;

        Ok(())
    }

    async fn mutate<T>(&self, change: impl FnOnce(&mut Records) -> Result<T> + Send) -> Result<T> {
        let mut records = self.records.write().await;
        let mut next = records.clone();
        let out = change(&mut next)?;

        self.save(&next).await.map_err(|e| BotError::Persistence {
            message: e.to_string(),
        })?;
        *records = next;

        Ok(out)
    }
}

#[async_trait]
impl RecordStore for JsonRecordStore {
    async fn upsert_user(&self, handle: Handle, display_name: &str) -> Result<User> {
        self.mutate(|records| {
            if let Some(existing) = records.users.values_mut().find(|u| u.handle == handle) {
                existing.display_name = display_name.to_string();
                return Ok(existing.clone());
            }

            let user = User {
                id: records.next_user_id,
                handle,
                display_name: display_name.to_string(),
                key: None,
                status: DEFAULT_USER_STATUS.to_string(),
            };
            records.next_user_id += 1;
            records.users.insert(user.id, user.clone());
            debug!("Registered user {} for handle {}", user.id, handle);
            Ok(user)
        })
        .await
    }

    async fn get_user_by_handle(&self, handle: Handle) -> Result<Option<User>> {
        Ok(self.records.read().await.user_by_handle(handle).cloned())
    }

    async fn get_user_by_id(&self, user_id: UserId) -> Result<User> {
        self.records
            .read()
            .await
            .users
            .get(&user_id)
            .cloned()
            .ok_or(BotError::UserNotFound { user_id })
    }

    async fn set_user_key(
        &self,
        user_id: UserId,
        key_id: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        self.mutate(|records| {
            let user = records
                .users
                .get_mut(&user_id)
                .ok_or(BotError::UserNotFound { user_id })?;
            user.key = Some(IssuedKey {
                id: key_id.to_string(),
                expires_at,
            });
            Ok(())
        })
        .await
    }

    async fn create_payment(&self, user_id: UserId, proof_ref: &str) -> Result<Payment> {
        self.mutate(|records| {
            if !records.users.contains_key(&user_id) {
                return Err(BotError::UserNotFound { user_id });
            }
            let payment = Payment::new(records.next_payment_id, user_id, proof_ref.to_string());
            records.next_payment_id += 1;
            records.payments.insert(payment.id, payment.clone());
            Ok(payment)
        })
        .await
    }

    async fn set_payment_status(
        &self,
        payment_id: PaymentId,
        resolution: &Resolution,
    ) -> Result<bool> {
        // Fast path keeps terminal payments from rewriting the file
        if !self.get_payment(payment_id).await?.status.is_pending() {
            return Ok(false);
        }

        self.mutate(|records| {
            let payment = records
                .payments
                .get_mut(&payment_id)
                .ok_or(BotError::PaymentNotFound { payment_id })?;
            Ok(payment.resolve(resolution))
        })
        .await
    }

    async fn get_payment(&self, payment_id: PaymentId) -> Result<Payment> {
        self.records
            .read()
            .await
            .payments
            .get(&payment_id)
            .cloned()
            .ok_or(BotError::PaymentNotFound { payment_id })
    }

    async fn list_users_expiring_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<User>> {
        let records = self.records.read().await;
        Ok(records
            .users
            .values()
            .filter(|u| u.expires_at().is_some_and(|at| at >= from && at < to))
            .cloned()
            .collect())
    }
}
