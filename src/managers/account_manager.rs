use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use super::within;
use crate::error::{BotError, Result};
use crate::models::{Handle, IssuedKey, User};
use crate::provisioning::SharedProvisioner;
use crate::state::SharedRecordStore;

/// Subscriber self-service: registration, key issue and expiry lookup
pub struct AccountManager {
    store: SharedRecordStore,
    provisioner: SharedProvisioner,
    deadline: Duration,
}

impl AccountManager {
    pub fn new(store: SharedRecordStore, provisioner: SharedProvisioner, deadline: Duration) -> Self {
        Self {
            store,
            provisioner,
            deadline,
        }
    }

    /// Register the sender, or refresh the display name of a known one
    pub async fn register(&self, handle: Handle, display_name: &str) -> Result<User> {
        let user = self
            .within("upsertUser", self.store.upsert_user(handle, display_name))
            .await?;
        info!(user_id = user.id, handle, "User registered");
        Ok(user)
    }

    /// Create a fresh key on the panel and remember it for the user
    pub async fn issue_key(&self, handle: Handle) -> Result<IssuedKey> {
        let user = self.registered(handle).await?;

        let key = self
            .within("createKey", self.provisioner.create_key(user.id))
            .await?;

        if let Err(e) = self
            .within(
                "setUserKey",
                self.store.set_user_key(user.id, &key.id, key.expires_at),
            )
            .await
        {
            error!(user_id = user.id, key_id = %key.id, "Issued key could not be saved: {}", e);
            if let Err(cleanup) = self
                .within("deleteKey", self.provisioner.delete_key(&key.id))
                .await
            {
                warn!(key_id = %key.id, "Failed to revoke unsaved key: {}", cleanup);
            }
            return Err(e);
        }

        info!(user_id = user.id, key_id = %key.id, "Key issued");
        Ok(key)
    }

    /// Current expiry of the user's key as the panel reports it
    pub async fn key_status(&self, handle: Handle) -> Result<DateTime<Utc>> {
        let user = self.registered(handle).await?;
        let key = user.key.ok_or(BotError::MissingKey { user_id: user.id })?;

        self.within("queryExpiry", self.provisioner.query_expiry(&key.id))
            .await
    }

    async fn registered(&self, handle: Handle) -> Result<User> {
        self.within("getUserByHandle", self.store.get_user_by_handle(handle))
            .await?
            .ok_or(BotError::UnregisteredUser { handle })
    }

    async fn within<T>(
        &self,
        operation: &'static str,
        fut: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        within(self.deadline, operation, fut).await
    }
}

pub type SharedAccountManager = Arc<AccountManager>;
