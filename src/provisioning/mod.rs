//! Provisioning panel integration
//!
//! Keys are created, extended, revoked and inspected through the panel's
//! HTTP API. Callers depend on [`Provisioner`] and never see the panel's
//! authentication.

pub mod auth;
pub mod client;
pub mod types;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::config::{PanelAuthConfig, PanelConfig};
use crate::error::Result;
use crate::models::{IssuedKey, UserId};

pub use auth::{Authenticator, BearerAuth, SessionLogin};
pub use client::PanelClient;

/// Validity of a newly created key, and the renewal period of a confirmed payment.
pub const KEY_VALIDITY_DAYS: i64 = 30;

#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Create a key for the subscriber, valid for [`KEY_VALIDITY_DAYS`] on one device.
    async fn create_key(&self, subscriber: UserId) -> Result<IssuedKey>;

    /// Set the key to expire `days` from now and return that expiry.
    async fn extend_key(&self, key_id: &str, days: i64) -> Result<DateTime<Utc>>;

    async fn delete_key(&self, key_id: &str) -> Result<()>;

    async fn query_expiry(&self, key_id: &str) -> Result<DateTime<Utc>>;
}

pub type SharedProvisioner = Arc<dyn Provisioner>;

/// Build the panel client with the authentication strategy the deployment selected.
pub fn build_panel_client(config: &PanelConfig, auth: &PanelAuthConfig) -> Result<PanelClient> {
    let authenticator: Box<dyn Authenticator> = match auth {
        PanelAuthConfig::Session { username, password } => {
            Box::new(SessionLogin::new(username.clone(), password.clone()))
        }
        PanelAuthConfig::BearerLogin { username, password } => {
            Box::new(BearerAuth::with_login(username.clone(), password.clone()))
        }
        PanelAuthConfig::StaticToken { token } => Box::new(BearerAuth::with_static_token(token.clone())),
    };
    PanelClient::new(config, authenticator)
}
