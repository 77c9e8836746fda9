use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{info, warn};

use super::within;
use crate::error::Result;
use crate::messages;
use crate::state::SharedRecordStore;
use crate::transport::SharedMessenger;

/// How far ahead a sweep looks for expiring keys
pub const LOOKAHEAD_HOURS: i64 = 24;

/// Reminds users whose key is about to expire
pub struct RenewalNotifier {
    store: SharedRecordStore,
    messenger: SharedMessenger,
    deadline: std::time::Duration,
}

impl RenewalNotifier {
    pub fn new(
        store: SharedRecordStore,
        messenger: SharedMessenger,
        deadline: std::time::Duration,
    ) -> Self {
        Self {
            store,
            messenger,
            deadline,
        }
    }

    /// Remind everyone whose key expires within the next day
    pub async fn sweep_from(&self, now: DateTime<Utc>) -> Result<usize> {
        self.sweep_expiring_between(now, now + Duration::hours(LOOKAHEAD_HOURS))
            .await
    }

    /// Send a reminder to each user expiring in `[from, to)` and return how many were reminded.
    ///
    /// Failing to load users aborts the sweep. A failed reminder is logged and
    /// the sweep moves on to the next user.
    pub async fn sweep_expiring_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<usize> {
        let users = within(
            self.deadline,
            "listUsersExpiringBetween",
            self.store.list_users_expiring_between(from, to),
        )
        .await?;

        let mut reminded = 0;
        for user in &users {
            let Some(expires_at) = user.expires_at() else {
                continue;
            };
            match self
                .messenger
                .notify(user.handle, &messages::renewal_reminder(expires_at))
                .await
            {
                Ok(()) => reminded += 1,
                Err(e) => warn!("Failed to send renewal reminder to user {}: {}", user.id, e),
            }
        }

        info!(
            "Renewal sweep reminded {} of {} expiring users",
            reminded,
            users.len()
        );
        Ok(reminded)
    }
}

pub type SharedRenewalNotifier = Arc<RenewalNotifier>;
