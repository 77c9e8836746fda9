pub mod account_manager;
pub mod payment_workflow;
pub mod reason_tracker;
pub mod renewal_notifier;

#[cfg(test)]
pub mod testing;

pub use account_manager::{AccountManager, SharedAccountManager};
pub use payment_workflow::{PaymentWorkflow, SharedPaymentWorkflow};
pub use renewal_notifier::{RenewalNotifier, SharedRenewalNotifier};

use std::future::Future;
use std::time::Duration;

use crate::error::{BotError, Result};

/// Bound an external call by `deadline`, failing with [`BotError::Timeout`].
pub async fn within<T>(
    deadline: Duration,
    operation: &'static str,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(deadline, fut)
        .await
        .map_err(|_| BotError::Timeout {
            operation: operation.to_string(),
        })?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_within_times_out() {
        let result: Result<()> = within(Duration::from_millis(10), "slow", async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;

        assert!(matches!(result, Err(BotError::Timeout { operation }) if operation == "slow"));
    }

    #[tokio::test]
    async fn test_within_passes_result_through() {
        let result = within(Duration::from_secs(1), "fast", async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }
}
