use dashmap::DashMap;
use tracing::debug;

use crate::models::{Handle, PaymentId};

/// Which payment each operator is expected to send a rejection reason for.
///
/// An operator has at most one outstanding entry; a newer reject press
/// replaces the older one. Entries never expire, they are consumed by the
/// operator's next text message.
#[derive(Debug, Default)]
pub struct ReasonTracker {
    pending: DashMap<Handle, PaymentId>,
}

impl ReasonTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Await a reason from `operator` for `payment_id`, returning the entry it replaced
    pub fn set(&self, operator: Handle, payment_id: PaymentId) -> Option<PaymentId> {
        let previous = self.pending.insert(operator, payment_id);
        debug!(
            "Operator {} now owes a rejection reason for payment {}",
            operator, payment_id
        );
        previous
    }

    /// Remove and return the operator's entry, if any
    pub fn take(&self, operator: Handle) -> Option<PaymentId> {
        self.pending.remove(&operator).map(|(_, payment_id)| payment_id)
    }

    pub fn pending_for(&self, operator: Handle) -> Option<PaymentId> {
        self.pending.get(&operator).map(|entry| *entry.value())
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_latest_reject_wins() {
        let tracker = ReasonTracker::new();
        assert_eq!(tracker.set(10, 1), None);
        assert_eq!(tracker.set(10, 2), Some(1));

        assert_eq!(tracker.take(10), Some(2));
        assert_eq!(tracker.take(10), None);
    }

    #[test]
    fn test_take_without_entry() {
        let tracker = ReasonTracker::new();
        assert_eq!(tracker.take(99), None);
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_operators_are_independent() {
        let tracker = ReasonTracker::new();
        tracker.set(1, 7);
        tracker.set(2, 9);

        assert_eq!(tracker.take(1), Some(7));
        assert_eq!(tracker.pending_for(2), Some(9));
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_take_is_atomic_across_threads() {
        let tracker = Arc::new(ReasonTracker::new());
        tracker.set(5, 42);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let tracker = tracker.clone();
                std::thread::spawn(move || tracker.take(5))
            })
            .collect();
        let taken: Vec<PaymentId> = handles
            .into_iter()
            .filter_map(|h| h.join().unwrap())
            .collect();

        assert_eq!(taken, vec![42]);
    }
}
