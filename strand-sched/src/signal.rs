//! Coalesced wake-up signals.

use std::sync::Arc;

use tokio::sync::Notify;

/// An edge-triggered signal that coalesces to one pending wake-up.
///
/// [`DataSignal::raise`] stores at most a single permit: raising a
/// signal nobody is waiting on ten times wakes the next waiter once.
/// This is the consume binding between the dispatcher and its
/// subscriptions - the dispatcher raises a subscription's signal on
/// every successful commit, and the consuming actor awaits
/// [`DataSignal::ready`] between poll slices.
#[derive(Debug, Clone, Default)]
pub struct DataSignal {
    notify: Arc<Notify>,
}

impl DataSignal {
    /// Creates a signal with no pending wake-up.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the signal, waking one waiter now or the next to arrive.
    pub fn raise(&self) {
        self.notify.notify_one();
    }

    /// Waits until the signal is raised, consuming the pending permit.
    pub async fn ready(&self) {
        self.notify.notified().await;
    }
}
