//! Stop signals for owned background loops.
//!
//! Periodic work (incident polling, replayed position fixes) runs in tasks
//! owned by an explicit object. The owner keeps a [`StopHandle`] and signals
//! it on teardown; the loop observes it between ticks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

#[derive(Debug, Default)]
struct StopState {
    stopped: AtomicBool,
    notify: Notify,
}

/// A cloneable stop signal shared between an owner and its loop.
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    inner: Arc<StopState>,
}

impl StopHandle {
    /// Create a new, unsignalled handle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal the loop to stop.
    pub fn stop(&self) {
        self.inner.stopped.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    /// Check if the stop signal has been sent.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }

    /// Wait until the stop signal is sent.
    pub async fn stopped(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_stopped() {
                return;
            }
            notified.await;
        }
    }
}
