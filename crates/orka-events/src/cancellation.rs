// SPDX-License-Identifier: Apache-2.0
//! A monotonic cancellation latch observable by every long-running operation
//! in a session's turn.
//!
//! Once set, a [`CancelSignal`] stays set for the remainder of the turn —
//! there is no `reset`. Every suspending operation in the orchestrator and
//! scheduler must check it on each iteration or I/O boundary; `wait()` lets a
//! task block until cancellation happens instead of polling.

use std::sync::Arc;

use tokio::sync::Notify;

/// Shared, cloneable cancellation handle for one session turn.
///
/// Cloning yields another handle to the same latch — `set()` on any clone is
/// visible to all of them.
#[derive(Clone, Default)]
pub struct CancelSignal {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    set: std::sync::atomic::AtomicBool,
    notify: Notify,
}

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the latch. Idempotent — setting an already-set signal is a no-op
    /// beyond waking any waiters.
    pub fn set(&self) {
        self.inner.set.store(true, std::sync::atomic::Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    /// Non-blocking check.
    pub fn is_set(&self) -> bool {
        self.inner.set.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Suspend until the signal is set. Returns immediately if it already is.
    pub async fn wait(&self) {
        if self.is_set() {
            return;
        }
        // Notify::notified() must be constructed before the is_set() recheck
        // to avoid missing a concurrent set() between the check and the await.
        let notified = self.inner.notify.notified();
        if self.is_set() {
            return;
        }
        notified.await;
    }
}

impl std::fmt::Debug for CancelSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelSignal").field("is_set", &self.is_set()).finish()
    }
}
