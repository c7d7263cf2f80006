// SPDX-License-Identifier: Apache-2.0
//! Bridges the scheduler's synchronous [`ApprovalGate`] call to a
//! confirmation answer that arrives later, out of band, over the client
//! message channel.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{oneshot, Mutex};

use orka_core::ApprovalGate;
use orka_events::{CancelSignal, ConfirmationDetails, ConfirmationOutcome, ToolCallRequestInfo};

/// Confirmation requests currently suspended, keyed by call id.
#[derive(Default)]
pub struct PendingConfirmations {
    waiting: Mutex<HashMap<String, oneshot::Sender<ConfirmationOutcome>>>,
}

impl PendingConfirmations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a suspended confirmation. Returns `false` when no call with
    /// this id is currently waiting — already resolved, never requested, or
    /// the waiter has since been dropped.
    pub async fn resolve(&self, call_id: &str, outcome: ConfirmationOutcome) -> bool {
        match self.waiting.lock().await.remove(call_id) {
            Some(tx) => tx.send(outcome).is_ok(),
            None => false,
        }
    }

    async fn register(&self, call_id: &str) -> oneshot::Receiver<ConfirmationOutcome> {
        let (tx, rx) = oneshot::channel();
        self.waiting.lock().await.insert(call_id.to_string(), tx);
        rx
    }
}

/// An [`ApprovalGate`] that suspends on [`PendingConfirmations`] instead of
/// resolving synchronously, so a confirmation can be answered by a message
/// arriving on a completely separate task some time later.
pub struct ChannelApprovalGate {
    pending: Arc<PendingConfirmations>,
    cancel: CancelSignal,
}

impl ChannelApprovalGate {
    pub fn new(pending: Arc<PendingConfirmations>, cancel: CancelSignal) -> Self {
        Self { pending, cancel }
    }
}

#[async_trait]
impl ApprovalGate for ChannelApprovalGate {
    async fn confirm(
        &self,
        request: &ToolCallRequestInfo,
        _details: &ConfirmationDetails,
    ) -> ConfirmationOutcome {
        let rx = self.pending.register(&request.call_id).await;
        tokio::select! {
            result = rx => result.unwrap_or(ConfirmationOutcome::Cancel),
            _ = self.cancel.wait() => {
                self.pending.resolve(&request.call_id, ConfirmationOutcome::Cancel).await;
                ConfirmationOutcome::Cancel
            }
        }
    }
}
