// SPDX-License-Identifier: Apache-2.0
//! Ordered, typed, fan-out event delivery between the core and a front-end.
//!
//! One primary consumer per session (the front-end's draining task) plus any
//! number of passive subscribers attached later — e.g. a logger or a second
//! TUI pane. Delivery never reorders events from the same producer: every
//! `emit` is a synchronous fan-out loop over the primary sender and the
//! subscriber list, so whichever producer calls `emit` first is seen first
//! by every receiver.

use tokio::sync::{mpsc, Mutex};

use crate::event::AgentEvent;

/// Emitted when `emit` is called after the session's primary consumer has
/// gone away — the bus no longer has anywhere to deliver events.
#[derive(Debug, thiserror::Error)]
#[error("event bus closed: session has ended")]
pub struct BusClosed;

const DEFAULT_CAPACITY: usize = 256;

pub struct EventBus {
    primary: mpsc::Sender<AgentEvent>,
    subscribers: Mutex<Vec<mpsc::Sender<AgentEvent>>>,
}

impl EventBus {
    /// Create a bus together with the primary receiver the front-end drains.
    pub fn new() -> (Self, mpsc::Receiver<AgentEvent>) {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> (Self, mpsc::Receiver<AgentEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            Self { primary: tx, subscribers: Mutex::new(Vec::new()) },
            rx,
        )
    }

    /// Attach a passive subscriber. Sees only events emitted after this call.
    pub async fn subscribe(&self) -> mpsc::Receiver<AgentEvent> {
        let (tx, rx) = mpsc::channel(DEFAULT_CAPACITY);
        self.subscribers.lock().await.push(tx);
        rx
    }

    /// Deliver `event` to the primary consumer and every live subscriber.
    ///
    /// Returns [`BusClosed`] only when the primary consumer is gone — a dead
    /// passive subscriber is pruned silently, since passive observers are
    /// allowed to disappear without ending the session.
    pub async fn emit(&self, event: AgentEvent) -> Result<(), BusClosed> {
        self.primary.send(event.clone()).await.map_err(|_| BusClosed)?;

        let mut subs = self.subscribers.lock().await;
        subs.retain_mut(|tx| tx.try_send(event.clone()).is_ok() || !tx.is_closed());
        Ok(())
    }

    /// `true` once the primary consumer has been dropped.
    pub fn is_closed(&self) -> bool {
        self.primary.is_closed()
    }
}
