// SPDX-FileCopyrightText: 2026 Locanda Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The in-process event bus.
//!
//! [`InMemoryBus`] is a multi-producer single-consumer buffered queue.
//! Publishing never blocks: when the buffer is full the event is dropped
//! and a warning is logged. The consumer side is a single stable handle;
//! the dispatcher is the only receiver.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::warn;

use crate::error::LocandaError;
use crate::event::AgentEvent;

/// Buffer capacity of the in-memory bus.
const BUS_CAPACITY: usize = 256;

/// Publish/consume interface for [`AgentEvent`]s.
///
/// `mark_processed` is a no-op for purely in-memory implementations; the
/// persistent bus overrides it to stamp the event's row.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publishes an event. Never blocks; the event may be dropped when the
    /// buffer is full.
    async fn publish(&self, event: AgentEvent);

    /// Receives the next event. Returns `None` once the bus is closed and
    /// drained.
    async fn recv(&self) -> Option<AgentEvent>;

    /// Closes the bus, unblocking the consumer after the buffer drains.
    fn close(&self);

    /// Stamps the event as fully handled so it is not replayed.
    async fn mark_processed(&self, _event_id: &str) -> Result<(), LocandaError> {
        Ok(())
    }
}

/// Buffered-channel event bus for single-process use.
pub struct InMemoryBus {
    tx: std::sync::Mutex<Option<mpsc::Sender<AgentEvent>>>,
    rx: tokio::sync::Mutex<mpsc::Receiver<AgentEvent>>,
}

impl InMemoryBus {
    /// Creates a bus with the default capacity of 256 events.
    pub fn new() -> Self {
        Self::with_capacity(BUS_CAPACITY)
    }

    /// Creates a bus with an explicit capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            tx: std::sync::Mutex::new(Some(tx)),
            rx: tokio::sync::Mutex::new(rx),
        }
    }

    fn sender(&self) -> Option<mpsc::Sender<AgentEvent>> {
        self.tx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventBus for InMemoryBus {
    async fn publish(&self, event: AgentEvent) {
        let Some(tx) = self.sender() else {
            warn!(
                kind = %event.kind,
                target = event.target_user_id,
                "bus closed, dropping event"
            );
            return;
        };
        if let Err(e) = tx.try_send(event) {
            match e {
                mpsc::error::TrySendError::Full(ev) => warn!(
                    kind = %ev.kind,
                    target = ev.target_user_id,
                    "bus full, dropping event"
                ),
                mpsc::error::TrySendError::Closed(ev) => warn!(
                    kind = %ev.kind,
                    target = ev.target_user_id,
                    "bus closed, dropping event"
                ),
            }
        }
    }

    async fn recv(&self) -> Option<AgentEvent> {
        self.rx.lock().await.recv().await
    }

    fn close(&self) {
        self.tx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;

    fn event(id: &str) -> AgentEvent {
        AgentEvent {
            kind: EventKind::Relay,
            target_user_id: 7,
            chat_id: 7,
            content: "ping".into(),
            source: "test".into(),
            event_id: id.into(),
        }
    }

    #[tokio::test]
    async fn delivers_in_publish_order() {
        let bus = InMemoryBus::new();
        bus.publish(event("e1")).await;
        bus.publish(event("e2")).await;

        assert_eq!(bus.recv().await.unwrap().event_id, "e1");
        assert_eq!(bus.recv().await.unwrap().event_id, "e2");
    }

    #[tokio::test]
    async fn drops_when_full() {
        let bus = InMemoryBus::with_capacity(1);
        bus.publish(event("kept")).await;
        bus.publish(event("dropped")).await;

        assert_eq!(bus.recv().await.unwrap().event_id, "kept");
        bus.close();
        assert!(bus.recv().await.is_none());
    }

    #[tokio::test]
    async fn close_unblocks_consumer_after_drain() {
        let bus = InMemoryBus::new();
        bus.publish(event("last")).await;
        bus.close();

        assert_eq!(bus.recv().await.unwrap().event_id, "last");
        assert!(bus.recv().await.is_none());
    }

    #[tokio::test]
    async fn publish_after_close_is_silent() {
        let bus = InMemoryBus::new();
        bus.close();
        // Must not panic or block.
        bus.publish(event("late")).await;
        assert!(bus.recv().await.is_none());
    }

    #[tokio::test]
    async fn mark_processed_defaults_to_noop() {
        let bus = InMemoryBus::new();
        assert!(bus.mark_processed("whatever").await.is_ok());
    }
}
