// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Event Bus Implementation - Pub/Sub for Launch Events
//
// In-memory event streaming using tokio broadcast channels. The CLI subscribes
// to render progress; tests subscribe to assert launch ordering.

use crate::domain::events::{LaunchEvent, LaunchId};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Event bus for publishing and subscribing to launch events
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<LaunchEvent>>,
}

impl EventBus {
    /// Create a new event bus with specified channel capacity
    /// Capacity determines how many events can be buffered before dropping old ones
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Create event bus with default capacity (1000)
    pub fn with_default_capacity() -> Self {
        Self::new(1000)
    }

    /// Publish an event to all subscribers
    pub fn publish(&self, event: LaunchEvent) {
        debug!("Publishing event: {:?}", event);

        let receiver_count = self.sender.send(event).unwrap_or(0);
        if receiver_count == 0 {
            debug!("No subscribers listening to event");
        }
    }

    /// Subscribe to all launch events
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// Subscribe to the events of a single launch run
    pub fn subscribe_launch(&self, launch_id: LaunchId) -> LaunchEventReceiver {
        LaunchEventReceiver {
            receiver: self.sender.subscribe(),
            launch_id,
        }
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Receiver for all launch events
pub struct EventReceiver {
    receiver: broadcast::Receiver<LaunchEvent>,
}

impl EventReceiver {
    /// Receive the next event (waits until one is available)
    pub async fn recv(&mut self) -> Result<LaunchEvent, EventBusError> {
        self.receiver.recv().await.map_err(map_recv_error)
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&mut self) -> Result<LaunchEvent, EventBusError> {
        self.receiver.try_recv().map_err(|e| match e {
            broadcast::error::TryRecvError::Empty => EventBusError::Empty,
            broadcast::error::TryRecvError::Closed => EventBusError::Closed,
            broadcast::error::TryRecvError::Lagged(n) => {
                warn!("Event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }
}

/// Receiver filtered to one launch run
pub struct LaunchEventReceiver {
    receiver: broadcast::Receiver<LaunchEvent>,
    launch_id: LaunchId,
}

impl LaunchEventReceiver {
    /// Receive the next event belonging to this launch, skipping others
    pub async fn recv(&mut self) -> Result<LaunchEvent, EventBusError> {
        loop {
            let event = self.receiver.recv().await.map_err(map_recv_error)?;
            if event.launch_id() == self.launch_id {
                return Ok(event);
            }
        }
    }
}

fn map_recv_error(e: broadcast::error::RecvError) -> EventBusError {
    match e {
        broadcast::error::RecvError::Closed => EventBusError::Closed,
        broadcast::error::RecvError::Lagged(n) => {
            warn!("Event receiver lagged by {} events", n);
            EventBusError::Lagged(n)
        }
    }
}

/// Errors that can occur when receiving events
#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Event bus is closed")]
    Closed,

    #[error("No events available")]
    Empty,

    #[error("Receiver lagged by {0} events (events were dropped)")]
    Lagged(u64),
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn completed(launch_id: LaunchId) -> LaunchEvent {
        LaunchEvent::SequenceCompleted {
            launch_id,
            units_started: 3,
            completed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_event_bus_publish_subscribe() {
        let event_bus = EventBus::new(10);
        let mut receiver = event_bus.subscribe();
        let launch_id = LaunchId::new();

        event_bus.publish(completed(launch_id));

        match receiver.recv().await.unwrap() {
            LaunchEvent::SequenceCompleted { launch_id: id, units_started, .. } => {
                assert_eq!(id, launch_id);
                assert_eq!(units_started, 3);
            }
            other => panic!("Wrong event type received: {:?}", other),
        }
        assert!(matches!(receiver.try_recv(), Err(EventBusError::Empty)));
    }

    #[tokio::test]
    async fn test_launch_event_filtering() {
        let event_bus = EventBus::new(10);
        let launch_id = LaunchId::new();
        let mut receiver = event_bus.subscribe_launch(launch_id);

        event_bus.publish(completed(LaunchId::new()));
        event_bus.publish(completed(launch_id));

        let received = receiver.recv().await.unwrap();
        assert_eq!(received.launch_id(), launch_id);
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let event_bus = EventBus::new(10);
        let mut receiver1 = event_bus.subscribe();
        let mut receiver2 = event_bus.subscribe();

        assert_eq!(event_bus.subscriber_count(), 2);

        event_bus.publish(completed(LaunchId::new()));

        let _ = receiver1.recv().await.unwrap();
        let _ = receiver2.recv().await.unwrap();
    }
}
