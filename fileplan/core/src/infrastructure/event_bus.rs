// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Event Bus - Pub/Sub for Domain Events
//
// In-memory event streaming over tokio broadcast channels. Disposition and
// security services publish here; observers subscribe to everything or to the
// disposition events of a single node.

use crate::domain::events::{DispositionEvent, SecurityEvent};
use crate::domain::node::NodeId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Unified domain event type for the event bus
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    Disposition(DispositionEvent),
    Security(SecurityEvent),
}

/// Event bus for publishing and subscribing to domain events
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<DomainEvent>>,
}

impl EventBus {
    /// Capacity is how many events are buffered before the oldest are dropped
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(1000)
    }

    pub fn publish_disposition_event(&self, event: DispositionEvent) {
        self.publish(DomainEvent::Disposition(event));
    }

    pub fn publish_security_event(&self, event: SecurityEvent) {
        self.publish(DomainEvent::Security(event));
    }

    fn publish(&self, event: DomainEvent) {
        debug!("Publishing event: {:?}", event);

        let receiver_count = self.sender.send(event).unwrap_or(0);
        if receiver_count == 0 {
            debug!("No subscribers listening to event");
        }
    }

    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// Subscribe to the disposition events of one node
    pub fn subscribe_node(&self, node_id: NodeId) -> NodeEventReceiver {
        NodeEventReceiver {
            receiver: self.sender.subscribe(),
            node_id,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
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

/// Receiver for all domain events
pub struct EventReceiver {
    receiver: broadcast::Receiver<DomainEvent>,
}

impl EventReceiver {
    pub async fn recv(&mut self) -> Result<DomainEvent, EventBusError> {
        self.receiver.recv().await.map_err(map_recv_error)
    }

    pub fn try_recv(&mut self) -> Result<DomainEvent, EventBusError> {
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

/// Receiver filtered to the disposition events of a single node
pub struct NodeEventReceiver {
    receiver: broadcast::Receiver<DomainEvent>,
    node_id: NodeId,
}

impl NodeEventReceiver {
    pub async fn recv(&mut self) -> Result<DispositionEvent, EventBusError> {
        loop {
            let event = self.receiver.recv().await.map_err(map_recv_error)?;
            if let DomainEvent::Disposition(disposition_event) = event {
                if self.matches_node(&disposition_event) {
                    return Ok(disposition_event);
                }
            }
        }
    }

    fn matches_node(&self, event: &DispositionEvent) -> bool {
        let node = match event {
            DispositionEvent::ScheduleCreated { container_id, .. } => container_id,
            DispositionEvent::ActionDefinitionAdded { schedule_id, .. } => schedule_id,
            DispositionEvent::ActionDefinitionUpdated { schedule_id, .. } => schedule_id,
            DispositionEvent::ActionDefinitionRemoved { schedule_id, .. } => schedule_id,
            DispositionEvent::ActionInitialised { node_id, .. } => node_id,
            DispositionEvent::ActionAdvanced { node_id, .. } => node_id,
            DispositionEvent::AsOfRecalculated { node_id, .. } => node_id,
            DispositionEvent::EventCompleted { node_id, .. } => node_id,
            DispositionEvent::EventUndone { node_id, .. } => node_id,
            DispositionEvent::CutOff { node_id, .. } => node_id,
        };
        node == &self.node_id
    }
}

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

    #[tokio::test]
    async fn test_event_bus_publish_subscribe() {
        let event_bus = EventBus::new(10);
        let mut receiver = event_bus.subscribe();
        let node_id = NodeId::new();

        event_bus.publish_disposition_event(DispositionEvent::CutOff {
            node_id,
            cut_off_at: Utc::now(),
        });

        match receiver.recv().await.unwrap() {
            DomainEvent::Disposition(DispositionEvent::CutOff { node_id: id, .. }) => {
                assert_eq!(id, node_id);
            }
            _ => panic!("Wrong event type received"),
        }
    }

    #[tokio::test]
    async fn test_node_event_filtering() {
        let event_bus = EventBus::new(10);
        let node_id = NodeId::new();
        let mut receiver = event_bus.subscribe_node(node_id);

        event_bus.publish_disposition_event(DispositionEvent::EventUndone {
            node_id: NodeId::new(),
            event_name: "case_closed".to_string(),
        });
        event_bus.publish_security_event(SecurityEvent::ResultsFiltered {
            original_size: 3,
            removed: 1,
            cut_off: false,
        });
        event_bus.publish_disposition_event(DispositionEvent::EventUndone {
            node_id,
            event_name: "obsolete".to_string(),
        });

        match receiver.recv().await.unwrap() {
            DispositionEvent::EventUndone { event_name, .. } => assert_eq!(event_name, "obsolete"),
            _ => panic!("Wrong event type received"),
        }
    }

    #[test]
    fn test_publish_without_subscribers() {
        let event_bus = EventBus::default();
        event_bus.publish_security_event(SecurityEvent::ResultsFiltered {
            original_size: 0,
            removed: 0,
            cut_off: false,
        });
        assert_eq!(event_bus.subscriber_count(), 0);
    }
}
