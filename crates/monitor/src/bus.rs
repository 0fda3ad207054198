//! Typed event bus.

use artguard_core::{EventKind, MonitorEvent};
use std::collections::HashSet;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::warn;

/// Broadcasts monitor events to every subscription.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<MonitorEvent>,
}

impl EventBus {
    /// Bus buffering up to `capacity` events per slow subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish an event. Having no subscriber is fine.
    pub fn publish(&self, event: MonitorEvent) {
        let _ = self.tx.send(event);
    }

    /// Subscribe to every event.
    pub fn subscribe(&self) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
            kinds: None,
        }
    }

    /// Subscribe to some event kinds.
    pub fn subscribe_to(&self, kinds: impl IntoIterator<Item = EventKind>) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
            kinds: Some(kinds.into_iter().collect()),
        }
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// Receiving end of the bus, optionally filtered by event kind.
///
/// A subscriber that falls behind loses the oldest events and keeps going.
#[derive(Debug)]
pub struct Subscription {
    rx: broadcast::Receiver<MonitorEvent>,
    kinds: Option<HashSet<EventKind>>,
}

impl Subscription {
    fn accepts(&self, event: &MonitorEvent) -> bool {
        self.kinds.as_ref().map_or(true, |k| k.contains(&event.kind()))
    }

    /// Next matching event; `None` once the monitor is gone.
    pub async fn recv(&mut self) -> Option<MonitorEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if self.accepts(&event) => return Some(event),
                Ok(_) => {}
                Err(RecvError::Lagged(missed)) => warn!(missed, "event subscriber lagged"),
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Next matching event already queued, without waiting.
    pub fn try_recv(&mut self) -> Option<MonitorEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) if self.accepts(&event) => return Some(event),
                Ok(_) => {}
                Err(TryRecvError::Lagged(missed)) => warn!(missed, "event subscriber lagged"),
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }

    /// Every matching event already queued.
    pub fn drain(&mut self) -> Vec<MonitorEvent> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use artguard_core::ArtifactId;

    fn registered(id: &str) -> MonitorEvent {
        MonitorEvent::ArtifactRegistered { id: ArtifactId::new(id) }
    }

    #[tokio::test]
    async fn test_filtered_subscription() {
        let bus = EventBus::new(16);
        let mut all = bus.subscribe();
        let mut removals = bus.subscribe_to([EventKind::ArtifactUnregistered]);

        bus.publish(registered("a"));
        bus.publish(MonitorEvent::ArtifactUnregistered { id: ArtifactId::new("a") });

        assert_eq!(all.drain().len(), 2);
        let event = removals.recv().await.unwrap();
        assert_eq!(event.kind(), EventKind::ArtifactUnregistered);
        assert!(removals.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_lagging_subscriber_keeps_receiving() {
        let bus = EventBus::new(2);
        let mut slow = bus.subscribe();
        for i in 0..5 {
            bus.publish(registered(&i.to_string()));
        }
        let events = slow.drain();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].artifact_id().map(|id| id.as_str()), Some("4"));
    }

    #[tokio::test]
    async fn test_closed_bus() {
        let bus = EventBus::new(4);
        let mut sub = bus.subscribe();
        drop(bus);
        assert!(sub.recv().await.is_none());
    }
}
