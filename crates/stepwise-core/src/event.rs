use tokio::sync::broadcast;

use crate::types::RunEvent;

/// Buffered events per subscriber before slow receivers start lagging.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Fan-out of run events to any number of observers.
///
/// Publishing never blocks the executor. With no subscribers, events are dropped.
pub struct EventBus {
    tx: broadcast::Sender<RunEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Returns how many subscribers received the event.
    pub fn publish(&self, event: RunEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RunId;

    fn started(id: &str) -> RunEvent {
        RunEvent::RunStarted {
            run_id: RunId::from_str(id),
            entry: "calc_e1".into(),
        }
    }

    #[test]
    fn test_publish_without_subscribers_is_dropped() {
        let bus = EventBus::default();
        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(bus.publish(started("r1")), 0);
    }

    #[tokio::test]
    async fn test_every_subscriber_receives_events() {
        let bus = EventBus::new(8);
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();
        assert_eq!(bus.publish(started("r1")), 2);

        for rx in [&mut a, &mut b] {
            let event = rx.recv().await.unwrap();
            assert_eq!(event.run_id(), &RunId::from_str("r1"));
        }
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let bus = EventBus::new(0);
        let mut rx = bus.subscribe();
        bus.publish(started("r1"));
        assert!(rx.try_recv().is_ok());
    }
}
