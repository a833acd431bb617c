//! Global event bus (spec §4/§6, component K): a one-to-many notification
//! channel the main loop and any operator tooling subscribe to, backed by
//! `tokio::sync::broadcast` per SPEC_FULL.md §10.1.

use tokio::sync::broadcast;

#[derive(Debug, Clone)]
pub enum Event {
    /// A peer reached `Open` for the first time (or after a `Reopen`).
    PeerUp(String),
    /// A peer left `Open` (connection lost, DPR exchanged, or zombied).
    PeerDown(String),
    /// A peer's Origin-State-Id increased while already `Open` (spec §11.2).
    PeerRestartDetected(String),
    DumpDict,
    DumpExt,
    DumpServ,
    DumpQueues,
    DumpConfig,
    DumpPeers,
    Terminate,
}

/// Wraps a `broadcast::Sender` so callers don't need to special-case the
/// "no subscribers yet" `SendError` the channel returns.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new(capacity: usize) -> EventBus {
        let (tx, _) = broadcast::channel(capacity);
        EventBus { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: Event) {
        // No subscribers is not an error: the event is simply unobserved.
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> EventBus {
        EventBus::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_subscriber() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        bus.publish(Event::PeerUp("host.example.net".into()));
        match rx.recv().await.unwrap() {
            Event::PeerUp(id) => assert_eq!(id, "host.example.net"),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_publish_without_subscribers_does_not_panic() {
        let bus = EventBus::default();
        bus.publish(Event::Terminate);
    }
}
