//! Broadcast hub for lifecycle events pushed to `/events`

use hostbridge_protocol::BridgeEvent;
use tokio::sync::broadcast;
use tracing::debug;

const EVENT_BUFFER: usize = 256;

/// Cloneable handle to the event broadcast channel
#[derive(Debug, Clone)]
pub struct EventHub {
    sender: broadcast::Sender<BridgeEvent>,
}

impl EventHub {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_BUFFER);
        Self { sender }
    }

    /// Publish an event; returns how many subscribers received it
    pub fn publish(&self, event: BridgeEvent) -> usize {
        match self.sender.send(event) {
            Ok(receivers) => receivers,
            Err(e) => {
                debug!("No event stream subscribed, dropping {:?}", e.0.kind);
                0
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}
