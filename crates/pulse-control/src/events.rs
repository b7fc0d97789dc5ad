//! Control event bus

use pulse_plugin_api::{ControlEvent, EventEmitter};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Broadcasts [`ControlEvent`]s to any number of listeners
///
/// Emitting never blocks. Listeners that fall behind by more than the
/// channel capacity lose the oldest events.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<ControlEvent>>,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per listener
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Subscribe to events emitted from now on
    pub fn subscribe(&self) -> broadcast::Receiver<ControlEvent> {
        self.sender.subscribe()
    }

    /// Number of live listeners
    pub fn listener_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EventEmitter for EventBus {
    fn emit(&self, event: ControlEvent) {
        if self.sender.send(event).is_err() {
            tracing::trace!("Control event dropped, no listeners");
        }
    }
}
