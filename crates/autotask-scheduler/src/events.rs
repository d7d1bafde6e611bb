//! Lifecycle event channel.

use tokio::sync::broadcast;
use tracing::trace;

use autotask_protocols::ExecutionEvent;

/// Default channel capacity.
pub const DEFAULT_EVENT_BUFFER: usize = 256;

/// Broadcast channel of execution lifecycle events.
///
/// Subscribers that fall behind by more than the buffer lose the oldest
/// events (`RecvError::Lagged`); publishers are never blocked.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ExecutionEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event. Returns the number of subscribers that received it.
    pub fn publish(&self, event: ExecutionEvent) -> usize {
        match self.sender.send(event) {
            Ok(receivers) => receivers,
            Err(_) => {
                trace!("No subscribers for execution event");
                0
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER)
    }
}
