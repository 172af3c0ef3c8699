use tokio::sync::broadcast;

use crate::event::UpdateEvent;

const DEFAULT_TOPIC_DEPTH: usize = 64;

/// Broadcast topic carrying every update event to the per-session feeds.
///
/// The dispatcher is the single publisher; each session slot subscribes
/// exactly once, when it is created. A subscriber only sees events published
/// after it subscribed.
#[derive(Debug, Clone)]
pub struct UpdateBus {
    sender: broadcast::Sender<UpdateEvent>,
}

impl UpdateBus {
    pub fn new(depth: usize) -> Self {
        let (sender, _) = broadcast::channel(depth);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UpdateEvent> {
        self.sender.subscribe()
    }

    /// Publish one event to every subscribed session, returning how many
    /// feeds it reached. Zero receivers is not an error; it just means no
    /// session has made contact yet.
    pub fn publish(&self, event: UpdateEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }
}

impl Default for UpdateBus {
    fn default() -> Self {
        Self::new(DEFAULT_TOPIC_DEPTH)
    }
}
