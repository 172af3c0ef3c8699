//! Wires the provider's change stream to the session registry and serves
//! poll requests from it.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tracing::{error, info, trace};

use crate::{
    bus::UpdateBus,
    event::UpdateEvent,
    provider::ResourceProvider,
    registry::SessionRegistry,
    session::SessionToken,
};

/// Long-poll orchestrator: one upstream subscription, fanned out to every
/// session's replay buffer through the update topic.
#[derive(Clone)]
pub struct LongPollDispatcher {
    bus: UpdateBus,
    registry: SessionRegistry,
    window: Duration,
}

impl LongPollDispatcher {
    /// `window` bounds both event retention and the poll wait.
    pub fn new(window: Duration) -> Self {
        let bus = UpdateBus::default();
        let registry = SessionRegistry::new(bus.clone(), window);
        Self {
            bus,
            registry,
            window,
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Subscribe once to the provider's update stream and publish every
    /// event to the session feeds. Runs until the stream ends. A stream
    /// error is terminal: it is logged and no further updates are delivered
    /// until the process restarts.
    pub async fn run(&self, provider: Arc<dyn ResourceProvider>) {
        let mut updates = provider.subscribe_updated();
        info!("dispatcher subscribed to update stream");

        while let Some(next) = updates.next().await {
            match next {
                Ok(event) => {
                    let reached = self.bus.publish(event);
                    trace!(reached, "update published to session feeds");
                }
                Err(err) => {
                    error!(%err, "update stream failed; no further updates will be delivered");
                    return;
                }
            }
        }

        info!("update stream ended");
    }

    /// Publish a single event directly, bypassing the provider stream.
    pub fn publish(&self, event: UpdateEvent) -> usize {
        self.bus.publish(event)
    }

    /// Deliver pending updates for `token`, waiting up to the replay window.
    /// First contact with a token creates its session.
    pub async fn poll(&self, token: &SessionToken) -> Vec<UpdateEvent> {
        let slot = self.registry.get_or_create(token);
        slot.await_delivery(self.window).await
    }
}
