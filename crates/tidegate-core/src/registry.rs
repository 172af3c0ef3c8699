//! Session registry: maps opaque session tokens to their delivery slots.

use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::{broadcast, Mutex, Notify};
use tracing::{debug, warn};

use crate::{
    bus::UpdateBus,
    event::UpdateEvent,
    replay::ReplayBuffer,
    session::SessionToken,
};

/// One session's delivery state: the current replay buffer plus the wakeup
/// handle its parked pollers wait on.
///
/// Invariant: exactly one buffer is current at any instant. Delivery retires
/// the buffer and swaps in a fresh one under the same lock, so no append can
/// land between the snapshot and the replacement.
#[derive(Debug)]
pub struct SessionSlot {
    token: SessionToken,
    current: Mutex<ReplayBuffer>,
    notify: Notify,
    window: Duration,
}

impl SessionSlot {
    fn new(token: SessionToken, window: Duration) -> Self {
        Self {
            token,
            current: Mutex::new(ReplayBuffer::new(window)),
            notify: Notify::new(),
            window,
        }
    }

    pub fn token(&self) -> &SessionToken {
        &self.token
    }

    /// Append one event to the current buffer, waking parked pollers.
    pub async fn append(&self, event: UpdateEvent) {
        let mut buffer = self.current.lock().await;
        buffer.append(event);
        if buffer.has_waiter() {
            self.notify.notify_waiters();
        }
    }

    /// Deliver the pending snapshot for this session.
    ///
    /// Returns immediately when the current buffer has ever received an
    /// event; otherwise parks (without holding a thread) until an append
    /// arrives or `timeout` elapses, then delivers what accumulated —
    /// possibly nothing. Either way the retired buffer is replaced by a
    /// fresh one under the session lock.
    ///
    /// Concurrent pollers on one session each get their own delivery: the
    /// first to wake takes the snapshot, the rest re-park against the
    /// replacement buffer within their own deadlines.
    pub async fn await_delivery(&self, timeout: Duration) -> Vec<UpdateEvent> {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            // Register interest before re-checking the buffer, so an append
            // landing between the check and the await still wakes us.
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut buffer = self.current.lock().await;
                if buffer.has_ever_appended() {
                    return self.retire(&mut buffer);
                }
                buffer.set_waiting(true);
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                let mut buffer = self.current.lock().await;
                return self.retire(&mut buffer);
            }
        }
    }

    /// Take the snapshot and install a fresh open buffer in its place.
    fn retire(&self, buffer: &mut ReplayBuffer) -> Vec<UpdateEvent> {
        let snapshot = buffer.take_snapshot();
        *buffer = ReplayBuffer::new(self.window);
        snapshot
    }
}

/// Registry of session token → delivery slot.
///
/// Slot creation is serialized per key through the map entry API, so a retry
/// race on one token never yields two divergent buffers. Slots are never
/// evicted; they live for the process lifetime (see DESIGN.md).
#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    sessions: DashMap<SessionToken, Arc<SessionSlot>>,
    bus: UpdateBus,
    window: Duration,
}

impl SessionRegistry {
    pub fn new(bus: UpdateBus, window: Duration) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                sessions: DashMap::new(),
                bus,
                window,
            }),
        }
    }

    /// Look up the slot for `token`, creating it and subscribing it to the
    /// update topic on first contact. Events published before first contact
    /// are not retroactively delivered.
    pub fn get_or_create(&self, token: &SessionToken) -> Arc<SessionSlot> {
        match self.inner.sessions.entry(token.clone()) {
            Entry::Occupied(entry) => Arc::clone(entry.get()),
            Entry::Vacant(entry) => {
                let slot = Arc::new(SessionSlot::new(token.clone(), self.inner.window));
                entry.insert(Arc::clone(&slot));
                self.spawn_feed(Arc::clone(&slot));
                debug!(session = %token, "session slot created");
                slot
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.sessions.is_empty()
    }

    /// Forward every broadcast update into this session's current buffer,
    /// for as long as the topic lives.
    fn spawn_feed(&self, slot: Arc<SessionSlot>) {
        let mut updates = self.inner.bus.subscribe();
        tokio::spawn(async move {
            loop {
                match updates.recv().await {
                    Ok(event) => slot.append(event).await,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(
                            session = %slot.token(),
                            skipped,
                            "session feed lagged; updates dropped"
                        );
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!(session = %slot.token(), "update topic closed; feed ending");
                        break;
                    }
                }
            }
        });
    }
}
