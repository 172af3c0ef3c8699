//! Time-windowed, replayable event queue for one session.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::event::UpdateEvent;

/// Delivery lifecycle of a replay buffer. A buffer never reopens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferPhase {
    /// Accepting appends; snapshot not yet handed to a consumer.
    Open,
    /// Snapshot delivered; the buffer is retired and must be replaced.
    Delivered,
}

/// Ordered pending-update queue bounded by wall-clock age.
///
/// Events older than the retention window are dropped lazily when the
/// snapshot is taken, which bounds memory for sessions that accumulate
/// updates long before any poll arrives.
#[derive(Debug)]
pub struct ReplayBuffer {
    window: Duration,
    phase: BufferPhase,
    events: VecDeque<(Instant, UpdateEvent)>,
    ever_appended: bool,
    waiting: bool,
}

impl ReplayBuffer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            phase: BufferPhase::Open,
            events: VecDeque::new(),
            ever_appended: false,
            waiting: false,
        }
    }

    pub fn phase(&self) -> BufferPhase {
        self.phase
    }

    /// Whether at least one event has ever been appended.
    pub fn has_ever_appended(&self) -> bool {
        self.ever_appended
    }

    /// Whether a poller is currently parked on this buffer.
    pub fn has_waiter(&self) -> bool {
        self.waiting
    }

    pub fn set_waiting(&mut self, waiting: bool) {
        self.waiting = waiting;
    }

    /// Append an event in arrival order. Ignored once the buffer is retired.
    pub fn append(&mut self, event: UpdateEvent) {
        if self.phase == BufferPhase::Delivered {
            return;
        }
        self.ever_appended = true;
        self.events.push_back((Instant::now(), event));
    }

    /// Hand the accumulated snapshot to the consumer and retire the buffer.
    /// Events that aged out of the retention window are dropped here.
    pub fn take_snapshot(&mut self) -> Vec<UpdateEvent> {
        self.phase = BufferPhase::Delivered;
        self.waiting = false;
        let cutoff = Instant::now().checked_sub(self.window);
        self.events
            .drain(..)
            .filter(|(appended_at, _)| match cutoff {
                Some(cutoff) => *appended_at >= cutoff,
                None => true,
            })
            .map(|(_, event)| event)
            .collect()
    }
}
