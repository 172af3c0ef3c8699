//! Long-poll delivery core for the tidegate gateway.
//!
//! Bridges a push-based provider of thing/band updates to HTTP clients that
//! can only poll. Updates flow from the provider's change stream through a
//! broadcast topic into per-session replay buffers; each poll request drains
//! its session's buffer, or parks until an update arrives or the replay
//! window elapses.

pub mod bus;
pub mod channel;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod memory;
pub mod provider;
pub mod registry;
pub mod replay;
pub mod session;

pub use bus::UpdateBus;
pub use channel::{channel, unchannel, ChannelConfig};
pub use dispatcher::LongPollDispatcher;
pub use error::ProviderError;
pub use event::UpdateEvent;
pub use memory::MemoryProvider;
pub use provider::{BandRef, BandValue, ResourceProvider, ThingRef, UnboundProvider};
pub use registry::{SessionRegistry, SessionSlot};
pub use replay::{BufferPhase, ReplayBuffer};
pub use session::SessionToken;
