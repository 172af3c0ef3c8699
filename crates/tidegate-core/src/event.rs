use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single band change emitted by a resource provider.
///
/// Immutable once emitted; the fan-out path clones it per session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateEvent {
    /// Opaque id of the thing that changed.
    pub id: String,
    /// Which band of the thing changed.
    pub band: String,
    /// The new band value.
    pub value: Map<String, Value>,
    /// When the provider observed the change.
    pub timestamp: DateTime<Utc>,
}

impl UpdateEvent {
    /// Build an event stamped with the current time.
    pub fn new(id: impl Into<String>, band: impl Into<String>, value: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            band: band.into(),
            value,
            timestamp: Utc::now(),
        }
    }
}
