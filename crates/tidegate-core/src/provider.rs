//! The reactive data source the gateway bridges to HTTP.

use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use serde_json::{Map, Value};

use crate::{error::ProviderError, event::UpdateEvent};

/// Reference to a thing, as yielded by [`ResourceProvider::list`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThingRef {
    pub id: String,
}

/// Reference to one band of a thing. `url` overrides the canonical channel
/// path when the provider hosts the band elsewhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BandRef {
    pub id: String,
    pub band: String,
    pub url: Option<String>,
}

/// A band value read from or written to a provider.
#[derive(Debug, Clone, PartialEq)]
pub struct BandValue {
    pub id: String,
    pub band: String,
    pub value: Map<String, Value>,
}

/// Verb set of a reactive resource provider.
///
/// `list` and `bands` yield lazy sequences; `get` and `put` are single
/// results; `subscribe_updated` is a live change stream that stays active
/// for the process lifetime.
#[async_trait]
pub trait ResourceProvider: Send + Sync {
    /// Enumerate known things.
    fn list(&self) -> BoxStream<'static, Result<ThingRef, ProviderError>>;

    /// Enumerate the bands of one thing.
    fn bands(&self, id: &str) -> BoxStream<'static, Result<BandRef, ProviderError>>;

    /// Read a single band value.
    async fn get(&self, id: &str, band: &str) -> Result<BandValue, ProviderError>;

    /// Write a band value, returning what was stored.
    async fn put(
        &self,
        id: &str,
        band: &str,
        value: Map<String, Value>,
    ) -> Result<BandValue, ProviderError>;

    /// Live change notifications.
    fn subscribe_updated(&self) -> BoxStream<'static, Result<UpdateEvent, ProviderError>>;
}

/// Placeholder provider whose verbs all answer
/// [`ProviderError::NeverImplemented`], signalling that an integrator must
/// bind a real data source.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnboundProvider;

#[async_trait]
impl ResourceProvider for UnboundProvider {
    fn list(&self) -> BoxStream<'static, Result<ThingRef, ProviderError>> {
        let err: Result<ThingRef, ProviderError> = Err(ProviderError::NeverImplemented);
        stream::once(async move { err }).boxed()
    }

    fn bands(&self, _id: &str) -> BoxStream<'static, Result<BandRef, ProviderError>> {
        let err: Result<BandRef, ProviderError> = Err(ProviderError::NeverImplemented);
        stream::once(async move { err }).boxed()
    }

    async fn get(&self, _id: &str, _band: &str) -> Result<BandValue, ProviderError> {
        Err(ProviderError::NeverImplemented)
    }

    async fn put(
        &self,
        _id: &str,
        _band: &str,
        _value: Map<String, Value>,
    ) -> Result<BandValue, ProviderError> {
        Err(ProviderError::NeverImplemented)
    }

    fn subscribe_updated(&self) -> BoxStream<'static, Result<UpdateEvent, ProviderError>> {
        stream::pending().boxed()
    }
}
