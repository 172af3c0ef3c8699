//! In-memory provider used by the demo wiring and the test suite.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use serde_json::{Map, Value};
use tokio::sync::{broadcast, Mutex};
use tracing::warn;

use crate::{
    error::ProviderError,
    event::UpdateEvent,
    provider::{BandRef, BandValue, ResourceProvider, ThingRef},
};

const UPDATE_DEPTH: usize = 64;

type BandMap = BTreeMap<String, Map<String, Value>>;

/// Thing/band store held entirely in process memory. Every `put` replaces
/// the band value and emits the change on the update stream.
#[derive(Debug, Clone)]
pub struct MemoryProvider {
    inner: Arc<MemoryInner>,
}

#[derive(Debug)]
struct MemoryInner {
    things: Mutex<BTreeMap<String, BandMap>>,
    updates: broadcast::Sender<UpdateEvent>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        let (updates, _) = broadcast::channel(UPDATE_DEPTH);
        Self {
            inner: Arc::new(MemoryInner {
                things: Mutex::new(BTreeMap::new()),
                updates,
            }),
        }
    }

    /// Store a band value without emitting an update event.
    pub async fn seed(&self, id: &str, band: &str, value: Map<String, Value>) {
        let mut things = self.inner.things.lock().await;
        things
            .entry(id.to_string())
            .or_default()
            .insert(band.to_string(), value);
    }
}

impl Default for MemoryProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResourceProvider for MemoryProvider {
    fn list(&self) -> BoxStream<'static, Result<ThingRef, ProviderError>> {
        let inner = Arc::clone(&self.inner);
        stream::once(async move {
            let things = inner.things.lock().await;
            let refs: Vec<Result<ThingRef, ProviderError>> = things
                .keys()
                .map(|id| Ok(ThingRef { id: id.clone() }))
                .collect();
            stream::iter(refs)
        })
        .flatten()
        .boxed()
    }

    fn bands(&self, id: &str) -> BoxStream<'static, Result<BandRef, ProviderError>> {
        let inner = Arc::clone(&self.inner);
        let id = id.to_string();
        stream::once(async move {
            let things = inner.things.lock().await;
            let refs: Vec<Result<BandRef, ProviderError>> = match things.get(&id) {
                Some(bands) => bands
                    .keys()
                    .map(|band| {
                        Ok(BandRef {
                            id: id.clone(),
                            band: band.clone(),
                            url: None,
                        })
                    })
                    .collect(),
                None => vec![Err(ProviderError::NotFound)],
            };
            stream::iter(refs)
        })
        .flatten()
        .boxed()
    }

    async fn get(&self, id: &str, band: &str) -> Result<BandValue, ProviderError> {
        let things = self.inner.things.lock().await;
        things
            .get(id)
            .and_then(|bands| bands.get(band))
            .map(|value| BandValue {
                id: id.to_string(),
                band: band.to_string(),
                value: value.clone(),
            })
            .ok_or(ProviderError::NotFound)
    }

    async fn put(
        &self,
        id: &str,
        band: &str,
        value: Map<String, Value>,
    ) -> Result<BandValue, ProviderError> {
        {
            let mut things = self.inner.things.lock().await;
            things
                .entry(id.to_string())
                .or_default()
                .insert(band.to_string(), value.clone());
        }

        let _ = self.inner.updates.send(UpdateEvent::new(id, band, value.clone()));

        Ok(BandValue {
            id: id.to_string(),
            band: band.to_string(),
            value,
        })
    }

    fn subscribe_updated(&self) -> BoxStream<'static, Result<UpdateEvent, ProviderError>> {
        let updates = self.inner.updates.subscribe();
        stream::unfold(updates, |mut updates| async move {
            loop {
                match updates.recv().await {
                    Ok(event) => return Some((Ok::<_, ProviderError>(event), updates)),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "update subscriber lagged; changes dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        })
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value(pairs: &[(&str, i64)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), Value::from(*v)))
            .collect()
    }

    #[tokio::test]
    async fn get_of_missing_band_is_not_found() {
        let provider = MemoryProvider::new();
        assert_eq!(
            provider.get("T1", "ostate").await,
            Err(ProviderError::NotFound)
        );
    }

    #[tokio::test]
    async fn put_stores_and_get_reads_back() {
        let provider = MemoryProvider::new();
        provider
            .put("T1", "ostate", value(&[("on", 1)]))
            .await
            .expect("put ok");

        let read = provider.get("T1", "ostate").await.expect("get ok");
        assert_eq!(read.value, value(&[("on", 1)]));
    }

    #[tokio::test]
    async fn list_and_bands_enumerate_the_store() {
        let provider = MemoryProvider::new();
        provider.seed("T1", "ostate", value(&[("on", 0)])).await;
        provider.seed("T1", "meta", Map::new()).await;
        provider.seed("T2", "istate", Map::new()).await;

        let ids: Vec<_> = provider
            .list()
            .filter_map(|r| async move { r.ok().map(|t| t.id) })
            .collect()
            .await;
        assert_eq!(ids, ["T1", "T2"]);

        let bands: Vec<_> = provider
            .bands("T1")
            .filter_map(|r| async move { r.ok().map(|b| b.band) })
            .collect()
            .await;
        assert_eq!(bands, ["meta", "ostate"]);
    }

    #[tokio::test]
    async fn bands_of_unknown_thing_is_not_found() {
        let provider = MemoryProvider::new();
        let first = provider.bands("missing").next().await;
        assert_eq!(first, Some(Err(ProviderError::NotFound)));
    }

    #[tokio::test]
    async fn put_emits_on_the_update_stream() {
        let provider = MemoryProvider::new();
        let mut updates = provider.subscribe_updated();

        provider
            .put("T1", "ostate", value(&[("on", 1)]))
            .await
            .expect("put ok");

        let event = updates
            .next()
            .await
            .expect("stream yields")
            .expect("event ok");
        assert_eq!(event.id, "T1");
        assert_eq!(event.band, "ostate");
        assert_eq!(event.value, value(&[("on", 1)]));
    }
}
