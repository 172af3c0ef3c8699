//! REST verb adapter: translates the HTTP surface into resource-provider
//! calls and serializes results into JSON-LD style envelopes.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use chrono::{SecondsFormat, Utc};
use futures::StreamExt;
use serde::Serialize;
use serde_json::{json, Map, Value};

use tidegate_core::{channel, ChannelConfig, LongPollDispatcher, ProviderError, ResourceProvider};

use crate::longpoll::{self, CookieSettings};

pub const IOT_CONTEXT: &str = "https://iotdb.org/pub/iot";

/// Bands exposed on the thing detail view.
const KNOWN_BANDS: [&str; 5] = ["istate", "ostate", "meta", "model", "connection"];

#[derive(Clone)]
pub struct AppState {
    pub provider: Arc<dyn ResourceProvider>,
    pub dispatcher: LongPollDispatcher,
    pub channels: ChannelConfig,
    pub cookie: CookieSettings,
}

/// Build the route table. The `longpoll` segment is static, so it wins over
/// the `:id` capture for that path.
pub fn router(state: AppState) -> Router {
    let prefix = state.channels.prefix.clone();
    let root = if prefix.is_empty() {
        "/".to_string()
    } else {
        prefix.clone()
    };

    Router::new()
        .route("/health", get(health_check))
        .route(&root, get(list_things))
        .route(&format!("{prefix}/longpoll"), any(longpoll::longpoll))
        .route(&format!("{prefix}/:id"), get(get_thing))
        .route(&format!("{prefix}/:id/:band"), get(get_band).put(put_band))
        .with_state(state)
}

/// JSON error envelope `{"@id": …, "error": …}` with the status derived
/// from the provider error kind.
pub struct ErrorEnvelope {
    at_id: String,
    error: ProviderError,
}

impl ErrorEnvelope {
    pub fn new(at_id: impl Into<String>, error: ProviderError) -> Self {
        Self {
            at_id: at_id.into(),
            error,
        }
    }
}

impl IntoResponse for ErrorEnvelope {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.error.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = json!({ "@id": self.at_id, "error": self.error.to_string() });
        (status, Json(body)).into_response()
    }
}

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    status: &'static str,
}

/// GET /health
pub async fn health_check() -> Json<HealthStatus> {
    Json(HealthStatus { status: "ok" })
}

/// GET /{prefix} — enumerate things as channel references.
pub async fn list_things(State(state): State<AppState>) -> Result<Json<Value>, ErrorEnvelope> {
    let root = channel(&state.channels, &[]);

    let mut things = Vec::new();
    let mut listed = state.provider.list();
    while let Some(next) = listed.next().await {
        match next {
            Ok(thing) => things.push(Value::String(channel(&state.channels, &[&thing.id]))),
            Err(err) => return Err(ErrorEnvelope::new(root, err)),
        }
    }

    Ok(Json(json!({
        "@id": root,
        "@context": IOT_CONTEXT,
        "things": things,
    })))
}

/// GET /{prefix}/:id — band map for one thing.
pub async fn get_thing(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ErrorEnvelope> {
    let at_id = channel(&state.channels, &[&id]);

    let mut body = Map::new();
    body.insert("@id".to_string(), Value::String(at_id.clone()));
    body.insert("@context".to_string(), Value::String(IOT_CONTEXT.to_string()));
    body.insert("@type".to_string(), Value::String("iot:Thing".to_string()));

    let mut banded = state.provider.bands(&id);
    while let Some(next) = banded.next().await {
        match next {
            Ok(band) if KNOWN_BANDS.contains(&band.band.as_str()) => {
                let url = band
                    .url
                    .unwrap_or_else(|| channel(&state.channels, &[&id, &band.band]));
                body.insert(band.band, Value::String(url));
            }
            Ok(_) => {}
            Err(err) => return Err(ErrorEnvelope::new(at_id, err)),
        }
    }

    Ok(Json(Value::Object(body)))
}

/// GET /{prefix}/:id/:band — read one band value.
pub async fn get_band(
    State(state): State<AppState>,
    Path((id, band)): Path<(String, String)>,
) -> Result<Json<Value>, ErrorEnvelope> {
    let at_id = channel(&state.channels, &[&id, &band]);

    let read = state
        .provider
        .get(&id, &band)
        .await
        .map_err(|err| ErrorEnvelope::new(at_id.clone(), err))?;

    Ok(Json(band_envelope(&state.channels, &id, &band, read.value)))
}

/// PUT /{prefix}/:id/:band — treated as a patch: the body is shallow-merged
/// over the current value and stamped before being written back. When no
/// current value can be read, the body is taken as the full initial value.
pub async fn put_band(
    State(state): State<AppState>,
    Path((id, band)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ErrorEnvelope> {
    let at_id = channel(&state.channels, &[&id, &band]);

    let Value::Object(patch) = body else {
        return Err(ErrorEnvelope::new(
            at_id,
            ProviderError::Internal("request body must be a JSON object".to_string()),
        ));
    };

    let mut merged = match state.provider.get(&id, &band).await {
        Ok(current) => {
            let mut value = current.value;
            for (key, item) in patch {
                value.insert(key, item);
            }
            value
        }
        Err(_) => patch,
    };
    merged.insert(
        "@timestamp".to_string(),
        Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
    );

    let stored = state
        .provider
        .put(&id, &band, merged)
        .await
        .map_err(|err| ErrorEnvelope::new(at_id.clone(), err))?;

    Ok(Json(band_envelope(&state.channels, &id, &band, stored.value)))
}

/// Merge a band value under its envelope. Envelope keys win over value keys.
fn band_envelope(channels: &ChannelConfig, id: &str, band: &str, value: Map<String, Value>) -> Value {
    let mut body = Map::new();
    body.insert(
        "@id".to_string(),
        Value::String(channel(channels, &[id, band])),
    );
    match band {
        "istate" | "ostate" => {
            body.insert(
                "@context".to_string(),
                Value::String(channel(channels, &[id, "model"])),
            );
        }
        "meta" | "connection" => {
            body.insert("@context".to_string(), Value::String(IOT_CONTEXT.to_string()));
        }
        _ => {}
    }

    for (key, item) in value {
        body.entry(key).or_insert(item);
    }

    // A model's own context carries base/vocab entries that only make sense
    // inside the provider; strip them from what we serve.
    if band == "model" {
        if let Some(Value::Object(context)) = body.get_mut("@context") {
            context.remove("@base");
            context.remove("@vocab");
        }
    }

    Value::Object(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request};
    use tower::ServiceExt;

    use tidegate_core::{MemoryProvider, UpdateEvent};

    async fn state_with(window: Duration) -> (AppState, MemoryProvider) {
        let provider = MemoryProvider::new();
        let dispatcher = LongPollDispatcher::new(window);
        {
            let dispatcher = dispatcher.clone();
            let provider: Arc<dyn ResourceProvider> = Arc::new(provider.clone());
            tokio::spawn(async move { dispatcher.run(provider).await });
        }

        let state = AppState {
            provider: Arc::new(provider.clone()),
            dispatcher,
            channels: ChannelConfig::new("/things"),
            cookie: CookieSettings {
                name: "transport-longpoll".to_string(),
                max_age: Duration::from_secs(900),
            },
        };
        (state, provider)
    }

    fn object(raw: Value) -> Map<String, Value> {
        raw.as_object().expect("object literal").clone()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body read");
        serde_json::from_slice(&bytes).expect("json body")
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .body(Body::empty())
            .expect("request")
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let (state, _provider) = state_with(Duration::from_secs(1)).await;
        let response = router(state)
            .oneshot(get_request("/health"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({"status": "ok"}));
    }

    #[tokio::test]
    async fn list_enumerates_things_as_channels() {
        let (state, provider) = state_with(Duration::from_secs(1)).await;
        provider.seed("T1", "ostate", Map::new()).await;
        provider.seed("T2", "meta", Map::new()).await;

        let response = router(state)
            .oneshot(get_request("/things"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            json!({
                "@id": "/things",
                "@context": IOT_CONTEXT,
                "things": ["/things/T1", "/things/T2"],
            })
        );
    }

    #[tokio::test]
    async fn thing_detail_maps_known_bands_to_channels() {
        let (state, provider) = state_with(Duration::from_secs(1)).await;
        provider.seed("T1", "ostate", Map::new()).await;
        provider.seed("T1", "meta", Map::new()).await;
        provider.seed("T1", "scratch", Map::new()).await;

        let response = router(state)
            .oneshot(get_request("/things/T1"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            json!({
                "@id": "/things/T1",
                "@context": IOT_CONTEXT,
                "@type": "iot:Thing",
                "meta": "/things/T1/meta",
                "ostate": "/things/T1/ostate",
            })
        );
    }

    #[tokio::test]
    async fn unknown_thing_band_yields_404_envelope() {
        let (state, _provider) = state_with(Duration::from_secs(1)).await;

        let response = router(state)
            .oneshot(get_request("/things/unknown-id/meta"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            body_json(response).await,
            json!({"@id": "/things/unknown-id/meta", "error": "not found"})
        );
    }

    #[tokio::test]
    async fn state_bands_point_their_context_at_the_model() {
        let (state, provider) = state_with(Duration::from_secs(1)).await;
        provider
            .seed("T1", "ostate", object(json!({"on": 1})))
            .await;

        let response = router(state)
            .oneshot(get_request("/things/T1/ostate"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            json!({
                "@id": "/things/T1/ostate",
                "@context": "/things/T1/model",
                "on": 1,
            })
        );
    }

    #[tokio::test]
    async fn model_band_context_drops_base_and_vocab() {
        let (state, provider) = state_with(Duration::from_secs(1)).await;
        provider
            .seed(
                "T1",
                "model",
                object(json!({
                    "@context": {"@base": "x:", "@vocab": "y:", "iot": "z:"},
                    "iot:kind": "light",
                })),
            )
            .await;

        let response = router(state)
            .oneshot(get_request("/things/T1/model"))
            .await
            .expect("response");
        assert_eq!(
            body_json(response).await,
            json!({
                "@id": "/things/T1/model",
                "@context": {"iot": "z:"},
                "iot:kind": "light",
            })
        );
    }

    #[tokio::test]
    async fn put_patches_over_the_current_value() {
        let (state, provider) = state_with(Duration::from_secs(1)).await;
        provider
            .seed("T1", "ostate", object(json!({"on": 0, "brightness": 50})))
            .await;

        let request = Request::builder()
            .method("PUT")
            .uri("/things/T1/ostate")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"on": 1}"#))
            .expect("request");
        let response = router(state).oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["on"], json!(1));
        assert_eq!(body["brightness"], json!(50));
        assert!(body["@timestamp"].is_string());

        let stored = provider.get("T1", "ostate").await.expect("stored");
        assert_eq!(stored.value["on"], json!(1));
        assert_eq!(stored.value["brightness"], json!(50));
        assert!(stored.value.contains_key("@timestamp"));
    }

    #[tokio::test]
    async fn put_to_a_missing_band_takes_the_body_as_initial_value() {
        let (state, provider) = state_with(Duration::from_secs(1)).await;

        let request = Request::builder()
            .method("PUT")
            .uri("/things/T1/ostate")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"on": 1}"#))
            .expect("request");
        let response = router(state).oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        let stored = provider.get("T1", "ostate").await.expect("stored");
        assert_eq!(stored.value["on"], json!(1));
    }

    #[tokio::test]
    async fn longpoll_times_out_with_an_empty_object_and_a_cookie() {
        let (state, _provider) = state_with(Duration::from_millis(100)).await;

        let response = router(state)
            .oneshot(get_request("/things/longpoll"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        let set_cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .expect("cookie issued")
            .to_str()
            .expect("ascii cookie")
            .to_string();
        assert!(set_cookie.starts_with("transport-longpoll="));
        assert!(set_cookie.contains("Max-Age=900"));
        assert!(set_cookie.contains("HttpOnly"));

        assert_eq!(body_json(response).await, json!({}));
    }

    #[tokio::test]
    async fn longpoll_delivers_pending_updates_keyed_by_channel() {
        let (state, _provider) = state_with(Duration::from_millis(100)).await;
        let app = router(state.clone());

        // First contact creates the session and issues the cookie.
        let first = app
            .clone()
            .oneshot(get_request("/things/longpoll"))
            .await
            .expect("response");
        let cookie_pair = first
            .headers()
            .get(header::SET_COOKIE)
            .expect("cookie issued")
            .to_str()
            .expect("ascii cookie")
            .split(';')
            .next()
            .expect("cookie pair")
            .to_string();

        state
            .dispatcher
            .publish(UpdateEvent::new("T1", "ostate", object(json!({"on": 1}))));
        tokio::time::sleep(Duration::from_millis(30)).await;

        let request = Request::builder()
            .uri("/things/longpoll")
            .header(header::COOKIE, cookie_pair)
            .body(Body::empty())
            .expect("request");
        let second = app.oneshot(request).await.expect("response");
        assert_eq!(second.status(), StatusCode::OK);
        assert_eq!(
            body_json(second).await,
            json!({"/things/T1/ostate": {"on": 1}})
        );
    }

    #[tokio::test]
    async fn parked_longpoll_wakes_when_an_update_arrives() {
        let (state, provider) = state_with(Duration::from_secs(5)).await;
        let app = router(state.clone());

        let first = app
            .clone()
            .oneshot(get_request("/things/longpoll"))
            .await
            .expect("response");
        let cookie_pair = first
            .headers()
            .get(header::SET_COOKIE)
            .expect("cookie issued")
            .to_str()
            .expect("ascii cookie")
            .split(';')
            .next()
            .expect("cookie pair")
            .to_string();

        let parked = tokio::spawn({
            let app = app.clone();
            let cookie_pair = cookie_pair.clone();
            async move {
                let request = Request::builder()
                    .uri("/things/longpoll")
                    .header(header::COOKIE, cookie_pair)
                    .body(Body::empty())
                    .expect("request");
                app.oneshot(request).await.expect("response")
            }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;

        provider
            .put("T1", "ostate", object(json!({"on": 1})))
            .await
            .expect("put ok");

        let response = tokio::time::timeout(Duration::from_secs(1), parked)
            .await
            .expect("delivery before timeout")
            .expect("task ok");
        let body = body_json(response).await;
        let delivered = body["/things/T1/ostate"].as_object().expect("delivered");
        assert_eq!(delivered["on"], json!(1));
    }

    #[tokio::test]
    async fn first_poll_wait_is_bounded_by_the_window() {
        let (state, _provider) = state_with(Duration::from_millis(80)).await;

        let started = std::time::Instant::now();
        let response = router(state)
            .oneshot(get_request("/things/longpoll"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert!(started.elapsed() >= Duration::from_millis(80));
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
