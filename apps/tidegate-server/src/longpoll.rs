//! Long-poll HTTP endpoint: session cookie in, pending updates out.

use std::time::Duration;

use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{Map, Value};
use tracing::debug;

use tidegate_core::{channel, SessionToken};

use crate::handlers::AppState;

/// Session cookie parameters for the long-poll endpoint.
#[derive(Debug, Clone)]
pub struct CookieSettings {
    pub name: String,
    pub max_age: Duration,
}

/// ALL /{prefix}/longpoll — deliver every update pending for this client's
/// session, parking until data arrives or the window elapses.
///
/// The response is a JSON object keyed by channel path; an empty object
/// means the window passed without updates. A client without a session
/// cookie gets a fresh token issued alongside its first delivery.
pub async fn longpoll(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let (token, fresh) = match session_token(&headers, &state.cookie.name) {
        Some(token) => (token, false),
        None => (SessionToken::generate(), true),
    };

    let events = state.dispatcher.poll(&token).await;

    let mut delivery = Map::new();
    for event in events {
        delivery.insert(
            channel(&state.channels, &[&event.id, &event.band]),
            Value::Object(event.value),
        );
    }
    debug!(session = %token, delivered = delivery.len(), "long-poll delivery");

    let mut response = Json(Value::Object(delivery)).into_response();
    if fresh {
        match cookie_header(&state.cookie, &token) {
            Ok(value) => {
                response.headers_mut().append(header::SET_COOKIE, value);
            }
            Err(_) => return StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        }
    }
    response
}

/// Extract this client's session token from the `Cookie` header.
fn session_token(headers: &HeaderMap, name: &str) -> Option<SessionToken> {
    let raw = headers.get(header::COOKIE)?.to_str().ok()?;
    raw.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key == name && !value.is_empty()).then(|| SessionToken::from(value))
    })
}

fn cookie_header(
    cookie: &CookieSettings,
    token: &SessionToken,
) -> Result<HeaderValue, header::InvalidHeaderValue> {
    HeaderValue::from_str(&format!(
        "{}={}; Max-Age={}; Path=/; HttpOnly",
        cookie.name,
        token.as_str(),
        cookie.max_age.as_secs(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers_with_cookie(raw: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_str(raw).expect("cookie"));
        headers
    }

    #[test]
    fn token_is_found_among_other_cookies() {
        let headers = headers_with_cookie("other=1; transport-longpoll=abc123; last=z");
        let token = session_token(&headers, "transport-longpoll").expect("token");
        assert_eq!(token.as_str(), "abc123");
    }

    #[test]
    fn missing_or_empty_cookie_yields_none() {
        assert!(session_token(&HeaderMap::new(), "transport-longpoll").is_none());

        let headers = headers_with_cookie("transport-longpoll=");
        assert!(session_token(&headers, "transport-longpoll").is_none());

        let headers = headers_with_cookie("unrelated=abc");
        assert!(session_token(&headers, "transport-longpoll").is_none());
    }

    #[test]
    fn issued_cookie_is_http_only_with_max_age() {
        let settings = CookieSettings {
            name: "transport-longpoll".to_string(),
            max_age: Duration::from_secs(900),
        };
        let token = SessionToken::from("abc123");
        let value = cookie_header(&settings, &token).expect("header value");
        assert_eq!(
            value.to_str().expect("ascii"),
            "transport-longpoll=abc123; Max-Age=900; Path=/; HttpOnly"
        );
    }
}
