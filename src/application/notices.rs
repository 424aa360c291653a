//! One-shot operator notices carried across a redirect in a cookie.

use axum::{
    body::Body,
    http::{Request, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use tracing::debug;

pub const NOTICE_COOKIE: &str = "mwp_system_growl";
pub const MAX_NOTICES: usize = 10;

/// Ordered, de-duplicated notice messages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Notices(Vec<String>);

impl Notices {
    /// Returns `false` when the message was empty, a duplicate, or the queue is full.
    pub fn push(&mut self, message: impl Into<String>) -> bool {
        let message = message.into();
        let message = message.trim();
        if message.is_empty() || self.0.len() >= MAX_NOTICES || self.0.iter().any(|m| m == message)
        {
            return false;
        }
        self.0.push(message.to_string());
        true
    }

    pub fn messages(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn encode(&self) -> String {
        let json = serde_json::to_vec(&self.0).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(json)
    }

    /// Malformed cookies decode to an empty queue.
    pub fn decode(value: &str) -> Self {
        let decoded = URL_SAFE_NO_PAD
            .decode(value.trim_end_matches('='))
            .ok()
            .and_then(|bytes| serde_json::from_slice::<Vec<String>>(&bytes).ok());
        let Some(messages) = decoded else {
            debug!("Discarding malformed notice cookie");
            return Self::default();
        };
        let mut notices = Self::default();
        for message in messages {
            notices.push(message);
        }
        notices
    }

    /// Store the queue in the response cookie jar.
    pub fn queue(&self, jar: CookieJar) -> CookieJar {
        jar.add(
            Cookie::build((NOTICE_COOKIE, self.encode()))
                .path("/")
                .http_only(true)
                .build(),
        )
    }
}

/// Expose queued notices to handlers as a `Notices` extension, then clear the cookie.
pub async fn take_notices(mut request: Request<Body>, next: Next) -> Response {
    let jar = CookieJar::from_headers(request.headers());
    let Some(cookie) = jar.get(NOTICE_COOKIE) else {
        request.extensions_mut().insert(Notices::default());
        return next.run(request).await;
    };

    request
        .extensions_mut()
        .insert(Notices::decode(cookie.value()));
    let response = next.run(request).await;

    let requeued = response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .any(|value| value.starts_with(&format!("{NOTICE_COOKIE}=")));
    if requeued {
        return response;
    }

    let cleared = jar.remove(Cookie::build(NOTICE_COOKIE).path("/"));
    (cleared, response).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_drops_empty_duplicate_and_overflow() {
        let mut notices = Notices::default();
        assert!(notices.push("Cache flushed"));
        assert!(!notices.push("Cache flushed"));
        assert!(!notices.push("   "));
        for index in 1..20 {
            notices.push(format!("notice {index}"));
        }
        assert_eq!(notices.messages().len(), MAX_NOTICES);
        assert_eq!(notices.messages()[0], "Cache flushed");
    }

    #[test]
    fn cookie_value_decodes_back() {
        let mut notices = Notices::default();
        notices.push("Cache flushed");
        notices.push("Plugin updated");
        assert_eq!(Notices::decode(&notices.encode()), notices);
    }

    #[test]
    fn malformed_cookie_is_ignored() {
        assert!(Notices::decode("not base64 !!").is_empty());
        assert!(Notices::decode(&URL_SAFE_NO_PAD.encode("{}")).is_empty());
    }
}
