//! The operator-facing flush link and the admin screen that offers it.

use std::sync::Arc;

use axum::{
    Extension, Json,
    body::Body,
    extract::State,
    http::{HeaderValue, Request, StatusCode, Uri, header::LOCATION},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use serde::Serialize;
use tracing::{debug, info};
use url::{Url, form_urlencoded};

use crate::application::nonce::{ACTION_PARAM, FLUSH_ACTION, NONCE_PARAM};
use crate::application::notices::Notices;
use crate::cache::CacheControl;

use super::state::HttpState;

pub const FLUSHED_NOTICE: &str = "Cache flushed";

/// Handle `?mwp-action=cache_flush&_wpnonce=…` for an authorized operator.
///
/// Anything short of a valid, unused nonce from a capable operator passes
/// through untouched.
pub async fn flush_trigger(
    State(state): State<HttpState>,
    jar: CookieJar,
    request: Request<Body>,
    next: Next,
) -> Response {
    let Some(nonce) = requested_flush(request.uri()) else {
        return next.run(request).await;
    };
    let Some(operator) = state.operators.authorized(&jar) else {
        debug!("Flush trigger ignored: no authorized operator");
        return next.run(request).await;
    };
    if !state.nonces.consume(&nonce, FLUSH_ACTION, operator.user_id) {
        debug!(user_id = operator.user_id, "Flush trigger ignored: nonce rejected");
        return next.run(request).await;
    }
    let Some(control) = request.extensions().get::<Arc<CacheControl>>().cloned() else {
        debug!("Flush trigger ignored: no execution scope");
        return next.run(request).await;
    };

    let report = control.flush_all().await;
    info!(
        user_id = operator.user_id,
        flushed = report.outcomes.len(),
        "Operator flushed all caches"
    );

    let jar = if report.is_empty() {
        jar
    } else {
        let mut notices = request
            .extensions()
            .get::<Notices>()
            .cloned()
            .unwrap_or_default();
        notices.push(FLUSHED_NOTICE);
        notices.queue(jar)
    };

    let location = strip_trigger(request.uri());
    let mut response = StatusCode::FOUND.into_response();
    match HeaderValue::try_from(location) {
        Ok(value) => {
            response.headers_mut().insert(LOCATION, value);
        }
        Err(err) => debug!(error = %err, "Redirect target is not a valid header"),
    }
    (jar, response).into_response()
}

fn requested_flush(uri: &Uri) -> Option<String> {
    let query = uri.query()?;
    let mut action = None;
    let mut nonce = None;
    for (key, value) in form_urlencoded::parse(query.as_bytes()) {
        match key.as_ref() {
            ACTION_PARAM => action = Some(value.into_owned()),
            NONCE_PARAM => nonce = Some(value.into_owned()),
            _ => {}
        }
    }
    (action.as_deref() == Some(FLUSH_ACTION))
        .then_some(nonce)
        .flatten()
        .filter(|nonce| !nonce.is_empty())
}

/// The request target without the trigger parameters.
fn strip_trigger(uri: &Uri) -> String {
    let kept: Vec<(String, String)> = uri
        .query()
        .map(|query| {
            form_urlencoded::parse(query.as_bytes())
                .filter(|(key, _)| key != ACTION_PARAM && key != NONCE_PARAM)
                .map(|(key, value)| (key.into_owned(), value.into_owned()))
                .collect()
        })
        .unwrap_or_default();

    if kept.is_empty() {
        return uri.path().to_string();
    }
    let query = form_urlencoded::Serializer::new(String::new())
        .extend_pairs(kept)
        .finish();
    format!("{}?{query}", uri.path())
}

#[derive(Debug, Serialize)]
pub struct AdminScreen {
    pub notices: Vec<String>,
    pub flush_url: Option<String>,
}

/// Everything outside the REST route: pending notices plus, for operators,
/// a fresh flush link for the current page.
pub async fn admin_screen(
    State(state): State<HttpState>,
    jar: CookieJar,
    notices: Option<Extension<Notices>>,
    uri: Uri,
) -> Json<AdminScreen> {
    let notices = notices
        .map(|Extension(notices)| notices.messages().to_vec())
        .unwrap_or_default();

    let flush_url = state.operators.authorized(&jar).and_then(|operator| {
        let base = Url::parse(&state.site.default_site_url)
            .and_then(|site| site.join(&strip_trigger(&uri)))
            .ok()?;
        Some(state.nonces.flush_url(&base, operator.user_id).to_string())
    });

    Json(AdminScreen { notices, flush_url })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trigger_needs_action_and_nonce() {
        let uri: Uri = "/wp-admin/?mwp-action=cache_flush&_wpnonce=abc".parse().expect("uri");
        assert_eq!(requested_flush(&uri).as_deref(), Some("abc"));

        let uri: Uri = "/wp-admin/?mwp-action=other&_wpnonce=abc".parse().expect("uri");
        assert!(requested_flush(&uri).is_none());

        let uri: Uri = "/wp-admin/?mwp-action=cache_flush".parse().expect("uri");
        assert!(requested_flush(&uri).is_none());
    }

    #[test]
    fn redirect_keeps_unrelated_parameters() {
        let uri: Uri = "/wp-admin/edit.php?post_type=page&mwp-action=cache_flush&_wpnonce=abc"
            .parse()
            .expect("uri");
        assert_eq!(strip_trigger(&uri), "/wp-admin/edit.php?post_type=page");

        let uri: Uri = "/wp-admin/?mwp-action=cache_flush&_wpnonce=abc".parse().expect("uri");
        assert_eq!(strip_trigger(&uri), "/wp-admin/");
    }
}
