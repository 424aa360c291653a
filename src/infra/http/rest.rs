//! `FLUSH` and `PURGE` on `/wp-json/{site_uid}/v1/cache`.
//!
//! Any rejection answers exactly like a route that does not exist.

use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::{
        HeaderMap, HeaderValue, Method,
        header::{AUTHORIZATION, CACHE_CONTROL, EXPIRES},
    },
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tracing::info;

use crate::application::error::HttpError;
use crate::cache::CacheControl;
use crate::domain::cache_type::{CacheType, TypeSelection, parse_names};

use super::repo_error_to_http;
use super::state::HttpState;

const SOURCE: &str = "infra::http::rest";
pub const CACHE_ROUTE: &str = "/wp-json/{site_uid}/v1/cache";
pub const PLUGIN_HEADER: &str = "x-mwp2-system-plugin";
pub const VERSION_ID_HEADER: &str = "x-mwp2-version-id";
const NO_CACHE: &str = "no-cache, must-revalidate, max-age=0";
const EXPIRED: &str = "Wed, 11 Jan 1984 05:00:00 GMT";

#[derive(Debug, Default, Deserialize)]
pub struct CacheQuery {
    #[serde(rename = "mwp-token")]
    token: Option<String>,
    types: Option<String>,
    urls: Option<String>,
}

pub async fn cache_endpoint(
    State(state): State<HttpState>,
    Path(site_uid): Path<String>,
    Extension(control): Extension<Arc<CacheControl>>,
    method: Method,
    headers: HeaderMap,
    Query(query): Query<CacheQuery>,
) -> Response {
    let purge = match method.as_str() {
        "FLUSH" => false,
        "PURGE" => true,
        other => {
            return HttpError::hidden(SOURCE, format!("method {other} not routed"))
                .into_response();
        }
    };
    if site_uid != state.site.site_uid {
        return HttpError::hidden(SOURCE, "namespace does not match this site").into_response();
    }

    let header_token = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok());
    let token = query.token.as_deref().or(header_token);
    let principal = match state.auth.authenticate(token).await {
        Ok(principal) => principal,
        Err(err) => {
            return HttpError::hidden(SOURCE, format!("token rejected: {err}")).into_response();
        }
    };

    let response = if purge {
        let mut urls: Vec<String> = query
            .urls
            .as_deref()
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|url| !url.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        if urls.is_empty() {
            match state.links.home_url().await {
                Ok(home) => urls.push(home),
                Err(err) => return repo_error_to_http(SOURCE, err).into_response(),
            }
        }
        let dispatched = control.purge(&urls).await;
        info!(?principal, urls = dispatched.len(), "REST purge handled");
        Json(dispatched).into_response()
    } else {
        let selection = match parse_names(query.types.iter()) {
            Some(types) => TypeSelection::Only(types),
            None => TypeSelection::only([CacheType::Object]),
        };
        let report = control.flush(&selection).await;
        info!(?principal, flushed = report.outcomes.len(), "REST flush handled");
        Json(report).into_response()
    };

    with_route_headers(response, state.version_id)
}

fn with_route_headers(mut response: Response, version_id: u64) -> Response {
    let headers = response.headers_mut();
    headers.insert(
        PLUGIN_HEADER,
        HeaderValue::from_static(env!("CARGO_PKG_VERSION")),
    );
    headers.insert(VERSION_ID_HEADER, HeaderValue::from(version_id));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static(NO_CACHE));
    headers.insert(EXPIRES, HeaderValue::from_static(EXPIRED));
    response
}
