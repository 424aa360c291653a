//! The axum service: the REST cache route plus the operator flush trigger.

mod middleware;
pub mod rest;
mod state;
pub mod web;

pub use middleware::RequestContext;
pub use state::{HttpState, OperatorDirectory};

use axum::{
    Router,
    http::StatusCode,
    middleware::{from_fn, from_fn_with_state},
    routing::any,
};

use crate::application::error::HttpError;
use crate::application::notices::take_notices;
use crate::application::repos::RepoError;
use crate::cache::execution_scope;

use middleware::{log_responses, set_request_context};

/// Map a repository error to a consistent HTTP error response.
pub fn repo_error_to_http(source: &'static str, err: RepoError) -> HttpError {
    match err {
        RepoError::NotFound => HttpError::new(
            source,
            StatusCode::NOT_FOUND,
            "Resource not found",
            "resource not found",
        ),
        RepoError::InvalidInput { message } => {
            HttpError::new(source, StatusCode::BAD_REQUEST, "Invalid input", message)
        }
        RepoError::Timeout => HttpError::new(
            source,
            StatusCode::SERVICE_UNAVAILABLE,
            "Database timeout",
            "Database timeout",
        ),
        RepoError::Persistence(message) => HttpError::new(
            source,
            StatusCode::INTERNAL_SERVER_ERROR,
            "Persistence error",
            message,
        ),
    }
}

pub fn build_router(state: HttpState) -> Router {
    Router::new()
        .route(rest::CACHE_ROUTE, any(rest::cache_endpoint))
        .fallback(web::admin_screen)
        .layer(from_fn_with_state(state.clone(), web::flush_trigger))
        .layer(from_fn(take_notices))
        .layer(from_fn_with_state(state.cache.clone(), execution_scope))
        .layer(from_fn(log_responses))
        .layer(from_fn(set_request_context))
        .with_state(state)
}
