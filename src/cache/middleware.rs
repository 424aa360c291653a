//! Execution scope for HTTP requests.
//!
//! Each request gets its own [`CacheControl`], reachable by handlers through
//! `Extension<Arc<CacheControl>>`. Deferred repeats run after the handler has
//! produced its response.

use std::sync::Arc;

use axum::{body::Body, extract::State, http::Request, middleware::Next, response::Response};
use tracing::instrument;

use super::control::CacheControl;
use super::drivers::DriverSet;
use super::events::CacheObserver;

/// Process-wide pieces every execution shares.
#[derive(Clone)]
pub struct CacheState {
    pub drivers: Arc<DriverSet>,
    observers: Vec<Arc<dyn CacheObserver>>,
}

impl CacheState {
    pub fn new(drivers: Arc<DriverSet>) -> Self {
        Self {
            drivers,
            observers: Vec::new(),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn CacheObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Start a fresh execution.
    pub fn begin(&self) -> Arc<CacheControl> {
        let control = self
            .observers
            .iter()
            .cloned()
            .fold(CacheControl::new(self.drivers.clone()), |control, observer| {
                control.with_observer(observer)
            });
        Arc::new(control)
    }
}

#[instrument(skip_all, fields(path = %request.uri().path()))]
pub async fn execution_scope(
    State(cache): State<CacheState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let control = cache.begin();
    request.extensions_mut().insert(control.clone());

    let response = next.run(request).await;
    control.shutdown().await;
    response
}
