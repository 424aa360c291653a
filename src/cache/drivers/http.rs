use std::sync::Arc;

use tracing::{info, warn};

use crate::cache::edge::{EdgeRequest, EdgeTarget, EdgeTransport};

use super::FlushOutcome;

/// Edge tier. Flush and purge are advisory, so remote failures never surface.
pub struct HttpDriver {
    target: EdgeTarget,
    transport: Arc<dyn EdgeTransport>,
}

impl HttpDriver {
    pub fn new(target: EdgeTarget, transport: Arc<dyn EdgeTransport>) -> Self {
        Self { target, transport }
    }

    pub fn flush(&self) -> FlushOutcome {
        match EdgeRequest::flush(&self.target) {
            Ok(request) => {
                info!(url = %request.url(), "Dispatching edge flush");
                self.transport.dispatch(request);
            }
            Err(err) => warn!(
                site_uid = %self.target.site_uid,
                error = %err,
                "Edge flush skipped: cache host unavailable"
            ),
        }
        FlushOutcome::Flushed
    }

    /// Send one batched purge; returns whether a request went out.
    pub fn purge(&self, urls: &[String]) -> bool {
        match EdgeRequest::purge(&self.target, urls) {
            Ok(Some(request)) => {
                info!(url_count = urls.len(), "Dispatching edge purge");
                self.transport.dispatch(request);
                true
            }
            Ok(None) => false,
            Err(err) => {
                warn!(
                    site_uid = %self.target.site_uid,
                    error = %err,
                    "Edge purge skipped: cache host unavailable"
                );
                false
            }
        }
    }
}
