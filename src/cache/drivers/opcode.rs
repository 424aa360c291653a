use std::sync::Arc;

use tracing::debug;

use crate::application::repos::LocalCache;

use super::FlushOutcome;

/// Compiled-code tier. A runtime without such a cache flushes as a no-op.
pub struct OpcodeDriver {
    compiled: Option<Arc<dyn LocalCache>>,
}

impl OpcodeDriver {
    pub fn new(compiled: Option<Arc<dyn LocalCache>>) -> Self {
        Self { compiled }
    }

    pub fn flush(&self) -> FlushOutcome {
        match self.compiled.as_ref() {
            Some(cache) => {
                let cleared = cache.clear();
                debug!(cache = cache.label(), cleared, "Compiled cache reset");
            }
            None => debug!("No compiled cache registered; opcode flush is a no-op"),
        }
        FlushOutcome::Flushed
    }
}
