use std::sync::Arc;

use tracing::{info, warn};

use crate::application::repos::TransientStore;

use super::{DriverError, FlushOutcome};

/// Persisted transient tier.
pub struct TransientDriver {
    store: Arc<dyn TransientStore>,
}

impl TransientDriver {
    pub fn new(store: Arc<dyn TransientStore>) -> Self {
        Self { store }
    }

    pub async fn flush(&self) -> Result<FlushOutcome, DriverError> {
        match self.store.delete_transients().await {
            Ok(removed) => {
                info!(removed, "Transients deleted");
                Ok(FlushOutcome::Removed(removed))
            }
            Err(err) => {
                warn!(error = %err, "Transient delete failed");
                Err(DriverError::Transient(err))
            }
        }
    }
}
