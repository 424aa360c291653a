//! Execution-scoped cache registry.
//!
//! A [`CacheControl`] lives for exactly one execution (one HTTP request or one
//! CLI invocation). It remembers which tiers and URLs it already handled so
//! repeated triggers within the execution are free, and it queues one repeat
//! flush per flushed tier to run when the execution ends.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use metrics::{counter, histogram};
use serde::ser::{Serialize, SerializeMap, Serializer};
use tracing::{debug, info, instrument, warn};

use crate::domain::cache_type::{CacheType, TypeSelection};

use super::drivers::{DriverError, DriverSet, FlushOutcome};
use super::events::{CacheEvent, CacheObserver, EventKind};
use super::ledger::{FlushLedger, PurgeLedger, normalize_urls};
use super::lock::mutex_lock;
use super::shutdown::DeferredQueue;

const SOURCE: &str = "cache::control";
const METRIC_FLUSH_TOTAL: &str = "cachectl_cache_flush_total";
const METRIC_FLUSH_ERROR_TOTAL: &str = "cachectl_cache_flush_error_total";
const METRIC_PURGE_URLS_TOTAL: &str = "cachectl_cache_purge_urls_total";
const METRIC_FLUSH_MS: &str = "cachectl_cache_flush_ms";

/// Outcome of one `flush` call.
///
/// Failed tiers are absent from `outcomes` and reported in `errors`.
#[derive(Debug, Default)]
pub struct FlushReport {
    pub outcomes: BTreeMap<CacheType, FlushOutcome>,
    pub errors: BTreeMap<CacheType, DriverError>,
}

impl FlushReport {
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

impl Serialize for FlushReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let extra = usize::from(self.has_errors());
        let mut map = serializer.serialize_map(Some(self.outcomes.len() + extra))?;
        for (kind, outcome) in &self.outcomes {
            map.serialize_entry(kind.as_str(), outcome)?;
        }
        if self.has_errors() {
            let errors: BTreeMap<&str, String> = self
                .errors
                .iter()
                .map(|(kind, err)| (kind.as_str(), err.to_string()))
                .collect();
            map.serialize_entry("errors", &errors)?;
        }
        map.end()
    }
}

#[derive(Default)]
struct ExecutionState {
    flushed: FlushLedger,
    purged: PurgeLedger,
    deferred: DeferredQueue,
}

pub struct CacheControl {
    drivers: Arc<DriverSet>,
    observers: Vec<Arc<dyn CacheObserver>>,
    state: Mutex<ExecutionState>,
    // Serializes flush/purge/shutdown within one execution; the ledger check
    // and the driver call must not interleave.
    gate: tokio::sync::Mutex<()>,
}

impl CacheControl {
    pub fn new(drivers: Arc<DriverSet>) -> Self {
        Self {
            drivers,
            observers: Vec::new(),
            state: Mutex::new(ExecutionState::default()),
            gate: tokio::sync::Mutex::new(()),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn CacheObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn drivers(&self) -> &DriverSet {
        &self.drivers
    }

    /// Flush the selected tiers that were not flushed yet in this execution.
    #[instrument(skip(self))]
    pub async fn flush(&self, selection: &TypeSelection) -> FlushReport {
        let _gate = self.gate.lock().await;
        let started_at = Instant::now();

        let requested = selection.resolve(self.drivers.kinds());
        let pending = mutex_lock(&self.state, SOURCE, "flush.pending")
            .flushed
            .pending(&requested);

        if pending.is_empty() {
            debug!(requested = requested.len(), "Flush skipped: nothing pending");
            return FlushReport::default();
        }

        let mut report = FlushReport::default();
        for kind in pending {
            let Some(driver) = self.drivers.get(kind) else {
                continue;
            };
            match driver.flush().await {
                Ok(outcome) => {
                    counter!(METRIC_FLUSH_TOTAL, "type" => kind.as_str(), "phase" => "immediate")
                        .increment(1);
                    report.outcomes.insert(kind, outcome);
                }
                Err(err) => {
                    counter!(METRIC_FLUSH_ERROR_TOTAL, "type" => kind.as_str()).increment(1);
                    warn!(cache_type = %kind, error = %err, "Cache flush failed");
                    report.errors.insert(kind, err);
                }
            }
        }

        {
            let mut state = mutex_lock(&self.state, SOURCE, "flush.record");
            state.flushed.record(report.outcomes.keys().copied());
            for kind in report.outcomes.keys() {
                state.deferred.push(*kind);
            }
        }

        histogram!(METRIC_FLUSH_MS).record(started_at.elapsed().as_secs_f64() * 1000.0);

        if !report.outcomes.is_empty() {
            info!(
                flushed = ?report.outcomes.keys().collect::<Vec<_>>(),
                failed = report.errors.len(),
                "Cache flushed"
            );
            self.notify(EventKind::Flushed(report.outcomes.clone()))
                .await;
        }

        report
    }

    pub async fn flush_all(&self) -> FlushReport {
        self.flush(&TypeSelection::All).await
    }

    /// Purge URLs from the edge, skipping any already purged in this execution.
    ///
    /// Returns the normalized URLs that were dispatched. URLs the edge driver
    /// could not send stay eligible for a later purge in this execution.
    #[instrument(skip_all)]
    pub async fn purge<I, S>(&self, urls: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let normalized = normalize_urls(urls);
        let _gate = self.gate.lock().await;

        let Some(http) = self.drivers.http() else {
            debug!("Purge skipped: no edge driver registered");
            return Vec::new();
        };

        let fresh = mutex_lock(&self.state, SOURCE, "purge.fresh")
            .purged
            .fresh(normalized);
        if fresh.is_empty() {
            return Vec::new();
        }

        if !http.purge(&fresh) {
            debug!(url_count = fresh.len(), "Purge skipped: no edge request was sent");
            return Vec::new();
        }
        mutex_lock(&self.state, SOURCE, "purge.record")
            .purged
            .record(&fresh);

        counter!(METRIC_PURGE_URLS_TOTAL).increment(fresh.len() as u64);
        info!(url_count = fresh.len(), "Cache purged");
        self.notify(EventKind::Purged(fresh.clone())).await;

        fresh
    }

    /// Run the deferred repeats once, in the order they were queued.
    #[instrument(skip(self))]
    pub async fn shutdown(&self) {
        let _gate = self.gate.lock().await;
        let repeats = mutex_lock(&self.state, SOURCE, "shutdown").deferred.drain();

        for kind in repeats {
            let Some(driver) = self.drivers.get(kind) else {
                continue;
            };
            match driver.flush().await {
                Ok(_) => {
                    counter!(METRIC_FLUSH_TOTAL, "type" => kind.as_str(), "phase" => "deferred")
                        .increment(1);
                }
                Err(err) => {
                    counter!(METRIC_FLUSH_ERROR_TOTAL, "type" => kind.as_str()).increment(1);
                    warn!(cache_type = %kind, error = %err, "Deferred cache flush failed");
                }
            }
        }
    }

    pub fn is_shut_down(&self) -> bool {
        mutex_lock(&self.state, SOURCE, "is_shut_down")
            .deferred
            .is_drained()
    }

    pub fn was_flushed(&self, kind: CacheType) -> bool {
        mutex_lock(&self.state, SOURCE, "was_flushed")
            .flushed
            .contains(kind)
    }

    async fn notify(&self, kind: EventKind) {
        if self.observers.is_empty() {
            return;
        }
        let event = CacheEvent::new(kind);
        for observer in &self.observers {
            observer.on_event(&event).await;
        }
    }
}
