use std::{io, sync::Once};

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install the global subscriber. Logs go to stderr so command output on
/// stdout stays machine-readable.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .with_writer(io::stderr)
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .with_writer(io::stderr)
            .compact()
            .with_target(true)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "cachectl_cache_flush_total",
            Unit::Count,
            "Cache tier flushes, labelled by tier and phase (immediate or deferred)."
        );
        describe_counter!(
            "cachectl_cache_flush_error_total",
            Unit::Count,
            "Cache tier flushes that failed."
        );
        describe_counter!(
            "cachectl_cache_purge_urls_total",
            Unit::Count,
            "URLs dispatched to the edge for purge."
        );
        describe_counter!(
            "cachectl_edge_dispatch_total",
            Unit::Count,
            "Requests handed to the edge transport."
        );
        describe_counter!(
            "cachectl_object_cache_hit_total",
            Unit::Count,
            "Object cache lookups answered from memory."
        );
        describe_counter!(
            "cachectl_object_cache_miss_total",
            Unit::Count,
            "Object cache lookups that fell through to the option store."
        );
        describe_histogram!(
            "cachectl_cache_flush_ms",
            Unit::Milliseconds,
            "Latency of one registry flush call in milliseconds."
        );
    });
}
