mod support;

use std::collections::HashSet;
use std::sync::Arc;

use cachectl::application::repos::OptionStore;
use cachectl::cache::drivers::{CachedOptionStore, HttpDriver};
use cachectl::cache::{CacheControl, DriverSet, ReqwestTransport};
use cachectl::domain::cache_type::{CacheType, TypeSelection};
use cachectl::infra::telemetry;
use metrics_util::debugging::DebuggingRecorder;

use support::{Fixture, edge_target};

#[tokio::test]
async fn cache_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");
    telemetry::describe_metrics();

    let fixture = Fixture::new();
    fixture.options.fail_transient_deletes(true);

    // Registry flush, failure, purge and deferred repeat.
    let control = CacheControl::new(fixture.drivers.clone());
    control
        .flush(&TypeSelection::only([CacheType::Object, CacheType::Transient]))
        .await;
    control.purge(["https://example.com/news/"]).await;
    control.shutdown().await;

    // Object cache hit and miss through the option read-through.
    let options = CachedOptionStore::new(fixture.options.clone(), fixture.object_store.clone());
    options.get_option("blogname").await.expect("miss");
    fixture.options.insert("blogname", "Example");
    options.get_option("blogname").await.expect("miss then fill");
    options.get_option("blogname").await.expect("hit");

    // The real transport counts dispatches even when the edge is unreachable.
    let transport = Arc::new(
        ReqwestTransport::new(std::time::Duration::from_millis(50)).expect("transport"),
    );
    let edge_only = CacheControl::new(Arc::new(
        DriverSet::new().with(HttpDriver::new(edge_target(), transport.clone())),
    ));
    edge_only.flush_all().await;
    transport.settle().await;

    let names: HashSet<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(key, _, _, _)| key.key().name().to_string())
        .collect();

    for expected in [
        "cachectl_cache_flush_total",
        "cachectl_cache_flush_error_total",
        "cachectl_cache_purge_urls_total",
        "cachectl_cache_flush_ms",
        "cachectl_object_cache_hit_total",
        "cachectl_object_cache_miss_total",
        "cachectl_edge_dispatch_total",
    ] {
        assert!(names.contains(expected), "missing metric {expected}");
    }
}
