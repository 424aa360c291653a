mod support;

use std::sync::Arc;

use cachectl::cache::{CacheControl, CacheHooks, EdgeRequest, TriggerMap, content_urls};
use cachectl::domain::cache_type::CacheType;
use serde_json::json;

use support::{Fixture, HOME, comment, news_post, news_post_urls};

fn hooks(fixture: &Fixture) -> (CacheHooks, Arc<CacheControl>) {
    let control = Arc::new(CacheControl::new(fixture.drivers.clone()));
    let hooks = CacheHooks::new(
        TriggerMap::standard(),
        control.clone(),
        fixture.content.clone(),
        fixture.links.clone(),
    );
    (hooks, control)
}

#[tokio::test]
async fn content_urls_cover_every_archive_once() {
    let fixture = Fixture::new();
    let urls = content_urls(&news_post(12, "hello"), fixture.links.as_ref()).await;
    assert_eq!(urls, news_post_urls("hello"));
}

#[tokio::test]
async fn post_cache_cleared_flushes_object_then_purges_once() {
    let fixture = Fixture::new();
    let (hooks, control) = hooks(&fixture);
    let post = news_post(12, "hello");

    let first = hooks.on_post_cache_cleared(&post).await;
    let second = hooks.on_post_cache_cleared(&post).await;

    // The bare home URL and `{home}/` collapse into one purge entry.
    assert_eq!(first.len(), news_post_urls("hello").len() - 1);
    assert!(second.is_empty());
    assert!(control.was_flushed(CacheType::Object));

    let purges: Vec<EdgeRequest> = fixture
        .transport
        .requests()
        .into_iter()
        .filter(|request| request.kind() == "purge")
        .collect();
    assert_eq!(purges.len(), 1);
    let pattern = purges[0].purge_pattern().expect("purge pattern");
    assert!(pattern.contains(r"(/2021/03/hello/)$"));
    assert!(pattern.contains(r"(/category/news/)$"));
}

#[tokio::test]
async fn comment_cache_cleared_purges_parent_post_without_flushing() {
    let fixture = Fixture::new();
    fixture.content.insert_post(news_post(12, "hello"));
    fixture.content.insert_comment(comment(40, 12));
    let (hooks, control) = hooks(&fixture);

    let purged = hooks.on_comment_cache_cleared(40).await.expect("purge");
    assert!(purged.contains(&format!("{HOME}/2021/03/hello/")));
    assert!(!control.was_flushed(CacheType::Object));

    assert!(hooks.on_comment_cache_cleared(41).await.expect("missing").is_empty());
}

#[tokio::test]
async fn revisions_have_nothing_to_purge() {
    let fixture = Fixture::new();
    let (hooks, control) = hooks(&fixture);
    let mut revision = news_post(13, "hello-revision-v1");
    revision.post_type = "revision".to_string();

    assert!(hooks.on_post_cache_cleared(&revision).await.is_empty());
    assert!(!control.was_flushed(CacheType::Object));
    assert!(fixture.transport.requests().is_empty());
}

#[tokio::test]
async fn option_updates_flush_mapped_tiers_unless_unchanged() {
    let fixture = Fixture::new();
    let (hooks, control) = hooks(&fixture);

    assert!(
        hooks
            .on_option_updated("blogname", &json!("Site"), &json!("Site"))
            .await
            .is_none()
    );
    assert!(fixture.transport.requests().is_empty());

    let report = hooks
        .on_option_updated("widget_text", &json!({"a": 1}), &json!({"a": 2}))
        .await
        .expect("prefix rule");
    assert_eq!(
        report.outcomes.keys().copied().collect::<Vec<_>>(),
        vec![CacheType::Http, CacheType::Object]
    );

    let report = hooks
        .on_option_updated("blogname", &json!("Old"), &json!("New"))
        .await
        .expect("mapped option");
    assert_eq!(
        report.outcomes.keys().copied().collect::<Vec<_>>(),
        vec![CacheType::Transient]
    );
    assert!(
        hooks
            .on_option_updated("unrelated_option", &json!(1), &json!(2))
            .await
            .is_none()
    );

    control.shutdown().await;
    assert_eq!(fixture.transport.count("flush"), 2);
}

#[tokio::test]
async fn lifecycle_actions_flush_each_tier_once_per_execution() {
    let fixture = Fixture::new();
    fixture.options.insert("_transient_timeout_x", "1");
    let (hooks, control) = hooks(&fixture);

    let report = hooks.on_action("activated_plugin").await.expect("mapped action");
    assert_eq!(report.outcomes.len(), 4);
    let again = hooks.on_action("switch_theme").await.expect("mapped action");
    assert!(again.is_empty());
    assert!(hooks.on_action("init").await.is_none());

    control.shutdown().await;
    assert!(control.is_shut_down());
    assert_eq!(fixture.transport.count("flush"), 2);
}
