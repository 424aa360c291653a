mod support;

use axum::{
    body::{Body, to_bytes},
    http::{Request, Response, StatusCode, header},
};
use cachectl::application::nonce::FLUSH_ACTION;
use cachectl::application::notices::{NOTICE_COOKIE, Notices};
use cachectl::infra::http::build_router;
use serde_json::Value;
use tower::ServiceExt;

use support::{Fixture, OPERATOR_ID, OPERATOR_SESSION, nonces};

fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).expect("request")
}

async fn json_body(response: Response<Body>) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json body")
}

fn set_cookies(response: &Response<Body>) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .map(str::to_string)
        .collect()
}

fn session() -> String {
    format!("mwp_session={OPERATOR_SESSION}")
}

#[tokio::test]
async fn operator_flush_redirects_and_queues_notice() {
    let fixture = Fixture::new();
    let app = build_router(fixture.http_state(false));
    let nonce = nonces().create(FLUSH_ACTION, OPERATOR_ID);

    let response = app
        .oneshot(get(
            &format!("/wp-admin/edit.php?post_type=page&mwp-action=cache_flush&_wpnonce={nonce}"),
            Some(&session()),
        ))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(
        response.headers()[header::LOCATION],
        "/wp-admin/edit.php?post_type=page"
    );

    let cookies = set_cookies(&response);
    let queued = cookies
        .iter()
        .find_map(|cookie| cookie.strip_prefix(&format!("{NOTICE_COOKIE}=")))
        .and_then(|rest| rest.split(';').next())
        .expect("notice cookie");
    assert_eq!(Notices::decode(queued).messages(), ["Cache flushed"]);

    // Immediate flush plus the repeat when the request ended.
    assert_eq!(fixture.transport.count("flush"), 2);
}

#[tokio::test]
async fn used_nonce_falls_through_to_the_page() {
    let fixture = Fixture::new();
    let app = build_router(fixture.http_state(false));
    let nonce = nonces().create(FLUSH_ACTION, OPERATOR_ID);
    let uri = format!("/wp-admin/?mwp-action=cache_flush&_wpnonce={nonce}");

    let first = app
        .clone()
        .oneshot(get(&uri, Some(&session())))
        .await
        .expect("response");
    assert_eq!(first.status(), StatusCode::FOUND);

    let second = app
        .oneshot(get(&uri, Some(&session())))
        .await
        .expect("response");
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(fixture.transport.count("flush"), 2);
}

#[tokio::test]
async fn unauthorized_sessions_are_ignored() {
    let fixture = Fixture::new();
    let app = build_router(fixture.http_state(false));
    let editor_nonce = nonces().create(FLUSH_ACTION, 2);

    for cookie in [None, Some("mwp_session=editor-session")] {
        let response = app
            .clone()
            .oneshot(get(
                &format!("/wp-admin/?mwp-action=cache_flush&_wpnonce={editor_nonce}"),
                cookie,
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert!(body["flush_url"].is_null());
    }
    assert!(fixture.transport.requests().is_empty());
}

#[tokio::test]
async fn notices_are_shown_once_and_cleared() {
    let fixture = Fixture::new();
    let app = build_router(fixture.http_state(false));
    let mut notices = Notices::default();
    notices.push("Cache flushed");

    let response = app
        .oneshot(get(
            "/wp-admin/",
            Some(&format!("{NOTICE_COOKIE}={}; {}", notices.encode(), session())),
        ))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let cleared = set_cookies(&response)
        .into_iter()
        .find(|cookie| cookie.starts_with(&format!("{NOTICE_COOKIE}=")))
        .expect("clearing cookie");
    assert!(cleared.contains("Max-Age=0"));

    let body = json_body(response).await;
    assert_eq!(body["notices"], serde_json::json!(["Cache flushed"]));
    let flush_url = body["flush_url"].as_str().expect("flush url for operator");
    assert!(flush_url.starts_with("https://example.com/wp-admin/?mwp-action=cache_flush&_wpnonce="));
}
