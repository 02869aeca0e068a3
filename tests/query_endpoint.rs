mod support;

use axum::{
    body::Body,
    http::{
        Method, Request, StatusCode,
        header::{CACHE_CONTROL, CONTENT_TYPE, COOKIE},
    },
};
use serde_json::{Value, json};
use tower::ServiceExt;
use vitrine::{
    cache::{CacheConfig, CacheStrategy},
    domain::{api_version::ApiVersion, perspective::ClientPerspective},
    preview::SessionSnapshot,
};

use support::{PROJECT, app, app_with, body_json, body_text, cookie_header};

fn query_request(body: Value, cookie: Option<String>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri("/api/query")
        .header(CONTENT_TYPE, "application/json");
    if let Some(cookie) = cookie {
        builder = builder.header(COOKIE, cookie);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

#[tokio::test]
async fn long_strategy_is_cached_and_advertised() {
    let app = app(true);
    let body = json!({
        "query": "*[_type == $type]",
        "params": { "type": "product" },
        "strategy": "long",
        "label": "products",
    });

    let first = app
        .router
        .clone()
        .oneshot(query_request(body.clone(), None))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(
        first.headers()[CACHE_CONTROL],
        "public, max-age=3600, stale-while-revalidate=82800"
    );
    let payload = body_json(first).await;
    assert_eq!(payload["result"]["perspective"], "published");

    app.tasks.drain().await;

    let second = app
        .router
        .clone()
        .oneshot(query_request(body, None))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(body_json(second).await, payload);
    assert_eq!(app.content.fetches().len(), 1);
}

#[tokio::test]
async fn default_strategy_applies_when_none_is_named() {
    let app = app(false);

    let response = app
        .router
        .oneshot(query_request(json!({ "query": "*[0]" }), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[CACHE_CONTROL],
        "public, max-age=1, stale-while-revalidate=9"
    );
}

#[tokio::test]
async fn disabled_cache_fetches_every_time() {
    let app = app_with(
        false,
        ApiVersion::Experimental,
        CacheConfig {
            enabled: false,
            ..Default::default()
        },
    );
    let body = json!({ "query": "*[0]", "strategy": "long" });

    for _ in 0..2 {
        let response = app
            .router
            .clone()
            .oneshot(query_request(body.clone(), None))
            .await
            .unwrap();
        assert_eq!(response.headers()[CACHE_CONTROL], "no-store");
    }
    app.tasks.drain().await;
    assert_eq!(app.content.fetches().len(), 2);
}

#[tokio::test]
async fn preview_reads_bypass_cache_and_use_session_perspective() {
    let app = app(true);
    let cookie = cookie_header(
        &app.cookie,
        &SessionSnapshot {
            project_id: Some(PROJECT.to_string()),
            perspective: Some(ClientPerspective::Drafts),
        },
    );
    let body = json!({ "query": "*[0]", "strategy": "long" });

    for _ in 0..2 {
        let response = app
            .router
            .clone()
            .oneshot(query_request(body.clone(), Some(cookie.clone())))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CACHE_CONTROL], "no-store");
        assert!(support::set_cookie(&response).is_none());
        assert_eq!(body_json(response).await["result"]["perspective"], "drafts");
    }
    app.tasks.drain().await;

    let fetches = app.content.fetches();
    assert_eq!(fetches.len(), 2);
    for fetch in fetches {
        assert!(!fetch.config.use_cdn);
        assert_eq!(fetch.config.perspective, ClientPerspective::Drafts);
        assert!(fetch.config.token.is_some());
    }
}

#[tokio::test]
async fn session_for_another_project_reads_published() {
    let app = app(true);
    let cookie = cookie_header(
        &app.cookie,
        &SessionSnapshot {
            project_id: Some("other".to_string()),
            perspective: Some(ClientPerspective::Drafts),
        },
    );

    let response = app
        .router
        .oneshot(query_request(json!({ "query": "*[0]" }), Some(cookie)))
        .await
        .unwrap();

    assert_ne!(response.headers()[CACHE_CONTROL], "no-store");
    assert_eq!(body_json(response).await["result"]["perspective"], "published");
}

#[tokio::test]
async fn content_failures_are_bad_gateway() {
    let app = app(false);
    app.content.fail();

    let response = app
        .router
        .oneshot(query_request(json!({ "query": "*[0]" }), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(body_text(response).await, "Content source unavailable");
}

#[tokio::test]
async fn unknown_strategy_is_rejected() {
    let app = app(false);

    let response = app
        .router
        .oneshot(query_request(
            json!({ "query": "*[0]", "strategy": "forever" }),
            None,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(app.content.fetches().is_empty());
}

#[tokio::test]
async fn empty_query_is_rejected() {
    let app = app(false);

    let response = app
        .router
        .oneshot(query_request(json!({ "query": "  " }), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn health_reports_no_content() {
    let app = app(false);

    let response = app
        .router
        .oneshot(
            Request::builder()
                .uri("/_health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[test]
fn named_strategies_render_expected_directives() {
    let rendered: Vec<String> = [CacheStrategy::Long, CacheStrategy::Short, CacheStrategy::None]
        .iter()
        .map(CacheStrategy::directive)
        .collect();
    insta::assert_debug_snapshot!(rendered, @r#"
    [
        "public, max-age=3600, stale-while-revalidate=82800",
        "public, max-age=1, stale-while-revalidate=9",
        "no-store",
    ]
    "#);
}
