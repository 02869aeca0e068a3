mod support;

use std::collections::HashSet;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode, header::CONTENT_TYPE},
};
use metrics_util::debugging::DebuggingRecorder;
use serde_json::json;
use tower::ServiceExt;

use support::{PREVIEW_ROUTE, SECRET, app};

#[tokio::test]
async fn query_and_preview_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    let app = app(true);

    // miss, then hit once the deferred write lands, then a bypass
    for (strategy, drain) in [("long", true), ("long", false), ("none", false)] {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/query")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(
                json!({ "query": "*[_type == 'product']", "strategy": strategy }).to_string(),
            ))
            .expect("request should build");
        let response = app
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router should respond");
        assert_eq!(response.status(), StatusCode::OK);
        if drain {
            app.tasks.drain().await;
        }
    }

    let enter = Request::builder()
        .uri(format!("{PREVIEW_ROUTE}?preview-secret={SECRET}"))
        .body(Body::empty())
        .expect("request should build");
    let response = app
        .router
        .clone()
        .oneshot(enter)
        .await
        .expect("router should respond");
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);

    let names: HashSet<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    let expected = [
        "vitrine_query_cache_hit_total",
        "vitrine_query_cache_miss_total",
        "vitrine_query_cache_bypass_total",
        "vitrine_query_fetch_ms",
        "vitrine_background_tasks",
        "vitrine_preview_transition_total",
    ];

    for metric in expected {
        assert!(names.contains(metric), "missing metric: {metric}");
    }
}
