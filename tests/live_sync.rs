mod support;

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serial_test::serial;
use tokio::net::TcpListener;
use url::Url;
use vitrine::{
    domain::perspective::ClientPerspective,
    live::{
        ActiveQueryRegistry, HttpPerspectiveSubmitter, LocalChannel, MessageChannel, Navigator,
        Revalidator, SessionCookies, SubmitError, SyncError, VisualEditingSync,
    },
    preview::SessionSnapshot,
};
use vitrine_protocol::{Envelope, Message, NavigationIntent, PerspectiveValue, RefreshPayload};

use support::{PREVIEW_ROUTE, PROJECT, app, cookie_header};

const CONNECTION: &str = "presentation";

#[derive(Clone, Default)]
struct Log(Arc<Mutex<Vec<String>>>);

impl Log {
    fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

struct RecordingRevalidator(Log);

#[async_trait]
impl Revalidator for RecordingRevalidator {
    async fn revalidate(&self) {
        self.0.push("revalidate");
    }
}

struct RecordingNavigator(Log);

impl Navigator for RecordingNavigator {
    fn push(&self, url: &str) {
        self.0.push(format!("push {url}"));
    }

    fn replace(&self, url: &str) {
        self.0.push(format!("replace {url}"));
    }

    fn back(&self) {
        self.0.push("back");
    }
}

/// Serves the storefront router on an ephemeral port.
async fn serve_storefront() -> (Url, support::TestApp) {
    let app = app(true);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = app.router.clone();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    let endpoint = Url::parse(&format!("http://{addr}{PREVIEW_ROUTE}")).unwrap();
    (endpoint, app)
}

fn drain(editor: &LocalChannel) -> Vec<Message> {
    let mut messages = Vec::new();
    while let Some(frame) = editor.try_recv() {
        messages.push(frame.unwrap().message);
    }
    messages
}

/// Reloads page data the way a storefront page would: a query request
/// carrying the page's session cookies. Records the perspective it read.
struct QueryingRevalidator {
    http: reqwest::Client,
    endpoint: Url,
    cookies: SessionCookies,
    seen: Log,
}

#[async_trait]
impl Revalidator for QueryingRevalidator {
    async fn revalidate(&self) {
        let mut request = self
            .http
            .post(self.endpoint.clone())
            .json(&serde_json::json!({ "query": "*[_type == 'product']" }));
        if let Some(cookie) = self.cookies.header() {
            request = request.header(reqwest::header::COOKIE, cookie);
        }
        let body: serde_json::Value = request.send().await.unwrap().json().await.unwrap();
        let perspective = body["result"]["perspective"].as_str().unwrap_or_default();
        self.seen.push(perspective);
    }
}

#[tokio::test]
async fn revalidation_reads_the_submitted_perspective() {
    let (endpoint, app) = serve_storefront().await;
    let cookie = cookie_header(
        &app.cookie,
        &SessionSnapshot {
            project_id: Some(PROJECT.to_string()),
            perspective: Some(ClientPerspective::Drafts),
        },
    );
    let http = reqwest::Client::new();
    let submitter =
        HttpPerspectiveSubmitter::new(http.clone(), endpoint.clone()).with_cookie(cookie);
    let seen = Log::default();
    let revalidator = QueryingRevalidator {
        http,
        endpoint: endpoint.join("/api/query").unwrap(),
        cookies: submitter.cookies().clone(),
        seen: seen.clone(),
    };

    let (page, editor) = LocalChannel::pair(CONNECTION);
    let log = Log::default();
    let sync = VisualEditingSync::new(
        Arc::new(page),
        revalidator,
        RecordingNavigator(log.clone()),
        Arc::new(submitter),
        ActiveQueryRegistry::new(),
    );
    assert_eq!(drain(&editor), vec![Message::LiveQueries { active: false }]);

    sync.dispatch(Envelope::new(
        CONNECTION,
        Message::Perspective {
            perspective: PerspectiveValue::Stack(vec!["rSpring".into(), "drafts".into()]),
        },
    ))
    .await
    .unwrap();

    assert_eq!(seen.entries(), vec!["rSpring,drafts"]);
    let fetches = app.content.fetches();
    let last = fetches.last().expect("revalidation should read content");
    assert_eq!(
        last.config.perspective,
        ClientPerspective::Stack(vec!["rSpring".into(), "drafts".into()])
    );
    assert!(log.entries().is_empty());
}

#[tokio::test]
async fn rejected_perspective_skips_the_refresh() {
    let (endpoint, _app) = serve_storefront().await;
    let submitter = HttpPerspectiveSubmitter::new(reqwest::Client::new(), endpoint);

    let (page, _editor) = LocalChannel::pair(CONNECTION);
    let log = Log::default();
    let sync = VisualEditingSync::new(
        Arc::new(page),
        RecordingRevalidator(log.clone()),
        RecordingNavigator(log.clone()),
        Arc::new(submitter),
        ActiveQueryRegistry::new(),
    );

    let err = sync
        .dispatch(Envelope::new(
            CONNECTION,
            Message::Perspective {
                perspective: PerspectiveValue::Single("published".into()),
            },
        ))
        .await
        .expect_err("no session means no perspective change");

    assert!(matches!(err, SyncError::Submit(SubmitError::Rejected(403))));
    assert!(log.entries().is_empty());
}

#[tokio::test]
#[serial]
async fn global_registry_drives_live_query_announcements() {
    let registry = ActiveQueryRegistry::global();
    let (page, editor) = LocalChannel::pair(CONNECTION);
    let log = Log::default();
    let (endpoint, _app) = serve_storefront().await;
    let sync = VisualEditingSync::new(
        Arc::new(page),
        RecordingRevalidator(log.clone()),
        RecordingNavigator(log.clone()),
        Arc::new(HttpPerspectiveSubmitter::new(reqwest::Client::new(), endpoint)),
        registry.clone(),
    );
    assert_eq!(drain(&editor), vec![Message::LiveQueries { active: false }]);

    let mut first = registry.register("product-list");
    let second = registry.register("product-detail");
    first.unregister();
    assert_eq!(drain(&editor), vec![Message::LiveQueries { active: true }]);

    drop(second);
    assert_eq!(drain(&editor), vec![Message::LiveQueries { active: false }]);
    assert!(!registry.snapshot());
    drop(sync);
}

#[tokio::test]
#[serial]
async fn live_mutations_are_acknowledged_without_reloading() {
    let registry = ActiveQueryRegistry::global();
    let _live = registry.register("product-detail");
    let (page, editor) = LocalChannel::pair(CONNECTION);
    let log = Log::default();
    let (endpoint, _app) = serve_storefront().await;
    let sync = VisualEditingSync::new(
        Arc::new(page),
        RecordingRevalidator(log.clone()),
        RecordingNavigator(log.clone()),
        Arc::new(HttpPerspectiveSubmitter::new(reqwest::Client::new(), endpoint)),
        registry.clone(),
    );
    assert_eq!(drain(&editor), vec![Message::LiveQueries { active: true }]);

    let payload: RefreshPayload = serde_json::from_value(serde_json::json!({
        "source": "mutation",
        "livePreviewEnabled": true,
        "document": { "id": "doc-1", "type": "product", "revision": "r2" },
    }))
    .unwrap();
    sync.dispatch(Envelope::new(
        CONNECTION,
        Message::Refresh { id: 11, payload },
    ))
    .await
    .unwrap();
    sync.dispatch(Envelope::new(
        CONNECTION,
        Message::Refresh {
            id: 12,
            payload: RefreshPayload::Manual {
                live_preview_enabled: true,
            },
        },
    ))
    .await
    .unwrap();

    assert_eq!(log.entries(), vec!["revalidate"]);
    assert_eq!(
        drain(&editor),
        vec![
            Message::RefreshComplete { id: 11 },
            Message::RefreshComplete { id: 12 },
        ]
    );
}

#[tokio::test]
async fn remote_navigation_is_not_echoed() {
    let (endpoint, _app) = serve_storefront().await;
    let (page, editor) = LocalChannel::pair(CONNECTION);
    let log = Log::default();
    let sync = VisualEditingSync::new(
        Arc::new(page),
        RecordingRevalidator(log.clone()),
        RecordingNavigator(log.clone()),
        Arc::new(HttpPerspectiveSubmitter::new(reqwest::Client::new(), endpoint)),
        ActiveQueryRegistry::new(),
    );
    drain(&editor);

    sync.dispatch(Envelope::new(
        CONNECTION,
        Message::Navigate {
            intent: NavigationIntent::Push {
                url: "/products/shoe".into(),
            },
        },
    ))
    .await
    .unwrap();
    sync.location_changed("/products/shoe", None).unwrap();
    sync.location_changed("/cart", Some("Cart")).unwrap();

    assert_eq!(log.entries(), vec!["push /products/shoe"]);
    assert_eq!(
        drain(&editor),
        vec![Message::Location {
            url: "/cart".into(),
            title: Some("Cart".into()),
        }]
    );
    assert_eq!(editor.connection(), CONNECTION);
}
