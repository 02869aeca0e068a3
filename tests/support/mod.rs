#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Response, header::SET_COOKIE},
};
use serde_json::{Value, json};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

use vitrine::{
    cache::{BackgroundTasks, CacheConfig, InMemoryCacheStore, QueryCache},
    content::{ClientConfig, ClientOverrides, ContentClient, ContentError, SecretToken},
    domain::{api_version::ApiVersion, perspective::ClientPerspective},
    infra::http::{AppState, PreviewRuntime, build_router},
    preview::{
        CookieSettings, PreviewMachine, PreviewService, SameSite, SecretDocumentValidator,
        SessionCookie, SessionSnapshot,
    },
};

pub const PROJECT: &str = "p1";
pub const SECRET: &str = "s3cret";
pub const PREVIEW_ROUTE: &str = "/api/preview";

/// One recorded fetch: the query and the client config it ran under.
#[derive(Debug, Clone)]
pub struct Fetch {
    pub query: String,
    pub config: ClientConfig,
}

#[derive(Default)]
struct Shared {
    fetches: Mutex<Vec<Fetch>>,
    failing: Mutex<bool>,
}

/// In-memory content source. Answers the preview secret lookup and echoes
/// every other query back with the perspective it was read under.
#[derive(Clone)]
pub struct FakeContent {
    config: ClientConfig,
    shared: Arc<Shared>,
}

impl FakeContent {
    pub fn new() -> Self {
        Self {
            config: ClientConfig {
                project_id: PROJECT.into(),
                dataset: "production".into(),
                api_version: ApiVersion::Experimental,
                api_host: "api.content.test".into(),
                cdn_host: "cdn.content.test".into(),
                use_cdn: true,
                perspective: ClientPerspective::Published,
                token: None,
            },
            shared: Arc::new(Shared::default()),
        }
    }

    pub fn fail(&self) {
        *self.shared.failing.lock().unwrap() = true;
    }

    pub fn fetches(&self) -> Vec<Fetch> {
        self.shared.fetches.lock().unwrap().clone()
    }
}

#[async_trait]
impl ContentClient for FakeContent {
    fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn with_config(&self, overrides: ClientOverrides) -> Arc<dyn ContentClient> {
        Arc::new(Self {
            config: self.config.apply(overrides),
            shared: Arc::clone(&self.shared),
        })
    }

    async fn fetch(&self, query: &str, params: Option<&Value>) -> Result<Value, ContentError> {
        self.shared.fetches.lock().unwrap().push(Fetch {
            query: query.to_string(),
            config: self.config.clone(),
        });
        if *self.shared.failing.lock().unwrap() {
            return Err(ContentError::transport("connection refused"));
        }

        if query.contains("vitrine.previewSecret") {
            let requested = params
                .and_then(|params| params.get("secret"))
                .and_then(Value::as_str);
            if requested != Some(SECRET) {
                return Ok(Value::Null);
            }
            let updated_at = OffsetDateTime::now_utc().format(&Rfc3339).unwrap();
            return Ok(json!({ "secret": SECRET, "_updatedAt": updated_at }));
        }

        Ok(json!({
            "query": query,
            "perspective": self.config.perspective.to_string(),
        }))
    }
}

pub fn cookie() -> SessionCookie {
    SessionCookie::new(CookieSettings {
        name: "__vitrine_preview".into(),
        secrets: vec!["cookie-secret".into()],
        path: "/".into(),
        http_only: true,
        secure: false,
        same_site: SameSite::Lax,
        max_age: None,
    })
    .unwrap()
}

pub struct TestApp {
    pub router: Router,
    pub content: FakeContent,
    pub cookie: SessionCookie,
    pub tasks: BackgroundTasks,
}

/// Router over a fake content source. `preview` toggles whether a preview
/// token is configured.
pub fn app(preview: bool) -> TestApp {
    app_with(preview, ApiVersion::Experimental, CacheConfig::default())
}

pub fn app_with(preview: bool, api_version: ApiVersion, cache_config: CacheConfig) -> TestApp {
    let content = FakeContent::new();
    let base: Arc<dyn ContentClient> = Arc::new(content.clone());
    let cookie = cookie();
    let tasks = BackgroundTasks::new();
    let cache = QueryCache::new(
        Arc::new(InMemoryCacheStore::new(&cache_config)),
        Arc::new(tasks.clone()),
    );

    let preview = preview.then(|| PreviewRuntime {
        service: PreviewService::new(
            PreviewMachine::new(PROJECT, api_version),
            Arc::clone(&base),
            SecretToken::new("viewer-token"),
            Arc::new(SecretDocumentValidator::default()),
        ),
        cookie: cookie.clone(),
    });

    let router = build_router(AppState {
        content: base,
        cache,
        cache_config,
        preview,
        preview_route: Arc::from(PREVIEW_ROUTE),
    });

    TestApp {
        router,
        content,
        cookie,
        tasks,
    }
}

/// `Cookie` request header carrying `snapshot`.
pub fn cookie_header(cookie: &SessionCookie, snapshot: &SessionSnapshot) -> String {
    let set_cookie = cookie.encode(snapshot).unwrap();
    set_cookie.split(';').next().unwrap().to_string()
}

pub fn set_cookie(response: &Response<Body>) -> Option<String> {
    response
        .headers()
        .get(SET_COOKIE)
        .map(|value| value.to_str().unwrap().to_string())
}

/// Decode the session written by a `Set-Cookie` header.
pub fn written_session(cookie: &SessionCookie, set_cookie: &str) -> Option<SessionSnapshot> {
    let pair = set_cookie.split(';').next()?;
    let (_, value) = pair.split_once('=')?;
    cookie.decode(value)
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
