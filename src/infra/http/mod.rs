//! HTTP surface: preview routes, the query endpoint and health.

mod middleware;
mod preview;
mod query;
mod session;

use std::sync::Arc;

use axum::{
    Router,
    http::StatusCode,
    middleware as axum_middleware,
    response::IntoResponse,
    routing::{get, post},
};

use crate::{
    application::loader::RequestLoader,
    cache::{CacheConfig, QueryCache},
    content::ContentClient,
    preview::{PreviewContext, PreviewService, SessionCookie},
};

pub use middleware::RequestContext;
pub use query::QueryRequest;
pub use session::SessionHandle;

/// Preview service together with the cookie carrying its sessions.
#[derive(Clone)]
pub struct PreviewRuntime {
    pub service: PreviewService,
    pub cookie: SessionCookie,
}

#[derive(Clone)]
pub struct AppState {
    pub content: Arc<dyn ContentClient>,
    pub cache: QueryCache,
    pub cache_config: CacheConfig,
    /// `None` when no preview token is configured.
    pub preview: Option<PreviewRuntime>,
    pub preview_route: Arc<str>,
}

impl AppState {
    /// Loader for one request under `context`.
    pub fn loader(&self, context: PreviewContext) -> RequestLoader {
        let token = self
            .preview
            .as_ref()
            .map(|preview| preview.service.token());
        RequestLoader::new(
            &self.content,
            token,
            self.cache.clone(),
            self.cache_config.clone(),
            context,
        )
    }
}

pub fn build_router(state: AppState) -> Router {
    let preview_route = state.preview_route.to_string();

    Router::new()
        .route(
            &preview_route,
            get(preview::enter)
                .post(preview::exit)
                .delete(preview::exit)
                .put(preview::change_perspective)
                .fallback(preview::method_not_allowed),
        )
        .route("/api/query", post(query::run_query))
        .route("/_health", get(health))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            session::load_session,
        ))
        .with_state(state)
        .layer(axum_middleware::from_fn(middleware::log_responses))
        .layer(axum_middleware::from_fn(middleware::set_request_context))
}

async fn health() -> impl IntoResponse {
    StatusCode::NO_CONTENT
}
