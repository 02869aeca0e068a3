//! Loads the preview session before handlers run and commits it once after.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{
        HeaderValue, Request, StatusCode,
        header::{CACHE_CONTROL, SET_COOKIE},
    },
    middleware::Next,
    response::{IntoResponse, Response},
};
use tokio::sync::{Mutex, MutexGuard};
use tracing::debug;

use crate::{
    application::error::HttpError,
    preview::{PreviewContext, PreviewSession},
};

use super::AppState;

const SOURCE: &str = "infra::http::session";

/// Request-scoped preview session shared with handlers.
#[derive(Clone, Default)]
pub struct SessionHandle(Arc<Mutex<PreviewSession>>);

impl SessionHandle {
    pub fn new(session: PreviewSession) -> Self {
        Self(Arc::new(Mutex::new(session)))
    }

    pub async fn lock(&self) -> MutexGuard<'_, PreviewSession> {
        self.0.lock().await
    }
}

pub async fn load_session(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let Some(preview) = state.preview.clone() else {
        request.extensions_mut().insert(PreviewContext::disabled());
        request.extensions_mut().insert(SessionHandle::default());
        let mut response = next.run(request).await;
        response.extensions_mut().insert(PreviewContext::disabled());
        return response;
    };

    let session = PreviewSession::from_snapshot(preview.cookie.read(request.headers()));
    let context = preview.service.context(&session);
    let handle = SessionHandle::new(session);
    request.extensions_mut().insert(handle.clone());
    request.extensions_mut().insert(context.clone());

    let mut response = next.run(request).await;

    let commit = handle.lock().await.commit(&preview.cookie);
    match commit {
        Ok(Some(commit)) => match HeaderValue::from_str(commit.set_cookie()) {
            Ok(value) => {
                debug!(target = SOURCE, "preview session committed");
                let headers = response.headers_mut();
                headers.append(SET_COOKIE, value);
                headers.insert(CACHE_CONTROL, HeaderValue::from_static("private, no-store"));
            }
            Err(err) => {
                return HttpError::from_error(
                    SOURCE,
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error",
                    &err,
                )
                .into_response();
            }
        },
        Ok(None) => {}
        Err(err) => {
            return HttpError::from_error(
                SOURCE,
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error",
                &err,
            )
            .into_response();
        }
    }

    response.extensions_mut().insert(context);
    response
}
