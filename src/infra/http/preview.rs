//! Preview enter, exit and perspective routes.

use axum::{
    Extension, Form,
    extract::{Query, State},
    http::{
        HeaderValue, StatusCode, Uri,
        header::{ALLOW, LOCATION},
    },
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use url::Url;

use crate::{
    application::error::HttpError,
    preview::{EnterOutcome, sanitize_redirect},
};

use super::{AppState, PreviewRuntime, session::SessionHandle};

const SOURCE: &str = "infra::http::preview";
const ALLOWED_METHODS: &str = "GET, POST, DELETE, PUT";
const URL_BASE: &str = "http://vitrine.invalid";

#[derive(Debug, Default, Deserialize)]
pub struct ExitParams {
    #[serde(default)]
    redirect: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PerspectiveForm {
    #[serde(default)]
    perspective: String,
}

fn runtime(state: &AppState) -> Result<&PreviewRuntime, HttpError> {
    state.preview.as_ref().ok_or_else(|| {
        HttpError::new(
            SOURCE,
            StatusCode::FORBIDDEN,
            "Preview mode is not configured",
            "no preview token configured",
        )
    })
}

fn request_url(uri: &Uri) -> Result<Url, HttpError> {
    let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    Url::parse(URL_BASE)
        .and_then(|base| base.join(path_and_query))
        .map_err(|err| {
            HttpError::from_error(
                SOURCE,
                StatusCode::BAD_REQUEST,
                "Invalid preview URL",
                &err,
            )
        })
}

pub(super) async fn enter(
    State(state): State<AppState>,
    Extension(session): Extension<SessionHandle>,
    uri: Uri,
) -> Result<Response, HttpError> {
    let preview = runtime(&state)?;
    let url = request_url(&uri)?;

    let mut session = session.lock().await;
    match preview.service.enter(&mut session, &url).await? {
        EnterOutcome::Rejected => Err(HttpError::new(
            SOURCE,
            StatusCode::UNAUTHORIZED,
            "Invalid secret",
            "preview secret did not validate",
        )),
        EnterOutcome::Entered { redirect_to, .. } => {
            Ok(Redirect::temporary(&redirect_to).into_response())
        }
    }
}

pub(super) async fn exit(
    State(state): State<AppState>,
    Extension(session): Extension<SessionHandle>,
    Query(params): Query<ExitParams>,
) -> Result<Response, HttpError> {
    let preview = runtime(&state)?;
    preview.service.exit(&mut *session.lock().await);

    let target = sanitize_redirect(params.redirect.as_deref());
    Ok((StatusCode::FOUND, [(LOCATION, target)]).into_response())
}

pub(super) async fn change_perspective(
    State(state): State<AppState>,
    Extension(session): Extension<SessionHandle>,
    Form(form): Form<PerspectiveForm>,
) -> Result<Response, HttpError> {
    let preview = runtime(&state)?;
    let mut session = session.lock().await;
    preview
        .service
        .change_perspective(&mut session, &form.perspective)?;
    Ok((StatusCode::OK, "OK").into_response())
}

pub(super) async fn method_not_allowed() -> Response {
    let mut response = HttpError::new(
        SOURCE,
        StatusCode::METHOD_NOT_ALLOWED,
        "Method not allowed",
        "preview route accepts GET, POST, DELETE and PUT",
    )
    .into_response();
    response
        .headers_mut()
        .insert(ALLOW, HeaderValue::from_static(ALLOWED_METHODS));
    response
}
