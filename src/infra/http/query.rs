//! Query endpoint: runs a content query through the request loader.

use std::str::FromStr;

use axum::{
    Extension, Json,
    extract::State,
    http::{HeaderValue, header::CACHE_CONTROL},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::{
    application::{error::AppError, loader::LoadOptions},
    cache::CacheStrategy,
    preview::PreviewContext,
};

use super::AppState;

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default)]
    pub params: Option<Value>,
    /// Named strategy: `long`, `short` or `none`.
    #[serde(default)]
    pub strategy: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
}

pub(super) async fn run_query(
    State(state): State<AppState>,
    Extension(context): Extension<PreviewContext>,
    Json(body): Json<QueryRequest>,
) -> Result<Response, AppError> {
    if body.query.trim().is_empty() {
        return Err(AppError::validation("query must not be empty"));
    }
    let strategy = body
        .strategy
        .as_deref()
        .map(CacheStrategy::from_str)
        .transpose()
        .map_err(|err| AppError::validation(err.to_string()))?;

    let mut options = LoadOptions::default();
    if let Some(strategy) = strategy {
        options = options.strategy(strategy);
    }
    if let Some(label) = body.label {
        options = options.label(label);
    }

    let loaded = state
        .loader(context)
        .load_query(&body.query, body.params, options)
        .await?;

    let cache_control = HeaderValue::from_str(&loaded.cache_control())
        .map_err(|err| AppError::unexpected(err.to_string()))?;
    let mut response = Json(json!({ "result": loaded.value })).into_response();
    response.headers_mut().insert(CACHE_CONTROL, cache_control);
    Ok(response)
}
