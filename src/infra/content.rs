//! HTTP content client backed by `reqwest`.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::{Client, header::AUTHORIZATION};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::content::{ClientConfig, ClientOverrides, ContentClient, ContentError};

use super::error::InfraError;

#[derive(Debug, Deserialize)]
struct QueryResponse {
    result: Value,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Clone)]
pub struct HttpContentClient {
    http: Client,
    config: ClientConfig,
}

impl HttpContentClient {
    pub fn new(config: ClientConfig, timeout: Duration) -> Result<Self, InfraError> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("vitrine/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(InfraError::ContentClient)?;
        Ok(Self { http, config })
    }

    fn query_url(&self) -> String {
        let config = &self.config;
        format!(
            "https://{}.{}/{}/data/query/{}",
            config.project_id,
            config.host(),
            config.api_version,
            config.dataset
        )
    }
}

/// Query-string pairs: the query itself plus `$name=<json>` per parameter.
fn query_pairs(
    query: &str,
    params: Option<&Value>,
    config: &ClientConfig,
) -> Result<Vec<(String, String)>, ContentError> {
    let mut pairs = vec![("query".to_string(), query.to_string())];
    match params {
        None | Some(Value::Null) => {}
        Some(Value::Object(map)) => {
            for (name, value) in map {
                pairs.push((format!("${name}"), value.to_string()));
            }
        }
        Some(other) => {
            return Err(ContentError::decode(format!(
                "query parameters must be an object, got {other}"
            )));
        }
    }
    pairs.push(("perspective".to_string(), config.perspective.to_comma_joined()));
    Ok(pairs)
}

#[async_trait]
impl ContentClient for HttpContentClient {
    fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn with_config(&self, overrides: ClientOverrides) -> Arc<dyn ContentClient> {
        Arc::new(Self {
            http: self.http.clone(),
            config: self.config.apply(overrides),
        })
    }

    async fn fetch(&self, query: &str, params: Option<&Value>) -> Result<Value, ContentError> {
        let pairs = query_pairs(query, params, &self.config)?;
        let mut request = self.http.get(self.query_url()).query(&pairs);
        if let Some(token) = &self.config.token {
            request = request.header(AUTHORIZATION, format!("Bearer {}", token.expose()));
        }

        debug!(
            host = self.config.host(),
            perspective = %self.config.perspective,
            "sending content query"
        );

        let response = request
            .send()
            .await
            .map_err(|err| ContentError::transport(err.to_string()))?;
        let status = response.status();

        if !status.is_success() {
            let message = match response.json::<ErrorBody>().await {
                Ok(body) => body
                    .error
                    .description
                    .or(body.error.message)
                    .unwrap_or_else(|| "no error description".to_string()),
                Err(_) => status
                    .canonical_reason()
                    .unwrap_or("unknown error")
                    .to_string(),
            };
            return Err(ContentError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let body: QueryResponse = response
            .json()
            .await
            .map_err(|err| ContentError::decode(err.to_string()))?;
        Ok(body.result)
    }
}
