//! Preview URL validation.
//!
//! An editor opens the preview route with a short-lived secret. The secret
//! is checked against a secret document stored in the content source, read
//! with a credentialed client.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use subtle::ConstantTimeEq;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use tracing::debug;
use url::Url;

use crate::{content::ContentClient, content::ContentError, domain::perspective::ClientPerspective};

pub const SECRET_PARAM: &str = "preview-secret";
pub const PATHNAME_PARAM: &str = "preview-pathname";
pub const PERSPECTIVE_PARAM: &str = "preview-perspective";

const PREVIEW_PARAM_PREFIX: &str = "preview-";
const DEFAULT_SECRET_TTL: Duration = Duration::from_secs(60 * 60);
const SECRET_DOCUMENT_QUERY: &str =
    r#"*[_type == "vitrine.previewSecret" && secret == $secret][0]{secret, _updatedAt}"#;

/// Outcome of validating a preview URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewUrlValidation {
    pub is_valid: bool,
    pub redirect_to: String,
    pub perspective: Option<ClientPerspective>,
}

impl PreviewUrlValidation {
    fn rejected(redirect_to: String) -> Self {
        Self {
            is_valid: false,
            redirect_to,
            perspective: None,
        }
    }
}

#[async_trait]
pub trait PreviewValidator: Send + Sync {
    /// Validate `url` using `client`. Errors mean the check itself failed,
    /// not that the secret was wrong.
    async fn validate(
        &self,
        client: &dyn ContentClient,
        url: &Url,
    ) -> Result<PreviewUrlValidation, ContentError>;
}

#[derive(Debug, Deserialize)]
struct SecretDocument {
    secret: String,
    #[serde(rename = "_updatedAt")]
    updated_at: String,
}

/// Validates secrets against `vitrine.previewSecret` documents.
#[derive(Debug, Clone)]
pub struct SecretDocumentValidator {
    ttl: Duration,
}

impl Default for SecretDocumentValidator {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_SECRET_TTL,
        }
    }
}

impl SecretDocumentValidator {
    pub fn with_ttl(ttl: Duration) -> Self {
        Self { ttl }
    }

    fn is_current(&self, document: &SecretDocument, now: OffsetDateTime) -> bool {
        let Ok(updated_at) = OffsetDateTime::parse(&document.updated_at, &Rfc3339) else {
            debug!(updated_at = %document.updated_at, "secret document timestamp unreadable");
            return false;
        };
        let age = now - updated_at;
        !age.is_negative() && age.unsigned_abs() <= self.ttl
    }

    async fn validate_at(
        &self,
        client: &dyn ContentClient,
        url: &Url,
        now: OffsetDateTime,
    ) -> Result<PreviewUrlValidation, ContentError> {
        let redirect_to = sanitize_redirect(query_param(url, PATHNAME_PARAM).as_deref());
        let Some(secret) = query_param(url, SECRET_PARAM).filter(|secret| !secret.is_empty())
        else {
            return Ok(PreviewUrlValidation::rejected(redirect_to));
        };

        let result = client
            .fetch(SECRET_DOCUMENT_QUERY, Some(&json!({ "secret": secret })))
            .await?;
        if result.is_null() {
            return Ok(PreviewUrlValidation::rejected(redirect_to));
        }
        let document: SecretDocument = serde_json::from_value(result)
            .map_err(|err| ContentError::decode(format!("secret document: {err}")))?;

        let matches: bool = document.secret.as_bytes().ct_eq(secret.as_bytes()).into();
        if !matches || !self.is_current(&document, now) {
            return Ok(PreviewUrlValidation::rejected(redirect_to));
        }

        let perspective = query_param(url, PERSPECTIVE_PARAM)
            .and_then(|raw| ClientPerspective::parse(&raw).ok());
        Ok(PreviewUrlValidation {
            is_valid: true,
            redirect_to,
            perspective,
        })
    }
}

#[async_trait]
impl PreviewValidator for SecretDocumentValidator {
    async fn validate(
        &self,
        client: &dyn ContentClient,
        url: &Url,
    ) -> Result<PreviewUrlValidation, ContentError> {
        self.validate_at(client, url, OffsetDateTime::now_utc()).await
    }
}

fn query_param(url: &Url, name: &str) -> Option<String> {
    url.query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

/// Same-origin path for a redirect, with `preview-*` parameters removed.
/// Anything that is not an absolute path becomes `/`.
pub fn sanitize_redirect(target: Option<&str>) -> String {
    let Some(target) = target.map(str::trim).filter(|target| !target.is_empty()) else {
        return "/".to_string();
    };
    if !target.starts_with('/') || target.starts_with("//") || target.starts_with("/\\") {
        return "/".to_string();
    }

    let Ok(base) = Url::parse("http://vitrine.invalid") else {
        return "/".to_string();
    };
    let Ok(mut parsed) = base.join(target) else {
        return "/".to_string();
    };
    if parsed.origin() != base.origin() {
        return "/".to_string();
    }

    let kept: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(key, _)| !key.starts_with(PREVIEW_PARAM_PREFIX))
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    if kept.is_empty() {
        parsed.set_query(None);
    } else {
        parsed.query_pairs_mut().clear().extend_pairs(kept);
    }

    let mut path = parsed.path().to_string();
    if let Some(query) = parsed.query() {
        path.push('?');
        path.push_str(query);
    }
    if let Some(fragment) = parsed.fragment() {
        path.push('#');
        path.push_str(fragment);
    }
    path
}
