//! Content client boundary.
//!
//! The storefront reads content through a [`ContentClient`]. Construction
//! and credential injection happen at startup; per-request variants are
//! derived with [`ContentClient::with_config`].

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::domain::{api_version::ApiVersion, perspective::ClientPerspective};

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("content request failed: {0}")]
    Transport(String),
    #[error("content source responded with status {status}: {message}")]
    Status { status: u16, message: String },
    #[error("content response could not be decoded: {0}")]
    Decode(String),
}

impl ContentError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode(message.into())
    }
}

/// Credential for the content source. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretToken(String);

impl SecretToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretToken(<redacted>)")
    }
}

/// Effective configuration of one client instance.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub project_id: String,
    pub dataset: String,
    pub api_version: ApiVersion,
    pub api_host: String,
    pub cdn_host: String,
    pub use_cdn: bool,
    pub perspective: ClientPerspective,
    pub token: Option<SecretToken>,
}

impl ClientConfig {
    pub fn apply(&self, overrides: ClientOverrides) -> Self {
        let mut next = self.clone();
        if let Some(use_cdn) = overrides.use_cdn {
            next.use_cdn = use_cdn;
        }
        if let Some(perspective) = overrides.perspective {
            next.perspective = perspective;
        }
        if let Some(token) = overrides.token {
            next.token = Some(token);
        }
        next
    }

    /// Host the next request goes to. Authenticated reads skip the CDN.
    pub fn host(&self) -> &str {
        if self.use_cdn && self.token.is_none() {
            &self.cdn_host
        } else {
            &self.api_host
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ClientOverrides {
    pub use_cdn: Option<bool>,
    pub perspective: Option<ClientPerspective>,
    pub token: Option<SecretToken>,
}

#[async_trait]
pub trait ContentClient: Send + Sync {
    fn config(&self) -> &ClientConfig;

    fn with_config(&self, overrides: ClientOverrides) -> Arc<dyn ContentClient>;

    async fn fetch(&self, query: &str, params: Option<&Value>) -> Result<Value, ContentError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ClientConfig {
        ClientConfig {
            project_id: "p1".into(),
            dataset: "production".into(),
            api_version: ApiVersion::Experimental,
            api_host: "api.content.test".into(),
            cdn_host: "cdn.content.test".into(),
            use_cdn: true,
            perspective: ClientPerspective::Published,
            token: None,
        }
    }

    #[test]
    fn overrides_replace_only_given_fields() {
        let base = config();
        let next = base.apply(ClientOverrides {
            perspective: Some(ClientPerspective::Drafts),
            ..Default::default()
        });
        assert_eq!(next.perspective, ClientPerspective::Drafts);
        assert!(next.use_cdn);
        assert_eq!(next.dataset, "production");
    }

    #[test]
    fn token_reads_bypass_cdn() {
        let mut config = config();
        assert_eq!(config.host(), "cdn.content.test");
        config.token = Some(SecretToken::new("sk"));
        assert_eq!(config.host(), "api.content.test");
    }

    #[test]
    fn token_debug_is_redacted() {
        assert_eq!(
            format!("{:?}", SecretToken::new("super-secret")),
            "SecretToken(<redacted>)"
        );
    }
}
