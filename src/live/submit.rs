//! Perspective submission back to the storefront.
//!
//! The preview route answers a perspective change with a re-signed session
//! cookie. [`SessionCookies`] keeps the latest value so that every later
//! request from the page, revalidation reads included, runs under the new
//! perspective.

use std::{
    collections::BTreeMap,
    sync::{Arc, RwLock},
};

use async_trait::async_trait;
use reqwest::{
    Client,
    header::{COOKIE, SET_COOKIE},
};
use thiserror::Error;
use tracing::debug;
use url::Url;
use vitrine_protocol::PerspectiveValue;

use crate::cache::{rw_read, rw_write};

const SOURCE: &str = "vitrine::live::submit";

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("perspective request failed: {0}")]
    Transport(String),
    #[error("perspective request rejected with status {0}")]
    Rejected(u16),
}

/// Stores a new perspective in the preview session.
#[async_trait]
pub trait PerspectiveSubmitter: Send + Sync {
    async fn submit(&self, perspective: &PerspectiveValue) -> Result<(), SubmitError>;
}

/// Cookies the page sends to the storefront, shared between the submitter
/// and whatever reloads page data.
#[derive(Debug, Clone, Default)]
pub struct SessionCookies {
    pairs: Arc<RwLock<BTreeMap<String, String>>>,
}

impl SessionCookies {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed from a `Cookie` header value (`a=1; b=2`).
    pub fn from_header(header: &str) -> Self {
        let cookies = Self::new();
        {
            let mut pairs = rw_write(&cookies.pairs, SOURCE, "from_header");
            for (name, value) in header.split(';').filter_map(split_pair) {
                pairs.insert(name, value);
            }
        }
        cookies
    }

    /// `Cookie` header value, or `None` when no cookie is held.
    pub fn header(&self) -> Option<String> {
        let pairs = rw_read(&self.pairs, SOURCE, "header");
        if pairs.is_empty() {
            return None;
        }
        Some(
            pairs
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    /// Value of cookie `name`, if held.
    pub fn get(&self, name: &str) -> Option<String> {
        rw_read(&self.pairs, SOURCE, "get").get(name).cloned()
    }

    /// Apply one `Set-Cookie` value. Cleared cookies are forgotten.
    pub fn apply_set_cookie(&self, set_cookie: &str) {
        let mut parts = set_cookie.split(';');
        let Some((name, value)) = parts.next().and_then(split_pair) else {
            return;
        };
        let cleared = value.is_empty()
            || parts.any(|attribute| {
                attribute
                    .trim()
                    .split_once('=')
                    .is_some_and(|(key, age)| {
                        key.trim().eq_ignore_ascii_case("max-age") && age.trim() == "0"
                    })
            });

        let mut pairs = rw_write(&self.pairs, SOURCE, "apply_set_cookie");
        if cleared {
            pairs.remove(&name);
        } else {
            pairs.insert(name, value);
        }
    }
}

fn split_pair(pair: &str) -> Option<(String, String)> {
    let (name, value) = pair.trim().split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), value.trim().to_string()))
}

/// Submits perspectives as a `PUT` form to the preview route.
#[derive(Debug, Clone)]
pub struct HttpPerspectiveSubmitter {
    http: Client,
    endpoint: Url,
    cookies: SessionCookies,
}

impl HttpPerspectiveSubmitter {
    pub fn new(http: Client, endpoint: Url) -> Self {
        Self {
            http,
            endpoint,
            cookies: SessionCookies::new(),
        }
    }

    /// Seed the session from a `Cookie` header value.
    pub fn with_cookie(self, cookie: impl AsRef<str>) -> Self {
        self.with_cookies(SessionCookies::from_header(cookie.as_ref()))
    }

    /// Share `cookies` with other page requests.
    pub fn with_cookies(mut self, cookies: SessionCookies) -> Self {
        self.cookies = cookies;
        self
    }

    pub fn cookies(&self) -> &SessionCookies {
        &self.cookies
    }
}

#[async_trait]
impl PerspectiveSubmitter for HttpPerspectiveSubmitter {
    async fn submit(&self, perspective: &PerspectiveValue) -> Result<(), SubmitError> {
        let form = [("perspective", perspective.to_comma_joined())];
        let mut request = self.http.put(self.endpoint.clone()).form(&form);
        if let Some(cookie) = self.cookies.header() {
            request = request.header(COOKIE, cookie);
        }

        let response = request
            .send()
            .await
            .map_err(|err| SubmitError::Transport(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(SubmitError::Rejected(status.as_u16()));
        }

        for value in response.headers().get_all(SET_COOKIE) {
            match value.to_str() {
                Ok(set_cookie) => self.cookies.apply_set_cookie(set_cookie),
                Err(err) => debug!(target = SOURCE, error = %err, "unreadable Set-Cookie ignored"),
            }
        }
        debug!(target = SOURCE, perspective = %form[0].1, "perspective submitted");
        Ok(())
    }
}
