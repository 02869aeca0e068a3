//! Signed session cookie codec.
//!
//! Cookie value layout: `base64url(json) "." base64url(hmac_sha256(json))`.
//! The first secret signs; every configured secret verifies, so secrets
//! can be rotated without logging existing sessions out.

use std::{fmt, str::FromStr, time::Duration};

use axum::http::{HeaderMap, header::COOKIE};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;
use tracing::debug;

use super::session::SessionSnapshot;

type HmacSha256 = Hmac<Sha256>;

const CLEARED_EXPIRES: &str = "Thu, 01 Jan 1970 00:00:00 GMT";

#[derive(Debug, Error)]
pub enum CookieError {
    #[error("session cookie requires at least one signing secret")]
    MissingSecret,
    #[error("session cookie name `{0}` is not a valid cookie token")]
    InvalidName(String),
    #[error("SameSite=None requires the Secure attribute")]
    InsecureSameSiteNone,
    #[error("session could not be serialized: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl fmt::Display for SameSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SameSite::Strict => "Strict",
            SameSite::Lax => "Lax",
            SameSite::None => "None",
        })
    }
}

impl FromStr for SameSite {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(SameSite::Strict),
            "lax" => Ok(SameSite::Lax),
            "none" => Ok(SameSite::None),
            other => Err(format!("unknown SameSite value `{other}`")),
        }
    }
}

/// Cookie attributes and signing secrets.
#[derive(Debug, Clone)]
pub struct CookieSettings {
    pub name: String,
    pub secrets: Vec<String>,
    pub path: String,
    pub http_only: bool,
    pub secure: bool,
    pub same_site: SameSite,
    pub max_age: Option<Duration>,
}

#[derive(Clone)]
pub struct SessionCookie {
    settings: CookieSettings,
}

impl fmt::Debug for SessionCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCookie")
            .field("name", &self.settings.name)
            .field("secrets", &self.settings.secrets.len())
            .finish()
    }
}

impl SessionCookie {
    pub fn new(settings: CookieSettings) -> Result<Self, CookieError> {
        if settings.secrets.iter().all(|secret| secret.is_empty()) {
            return Err(CookieError::MissingSecret);
        }
        let valid_name = !settings.name.is_empty()
            && settings
                .name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
        if !valid_name {
            return Err(CookieError::InvalidName(settings.name));
        }
        if settings.same_site == SameSite::None && !settings.secure {
            return Err(CookieError::InsecureSameSiteNone);
        }
        Ok(Self { settings })
    }

    pub fn name(&self) -> &str {
        &self.settings.name
    }

    /// Session carried by the request, or an empty one when the cookie is
    /// absent, tampered with or undecodable.
    pub fn read(&self, headers: &HeaderMap) -> SessionSnapshot {
        headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == self.settings.name)
            .and_then(|(_, value)| self.decode(value))
            .unwrap_or_default()
    }

    pub fn decode(&self, value: &str) -> Option<SessionSnapshot> {
        let (payload_b64, signature_b64) = value.split_once('.')?;
        let payload = URL_SAFE_NO_PAD.decode(payload_b64).ok()?;
        let signature = URL_SAFE_NO_PAD.decode(signature_b64).ok()?;

        let verified = self.signing_keys().any(|secret| {
            let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
                return false;
            };
            mac.update(&payload);
            mac.verify_slice(&signature).is_ok()
        });
        if !verified {
            debug!(cookie = %self.settings.name, "session signature rejected");
            return None;
        }

        match serde_json::from_slice(&payload) {
            Ok(snapshot) => Some(snapshot),
            Err(err) => {
                debug!(cookie = %self.settings.name, error = %err, "session payload rejected");
                None
            }
        }
    }

    /// `Set-Cookie` value carrying `snapshot`.
    pub fn encode(&self, snapshot: &SessionSnapshot) -> Result<String, CookieError> {
        let payload = serde_json::to_vec(snapshot)?;
        let secret = self
            .signing_keys()
            .next()
            .ok_or(CookieError::MissingSecret)?;
        let mut mac =
            HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| CookieError::MissingSecret)?;
        mac.update(&payload);
        let signature = mac.finalize().into_bytes();

        let value = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(&payload),
            URL_SAFE_NO_PAD.encode(signature)
        );
        let max_age = self
            .settings
            .max_age
            .map(|max_age| format!("; Max-Age={}", max_age.as_secs()))
            .unwrap_or_default();
        Ok(format!(
            "{}={}{}{}",
            self.settings.name,
            value,
            max_age,
            self.attributes()
        ))
    }

    /// `Set-Cookie` value that removes the session from the browser.
    pub fn clear(&self) -> String {
        format!(
            "{}=; Max-Age=0; Expires={}{}",
            self.settings.name,
            CLEARED_EXPIRES,
            self.attributes()
        )
    }

    fn attributes(&self) -> String {
        let mut attributes = format!("; Path={}", self.settings.path);
        if self.settings.http_only {
            attributes.push_str("; HttpOnly");
        }
        if self.settings.secure {
            attributes.push_str("; Secure");
        }
        attributes.push_str(&format!("; SameSite={}", self.settings.same_site));
        attributes
    }

    fn signing_keys(&self) -> impl Iterator<Item = &String> {
        self.settings
            .secrets
            .iter()
            .filter(|secret| !secret.is_empty())
    }
}
