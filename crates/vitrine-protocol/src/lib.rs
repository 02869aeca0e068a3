//! Wire types exchanged between a storefront page and the editing surface
//! that frames it.
//!
//! Every frame travels inside an [`Envelope`] carrying the protocol version
//! and the connection identifier. Message payloads form a closed tagged
//! union; decoding rejects frames from other protocol versions instead of
//! guessing at their shape.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Current version of the channel protocol.
pub const PROTOCOL_VERSION: u16 = 1;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed channel frame: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("unsupported protocol version {found} (expected {PROTOCOL_VERSION})")]
    UnsupportedVersion { found: u64 },
    #[error("channel frame is missing a protocol version")]
    MissingVersion,
}

/// A single frame on a named connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub version: u16,
    pub connection: String,
    pub message: Message,
}

impl Envelope {
    pub fn new(connection: impl Into<String>, message: Message) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            connection: connection.into(),
            message,
        }
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode a frame, checking the version before interpreting the message.
    pub fn decode(frame: &str) -> Result<Self, ProtocolError> {
        let raw: serde_json::Value = serde_json::from_str(frame)?;
        let version = raw
            .get("version")
            .and_then(serde_json::Value::as_u64)
            .ok_or(ProtocolError::MissingVersion)?;
        if version != u64::from(PROTOCOL_VERSION) {
            return Err(ProtocolError::UnsupportedVersion { found: version });
        }
        Ok(serde_json::from_value(raw)?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Message {
    /// The editor switched the perspective it is looking at.
    #[serde(rename = "loader/perspective")]
    Perspective { perspective: PerspectiveValue },
    /// Whether the page currently has live query subscriptions.
    #[serde(rename = "loader/live-queries")]
    LiveQueries { active: bool },
    /// The editor asks the page to refresh its data.
    #[serde(rename = "visual-editing/refresh")]
    Refresh { id: u64, payload: RefreshPayload },
    /// The page finished handling refresh `id`.
    #[serde(rename = "visual-editing/refresh-complete")]
    RefreshComplete { id: u64 },
    /// The editor asks the page to navigate.
    #[serde(rename = "visual-editing/navigate")]
    Navigate { intent: NavigationIntent },
    /// The page navigated on its own.
    #[serde(rename = "visual-editing/location")]
    Location {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
    },
}

/// Perspective as sent on the wire: a single name or a stack of names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PerspectiveValue {
    Single(String),
    Stack(Vec<String>),
}

impl PerspectiveValue {
    /// Comma-joined form used by the perspective form field.
    pub fn to_comma_joined(&self) -> String {
        match self {
            PerspectiveValue::Single(name) => name.clone(),
            PerspectiveValue::Stack(names) => names.join(","),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum RefreshPayload {
    Manual {
        live_preview_enabled: bool,
    },
    Mutation {
        live_preview_enabled: bool,
        document: DocumentDelta,
    },
    PerspectiveChange {
        live_preview_enabled: bool,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentDelta {
    pub id: String,
    #[serde(rename = "type")]
    pub document_type: String,
    pub revision: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum NavigationIntent {
    Push { url: String },
    Replace { url: String },
    Pop,
}
