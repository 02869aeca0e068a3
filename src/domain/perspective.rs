//! Content perspectives: which document versions a query reads.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use vitrine_protocol::PerspectiveValue;

const PUBLISHED: &str = "published";
const DRAFTS: &str = "drafts";
const RAW: &str = "raw";
const LEGACY_PREVIEW_DRAFTS: &str = "previewDrafts";

/// Perspective used for preview sessions when nothing better is known.
pub const DEFAULT_PREVIEW_PERSPECTIVE: ClientPerspective = ClientPerspective::Drafts;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PerspectiveError {
    #[error("perspective must name at least one view")]
    Empty,
    #[error("`raw` cannot be combined with other perspectives")]
    RawCombined,
    #[error("invalid perspective name `{0}`")]
    InvalidName(String),
}

/// A named read-view over content.
///
/// `Stack` lists release names (and optionally `drafts`/`published`) in
/// priority order. `Raw` is unrestricted and only valid on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ClientPerspective {
    Published,
    Drafts,
    Raw,
    Stack(Vec<String>),
}

impl ClientPerspective {
    /// Parse the comma-joined form used by cookies and form fields.
    pub fn parse(raw: &str) -> Result<Self, PerspectiveError> {
        Self::from_names(raw.split(','))
    }

    pub fn from_names<I, S>(names: I) -> Result<Self, PerspectiveError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names: Vec<String> = names
            .into_iter()
            .map(|name| name.as_ref().trim().to_string())
            .filter(|name| !name.is_empty())
            .collect();

        match names.as_slice() {
            [] => Err(PerspectiveError::Empty),
            [single] => match single.as_str() {
                PUBLISHED => Ok(Self::Published),
                DRAFTS | LEGACY_PREVIEW_DRAFTS => Ok(Self::Drafts),
                RAW => Ok(Self::Raw),
                release => {
                    validate_release_name(release)?;
                    Ok(Self::Stack(names))
                }
            },
            many => {
                if many.iter().any(|name| name == RAW) {
                    return Err(PerspectiveError::RawCombined);
                }
                for name in many {
                    if name != PUBLISHED && name != DRAFTS {
                        validate_release_name(name)?;
                    }
                }
                Ok(Self::Stack(names))
            }
        }
    }

    pub fn is_stack(&self) -> bool {
        matches!(self, Self::Stack(_))
    }

    pub fn to_comma_joined(&self) -> String {
        match self {
            Self::Published => PUBLISHED.to_string(),
            Self::Drafts => DRAFTS.to_string(),
            Self::Raw => RAW.to_string(),
            Self::Stack(names) => names.join(","),
        }
    }

    pub fn to_wire(&self) -> PerspectiveValue {
        match self {
            Self::Stack(names) => PerspectiveValue::Stack(names.clone()),
            other => PerspectiveValue::Single(other.to_comma_joined()),
        }
    }
}

fn validate_release_name(name: &str) -> Result<(), PerspectiveError> {
    let valid = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(PerspectiveError::InvalidName(name.to_string()))
    }
}

impl fmt::Display for ClientPerspective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_comma_joined())
    }
}

impl FromStr for ClientPerspective {
    type Err = PerspectiveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ClientPerspective {
    type Error = PerspectiveError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ClientPerspective> for String {
    fn from(value: ClientPerspective) -> Self {
        value.to_comma_joined()
    }
}

impl TryFrom<&PerspectiveValue> for ClientPerspective {
    type Error = PerspectiveError;

    fn try_from(value: &PerspectiveValue) -> Result<Self, Self::Error> {
        match value {
            PerspectiveValue::Single(name) => Self::parse(name),
            PerspectiveValue::Stack(names) => Self::from_names(names),
        }
    }
}
