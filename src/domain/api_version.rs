//! Content API versions.

use std::{fmt, str::FromStr};

use thiserror::Error;
use time::{
    Date,
    macros::{date, format_description},
};

/// First API version that accepts perspective stacks.
pub const PERSPECTIVE_STACK_MIN_VERSION: Date = date!(2025 - 02 - 19);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid api version `{0}`: expected YYYY-MM-DD or X")]
pub struct ApiVersionError(String);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiVersion {
    Dated(Date),
    /// The moving experimental version, treated as newer than any date.
    Experimental,
}

impl ApiVersion {
    pub fn supports_perspective_stack(&self) -> bool {
        match self {
            ApiVersion::Experimental => true,
            ApiVersion::Dated(date) => *date >= PERSPECTIVE_STACK_MIN_VERSION,
        }
    }
}

impl FromStr for ApiVersion {
    type Err = ApiVersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let bare = trimmed.strip_prefix('v').unwrap_or(trimmed);
        if bare.eq_ignore_ascii_case("x") {
            return Ok(ApiVersion::Experimental);
        }
        Date::parse(bare, format_description!("[year]-[month]-[day]"))
            .map(ApiVersion::Dated)
            .map_err(|_| ApiVersionError(s.to_string()))
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiVersion::Experimental => f.write_str("vX"),
            ApiVersion::Dated(date) => write!(
                f,
                "v{:04}-{:02}-{:02}",
                date.year(),
                u8::from(date.month()),
                date.day()
            ),
        }
    }
}
