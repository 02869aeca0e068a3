//! Named caching policies and their `Cache-Control` rendering.

use std::{fmt, str::FromStr};

use thiserror::Error;

const LONG_MAX_AGE: u32 = 3600;
const LONG_STALE_WHILE_REVALIDATE: u32 = 82_800;
const SHORT_MAX_AGE: u32 = 1;
const SHORT_STALE_WHILE_REVALIDATE: u32 = 9;

/// Storage mode of a custom strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheMode {
    Public,
    Private,
    NoStore,
}

impl CacheMode {
    fn as_str(&self) -> &'static str {
        match self {
            CacheMode::Public => "public",
            CacheMode::Private => "private",
            CacheMode::NoStore => "no-store",
        }
    }
}

/// Caching policy for a content query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheStrategy {
    /// One hour fresh, revalidated in the background for a further 23 hours.
    Long,
    /// One second fresh, nine seconds of stale-while-revalidate.
    #[default]
    Short,
    /// Never stored.
    None,
    Custom {
        mode: Option<CacheMode>,
        max_age: Option<u32>,
        stale_while_revalidate: Option<u32>,
        stale_if_error: Option<u32>,
    },
}

impl CacheStrategy {
    /// True when no entry may be written under this strategy.
    pub fn forbids_storage(&self) -> bool {
        match self {
            CacheStrategy::None => true,
            CacheStrategy::Custom { mode, .. } => matches!(mode, Some(CacheMode::NoStore)),
            CacheStrategy::Long | CacheStrategy::Short => false,
        }
    }

    /// Render as a `Cache-Control` value. Absent fields are omitted.
    pub fn directive(&self) -> String {
        match self {
            CacheStrategy::None => CacheMode::NoStore.as_str().to_string(),
            CacheStrategy::Long => render(
                Some(CacheMode::Public),
                Some(LONG_MAX_AGE),
                Some(LONG_STALE_WHILE_REVALIDATE),
                None,
            ),
            CacheStrategy::Short => render(
                Some(CacheMode::Public),
                Some(SHORT_MAX_AGE),
                Some(SHORT_STALE_WHILE_REVALIDATE),
                None,
            ),
            CacheStrategy::Custom {
                mode,
                max_age,
                stale_while_revalidate,
                stale_if_error,
            } => render(*mode, *max_age, *stale_while_revalidate, *stale_if_error),
        }
    }
}

fn render(
    mode: Option<CacheMode>,
    max_age: Option<u32>,
    stale_while_revalidate: Option<u32>,
    stale_if_error: Option<u32>,
) -> String {
    if mode == Some(CacheMode::NoStore) {
        return CacheMode::NoStore.as_str().to_string();
    }

    let mut parts = Vec::with_capacity(4);
    if let Some(mode) = mode {
        parts.push(mode.as_str().to_string());
    }
    if let Some(seconds) = max_age {
        parts.push(format!("max-age={seconds}"));
    }
    if let Some(seconds) = stale_while_revalidate {
        parts.push(format!("stale-while-revalidate={seconds}"));
    }
    if let Some(seconds) = stale_if_error {
        parts.push(format!("stale-if-error={seconds}"));
    }
    parts.join(", ")
}

impl fmt::Display for CacheStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.directive())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown cache strategy `{0}` (expected long, short or none)")]
pub struct UnknownStrategy(String);

impl FromStr for CacheStrategy {
    type Err = UnknownStrategy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "long" => Ok(CacheStrategy::Long),
            "short" => Ok(CacheStrategy::Short),
            "none" | "no-store" => Ok(CacheStrategy::None),
            _ => Err(UnknownStrategy(s.to_string())),
        }
    }
}
