//! Parsing of rendered `Cache-Control` directives into freshness windows.

use std::time::Duration;

/// Freshness windows understood by the cache store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Freshness {
    pub no_store: bool,
    pub private: bool,
    pub max_age: Duration,
    pub stale_while_revalidate: Duration,
    pub stale_if_error: Duration,
}

impl Freshness {
    /// Total time an entry may be kept before it is expired outright.
    pub fn retention(&self) -> Duration {
        self.max_age + self.stale_while_revalidate.max(self.stale_if_error)
    }
}

/// Parse a `Cache-Control` value. Unknown directives are ignored.
pub fn parse_cache_control(value: &str) -> Freshness {
    let mut freshness = Freshness::default();

    for directive in value.split(',') {
        let directive = directive.trim();
        let (name, arg) = match directive.split_once('=') {
            Some((name, arg)) => (name.trim(), Some(arg.trim().trim_matches('"'))),
            None => (directive, None),
        };
        let seconds = arg
            .and_then(|arg| arg.parse::<u64>().ok())
            .map(Duration::from_secs);

        match name.to_ascii_lowercase().as_str() {
            "no-store" => freshness.no_store = true,
            "private" => freshness.private = true,
            "max-age" => freshness.max_age = seconds.unwrap_or_default(),
            "stale-while-revalidate" => {
                freshness.stale_while_revalidate = seconds.unwrap_or_default()
            }
            "stale-if-error" => freshness.stale_if_error = seconds.unwrap_or_default(),
            _ => {}
        }
    }

    freshness
}
