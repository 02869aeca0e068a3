//! Cache key derivation for content queries.

use std::fmt;

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Opaque key for one `(query, params)` pair: lowercase hex SHA-256.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hash a query and its (already canonical) parameters.
///
/// Object keys inside `params` serialize in sorted order, so parameter maps
/// built in different insertion orders produce the same key.
pub fn hash_query(query: &str, params: Option<&Value>) -> CacheKey {
    let mut hasher = Sha256::new();
    hasher.update(query.as_bytes());
    if let Some(params) = params {
        hasher.update(params.to_string().as_bytes());
    }
    CacheKey(hex::encode(hasher.finalize()))
}
