//! Domain types and invariants.

pub mod api_version;
pub mod perspective;
