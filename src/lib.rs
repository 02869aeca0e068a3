//! Cached content queries and live preview sessions for server-rendered
//! storefronts.

pub mod application;
pub mod cache;
pub mod config;
pub mod content;
pub mod domain;
pub mod infra;
pub mod live;
pub mod preview;
