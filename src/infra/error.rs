use std::net::SocketAddr;

use thiserror::Error;

use crate::preview::CookieError;

/// Startup and serving failures outside request handling.
#[derive(Debug, Error)]
pub enum InfraError {
    #[error("failed to bind listener on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("http server stopped unexpectedly: {0}")]
    Serve(#[source] std::io::Error),
    #[error("content client could not be built: {0}")]
    ContentClient(#[source] reqwest::Error),
    #[error("session cookie misconfigured: {0}")]
    SessionCookie(#[from] CookieError),
    #[error("telemetry initialization failed: {0}")]
    Telemetry(String),
}

impl InfraError {
    pub fn bind(addr: SocketAddr, source: std::io::Error) -> Self {
        Self::Bind { addr, source }
    }

    pub fn telemetry(message: impl Into<String>) -> Self {
        Self::Telemetry(message.into())
    }
}
