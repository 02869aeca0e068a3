//! Cross-frame message channel.

use std::fmt;

use thiserror::Error;
use tokio::sync::{Mutex, mpsc};
use vitrine_protocol::{Envelope, Message, ProtocolError};

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("channel `{0}` is closed")]
    Closed(String),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Outgoing half of a connection to the editing surface.
pub trait MessageChannel: Send + Sync {
    fn connection(&self) -> &str;

    fn send(&self, message: Message) -> Result<(), ChannelError>;
}

/// In-process channel endpoint exchanging encoded frames over tokio mpsc.
pub struct LocalChannel {
    connection: String,
    outgoing: mpsc::UnboundedSender<String>,
    incoming: Mutex<mpsc::UnboundedReceiver<String>>,
}

impl fmt::Debug for LocalChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalChannel")
            .field("connection", &self.connection)
            .finish()
    }
}

impl LocalChannel {
    /// Two connected endpoints sharing `connection`.
    pub fn pair(connection: impl Into<String>) -> (LocalChannel, LocalChannel) {
        let connection = connection.into();
        let (left_tx, right_rx) = mpsc::unbounded_channel();
        let (right_tx, left_rx) = mpsc::unbounded_channel();
        (
            LocalChannel {
                connection: connection.clone(),
                outgoing: left_tx,
                incoming: Mutex::new(left_rx),
            },
            LocalChannel {
                connection,
                outgoing: right_tx,
                incoming: Mutex::new(right_rx),
            },
        )
    }

    /// Next frame from the peer. `None` once the peer is gone.
    pub async fn recv(&self) -> Option<Result<Envelope, ProtocolError>> {
        let frame = self.incoming.lock().await.recv().await?;
        Some(Envelope::decode(&frame))
    }

    /// Next frame if one is already queued.
    pub fn try_recv(&self) -> Option<Result<Envelope, ProtocolError>> {
        let frame = self.incoming.try_lock().ok()?.try_recv().ok()?;
        Some(Envelope::decode(&frame))
    }
}

impl MessageChannel for LocalChannel {
    fn connection(&self) -> &str {
        &self.connection
    }

    fn send(&self, message: Message) -> Result<(), ChannelError> {
        let frame = Envelope::new(self.connection.clone(), message).encode()?;
        self.outgoing
            .send(frame)
            .map_err(|_| ChannelError::Closed(self.connection.clone()))
    }
}
