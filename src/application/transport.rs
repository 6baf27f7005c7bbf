// Transport seam between the connection manager and the controller link
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("connect timed out after {0:?}")]
    Timeout(Duration),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("connection closed")]
    Closed,
}

/// Opens connections to the controller.
#[async_trait]
pub trait FrameTransport: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn FrameStream>, TransportError>;
}

/// One open connection yielding raw frames.
#[async_trait]
pub trait FrameStream: Send {
    /// Next inbound frame; `None` once the peer has closed the connection.
    async fn next_frame(&mut self) -> Option<Result<Vec<u8>, TransportError>>;

    async fn close(&mut self);
}
