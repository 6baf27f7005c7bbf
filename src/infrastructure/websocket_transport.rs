// WebSocket transport - frames from the controller's on-board socket server
use crate::application::transport::{FrameStream, FrameTransport, TransportError};
use async_trait::async_trait;
use futures::StreamExt;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

pub struct WebSocketTransport {
    url: String,
}

impl WebSocketTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl FrameTransport for WebSocketTransport {
    async fn connect(&self) -> Result<Box<dyn FrameStream>, TransportError> {
        tracing::debug!(url = %self.url, "Opening controller socket");
        let (socket, response) = connect_async(self.url.as_str())
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        tracing::debug!(status = %response.status(), "Controller socket open");
        Ok(Box::new(WebSocketFrames { socket }))
    }
}

struct WebSocketFrames {
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl FrameStream for WebSocketFrames {
    async fn next_frame(&mut self) -> Option<Result<Vec<u8>, TransportError>> {
        // Pings are answered by tungstenite while reading.
        loop {
            match self.socket.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text.into_bytes())),
                Ok(Message::Binary(data)) => return Some(Ok(data)),
                Ok(Message::Close(frame)) => {
                    tracing::info!(?frame, "Controller closed the socket");
                    return None;
                }
                Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => continue,
                Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => {
                    return Some(Err(TransportError::Closed));
                }
                Err(e) => return Some(Err(TransportError::Protocol(e.to_string()))),
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.socket.close(None).await {
            tracing::debug!(error = %e, "Socket close was not clean");
        }
    }
}
