//! Transport seam for the push channel
//!
//! The channel speaks text frames over a [`Connection`] obtained from a
//! [`Connector`]. Production uses WebSockets; tests plug in scripted
//! doubles.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;

use crate::error::{SyncError, SyncResult};

/// Opens connections to the push server
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, url: &str) -> SyncResult<Box<dyn Connection>>;
}

/// One open, bidirectional text-frame connection
#[async_trait]
pub trait Connection: Send {
    async fn send(&mut self, frame: String) -> SyncResult<()>;

    /// Next text frame; `None` once the peer has closed
    ///
    /// Must be cancel safe: it is polled inside `select!`.
    async fn recv(&mut self) -> Option<SyncResult<String>>;

    async fn close(&mut self);
}

/// Build the Socket.IO WebSocket endpoint for a server origin
///
/// `http(s)://` origins are mapped to `ws(s)://`.
pub fn socket_io_url(origin: &str) -> String {
    let origin = origin.trim_end_matches('/');
    let origin = if let Some(rest) = origin.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = origin.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        origin.to_string()
    };
    format!("{}/socket.io/?EIO=4&transport=websocket", origin)
}

/// WebSocket connector backed by `tokio-tungstenite`
#[derive(Debug, Default, Clone, Copy)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> SyncResult<Box<dyn Connection>> {
        debug!("Opening WebSocket {}", url);
        let (stream, _response) = connect_async(url)
            .await
            .map_err(|e| SyncError::Channel(format!("Failed to connect to {}: {}", url, e)))?;
        Ok(Box::new(WsConnection { stream }))
    }
}

struct WsConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Connection for WsConnection {
    async fn send(&mut self, frame: String) -> SyncResult<()> {
        self.stream
            .send(Message::Text(frame))
            .await
            .map_err(|e| SyncError::Channel(format!("WebSocket send failed: {}", e)))
    }

    async fn recv(&mut self) -> Option<SyncResult<String>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                Ok(Message::Close(_)) => return None,
                Ok(Message::Binary(_)) => {
                    debug!("Ignoring binary WebSocket frame");
                }
                // Control frames are answered by tungstenite itself
                Ok(_) => {}
                Err(e) => return Some(Err(SyncError::Channel(format!("WebSocket error: {}", e)))),
            }
        }
    }

    async fn close(&mut self) {
        self.stream.close(None).await.ok();
    }
}
