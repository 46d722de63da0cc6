//! WebSocket client for a single stream topic
//!
//! Handles connection, frame reception, and ping/pong keepalive.

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async,
    tungstenite::protocol::Message,
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, error, info, warn};

use crate::error::{MarketDataError, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket client for a single connection
pub struct WebSocketClient {
    stream: Option<WsStream>,
    url: String,
}

impl WebSocketClient {
    /// Create a client for `<endpoint>/<topic>`
    pub fn new(endpoint: &str, topic: &str) -> Self {
        Self {
            stream: None,
            url: format!("{}/{}", endpoint.trim_end_matches('/'), topic),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Connect to the stream URL, replacing any previous socket
    pub async fn connect(&mut self) -> Result<()> {
        self.close().await;

        info!(url = %self.url, "Connecting to WebSocket stream");

        let (ws_stream, response) = connect_async(self.url.as_str()).await.map_err(|e| {
            MarketDataError::WebSocketConnection(format!("Failed to connect: {}", e))
        })?;

        info!(status = ?response.status(), "WebSocket connected");
        self.stream = Some(ws_stream);

        Ok(())
    }

    /// Receive the next message
    ///
    /// Returns `Ok(None)` for control frames, which are handled here, and for
    /// binary frames that are not valid UTF-8.
    pub async fn recv(&mut self) -> Result<Option<String>> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| MarketDataError::WebSocketConnection("Not connected".to_string()))?;

        match stream.next().await {
            Some(Ok(Message::Text(text))) => {
                debug!(len = text.len(), "Received text message");
                Ok(Some(text))
            }
            Some(Ok(Message::Binary(data))) => match String::from_utf8(data) {
                Ok(text) => Ok(Some(text)),
                Err(e) => {
                    warn!(
                        len = e.as_bytes().len(),
                        error = %e.utf8_error(),
                        "Discarding binary frame that is not UTF-8"
                    );
                    Ok(None)
                }
            },
            Some(Ok(Message::Ping(data))) => {
                debug!("Received ping, sending pong");
                if let Some(stream) = self.stream.as_mut() {
                    if let Err(e) = stream.send(Message::Pong(data)).await {
                        warn!(error = %e, "Failed to send pong");
                    }
                }
                Ok(None)
            }
            Some(Ok(Message::Pong(_))) => {
                debug!("Received pong");
                Ok(None)
            }
            Some(Ok(Message::Close(frame))) => {
                warn!(frame = ?frame, "Received close frame");
                self.stream = None;
                Err(MarketDataError::WebSocketConnection(
                    "Connection closed".to_string(),
                ))
            }
            Some(Ok(Message::Frame(_))) => Ok(None),
            Some(Err(e)) => {
                error!(error = %e, "WebSocket error");
                self.stream = None;
                Err(MarketDataError::WebSocketMessage(e.to_string()))
            }
            None => {
                warn!("WebSocket stream ended");
                self.stream = None;
                Err(MarketDataError::WebSocketConnection(
                    "Stream ended".to_string(),
                ))
            }
        }
    }

    /// Send a ping to keep connection alive
    pub async fn ping(&mut self) -> Result<()> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| MarketDataError::WebSocketConnection("Not connected".to_string()))?;
        stream
            .send(Message::Ping(vec![]))
            .await
            .map_err(|e| MarketDataError::WebSocketMessage(e.to_string()))
    }

    /// Check if connected
    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Close the connection
    pub async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.close(None).await;
        }
    }
}
