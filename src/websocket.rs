//! WebSocket Client with TLS
//!
//! Features:
//! - Secure WebSocket (wss://) with rustls and native roots
//! - Automatic ping/pong for keep-alive
//! - Caller-supplied handshake headers (cookies, origin)
//!
//! [`WebSocketConnector`] plugs this client into the live relay as its
//! [`ControlChannel`].

use std::sync::Arc;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async_tls_with_config,
    tungstenite::{
        handshake::client::generate_key,
        http::{Request, Uri},
        Message,
    },
    Connector, MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info};

use crate::error::{Result, StreamError};
use crate::live::{ChannelConnector, ControlChannel};

/// WebSocket connection with TLS support and automatic ping/pong.
///
/// Ping frames received from the server are answered with Pong
/// transparently.
pub struct WebSocket {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WebSocket {
    /// Connect to a WebSocket endpoint, sending `headers` with the upgrade
    /// request.
    pub async fn connect(url: &str, headers: &[(String, String)]) -> Result<Self> {
        // Ensure crypto provider is installed
        let _ = rustls::crypto::ring::default_provider().install_default();

        let uri: Uri = url
            .parse()
            .map_err(|e| StreamError::Parse(format!("invalid WebSocket URL {url}: {e}")))?;
        let authority = uri
            .authority()
            .ok_or_else(|| StreamError::Parse(format!("no host in {url}")))?
            .to_string();

        let mut request = Request::builder()
            .method("GET")
            .uri(url)
            .header("Host", authority)
            .header("Connection", "Upgrade")
            .header("Upgrade", "websocket")
            .header("Sec-WebSocket-Version", "13")
            .header("Sec-WebSocket-Key", generate_key());
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }
        let request = request
            .body(())
            .map_err(|e| StreamError::Parse(format!("failed to build WebSocket request: {e}")))?;

        info!("Connecting WebSocket to {}", url);

        let connector = Connector::Rustls(Arc::new(
            rustls::ClientConfig::builder()
                .with_root_certificates({
                    let mut roots = rustls::RootCertStore::empty();
                    let certs = rustls_native_certs::load_native_certs();
                    for cert in certs.certs {
                        let _ = roots.add(cert);
                    }
                    roots
                })
                .with_no_client_auth(),
        ));

        let (stream, response) =
            connect_async_tls_with_config(request, None, false, Some(connector)).await?;

        debug!("WebSocket connected: {:?}", response.status());

        Ok(Self { stream })
    }

    /// Send a text message
    pub async fn send_text(&mut self, text: &str) -> Result<()> {
        self.stream.send(Message::Text(text.to_string())).await?;
        debug!("Sent text: {} bytes", text.len());
        Ok(())
    }

    /// Receive the next application-level message.
    ///
    /// Ping frames are answered automatically with Pong. Pong and raw
    /// Frame messages are silently consumed so the caller only sees
    /// Text, Binary, or Close messages.
    pub async fn recv(&mut self) -> Result<Option<WebSocketMessage>> {
        loop {
            match self.stream.next().await {
                Some(Ok(msg)) => match msg {
                    Message::Text(text) => return Ok(Some(WebSocketMessage::Text(text))),
                    Message::Binary(data) => return Ok(Some(WebSocketMessage::Binary(data))),
                    Message::Ping(data) => {
                        // Auto-respond with pong
                        let _ = self.stream.send(Message::Pong(data)).await;
                    }
                    Message::Pong(_) => debug!("Received pong"),
                    Message::Close(frame) => {
                        info!("WebSocket closed: {:?}", frame);
                        return Ok(Some(WebSocketMessage::Close));
                    }
                    Message::Frame(_) => {}
                },
                Some(Err(e)) => return Err(e.into()),
                None => return Ok(None),
            }
        }
    }
}

#[async_trait]
impl ControlChannel for WebSocket {
    async fn send_text(&mut self, text: &str) -> Result<()> {
        WebSocket::send_text(self, text).await
    }

    async fn recv_text(&mut self) -> Result<Option<String>> {
        match self.recv().await? {
            Some(WebSocketMessage::Text(text)) => Ok(Some(text)),
            Some(WebSocketMessage::Binary(data)) => {
                Ok(Some(String::from_utf8_lossy(&data).into_owned()))
            }
            Some(WebSocketMessage::Close) | None => Ok(None),
        }
    }
}

/// Application-level WebSocket message types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebSocketMessage {
    /// UTF-8 text frame.
    Text(String),
    /// Binary data frame.
    Binary(Vec<u8>),
    /// Connection close frame.
    Close,
}

/// Opens a new [`WebSocket`] to the same URL for every relay attempt.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    url: String,
    headers: Vec<(String, String)>,
}

impl WebSocketConnector {
    pub fn new(url: impl Into<String>, headers: Vec<(String, String)>) -> Self {
        Self {
            url: url.into(),
            headers,
        }
    }
}

#[async_trait]
impl ChannelConnector for WebSocketConnector {
    async fn connect(&self) -> Result<Box<dyn ControlChannel>> {
        let ws = WebSocket::connect(&self.url, &self.headers).await?;
        Ok(Box::new(ws))
    }
}
