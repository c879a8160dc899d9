//! Transport seam between a relay and the network.
//!
//! A [`Transport`] opens a connection and hands back a sink for outgoing
//! text frames and a stream of incoming ones. Relays only ever see this
//! pair, so tests can drive a relay through an in-memory transport.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{Sink, SinkExt, Stream, StreamExt, future};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{
    Connector, MaybeTlsStream, WebSocketStream, client_async_tls_with_config,
    connect_async_tls_with_config,
};
use tracing::debug;
use url::Url;

use crate::error::TransportError;

/// Outgoing half of a connection.
pub type FrameSink = Pin<Box<dyn Sink<String, Error = TransportError> + Send>>;

/// Incoming half of a connection. Ends when the remote closes cleanly.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String, TransportError>> + Send>>;

/// Upper bound on a proxy's CONNECT response head.
const MAX_PROXY_RESPONSE: usize = 8 * 1024;

#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(&self, url: &Url) -> Result<(FrameSink, FrameStream), TransportError>;
}

/// HTTP proxy reached with `CONNECT` before the WebSocket handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    pub host: String,
    pub port: u16,
}

impl ProxyConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Open a TCP tunnel to `target` through the proxy.
    pub async fn tunnel(&self, target: &Url) -> Result<TcpStream, TransportError> {
        let host = target
            .host_str()
            .ok_or_else(|| TransportError::Proxy(format!("{} has no host", target)))?;
        let port = target
            .port_or_known_default()
            .ok_or_else(|| TransportError::Proxy(format!("{} has no port", target)))?;
        let authority = format!("{}:{}", host, port);

        let mut stream = TcpStream::connect((self.host.as_str(), self.port))
            .await
            .map_err(|e| TransportError::Proxy(e.to_string()))?;
        let request = format!(
            "CONNECT {} HTTP/1.1\r\nHost: {}\r\n\r\n",
            authority, authority
        );
        stream
            .write_all(request.as_bytes())
            .await
            .map_err(|e| TransportError::Proxy(e.to_string()))?;

        // Byte at a time so nothing past the response head is consumed
        let mut head = Vec::new();
        let mut byte = [0u8; 1];
        while !head.ends_with(b"\r\n\r\n") {
            if head.len() >= MAX_PROXY_RESPONSE {
                return Err(TransportError::Proxy("response head too large".to_string()));
            }
            let read = stream
                .read(&mut byte)
                .await
                .map_err(|e| TransportError::Proxy(e.to_string()))?;
            if read == 0 {
                return Err(TransportError::Proxy(
                    "proxy closed the connection".to_string(),
                ));
            }
            head.push(byte[0]);
        }

        let head = String::from_utf8_lossy(&head);
        let status_line = head.lines().next().unwrap_or_default();
        if status_line.split_whitespace().nth(1) != Some("200") {
            return Err(TransportError::Proxy(format!(
                "tunnel to {} refused: {}",
                authority, status_line
            )));
        }

        debug!("Tunnel to {} open via {}:{}", authority, self.host, self.port);
        Ok(stream)
    }
}

/// TLS and proxy settings for [`WebSocketTransport`].
#[derive(Debug, Clone, Default)]
pub struct WebSocketOptions {
    /// Client TLS config for `wss://`. Defaults to the webpki roots.
    pub tls: Option<Arc<rustls::ClientConfig>>,
    pub proxy: Option<ProxyConfig>,
}

/// WebSocket transport over tokio-tungstenite.
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    connect_timeout: Duration,
    options: WebSocketOptions,
}

impl WebSocketTransport {
    pub fn new(connect_timeout: Duration) -> Self {
        Self::with_options(connect_timeout, WebSocketOptions::default())
    }

    pub fn with_options(connect_timeout: Duration, options: WebSocketOptions) -> Self {
        // Errs when a provider is already installed, which is fine
        let _ = rustls::crypto::ring::default_provider().install_default();
        Self {
            connect_timeout,
            options,
        }
    }

    async fn open(
        &self,
        url: &Url,
    ) -> Result<WebSocketStream<MaybeTlsStream<TcpStream>>, TransportError> {
        let connector = self.options.tls.clone().map(Connector::Rustls);
        let (ws_stream, _response) = match &self.options.proxy {
            Some(proxy) => {
                let tunnel = proxy.tunnel(url).await?;
                client_async_tls_with_config(url.as_str(), tunnel, None, connector).await
            }
            None => connect_async_tls_with_config(url.as_str(), None, false, connector).await,
        }
        .map_err(|e| TransportError::WebSocket(e.to_string()))?;
        Ok(ws_stream)
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn connect(&self, url: &Url) -> Result<(FrameSink, FrameStream), TransportError> {
        let ws_stream = tokio::time::timeout(self.connect_timeout, self.open(url))
            .await
            .map_err(|_| TransportError::Timeout(self.connect_timeout))??;

        let (write, read) = ws_stream.split();

        let sink = write
            .sink_map_err(|e| TransportError::WebSocket(e.to_string()))
            .with(|text: String| future::ready(Ok::<_, TransportError>(Message::text(text))));

        let relay_url = url.to_string();
        let stream = read.filter_map(move |item| {
            let frame = match item {
                Ok(Message::Text(text)) => Some(Ok(text.as_str().to_owned())),
                Ok(Message::Close(frame)) => {
                    debug!("Relay {} sent close frame: {:?}", relay_url, frame);
                    None
                }
                // Ping/pong is answered by tungstenite; binary frames are not part of the protocol
                Ok(_) => None,
                Err(e) => Some(Err(TransportError::WebSocket(e.to_string()))),
            };
            future::ready(frame)
        });

        Ok((Box::pin(sink), Box::pin(stream)))
    }
}
