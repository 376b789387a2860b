//! WebSocket transport.
//!
//! Connects to a remote debugging endpoint such as
//! `ws://127.0.0.1:9222/devtools/page/<id>` and exchanges one protocol
//! message per text frame.
//!
//! # Connection Lifecycle
//!
//! 1. `WebSocketTransport::connect` - Validate URL, open the socket
//! 2. `Transport::on_message` - Register the consumer, start the I/O loop
//! 3. `Transport::send` - Queue frames (before or after start)
//! 4. `Transport::close` - Send a close frame and stop

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, trace, warn};
use url::Url;

use crate::error::{Error, Result};

use super::handler::{DisconnectHandler, Handlers, Inbound, MessageHandler};
use super::stream::{FramingOptions, Outbound};
use super::Transport;

// ============================================================================
// WebSocketTransport
// ============================================================================

/// Transport over a WebSocket connection.
pub struct WebSocketTransport {
    handlers: Arc<Handlers>,
    outbound: mpsc::UnboundedSender<Outbound>,
    start: Mutex<Option<oneshot::Sender<()>>>,
}

impl WebSocketTransport {
    /// Connects to a `ws://` or `wss://` endpoint.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the URL is invalid or not a WebSocket URL
    /// - [`Error::WebSocket`] if the connection or handshake fails
    pub async fn connect(url: &str, options: FramingOptions) -> Result<Self> {
        let parsed = parse_ws_url(url)?;

        let (ws_stream, _response) = tokio_tungstenite::connect_async(parsed.as_str()).await?;

        info!(url = %parsed, "WebSocket connection established");

        Ok(Self::from_stream(ws_stream, options))
    }

    /// Wraps an established WebSocket stream.
    ///
    /// Must be called within a tokio runtime.
    pub fn from_stream<S>(ws_stream: WebSocketStream<S>, options: FramingOptions) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let handlers = Arc::new(Handlers::new());
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (start_tx, start_rx) = oneshot::channel();

        tokio::spawn(run_event_loop(
            ws_stream,
            outbound_rx,
            start_rx,
            Arc::clone(&handlers),
            options,
        ));

        Self {
            handlers,
            outbound,
            start: Mutex::new(Some(start_tx)),
        }
    }
}

impl Transport for WebSocketTransport {
    fn send(&self, frame: String) -> Result<()> {
        if self.handlers.is_closed() {
            return Err(Error::transport("WebSocket transport is closed"));
        }
        self.outbound
            .send(Outbound::Frame(frame))
            .map_err(|_| Error::transport("WebSocket event loop terminated"))
    }

    fn on_message(&self, handler: MessageHandler) -> Result<()> {
        self.handlers.set_message(handler)?;
        if let Some(start) = self.start.lock().take() {
            let _ = start.send(());
        }
        Ok(())
    }

    fn on_disconnect(&self, handler: DisconnectHandler) {
        self.handlers.set_disconnect(handler);
    }

    fn close(&self) {
        self.handlers.close("force disconnect");
        self.start.lock().take();
        let _ = self.outbound.send(Outbound::Shutdown);
    }

    fn is_closed(&self) -> bool {
        self.handlers.is_closed()
    }
}

/// Validates a WebSocket endpoint URL.
fn parse_ws_url(url: &str) -> Result<Url> {
    let parsed =
        Url::parse(url).map_err(|e| Error::config(format!("invalid WebSocket URL '{url}': {e}")))?;
    match parsed.scheme() {
        "ws" | "wss" => Ok(parsed),
        scheme => Err(Error::config(format!(
            "unsupported URL scheme '{scheme}', expected ws or wss"
        ))),
    }
}

// ============================================================================
// Event Loop
// ============================================================================

/// Event loop that handles WebSocket I/O.
async fn run_event_loop<S>(
    ws_stream: WebSocketStream<S>,
    mut outbound_rx: mpsc::UnboundedReceiver<Outbound>,
    start_rx: oneshot::Receiver<()>,
    handlers: Arc<Handlers>,
    options: FramingOptions,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut ws_write, mut ws_read) = ws_stream.split();

    if start_rx.await.is_err() {
        debug!("WebSocket transport closed before start");
        let _ = ws_write.close().await;
        return;
    }

    let mut inbound = Inbound::new(Arc::clone(&handlers), options.chunked);

    let reason = loop {
        tokio::select! {
            // Incoming frames from the target
            message = ws_read.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        trace!(len = text.len(), "WebSocket frame received");
                        inbound.accept(text.as_str().to_owned());
                    }

                    Some(Ok(Message::Binary(data))) => match String::from_utf8(data.to_vec()) {
                        Ok(frame) => inbound.accept(frame),
                        Err(e) => warn!(error = %e, "Dropping non UTF-8 binary frame"),
                    },

                    Some(Ok(Message::Close(_))) => {
                        debug!("WebSocket closed by remote");
                        break "websocket closed";
                    }

                    Some(Err(e)) => {
                        error!(error = %e, "WebSocket error");
                        break "websocket error";
                    }

                    None => {
                        debug!("WebSocket stream ended");
                        break "websocket stream ended";
                    }

                    // Ignore Ping, Pong, Frame
                    _ => {}
                }
            }

            // Frames from the local end
            outbound = outbound_rx.recv() => {
                match outbound {
                    Some(Outbound::Frame(frame)) => {
                        if let Err(e) = ws_write.send(Message::Text(frame.into())).await {
                            error!(error = %e, "WebSocket send failed");
                            break "websocket send failed";
                        }
                    }

                    Some(Outbound::Shutdown) | None => {
                        debug!("Shutdown command received");
                        let _ = ws_write.close().await;
                        break "force disconnect";
                    }
                }
            }
        }
    };

    handlers.close(reason);
    debug!(reason, "WebSocket event loop terminated");
}

// ============================================================================
// Tests
// ============================================================================
