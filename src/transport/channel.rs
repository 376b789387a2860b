//! In-process transport pair.
//!
//! [`ChannelTransport::pair`] returns the transport handed to the
//! multiplexer and a [`RemoteEnd`] standing in for the inspected target.
//! Inbound frames are delivered synchronously on the thread that calls
//! [`RemoteEnd::deliver`], which makes the pair suitable for hosts that
//! marshal I/O onto their own event loop, and for deterministic tests.
//!
//! # Example
//!
//! ```ignore
//! let (transport, mut remote) = ChannelTransport::pair();
//! let mux = Multiplexer::new(Arc::new(transport), schema, MultiplexerOptions::new())?;
//!
//! let pending = mux.send_command(&SessionId::root(), "Page", "enable", json!({}))?;
//! let command = remote.next_command().unwrap();
//! remote.deliver(format!(r#"{{"id":{},"result":{{}}}}"#, command.id));
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::trace;

use crate::error::{Error, Result};
use crate::protocol::Command;

use super::handler::{DisconnectHandler, Handlers, MessageHandler};
use super::Transport;

// ============================================================================
// ChannelTransport
// ============================================================================

/// Local half of an in-process transport pair.
pub struct ChannelTransport {
    handlers: Arc<Handlers>,
    outbound: mpsc::UnboundedSender<String>,
}

impl ChannelTransport {
    /// Creates a connected transport/remote pair.
    #[must_use]
    pub fn pair() -> (Self, RemoteEnd) {
        let handlers = Arc::new(Handlers::new());
        let (outbound, sent) = mpsc::unbounded_channel();

        let transport = Self {
            handlers: Arc::clone(&handlers),
            outbound,
        };
        let remote = RemoteEnd { handlers, sent };

        (transport, remote)
    }
}

impl Transport for ChannelTransport {
    fn send(&self, frame: String) -> Result<()> {
        if self.handlers.is_closed() {
            return Err(Error::transport("channel transport is closed"));
        }
        trace!(len = frame.len(), "Channel frame sent");
        self.outbound
            .send(frame)
            .map_err(|_| Error::transport("remote end dropped"))
    }

    fn on_message(&self, handler: MessageHandler) -> Result<()> {
        self.handlers.set_message(handler)
    }

    fn on_disconnect(&self, handler: DisconnectHandler) {
        self.handlers.set_disconnect(handler);
    }

    fn close(&self) {
        self.handlers.close("closed locally");
    }

    fn is_closed(&self) -> bool {
        self.handlers.is_closed()
    }
}

// ============================================================================
// RemoteEnd
// ============================================================================

/// Remote half of an in-process transport pair.
pub struct RemoteEnd {
    handlers: Arc<Handlers>,
    sent: mpsc::UnboundedReceiver<String>,
}

impl RemoteEnd {
    /// Delivers an inbound frame to the local message handler.
    ///
    /// Runs the handler on the calling thread. Returns `false` if the frame
    /// was dropped because the transport is closed or has no handler.
    pub fn deliver(&self, frame: impl Into<String>) -> bool {
        self.handlers.deliver(frame.into())
    }

    /// Takes the next frame sent by the local end, if any.
    pub fn try_next_frame(&mut self) -> Option<String> {
        self.sent.try_recv().ok()
    }

    /// Waits for the next frame sent by the local end.
    ///
    /// Returns `None` once the local transport is dropped.
    pub async fn next_frame(&mut self) -> Option<String> {
        self.sent.recv().await
    }

    /// Takes and parses the next sent frame as a [`Command`].
    pub fn next_command(&mut self) -> Option<Command> {
        let frame = self.try_next_frame()?;
        serde_json::from_str(&frame).ok()
    }

    /// Drains every frame sent so far.
    pub fn drain_frames(&mut self) -> Vec<String> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.sent.try_recv() {
            frames.push(frame);
        }
        frames
    }

    /// Simulates the remote end going away.
    pub fn disconnect(&self, reason: &str) {
        self.handlers.close(reason);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use parking_lot::Mutex;

    #[test]
    fn test_frames_flow_both_ways() {
        let (transport, mut remote) = ChannelTransport::pair();
        let received = Arc::new(Mutex::new(Vec::new()));
        let r = Arc::clone(&received);
        transport
            .on_message(Box::new(move |frame| r.lock().push(frame)))
            .unwrap();

        transport.send("out".into()).unwrap();
        assert_eq!(remote.try_next_frame().as_deref(), Some("out"));

        assert!(remote.deliver("in"));
        assert_eq!(*received.lock(), vec!["in".to_string()]);
    }

    #[test]
    fn test_send_after_close_fails() {
        let (transport, _remote) = ChannelTransport::pair();
        transport.close();
        assert!(transport.is_closed());
        assert!(transport.send("x".into()).unwrap_err().is_transport_error());
    }

    #[test]
    fn test_remote_disconnect_notifies() {
        let (transport, remote) = ChannelTransport::pair();
        let reason = Arc::new(Mutex::new(None));
        let r = Arc::clone(&reason);
        transport.on_disconnect(Box::new(move |why| *r.lock() = Some(why)));

        remote.disconnect("websocket closed");
        assert_eq!(reason.lock().as_deref(), Some("websocket closed"));
        assert!(transport.is_closed());
    }

    #[test]
    fn test_next_command_parses() {
        let (transport, mut remote) = ChannelTransport::pair();
        transport
            .send(r#"{"id":3,"method":"Page.enable"}"#.into())
            .unwrap();
        let command = remote.next_command().unwrap();
        assert_eq!(command.id.as_u64(), 3);
        assert_eq!(command.method, "Page.enable");
    }
}
