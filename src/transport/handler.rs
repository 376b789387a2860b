//! Handler slots shared by every transport implementation.
//!
//! A transport has exactly one message consumer and at most one
//! disconnect callback. [`Handlers`] stores both and enforces the closing
//! contract: once [`Handlers::close`] returns, the message handler is never
//! invoked again.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, ReentrantMutex};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::protocol::ChunkAssembler;

// ============================================================================
// Types
// ============================================================================

/// Consumer of inbound frames.
pub type MessageHandler = Box<dyn Fn(String) + Send + Sync>;

/// Called once when the channel is lost or closed, with a reason.
pub type DisconnectHandler = Box<dyn FnOnce(String) + Send>;

// ============================================================================
// Handlers
// ============================================================================

/// Message and disconnect handler slots for one transport.
pub struct Handlers {
    message: Mutex<Option<Arc<MessageHandler>>>,
    disconnect: Mutex<Option<DisconnectHandler>>,
    /// Held for the duration of every delivery. Reentrant so that a handler
    /// may close its own transport.
    gate: ReentrantMutex<()>,
    closed: AtomicBool,
}

impl Default for Handlers {
    fn default() -> Self {
        Self {
            message: Mutex::new(None),
            disconnect: Mutex::new(None),
            gate: ReentrantMutex::new(()),
            closed: AtomicBool::new(false),
        }
    }
}

impl Handlers {
    /// Creates empty slots.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the single message handler.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if a handler is already registered
    /// - [`Error::Transport`] if the transport is closed
    pub fn set_message(&self, handler: MessageHandler) -> Result<()> {
        if self.is_closed() {
            return Err(Error::transport("transport is closed"));
        }
        let mut slot = self.message.lock();
        if slot.is_some() {
            return Err(Error::config("transport already has a message handler"));
        }
        *slot = Some(Arc::new(handler));
        Ok(())
    }

    /// Registers the disconnect callback, replacing any previous one.
    ///
    /// If the transport is already closed the callback runs immediately.
    pub fn set_disconnect(&self, handler: DisconnectHandler) {
        if self.is_closed() {
            handler("transport already closed".to_string());
            return;
        }
        *self.disconnect.lock() = Some(handler);
    }

    /// Returns `true` once a message handler is registered.
    #[inline]
    #[must_use]
    pub fn has_message_handler(&self) -> bool {
        self.message.lock().is_some()
    }

    /// Returns `true` after [`Handlers::close`].
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Hands a frame to the message handler.
    ///
    /// Returns `false` if the frame was dropped (closed, or no handler yet).
    pub fn deliver(&self, frame: String) -> bool {
        let _gate = self.gate.lock();
        if self.is_closed() {
            return false;
        }
        let handler = self.message.lock().clone();
        match handler {
            Some(handler) => {
                handler(frame);
                true
            }
            None => {
                debug!("Frame dropped: no message handler registered");
                false
            }
        }
    }

    /// Closes the slots and fires the disconnect callback.
    ///
    /// Waits for an in-flight delivery on another thread to finish. Returns
    /// `false` if already closed.
    pub fn close(&self, reason: &str) -> bool {
        if self.closed.swap(true, Ordering::SeqCst) {
            return false;
        }
        {
            let _gate = self.gate.lock();
            self.message.lock().take();
        }
        let disconnect = self.disconnect.lock().take();
        if let Some(disconnect) = disconnect {
            disconnect(reason.to_string());
        }
        debug!(reason, "Transport closed");
        true
    }
}

// ============================================================================
// Inbound
// ============================================================================

/// Inbound side of an I/O loop: optional chunk reassembly, then delivery.
pub(crate) struct Inbound {
    handlers: Arc<Handlers>,
    assembler: Option<ChunkAssembler>,
}

impl Inbound {
    pub(crate) fn new(handlers: Arc<Handlers>, chunked: bool) -> Self {
        Self {
            handlers,
            assembler: chunked.then(ChunkAssembler::new),
        }
    }

    /// Processes one raw frame from the wire.
    ///
    /// Plain frames are delivered as they are, even with chunking on. An
    /// envelope that breaks the chunk sequence is delivered unchanged so the
    /// consumer reports it as malformed.
    pub(crate) fn accept(&mut self, frame: String) {
        let Some(assembler) = self.assembler.as_mut() else {
            self.handlers.deliver(frame);
            return;
        };

        if !ChunkAssembler::is_envelope(&frame) {
            self.handlers.deliver(frame);
            return;
        }

        match assembler.push_frame(&frame) {
            Ok(Some(message)) => {
                self.handlers.deliver(message);
            }
            Ok(None) => {}
            Err(e) => {
                warn!(error = %e, "Chunked frame out of sequence");
                self.handlers.deliver(frame);
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_single_message_handler() {
        let handlers = Handlers::new();
        handlers.set_message(Box::new(|_| {})).unwrap();
        let err = handlers.set_message(Box::new(|_| {})).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_no_delivery_after_close() {
        let handlers = Handlers::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        handlers
            .set_message(Box::new(move |_| {
                c.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();

        assert!(handlers.deliver("a".into()));
        assert!(handlers.close("test"));
        assert!(!handlers.deliver("b".into()));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!handlers.close("again"));
    }

    #[test]
    fn test_disconnect_fires_once() {
        let handlers = Handlers::new();
        let reasons = Arc::new(Mutex::new(Vec::new()));
        let r = Arc::clone(&reasons);
        handlers.set_disconnect(Box::new(move |reason| r.lock().push(reason)));

        handlers.close("websocket closed");
        handlers.close("again");
        assert_eq!(*reasons.lock(), vec!["websocket closed".to_string()]);
    }

    #[test]
    fn test_handler_may_close_its_own_transport() {
        let handlers = Arc::new(Handlers::new());
        let inner = Arc::clone(&handlers);
        handlers
            .set_message(Box::new(move |_| {
                inner.close("closed from handler");
            }))
            .unwrap();

        assert!(handlers.deliver("frame".into()));
        assert!(handlers.is_closed());
    }

    fn recording(handlers: &Handlers) -> Arc<Mutex<Vec<String>>> {
        let received = Arc::new(Mutex::new(Vec::new()));
        let r = Arc::clone(&received);
        handlers
            .set_message(Box::new(move |frame| r.lock().push(frame)))
            .unwrap();
        received
    }

    #[test]
    fn test_inbound_reassembles_chunks() {
        let handlers = Arc::new(Handlers::new());
        let received = recording(&handlers);

        let mut inbound = Inbound::new(Arc::clone(&handlers), true);
        inbound.accept(r#"{"messageChunk":"{\"id\"","messageSize":8}"#.into());
        inbound.accept(r#"{"messageChunk":":1}"}"#.into());

        assert_eq!(*received.lock(), vec![r#"{"id":1}"#.to_string()]);
    }

    #[test]
    fn test_inbound_mixes_plain_and_chunked_frames() {
        let handlers = Arc::new(Handlers::new());
        let received = recording(&handlers);

        let mut inbound = Inbound::new(Arc::clone(&handlers), true);
        inbound.accept(r#"{"id":1,"result":{}}"#.into());
        inbound.accept(r#"{"messageChunk":"{\"id\"","messageSize":8}"#.into());
        inbound.accept(r#"{"method":"Page.loadEventFired"}"#.into());
        inbound.accept(r#"{"messageChunk":":2}"}"#.into());
        inbound.accept("garbage".into());

        assert_eq!(
            *received.lock(),
            vec![
                r#"{"id":1,"result":{}}"#.to_string(),
                r#"{"method":"Page.loadEventFired"}"#.to_string(),
                r#"{"id":2}"#.to_string(),
                "garbage".to_string(),
            ]
        );
    }

    #[test]
    fn test_inbound_forwards_out_of_sequence_chunk() {
        let handlers = Arc::new(Handlers::new());
        let received = recording(&handlers);

        let mut inbound = Inbound::new(Arc::clone(&handlers), true);
        let stray = r#"{"messageChunk":"tail"}"#;
        inbound.accept(stray.into());

        assert_eq!(*received.lock(), vec![stray.to_string()]);
    }
}
