//! Stub transport.
//!
//! Used when no inspected target is reachable (hosted mode). Every command
//! is answered with an error carrying [`STUB_CONNECTION_CODE`] and the
//! original command as `data`, so callers fail fast instead of hanging.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use serde_json::{Value, json};
use tracing::warn;

use crate::error::{Error, Result};
use crate::protocol::STUB_CONNECTION_CODE;

use super::handler::{DisconnectHandler, Handlers, MessageHandler};
use super::Transport;

// ============================================================================
// StubTransport
// ============================================================================

/// Transport that rejects every command.
#[derive(Default)]
pub struct StubTransport {
    handlers: Arc<Handlers>,
}

impl StubTransport {
    /// Creates a stub transport.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Transport for StubTransport {
    fn send(&self, frame: String) -> Result<()> {
        if self.handlers.is_closed() {
            return Err(Error::transport("stub transport is closed"));
        }

        let command: Value = match serde_json::from_str(&frame) {
            Ok(command) => command,
            Err(e) => {
                warn!(error = %e, "Stub transport received unparsable frame");
                return Ok(());
            }
        };
        let Some(id) = command.get("id").cloned() else {
            return Ok(());
        };

        let reply = json!({
            "id": id,
            "error": {
                "code": STUB_CONNECTION_CODE,
                "message": "This is a stub connection, can't dispatch message.",
                "data": command,
            }
        });
        self.handlers.deliver(reply.to_string());
        Ok(())
    }

    fn on_message(&self, handler: MessageHandler) -> Result<()> {
        self.handlers.set_message(handler)
    }

    fn on_disconnect(&self, handler: DisconnectHandler) {
        self.handlers.set_disconnect(handler);
    }

    fn close(&self) {
        self.handlers.close("force disconnect");
    }

    fn is_closed(&self) -> bool {
        self.handlers.is_closed()
    }
}

// ============================================================================
// Tests
// ============================================================================
