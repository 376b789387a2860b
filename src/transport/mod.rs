//! Transport layer.
//!
//! A transport moves UTF-8 text frames between the local end and the
//! inspected target. It knows nothing about the payload: correlation and
//! dispatch live in [`session`](crate::session).
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐                          ┌─────────────────┐
//! │  Multiplexer     │     frames (UTF-8 JSON)  │  Inspected      │
//! │  on_message ◄────┼──────────────────────────┤  target         │
//! │  send ───────────┼─────────────────────────►│                 │
//! └──────────────────┘                          └─────────────────┘
//! ```
//!
//! # Implementations
//!
//! | Module | Type | Channel |
//! |--------|------|---------|
//! | `channel` | [`ChannelTransport`] | In-process pair, synchronous delivery |
//! | `stream` | [`StreamTransport`] | Delimited frames over any async byte stream |
//! | `websocket` | [`WebSocketTransport`] | WebSocket text frames |
//! | `stub` | [`StubTransport`] | Answers every command with an error |
//!
//! No retries happen at this layer; reconnecting is up to the host.

// ============================================================================
// Submodules
// ============================================================================

/// In-process transport pair.
pub mod channel;

/// Handler slots shared by implementations.
pub mod handler;

/// Delimited byte-stream transport.
pub mod stream;

/// Stub transport for hosted mode and tests.
pub mod stub;

/// WebSocket transport.
pub mod websocket;

// ============================================================================
// Imports
// ============================================================================

use crate::error::Result;

// ============================================================================
// Re-exports
// ============================================================================

pub use channel::{ChannelTransport, RemoteEnd};
pub use handler::{DisconnectHandler, Handlers, MessageHandler};
pub use stream::{Delimiter, FramingOptions, StreamTransport};
pub use stub::StubTransport;
pub use websocket::WebSocketTransport;

// ============================================================================
// Transport
// ============================================================================

/// Bidirectional text-frame channel to the inspected target.
///
/// # Contract
///
/// - Exactly one message handler per instance.
/// - After [`Transport::close`] returns, the message handler is never
///   invoked again and [`Transport::send`] fails.
/// - The disconnect handler fires once, whether the remote end went away or
///   the transport was closed locally.
pub trait Transport: Send + Sync {
    /// Queues a frame for sending.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`](crate::Error::Transport) if the channel is
    /// closed.
    fn send(&self, frame: String) -> Result<()>;

    /// Registers the single consumer of inbound frames.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`](crate::Error::Config) if a handler is
    /// already registered.
    fn on_message(&self, handler: MessageHandler) -> Result<()>;

    /// Registers the disconnect callback.
    fn on_disconnect(&self, handler: DisconnectHandler);

    /// Shuts the channel down.
    fn close(&self);

    /// Returns `true` once the channel is unusable.
    fn is_closed(&self) -> bool;
}
