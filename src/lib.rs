//! Inspector Protocol - session-multiplexed remote debugging client.
//!
//! This library speaks a JSON-RPC style debugging protocol (commands,
//! responses and unsolicited events) to an inspected target over a single
//! transport, with any number of debugging sessions multiplexed on it.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────┐   ┌─────────────────────────────┐   ┌───────────┐
//! │  Agent   ├──►│         Multiplexer         ├──►│ Transport ├──► target
//! │  (Page)  │   │  ids · pending · sessions   │◄──┤           │◄──
//! └──────────┘   │  listeners · diagnostics    │   └───────────┘
//!                └─────────────────────────────┘
//! ```
//!
//! Key design principles:
//!
//! - One global monotonic call id counter shared by every session
//! - The root session (empty id) is implicit and never sent on the wire
//! - Inbound frames are processed one at a time, in arrival order
//! - Malformed or orphaned traffic is reported, never raised
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use inspector_protocol::{
//!     FramingOptions, Multiplexer, MultiplexerOptions, Result, Schema, SessionId,
//!     WebSocketTransport,
//! };
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let schema = Schema::from_json(&std::fs::read_to_string("protocol.json")?)?;
//!     let transport =
//!         WebSocketTransport::connect("ws://127.0.0.1:9222/devtools/page/1", FramingOptions::new())
//!             .await?;
//!     let mux = Multiplexer::new(Arc::new(transport), schema, MultiplexerOptions::new())?;
//!
//!     mux.add_listener(&SessionId::root(), "Page", "loadEventFired", |params| {
//!         println!("loaded at {}", params["timestamp"]);
//!         Ok(())
//!     })?;
//!
//!     let page = mux.agent(&SessionId::root(), "Page")?;
//!     page.invoke("enable", json!({})).await?;
//!     page.invoke("navigate", json!({ "url": "https://example.com" })).await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`agent`] | [`Agent`] command facade and [`DomainDispatcher`] |
//! | [`config`] | [`MultiplexerOptions`] |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | Wire messages, schema, chunk reassembly |
//! | [`session`] | [`Multiplexer`], pending calls, diagnostics |
//! | [`transport`] | Channel, stream, WebSocket and stub transports |

// ============================================================================
// Modules
// ============================================================================

/// Typed access to one domain on one session.
///
/// - [`Agent`] - Validates and sends a domain's commands
/// - [`DomainDispatcher`] - Receives a domain's events
pub mod agent;

/// Multiplexer configuration.
pub mod config;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers for calls, sessions and listeners.
///
/// Newtype wrappers prevent mixing incompatible IDs at compile time.
pub mod identifiers;

/// Protocol message types and schema.
pub mod protocol;

/// Session multiplexing.
///
/// Use [`Multiplexer::new`] to attach to a transport.
pub mod session;

/// Transport layer.
///
/// Moves text frames; knows nothing about their content.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Agent types
pub use agent::{Agent, DispatcherHandle, DomainDispatcher};

// Configuration
pub use config::MultiplexerOptions;

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{CallId, ListenerId, SessionId};

// Protocol types
pub use protocol::{ParamSchema, ParamType, Schema, SchemaBuilder};

// Session types
pub use session::{Diagnostic, DiagnosticsSink, Direction, Multiplexer, PendingCommand, TracingSink};

// Transport types
pub use transport::{
    ChannelTransport, Delimiter, FramingOptions, RemoteEnd, StreamTransport, StubTransport,
    Transport, WebSocketTransport,
};
