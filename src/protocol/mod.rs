//! Protocol message types and schema.
//!
//! This module defines the wire format exchanged with the inspected target
//! and the schema data describing each domain.
//!
//! # Protocol Overview
//!
//! | Message Type | Direction | Purpose |
//! |--------------|-----------|---------|
//! | `Command` | Local → Remote | Method call with correlation id |
//! | `Response` | Remote → Local | Result or error for one command |
//! | `Event` | Remote → Local | Unsolicited domain notification |
//!
//! # Method Naming
//!
//! Commands and events follow `Domain.methodName` format:
//!
//! - `Network.enable`
//! - `Page.loadEventFired`
//! - `Target.attachedToTarget`
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `chunk` | Reassembly of chunked messages |
//! | `message` | Command, Response and Event types |
//! | `schema` | Domain/command/event schema |

// ============================================================================
// Submodules
// ============================================================================

/// Chunked message reassembly.
pub mod chunk;

/// Wire message types.
pub mod message;

/// Protocol schema.
pub mod schema;

// ============================================================================
// Re-exports
// ============================================================================

pub use chunk::ChunkAssembler;
pub use message::{
    CONNECTION_CLOSED_CODE, Command, Event, Incoming, RemoteError, Response,
    STUB_CONNECTION_CODE, split_method,
};
pub use schema::{
    CommandSchema, DomainSchema, EventSchema, ParamSchema, ParamType, Schema, SchemaBuilder,
};
