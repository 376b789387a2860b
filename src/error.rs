//! Error types for the inspector protocol client.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use inspector_protocol::{Result, SessionId};
//!
//! async fn example(mux: &Arc<Multiplexer>) -> Result<()> {
//!     let network = mux.agent(&SessionId::root(), "Network")?;
//!     network.invoke("enable", json!({})).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`] |
//! | Transport | [`Error::Transport`], [`Error::WebSocket`], [`Error::Io`] |
//! | Protocol | [`Error::Protocol`], [`Error::Json`] |
//! | Local validation | [`Error::InvalidParams`], [`Error::UnknownDomain`], [`Error::UnknownEvent`], [`Error::UnknownCommand`] |
//! | Command outcome | [`Error::Remote`], [`Error::Cancelled`], [`Error::RequestTimeout`] |
//! | Session lifecycle | [`Error::SessionDetached`], [`Error::DuplicateSession`] |
//! | Dispatch | [`Error::ListenerFailed`], [`Error::TooManyPendingCalls`] |

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use serde_json::Value;
use thiserror::Error;
use tokio::sync::oneshot::error::RecvError;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::identifiers::{CallId, SessionId};

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Errors scoped to one command (remote, cancelled, detached, timeout) are
/// only ever delivered through that command's future.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when a component is wired incorrectly, e.g. a second message
    /// handler is registered on a transport.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Transport Errors
    // ========================================================================
    /// Channel unusable.
    ///
    /// Returned by `send` on a closed transport and used to reject every
    /// pending call when the connection is lost.
    #[error("Transport error: {message}")]
    Transport {
        /// Description of the failure.
        message: String,
        /// Protocol error code, when the failure maps to one.
        code: Option<i32>,
    },

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Malformed or unparsable frame.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    /// Command parameters failed local validation.
    ///
    /// Never reaches the wire.
    #[error("Invalid params for {method}: {message}")]
    InvalidParams {
        /// Fully qualified method, e.g. `Network.replayXHR`.
        method: String,
        /// What was wrong.
        message: String,
    },

    /// Domain not present in the schema.
    #[error("Unknown domain: {domain}")]
    UnknownDomain {
        /// The missing domain name.
        domain: String,
    },

    /// Event not declared by its domain.
    #[error("Unknown event: {method}")]
    UnknownEvent {
        /// Fully qualified method name.
        method: String,
    },

    /// Command not declared by its domain.
    #[error("Unknown command: {method}")]
    UnknownCommand {
        /// Fully qualified method name.
        method: String,
    },

    // ========================================================================
    // Command Outcome Errors
    // ========================================================================
    /// The remote side answered with an `error` object.
    #[error("Remote error {code} for {method}: {message}")]
    Remote {
        /// Method of the failed command.
        method: String,
        /// Protocol error code.
        code: i32,
        /// Error message from the remote end.
        message: String,
        /// Optional structured error data.
        data: Option<Value>,
    },

    /// The caller cancelled its own pending command.
    #[error("Command {id} cancelled")]
    Cancelled {
        /// Id of the cancelled call.
        id: CallId,
    },

    /// No response arrived before the deadline.
    #[error("Command {id} timed out after {timeout_ms}ms")]
    RequestTimeout {
        /// Id of the call that timed out.
        id: CallId,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    // ========================================================================
    // Session Errors
    // ========================================================================
    /// The session owning the call was destroyed.
    #[error("Target detached: session {session_id}")]
    SessionDetached {
        /// The destroyed (or never created) session.
        session_id: SessionId,
    },

    /// Session id already registered.
    #[error("Duplicate session: {session_id}")]
    DuplicateSession {
        /// The session id that already exists.
        session_id: SessionId,
    },

    // ========================================================================
    // Dispatch Errors
    // ========================================================================
    /// An event listener reported a failure.
    #[error("Listener failed: {message}")]
    ListenerFailed {
        /// Description of the failure.
        message: String,
    },

    /// Outstanding call limit reached.
    #[error("Too many pending calls (limit {limit})")]
    TooManyPendingCalls {
        /// Configured limit.
        limit: usize,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    /// Channel receive error.
    #[error("Channel closed")]
    ChannelClosed(#[from] RecvError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a transport error without a protocol code.
    #[inline]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            code: None,
        }
    }

    /// Creates a transport error carrying a protocol code.
    #[inline]
    pub fn transport_with_code(message: impl Into<String>, code: i32) -> Self {
        Self::Transport {
            message: message.into(),
            code: Some(code),
        }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates an invalid params error.
    #[inline]
    pub fn invalid_params(method: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParams {
            method: method.into(),
            message: message.into(),
        }
    }

    /// Creates an unknown domain error.
    #[inline]
    pub fn unknown_domain(domain: impl Into<String>) -> Self {
        Self::UnknownDomain {
            domain: domain.into(),
        }
    }

    /// Creates an unknown event error.
    #[inline]
    pub fn unknown_event(method: impl Into<String>) -> Self {
        Self::UnknownEvent {
            method: method.into(),
        }
    }

    /// Creates an unknown command error.
    #[inline]
    pub fn unknown_command(method: impl Into<String>) -> Self {
        Self::UnknownCommand {
            method: method.into(),
        }
    }

    /// Creates a remote error.
    #[inline]
    pub fn remote(
        method: impl Into<String>,
        code: i32,
        message: impl Into<String>,
        data: Option<Value>,
    ) -> Self {
        Self::Remote {
            method: method.into(),
            code,
            message: message.into(),
            data,
        }
    }

    /// Creates a cancelled error.
    #[inline]
    pub fn cancelled(id: CallId) -> Self {
        Self::Cancelled { id }
    }

    /// Creates a request timeout error.
    #[inline]
    pub fn request_timeout(id: CallId, timeout_ms: u64) -> Self {
        Self::RequestTimeout { id, timeout_ms }
    }

    /// Creates a session detached error.
    #[inline]
    pub fn session_detached(session_id: SessionId) -> Self {
        Self::SessionDetached { session_id }
    }

    /// Creates a duplicate session error.
    #[inline]
    pub fn duplicate_session(session_id: SessionId) -> Self {
        Self::DuplicateSession { session_id }
    }

    /// Creates a listener failure.
    #[inline]
    pub fn listener_failed(message: impl Into<String>) -> Self {
        Self::ListenerFailed {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if the channel is unusable.
    #[inline]
    #[must_use]
    pub fn is_transport_error(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. } | Self::WebSocket(_) | Self::Io(_) | Self::ChannelClosed(_)
        )
    }

    /// Returns `true` if the remote end rejected the command.
    #[inline]
    #[must_use]
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote { .. })
    }

    /// Returns `true` if the caller cancelled the command.
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Returns `true` if the owning session went away.
    #[inline]
    #[must_use]
    pub fn is_session_detached(&self) -> bool {
        matches!(self, Self::SessionDetached { .. })
    }

    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::RequestTimeout { .. })
    }

    /// Returns the protocol error code, if any.
    #[inline]
    #[must_use]
    pub fn code(&self) -> Option<i32> {
        match self {
            Self::Remote { code, .. } => Some(*code),
            Self::Transport { code, .. } => *code,
            _ => None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
