//! Diagnostics reported by the multiplexer.
//!
//! Malformed frames, orphan messages and failing listeners never surface
//! as errors to a caller. They are reported to a [`DiagnosticsSink`] so the
//! host decides how to log them. [`TracingSink`] is the default.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use tracing::{debug, warn};

use crate::identifiers::{CallId, SessionId};

// ============================================================================
// Constants
// ============================================================================

/// Longest frame excerpt kept in a [`Diagnostic::MalformedFrame`].
const FRAME_EXCERPT_LEN: usize = 256;

// ============================================================================
// Diagnostic
// ============================================================================

/// A non-fatal condition observed while processing traffic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// Frame could not be parsed or classified; it was dropped.
    MalformedFrame {
        /// Why the frame was rejected.
        error: String,
        /// Leading part of the frame.
        excerpt: String,
    },

    /// Response with no matching pending call (late, cancelled or bogus id).
    OrphanResponse {
        /// The response id.
        id: CallId,
        /// The response session.
        session_id: SessionId,
    },

    /// Event for a session that is not live.
    OrphanEvent {
        /// The event session.
        session_id: SessionId,
        /// The event method.
        method: String,
    },

    /// Event for a domain the schema does not declare.
    UnknownDomain {
        /// The event method.
        method: String,
    },

    /// Event its domain does not declare.
    UnspecifiedEvent {
        /// The event method.
        method: String,
    },

    /// A listener returned an error or panicked.
    ListenerFailed {
        /// Session the event was delivered on.
        session_id: SessionId,
        /// The event method.
        method: String,
        /// Error or panic message.
        error: String,
    },

    /// `destroy_session` was called for a session that is not live.
    UnknownSession {
        /// The session id.
        session_id: SessionId,
    },
}

impl Diagnostic {
    /// Builds a malformed-frame diagnostic, keeping a short excerpt.
    #[must_use]
    pub fn malformed(error: impl Into<String>, frame: &str) -> Self {
        let excerpt = match frame.char_indices().nth(FRAME_EXCERPT_LEN) {
            Some((cut, _)) => format!("{}…", &frame[..cut]),
            None => frame.to_string(),
        };
        Self::MalformedFrame {
            error: error.into(),
            excerpt,
        }
    }

    /// Returns `true` for protocol violations (as opposed to orphans).
    #[inline]
    #[must_use]
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            Self::MalformedFrame { .. } | Self::UnknownDomain { .. } | Self::UnspecifiedEvent { .. }
        )
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedFrame { error, excerpt } => {
                write!(f, "Protocol Error: {error}: {excerpt}")
            }
            Self::OrphanResponse { id, session_id } => {
                write!(f, "Response with unknown id {id} (session {session_id})")
            }
            Self::OrphanEvent { session_id, method } => {
                write!(f, "Event {method} for unknown session {session_id}")
            }
            Self::UnknownDomain { method } => {
                write!(f, "Protocol Error: the message {method} is for non-existing domain")
            }
            Self::UnspecifiedEvent { method } => {
                write!(f, "Protocol Error: attempted to dispatch an unspecified method '{method}'")
            }
            Self::ListenerFailed {
                session_id,
                method,
                error,
            } => write!(f, "Listener for {method} on session {session_id} failed: {error}"),
            Self::UnknownSession { session_id } => {
                write!(f, "Cannot destroy unknown session {session_id}")
            }
        }
    }
}

// ============================================================================
// DiagnosticsSink
// ============================================================================

/// Receiver of [`Diagnostic`] reports.
///
/// Called synchronously while a frame is processed; implementations must
/// not block.
pub trait DiagnosticsSink: Send + Sync {
    /// Handles one diagnostic.
    fn report(&self, diagnostic: &Diagnostic);
}

impl<F> DiagnosticsSink for F
where
    F: Fn(&Diagnostic) + Send + Sync,
{
    fn report(&self, diagnostic: &Diagnostic) {
        self(diagnostic);
    }
}

/// Sink that logs through `tracing`.
///
/// Protocol errors and listener failures go to `warn`, orphans to `debug`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DiagnosticsSink for TracingSink {
    fn report(&self, diagnostic: &Diagnostic) {
        match diagnostic {
            Diagnostic::ListenerFailed { .. } => warn!(%diagnostic, "Listener failed"),
            d if d.is_protocol_error() => warn!(diagnostic = %d, "Protocol error"),
            d => debug!(diagnostic = %d, "Dropped message"),
        }
    }
}

// ============================================================================
// Message Observation
// ============================================================================

/// Direction of an observed frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Local → Remote.
    Sent,
    /// Remote → Local.
    Received,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Sent => "frontend",
            Self::Received => "backend",
        })
    }
}

/// Observer invoked for every frame sent or received.
pub type MessageObserver = Box<dyn Fn(Direction, &str) + Send + Sync>;

// ============================================================================
// Tests
// ============================================================================
