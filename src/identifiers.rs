//! Type-safe identifiers for protocol entities.
//!
//! Newtype wrappers keep call ids, session ids and listener tokens from
//! being mixed up at compile time.
//!
//! | Type | Wire form | Description |
//! |------|-----------|-------------|
//! | [`CallId`] | `"id": 7` | Command/response correlation id |
//! | [`SessionId`] | `"sessionId": "AB12"` | Attach point; empty for the root session |
//! | [`ListenerId`] | none | Token returned when a listener is registered |

// ============================================================================
// Imports
// ============================================================================

use std::borrow::Borrow;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

// ============================================================================
// CallId
// ============================================================================

/// Identifier correlating a command with its response.
///
/// Allocated from a monotonically increasing counter owned by the
/// multiplexer; never reused while the connection lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallId(u64);

impl CallId {
    /// Wraps a raw id.
    #[inline]
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw id.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonic [`CallId`] allocator.
///
/// Starts at 1; 0 is never handed out.
#[derive(Debug)]
pub struct CallIdGenerator {
    next: AtomicU64,
}

impl CallIdGenerator {
    /// Creates a generator whose first id is 1.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Allocates the next id.
    #[inline]
    pub fn next_id(&self) -> CallId {
        CallId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for CallIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// SessionId
// ============================================================================

/// Identifier of one attach point to an inspectable target.
///
/// The root (flat) session has the empty id and is written to the wire by
/// omitting `sessionId` altogether.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Creates a session id.
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the root session id.
    #[inline]
    #[must_use]
    pub const fn root() -> Self {
        Self(String::new())
    }

    /// Returns `true` for the root session.
    #[inline]
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the id as a string slice (empty for root).
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `None` for the root session, for wire serialization.
    #[inline]
    #[must_use]
    pub fn as_wire(&self) -> Option<&str> {
        if self.is_root() { None } else { Some(&self.0) }
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            f.write_str("<root>")
        } else {
            f.write_str(&self.0)
        }
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for SessionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<Option<String>> for SessionId {
    fn from(id: Option<String>) -> Self {
        id.map(Self).unwrap_or_default()
    }
}

impl Borrow<str> for SessionId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// ListenerId
// ============================================================================

/// Process-wide counter for listener tokens.
static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

/// Token identifying a registered event listener.
///
/// Closures cannot be compared, so removal goes through this token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl ListenerId {
    /// Allocates a fresh, never-reused token.
    #[inline]
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

// ============================================================================
// Tests
// ============================================================================
