//! Session multiplexing.
//!
//! One [`Multiplexer`] serves every session sharing a transport. The root
//! session (empty id) is live from construction; child sessions are added
//! explicitly or by auto-attach.
//!
//! | Module | Contents |
//! |--------|----------|
//! | `multiplexer` | [`Multiplexer`]: routing, fan-out, lifecycle |
//! | `pending` | [`PendingCommand`] future and the pending-call table |
//! | `registry` | Live sessions and their listeners |
//! | `diagnostics` | [`Diagnostic`], sinks and frame observation |

// ============================================================================
// Submodules
// ============================================================================

/// Non-fatal condition reporting.
pub mod diagnostics;

/// Session multiplexer.
pub mod multiplexer;

/// Pending-call bookkeeping.
pub mod pending;

/// Session and listener registry.
pub mod registry;

// ============================================================================
// Re-exports
// ============================================================================

pub use diagnostics::{Diagnostic, DiagnosticsSink, Direction, MessageObserver, TracingSink};
pub use multiplexer::{ATTACHED_TO_TARGET, DETACHED_FROM_TARGET, Multiplexer};
pub use pending::{PendingCall, PendingCalls, PendingCommand};
pub use registry::EventListener;
