//! Typed access to one domain on one session.
//!
//! | Type | Direction |
//! |------|-----------|
//! | [`Agent`] | Commands: validate against the schema, then send |
//! | [`DomainDispatcher`] | Events: one object receives a whole domain |

// ============================================================================
// Submodules
// ============================================================================

/// Domain-wide event dispatchers.
pub mod dispatcher;

/// Per-domain command facade.
pub mod facade;

// ============================================================================
// Re-exports
// ============================================================================

pub use dispatcher::{DispatcherHandle, DomainDispatcher};
pub use facade::Agent;
