//! Multiplexer configuration.
//!
//! Provides a type-safe interface for the knobs that change how the
//! multiplexer logs, validates and bounds protocol traffic.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use inspector_protocol::MultiplexerOptions;
//!
//! let options = MultiplexerOptions::new()
//!     .with_dump_protocol_messages()
//!     .with_command_timeout(Duration::from_secs(30))
//!     .with_max_pending_calls(1_000);
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use crate::error::{Error, Result};

// ============================================================================
// MultiplexerOptions
// ============================================================================

/// Multiplexer configuration options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiplexerOptions {
    /// Log every sent and received frame at `debug` level.
    pub dump_protocol_messages: bool,

    /// Do not log remote errors at `warn` level.
    pub suppress_request_errors: bool,

    /// Drop (and report) events whose domain or name is not in the schema.
    pub validate_events: bool,

    /// Create and destroy child sessions on `Target.attachedToTarget` /
    /// `Target.detachedFromTarget`.
    pub auto_attach: bool,

    /// Deadline applied by [`Agent::invoke`](crate::agent::Agent::invoke).
    pub command_timeout: Option<Duration>,

    /// Cap on outstanding calls across all sessions.
    pub max_pending_calls: Option<usize>,
}

// ============================================================================
// Constructors
// ============================================================================

impl MultiplexerOptions {
    /// Creates options with default settings.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            dump_protocol_messages: false,
            suppress_request_errors: false,
            validate_events: true,
            auto_attach: true,
            command_timeout: None,
            max_pending_calls: None,
        }
    }
}

impl Default for MultiplexerOptions {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl MultiplexerOptions {
    /// Enables frame dumping.
    #[inline]
    #[must_use]
    pub fn with_dump_protocol_messages(mut self) -> Self {
        self.dump_protocol_messages = true;
        self
    }

    /// Silences remote error logging.
    #[inline]
    #[must_use]
    pub fn with_suppress_request_errors(mut self) -> Self {
        self.suppress_request_errors = true;
        self
    }

    /// Delivers events regardless of the schema.
    #[inline]
    #[must_use]
    pub fn without_event_validation(mut self) -> Self {
        self.validate_events = false;
        self
    }

    /// Leaves child session management to the host.
    #[inline]
    #[must_use]
    pub fn without_auto_attach(mut self) -> Self {
        self.auto_attach = false;
        self
    }

    /// Sets the default command deadline.
    #[inline]
    #[must_use]
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = Some(timeout);
        self
    }

    /// Caps outstanding calls.
    #[inline]
    #[must_use]
    pub fn with_max_pending_calls(mut self, limit: usize) -> Self {
        self.max_pending_calls = Some(limit);
        self
    }
}

// ============================================================================
// Validation
// ============================================================================

impl MultiplexerOptions {
    /// Validates the options configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for a zero timeout or a zero call limit.
    pub fn validate(&self) -> Result<()> {
        if self.command_timeout.is_some_and(|t| t.is_zero()) {
            return Err(Error::config("command timeout must be greater than zero"));
        }
        if self.max_pending_calls == Some(0) {
            return Err(Error::config("max pending calls must be greater than zero"));
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_creates_default() {
        let options = MultiplexerOptions::new();
        assert!(!options.dump_protocol_messages);
        assert!(!options.suppress_request_errors);
        assert!(options.validate_events);
        assert!(options.auto_attach);
        assert!(options.command_timeout.is_none());
        assert!(options.max_pending_calls.is_none());
        assert_eq!(options, MultiplexerOptions::default());
    }

    #[test]
    fn test_builder_chain() {
        let options = MultiplexerOptions::new()
            .with_dump_protocol_messages()
            .with_suppress_request_errors()
            .without_event_validation()
            .without_auto_attach()
            .with_command_timeout(Duration::from_secs(5))
            .with_max_pending_calls(10);

        assert!(options.dump_protocol_messages);
        assert!(options.suppress_request_errors);
        assert!(!options.validate_events);
        assert!(!options.auto_attach);
        assert_eq!(options.command_timeout, Some(Duration::from_secs(5)));
        assert_eq!(options.max_pending_calls, Some(10));
    }

    #[test]
    fn test_validate() {
        assert!(MultiplexerOptions::new().validate().is_ok());
        assert!(
            MultiplexerOptions::new()
                .with_command_timeout(Duration::ZERO)
                .validate()
                .is_err()
        );
        assert!(
            MultiplexerOptions::new()
                .with_max_pending_calls(0)
                .validate()
                .is_err()
        );
    }
}
