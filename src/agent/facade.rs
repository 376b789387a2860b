//! Per-domain command facade.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::identifiers::SessionId;
use crate::protocol::DomainSchema;
use crate::session::{Multiplexer, PendingCommand};

// ============================================================================
// Agent
// ============================================================================

/// Sends one domain's commands on one session.
///
/// Parameters are checked against the schema before anything is sent, so
/// a malformed call never reaches the wire.
///
/// # Example
///
/// ```ignore
/// let page = mux.agent(&SessionId::root(), "Page")?;
/// let frame = page.invoke("navigate", json!({ "url": "https://example.com" })).await?;
/// ```
#[derive(Clone)]
pub struct Agent {
    mux: Arc<Multiplexer>,
    session_id: SessionId,
    domain: Arc<DomainSchema>,
}

impl Multiplexer {
    /// Returns the facade for `domain` on a session.
    ///
    /// The session does not have to be live yet; sends fail with
    /// [`Error::SessionDetached`] until it is.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownDomain`] if the schema lacks the domain.
    pub fn agent(self: &Arc<Self>, session_id: &SessionId, domain: &str) -> Result<Agent> {
        let domain = self
            .schema()
            .domain(domain)
            .cloned()
            .ok_or_else(|| Error::unknown_domain(domain))?;

        Ok(Agent {
            mux: Arc::clone(self),
            session_id: session_id.clone(),
            domain,
        })
    }
}

impl Agent {
    /// Returns the domain name.
    #[inline]
    #[must_use]
    pub fn domain(&self) -> &str {
        self.domain.name()
    }

    /// Returns the session this agent sends on.
    #[inline]
    #[must_use]
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Returns `true` if the domain declares `command`.
    #[inline]
    #[must_use]
    pub fn has_command(&self, command: &str) -> bool {
        self.domain.command(command).is_some()
    }

    /// Validates and sends a command.
    ///
    /// # Errors
    ///
    /// - [`Error::UnknownCommand`] if the domain does not declare it
    /// - [`Error::InvalidParams`] if `params` does not match its declaration
    /// - Anything [`Multiplexer::send_command`] returns
    pub fn send(&self, command: &str, params: Value) -> Result<PendingCommand> {
        let Some(schema) = self.domain.command(command) else {
            return Err(Error::unknown_command(format!("{}.{command}", self.domain())));
        };
        schema.validate(&format!("{}.{command}", self.domain()), &params)?;

        self.mux
            .send_command(&self.session_id, self.domain(), command, params)
    }

    /// Sends a command and awaits its result.
    ///
    /// Applies the multiplexer's command timeout when one is configured.
    ///
    /// # Errors
    ///
    /// Everything [`Agent::send`] returns, plus the error that settled the
    /// call.
    pub async fn invoke(&self, command: &str, params: Value) -> Result<Value> {
        let pending = self.send(command, params)?;
        match self.mux.options().command_timeout {
            Some(deadline) => pending.with_timeout(deadline).await,
            None => pending.await,
        }
    }

    /// Sends a command and deserializes its result.
    ///
    /// # Errors
    ///
    /// Everything [`Agent::invoke`] returns, plus [`Error::Json`] if the
    /// result does not match `T`.
    pub async fn invoke_as<T: DeserializeOwned>(&self, command: &str, params: Value) -> Result<T> {
        let result = self.invoke(command, params).await?;
        Ok(serde_json::from_value(result)?)
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("domain", &self.domain())
            .field("session_id", &self.session_id)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
