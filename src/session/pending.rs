//! Pending-call table and the future handed back to callers.
//!
//! Every command sent through the multiplexer leaves a [`PendingCall`] in
//! the table until one of four things happens:
//!
//! | Event | Outcome of the future |
//! |-------|-----------------------|
//! | Matching response | `Ok(result)` or [`Error::Remote`] |
//! | Session destroyed | [`Error::SessionDetached`] |
//! | [`PendingCommand::cancel`] | [`Error::Cancelled`] |
//! | Transport lost | [`Error::Transport`] |
//!
//! Dropping an unsettled [`PendingCommand`] removes its entry silently; a
//! late response for it is then an orphan.

// ============================================================================
// Imports
// ============================================================================

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::time::timeout;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::identifiers::{CallId, SessionId};
use crate::protocol::CONNECTION_CLOSED_CODE;

// ============================================================================
// Types
// ============================================================================

/// Channel half that settles one command.
type Settle = oneshot::Sender<Result<Value>>;

/// Pending-call table shared between the multiplexer and its futures.
pub(crate) type SharedPendingCalls = Arc<Mutex<PendingCalls>>;

// ============================================================================
// PendingCall
// ============================================================================

/// Bookkeeping for one outstanding command.
#[derive(Debug)]
pub struct PendingCall {
    /// Correlation id.
    pub id: CallId,
    /// Session the command was sent on.
    pub session_id: SessionId,
    /// Fully qualified method.
    pub method: String,
    /// When the command was handed to the transport.
    pub sent_at: Instant,
    settle: Settle,
}

impl PendingCall {
    pub(crate) fn new(id: CallId, session_id: SessionId, method: String, settle: Settle) -> Self {
        Self {
            id,
            session_id,
            method,
            sent_at: Instant::now(),
            settle,
        }
    }

    /// Settles the caller's future. A dropped receiver is ignored.
    pub(crate) fn settle(self, result: Result<Value>) {
        trace!(
            id = %self.id,
            method = %self.method,
            elapsed_us = self.sent_at.elapsed().as_micros() as u64,
            ok = result.is_ok(),
            "Call settled"
        );
        let _ = self.settle.send(result);
    }
}

// ============================================================================
// PendingCalls
// ============================================================================

/// Outstanding calls keyed by id.
#[derive(Debug, Default)]
pub struct PendingCalls {
    calls: FxHashMap<CallId, PendingCall>,
    /// Set once the transport is lost; no further inserts are accepted.
    closed: Option<String>,
}

impl PendingCalls {
    /// Creates an empty, open table.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of outstanding calls.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.calls.len()
    }

    /// Returns `true` if nothing is outstanding.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Returns the number of outstanding calls on one session.
    #[must_use]
    pub fn len_for(&self, session_id: &SessionId) -> usize {
        self.calls
            .values()
            .filter(|call| &call.session_id == session_id)
            .count()
    }

    /// Returns `true` if `id` is outstanding.
    #[inline]
    #[must_use]
    pub fn contains(&self, id: CallId) -> bool {
        self.calls.contains_key(&id)
    }

    /// Returns `true` once the table has been closed.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.is_some()
    }

    /// Records a call.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] with the connection-closed code if the
    /// table was closed.
    pub(crate) fn insert(&mut self, call: PendingCall) -> Result<()> {
        if let Some(reason) = &self.closed {
            return Err(Error::transport_with_code(
                format!("Connection is closed ({reason}), can't dispatch {}", call.method),
                CONNECTION_CLOSED_CODE,
            ));
        }
        self.calls.insert(call.id, call);
        Ok(())
    }

    /// Removes and returns a call.
    pub(crate) fn take(&mut self, id: CallId) -> Option<PendingCall> {
        self.calls.remove(&id)
    }

    /// Removes and returns every call of one session, in id order.
    pub(crate) fn take_session(&mut self, session_id: &SessionId) -> Vec<PendingCall> {
        let ids: Vec<CallId> = self
            .calls
            .values()
            .filter(|call| &call.session_id == session_id)
            .map(|call| call.id)
            .collect();
        let mut taken: Vec<PendingCall> =
            ids.into_iter().filter_map(|id| self.calls.remove(&id)).collect();
        taken.sort_by_key(|call| call.id);
        taken
    }

    /// Closes the table and returns every outstanding call, in id order.
    ///
    /// Returns nothing if already closed.
    pub(crate) fn close(&mut self, reason: &str) -> Vec<PendingCall> {
        if self.closed.is_some() {
            return Vec::new();
        }
        self.closed = Some(reason.to_string());
        let mut taken: Vec<PendingCall> = self.calls.drain().map(|(_, call)| call).collect();
        taken.sort_by_key(|call| call.id);
        taken
    }
}

// ============================================================================
// PendingCommand
// ============================================================================

/// Future for the outcome of one command.
///
/// Resolves to the command's `result` object or to the error that settled
/// it. Supports local cancellation; nothing is sent to the remote end.
#[must_use = "dropping a PendingCommand discards the command's outcome"]
pub struct PendingCommand {
    id: CallId,
    method: String,
    receiver: oneshot::Receiver<Result<Value>>,
    table: Weak<Mutex<PendingCalls>>,
    settled: bool,
}

impl PendingCommand {
    pub(crate) fn new(
        id: CallId,
        method: String,
        receiver: oneshot::Receiver<Result<Value>>,
        table: &SharedPendingCalls,
    ) -> Self {
        Self {
            id,
            method,
            receiver,
            table: Arc::downgrade(table),
            settled: false,
        }
    }

    /// Returns the correlation id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> CallId {
        self.id
    }

    /// Returns the fully qualified method.
    #[inline]
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Returns `true` while the call is still in the pending-call table.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.table
            .upgrade()
            .is_some_and(|table| table.lock().contains(self.id))
    }

    /// Cancels the call locally.
    ///
    /// Removes the pending entry and settles this future with
    /// [`Error::Cancelled`]. A response arriving later is dropped as an
    /// orphan. Returns `false` if the call had already settled.
    pub fn cancel(&self) -> bool {
        let Some(table) = self.table.upgrade() else {
            return false;
        };
        let call = table.lock().take(self.id);
        match call {
            Some(call) => {
                debug!(id = %self.id, method = %self.method, "Command cancelled");
                call.settle(Err(Error::cancelled(self.id)));
                true
            }
            None => false,
        }
    }

    /// Awaits the outcome with a deadline.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RequestTimeout`] if the deadline passes first; the
    /// call is cancelled locally.
    pub async fn with_timeout(mut self, deadline: Duration) -> Result<Value> {
        match timeout(deadline, &mut self).await {
            Ok(result) => result,
            Err(_) => {
                self.cancel();
                Err(Error::request_timeout(self.id, deadline.as_millis() as u64))
            }
        }
    }
}

impl Future for PendingCommand {
    type Output = Result<Value>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut *self;
        match Pin::new(&mut this.receiver).poll(cx) {
            Poll::Ready(outcome) => {
                this.settled = true;
                Poll::Ready(outcome.unwrap_or_else(|e| Err(Error::from(e))))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for PendingCommand {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        if let Some(table) = self.table.upgrade()
            && table.lock().take(self.id).is_some()
        {
            trace!(id = %self.id, "Unawaited command dropped");
        }
    }
}

impl std::fmt::Debug for PendingCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingCommand")
            .field("id", &self.id)
            .field("method", &self.method)
            .field("settled", &self.settled)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
