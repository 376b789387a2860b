//! Session multiplexer.
//!
//! Owns one [`Transport`] and multiplexes any number of sessions over it.
//!
//! # Message Flow
//!
//! ```text
//! send_command ──► PendingCalls.insert ──► Transport::send
//!
//! Transport ──► inbox ──► parse ─┬─ Response ──► PendingCalls.take ──► settle
//!                                └─ Event ────► listeners (registration order)
//! ```
//!
//! # Ordering
//!
//! Inbound frames are processed one at a time in arrival order. A frame
//! that arrives while another is being processed (for example a stub reply
//! produced inside a listener) is queued and handled once the current
//! frame's fan-out completes.
//!
//! # Locks
//!
//! `sessions` is always taken before `pending`. Neither is held while a
//! listener, the diagnostics sink, the message observer or the transport
//! runs.

// ============================================================================
// Imports
// ============================================================================

use std::any::Any;
use std::collections::VecDeque;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, info, trace, warn};

use crate::config::MultiplexerOptions;
use crate::error::{Error, Result};
use crate::identifiers::{CallId, CallIdGenerator, ListenerId, SessionId};
use crate::protocol::{
    CONNECTION_CLOSED_CODE, Command, Event, Incoming, Response, STUB_CONNECTION_CODE, Schema,
};
use crate::transport::Transport;

use super::diagnostics::{Diagnostic, DiagnosticsSink, Direction, MessageObserver, TracingSink};
use super::pending::{PendingCall, PendingCalls, PendingCommand, SharedPendingCalls};
use super::registry::{EventListener, SessionTable};

// ============================================================================
// Constants
// ============================================================================

/// Event announcing a new child session.
pub const ATTACHED_TO_TARGET: &str = "Target.attachedToTarget";

/// Event announcing a child session went away.
pub const DETACHED_FROM_TARGET: &str = "Target.detachedFromTarget";

// ============================================================================
// Inbox
// ============================================================================

/// Frames waiting to be processed.
#[derive(Default)]
struct Inbox {
    queue: VecDeque<String>,
    draining: bool,
}

/// Clears the draining flag if frame processing unwinds.
struct DrainGuard<'a> {
    inbox: &'a Mutex<Inbox>,
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.inbox.lock().draining = false;
        }
    }
}

// ============================================================================
// Multiplexer
// ============================================================================

/// Routes commands, responses and events for every session sharing one
/// transport.
///
/// # Example
///
/// ```ignore
/// let (transport, remote) = ChannelTransport::pair();
/// let mux = Multiplexer::new(Arc::new(transport), schema, MultiplexerOptions::new())?;
///
/// mux.add_listener(&SessionId::root(), "Page", "loadEventFired", |params| {
///     println!("loaded: {params}");
///     Ok(())
/// })?;
///
/// let frame = mux.send_command(&SessionId::root(), "Page", "navigate", json!({ "url": url }))?;
/// let result = frame.await?;
/// ```
pub struct Multiplexer {
    /// Underlying transport.
    transport: Arc<dyn Transport>,

    /// Protocol schema.
    schema: Arc<Schema>,

    /// Behaviour knobs.
    options: MultiplexerOptions,

    /// Source of call ids, shared by every session.
    ids: CallIdGenerator,

    /// Live sessions and their listeners.
    sessions: Mutex<SessionTable>,

    /// Outstanding calls.
    pending: SharedPendingCalls,

    /// Inbound frames awaiting processing.
    inbox: Mutex<Inbox>,

    /// Receiver of diagnostics.
    sink: Arc<dyn DiagnosticsSink>,

    /// Optional frame observer.
    observer: RwLock<Option<Arc<MessageObserver>>>,
}

// ============================================================================
// Multiplexer - Constructor
// ============================================================================

impl Multiplexer {
    /// Creates a multiplexer that reports diagnostics through `tracing`.
    ///
    /// Registers itself as the transport's message and disconnect handler.
    /// The root session is live immediately.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the options are invalid or the transport
    ///   already has a message handler
    /// - [`Error::Transport`] if the transport is already closed
    pub fn new(
        transport: Arc<dyn Transport>,
        schema: Schema,
        options: MultiplexerOptions,
    ) -> Result<Arc<Self>> {
        Self::with_sink(transport, schema, options, Arc::new(TracingSink))
    }

    /// Creates a multiplexer with a custom diagnostics sink.
    ///
    /// # Errors
    ///
    /// Same as [`Multiplexer::new`].
    pub fn with_sink(
        transport: Arc<dyn Transport>,
        schema: Schema,
        options: MultiplexerOptions,
        sink: Arc<dyn DiagnosticsSink>,
    ) -> Result<Arc<Self>> {
        options.validate()?;

        let mux = Arc::new(Self {
            transport,
            schema: Arc::new(schema),
            options,
            ids: CallIdGenerator::new(),
            sessions: Mutex::new(SessionTable::new()),
            pending: Arc::new(Mutex::new(PendingCalls::new())),
            inbox: Mutex::new(Inbox::default()),
            sink,
            observer: RwLock::new(None),
        });

        let weak: Weak<Self> = Arc::downgrade(&mux);
        mux.transport.on_message(Box::new(move |frame| {
            if let Some(mux) = weak.upgrade() {
                mux.handle_incoming_message(frame);
            }
        }))?;

        let weak: Weak<Self> = Arc::downgrade(&mux);
        mux.transport.on_disconnect(Box::new(move |reason| {
            if let Some(mux) = weak.upgrade() {
                mux.handle_disconnect(&reason);
            }
        }));

        debug!(domains = mux.schema.len(), "Multiplexer created");
        Ok(mux)
    }
}

// ============================================================================
// Multiplexer - Accessors
// ============================================================================

impl Multiplexer {
    /// Returns the protocol schema.
    #[inline]
    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Returns the options.
    #[inline]
    #[must_use]
    pub fn options(&self) -> &MultiplexerOptions {
        &self.options
    }

    /// Returns `true` if the session is live.
    #[must_use]
    pub fn has_session(&self, session_id: &SessionId) -> bool {
        self.sessions.lock().contains(session_id)
    }

    /// Returns the live session ids, in no particular order.
    #[must_use]
    pub fn session_ids(&self) -> Vec<SessionId> {
        self.sessions.lock().ids()
    }

    /// Returns the number of listeners on a session.
    #[must_use]
    pub fn listener_count(&self, session_id: &SessionId) -> usize {
        self.sessions.lock().listener_count(session_id)
    }

    /// Returns the number of outstanding calls.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Returns the number of outstanding calls on one session.
    #[must_use]
    pub fn pending_count_for(&self, session_id: &SessionId) -> usize {
        self.pending.lock().len_for(session_id)
    }

    /// Returns `true` once the transport is gone.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.pending.lock().is_closed() || self.transport.is_closed()
    }

    /// Installs an observer called with every frame sent or received.
    ///
    /// Replaces any previous observer.
    pub fn set_message_observer<F>(&self, observer: F)
    where
        F: Fn(Direction, &str) + Send + Sync + 'static,
    {
        let observer: MessageObserver = Box::new(observer);
        *self.observer.write() = Some(Arc::new(observer));
    }

    /// Removes the message observer.
    pub fn clear_message_observer(&self) {
        *self.observer.write() = None;
    }
}

// ============================================================================
// Multiplexer - Sessions
// ============================================================================

impl Multiplexer {
    /// Registers a session so its traffic is routed.
    ///
    /// Creating the root session again is allowed after it was destroyed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateSession`] if the session is already live.
    pub fn create_session(&self, session_id: impl Into<SessionId>) -> Result<()> {
        let session_id = session_id.into();
        self.sessions.lock().create(session_id.clone())?;
        debug!(session_id = %session_id, "Session created");
        Ok(())
    }

    /// Tears a session down.
    ///
    /// Every outstanding call on it fails with [`Error::SessionDetached`]
    /// and its listeners are discarded. Later traffic for the session is
    /// dropped as orphaned. Destroying an unknown session is reported as a
    /// diagnostic and otherwise ignored.
    pub fn destroy_session(&self, session_id: &SessionId) {
        let (entry, calls) = {
            let mut sessions = self.sessions.lock();
            match sessions.remove(session_id) {
                Some(entry) => (entry, self.pending.lock().take_session(session_id)),
                None => {
                    drop(sessions);
                    self.report(Diagnostic::UnknownSession {
                        session_id: session_id.clone(),
                    });
                    return;
                }
            }
        };

        let rejected = calls.len();
        for call in calls {
            call.settle(Err(Error::session_detached(session_id.clone())));
        }

        debug!(
            session_id = %session_id,
            rejected,
            listeners = entry.listener_count(),
            "Session destroyed"
        );
        drop(entry);
    }
}

// ============================================================================
// Multiplexer - Commands
// ============================================================================

impl Multiplexer {
    /// Sends `domain.command` on a session.
    ///
    /// The returned future settles with the response's `result`, or with
    /// the error that ended the call. Ids are unique across all sessions.
    ///
    /// # Errors
    ///
    /// - [`Error::SessionDetached`] if the session is not live
    /// - [`Error::TooManyPendingCalls`] if the configured cap is reached
    /// - [`Error::Transport`] if the transport is closed or rejects the frame
    pub fn send_command(
        &self,
        session_id: &SessionId,
        domain: &str,
        command: &str,
        params: Value,
    ) -> Result<PendingCommand> {
        let method = format!("{domain}.{command}");
        let id = self.ids.next_id();
        let frame = Command::new(id, session_id, method.as_str(), params).to_frame()?;
        let (settle, receiver) = oneshot::channel();

        {
            let sessions = self.sessions.lock();
            if !sessions.contains(session_id) {
                return Err(Error::session_detached(session_id.clone()));
            }

            let mut pending = self.pending.lock();
            if let Some(limit) = self.options.max_pending_calls
                && pending.len() >= limit
            {
                warn!(limit, method = %method, "Pending call limit reached");
                return Err(Error::TooManyPendingCalls { limit });
            }
            pending.insert(PendingCall::new(id, session_id.clone(), method.clone(), settle))?;
        }

        // The entry exists before the frame leaves, so a reply delivered
        // synchronously from inside `send` finds it.
        self.observe(Direction::Sent, &frame);
        if let Err(e) = self.transport.send(frame) {
            self.pending.lock().take(id);
            warn!(id = %id, method = %method, error = %e, "Command send failed");
            return Err(e);
        }

        trace!(id = %id, method = %method, session_id = %session_id, "Command sent");
        Ok(PendingCommand::new(id, method, receiver, &self.pending))
    }
}

// ============================================================================
// Multiplexer - Listeners
// ============================================================================

impl Multiplexer {
    /// Registers a listener for `domain.event` on a session.
    ///
    /// Listeners run in registration order, on the thread processing the
    /// frame. A listener's error or panic is reported as
    /// [`Diagnostic::ListenerFailed`] and does not stop the others.
    ///
    /// # Errors
    ///
    /// - [`Error::UnknownDomain`] or [`Error::UnknownEvent`] if events are
    ///   validated and the schema does not declare `domain.event`
    /// - [`Error::SessionDetached`] if the session is not live
    pub fn add_listener<F>(
        &self,
        session_id: &SessionId,
        domain: &str,
        event: &str,
        listener: F,
    ) -> Result<ListenerId>
    where
        F: Fn(&Value) -> Result<()> + Send + Sync + 'static,
    {
        let method = format!("{domain}.{event}");
        if self.options.validate_events {
            self.check_event_declared(domain, event)?;
        }

        let listener: EventListener = Arc::new(listener);
        let id = self
            .sessions
            .lock()
            .add_listener(session_id, method.clone(), listener)?;

        trace!(session_id = %session_id, method = %method, listener = %id, "Listener added");
        Ok(id)
    }

    /// Registers a listener that receives params deserialized into `T`.
    ///
    /// A payload that does not deserialize is reported as a listener
    /// failure.
    ///
    /// # Errors
    ///
    /// Same as [`Multiplexer::add_listener`].
    pub fn add_typed_listener<T, F>(
        &self,
        session_id: &SessionId,
        domain: &str,
        event: &str,
        listener: F,
    ) -> Result<ListenerId>
    where
        T: DeserializeOwned,
        F: Fn(T) -> Result<()> + Send + Sync + 'static,
    {
        self.add_listener(session_id, domain, event, move |params| {
            let payload = T::deserialize(params)
                .map_err(|e| Error::listener_failed(format!("invalid event payload: {e}")))?;
            listener(payload)
        })
    }

    /// Removes a listener. Returns `false` if it was not registered.
    pub fn remove_listener(&self, session_id: &SessionId, id: ListenerId) -> bool {
        self.sessions.lock().remove_listener(session_id, id)
    }

    /// Fails unless the schema declares `domain.event`.
    fn check_event_declared(&self, domain: &str, event: &str) -> Result<()> {
        let schema = self
            .schema
            .domain(domain)
            .ok_or_else(|| Error::unknown_domain(domain))?;
        if schema.event(event).is_none() {
            return Err(Error::unknown_event(format!("{domain}.{event}")));
        }
        Ok(())
    }
}

// ============================================================================
// Multiplexer - Inbound
// ============================================================================

impl Multiplexer {
    /// Processes one raw inbound frame.
    ///
    /// Called by the transport. Never fails: malformed and orphaned frames
    /// are reported to the diagnostics sink and dropped. A call made while
    /// a frame is already being processed queues the new frame behind it.
    pub fn handle_incoming_message(&self, raw: impl Into<String>) {
        {
            let mut inbox = self.inbox.lock();
            inbox.queue.push_back(raw.into());
            if inbox.draining {
                return;
            }
            inbox.draining = true;
        }

        let _guard = DrainGuard { inbox: &self.inbox };
        loop {
            let frame = {
                let mut inbox = self.inbox.lock();
                match inbox.queue.pop_front() {
                    Some(frame) => frame,
                    None => {
                        inbox.draining = false;
                        return;
                    }
                }
            };
            self.process_frame(&frame);
        }
    }

    fn process_frame(&self, raw: &str) {
        self.observe(Direction::Received, raw);

        match Incoming::parse(raw) {
            Ok(Incoming::Response(response)) => self.handle_response(response),
            Ok(Incoming::Event(event)) => self.handle_event(event),
            Ok(Incoming::MalformedResponse {
                id,
                session_id,
                reason,
            }) => {
                self.report(Diagnostic::malformed(reason.clone(), raw));
                self.fail_call(id, &SessionId::from(session_id), reason);
            }
            Err(e) => {
                let error = match e {
                    Error::Protocol { message } => message,
                    other => other.to_string(),
                };
                self.report(Diagnostic::malformed(error, raw));
            }
        }
    }

    /// Removes the call `id` if `session_id` is live.
    fn take_call(&self, id: CallId, session_id: &SessionId) -> Option<PendingCall> {
        let sessions = self.sessions.lock();
        if sessions.contains(session_id) {
            self.pending.lock().take(id)
        } else {
            None
        }
    }

    fn handle_response(&self, response: Response) {
        let session_id = response.session();

        let call = self.take_call(response.id, &session_id);
        let Some(call) = call else {
            self.report(Diagnostic::OrphanResponse {
                id: response.id,
                session_id,
            });
            return;
        };

        if call.session_id != session_id {
            debug!(
                id = %call.id,
                expected = %call.session_id,
                actual = %session_id,
                "Response arrived on a different session"
            );
        }

        let result = response.into_result(&call.method);
        if let Err(e) = &result {
            self.log_remote_error(e);
        }
        call.settle(result);
    }

    /// Settles a call whose response arrived but could not be read.
    fn fail_call(&self, id: CallId, session_id: &SessionId, reason: String) {
        let call = self.take_call(id, session_id);
        if let Some(call) = call {
            debug!(id = %id, method = %call.method, "Settling call from malformed response");
            call.settle(Err(Error::protocol(reason)));
        }
    }

    fn log_remote_error(&self, error: &Error) {
        let Some(code) = error.code() else {
            return;
        };
        if self.options.suppress_request_errors
            || code == CONNECTION_CLOSED_CODE
            || code == STUB_CONNECTION_CODE
        {
            return;
        }
        warn!(code, error = %error, "Request failed");
    }

    fn handle_event(&self, event: Event) {
        let session_id = event.session();

        if self.options.validate_events {
            match self.schema.domain(event.domain()) {
                None => {
                    self.report(Diagnostic::UnknownDomain {
                        method: event.method,
                    });
                    return;
                }
                Some(domain) if domain.event(event.event_name()).is_none() => {
                    self.report(Diagnostic::UnspecifiedEvent {
                        method: event.method,
                    });
                    return;
                }
                Some(_) => {}
            }
        }

        let listeners = self.sessions.lock().listeners_for(&session_id, &event.method);
        let Some(listeners) = listeners else {
            self.report(Diagnostic::OrphanEvent {
                session_id,
                method: event.method,
            });
            return;
        };

        let auto_attach = self.options.auto_attach;
        if auto_attach && event.method == ATTACHED_TO_TARGET {
            self.attach_child(&event);
        }

        for listener in listeners {
            self.invoke_listener(&listener, &session_id, &event);
        }

        if auto_attach && event.method == DETACHED_FROM_TARGET {
            match child_session(&event) {
                Some(child) => self.destroy_session(&child),
                None => self.report_missing_child(&event),
            }
        }
    }

    fn attach_child(&self, event: &Event) {
        let Some(child) = child_session(event) else {
            self.report_missing_child(event);
            return;
        };
        match self.create_session(child.clone()) {
            Ok(()) => info!(session_id = %child, "Child session attached"),
            Err(e) => debug!(session_id = %child, error = %e, "Child session already live"),
        }
    }

    fn report_missing_child(&self, event: &Event) {
        self.report(Diagnostic::malformed(
            format!("{} does not name a child session", event.method),
            &event.params.to_string(),
        ));
    }

    fn invoke_listener(&self, listener: &EventListener, session_id: &SessionId, event: &Event) {
        let error = match catch_unwind(AssertUnwindSafe(|| listener(&event.params))) {
            Ok(Ok(())) => return,
            Ok(Err(e)) => e.to_string(),
            Err(payload) => format!("panicked: {}", panic_message(payload.as_ref())),
        };
        self.report(Diagnostic::ListenerFailed {
            session_id: session_id.clone(),
            method: event.method.clone(),
            error,
        });
    }
}

/// Child session named by an attach/detach event. Never the root.
fn child_session(event: &Event) -> Option<SessionId> {
    event
        .params
        .get("sessionId")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(SessionId::new)
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}

// ============================================================================
// Multiplexer - Lifecycle
// ============================================================================

impl Multiplexer {
    /// Closes the transport.
    ///
    /// Outstanding calls fail with [`Error::Transport`] carrying the
    /// connection-closed code, as do later sends.
    pub fn close(&self) {
        self.transport.close();
        self.handle_disconnect("closed locally");
    }

    /// Rejects every outstanding call once the transport is lost.
    fn handle_disconnect(&self, reason: &str) {
        let calls = {
            let mut pending = self.pending.lock();
            if pending.is_closed() {
                return;
            }
            pending.close(reason)
        };

        info!(reason, rejected = calls.len(), "Transport disconnected");
        for call in calls {
            let message = format!("Connection is closed, can't dispatch pending {}", call.method);
            call.settle(Err(Error::transport_with_code(message, CONNECTION_CLOSED_CODE)));
        }
    }
}

// ============================================================================
// Multiplexer - Diagnostics
// ============================================================================

impl Multiplexer {
    fn report(&self, diagnostic: Diagnostic) {
        self.sink.report(&diagnostic);
    }

    fn observe(&self, direction: Direction, frame: &str) {
        if self.options.dump_protocol_messages {
            debug!(direction = %direction, frame, "Protocol message");
        }
        let observer = self.observer.read().clone();
        if let Some(observer) = observer {
            observer(direction, frame);
        }
    }
}

impl fmt::Debug for Multiplexer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Multiplexer")
            .field("sessions", &self.sessions.lock().len())
            .field("pending", &self.pending.lock().len())
            .field("closed", &self.transport.is_closed())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use parking_lot::Mutex;
    use serde_json::json;

    use crate::protocol::{ParamSchema, ParamType};
    use crate::transport::{ChannelTransport, RemoteEnd, StubTransport};

    fn schema() -> Schema {
        Schema::builder()
            .command("Page.enable", vec![])
            .command("Page.navigate", vec![ParamSchema::required("url", ParamType::String)])
            .event("Page.loadEventFired", ["timestamp"])
            .event("Target.attachedToTarget", ["sessionId", "targetInfo"])
            .event("Target.detachedFromTarget", ["sessionId"])
            .build()
            .unwrap()
    }

    fn setup() -> (Arc<Multiplexer>, RemoteEnd, Arc<Mutex<Vec<Diagnostic>>>) {
        let (transport, remote) = ChannelTransport::pair();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        let mux = Multiplexer::with_sink(
            Arc::new(transport),
            schema(),
            MultiplexerOptions::new(),
            Arc::new(move |d: &Diagnostic| s.lock().push(d.clone())),
        )
        .unwrap();
        (mux, remote, seen)
    }

    #[tokio::test]
    async fn test_response_settles_command() {
        let (mux, mut remote, _) = setup();
        let root = SessionId::root();

        let pending = mux.send_command(&root, "Page", "enable", json!({})).unwrap();
        let command = remote.next_command().unwrap();
        assert_eq!(command.method, "Page.enable");
        assert!(command.params.is_none());
        assert!(command.session_id.is_none());

        remote.deliver(format!(r#"{{"id":{},"result":{{"ok":true}}}}"#, command.id));
        assert_eq!(pending.await.unwrap(), json!({ "ok": true }));
        assert_eq!(mux.pending_count(), 0);
    }

    #[test]
    fn test_ids_are_monotonic_across_sessions() {
        let (mux, mut remote, _) = setup();
        mux.create_session("S1").unwrap();

        let _a = mux.send_command(&SessionId::root(), "Page", "enable", json!({})).unwrap();
        let _b = mux.send_command(&SessionId::new("S1"), "Page", "enable", json!({})).unwrap();

        let first = remote.next_command().unwrap();
        let second = remote.next_command().unwrap();
        assert_eq!(first.id.as_u64(), 1);
        assert_eq!(second.id.as_u64(), 2);
        assert_eq!(second.session_id.as_deref(), Some("S1"));
    }

    #[test]
    fn test_unknown_session_rejected() {
        let (mux, _remote, _) = setup();
        let err = mux
            .send_command(&SessionId::new("nope"), "Page", "enable", json!({}))
            .unwrap_err();
        assert!(err.is_session_detached());
    }

    #[test]
    fn test_malformed_frame_reported() {
        let (mux, remote, seen) = setup();
        remote.deliver("{not json");
        remote.deliver(r#"{"id":1,"method":"Page.enable"}"#);

        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        assert!(seen.iter().all(Diagnostic::is_protocol_error));
        assert!(!mux.is_closed());
    }

    #[test]
    fn test_event_validation() {
        let (mux, remote, seen) = setup();
        let hits = Arc::new(Mutex::new(0));
        let h = Arc::clone(&hits);
        mux.add_listener(&SessionId::root(), "Page", "loadEventFired", move |_| {
            *h.lock() += 1;
            Ok(())
        })
        .unwrap();

        remote.deliver(r#"{"method":"Page.loadEventFired","params":{"timestamp":1}}"#);
        remote.deliver(r#"{"method":"Bogus.event"}"#);
        remote.deliver(r#"{"method":"Page.bogus"}"#);

        assert_eq!(*hits.lock(), 1);
        let seen = seen.lock();
        assert!(matches!(seen[0], Diagnostic::UnknownDomain { .. }));
        assert!(matches!(seen[1], Diagnostic::UnspecifiedEvent { .. }));
    }

    #[test]
    fn test_listener_panic_isolated() {
        let (mux, remote, seen) = setup();
        let root = SessionId::root();
        let hits = Arc::new(Mutex::new(Vec::new()));

        mux.add_listener(&root, "Page", "loadEventFired", |_| panic!("boom")).unwrap();
        let h = Arc::clone(&hits);
        mux.add_listener(&root, "Page", "loadEventFired", move |_| {
            h.lock().push("second");
            Ok(())
        })
        .unwrap();

        remote.deliver(r#"{"method":"Page.loadEventFired"}"#);

        assert_eq!(*hits.lock(), ["second"]);
        let seen = seen.lock();
        assert!(matches!(
            &seen[0],
            Diagnostic::ListenerFailed { error, .. } if error.contains("boom")
        ));
    }

    #[test]
    fn test_auto_attach_and_detach() {
        let (mux, remote, _) = setup();
        remote.deliver(
            r#"{"method":"Target.attachedToTarget","params":{"sessionId":"S1","targetInfo":{}}}"#,
        );
        assert!(mux.has_session(&SessionId::new("S1")));

        remote.deliver(r#"{"method":"Target.detachedFromTarget","params":{"sessionId":"S1"}}"#);
        assert!(!mux.has_session(&SessionId::new("S1")));
    }

    #[tokio::test]
    async fn test_detach_without_child_keeps_root() {
        let (mux, mut remote, seen) = setup();
        let root = SessionId::root();
        mux.add_listener(&root, "Page", "loadEventFired", |_| Ok(())).unwrap();
        let pending = mux.send_command(&root, "Page", "enable", json!({})).unwrap();
        let command = remote.next_command().unwrap();

        remote.deliver(r#"{"method":"Target.attachedToTarget","params":{"sessionId":""}}"#);
        remote.deliver(r#"{"method":"Target.detachedFromTarget","params":{"sessionId":""}}"#);
        remote.deliver(r#"{"method":"Target.detachedFromTarget","params":{}}"#);

        assert!(mux.has_session(&root));
        assert_eq!(mux.listener_count(&root), 1);
        assert_eq!(mux.pending_count(), 1);
        {
            let seen = seen.lock();
            assert_eq!(seen.len(), 3);
            assert!(seen.iter().all(|d| matches!(d, Diagnostic::MalformedFrame { .. })));
        }

        remote.deliver(format!(r#"{{"id":{}}}"#, command.id));
        assert_eq!(pending.await.unwrap(), json!({}));
    }

    #[tokio::test]
    async fn test_malformed_response_settles_call() {
        let (mux, mut remote, seen) = setup();
        let pending = mux.send_command(&SessionId::root(), "Page", "enable", json!({})).unwrap();
        let command = remote.next_command().unwrap();

        remote.deliver(format!(r#"{{"id":{},"error":{{"code":-32000}}}}"#, command.id));

        assert_eq!(mux.pending_count(), 0);
        assert!(matches!(
            seen.lock().as_slice(),
            [Diagnostic::MalformedFrame { error, .. }] if error.contains("message")
        ));
        let err = pending.await.unwrap_err();
        assert!(matches!(err, Error::Protocol { .. }));
    }

    #[test]
    fn test_malformed_response_for_unknown_call_only_reported() {
        let (mux, remote, seen) = setup();
        remote.deliver(r#"{"id":99,"result":"not an object","error":7}"#);

        assert_eq!(mux.pending_count(), 0);
        assert_eq!(seen.lock().len(), 1);
        assert!(seen.lock()[0].is_protocol_error());
    }

    #[test]
    fn test_listener_for_undeclared_event_rejected() {
        let (mux, _remote, _) = setup();
        let root = SessionId::root();

        let err = mux.add_listener(&root, "Page", "bogus", |_| Ok(())).unwrap_err();
        assert!(matches!(err, Error::UnknownEvent { ref method } if method == "Page.bogus"));

        let err = mux.add_listener(&root, "Network", "dataReceived", |_| Ok(())).unwrap_err();
        assert!(matches!(err, Error::UnknownDomain { ref domain } if domain == "Network"));
        assert_eq!(mux.listener_count(&root), 0);
    }

    #[test]
    fn test_listener_for_undeclared_event_allowed_without_validation() {
        let (transport, remote) = ChannelTransport::pair();
        let mux = Multiplexer::new(
            Arc::new(transport),
            schema(),
            MultiplexerOptions::new().without_event_validation(),
        )
        .unwrap();
        let hits = Arc::new(Mutex::new(0));
        let h = Arc::clone(&hits);
        mux.add_listener(&SessionId::root(), "Network", "dataReceived", move |_| {
            *h.lock() += 1;
            Ok(())
        })
        .unwrap();

        remote.deliver(r#"{"method":"Network.dataReceived","params":{}}"#);
        assert_eq!(*hits.lock(), 1);
    }

    #[tokio::test]
    async fn test_stub_rejects_synchronously() {
        let mux = Multiplexer::new(
            Arc::new(StubTransport::new()),
            schema(),
            MultiplexerOptions::new(),
        )
        .unwrap();

        let pending = mux.send_command(&SessionId::root(), "Page", "enable", json!({})).unwrap();
        assert_eq!(mux.pending_count(), 0);
        let err = pending.await.unwrap_err();
        assert_eq!(err.code(), Some(STUB_CONNECTION_CODE));
    }

    #[tokio::test]
    async fn test_disconnect_rejects_pending() {
        let (mux, remote, _) = setup();
        let pending = mux.send_command(&SessionId::root(), "Page", "enable", json!({})).unwrap();

        remote.disconnect("websocket closed");
        assert!(mux.is_closed());
        assert_eq!(pending.await.unwrap_err().code(), Some(CONNECTION_CLOSED_CODE));

        let err = mux
            .send_command(&SessionId::root(), "Page", "enable", json!({}))
            .unwrap_err();
        assert!(err.is_transport_error());
    }

    #[test]
    fn test_max_pending_calls() {
        let (transport, _remote) = ChannelTransport::pair();
        let mux = Multiplexer::new(
            Arc::new(transport),
            schema(),
            MultiplexerOptions::new().with_max_pending_calls(1),
        )
        .unwrap();

        let _first = mux.send_command(&SessionId::root(), "Page", "enable", json!({})).unwrap();
        let err = mux
            .send_command(&SessionId::root(), "Page", "enable", json!({}))
            .unwrap_err();
        assert!(matches!(err, Error::TooManyPendingCalls { limit: 1 }));
    }

    #[test]
    fn test_observer_sees_both_directions() {
        let (mux, mut remote, _) = setup();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        mux.set_message_observer(move |direction, _| s.lock().push(direction));

        let _pending = mux.send_command(&SessionId::root(), "Page", "enable", json!({})).unwrap();
        let command = remote.next_command().unwrap();
        remote.deliver(format!(r#"{{"id":{}}}"#, command.id));

        assert_eq!(*seen.lock(), [Direction::Sent, Direction::Received]);
    }
}
