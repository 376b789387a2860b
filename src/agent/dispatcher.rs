//! Domain-wide event dispatchers.
//!
//! A [`DomainDispatcher`] receives every event of one domain on one
//! session through a single object, the way a model type consumes the
//! `Network` or `Security` domain.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};
use crate::identifiers::{ListenerId, SessionId};
use crate::session::Multiplexer;

// ============================================================================
// DomainDispatcher
// ============================================================================

/// Receiver of a domain's events.
pub trait DomainDispatcher: Send + Sync {
    /// Handles one event. `event` is the unqualified name, e.g.
    /// `requestWillBeSent`.
    ///
    /// # Errors
    ///
    /// An error is reported as a listener failure.
    fn dispatch(&self, event: &str, params: &Value) -> Result<()>;

    /// Returns `false` to skip subscribing to `event`.
    fn handles(&self, _event: &str) -> bool {
        true
    }
}

// ============================================================================
// DispatcherHandle
// ============================================================================

/// Registration returned by [`Multiplexer::add_dispatcher`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherHandle {
    session_id: SessionId,
    domain: String,
    listeners: Vec<ListenerId>,
}

impl DispatcherHandle {
    /// Returns the session the dispatcher listens on.
    #[inline]
    #[must_use]
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Returns the domain name.
    #[inline]
    #[must_use]
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Returns the number of subscribed events.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    /// Returns `true` if no event was subscribed.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

// ============================================================================
// Multiplexer - Dispatchers
// ============================================================================

impl Multiplexer {
    /// Subscribes `dispatcher` to every event `domain` declares.
    ///
    /// # Errors
    ///
    /// - [`Error::UnknownDomain`] if the schema lacks the domain
    /// - [`Error::SessionDetached`] if the session is not live
    pub fn add_dispatcher(
        &self,
        session_id: &SessionId,
        domain: &str,
        dispatcher: Arc<dyn DomainDispatcher>,
    ) -> Result<DispatcherHandle> {
        let schema = self
            .schema()
            .domain(domain)
            .cloned()
            .ok_or_else(|| Error::unknown_domain(domain))?;

        let mut listeners = Vec::new();
        for event in schema.events() {
            if !dispatcher.handles(&event.name) {
                continue;
            }

            let target = Arc::clone(&dispatcher);
            let name = event.name.clone();
            let added = self.add_listener(session_id, domain, &event.name, move |params| {
                target.dispatch(&name, params)
            });

            match added {
                Ok(id) => listeners.push(id),
                Err(e) => {
                    for id in listeners {
                        self.remove_listener(session_id, id);
                    }
                    return Err(e);
                }
            }
        }

        debug!(
            session_id = %session_id,
            domain,
            events = listeners.len(),
            "Dispatcher added"
        );

        Ok(DispatcherHandle {
            session_id: session_id.clone(),
            domain: domain.to_string(),
            listeners,
        })
    }

    /// Unsubscribes a dispatcher. Returns the number of listeners removed.
    pub fn remove_dispatcher(&self, handle: &DispatcherHandle) -> usize {
        handle
            .listeners
            .iter()
            .filter(|id| self.remove_listener(&handle.session_id, **id))
            .count()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use parking_lot::Mutex;

    use crate::config::MultiplexerOptions;
    use crate::protocol::Schema;
    use crate::transport::ChannelTransport;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<String>>,
    }

    impl DomainDispatcher for Recorder {
        fn dispatch(&self, event: &str, _params: &Value) -> Result<()> {
            self.seen.lock().push(event.to_string());
            Ok(())
        }

        fn handles(&self, event: &str) -> bool {
            event != "dataReceived"
        }
    }

    fn schema() -> Schema {
        Schema::builder()
            .event("Network.requestWillBeSent", ["requestId"])
            .event("Network.responseReceived", ["requestId"])
            .event("Network.dataReceived", ["requestId"])
            .build()
            .unwrap()
    }

    #[test]
    fn test_add_and_remove_dispatcher() {
        let (transport, remote) = ChannelTransport::pair();
        let mux = Multiplexer::new(Arc::new(transport), schema(), MultiplexerOptions::new()).unwrap();
        let recorder = Arc::new(Recorder::default());

        let handle = mux
            .add_dispatcher(&SessionId::root(), "Network", Arc::clone(&recorder) as Arc<dyn DomainDispatcher>)
            .unwrap();
        assert_eq!(handle.len(), 2);
        assert_eq!(handle.domain(), "Network");

        remote.deliver(r#"{"method":"Network.requestWillBeSent","params":{"requestId":"X"}}"#);
        remote.deliver(r#"{"method":"Network.dataReceived","params":{"requestId":"X"}}"#);
        remote.deliver(r#"{"method":"Network.responseReceived","params":{"requestId":"X"}}"#);
        assert_eq!(*recorder.seen.lock(), ["requestWillBeSent", "responseReceived"]);

        assert_eq!(mux.remove_dispatcher(&handle), 2);
        assert_eq!(mux.remove_dispatcher(&handle), 0);
        assert_eq!(mux.listener_count(&SessionId::root()), 0);
    }

    #[test]
    fn test_unknown_domain_or_session() {
        let (transport, _remote) = ChannelTransport::pair();
        let mux = Multiplexer::new(Arc::new(transport), schema(), MultiplexerOptions::new()).unwrap();

        let err = mux
            .add_dispatcher(&SessionId::root(), "Page", Arc::new(Recorder::default()))
            .unwrap_err();
        assert!(matches!(err, Error::UnknownDomain { .. }));

        let err = mux
            .add_dispatcher(&SessionId::new("S1"), "Network", Arc::new(Recorder::default()))
            .unwrap_err();
        assert!(err.is_session_detached());
    }
}
