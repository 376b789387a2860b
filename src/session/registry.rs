//! Live sessions and their event listeners.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                SessionTable                  │
//! │  ┌────────────────────────────────────────┐  │
//! │  │ <root> → { "Page.loadEventFired": [..] │  │
//! │  │ S1     → { "Network.requestWill..": [] │  │
//! │  │ S2     → { }                           │  │
//! │  └────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! Listeners are kept per method in registration order. Fan-out works on
//! a snapshot, so listeners may add or remove listeners while running.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::identifiers::{ListenerId, SessionId};

// ============================================================================
// Types
// ============================================================================

/// Callback invoked with an event's params.
///
/// Errors are reported as diagnostics; they never stop fan-out.
pub type EventListener = Arc<dyn Fn(&Value) -> Result<()> + Send + Sync>;

// ============================================================================
// SessionEntry
// ============================================================================

/// Listener state of one live session.
#[derive(Default)]
pub(crate) struct SessionEntry {
    /// Listeners by fully qualified event method.
    listeners: FxHashMap<String, Vec<(ListenerId, EventListener)>>,
}

impl SessionEntry {
    /// Returns the number of registered listeners.
    pub(crate) fn listener_count(&self) -> usize {
        self.listeners.values().map(Vec::len).sum()
    }
}

// ============================================================================
// SessionTable
// ============================================================================

/// Live sessions keyed by id.
pub(crate) struct SessionTable {
    sessions: FxHashMap<SessionId, SessionEntry>,
}

impl SessionTable {
    /// Creates a table holding only the root session.
    pub(crate) fn new() -> Self {
        let mut sessions = FxHashMap::default();
        sessions.insert(SessionId::root(), SessionEntry::default());
        Self { sessions }
    }

    /// Returns `true` if the session is live.
    #[inline]
    pub(crate) fn contains(&self, session_id: &SessionId) -> bool {
        self.sessions.contains_key(session_id)
    }

    /// Returns the number of live sessions.
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Returns the live session ids.
    pub(crate) fn ids(&self) -> Vec<SessionId> {
        self.sessions.keys().cloned().collect()
    }

    /// Registers a session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateSession`] if it is already live.
    pub(crate) fn create(&mut self, session_id: SessionId) -> Result<()> {
        if self.sessions.contains_key(&session_id) {
            return Err(Error::duplicate_session(session_id));
        }
        self.sessions.insert(session_id, SessionEntry::default());
        Ok(())
    }

    /// Unregisters a session, returning its listener state.
    pub(crate) fn remove(&mut self, session_id: &SessionId) -> Option<SessionEntry> {
        self.sessions.remove(session_id)
    }

    /// Appends a listener for `method` on a session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionDetached`] if the session is not live.
    pub(crate) fn add_listener(
        &mut self,
        session_id: &SessionId,
        method: String,
        listener: EventListener,
    ) -> Result<ListenerId> {
        let entry = self
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| Error::session_detached(session_id.clone()))?;

        let id = ListenerId::next();
        entry.listeners.entry(method).or_default().push((id, listener));
        Ok(id)
    }

    /// Removes one listener. Returns `false` if it was not registered.
    pub(crate) fn remove_listener(&mut self, session_id: &SessionId, id: ListenerId) -> bool {
        let Some(entry) = self.sessions.get_mut(session_id) else {
            return false;
        };

        let mut emptied = None;
        let mut removed = false;
        for (method, listeners) in &mut entry.listeners {
            if let Some(pos) = listeners.iter().position(|(lid, _)| *lid == id) {
                listeners.remove(pos);
                removed = true;
                if listeners.is_empty() {
                    emptied = Some(method.clone());
                }
                break;
            }
        }
        if let Some(method) = emptied {
            entry.listeners.remove(&method);
        }
        removed
    }

    /// Snapshots the listeners for `method`, in registration order.
    ///
    /// Returns `None` if the session is not live.
    pub(crate) fn listeners_for(
        &self,
        session_id: &SessionId,
        method: &str,
    ) -> Option<Vec<EventListener>> {
        let entry = self.sessions.get(session_id)?;
        Some(
            entry
                .listeners
                .get(method)
                .map(|listeners| listeners.iter().map(|(_, l)| Arc::clone(l)).collect())
                .unwrap_or_default(),
        )
    }

    /// Returns the number of listeners on a session.
    pub(crate) fn listener_count(&self, session_id: &SessionId) -> usize {
        self.sessions
            .get(session_id)
            .map_or(0, SessionEntry::listener_count)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting(counter: &Arc<AtomicUsize>, weight: usize) -> EventListener {
        let counter = Arc::clone(counter);
        Arc::new(move |_| {
            counter.fetch_add(weight, Ordering::SeqCst);
            Ok(())
        })
    }

    #[test]
    fn test_root_is_live() {
        let table = SessionTable::new();
        assert!(table.contains(&SessionId::root()));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_create_duplicate_fails() {
        let mut table = SessionTable::new();
        table.create(SessionId::new("S1")).unwrap();
        let err = table.create(SessionId::new("S1")).unwrap_err();
        assert!(matches!(err, Error::DuplicateSession { .. }));
    }

    #[test]
    fn test_listener_order_preserved() {
        let mut table = SessionTable::new();
        let root = SessionId::root();
        let counter = Arc::new(AtomicUsize::new(0));

        table.add_listener(&root, "Page.loadEventFired".into(), counting(&counter, 1)).unwrap();
        table.add_listener(&root, "Page.loadEventFired".into(), counting(&counter, 10)).unwrap();
        table.add_listener(&root, "Page.frameNavigated".into(), counting(&counter, 100)).unwrap();

        let snapshot = table.listeners_for(&root, "Page.loadEventFired").unwrap();
        assert_eq!(snapshot.len(), 2);
        for listener in snapshot {
            listener(&Value::Null).unwrap();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 11);
        assert_eq!(table.listener_count(&root), 3);
    }

    #[test]
    fn test_remove_listener() {
        let mut table = SessionTable::new();
        let root = SessionId::root();
        let counter = Arc::new(AtomicUsize::new(0));
        let id = table
            .add_listener(&root, "Page.loadEventFired".into(), counting(&counter, 1))
            .unwrap();

        assert!(table.remove_listener(&root, id));
        assert!(!table.remove_listener(&root, id));
        assert!(table.listeners_for(&root, "Page.loadEventFired").unwrap().is_empty());
    }

    #[test]
    fn test_unknown_session() {
        let mut table = SessionTable::new();
        let ghost = SessionId::new("ghost");
        assert!(table.listeners_for(&ghost, "Page.loadEventFired").is_none());

        let counter = Arc::new(AtomicUsize::new(0));
        let err = table
            .add_listener(&ghost, "Page.loadEventFired".into(), counting(&counter, 1))
            .unwrap_err();
        assert!(err.is_session_detached());
        assert!(table.remove(&ghost).is_none());
    }
}
