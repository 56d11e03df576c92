//! The broadcaster's private registry of connected sessions.
//!
//! The registry is plain single-owner state: it lives inside the broadcaster
//! task and is never shared, so a `HashMap` with no lock is enough. Every
//! other component reaches it only through the broadcaster's command queue.
//!
//! # HashMap choice
//!
//! `HashMap<SessionId, SessionHandle>` gives O(1) insertion and removal by
//! session ID. Iteration order is not guaranteed, which is fine — fan-out
//! order across recipients is deliberately unspecified, and the roster line
//! sorts names before rendering.

use std::collections::HashMap;

use chatter_core::SessionId;

use crate::application::session::SessionHandle;

/// In-memory map of every currently connected session.
#[derive(Default)]
pub struct Registry {
    sessions: HashMap<SessionId, SessionHandle>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a session. The handle's mailbox sender now lives here until
    /// [`remove`](Self::remove) drops it.
    pub fn insert(&mut self, session: SessionHandle) {
        self.sessions.insert(session.id, session);
    }

    /// Removes a session, returning its handle so the caller controls when
    /// the mailbox sender is dropped (and therefore when the mailbox closes).
    pub fn remove(&mut self, id: SessionId) -> Option<SessionHandle> {
        self.sessions.remove(&id)
    }

    pub fn get(&self, id: SessionId) -> Option<&SessionHandle> {
        self.sessions.get(&id)
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.sessions.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Iterates over all registered sessions (fan-out targets).
    pub fn handles(&self) -> impl Iterator<Item = &SessionHandle> {
        self.sessions.values()
    }

    /// Snapshot of the display names of everyone currently online.
    pub fn names(&self) -> Vec<String> {
        self.sessions.values().map(|s| s.name.clone()).collect()
    }
}
