//! Live session bookkeeping.
//!
//! The pool hands out session ids and keeps every session that has not yet
//! been closed and removed. The heartbeat monitor walks it periodically.

use super::Session;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::mpsc;
use tracing::trace;

#[derive(Debug)]
pub struct SessionPool {
    next_id: AtomicU64,
    sessions: RwLock<HashMap<u64, Arc<Session>>>,
}

impl Default for SessionPool {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionPool {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<u64, Arc<Session>>> {
        self.sessions
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<u64, Arc<Session>>> {
        self.sessions
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Create and track a session whose outbound queue holds `capacity` packets.
    ///
    /// The receiver is the session's outbound path; the transport drains it
    /// onto the connection.
    pub fn create(&self, capacity: usize) -> (Arc<Session>, mpsc::Receiver<Bytes>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let session = Arc::new(Session::new(id, tx));
        self.write().insert(id, session.clone());
        trace!(session_id = id, "Session tracked");
        (session, rx)
    }

    pub fn get(&self, id: u64) -> Option<Arc<Session>> {
        self.read().get(&id).cloned()
    }

    /// Find the session bound to `uid`.
    pub fn find_by_uid(&self, uid: &str) -> Option<Arc<Session>> {
        self.read()
            .values()
            .find(|session| session.uid().as_deref() == Some(uid))
            .cloned()
    }

    pub fn remove(&self, id: u64) -> Option<Arc<Session>> {
        let removed = self.write().remove(&id);
        if removed.is_some() {
            trace!(session_id = id, "Session untracked");
        }
        removed
    }

    pub fn contains(&self, id: u64) -> bool {
        self.read().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Sessions at this instant, detached from the pool lock.
    pub fn snapshot(&self) -> Vec<Arc<Session>> {
        self.read().values().cloned().collect()
    }

    /// Close and untrack every session.
    pub fn close_all(&self) -> usize {
        let sessions: Vec<_> = self.write().drain().map(|(_, s)| s).collect();
        sessions.iter().filter(|session| session.close()).count()
    }
}
