//! # Sessions
//!
//! One [`Session`] per logical client connection. The transport owns the
//! connection; the dispatcher holds an `Arc<Session>` while it processes a
//! packet and while queued work for that session is in flight.
//!
//! ## Lifecycle
//! ```text
//! Connecting ──handshake──▶ Handshaking ──▶ Active
//!      │                        │              │
//!      └──── timeout / kick / transport close ─┴──▶ Closing ──▶ Closed
//! ```
//! `Closed` is terminal. Closing drops the outbound sender: work already queued
//! for the session still runs, but its writes fail with
//! [`ProtocolError::ConnectionClosed`].

pub mod heartbeat;
pub mod pool;

use crate::error::{ProtocolError, Result};
use crate::protocol::handshake::HandshakeClientData;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, RwLock};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::Instant;
use tracing::debug;

pub use heartbeat::HeartbeatMonitor;
pub use pool::SessionPool;

/// Connection lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    Connecting = 0,
    Handshaking = 1,
    Active = 2,
    Closing = 3,
    Closed = 4,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SessionState::Connecting,
            1 => SessionState::Handshaking,
            2 => SessionState::Active,
            3 => SessionState::Closing,
            _ => SessionState::Closed,
        }
    }
}

/// Serializable view of a session handed to the remote service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionContext {
    pub id: u64,
    pub uid: Option<String>,
    pub data: HashMap<String, serde_json::Value>,
}

/// Per-connection state.
#[derive(Debug)]
pub struct Session {
    id: u64,
    uid: RwLock<Option<String>>,
    data: RwLock<HashMap<String, serde_json::Value>>,
    client: RwLock<Option<HandshakeClientData>>,
    state: AtomicU8,
    last_activity: Mutex<Instant>,
    outbound: Mutex<Option<mpsc::Sender<Bytes>>>,
    in_flight: AtomicUsize,
    pending: Mutex<HashSet<u64>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Session {
    /// A session writing encoded packets to `outbound`.
    pub fn new(id: u64, outbound: mpsc::Sender<Bytes>) -> Self {
        Self {
            id,
            uid: RwLock::new(None),
            data: RwLock::new(HashMap::new()),
            client: RwLock::new(None),
            state: AtomicU8::new(SessionState::Connecting as u8),
            last_activity: Mutex::new(Instant::now()),
            outbound: Mutex::new(Some(outbound)),
            in_flight: AtomicUsize::new(0),
            pending: Mutex::new(HashSet::new()),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn uid(&self) -> Option<String> {
        self.uid
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Bind the session to a user id. A session can be bound once.
    pub fn bind(&self, uid: impl Into<String>) -> Result<()> {
        let uid = uid.into();
        if uid.is_empty() {
            return Err(ProtocolError::Custom("empty uid".into()));
        }
        let mut current = self
            .uid
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(existing) = current.as_ref() {
            return Err(ProtocolError::Custom(format!(
                "session {} already bound to {existing}",
                self.id
            )));
        }
        *current = Some(uid);
        Ok(())
    }

    pub fn set(&self, key: impl Into<String>, value: serde_json::Value) {
        self.data
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.data
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(key)
            .cloned()
    }

    pub fn remove(&self, key: &str) -> Option<serde_json::Value> {
        self.data
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(key)
    }

    /// Client description received in the handshake, if any.
    pub fn client(&self) -> Option<HandshakeClientData> {
        self.client
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub(crate) fn set_client(&self, client: HandshakeClientData) {
        *self
            .client
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(client);
    }

    pub fn context(&self) -> SessionContext {
        SessionContext {
            id: self.id,
            uid: self.uid(),
            data: self
                .data
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .clone(),
        }
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_active(&self) -> bool {
        self.state() == SessionState::Active
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.state(), SessionState::Closing | SessionState::Closed)
    }

    /// Move to `to` if the current state is one of `from`.
    pub fn transition(&self, from: &[SessionState], to: SessionState) -> bool {
        self.state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                from.contains(&SessionState::from_u8(current))
                    .then_some(to as u8)
            })
            .is_ok()
    }

    /// Record inbound activity.
    pub fn touch(&self) {
        *lock(&self.last_activity) = Instant::now();
    }

    /// Time since the last inbound packet.
    pub fn idle_for(&self) -> Duration {
        lock(&self.last_activity).elapsed()
    }

    /// Queue encoded packet bytes, waiting while the outbound buffer is full.
    pub async fn send(&self, bytes: Bytes) -> Result<()> {
        let sender = lock(&self.outbound)
            .clone()
            .ok_or(ProtocolError::ConnectionClosed)?;
        sender
            .send(bytes)
            .await
            .map_err(|_| ProtocolError::ConnectionClosed)
    }

    /// Queue encoded packet bytes without waiting. Returns `Ok(false)` when the
    /// outbound buffer is full.
    pub fn try_send(&self, bytes: Bytes) -> Result<bool> {
        let guard = lock(&self.outbound);
        let sender = guard.as_ref().ok_or(ProtocolError::ConnectionClosed)?;
        match sender.try_send(bytes) {
            Ok(()) => Ok(true),
            Err(TrySendError::Full(_)) => Ok(false),
            Err(TrySendError::Closed(_)) => Err(ProtocolError::ConnectionClosed),
        }
    }

    /// Close the session. Returns `false` if it was already closing or closed.
    pub fn close(&self) -> bool {
        let closing = self.transition(
            &[
                SessionState::Connecting,
                SessionState::Handshaking,
                SessionState::Active,
            ],
            SessionState::Closing,
        );
        if !closing {
            return false;
        }
        lock(&self.outbound).take();
        self.state.store(SessionState::Closed as u8, Ordering::Release);
        debug!(session_id = self.id, in_flight = self.in_flight(), "Session closed");
        true
    }

    pub(crate) fn begin_work(&self) {
        self.in_flight.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn finish_work(&self) {
        let _ = self
            .in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }

    /// Messages queued or executing for this session.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Track a request id awaiting its response. Returns `false` if the id is
    /// already pending.
    pub(crate) fn begin_request(&self, id: u64) -> bool {
        lock(&self.pending).insert(id)
    }

    /// Returns `false` if no request with `id` was pending.
    pub(crate) fn finish_request(&self, id: u64) -> bool {
        lock(&self.pending).remove(&id)
    }

    pub fn pending_requests(&self) -> usize {
        lock(&self.pending).len()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn session() -> (Session, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(4);
        (Session::new(1, tx), rx)
    }

    #[test]
    fn test_state_transitions() {
        let (session, _rx) = session();
        assert_eq!(session.state(), SessionState::Connecting);
        assert!(session.transition(&[SessionState::Connecting], SessionState::Handshaking));
        assert!(!session.transition(&[SessionState::Connecting], SessionState::Active));
        assert!(session.transition(&[SessionState::Handshaking], SessionState::Active));
        assert!(session.is_active());
    }

    #[tokio::test]
    async fn test_close_is_terminal_and_rejects_writes() {
        let (session, mut rx) = session();
        session.send(Bytes::from_static(b"before")).await.unwrap();
        assert!(session.close());
        assert!(!session.close());
        assert_eq!(session.state(), SessionState::Closed);
        assert!(!session.transition(&[SessionState::Connecting], SessionState::Active));
        assert!(matches!(
            session.send(Bytes::from_static(b"after")).await,
            Err(ProtocolError::ConnectionClosed)
        ));
        // Already queued bytes still reach the writer, then the queue ends.
        assert_eq!(rx.recv().await.unwrap(), Bytes::from_static(b"before"));
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn test_try_send_reports_full_buffer() {
        let (tx, _rx) = mpsc::channel(1);
        let session = Session::new(2, tx);
        assert!(session.try_send(Bytes::from_static(b"a")).unwrap());
        assert!(!session.try_send(Bytes::from_static(b"b")).unwrap());
    }

    #[test]
    fn test_bind_once() {
        let (session, _rx) = session();
        session.bind("player-7").unwrap();
        assert!(session.bind("player-8").is_err());
        assert_eq!(session.uid().as_deref(), Some("player-7"));
    }

    #[test]
    fn test_context_snapshot() {
        let (session, _rx) = session();
        session.set("room", serde_json::json!("lobby"));
        let ctx = session.context();
        assert_eq!(ctx.id, 1);
        assert_eq!(ctx.data.get("room"), Some(&serde_json::json!("lobby")));
        assert_eq!(session.remove("room"), Some(serde_json::json!("lobby")));
        assert!(session.get("room").is_none());
    }

    #[test]
    fn test_pending_request_bookkeeping() {
        let (session, _rx) = session();
        assert!(session.begin_request(3));
        assert!(!session.begin_request(3));
        assert_eq!(session.pending_requests(), 1);
        assert!(session.finish_request(3));
        assert!(!session.finish_request(3));
        session.finish_work();
        assert_eq!(session.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_time_follows_touch() {
        let (session, _rx) = session();
        tokio::time::advance(Duration::from_secs(3)).await;
        assert!(session.idle_for() >= Duration::from_secs(3));
        session.touch();
        assert!(session.idle_for() < Duration::from_secs(1));
    }
}
