//! Observability and Metrics
//!
//! Dispatch counters for one [`crate::service::handler::HandlerService`].
//!
//! Uses atomic counters for thread-safe metrics collection.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, info};

/// Metrics collector for dispatch operations
#[derive(Debug)]
pub struct Metrics {
    /// Packets received from sessions
    pub packets_received: AtomicU64,
    /// Messages decoded from data packets
    pub messages_received: AtomicU64,
    /// Messages queued for a local handler
    pub local_dispatched: AtomicU64,
    /// Messages queued for the remote service
    pub remote_dispatched: AtomicU64,
    /// Responses written back to sessions
    pub responses_sent: AtomicU64,
    /// Handler or remote calls that returned an error
    pub handler_errors: AtomicU64,
    /// Handler panics converted to error responses
    pub panics_recovered: AtomicU64,
    /// Messages whose route matched no handler
    pub routes_not_found: AtomicU64,
    /// Message envelopes or bodies that failed to decode
    pub decode_errors: AtomicU64,
    /// Sessions kicked for missing heartbeats
    pub heartbeat_timeouts: AtomicU64,
    /// Total sessions created
    pub sessions_total: AtomicU64,
    /// Currently live sessions
    pub sessions_active: AtomicU64,
    /// Start time for uptime calculation
    start_time: Instant,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            packets_received: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            local_dispatched: AtomicU64::new(0),
            remote_dispatched: AtomicU64::new(0),
            responses_sent: AtomicU64::new(0),
            handler_errors: AtomicU64::new(0),
            panics_recovered: AtomicU64::new(0),
            routes_not_found: AtomicU64::new(0),
            decode_errors: AtomicU64::new(0),
            heartbeat_timeouts: AtomicU64::new(0),
            sessions_total: AtomicU64::new(0),
            sessions_active: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn packet_received(&self) {
        self.packets_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn local_dispatch(&self) {
        self.local_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn remote_dispatch(&self) {
        self.remote_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn response_sent(&self) {
        self.responses_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn handler_error(&self) {
        self.handler_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn panic_recovered(&self) {
        self.panics_recovered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn route_not_found(&self) {
        self.routes_not_found.fetch_add(1, Ordering::Relaxed);
    }

    pub fn decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn heartbeat_timeout(&self) {
        self.heartbeat_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a new session
    pub fn session_opened(&self) {
        self.sessions_total.fetch_add(1, Ordering::Relaxed);
        self.sessions_active.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a session leaving the pool
    pub fn session_closed(&self) {
        let _ = self
            .sessions_active
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            packets_received: self.packets_received.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            local_dispatched: self.local_dispatched.load(Ordering::Relaxed),
            remote_dispatched: self.remote_dispatched.load(Ordering::Relaxed),
            responses_sent: self.responses_sent.load(Ordering::Relaxed),
            handler_errors: self.handler_errors.load(Ordering::Relaxed),
            panics_recovered: self.panics_recovered.load(Ordering::Relaxed),
            routes_not_found: self.routes_not_found.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            heartbeat_timeouts: self.heartbeat_timeouts.load(Ordering::Relaxed),
            sessions_total: self.sessions_total.load(Ordering::Relaxed),
            sessions_active: self.sessions_active.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    /// Log current metrics
    pub fn log_metrics(&self) {
        let snapshot = self.snapshot();
        info!(
            packets_received = snapshot.packets_received,
            messages_received = snapshot.messages_received,
            local_dispatched = snapshot.local_dispatched,
            remote_dispatched = snapshot.remote_dispatched,
            responses_sent = snapshot.responses_sent,
            handler_errors = snapshot.handler_errors,
            panics_recovered = snapshot.panics_recovered,
            routes_not_found = snapshot.routes_not_found,
            decode_errors = snapshot.decode_errors,
            heartbeat_timeouts = snapshot.heartbeat_timeouts,
            sessions_total = snapshot.sessions_total,
            sessions_active = snapshot.sessions_active,
            uptime_seconds = snapshot.uptime_seconds,
            "Dispatch metrics snapshot"
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub packets_received: u64,
    pub messages_received: u64,
    pub local_dispatched: u64,
    pub remote_dispatched: u64,
    pub responses_sent: u64,
    pub handler_errors: u64,
    pub panics_recovered: u64,
    pub routes_not_found: u64,
    pub decode_errors: u64,
    pub heartbeat_timeouts: u64,
    pub sessions_total: u64,
    pub sessions_active: u64,
    pub uptime_seconds: u64,
}

/// Timer for measuring operation duration
pub struct Timer {
    start: Instant,
    operation: &'static str,
}

impl Timer {
    /// Start timing an operation
    pub fn start(operation: &'static str) -> Self {
        Self {
            start: Instant::now(),
            operation,
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        debug!(
            operation = self.operation,
            duration_us = duration.as_micros() as u64,
            "Operation completed"
        );
    }
}
