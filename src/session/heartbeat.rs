//! Heartbeat enforcement.
//!
//! Every tick (half the heartbeat timeout) the monitor walks the session pool:
//! - sessions silent for longer than the timeout get a kick packet, are closed
//!   and removed from the pool;
//! - live, handshaked sessions get an outbound heartbeat so idle connections
//!   are not reclaimed by proxies and load balancers;
//! - sessions closed elsewhere are swept out of the pool.

use super::{Session, SessionPool};
use crate::core::codec::PacketEncoder;
use crate::core::packet::PacketType;
use crate::error::{ProtocolError, Result};
use crate::protocol::handshake::KickReason;
use crate::utils::die::DieListener;
use crate::utils::metrics::Metrics;
use crate::utils::timeout::heartbeat_tick;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

/// Kick reason sent to sessions that stop heartbeating.
pub const HEARTBEAT_TIMEOUT_REASON: &str = "heartbeat timeout";

pub struct HeartbeatMonitor {
    pool: Arc<SessionPool>,
    timeout: Duration,
    metrics: Arc<Metrics>,
    heartbeat_packet: Bytes,
    kick_packet: Bytes,
}

/// Outcome of one monitor pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CheckReport {
    pub kicked: usize,
    pub heartbeats_sent: usize,
    pub swept: usize,
}

impl HeartbeatMonitor {
    pub fn new(
        pool: Arc<SessionPool>,
        encoder: &dyn PacketEncoder,
        timeout: Duration,
        metrics: Arc<Metrics>,
    ) -> Result<Self> {
        if timeout.is_zero() {
            return Err(ProtocolError::ConfigError(
                "heartbeat timeout must be greater than zero".into(),
            ));
        }
        let kick_body = KickReason {
            reason: HEARTBEAT_TIMEOUT_REASON.into(),
        }
        .to_bytes()?;
        Ok(Self {
            pool,
            timeout,
            metrics,
            heartbeat_packet: encoder.encode_packet(PacketType::Heartbeat, &[])?,
            kick_packet: encoder.encode_packet(PacketType::Kick, &kick_body)?,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run until the die signal fires.
    #[instrument(skip_all, fields(timeout_ms = self.timeout.as_millis() as u64))]
    pub async fn run(self, mut die: DieListener) {
        let tick = heartbeat_tick(self.timeout);
        let mut interval = interval_at(Instant::now() + tick, tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(tick_ms = tick.as_millis() as u64, "Heartbeat monitor started");

        loop {
            tokio::select! {
                biased;
                _ = die.fired() => {
                    info!("Heartbeat monitor stopping");
                    return;
                }
                _ = interval.tick() => {
                    let report = self.check();
                    if report.kicked > 0 {
                        debug!(kicked = report.kicked, "Heartbeat pass kicked idle sessions");
                    }
                }
            }
        }
    }

    /// One pass over the pool.
    pub fn check(&self) -> CheckReport {
        let mut report = CheckReport::default();

        for session in self.pool.snapshot() {
            if session.is_closed() {
                if self.sweep(&session) {
                    report.swept += 1;
                }
                continue;
            }

            if session.idle_for() > self.timeout {
                self.expire(&session);
                report.kicked += 1;
                continue;
            }

            if session.is_active() {
                match session.try_send(self.heartbeat_packet.clone()) {
                    Ok(true) => report.heartbeats_sent += 1,
                    Ok(false) => debug!(session_id = session.id(), "Outbound full, heartbeat skipped"),
                    Err(_) => {}
                }
            }
        }

        report
    }

    /// Drop a closed session from the pool. Returns `false` if someone else
    /// already removed (and counted) it.
    fn sweep(&self, session: &Session) -> bool {
        let removed = self.pool.remove(session.id()).is_some();
        if removed {
            self.metrics.session_closed();
        }
        removed
    }

    fn expire(&self, session: &Arc<Session>) {
        warn!(
            session_id = session.id(),
            idle_ms = session.idle_for().as_millis() as u64,
            "Session heartbeat timed out, kicking"
        );
        // Best effort: a full or closed outbound queue just means the client
        // never sees the reason.
        let _ = session.try_send(self.kick_packet.clone());
        session.close();
        if self.pool.remove(session.id()).is_some() {
            self.metrics.session_closed();
        }
        self.metrics.heartbeat_timeout();
    }
}
