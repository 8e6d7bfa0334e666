//! Default timings.

use std::time::Duration;

/// Sessions silent for longer than this are kicked
pub const HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(30);

/// How long workers keep draining queued work after the die signal fires
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Smallest heartbeat check interval, so tiny timeouts cannot spin the monitor
pub const MIN_HEARTBEAT_TICK: Duration = Duration::from_millis(10);

/// Heartbeat interval advertised to clients. Half the timeout, so a client
/// keeping to it has a full interval of slack before it is kicked. Zero when
/// heartbeats are not checked.
pub fn heartbeat_interval(timeout: Duration) -> Duration {
    timeout / 2
}

/// Interval between heartbeat checks for a given timeout.
pub fn heartbeat_tick(timeout: Duration) -> Duration {
    (timeout / 2).max(MIN_HEARTBEAT_TICK)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_is_half_the_timeout() {
        assert_eq!(heartbeat_tick(Duration::from_secs(2)), Duration::from_secs(1));
        assert_eq!(heartbeat_tick(Duration::from_millis(4)), MIN_HEARTBEAT_TICK);
    }

    #[test]
    fn test_advertised_interval_is_below_timeout() {
        for ms in [1u64, 500, 1000, 30_000] {
            let timeout = Duration::from_millis(ms);
            assert!(heartbeat_interval(timeout) < timeout);
        }
        assert_eq!(heartbeat_interval(Duration::ZERO), Duration::ZERO);
    }
}
