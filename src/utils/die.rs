//! Process-wide die signal.
//!
//! A single boolean broadcast: once fired it stays fired, and every clone and
//! every listener observes it. The dispatch workers, remote workers and the
//! heartbeat monitor all select on it to begin their shutdown drain.

use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

/// Cloneable handle that can fire the signal or create listeners.
#[derive(Debug, Clone)]
pub struct DieSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for DieSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl DieSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Request process shutdown. Idempotent.
    pub fn fire(&self) {
        let changed = self.tx.send_if_modified(|fired| {
            if *fired {
                false
            } else {
                *fired = true;
                true
            }
        });
        if changed {
            info!("Die signal fired, shutting down");
        }
    }

    pub fn is_fired(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> DieListener {
        DieListener {
            rx: self.tx.subscribe(),
        }
    }
}

/// Receiving side of a [`DieSignal`].
#[derive(Debug, Clone)]
pub struct DieListener {
    rx: watch::Receiver<bool>,
}

impl DieListener {
    /// Resolves once the signal has fired; immediately if it already has.
    pub async fn fired(&mut self) {
        // The sender lives inside every DieSignal clone; if all of them are
        // gone nobody can fire any more, so treat that as a shutdown too.
        let _ = self.rx.wait_for(|fired| *fired).await;
    }

    pub fn is_fired(&self) -> bool {
        *self.rx.borrow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_listener_wakes_on_fire() {
        let die = DieSignal::new();
        let mut listener = die.subscribe();
        assert!(!listener.is_fired());

        let waiter = tokio::spawn(async move {
            listener.fired().await;
        });
        die.fire();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("listener should wake")
            .expect("task should not panic");
        assert!(die.is_fired());
    }

    #[tokio::test]
    async fn test_late_listener_sees_fired_state() {
        let die = DieSignal::new();
        die.fire();
        die.fire();
        let mut listener = die.clone().subscribe();
        tokio::time::timeout(Duration::from_millis(100), listener.fired())
            .await
            .expect("already fired");
    }
}
