//! Connectivity monitor.
//!
//! Observes online/offline transitions and publishes them on a
//! single-consumer event channel. The sync engine's drain trigger task is
//! the only subscriber; this is the one component permitted to invoke the
//! sync queue without a direct caller request.

use tokio::sync::watch;

/// Publishes online/offline transitions.
pub struct ConnectivityMonitor {
    tx: watch::Sender<bool>,
}

impl ConnectivityMonitor {
    /// Build a monitor with the platform's current network status.
    #[must_use]
    pub fn new(initially_online: bool) -> Self {
        let (tx, _rx) = watch::channel(initially_online);
        Self { tx }
    }

    /// Current connectivity state.
    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    /// Report a platform connectivity change. Repeated reports of the same
    /// state publish nothing.
    pub fn set_online(&self, online: bool) {
        let changed = self.tx.send_if_modified(|state| {
            if *state == online {
                false
            } else {
                *state = online;
                true
            }
        });
        if changed {
            tracing::info!(
                "Connectivity transition: now {}",
                if online { "online" } else { "offline" }
            );
        }
    }

    /// Subscribe to connectivity transitions.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_state_comes_from_the_platform() {
        assert!(ConnectivityMonitor::new(true).is_online());
        assert!(!ConnectivityMonitor::new(false).is_online());
    }

    #[tokio::test]
    async fn subscribers_observe_transitions() {
        let monitor = ConnectivityMonitor::new(false);
        let mut rx = monitor.subscribe();

        monitor.set_online(true);
        rx.changed().await.unwrap();
        assert!(*rx.borrow());
    }

    #[test]
    fn repeated_state_is_not_a_transition() {
        let monitor = ConnectivityMonitor::new(true);
        let rx = monitor.subscribe();

        monitor.set_online(true);
        assert!(!rx.has_changed().unwrap());
    }
}
