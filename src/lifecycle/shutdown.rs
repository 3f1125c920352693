//! Shutdown coordination for servers and forwarders.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::broadcast;

/// Fires once to stop every accept loop.
///
/// Loops subscribe before they start; code that runs after the fact checks
/// [`Shutdown::is_triggered`] instead.
#[derive(Debug)]
pub struct Shutdown {
    tx: broadcast::Sender<()>,
    fired: AtomicBool,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self {
            tx,
            fired: AtomicBool::new(false),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Notify all subscribers. Later calls are no-ops.
    pub fn trigger(&self) {
        if self.fired.swap(true, Ordering::SeqCst) {
            return;
        }
        let listeners = self.tx.send(()).unwrap_or(0);
        tracing::debug!(listeners, "Shutdown triggered");
    }

    pub fn is_triggered(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    /// Number of accept loops still listening.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
