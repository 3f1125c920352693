//! Keepalive supervision for upgraded connections.
//!
//! # Responsibilities
//! - Send a ping every `ping_period` while the session is active
//! - Track the liveness window (read deadline) of a connection
//! - Stop exactly once when the session tears down
//!
//! # State Machine
//! ```text
//! Active ──stop signal / handle dropped──▶ Stopped
//! ```
//!
//! # Design Decisions
//! - A failed ping is logged at debug and never ends the session; the
//!   read deadline is the authoritative liveness check
//! - The deadline lives in the read path and is moved only by pongs,
//!   so it needs no lock

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior, Sleep};
use tokio_tungstenite::tungstenite::Message;

use crate::observability::metrics;

/// Stand-in deadline for timeouts too large to add to `Instant::now()`.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// Ping period for a given liveness timeout (nine tenths of it).
pub fn ping_period(liveness: Duration) -> Duration {
    liveness / 10 * 9
}

/// `now + timeout`, saturating at a far-future instant.
fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout).unwrap_or_else(|| now + FAR_FUTURE)
}

/// Read deadline of one connection.
#[derive(Debug)]
pub struct LivenessWindow {
    timeout: Duration,
    deadline: Pin<Box<Sleep>>,
}

impl LivenessWindow {
    /// Arm a window that expires `timeout` from now.
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            deadline: Box::pin(time::sleep(timeout)),
        }
    }

    /// Record a liveness acknowledgement, pushing the deadline to now + timeout.
    pub fn acknowledge(&mut self) {
        let next = deadline_after(self.timeout);
        self.deadline.as_mut().reset(next);
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline()
    }

    pub fn deadline(&self) -> Instant {
        self.deadline.deadline()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Resolves once the deadline has passed.
    pub fn poll_expired(&mut self, cx: &mut Context<'_>) -> Poll<()> {
        self.deadline.as_mut().poll(cx)
    }
}

/// Periodic pinger bound to one connection's control queue.
#[derive(Debug)]
pub struct Keepalive {
    pings: mpsc::Sender<Message>,
    period: Duration,
    write_wait: Duration,
}

impl Keepalive {
    pub fn new(pings: mpsc::Sender<Message>, period: Duration, write_wait: Duration) -> Self {
        Self {
            pings,
            period,
            write_wait,
        }
    }

    /// Start pinging on a background task.
    pub fn spawn(self) -> KeepaliveHandle {
        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(self.run(stop_rx));
        KeepaliveHandle {
            stop: Some(stop_tx),
            task,
        }
    }

    async fn run(self, mut stop: oneshot::Receiver<()>) {
        let mut ticker = time::interval_at(deadline_after(self.period), self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                // Also fires when the handle is dropped without an explicit stop.
                _ = &mut stop => break,
                _ = ticker.tick() => {
                    let ping = Message::Ping(Bytes::new());
                    if let Err(e) = self.pings.send_timeout(ping, self.write_wait).await {
                        tracing::debug!(error = %e, "Failed to send ping message");
                        metrics::record_ping_failure();
                    }
                }
            }
        }

        tracing::trace!("Keepalive stopped");
    }
}

/// Owner side of a running [`Keepalive`]. Dropping it stops the pinger.
#[derive(Debug)]
pub struct KeepaliveHandle {
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl KeepaliveHandle {
    /// Signal the pinger and wait for it to exit.
    pub async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Err(e) = (&mut self.task).await {
            tracing::debug!(error = %e, "Keepalive task ended abnormally");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for KeepaliveHandle {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}
