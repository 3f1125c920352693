//! Session identity and lifetime tracking.
//!
//! # Responsibilities
//! - Tag every upgraded session with a unique ID for tracing
//! - Count live sessions so shutdown can wait for them to drain
//! - Keep the active-session gauge in step with the count

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::observability::metrics;

/// Unique identifier for an upgraded session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Counts sessions that are still bridging.
#[derive(Debug, Clone, Default)]
pub struct SessionTracker {
    active: Arc<AtomicU64>,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new session. The returned guard ends it on drop.
    pub fn track(&self) -> SessionGuard {
        self.active.fetch_add(1, Ordering::SeqCst);
        metrics::record_session_opened();
        SessionGuard {
            active: Arc::clone(&self.active),
            id: SessionId::new(),
        }
    }

    pub fn active_count(&self) -> u64 {
        self.active.load(Ordering::SeqCst)
    }

    /// Wait until every session has ended or `limit` elapses.
    ///
    /// Returns `true` if all sessions drained.
    pub async fn wait_for_drain(&self, limit: Duration) -> bool {
        let drained = tokio::time::timeout(limit, async {
            while self.active.load(Ordering::SeqCst) > 0 {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        })
        .await;
        drained.is_ok()
    }
}

/// Lifetime of one session.
#[derive(Debug)]
pub struct SessionGuard {
    active: Arc<AtomicU64>,
    id: SessionId,
}

impl SessionGuard {
    pub fn id(&self) -> SessionId {
        self.id
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
        metrics::record_session_closed();
        tracing::trace!(session_id = %self.id, "Session ended");
    }
}
