//! Duplex byte bridge between two stream endpoints.
//!
//! # Design Decisions
//! - Returns as soon as either direction finishes; the other direction is
//!   cancelled when its future is dropped
//! - Never closes an endpoint, so handlers can write framing before or
//!   after bridging

use std::io;

use tokio::io::{AsyncRead, AsyncWrite};

/// Which copy finished first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// `a` was read, `b` written.
    AToB,
    /// `b` was read, `a` written.
    BToA,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::AToB => f.write_str("a->b"),
            Direction::BToA => f.write_str("b->a"),
        }
    }
}

/// Result of the direction that ended the bridge.
#[derive(Debug)]
pub struct BridgeOutcome {
    pub direction: Direction,
    /// Bytes copied by that direction, or the error that stopped it.
    pub result: io::Result<u64>,
}

impl BridgeOutcome {
    pub fn is_clean(&self) -> bool {
        self.result.is_ok()
    }
}

/// Copy `a → b` and `b → a` concurrently until either side finishes.
pub async fn bridge<A, B>(a: &mut A, b: &mut B) -> BridgeOutcome
where
    A: AsyncRead + AsyncWrite + Unpin + ?Sized,
    B: AsyncRead + AsyncWrite + Unpin + ?Sized,
{
    let (mut a_read, mut a_write) = tokio::io::split(a);
    let (mut b_read, mut b_write) = tokio::io::split(b);

    let outcome = tokio::select! {
        result = tokio::io::copy(&mut a_read, &mut b_write) => BridgeOutcome { direction: Direction::AToB, result },
        result = tokio::io::copy(&mut b_read, &mut a_write) => BridgeOutcome { direction: Direction::BToA, result },
    };

    match &outcome.result {
        Ok(bytes) => tracing::debug!(direction = %outcome.direction, bytes, "Bridge direction finished"),
        Err(e) => tracing::debug!(direction = %outcome.direction, error = %e, "Bridge direction failed"),
    }
    outcome
}
