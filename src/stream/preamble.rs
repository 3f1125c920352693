//! Length-prefixed routing preamble.
//!
//! Wire format:
//! ```text
//! ┌────────────────┬───────────────────────────────────────────┐
//! │ len: u16 (BE)  │ JSON {"Destination": "...", "JWT": "..."} │
//! └────────────────┴───────────────────────────────────────────┘
//! ```
//! Sent once, right after the upgrade and before any payload, to backends
//! that need the final destination and an auth token up front.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Width of the length prefix in bytes.
pub const PREAMBLE_LENGTH_PREFIX: usize = 2;

/// Largest JSON payload the prefix can describe.
pub const MAX_PREAMBLE_PAYLOAD: usize = u16::MAX as usize;

#[derive(Debug, Error)]
pub enum PreambleError {
    #[error("preamble payload too large: {len} bytes (max {MAX_PREAMBLE_PAYLOAD})")]
    TooLarge { len: usize },

    #[error("truncated preamble: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("invalid preamble JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("preamble I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Destination and token announced to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preamble {
    #[serde(rename = "Destination")]
    pub destination: String,
    #[serde(rename = "JWT")]
    pub token: String,
}

impl Preamble {
    pub fn new(destination: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            destination: destination.into(),
            token: token.into(),
        }
    }

    /// Serialize into a complete frame, prefix included.
    pub fn encode(&self) -> Result<Vec<u8>, PreambleError> {
        let payload = serde_json::to_vec(self)?;
        let len = u16::try_from(payload.len()).map_err(|_| PreambleError::TooLarge { len: payload.len() })?;

        let mut frame = Vec::with_capacity(PREAMBLE_LENGTH_PREFIX + payload.len());
        frame.extend_from_slice(&len.to_be_bytes());
        frame.extend_from_slice(&payload);
        Ok(frame)
    }

    /// Parse a frame produced by [`Preamble::encode`]. Trailing bytes are ignored.
    pub fn decode(frame: &[u8]) -> Result<Self, PreambleError> {
        if frame.len() < PREAMBLE_LENGTH_PREFIX {
            return Err(PreambleError::Truncated {
                expected: PREAMBLE_LENGTH_PREFIX,
                actual: frame.len(),
            });
        }

        let len = u16::from_be_bytes([frame[0], frame[1]]) as usize;
        let end = PREAMBLE_LENGTH_PREFIX + len;
        if frame.len() < end {
            return Err(PreambleError::Truncated {
                expected: end,
                actual: frame.len(),
            });
        }

        Ok(serde_json::from_slice(&frame[PREAMBLE_LENGTH_PREFIX..end])?)
    }
}

/// Encode a preamble for `destination` and `token`.
pub fn encode(destination: &str, token: &str) -> Result<Vec<u8>, PreambleError> {
    Preamble::new(destination, token).encode()
}

/// Write a preamble frame. Nothing is written if encoding fails.
pub async fn write_preamble<W>(stream: &mut W, destination: &str, token: &str) -> Result<(), PreambleError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let frame = encode(destination, token)?;
    stream.write_all(&frame).await?;
    stream.flush().await?;
    Ok(())
}

/// Read one preamble frame, leaving the rest of the stream untouched.
pub async fn read_preamble<R>(stream: &mut R) -> Result<Preamble, PreambleError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let len = stream.read_u16().await? as usize;
    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload).await?;
    Ok(serde_json::from_slice(&payload)?)
}
