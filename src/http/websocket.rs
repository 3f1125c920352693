//! Byte-stream view of an upgraded WebSocket connection.
//!
//! # Responsibilities
//! - Expose a `WebSocketStream` as `AsyncRead + AsyncWrite`
//! - Enforce the liveness window on the read path
//! - Serialize data and control frames through one writer task
//!
//! # Data Flow
//! ```text
//! peer ──frames──▶ reader (buffer, pong → deadline) ──bytes──▶ bridge
//! bridge ──bytes──▶ PollSender ─┐
//! keepalive ──pings──▶ Sender ──┴──▶ write queue ──▶ writer task ──frames──▶ peer
//! ```
//!
//! # Design Decisions
//! - Message boundaries are invisible to readers; a frame larger than the
//!   caller's buffer is drained over several reads
//! - Text and binary frames both carry payload bytes
//! - Only pongs move the read deadline

use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use std::time::Duration;

use bytes::{Buf, Bytes};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, Stream, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::WebSocketStream;
use tokio_util::sync::PollSender;

use crate::net::keepalive::{ping_period, Keepalive, LivenessWindow};

/// Frames queued for the writer task before writers are backpressured.
const WRITE_QUEUE_DEPTH: usize = 32;

type FrameStream = Pin<Box<dyn Stream<Item = Result<Message, WsError>> + Send>>;

/// Timing parameters of an upgraded connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnTimeouts {
    /// Maximum silence (no pong) before reads fail.
    pub liveness: Duration,
    /// Bound on a single frame write, pings included.
    pub write_wait: Duration,
}

impl ConnTimeouts {
    pub fn ping_period(&self) -> Duration {
        ping_period(self.liveness)
    }
}

impl Default for ConnTimeouts {
    fn default() -> Self {
        Self {
            liveness: Duration::from_secs(60),
            write_wait: Duration::from_secs(10),
        }
    }
}

/// Upgraded connection seen as a continuous byte stream.
///
/// Owned by exactly one session; [`UpgradeConn::close`] consumes it.
pub struct UpgradeConn {
    reader: FrameStream,
    pending: Bytes,
    liveness: LivenessWindow,
    eof: bool,
    writer: PollSender<Message>,
    control: mpsc::Sender<Message>,
    writer_task: JoinHandle<()>,
    timeouts: ConnTimeouts,
}

impl UpgradeConn {
    /// Wrap an established WebSocket. Must be called inside a Tokio runtime.
    pub fn new<S>(ws: WebSocketStream<S>, timeouts: ConnTimeouts) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (sink, stream) = ws.split();
        let (tx, rx) = mpsc::channel(WRITE_QUEUE_DEPTH);
        let writer_task = tokio::spawn(write_frames(sink, rx, timeouts.write_wait));

        Self {
            reader: Box::pin(stream),
            pending: Bytes::new(),
            liveness: LivenessWindow::new(timeouts.liveness),
            eof: false,
            writer: PollSender::new(tx.clone()),
            control: tx,
            writer_task,
            timeouts,
        }
    }

    /// Pinger for this connection, not yet started.
    pub fn keepalive(&self) -> Keepalive {
        Keepalive::new(
            self.control.clone(),
            self.timeouts.ping_period(),
            self.timeouts.write_wait,
        )
    }

    pub fn timeouts(&self) -> ConnTimeouts {
        self.timeouts
    }

    /// Current read deadline.
    pub fn read_deadline(&self) -> tokio::time::Instant {
        self.liveness.deadline()
    }

    /// Send a close frame and wait for the writer to drain.
    pub async fn close(self) {
        let Self {
            writer,
            control,
            writer_task,
            timeouts,
            ..
        } = self;
        drop(writer);

        if control
            .send_timeout(Message::Close(None), timeouts.write_wait)
            .await
            .is_err()
        {
            tracing::trace!("Writer already gone when closing");
        }
        drop(control);

        match timeout(timeouts.write_wait, writer_task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::debug!(error = %e, "WebSocket writer ended abnormally"),
            Err(_) => tracing::debug!("WebSocket writer did not finish before close deadline"),
        }
    }
}

impl std::fmt::Debug for UpgradeConn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpgradeConn")
            .field("pending", &self.pending.len())
            .field("eof", &self.eof)
            .field("timeouts", &self.timeouts)
            .finish_non_exhaustive()
    }
}

async fn write_frames<S>(
    mut sink: SplitSink<WebSocketStream<S>, Message>,
    mut queue: mpsc::Receiver<Message>,
    write_wait: Duration,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    while let Some(frame) = queue.recv().await {
        let closing = frame.is_close();
        match timeout(write_wait, sink.send(frame)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::debug!(error = %e, "WebSocket write failed");
                break;
            }
            Err(_) => {
                tracing::debug!(?write_wait, "WebSocket write timed out");
                break;
            }
        }
        if closing {
            break;
        }
    }

    queue.close();
    let _ = timeout(write_wait, sink.close()).await;
}

fn liveness_expired() -> io::Error {
    io::Error::new(io::ErrorKind::TimedOut, "no pong received within liveness window")
}

fn broken_pipe() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "websocket writer closed")
}

impl AsyncRead for UpgradeConn {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = &mut *self;

        loop {
            // Data frames do not count as liveness; only pongs move the deadline.
            if !this.eof && this.liveness.is_expired() {
                return Poll::Ready(Err(liveness_expired()));
            }

            if !this.pending.is_empty() {
                let n = this.pending.len().min(buf.remaining());
                buf.put_slice(&this.pending[..n]);
                this.pending.advance(n);
                return Poll::Ready(Ok(()));
            }

            if this.eof {
                return Poll::Ready(Ok(()));
            }

            match this.reader.poll_next_unpin(cx) {
                Poll::Ready(Some(Ok(Message::Binary(data)))) => this.pending = data,
                Poll::Ready(Some(Ok(Message::Text(text)))) => {
                    this.pending = Bytes::copy_from_slice(text.as_str().as_bytes());
                }
                Poll::Ready(Some(Ok(Message::Pong(_)))) => this.liveness.acknowledge(),
                // Pings are answered by tungstenite itself.
                Poll::Ready(Some(Ok(Message::Ping(_) | Message::Frame(_)))) => {}
                Poll::Ready(Some(Ok(Message::Close(_)))) | Poll::Ready(None) => this.eof = true,
                Poll::Ready(Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed))) => {
                    this.eof = true;
                }
                Poll::Ready(Some(Err(e))) => return Poll::Ready(Err(io::Error::other(e))),
                Poll::Pending => {
                    ready!(this.liveness.poll_expired(cx));
                    return Poll::Ready(Err(liveness_expired()));
                }
            }
        }
    }
}

impl AsyncWrite for UpgradeConn {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        if buf.is_empty() {
            return Poll::Ready(Ok(0));
        }

        let this = &mut *self;
        ready!(this.writer.poll_reserve(cx)).map_err(|_| broken_pipe())?;
        this.writer
            .send_item(Message::Binary(Bytes::copy_from_slice(buf)))
            .map_err(|_| broken_pipe())?;
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        // Every queued frame is flushed by the writer task.
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.writer.close();
        Poll::Ready(Ok(()))
    }
}
