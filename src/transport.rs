// ===============================
// src/transport.rs
// ===============================
//
// Line-delimited JSON over a single TCP connection:
// - FrameWriter : one JSON document + '\n' per message, loops on partial writes
// - FrameReader : one line per message, decoded once into InboundMessage
// - RateMonitor : advisory only; warns when 500 sends land inside 1s
//
// No retry, no reconnect. Every error here is terminal for the session.
//
use std::collections::VecDeque;
use std::io;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::{info, warn};

use crate::domain::{Dir, InboundMessage, OutboundMessage};
use crate::metrics::{MESSAGES_IN, MESSAGES_OUT, RATE_ADVISORIES};

/// Size of the send-timestamp history.
pub const RATE_HISTORY: usize = 500;
/// Trailing window the full history must not fit into.
pub const RATE_WINDOW: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("socket error: {0}")]
    Io(#[from] io::Error),
    #[error("exchange stopped accepting data (zero-byte write)")]
    PeerClosed,
    #[error("exchange closed the stream")]
    Eof,
    #[error("failed to encode outbound message: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("writer task is gone")]
    WriterGone,
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid direction {0:?}")]
    InvalidDirection(String),
    #[error("malformed message: {0}")]
    Malformed(String),
    #[error("expected hello as first message, got {0}")]
    ExpectedHello(&'static str),
}

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("connect to {addr} failed: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("connect to {addr} timed out after {timeout:?}")]
    Timeout { addr: String, timeout: Duration },
}

#[derive(Debug, Error)]
pub enum ReceiveError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Bounded history of send instants.
#[derive(Debug)]
pub struct RateMonitor {
    stamps: VecDeque<Instant>,
    capacity: usize,
    window: Duration,
}

impl Default for RateMonitor {
    fn default() -> Self { Self::new(RATE_HISTORY, RATE_WINDOW) }
}

impl RateMonitor {
    pub fn new(capacity: usize, window: Duration) -> Self {
        Self { stamps: VecDeque::with_capacity(capacity), capacity, window }
    }

    /// Records one send. Returns true when the whole history fits inside the window.
    pub fn record(&mut self, now: Instant) -> bool {
        if self.stamps.len() == self.capacity {
            self.stamps.pop_front();
        }
        self.stamps.push_back(now);
        match self.stamps.front() {
            Some(oldest) if self.stamps.len() == self.capacity => now.duration_since(*oldest) < self.window,
            _ => false,
        }
    }
}

/// Serialize to a single line. serde_json escapes control characters inside
/// strings, so the only newline is the terminator.
pub fn encode_frame(msg: &OutboundMessage) -> Result<Vec<u8>, TransportError> {
    let mut buf = serde_json::to_vec(msg).map_err(TransportError::Encode)?;
    debug_assert!(!buf.contains(&b'\n'));
    buf.push(b'\n');
    Ok(buf)
}

/// Parse one inbound line. A `dir` field must be exactly BUY or SELL.
pub fn decode_line(line: &str) -> Result<InboundMessage, ProtocolError> {
    let value: serde_json::Value = serde_json::from_str(line)?;
    if !value.is_object() {
        return Err(ProtocolError::Malformed(format!("not an object: {value}")));
    }
    if let Some(dir) = value.get("dir") {
        let raw = dir.as_str().ok_or_else(|| ProtocolError::InvalidDirection(dir.to_string()))?;
        raw.parse::<Dir>().map_err(ProtocolError::InvalidDirection)?;
    }
    serde_json::from_value(value).map_err(|e| ProtocolError::Malformed(e.to_string()))
}

pub struct FrameWriter<W> {
    inner: W,
    rate: RateMonitor,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(inner: W) -> Self { Self { inner, rate: RateMonitor::default() } }

    pub async fn send(&mut self, msg: &OutboundMessage) -> Result<(), TransportError> {
        let frame = encode_frame(msg)?;
        let mut sent = 0;
        while sent < frame.len() {
            let n = self.inner.write(&frame[sent..]).await?;
            if n == 0 {
                return Err(TransportError::PeerClosed);
            }
            sent += n;
        }
        self.inner.flush().await?;
        MESSAGES_OUT.with_label_values(&[msg.kind()]).inc();

        if self.rate.record(Instant::now()) {
            RATE_ADVISORIES.inc();
            warn!(
                sends = RATE_HISTORY,
                window_ms = RATE_WINDOW.as_millis() as u64,
                "sending too frequently, exchange may start ignoring messages"
            );
        }
        Ok(())
    }
}

pub struct FrameReader<R> {
    lines: Lines<R>,
}

impl<R: AsyncBufRead + Unpin> FrameReader<R> {
    pub fn new(inner: R) -> Self { Self { lines: inner.lines() } }

    /// Waits for the next line. Cancel safe (built on `Lines::next_line`).
    pub async fn receive(&mut self) -> Result<InboundMessage, ReceiveError> {
        let line = match self.lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => return Err(TransportError::Eof.into()),
            // Lines reports non-UTF-8 input as InvalidData
            Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                return Err(ProtocolError::Malformed(format!("line is not utf-8: {e}")).into());
            }
            Err(e) => return Err(TransportError::Io(e).into()),
        };
        let msg = decode_line(&line)?;
        MESSAGES_IN.with_label_values(&[msg.kind()]).inc();
        Ok(msg)
    }
}

pub type TcpFrameReader = FrameReader<BufReader<OwnedReadHalf>>;
pub type TcpFrameWriter = FrameWriter<OwnedWriteHalf>;

pub struct Connection {
    pub reader: TcpFrameReader,
    pub writer: TcpFrameWriter,
}

/// Single attempt, no backoff.
pub async fn connect(host: &str, port: u16, timeout: Option<Duration>) -> Result<Connection, ConnectionError> {
    let addr = format!("{host}:{port}");
    info!(%addr, ?timeout, "connecting to exchange");

    let attempt = TcpStream::connect(addr.clone());
    let stream = match timeout {
        Some(t) => match tokio::time::timeout(t, attempt).await {
            Ok(res) => res,
            Err(_) => return Err(ConnectionError::Timeout { addr, timeout: t }),
        },
        None => attempt.await,
    }
    .map_err(|source| ConnectionError::Connect { addr: addr.clone(), source })?;

    // latency > throughput untuk pesan kecil
    let _ = stream.set_nodelay(true);

    let (rd, wr) = stream.into_split();
    Ok(Connection { reader: FrameReader::new(BufReader::new(rd)), writer: FrameWriter::new(wr) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    /// Accepts at most `chunk` bytes per write call.
    struct Trickle {
        chunk: usize,
        out: Vec<u8>,
        calls: usize,
    }

    impl AsyncWrite for Trickle {
        fn poll_write(mut self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
            let n = buf.len().min(self.chunk);
            self.out.extend_from_slice(&buf[..n]);
            self.calls += 1;
            Poll::Ready(Ok(n))
        }
        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> { Poll::Ready(Ok(())) }
        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> { Poll::Ready(Ok(())) }
    }

    #[tokio::test]
    async fn send_loops_over_partial_writes() {
        let mut w = FrameWriter::new(Trickle { chunk: 3, out: Vec::new(), calls: 0 });
        w.send(&OutboundMessage::Cancel { order_id: 42 }).await.unwrap();

        let text = String::from_utf8(w.inner.out.clone()).unwrap();
        assert_eq!(text, "{\"type\":\"cancel\",\"order_id\":42}\n");
        assert!(w.inner.calls > 1);
    }

    #[tokio::test]
    async fn zero_byte_write_is_peer_closed() {
        let mut w = FrameWriter::new(Trickle { chunk: 0, out: Vec::new(), calls: 0 });
        let err = w.send(&OutboundMessage::Hello { team: "MANKEY".into() }).await.unwrap_err();
        assert!(matches!(err, TransportError::PeerClosed));
    }

    #[tokio::test]
    async fn receive_decodes_each_line() {
        let (mut exch, client) = tokio::io::duplex(1024);
        let mut reader = FrameReader::new(BufReader::new(client));

        exch.write_all(b"{\"type\":\"ack\",\"order_id\":1}\n{\"type\":\"fill\",\"order_id\":1,\"symbol\":\"XLF\",\"dir\":\"SELL\",\"price\":50,\"size\":4}\n")
            .await
            .unwrap();

        assert_eq!(reader.receive().await.unwrap(), InboundMessage::Ack { order_id: 1 });
        match reader.receive().await.unwrap() {
            InboundMessage::Fill { dir, size, .. } => {
                assert_eq!(dir, Dir::Sell);
                assert_eq!(size, 4);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn invalid_direction_is_protocol_error() {
        let (mut exch, client) = tokio::io::duplex(1024);
        let mut reader = FrameReader::new(BufReader::new(client));
        exch.write_all(b"{\"type\":\"fill\",\"order_id\":1,\"symbol\":\"XLF\",\"dir\":\"HOLD\",\"price\":50,\"size\":4}\n")
            .await
            .unwrap();

        let err = reader.receive().await.unwrap_err();
        assert!(matches!(err, ReceiveError::Protocol(ProtocolError::InvalidDirection(ref d)) if d == "HOLD"));
    }

    #[tokio::test]
    async fn non_utf8_line_is_protocol_error() {
        let (mut exch, client) = tokio::io::duplex(1024);
        let mut reader = FrameReader::new(BufReader::new(client));
        exch.write_all(b"{\"type\":\"error\",\"error\":\"\xff\"}\n").await.unwrap();

        let err = reader.receive().await.unwrap_err();
        assert!(matches!(err, ReceiveError::Protocol(ProtocolError::Malformed(_))));
    }

    #[tokio::test]
    async fn end_of_stream_is_eof() {
        let (exch, client) = tokio::io::duplex(64);
        drop(exch);
        let mut reader = FrameReader::new(BufReader::new(client));
        let err = reader.receive().await.unwrap_err();
        assert!(matches!(err, ReceiveError::Transport(TransportError::Eof)));
    }

    #[test]
    fn garbage_line_is_json_error() {
        assert!(matches!(decode_line("not json"), Err(ProtocolError::Json(_))));
        assert!(matches!(decode_line("[1,2]"), Err(ProtocolError::Malformed(_))));
    }

    #[test]
    fn rate_monitor_flags_only_full_history_inside_window() {
        let mut m = RateMonitor::new(500, Duration::from_secs(1));
        let t0 = Instant::now();
        for _ in 0..499 {
            assert!(!m.record(t0));
        }
        assert!(m.record(t0 + Duration::from_millis(10)));

        // history spread over more than a second: no advisory
        let mut slow = RateMonitor::new(5, Duration::from_secs(1));
        for i in 0..10u64 {
            assert!(!slow.record(t0 + Duration::from_millis(300 * i)));
        }
    }
}
