//! Outbound side of a connection: validation, flood control and the writer task

use std::num::NonZeroU32;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use futures_util::SinkExt;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::FramedWrite;
use crate::application::errors::ConnectionError;
use super::codec::IrcLineCodec;

/// Longest outgoing line, CRLF excluded
pub const MAX_LINE_BYTES: usize = 510;

/// Check a line before it is queued. A trailing terminator is tolerated and
/// removed; any other CR, LF or NUL is rejected.
pub fn sanitize(line: &str) -> Result<&str, ConnectionError> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.is_empty() {
        return Err(ConnectionError::InvalidLine("empty line".to_string()));
    }
    if line.contains(['\r', '\n', '\0']) {
        return Err(ConnectionError::InvalidLine(format!("control characters in {:?}", line)));
    }
    if line.len() > MAX_LINE_BYTES {
        return Err(ConnectionError::LineTooLong {
            actual: line.len(),
            limit: MAX_LINE_BYTES,
        });
    }
    Ok(line)
}

fn verb(line: &str) -> &str {
    line.split(' ').next().unwrap_or_default()
}

/// Queue handle for lines going to the server
#[derive(Clone)]
pub struct Outbound {
    tx: mpsc::UnboundedSender<String>,
    urgent_tx: mpsc::UnboundedSender<String>,
}

impl Outbound {
    /// Queue a line behind the flood gate
    pub fn send(&self, line: &str) -> Result<(), ConnectionError> {
        let line = sanitize(line)?;
        self.tx
            .send(line.to_string())
            .map_err(|_| ConnectionError::WriterClosed)
    }

    /// Queue a line that skips the flood gate (PING/PONG)
    pub(crate) fn send_urgent(&self, line: &str) -> Result<(), ConnectionError> {
        let line = sanitize(line)?;
        self.urgent_tx
            .send(line.to_string())
            .map_err(|_| ConnectionError::WriterClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Token bucket pacing ordinary lines
pub struct FloodGate {
    limiter: DefaultDirectRateLimiter,
}

impl FloodGate {
    /// `burst` lines back to back, then one more per `interval`
    pub fn new(burst: u32, interval: Duration) -> Self {
        let burst = NonZeroU32::new(burst).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::with_period(interval.max(Duration::from_millis(1)))
            .unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN))
            .allow_burst(burst);
        Self {
            limiter: RateLimiter::direct(quota),
        }
    }

    pub async fn wait(&self) {
        self.limiter.until_ready().await;
    }
}

/// The running writer task
pub struct WriterHandle {
    task: JoinHandle<()>,
    quit_sent: Arc<AtomicBool>,
}

impl WriterHandle {
    /// Whether a QUIT has gone out on this connection
    pub fn quit_sent(&self) -> bool {
        self.quit_sent.load(Ordering::SeqCst)
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub fn abort(&self) {
        self.task.abort();
    }
}

/// Start the single task that owns the write half. Urgent lines always go
/// first; ordinary lines wait for the flood gate.
pub fn spawn_writer<W>(writer: W, gate: FloodGate) -> (Outbound, WriterHandle)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let (urgent_tx, mut urgent_rx) = mpsc::unbounded_channel::<String>();
    let quit_sent = Arc::new(AtomicBool::new(false));
    let quit_flag = quit_sent.clone();

    let task = tokio::spawn(async move {
        let mut sink = FramedWrite::new(writer, IrcLineCodec::new());
        'writer: loop {
            let line = tokio::select! {
                biased;
                Some(line) = urgent_rx.recv() => line,
                Some(line) = rx.recv() => loop {
                    // PING/PONG keep flowing while this line waits for the gate
                    tokio::select! {
                        biased;
                        Some(urgent) = urgent_rx.recv() => {
                            if write_line(&mut sink, urgent, &quit_flag).await.is_err() {
                                break 'writer;
                            }
                        }
                        _ = gate.wait() => break line,
                    }
                },
                else => break,
            };

            if write_line(&mut sink, line, &quit_flag).await.is_err() {
                break;
            }
        }
        tracing::debug!("Writer task finished");
    });

    (Outbound { tx, urgent_tx }, WriterHandle { task, quit_sent })
}

async fn write_line<W>(
    sink: &mut FramedWrite<W, IrcLineCodec>,
    line: String,
    quit_flag: &AtomicBool,
) -> Result<(), ConnectionError>
where
    W: AsyncWrite + Unpin,
{
    let is_quit = verb(&line).eq_ignore_ascii_case("QUIT");
    if is_quit {
        quit_flag.store(true, Ordering::SeqCst);
    }

    if verb(&line).eq_ignore_ascii_case("PASS") {
        tracing::debug!(">> PASS ********");
    } else {
        tracing::debug!(">> {}", line);
    }

    if let Err(e) = sink.send(line).await {
        tracing::error!("Write failed: {}", e);
        return Err(e);
    }
    if is_quit {
        tracing::info!("QUIT sent");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("PRIVMSG #a :hi\r\n").unwrap(), "PRIVMSG #a :hi");
        assert!(sanitize("").is_err());
        assert!(sanitize("\r\n").is_err());
        assert!(sanitize("PRIVMSG #a :hi\r\nQUIT").is_err());
        assert!(sanitize("PRIVMSG #a :a\0b").is_err());

        let long = format!("PRIVMSG #a :{}", "x".repeat(600));
        assert!(matches!(sanitize(&long), Err(ConnectionError::LineTooLong { limit: 510, .. })));
    }

    #[tokio::test]
    async fn test_writer_orders_and_flags_quit() {
        let (client, mut server) = tokio::io::duplex(4096);
        let (outbound, handle) = spawn_writer(client, FloodGate::new(10, Duration::from_millis(10)));

        outbound.send("NICK mirbot").unwrap();
        outbound.send("QUIT :bye").unwrap();
        drop(outbound);

        let mut received = String::new();
        server.read_to_string(&mut received).await.unwrap();
        assert_eq!(received, "NICK mirbot\r\nQUIT :bye\r\n");
        assert!(handle.quit_sent());
    }

    #[tokio::test]
    async fn test_flood_gate_spaces_lines_after_burst() {
        use tokio::io::{AsyncBufReadExt, BufReader};
        use tokio::time::Instant;

        let interval = Duration::from_millis(100);
        let (client, server) = tokio::io::duplex(4096);
        let (outbound, _handle) = spawn_writer(client, FloodGate::new(2, interval));

        let start = Instant::now();
        for n in 0..5 {
            outbound.send(&format!("PRIVMSG #a :{}", n)).unwrap();
        }

        let mut lines = BufReader::new(server).lines();
        let mut arrivals = Vec::new();
        for _ in 0..5 {
            lines.next_line().await.unwrap().unwrap();
            arrivals.push(start.elapsed());
        }

        // The burst goes out at once, then one line per interval
        assert!(arrivals[1] < interval);
        for pair in arrivals[1..].windows(2) {
            assert!(pair[1] - pair[0] >= interval - Duration::from_millis(10), "{:?}", arrivals);
        }
    }

    #[tokio::test]
    async fn test_urgent_lines_skip_the_gate() {
        use tokio::io::{AsyncBufReadExt, BufReader};

        let (client, server) = tokio::io::duplex(4096);
        let (outbound, _handle) = spawn_writer(client, FloodGate::new(1, Duration::from_secs(60)));

        outbound.send("PRIVMSG #a :first").unwrap();
        outbound.send("PRIVMSG #a :held").unwrap();

        let mut lines = BufReader::new(server).lines();
        assert_eq!(lines.next_line().await.unwrap().unwrap(), "PRIVMSG #a :first");

        // "held" is now waiting on the gate; the PONG must not queue behind it
        outbound.send_urgent("PONG :x").unwrap();
        let next = tokio::time::timeout(Duration::from_secs(1), lines.next_line())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(next, "PONG :x");
        assert!(tokio::time::timeout(Duration::from_millis(200), lines.next_line()).await.is_err());
    }

    #[tokio::test]
    async fn test_closed_writer_reports_error() {
        let (client, _server) = tokio::io::duplex(64);
        let (outbound, handle) = spawn_writer(client, FloodGate::new(1, Duration::from_millis(1)));
        handle.abort();
        let _ = handle.task.await;
        assert!(matches!(outbound.send("PING :x"), Err(ConnectionError::WriterClosed)));
    }
}
