//! Transport-independent accept loop and per-connection protocol handler.
//!
//! Each transport (TCP, RFCOMM) provides a [`TransportEndpoint`]; this module
//! runs it on a dedicated thread:
//!
//! ```text
//! loop while running:
//!   accept (bounded by timeouts.accept)
//!     ├─ timeout      -> check running flag, loop
//!     ├─ error        -> log, back off, loop
//!     └─ connection   -> read one message, reply / dispatch, close
//! ```
//!
//! # Reading one message
//!
//! There is no length header, so a message ends when any of these happens:
//! the peer half-closes, [`MAX_MESSAGE_SIZE`] bytes are buffered, the buffer
//! already holds a complete message, or no new bytes arrive for
//! `timeouts.settle` after the first one.  Before the first byte the longer
//! `timeouts.idle` allowance applies.  Reads wake at least every
//! `timeouts.accept` to notice shutdown.

use std::io::{self, Read, Write};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use orderboard_core::protocol::{
    decode_message, is_complete_message, DecodeOptions, Message, MAX_MESSAGE_SIZE, PONG,
};
use tracing::{debug, error, info, warn};

use crate::application::dispatch::{Handoff, SnapshotSender, TransportKind};
use crate::infrastructure::network::TransportError;

/// An accepted client connection.
pub trait Connection: Read + Write + Send {
    /// Bounds how long a single `read` may block.  `None` blocks indefinitely.
    fn set_receive_timeout(&self, timeout: Option<Duration>) -> io::Result<()>;
}

/// A bound, listening endpoint for one transport.
pub trait TransportEndpoint: Send + 'static {
    /// Connection type produced by [`accept_timeout`](Self::accept_timeout).
    type Conn: Connection;

    /// Which transport this endpoint serves.
    fn kind(&self) -> TransportKind;

    /// Human-readable local address, for logs.
    fn local_description(&self) -> String;

    /// Waits up to `timeout` for a client.
    ///
    /// Returns `Ok(None)` if nobody connected in time, or the connection and
    /// a printable peer address.
    fn accept_timeout(&self, timeout: Duration) -> io::Result<Option<(Self::Conn, String)>>;
}

/// Timing knobs for the accept loop and message reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerTimeouts {
    /// Longest single accept wait; also bounds shutdown latency.
    pub accept: Duration,
    /// Wait for the first byte of a fresh connection.
    pub idle: Duration,
    /// Wait for further bytes once a message has started.
    pub settle: Duration,
    /// Pause after an accept error before retrying.
    pub error_backoff: Duration,
}

impl Default for ListenerTimeouts {
    fn default() -> Self {
        Self {
            accept: Duration::from_secs(1),
            idle: Duration::from_secs(5),
            settle: Duration::from_millis(250),
            error_backoff: Duration::from_secs(1),
        }
    }
}

/// Settings shared by every connection a listener serves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListenerOptions {
    /// Timeouts for accept and reads.
    pub timeouts: ListenerTimeouts,
    /// Payload decoding policy.
    pub decode: DecodeOptions,
}

/// What happened on one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionOutcome {
    /// The peer closed without sending anything.
    Empty,
    /// A heartbeat was answered.
    Heartbeat,
    /// A snapshot was handed to the dispatcher.
    Dispatched,
    /// A snapshot was decoded but the board consumer has stopped.
    DispatchFailed,
    /// The payload could not be decoded; nothing was dispatched.
    Rejected,
}

/// Handle to a running listener thread.
#[derive(Debug)]
pub struct ListenerHandle {
    kind: TransportKind,
    thread: JoinHandle<()>,
}

impl ListenerHandle {
    /// Transport served by this listener.
    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    /// Returns `true` once the listener thread has exited.
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Waits for the listener thread to exit.
    ///
    /// The caller must clear the shared `running` flag first, otherwise this
    /// blocks forever.
    pub fn join(self) {
        if self.thread.join().is_err() {
            error!("{} listener thread panicked", self.kind);
        }
    }
}

/// Starts `endpoint` on its own thread.
///
/// The thread runs until `running` is cleared, then drops the endpoint,
/// closing its socket.
///
/// # Errors
///
/// Returns [`TransportError::Spawn`] if the OS refuses to create the thread.
pub fn spawn_listener<E: TransportEndpoint>(
    endpoint: E,
    options: ListenerOptions,
    sender: SnapshotSender,
    running: Arc<AtomicBool>,
) -> Result<ListenerHandle, TransportError> {
    let kind = endpoint.kind();
    let thread = thread::Builder::new()
        .name(format!("orderboard-{kind}"))
        .spawn(move || accept_loop(endpoint, options, sender, running))
        .map_err(|source| TransportError::Spawn {
            transport: kind,
            source,
        })?;

    Ok(ListenerHandle { kind, thread })
}

/// The accept loop executed on the listener thread.
fn accept_loop<E: TransportEndpoint>(
    endpoint: E,
    options: ListenerOptions,
    sender: SnapshotSender,
    running: Arc<AtomicBool>,
) {
    let kind = endpoint.kind();
    info!("{kind} listener accepting on {}", endpoint.local_description());

    while running.load(Ordering::Relaxed) {
        match endpoint.accept_timeout(options.timeouts.accept) {
            Ok(Some((conn, peer))) => {
                debug!("{kind} connection from {peer}");
                match handle_connection(conn, kind, &options, &sender, &running) {
                    Ok(outcome) => debug!("{kind} connection from {peer} closed: {outcome:?}"),
                    Err(e) => warn!("{kind} connection from {peer} failed: {e}"),
                }
            }
            Ok(None) => {}
            Err(e) if is_timeout_error(&e) || e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => {
                error!(
                    "{kind} accept error: {e}; retrying in {:?}",
                    options.timeouts.error_backoff
                );
                sleep_while_running(options.timeouts.error_backoff, &running);
            }
        }
    }

    drop(endpoint);
    info!("{kind} listener stopped");
}

/// Runs the one-shot protocol on `conn` and closes it.
///
/// A heartbeat is answered with `pong`; a snapshot is submitted to `sender`;
/// anything else is logged and dropped.  The connection is closed when this
/// returns, whatever the outcome.
///
/// # Errors
///
/// Returns the I/O error if reading times out before any data arrives, the
/// read fails, the reply cannot be written, or shutdown interrupts the read.
pub fn handle_connection<C: Connection>(
    mut conn: C,
    kind: TransportKind,
    options: &ListenerOptions,
    sender: &SnapshotSender,
    running: &AtomicBool,
) -> io::Result<ConnectionOutcome> {
    let bytes = read_message(&mut conn, &options.timeouts, running)?;
    if bytes.is_empty() {
        return Ok(ConnectionOutcome::Empty);
    }

    match decode_message(&bytes, options.decode) {
        Ok(Message::Ping) => {
            conn.write_all(PONG)?;
            conn.flush()?;
            Ok(ConnectionOutcome::Heartbeat)
        }
        Ok(Message::Snapshot(snapshot)) => match sender.submit(kind, snapshot) {
            Ok(Handoff::Queued) => Ok(ConnectionOutcome::Dispatched),
            Ok(Handoff::EvictedOldest) => {
                warn!("{kind}: board consumer is behind; discarded the oldest pending snapshot");
                Ok(ConnectionOutcome::Dispatched)
            }
            Err(e) => {
                debug!("{kind}: {e}");
                Ok(ConnectionOutcome::DispatchFailed)
            }
        },
        Err(e) => {
            warn!("{kind}: discarding {}-byte message: {e}", bytes.len());
            Ok(ConnectionOutcome::Rejected)
        }
    }
}

/// Reads one message (at most [`MAX_MESSAGE_SIZE`] bytes) from `conn`.
///
/// Returns an empty buffer if the peer closed before sending anything.
fn read_message<C: Connection>(
    conn: &mut C,
    timeouts: &ListenerTimeouts,
    running: &AtomicBool,
) -> io::Result<Vec<u8>> {
    let mut buf = vec![0u8; MAX_MESSAGE_SIZE];
    let mut len = 0;
    let mut last_progress = Instant::now();

    while len < MAX_MESSAGE_SIZE {
        let allowance = if len == 0 {
            timeouts.idle
        } else {
            timeouts.settle
        };
        let elapsed = last_progress.elapsed();
        if elapsed >= allowance {
            if len == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("no data within {allowance:?}"),
                ));
            }
            break;
        }
        if !running.load(Ordering::Relaxed) {
            return Err(io::Error::new(
                io::ErrorKind::Interrupted,
                "listener shutting down",
            ));
        }

        let wait = (allowance - elapsed).min(timeouts.accept);
        conn.set_receive_timeout(Some(wait))?;
        match conn.read(&mut buf[len..]) {
            Ok(0) => break,
            Ok(n) => {
                len += n;
                last_progress = Instant::now();
                if is_complete_message(&buf[..len]) {
                    break;
                }
            }
            Err(e) if is_timeout_error(&e) || e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }

    buf.truncate(len);
    Ok(buf)
}

/// Sleeps for `duration` in short steps, returning early once `running` clears.
fn sleep_while_running(duration: Duration, running: &AtomicBool) {
    const STEP: Duration = Duration::from_millis(50);
    let deadline = Instant::now() + duration;
    while running.load(Ordering::Relaxed) {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        thread::sleep(STEP.min(deadline - now));
    }
}

/// Returns `true` for OS timeout / would-block errors that should be retried.
pub(crate) fn is_timeout_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::dispatch::dispatcher;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// In-memory connection: yields scripted read results, records writes.
    ///
    /// A scripted would-block result sleeps for the last receive timeout
    /// before returning, like a socket read that times out.
    struct ScriptedConn {
        reads: VecDeque<io::Result<Vec<u8>>>,
        written: Vec<u8>,
        timeouts: Mutex<Vec<Option<Duration>>>,
    }

    impl ScriptedConn {
        fn new(reads: Vec<io::Result<Vec<u8>>>) -> Self {
            Self {
                reads: reads.into(),
                written: Vec::new(),
                timeouts: Mutex::new(Vec::new()),
            }
        }

        fn recorded_timeouts(&self) -> Vec<Option<Duration>> {
            self.timeouts.lock().unwrap().clone()
        }
    }

    impl Read for ScriptedConn {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.reads.pop_front() {
                Some(Ok(chunk)) => {
                    let n = chunk.len().min(buf.len());
                    buf[..n].copy_from_slice(&chunk[..n]);
                    Ok(n)
                }
                Some(Err(e)) => {
                    if is_timeout_error(&e) {
                        let last = self.recorded_timeouts().last().copied().flatten();
                        thread::sleep(last.unwrap_or_default());
                    }
                    Err(e)
                }
                None => Ok(0),
            }
        }
    }

    impl Write for ScriptedConn {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Connection for ScriptedConn {
        fn set_receive_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
            self.timeouts.lock().unwrap().push(timeout);
            Ok(())
        }
    }

    impl Connection for &mut ScriptedConn {
        fn set_receive_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
            (**self).set_receive_timeout(timeout)
        }
    }

    fn would_block() -> io::Result<Vec<u8>> {
        Err(io::Error::new(io::ErrorKind::WouldBlock, "timed out"))
    }

    fn fast_options() -> ListenerOptions {
        ListenerOptions {
            timeouts: ListenerTimeouts {
                accept: Duration::from_millis(20),
                idle: Duration::from_millis(200),
                settle: Duration::from_millis(30),
                error_backoff: Duration::from_millis(10),
            },
            decode: DecodeOptions::STRICT,
        }
    }

    // ── is_timeout_error ──────────────────────────────────────────────────────

    #[test]
    fn test_is_timeout_error_recognises_timed_out() {
        let e = io::Error::new(io::ErrorKind::TimedOut, "timed out");
        assert!(is_timeout_error(&e));
    }

    #[test]
    fn test_is_timeout_error_recognises_would_block() {
        let e = io::Error::new(io::ErrorKind::WouldBlock, "would block");
        assert!(is_timeout_error(&e));
    }

    #[test]
    fn test_is_timeout_error_returns_false_for_other_errors() {
        let e = io::Error::new(io::ErrorKind::ConnectionReset, "reset");
        assert!(!is_timeout_error(&e));
    }

    // ── handle_connection ─────────────────────────────────────────────────────

    #[test]
    fn test_ping_is_answered_with_pong_and_not_dispatched() {
        // Arrange
        let (tx, mut rx) = dispatcher(4);
        let running = AtomicBool::new(true);
        let mut conn = ScriptedConn::new(vec![Ok(b"ping".to_vec())]);

        // Act
        let outcome = handle_connection(
            &mut conn,
            TransportKind::Wireless,
            &fast_options(),
            &tx,
            &running,
        )
        .unwrap();

        // Assert
        assert_eq!(outcome, ConnectionOutcome::Heartbeat);
        assert_eq!(conn.written, b"pong");
        assert!(rx.try_recv().is_none());
    }

    #[test]
    fn test_snapshot_split_across_reads_is_reassembled() {
        // Arrange
        let (tx, mut rx) = dispatcher(4);
        let running = AtomicBool::new(true);
        let conn = ScriptedConn::new(vec![
            Ok(br#"{"active_orders": [12, 4"#.to_vec()),
            would_block(),
            Ok(br#"5], "completed_orders": [7]}"#.to_vec()),
        ]);

        // Act
        let outcome =
            handle_connection(conn, TransportKind::Network, &fast_options(), &tx, &running)
                .unwrap();

        // Assert
        assert_eq!(outcome, ConnectionOutcome::Dispatched);
        let dispatched = rx.try_recv().unwrap();
        assert_eq!(dispatched.snapshot.active, vec![12, 45]);
        assert_eq!(dispatched.snapshot.completed, vec![7]);
        assert_eq!(dispatched.transport, TransportKind::Network);
    }

    #[test]
    fn test_malformed_json_is_rejected_without_dispatch() {
        // Arrange
        let (tx, mut rx) = dispatcher(4);
        let running = AtomicBool::new(true);
        let conn = ScriptedConn::new(vec![Ok(br#"{"active_orders": [1,2]"#.to_vec())]);

        // Act
        let outcome =
            handle_connection(conn, TransportKind::Network, &fast_options(), &tx, &running)
                .unwrap();

        // Assert
        assert_eq!(outcome, ConnectionOutcome::Rejected);
        assert!(rx.try_recv().is_none());
    }

    #[test]
    fn test_immediate_close_is_empty_outcome() {
        let (tx, mut rx) = dispatcher(4);
        let running = AtomicBool::new(true);
        let conn = ScriptedConn::new(Vec::new());

        let outcome =
            handle_connection(conn, TransportKind::Network, &fast_options(), &tx, &running)
                .unwrap();

        assert_eq!(outcome, ConnectionOutcome::Empty);
        assert!(rx.try_recv().is_none());
    }

    #[test]
    fn test_idle_connection_times_out() {
        // Arrange: the peer never sends anything.
        let (tx, _rx) = dispatcher(4);
        let running = AtomicBool::new(true);
        let reads = (0..1000).map(|_| would_block()).collect();
        let conn = ScriptedConn::new(reads);

        // Act
        let result =
            handle_connection(conn, TransportKind::Network, &fast_options(), &tx, &running);

        // Assert
        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::TimedOut);
    }

    #[test]
    fn test_read_stops_at_message_size_limit() {
        // Arrange: 1500 bytes delivered in one go.
        let running = AtomicBool::new(true);
        let mut conn = ScriptedConn::new(vec![Ok(vec![b'x'; 1500])]);

        // Act
        let bytes = read_message(&mut conn, &fast_options().timeouts, &running).unwrap();

        // Assert
        assert_eq!(bytes.len(), MAX_MESSAGE_SIZE);
    }

    #[test]
    fn test_oversized_payload_is_rejected() {
        // Arrange
        let (tx, mut rx) = dispatcher(4);
        let running = AtomicBool::new(true);
        let conn = ScriptedConn::new(vec![Ok(vec![b'x'; 1500])]);

        // Act
        let outcome =
            handle_connection(conn, TransportKind::Network, &fast_options(), &tx, &running)
                .unwrap();

        // Assert
        assert_eq!(outcome, ConnectionOutcome::Rejected);
        assert!(rx.try_recv().is_none());
    }

    #[test]
    fn test_read_wait_never_exceeds_accept_timeout() {
        // Arrange
        let running = AtomicBool::new(true);
        let mut conn = ScriptedConn::new(vec![would_block(), Ok(b"ping".to_vec())]);
        let timeouts = fast_options().timeouts;

        // Act
        read_message(&mut conn, &timeouts, &running).unwrap();

        // Assert
        let recorded = conn.recorded_timeouts();
        assert!(!recorded.is_empty());
        assert!(recorded.iter().all(|t| t.unwrap() <= timeouts.accept));
    }

    #[test]
    fn test_shutdown_interrupts_pending_read() {
        // Arrange
        let (tx, _rx) = dispatcher(4);
        let running = AtomicBool::new(false);
        let conn = ScriptedConn::new(vec![Ok(b"ping".to_vec())]);

        // Act
        let result =
            handle_connection(conn, TransportKind::Network, &fast_options(), &tx, &running);

        // Assert
        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::Interrupted);
    }

    #[test]
    fn test_full_dispatcher_still_delivers_latest_snapshot() {
        // Arrange
        let (tx, mut rx) = dispatcher(1);
        let running = AtomicBool::new(true);
        let first = ScriptedConn::new(vec![Ok(
            br#"{"active_orders": [1], "completed_orders": []}"#.to_vec()
        )]);
        let second = ScriptedConn::new(vec![Ok(
            br#"{"active_orders": [2], "completed_orders": []}"#.to_vec()
        )]);
        let options = fast_options();

        // Act
        let a = handle_connection(first, TransportKind::Network, &options, &tx, &running).unwrap();
        let b = handle_connection(second, TransportKind::Network, &options, &tx, &running).unwrap();

        // Assert
        assert_eq!(a, ConnectionOutcome::Dispatched);
        assert_eq!(b, ConnectionOutcome::Dispatched);
        assert_eq!(rx.try_recv().unwrap().snapshot.active, vec![2]);
        assert!(rx.try_recv().is_none());
    }

    #[test]
    fn test_stopped_consumer_reports_dispatch_failed() {
        // Arrange
        let (tx, rx) = dispatcher(4);
        drop(rx);
        let running = AtomicBool::new(true);
        let conn = ScriptedConn::new(vec![Ok(
            br#"{"active_orders": [1], "completed_orders": []}"#.to_vec()
        )]);

        // Act
        let outcome =
            handle_connection(conn, TransportKind::Network, &fast_options(), &tx, &running)
                .unwrap();

        // Assert
        assert_eq!(outcome, ConnectionOutcome::DispatchFailed);
    }

    // ── accept loop ───────────────────────────────────────────────────────────

    /// Connection whose written bytes stay observable after the loop drops it.
    struct SharedConn {
        input: VecDeque<u8>,
        written: Arc<Mutex<Vec<u8>>>,
    }

    impl Read for SharedConn {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = buf.len().min(self.input.len());
            for (slot, byte) in buf.iter_mut().zip(self.input.drain(..n)) {
                *slot = byte;
            }
            Ok(n)
        }
    }

    impl Write for SharedConn {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.written.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Connection for SharedConn {
        fn set_receive_timeout(&self, _timeout: Option<Duration>) -> io::Result<()> {
            Ok(())
        }
    }

    type AcceptResult = io::Result<Option<(SharedConn, String)>>;

    /// Endpoint that replays scripted accept results, then idles.
    struct ScriptedEndpoint {
        accepts: Mutex<VecDeque<AcceptResult>>,
        calls: Arc<std::sync::atomic::AtomicUsize>,
    }

    impl TransportEndpoint for ScriptedEndpoint {
        type Conn = SharedConn;

        fn kind(&self) -> TransportKind {
            TransportKind::Network
        }

        fn local_description(&self) -> String {
            "scripted".to_string()
        }

        fn accept_timeout(&self, timeout: Duration) -> AcceptResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.accepts.lock().unwrap().pop_front() {
                Some(result) => result,
                None => {
                    thread::sleep(timeout);
                    Ok(None)
                }
            }
        }
    }

    #[test]
    fn test_accept_error_is_survived_and_next_client_served() {
        // Arrange
        let written = Arc::new(Mutex::new(Vec::new()));
        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let client = SharedConn {
            input: b"ping".iter().copied().collect(),
            written: Arc::clone(&written),
        };
        let endpoint = ScriptedEndpoint {
            accepts: Mutex::new(VecDeque::from(vec![
                Err(io::Error::new(io::ErrorKind::Other, "accept failed")),
                Ok(Some((client, "peer".to_string()))),
            ])),
            calls: Arc::clone(&calls),
        };
        let (tx, mut rx) = dispatcher(4);
        let running = Arc::new(AtomicBool::new(true));

        // Act
        let handle = spawn_listener(endpoint, fast_options(), tx, Arc::clone(&running)).unwrap();
        let deadline = Instant::now() + Duration::from_secs(2);
        while written.lock().unwrap().is_empty() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }

        // Assert – the loop outlived the error and answered the heartbeat
        assert_eq!(written.lock().unwrap().as_slice(), b"pong");
        assert!(calls.load(Ordering::SeqCst) >= 2);
        assert!(!handle.is_finished());
        assert!(rx.try_recv().is_none());

        // Assert – and still stops when asked
        running.store(false, Ordering::Relaxed);
        let stop = Instant::now();
        handle.join();
        assert!(stop.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_sleep_while_running_returns_early_when_stopped() {
        let running = AtomicBool::new(false);
        let start = Instant::now();
        sleep_while_running(Duration::from_secs(5), &running);
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
