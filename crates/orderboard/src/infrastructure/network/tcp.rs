//! TCP endpoint for the network listener.
//!
//! Binds the well-known port (5000 by default) on all interfaces with a
//! backlog of one pending connection.  The socket is non-blocking; an accept
//! with a timeout polls it every [`ACCEPT_POLL_INTERVAL`] until a client
//! arrives or the timeout expires.

use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::thread;
use std::time::{Duration, Instant};

use tracing::warn;

use crate::application::dispatch::TransportKind;
use crate::infrastructure::network::listener::{Connection, TransportEndpoint};
use crate::infrastructure::network::TransportError;

/// How often a pending accept re-checks the non-blocking socket.
pub const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A bound TCP listening socket.
#[derive(Debug)]
pub struct TcpEndpoint {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl TcpEndpoint {
    /// Binds `addr` and starts listening with the given backlog.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::BindFailed`] if the address is in use or
    /// cannot be bound, or the socket cannot be switched to non-blocking mode.
    pub fn bind(addr: SocketAddr, backlog: u32) -> Result<Self, TransportError> {
        let bind_failed = |source| TransportError::BindFailed {
            transport: TransportKind::Network,
            addr: addr.to_string(),
            source,
        };

        let listener = TcpListener::bind(addr).map_err(bind_failed)?;
        apply_backlog(&listener, backlog);
        listener.set_nonblocking(true).map_err(bind_failed)?;
        let local_addr = listener.local_addr().map_err(bind_failed)?;

        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// The address actually bound (useful when binding port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl TransportEndpoint for TcpEndpoint {
    type Conn = TcpStream;

    fn kind(&self) -> TransportKind {
        TransportKind::Network
    }

    fn local_description(&self) -> String {
        format!("TCP {}", self.local_addr)
    }

    fn accept_timeout(&self, timeout: Duration) -> io::Result<Option<(TcpStream, String)>> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    // Accepted sockets may inherit O_NONBLOCK from the listener.
                    stream.set_nonblocking(false)?;
                    return Ok(Some((stream, peer.to_string())));
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(None);
                    }
                    thread::sleep(ACCEPT_POLL_INTERVAL.min(deadline - now));
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl Connection for TcpStream {
    fn set_receive_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        self.set_read_timeout(timeout)
    }
}

/// Re-issues `listen(2)` with the requested backlog; std always uses 128.
#[cfg(unix)]
fn apply_backlog(listener: &TcpListener, backlog: u32) {
    use std::os::fd::AsRawFd;

    let backlog = libc::c_int::try_from(backlog).unwrap_or(libc::c_int::MAX);
    // SAFETY: the descriptor is owned by `listener` and stays open for the call.
    let rc = unsafe { libc::listen(listener.as_raw_fd(), backlog) };
    if rc != 0 {
        warn!(
            "could not set TCP backlog to {backlog}: {}",
            io::Error::last_os_error()
        );
    }
}

#[cfg(not(unix))]
fn apply_backlog(_listener: &TcpListener, backlog: u32) {
    if backlog != 128 {
        warn!("TCP backlog {backlog} is not configurable on this platform");
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
