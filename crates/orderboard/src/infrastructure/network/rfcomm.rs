//! Bluetooth RFCOMM endpoint for the wireless listener.
//!
//! On Linux the endpoint is a raw `AF_BLUETOOTH` / `BTPROTO_RFCOMM` stream
//! socket bound to the adapter wildcard address on a fixed channel (1 by
//! default).  The per-connection protocol is identical to TCP.
//!
//! Wireless support is optional hardware.  [`RFCOMM_SUPPORTED`] says whether
//! this build can talk RFCOMM at all; at runtime a missing kernel module or
//! adapter makes [`RfcommEndpoint::bind`] return
//! [`TransportError::Unavailable`], and the caller simply skips the listener.

use crate::infrastructure::network::TransportError;

pub use imp::{RfcommEndpoint, RfcommStream};

/// Whether this build has an RFCOMM implementation.
pub const RFCOMM_SUPPORTED: bool = cfg!(target_os = "linux");

/// Formats a Bluetooth device address stored little-endian, as the kernel does.
pub fn format_bdaddr(bdaddr: &[u8; 6]) -> String {
    bdaddr
        .iter()
        .rev()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(":")
}

/// Builds the error returned when RFCOMM cannot be used on this machine.
fn unavailable(reason: impl Into<String>) -> TransportError {
    TransportError::Unavailable {
        transport: crate::application::dispatch::TransportKind::Wireless,
        reason: reason.into(),
    }
}

#[cfg(target_os = "linux")]
mod imp {
    use std::io::{self, Read, Write};
    use std::mem;
    use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
    use std::time::Duration;

    use crate::application::dispatch::TransportKind;
    use crate::infrastructure::network::listener::{Connection, TransportEndpoint};
    use crate::infrastructure::network::TransportError;

    use super::{format_bdaddr, unavailable};

    /// `BTPROTO_RFCOMM` from `<bluetooth/bluetooth.h>`; not exported by libc.
    const BTPROTO_RFCOMM: libc::c_int = 3;

    /// `struct sockaddr_rc` from `<bluetooth/rfcomm.h>`.
    #[repr(C)]
    #[derive(Clone, Copy)]
    struct SockaddrRc {
        rc_family: libc::sa_family_t,
        rc_bdaddr: [u8; 6],
        rc_channel: u8,
    }

    impl SockaddrRc {
        fn any(channel: u8) -> Self {
            Self {
                rc_family: libc::AF_BLUETOOTH as libc::sa_family_t,
                rc_bdaddr: [0; 6],
                rc_channel: channel,
            }
        }
    }

    /// A listening RFCOMM socket.
    #[derive(Debug)]
    pub struct RfcommEndpoint {
        fd: OwnedFd,
        channel: u8,
    }

    impl RfcommEndpoint {
        /// Opens, binds and listens on `channel` of any local adapter.
        ///
        /// # Errors
        ///
        /// Returns [`TransportError::Unavailable`] when the kernel has no
        /// Bluetooth support or no adapter is present, and
        /// [`TransportError::BindFailed`] for other bind/listen failures.
        pub fn bind(channel: u8, backlog: u32) -> Result<Self, TransportError> {
            // SAFETY: plain socket(2) call; the result is checked below.
            let raw = unsafe {
                libc::socket(
                    libc::AF_BLUETOOTH,
                    libc::SOCK_STREAM | libc::SOCK_CLOEXEC,
                    BTPROTO_RFCOMM,
                )
            };
            if raw < 0 {
                let err = io::Error::last_os_error();
                return Err(unavailable(format!("cannot open RFCOMM socket: {err}")));
            }
            // SAFETY: `raw` is a freshly created descriptor we exclusively own.
            let fd = unsafe { OwnedFd::from_raw_fd(raw) };

            let addr = SockaddrRc::any(channel);
            // SAFETY: `addr` is a valid sockaddr_rc and the length matches it.
            let rc = unsafe {
                libc::bind(
                    fd.as_raw_fd(),
                    &addr as *const SockaddrRc as *const libc::sockaddr,
                    mem::size_of::<SockaddrRc>() as libc::socklen_t,
                )
            };
            if rc != 0 {
                return Err(classify_bind_error(channel, io::Error::last_os_error()));
            }

            let backlog = libc::c_int::try_from(backlog).unwrap_or(libc::c_int::MAX);
            // SAFETY: `fd` is a bound socket.
            if unsafe { libc::listen(fd.as_raw_fd(), backlog) } != 0 {
                return Err(classify_bind_error(channel, io::Error::last_os_error()));
            }

            Ok(Self { fd, channel })
        }

        /// The RFCOMM channel this endpoint listens on.
        pub fn channel(&self) -> u8 {
            self.channel
        }
    }

    /// Missing adapters surface as address/device errors at bind time.
    fn classify_bind_error(channel: u8, err: io::Error) -> TransportError {
        match err.raw_os_error() {
            Some(libc::EADDRNOTAVAIL | libc::ENODEV | libc::EAFNOSUPPORT | libc::EPROTONOSUPPORT) => {
                unavailable(format!("no Bluetooth adapter for channel {channel}: {err}"))
            }
            _ => TransportError::BindFailed {
                transport: TransportKind::Wireless,
                addr: format!("channel {channel}"),
                source: err,
            },
        }
    }

    impl TransportEndpoint for RfcommEndpoint {
        type Conn = RfcommStream;

        fn kind(&self) -> TransportKind {
            TransportKind::Wireless
        }

        fn local_description(&self) -> String {
            format!("RFCOMM channel {}", self.channel)
        }

        fn accept_timeout(&self, timeout: Duration) -> io::Result<Option<(RfcommStream, String)>> {
            let mut pfd = libc::pollfd {
                fd: self.fd.as_raw_fd(),
                events: libc::POLLIN,
                revents: 0,
            };
            let millis = libc::c_int::try_from(timeout.as_millis()).unwrap_or(libc::c_int::MAX);
            // SAFETY: `pfd` points to one valid pollfd for the duration of the call.
            let ready = unsafe { libc::poll(&mut pfd, 1, millis) };
            if ready < 0 {
                return Err(io::Error::last_os_error());
            }
            if ready == 0 {
                return Ok(None);
            }

            let mut peer = SockaddrRc::any(0);
            let mut len = mem::size_of::<SockaddrRc>() as libc::socklen_t;
            // SAFETY: `peer`/`len` describe a writable sockaddr_rc buffer.
            let raw = unsafe {
                libc::accept4(
                    self.fd.as_raw_fd(),
                    &mut peer as *mut SockaddrRc as *mut libc::sockaddr,
                    &mut len,
                    libc::SOCK_CLOEXEC,
                )
            };
            if raw < 0 {
                return Err(io::Error::last_os_error());
            }
            // SAFETY: accept4 returned a new descriptor we exclusively own.
            let fd = unsafe { OwnedFd::from_raw_fd(raw) };
            Ok(Some((RfcommStream { fd }, format_bdaddr(&peer.rc_bdaddr))))
        }
    }

    /// An accepted RFCOMM connection.
    #[derive(Debug)]
    pub struct RfcommStream {
        fd: OwnedFd,
    }

    impl Read for RfcommStream {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            // SAFETY: `buf` is valid for `buf.len()` writable bytes.
            let n = unsafe { libc::read(self.fd.as_raw_fd(), buf.as_mut_ptr().cast(), buf.len()) };
            if n < 0 {
                return Err(io::Error::last_os_error());
            }
            Ok(n as usize)
        }
    }

    impl Write for RfcommStream {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            // SAFETY: `buf` is valid for `buf.len()` readable bytes.
            let n = unsafe { libc::write(self.fd.as_raw_fd(), buf.as_ptr().cast(), buf.len()) };
            if n < 0 {
                return Err(io::Error::last_os_error());
            }
            Ok(n as usize)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Connection for RfcommStream {
        fn set_receive_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
            // A zero timeval means "block forever" to SO_RCVTIMEO.
            let tv = match timeout {
                Some(d) => {
                    let d = d.max(Duration::from_micros(1));
                    libc::timeval {
                        tv_sec: d.as_secs() as libc::time_t,
                        tv_usec: d.subsec_micros() as libc::suseconds_t,
                    }
                }
                None => libc::timeval {
                    tv_sec: 0,
                    tv_usec: 0,
                },
            };
            // SAFETY: `tv` is a valid timeval and the length matches it.
            let rc = unsafe {
                libc::setsockopt(
                    self.fd.as_raw_fd(),
                    libc::SOL_SOCKET,
                    libc::SO_RCVTIMEO,
                    &tv as *const libc::timeval as *const libc::c_void,
                    mem::size_of::<libc::timeval>() as libc::socklen_t,
                )
            };
            if rc != 0 {
                return Err(io::Error::last_os_error());
            }
            Ok(())
        }
    }
}

#[cfg(not(target_os = "linux"))]
mod imp {
    use std::convert::Infallible;
    use std::io::{self, Read, Write};
    use std::time::Duration;

    use crate::application::dispatch::TransportKind;
    use crate::infrastructure::network::listener::{Connection, TransportEndpoint};
    use crate::infrastructure::network::TransportError;

    use super::unavailable;

    /// RFCOMM endpoint placeholder; cannot be constructed on this platform.
    #[derive(Debug)]
    pub struct RfcommEndpoint {
        never: Infallible,
    }

    impl RfcommEndpoint {
        /// Always fails: RFCOMM sockets are only implemented for Linux.
        pub fn bind(_channel: u8, _backlog: u32) -> Result<Self, TransportError> {
            Err(unavailable("RFCOMM sockets are only supported on Linux"))
        }

        /// Unreachable; no value of this type exists.
        pub fn channel(&self) -> u8 {
            match self.never {}
        }
    }

    impl TransportEndpoint for RfcommEndpoint {
        type Conn = RfcommStream;

        fn kind(&self) -> TransportKind {
            TransportKind::Wireless
        }

        fn local_description(&self) -> String {
            match self.never {}
        }

        fn accept_timeout(&self, _timeout: Duration) -> io::Result<Option<(RfcommStream, String)>> {
            match self.never {}
        }
    }

    /// RFCOMM connection placeholder; cannot be constructed on this platform.
    #[derive(Debug)]
    pub struct RfcommStream {
        never: Infallible,
    }

    impl Read for RfcommStream {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            match self.never {}
        }
    }

    impl Write for RfcommStream {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            match self.never {}
        }

        fn flush(&mut self) -> io::Result<()> {
            match self.never {}
        }
    }

    impl Connection for RfcommStream {
        fn set_receive_timeout(&self, _timeout: Option<Duration>) -> io::Result<()> {
            match self.never {}
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
