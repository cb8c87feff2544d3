//! Network infrastructure for the order board.
//!
//! # Sub-modules
//!
//! - **`listener`** – The transport-independent accept loop and the one-shot
//!   connection protocol (`ping` → `pong`, JSON → snapshot).  Runs each
//!   endpoint on its own named thread.
//!
//! - **`tcp`** – The TCP endpoint on the well-known port.
//!
//! - **`rfcomm`** – The Bluetooth RFCOMM endpoint.  Missing hardware is
//!   reported as [`TransportError::Unavailable`] and the listener is skipped.
//!
//! Setup failures never stop the process: a transport that cannot be bound
//! is logged once and left disabled while the other one keeps running.

pub mod listener;
pub mod rfcomm;
pub mod tcp;

use std::sync::{atomic::AtomicBool, Arc};

use thiserror::Error;
use tracing::{info, warn};

use crate::application::dispatch::{SnapshotSender, TransportKind};
use crate::infrastructure::storage::config::AppConfig;

use self::listener::{spawn_listener, ListenerHandle};
use self::rfcomm::RfcommEndpoint;
use self::tcp::TcpEndpoint;

/// Error type for transport setup.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The listening endpoint could not be bound.
    #[error("failed to bind {transport} endpoint on {addr}: {source}")]
    BindFailed {
        transport: TransportKind,
        addr: String,
        #[source]
        source: std::io::Error,
    },
    /// The configured address does not parse.
    #[error("invalid {transport} bind address {addr:?}")]
    InvalidAddress { transport: TransportKind, addr: String },
    /// The transport cannot be used on this machine.
    #[error("{transport} transport unavailable: {reason}")]
    Unavailable {
        transport: TransportKind,
        reason: String,
    },
    /// The listener thread could not be created.
    #[error("failed to spawn {transport} listener thread: {source}")]
    Spawn {
        transport: TransportKind,
        #[source]
        source: std::io::Error,
    },
}

/// Binds and starts every transport enabled in `config`.
///
/// Transports that fail to start are logged and skipped; the returned list
/// holds only the listeners that are running.
pub fn start_listeners(
    config: &AppConfig,
    sender: &SnapshotSender,
    running: &Arc<AtomicBool>,
) -> Vec<ListenerHandle> {
    let options = config.listener_options();
    let mut handles = Vec::with_capacity(2);

    if config.network.enabled {
        let started = config
            .network
            .socket_addr()
            .ok_or_else(|| TransportError::InvalidAddress {
                transport: TransportKind::Network,
                addr: config.network.bind_address.clone(),
            })
            .and_then(|addr| TcpEndpoint::bind(addr, config.network.backlog))
            .and_then(|endpoint| {
                spawn_listener(endpoint, options, sender.clone(), Arc::clone(running))
            });
        record(started, TransportKind::Network, &mut handles);
    } else {
        info!("tcp listener disabled by configuration");
    }

    if config.wireless.enabled {
        let started = RfcommEndpoint::bind(config.wireless.channel, config.wireless.backlog)
            .and_then(|endpoint| {
                spawn_listener(endpoint, options, sender.clone(), Arc::clone(running))
            });
        record(started, TransportKind::Wireless, &mut handles);
    } else {
        info!("rfcomm listener disabled by configuration");
    }

    handles
}

fn record(
    started: Result<ListenerHandle, TransportError>,
    kind: TransportKind,
    handles: &mut Vec<ListenerHandle>,
) {
    match started {
        Ok(handle) => handles.push(handle),
        Err(e) => warn!("{kind} listener disabled for this run: {e}"),
    }
}
