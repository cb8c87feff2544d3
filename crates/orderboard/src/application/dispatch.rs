//! Snapshot hand-off from listener threads to the board consumer.
//!
//! Every transport listener holds a cloned [`SnapshotSender`]; the single
//! [`SnapshotReceiver`] lives in the consumer task that owns the board
//! state.  The queue is FIFO, so snapshots from one listener arrive in the
//! order that listener submitted them.  Two listeners interleave
//! arbitrarily, which is harmless because every snapshot replaces the board
//! wholesale.
//!
//! Submitting never waits on the consumer.  The queue is bounded; when it is
//! full the *oldest* pending snapshot is evicted, so the most recent
//! submission is always the last one the consumer sees.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use orderboard_core::OrderSnapshot;
use thiserror::Error;
use tokio::sync::Notify;

/// Queue depth used by the binary.
pub const DEFAULT_DISPATCH_CAPACITY: usize = 32;

/// The channel a snapshot arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    /// TCP on the local network.
    Network,
    /// Bluetooth RFCOMM serial channel.
    Wireless,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Network => f.write_str("tcp"),
            TransportKind::Wireless => f.write_str("rfcomm"),
        }
    }
}

/// A decoded snapshot together with the transport that delivered it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatched {
    /// Where the snapshot came from.
    pub transport: TransportKind,
    /// The new order lists.
    pub snapshot: OrderSnapshot,
}

/// How a submitted snapshot entered the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handoff {
    /// Queued behind any pending snapshots.
    Queued,
    /// The queue was full; the oldest pending snapshot was discarded to make room.
    EvictedOldest,
}

/// Error returned when a snapshot cannot be handed off.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    /// The consumer has shut down.
    #[error("board consumer has stopped")]
    Closed,
}

/// Queue state protected by a single lock.
#[derive(Debug)]
struct State {
    queue: VecDeque<Dispatched>,
    senders: usize,
    receiver_alive: bool,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<State>,
    wake: Notify,
    capacity: usize,
}

impl Shared {
    /// Locks the queue state.  A panic while holding the lock leaves the
    /// queue structurally valid, so poisoning is ignored.
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Producer half held by listener threads.
#[derive(Debug)]
pub struct SnapshotSender {
    shared: Arc<Shared>,
}

impl SnapshotSender {
    /// Hands `snapshot` to the consumer without blocking.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Closed`] when the receiver has been dropped.
    pub fn submit(
        &self,
        transport: TransportKind,
        snapshot: OrderSnapshot,
    ) -> Result<Handoff, DispatchError> {
        let mut state = self.shared.lock();
        if !state.receiver_alive {
            return Err(DispatchError::Closed);
        }

        let handoff = if state.queue.len() >= self.shared.capacity {
            state.queue.pop_front();
            Handoff::EvictedOldest
        } else {
            Handoff::Queued
        };
        state.queue.push_back(Dispatched {
            transport,
            snapshot,
        });
        drop(state);

        self.shared.wake.notify_one();
        Ok(handoff)
    }
}

impl Clone for SnapshotSender {
    fn clone(&self) -> Self {
        self.shared.lock().senders += 1;
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl Drop for SnapshotSender {
    fn drop(&mut self) {
        let mut state = self.shared.lock();
        state.senders -= 1;
        let last = state.senders == 0;
        drop(state);
        if last {
            self.shared.wake.notify_one();
        }
    }
}

/// Consumer half owned by the board task.
#[derive(Debug)]
pub struct SnapshotReceiver {
    shared: Arc<Shared>,
}

impl SnapshotReceiver {
    /// Waits for the next snapshot.
    ///
    /// Returns `None` once every [`SnapshotSender`] has been dropped and the
    /// queue is drained.
    pub async fn recv(&mut self) -> Option<Dispatched> {
        loop {
            {
                let mut state = self.shared.lock();
                if let Some(dispatched) = state.queue.pop_front() {
                    return Some(dispatched);
                }
                if state.senders == 0 {
                    return None;
                }
            }
            // `notify_one` stores a permit when nobody is waiting, so a
            // submit between the check above and this await is not lost.
            self.shared.wake.notified().await;
        }
    }

    /// Returns the next queued snapshot without waiting.
    pub fn try_recv(&mut self) -> Option<Dispatched> {
        self.shared.lock().queue.pop_front()
    }
}

impl Drop for SnapshotReceiver {
    fn drop(&mut self) {
        let mut state = self.shared.lock();
        state.receiver_alive = false;
        state.queue.clear();
    }
}

/// Creates a dispatcher holding at most `capacity` pending snapshots.
///
/// A capacity of zero is treated as one.
pub fn dispatcher(capacity: usize) -> (SnapshotSender, SnapshotReceiver) {
    let shared = Arc::new(Shared {
        state: Mutex::new(State {
            queue: VecDeque::new(),
            senders: 1,
            receiver_alive: true,
        }),
        wake: Notify::new(),
        capacity: capacity.max(1),
    });
    (
        SnapshotSender {
            shared: Arc::clone(&shared),
        },
        SnapshotReceiver { shared },
    )
}

// ── Tests ─────────────────────────────────────────────────────────────────────
