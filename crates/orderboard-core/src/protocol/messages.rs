//! Message types for the order board wire protocol.
//!
//! A connection carries exactly one message and is then closed.  There is no
//! framing header: one read of up to [`MAX_MESSAGE_SIZE`] bytes is one
//! message.  Two message shapes exist:
//!
//! ```text
//! ping                                                  -> reply "pong"
//! {"active_orders": [12, 45], "completed_orders": [7]}  -> OrderSnapshot
//! ```

use serde::{Deserialize, Serialize};

/// The heartbeat request, compared byte-for-byte.
pub const PING: &[u8] = b"ping";

/// The heartbeat reply.
pub const PONG: &[u8] = b"pong";

/// Upper bound on the bytes read for one message.  Anything beyond is dropped.
pub const MAX_MESSAGE_SIZE: usize = 1024;

/// Well-known TCP port the network listener binds.
pub const DEFAULT_TCP_PORT: u16 = 5000;

/// RFCOMM channel the wireless listener binds.
pub const DEFAULT_RFCOMM_CHANNEL: u8 = 1;

/// An order number as printed on the board.
pub type OrderNumber = u64;

/// A complete replacement of both order lists.
///
/// Snapshots are never merged: every decoded payload supersedes the previous
/// one wholesale.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSnapshot {
    /// Orders still being prepared, in display order.
    #[serde(rename = "active_orders")]
    pub active: Vec<OrderNumber>,
    /// Orders ready for pickup, in display order.
    #[serde(rename = "completed_orders")]
    pub completed: Vec<OrderNumber>,
}

impl OrderSnapshot {
    /// Creates a snapshot from the two lists.
    pub fn new(active: Vec<OrderNumber>, completed: Vec<OrderNumber>) -> Self {
        Self { active, completed }
    }

    /// Returns `true` when neither list holds any order.
    pub fn is_empty(&self) -> bool {
        self.active.is_empty() && self.completed.is_empty()
    }
}

/// A decoded inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Liveness probe; answered with [`PONG`] and never touches order state.
    Ping,
    /// New order lists for the board.
    Snapshot(OrderSnapshot),
}

// ── Tests ─────────────────────────────────────────────────────────────────────
