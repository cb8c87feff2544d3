//! # orderboard-core
//!
//! Shared library for the kitchen order board containing the wire protocol
//! codec and the column layout engine.
//!
//! It has no dependencies on sockets, threads or any rendering toolkit; the
//! `orderboard` crate supplies the transports and the render boundary.
//!
//! - **`protocol`** – the one-shot message format: the `ping`/`pong`
//!   heartbeat and the JSON order snapshot.
//! - **`domain`** – the layout engine that arranges up to twelve order
//!   numbers into at most three columns of four.

pub mod domain;
pub mod protocol;

pub use domain::layout::{
    format_order_number, layout, layout_board, BoardLayout, ColumnLayout, LayoutError,
    LayoutPolicy,
};
pub use protocol::codec::{decode_message, encode_snapshot, DecodeOptions, ProtocolError};
pub use protocol::messages::{Message, OrderNumber, OrderSnapshot};
