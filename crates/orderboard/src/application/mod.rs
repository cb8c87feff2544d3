//! Application layer: snapshot hand-off and the board consumer.
//!
//! # Modules
//!
//! - **`dispatch`** – The bounded queue that moves decoded snapshots from
//!   listener threads to the consumer task, tagged with their transport.
//!
//! - **`board`** – The single owner of the displayed order lists.  Lays out
//!   every snapshot and hands the result to a [`board::Renderer`].
//!
//! **Dependency rule**: this layer depends on `orderboard_core` only; it
//! never touches sockets.

pub mod board;
pub mod dispatch;
