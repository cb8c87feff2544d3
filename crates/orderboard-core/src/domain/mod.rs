//! Domain logic for the order board.
//!
//! Nothing here touches sockets, threads or a renderer: the layout engine is
//! a pure function from an order list to a column arrangement, so it can be
//! tested and benchmarked in isolation.

/// Column layout engine.
///
/// See [`layout::layout`] for the main entry point.
pub mod layout;
