//! Infrastructure layer for the order board.
//!
//! Contains OS-facing adapters: the TCP and RFCOMM listeners, the text
//! renderer, and configuration file storage.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `orderboard_core`, but MUST NOT be imported by the `application` layer.

pub mod network;
pub mod render;
pub mod storage;
