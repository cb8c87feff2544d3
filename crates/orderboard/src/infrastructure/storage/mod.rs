//! Storage infrastructure: configuration file persistence.
//!
//! The `config` sub-module reads the TOML configuration from an explicit
//! path or the platform config directory, fills in defaults for anything
//! missing, and can write the effective configuration back out.

pub mod config;
