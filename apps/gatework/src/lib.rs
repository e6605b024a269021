//! # Gatework
//!
//! Command-line front end for the `gatework-core` engine.
//!
//! The binary in `main.rs` only installs logging and dispatches; everything
//! else lives here so integration tests can drive the commands directly.

pub mod cli;
pub mod config;
