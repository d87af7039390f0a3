//! Command-line interface
//!
//! `cmd_*` handlers work on an [`AppState`] holding the ledger and its
//! storage, and save after every change.

pub mod commands;

pub use commands::*;
