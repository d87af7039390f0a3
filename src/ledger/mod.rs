//! Ledger module
//!
//! The runtime wallets execute on: native balances, deployed wallets,
//! factories and VM contracts, call dispatch between them, and the event log.

pub mod dispatch;
pub mod event;
mod journal;
pub mod state;

pub use dispatch::{FactoryMethod, WalletMethod};
pub use event::{Event, LogEntry};
pub use state::{AccountKind, Ledger, LedgerError, MAX_CALL_DEPTH};
