//! Multisig Wallet: quorum-approved multi-signature wallets in Rust
//!
//! This crate provides a complete multisig wallet system featuring:
//! - Wallets with a fixed approver set and an M-of-N quorum
//! - Transfer proposals that pay native coins once quorum is reached
//! - Transaction proposals that call any address with the wallet as caller
//! - Wallet factories with an approver → wallets index
//! - A ledger runtime with all-or-nothing operations and an event log
//! - A stack-based VM for contracts that wallets can call
//! - JSON persistence, a REST API with WebSocket events, and a CLI
//!
//! # Example
//!
//! ```rust
//! use multisig_wallet::core::{Address, ONE_COIN};
//! use multisig_wallet::ledger::Ledger;
//!
//! let mut ledger = Ledger::new();
//! let (x, y, z) = (Address::random(), Address::random(), Address::random());
//!
//! // Deploy a factory and create a 2-of-3 wallet through it
//! let factory = ledger.deploy_factory(&x).unwrap();
//! let wallet = ledger.create_wallet(&factory, vec![x, y, z], 2, "Treasury").unwrap();
//! ledger.fund(&wallet, ONE_COIN).unwrap();
//!
//! // Propose a payment and approve it twice
//! let id = ledger.create_transfer(&wallet, &x, 400, z).unwrap();
//! ledger.approve_transfer(&wallet, &x, id).unwrap();
//! ledger.approve_transfer(&wallet, &y, id).unwrap();
//!
//! assert_eq!(ledger.balance(&z), 400);
//! assert!(ledger.wallet(&wallet).unwrap().transfer(id).unwrap().sent);
//! ```

pub mod api;
pub mod cli;
pub mod contract;
pub mod core;
pub mod crypto;
pub mod ledger;
pub mod multisig;
pub mod storage;

// Re-export commonly used types
pub use api::{create_router, ApiState};
pub use contract::{Compiler, Contract, ContractManager, OpCode, VM};
pub use core::{Address, Amount, Payload, ONE_COIN};
pub use ledger::{Event, Ledger, LedgerError};
pub use multisig::{Approval, Execution, MultisigError, MultisigWallet, WalletFactory};
pub use storage::{Storage, StorageConfig};
