//! Quorum-approved multi-signature wallets
//!
//! A wallet holds a fixed set of approvers and a quorum. Approvers propose
//! transfers of native currency or arbitrary calls, and a proposal executes
//! exactly once, inside the approval that brings it to quorum.
//!
//! # Example
//!
//! ```
//! use multisig_wallet::core::Address;
//! use multisig_wallet::multisig::{Execution, WalletFactory};
//!
//! let (x, y, z) = (Address::random(), Address::random(), Address::random());
//! let mut factory = WalletFactory::new(Address::random());
//!
//! // Create a 2-of-3 wallet
//! let (mut wallet, _event) = factory.create_wallet(Address::random(), vec![x, y, z], 2, "Treasury")?;
//! assert!(factory.wallets_for_approver(&y).contains(wallet.address()));
//!
//! // Propose and approve a transfer
//! let id = wallet.create_transfer(&x, 100, z)?;
//! assert!(wallet.approve_transfer(&x, id)?.execution.is_none());
//!
//! // The second approval reaches quorum and yields the payment to perform
//! let approval = wallet.approve_transfer(&y, id)?;
//! assert!(matches!(approval.execution, Some(Execution::Payment { amount: 100, .. })));
//! # Ok::<(), multisig_wallet::multisig::MultisigError>(())
//! ```

pub mod execution;
pub mod factory;
pub mod proposal;
pub mod registry;
pub mod wallet;

pub use execution::{Execution, ExecutionError, Runtime};
pub use factory::{WalletCreated, WalletFactory, WalletRecord};
pub use proposal::{ProposalStore, Transaction, Transfer, FIRST_TRANSACTION_ID};
pub use registry::ApproverRegistry;
pub use wallet::{Approval, ErrorKind, MultisigError, MultisigWallet};
