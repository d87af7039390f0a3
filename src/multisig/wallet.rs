//! Multi-signature wallet engine
//!
//! Approvers propose transfers and arbitrary calls; each proposal executes
//! the moment its approval count reaches the wallet's quorum.
//!
//! Every mutating method checks its preconditions before touching state.
//! The approval that reaches quorum marks the proposal terminal and returns
//! the [`Execution`] to perform. The caller must perform it in the same
//! atomic step and discard the wallet's changes if it fails; the ledger
//! does this by snapshotting its state around each operation.

use crate::core::{Address, Amount, Payload};
use crate::multisig::execution::Execution;
use crate::multisig::proposal::{ProposalStore, Transaction, Transfer};
use crate::multisig::registry::ApproverRegistry;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors related to multisig operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MultisigError {
    #[error("only approver allowed")]
    NotApprover { caller: Address },
    #[error("Approvers required")]
    ApproversRequired,
    #[error("Invalid quorum")]
    InvalidQuorum { quorum: u32, approvers: usize },
    #[error("Duplicate approver: {0}")]
    DuplicateApprover(Address),
    #[error("Invalid amount")]
    InvalidAmount,
    #[error("Transfer not found: {0}")]
    TransferNotFound(u64),
    #[error("Transaction not found: {0}")]
    TransactionNotFound(u64),
    #[error("cannot approve transfer twice")]
    TransferAlreadyApproved,
    #[error("Cannot approve transaction twice")]
    TransactionAlreadyApproved,
    #[error("Transfer has already been sent")]
    TransferAlreadySent,
    #[error("Transaction has already been executed")]
    TransactionAlreadyExecuted,
}

/// Broad classes of failure, used to pick status codes and exit messages
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    Authorization,
    Validation,
    DuplicateApproval,
    TerminalState,
    NotFound,
    ExecutionFailure,
}

impl MultisigError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MultisigError::NotApprover { .. } | MultisigError::ApproversRequired => {
                ErrorKind::Authorization
            }
            MultisigError::InvalidQuorum { .. }
            | MultisigError::DuplicateApprover(_)
            | MultisigError::InvalidAmount => ErrorKind::Validation,
            MultisigError::TransferNotFound(_) | MultisigError::TransactionNotFound(_) => {
                ErrorKind::NotFound
            }
            MultisigError::TransferAlreadyApproved | MultisigError::TransactionAlreadyApproved => {
                ErrorKind::DuplicateApproval
            }
            MultisigError::TransferAlreadySent | MultisigError::TransactionAlreadyExecuted => {
                ErrorKind::TerminalState
            }
        }
    }
}

/// Result of recording an approval (or a transaction's creation)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Approval {
    /// Proposal id
    pub id: u64,
    /// Approvals after this one
    pub approvals: u32,
    /// Effect to perform when this approval reached quorum
    pub execution: Option<Execution>,
}

/// A quorum-approved wallet
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MultisigWallet {
    address: Address,
    name: String,
    registry: ApproverRegistry,
    proposals: ProposalStore,
    created_at: DateTime<Utc>,
}

impl MultisigWallet {
    /// Create a wallet at `address`
    ///
    /// # Errors
    /// Fails if the approver set or quorum is invalid (see [`ApproverRegistry::new`])
    pub fn new(
        address: Address,
        name: impl Into<String>,
        approvers: Vec<Address>,
        quorum: u32,
    ) -> Result<Self, MultisigError> {
        let registry = ApproverRegistry::new(approvers, quorum)?;
        Ok(Self {
            address,
            name: name.into(),
            registry,
            proposals: ProposalStore::new(),
            created_at: Utc::now(),
        })
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn approvers(&self) -> &[Address] {
        self.registry.approvers()
    }

    pub fn quorum(&self) -> u32 {
        self.registry.quorum()
    }

    pub fn is_approver(&self, identity: &Address) -> bool {
        self.registry.is_approver(identity)
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Get human-readable description like "2-of-3"
    pub fn description(&self) -> String {
        self.registry.description()
    }

    pub fn transfers(&self) -> &[Transfer] {
        self.proposals.transfers()
    }

    pub fn transfer(&self, id: u64) -> Result<&Transfer, MultisigError> {
        self.proposals
            .transfer(id)
            .ok_or(MultisigError::TransferNotFound(id))
    }

    pub fn transactions(&self) -> &[Transaction] {
        self.proposals.transactions()
    }

    pub fn transaction(&self, id: u64) -> Result<&Transaction, MultisigError> {
        self.proposals
            .transaction(id)
            .ok_or(MultisigError::TransactionNotFound(id))
    }

    /// Id the next transaction will get. Transactions are numbered from 1,
    /// so existing ids are `1..transaction_count()`.
    pub fn transaction_count(&self) -> u64 {
        self.proposals.next_transaction_id()
    }

    /// Propose paying `amount` to `to`. Starts with no approvals.
    pub fn create_transfer(
        &mut self,
        caller: &Address,
        amount: Amount,
        to: Address,
    ) -> Result<u64, MultisigError> {
        self.ensure_approver(caller)?;
        if amount == 0 {
            return Err(MultisigError::InvalidAmount);
        }

        let id = self.proposals.push_transfer(amount, to);
        log::info!(
            "Wallet {}: transfer {} of {} to {} proposed by {}",
            self.address,
            id,
            amount,
            to,
            caller
        );
        Ok(id)
    }

    /// Approve transfer `id`. Reaching quorum marks it sent and returns the payment.
    #[must_use = "a returned execution must be performed in the same atomic step"]
    pub fn approve_transfer(&mut self, caller: &Address, id: u64) -> Result<Approval, MultisigError> {
        self.ensure_approver(caller)?;
        let quorum = self.registry.quorum();
        let transfer = self
            .proposals
            .transfer_mut(id)
            .ok_or(MultisigError::TransferNotFound(id))?;

        if transfer.has_approved(caller) {
            return Err(MultisigError::TransferAlreadyApproved);
        }
        if transfer.sent {
            return Err(MultisigError::TransferAlreadySent);
        }

        transfer.record_approval(*caller);
        let approvals = transfer.approvals();

        let execution = if approvals >= quorum {
            transfer.sent = true;
            Some(Execution::Payment {
                transfer_id: id,
                to: transfer.to,
                amount: transfer.amount,
            })
        } else {
            None
        };

        log::info!(
            "Wallet {}: transfer {} approved by {} ({}/{})",
            self.address,
            id,
            caller,
            approvals,
            quorum
        );

        Ok(Approval {
            id,
            approvals,
            execution,
        })
    }

    /// Propose calling `to` with `data`. The creator's approval is recorded
    /// immediately; with a quorum of one that alone executes the call.
    #[must_use = "a returned execution must be performed in the same atomic step"]
    pub fn create_transaction(
        &mut self,
        caller: &Address,
        to: Address,
        data: Payload,
    ) -> Result<Approval, MultisigError> {
        self.ensure_approver(caller)?;
        let quorum = self.registry.quorum();

        let id = self.proposals.push_transaction(*caller, to, data);
        log::info!(
            "Wallet {}: transaction {} to {} proposed by {}",
            self.address,
            id,
            to,
            caller
        );

        let execution = self.execution_if_quorum(id, quorum);
        Ok(Approval {
            id,
            approvals: 1,
            execution,
        })
    }

    /// Approve transaction `id`. Reaching quorum marks it executed and returns the call.
    #[must_use = "a returned execution must be performed in the same atomic step"]
    pub fn approve_transaction(
        &mut self,
        caller: &Address,
        id: u64,
    ) -> Result<Approval, MultisigError> {
        self.ensure_approver(caller)?;
        let quorum = self.registry.quorum();
        let transaction = self
            .proposals
            .transaction_mut(id)
            .ok_or(MultisigError::TransactionNotFound(id))?;

        if transaction.has_approved(caller) {
            return Err(MultisigError::TransactionAlreadyApproved);
        }
        if transaction.executed {
            return Err(MultisigError::TransactionAlreadyExecuted);
        }

        transaction.record_approval(*caller);
        let approvals = transaction.approvals();
        log::info!(
            "Wallet {}: transaction {} approved by {} ({}/{})",
            self.address,
            id,
            caller,
            approvals,
            quorum
        );

        let execution = self.execution_if_quorum(id, quorum);
        Ok(Approval {
            id,
            approvals,
            execution,
        })
    }

    fn execution_if_quorum(&mut self, id: u64, quorum: u32) -> Option<Execution> {
        let transaction = self.proposals.transaction_mut(id)?;
        if transaction.executed || transaction.approvals() < quorum {
            return None;
        }
        transaction.executed = true;
        Some(Execution::Call {
            transaction_id: id,
            to: transaction.to,
            data: transaction.data.clone(),
        })
    }

    fn ensure_approver(&self, caller: &Address) -> Result<(), MultisigError> {
        if self.registry.is_approver(caller) {
            Ok(())
        } else {
            Err(MultisigError::NotApprover { caller: *caller })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::address::ADDRESS_LEN;
    use crate::core::ONE_COIN;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn addr(byte: u8) -> Address {
        Address::from_bytes([byte; ADDRESS_LEN])
    }

    const X: u8 = 1;
    const Y: u8 = 2;
    const Z: u8 = 3;
    const W: u8 = 9;

    fn wallet(quorum: u32) -> MultisigWallet {
        MultisigWallet::new(addr(0xee), "Treasury", vec![addr(X), addr(Y), addr(Z)], quorum)
            .unwrap()
    }

    #[test]
    fn test_wallet_metadata() {
        let w = wallet(2);
        assert_eq!(w.name(), "Treasury");
        assert_eq!(w.approvers(), &[addr(X), addr(Y), addr(Z)]);
        assert_eq!(w.quorum(), 2);
        assert_eq!(w.description(), "2-of-3");
        assert_eq!(w.transaction_count(), 1);
        assert!(w.transfers().is_empty());
    }

    #[test]
    fn test_transfer_reaches_quorum() {
        let mut w = wallet(2);
        let amount = ONE_COIN / 10;

        let id = w.create_transfer(&addr(X), amount, addr(Z)).unwrap();
        assert_eq!(id, 0);
        assert_eq!(w.transfer(0).unwrap().approvals(), 0);
        assert!(!w.transfer(0).unwrap().sent);

        let first = w.approve_transfer(&addr(X), 0).unwrap();
        assert_eq!(first.approvals, 1);
        assert!(first.execution.is_none());
        assert!(!w.transfer(0).unwrap().sent);

        let second = w.approve_transfer(&addr(Y), 0).unwrap();
        assert_eq!(second.approvals, 2);
        assert_eq!(
            second.execution,
            Some(Execution::Payment {
                transfer_id: 0,
                to: addr(Z),
                amount
            })
        );
        assert!(w.transfer(0).unwrap().sent);
    }

    #[test]
    fn test_non_approver_rejected() {
        let mut w = wallet(2);

        assert_eq!(
            w.create_transfer(&addr(W), 1, addr(Z)),
            Err(MultisigError::NotApprover { caller: addr(W) })
        );
        assert!(w.transfers().is_empty());

        let err = w
            .create_transaction(&addr(W), addr(Z), Payload::default())
            .unwrap_err();
        assert_eq!(err.to_string(), "only approver allowed");
        assert_eq!(err.kind(), ErrorKind::Authorization);
        assert_eq!(w.transaction_count(), 1);
    }

    #[test]
    fn test_non_approver_checked_before_lookup() {
        let mut w = wallet(2);
        assert!(matches!(
            w.approve_transfer(&addr(W), 42),
            Err(MultisigError::NotApprover { .. })
        ));
    }

    #[test]
    fn test_zero_amount_rejected() {
        let mut w = wallet(2);
        assert_eq!(
            w.create_transfer(&addr(X), 0, addr(Z)),
            Err(MultisigError::InvalidAmount)
        );
    }

    #[test]
    fn test_approve_missing_proposals() {
        let mut w = wallet(2);
        assert_eq!(
            w.approve_transfer(&addr(X), 0),
            Err(MultisigError::TransferNotFound(0))
        );
        assert_eq!(
            w.approve_transaction(&addr(X), 0),
            Err(MultisigError::TransactionNotFound(0))
        );
        assert_eq!(
            w.transaction(1).unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn test_transfer_double_approval() {
        let mut w = wallet(3);
        w.create_transfer(&addr(X), 5, addr(Z)).unwrap();
        w.approve_transfer(&addr(X), 0).unwrap();

        let err = w.approve_transfer(&addr(X), 0).unwrap_err();
        assert_eq!(err.to_string(), "cannot approve transfer twice");
        assert_eq!(err.kind(), ErrorKind::DuplicateApproval);
        assert_eq!(w.transfer(0).unwrap().approvals(), 1);
    }

    #[test]
    fn test_sent_transfer_rejects_new_approvals() {
        let mut w = wallet(2);
        w.create_transfer(&addr(X), 5, addr(Z)).unwrap();
        w.approve_transfer(&addr(X), 0).unwrap();
        w.approve_transfer(&addr(Y), 0).unwrap();

        let err = w.approve_transfer(&addr(Z), 0).unwrap_err();
        assert_eq!(err.to_string(), "Transfer has already been sent");
        assert_eq!(err.kind(), ErrorKind::TerminalState);
        assert_eq!(w.transfer(0).unwrap().approvals(), 2);

        // a prior approver hits the duplicate check first
        assert_eq!(
            w.approve_transfer(&addr(X), 0),
            Err(MultisigError::TransferAlreadyApproved)
        );
    }

    #[test]
    fn test_transaction_creator_auto_approves() {
        let mut w = wallet(2);
        let data = Payload::new(vec![0x06, 0xfd, 0xde, 0x03]);

        let created = w.create_transaction(&addr(X), addr(0xee), data.clone()).unwrap();
        assert_eq!(created.id, 1);
        assert_eq!(created.approvals, 1);
        assert!(created.execution.is_none());
        assert_eq!(w.transaction_count(), 2);

        let tx = w.transaction(1).unwrap();
        assert_eq!(tx.approvals(), 1);
        assert!(!tx.executed);

        let err = w.approve_transaction(&addr(X), 1).unwrap_err();
        assert_eq!(err.to_string(), "Cannot approve transaction twice");

        let approved = w.approve_transaction(&addr(Y), 1).unwrap();
        assert_eq!(approved.approvals, 2);
        assert_eq!(
            approved.execution,
            Some(Execution::Call {
                transaction_id: 1,
                to: addr(0xee),
                data
            })
        );
        assert!(w.transaction(1).unwrap().executed);

        let err = w.approve_transaction(&addr(Z), 1).unwrap_err();
        assert_eq!(err.to_string(), "Transaction has already been executed");
        assert_eq!(w.transaction(1).unwrap().approvals(), 2);
    }

    #[test]
    fn test_single_quorum_transaction_executes_on_creation() {
        let mut w = wallet(1);
        let created = w
            .create_transaction(&addr(Y), addr(Z), Payload::default())
            .unwrap();

        assert!(created.execution.is_some());
        assert!(w.transaction(created.id).unwrap().executed);
    }

    #[test]
    fn test_wallet_serialization_keeps_state() {
        let mut w = wallet(2);
        w.create_transfer(&addr(X), 5, addr(Z)).unwrap();
        w.approve_transfer(&addr(Y), 0).unwrap();

        let json = serde_json::to_string(&w).unwrap();
        let mut back: MultisigWallet = serde_json::from_str(&json).unwrap();
        assert_eq!(
            back.approve_transfer(&addr(Y), 0),
            Err(MultisigError::TransferAlreadyApproved)
        );
        assert!(back.approve_transfer(&addr(X), 0).unwrap().execution.is_some());
    }

    /// Random create/approve sequences from random approvers must keep the
    /// approval count equal to the number of distinct approvers, reject every
    /// repeat, and never execute a proposal twice.
    #[test]
    fn test_random_operation_sequences() {
        let approvers: Vec<Address> = (1..=5).map(addr).collect();
        let outsider = addr(W);

        for seed in 0..50u64 {
            let mut rng = StdRng::seed_from_u64(seed);
            let quorum = rng.gen_range(1..=approvers.len() as u32);
            let mut w =
                MultisigWallet::new(addr(0xee), "fuzz", approvers.clone(), quorum).unwrap();
            let mut executions = 0usize;
            let mut expected_executions = 0usize;

            for _ in 0..200 {
                let caller = if rng.gen_bool(0.05) {
                    outsider
                } else {
                    approvers[rng.gen_range(0..approvers.len())]
                };

                match rng.gen_range(0..4) {
                    0 => {
                        let result = w.create_transfer(&caller, rng.gen_range(1..100), addr(Z));
                        assert_eq!(result.is_ok(), caller != outsider);
                    }
                    1 => {
                        if let Ok(created) =
                            w.create_transaction(&caller, addr(Z), Payload::default())
                        {
                            expected_executions += usize::from(quorum == 1);
                            executions += usize::from(created.execution.is_some());
                        }
                    }
                    2 if !w.transfers().is_empty() => {
                        let id = rng.gen_range(0..w.transfers().len() as u64);
                        let before = w.transfer(id).unwrap().clone();
                        match w.approve_transfer(&caller, id) {
                            Ok(approval) => {
                                assert!(!before.has_approved(&caller));
                                assert!(!before.sent);
                                assert_eq!(approval.approvals, before.approvals() + 1);
                                if approval.execution.is_some() {
                                    executions += 1;
                                    expected_executions += 1;
                                    assert_eq!(approval.approvals, quorum);
                                }
                            }
                            Err(MultisigError::TransferAlreadyApproved) => {
                                assert!(before.has_approved(&caller));
                                assert_eq!(w.transfer(id).unwrap(), &before);
                            }
                            Err(MultisigError::TransferAlreadySent) => {
                                assert!(before.sent);
                                assert_eq!(w.transfer(id).unwrap(), &before);
                            }
                            Err(MultisigError::NotApprover { .. }) => {
                                assert_eq!(caller, outsider);
                            }
                            Err(other) => panic!("unexpected error: {}", other),
                        }
                    }
                    3 if w.transaction_count() > 1 => {
                        let id = rng.gen_range(1..w.transaction_count());
                        let before = w.transaction(id).unwrap().clone();
                        match w.approve_transaction(&caller, id) {
                            Ok(approval) => {
                                assert!(!before.executed);
                                if approval.execution.is_some() {
                                    executions += 1;
                                    expected_executions += 1;
                                }
                            }
                            Err(MultisigError::TransactionAlreadyApproved) => {
                                assert!(before.has_approved(&caller));
                                assert_eq!(w.transaction(id).unwrap(), &before);
                            }
                            Err(MultisigError::TransactionAlreadyExecuted) => {
                                assert!(before.executed);
                                assert_eq!(w.transaction(id).unwrap(), &before);
                            }
                            Err(MultisigError::NotApprover { .. }) => {
                                assert_eq!(caller, outsider);
                            }
                            Err(other) => panic!("unexpected error: {}", other),
                        }
                    }
                    _ => {}
                }

                for t in w.transfers() {
                    assert!(t.approvals() <= quorum);
                    assert_eq!(t.sent, t.approvals() == quorum);
                }
                for tx in w.transactions() {
                    assert!(tx.approvals() >= 1 && tx.approvals() <= quorum);
                    assert_eq!(tx.executed, tx.approvals() == quorum);
                }
            }

            let terminal = w.transfers().iter().filter(|t| t.sent).count()
                + w.transactions().iter().filter(|t| t.executed).count();
            assert_eq!(executions, terminal);
            assert_eq!(executions, expected_executions);
        }
    }
}
