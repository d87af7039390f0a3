//! Proposal store
//!
//! Transfers and transactions of one wallet, kept in append-only arenas.
//! A proposal's id is derived from its slot, so ids are dense and never
//! reused. Only the approval set and the terminal flag change after
//! creation.
//!
//! Transfer ids start at 0. Transaction ids start at 1; id 0 is never
//! assigned, and [`ProposalStore::next_transaction_id`] doubles as the
//! wallet's `transactionCount`.

use crate::core::{Address, Amount, Payload};
use serde::{Deserialize, Serialize};

/// First id handed out to a transaction
pub const FIRST_TRANSACTION_ID: u64 = 1;

/// Distinct approvers of one proposal, in approval order
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct ApprovalSet(Vec<Address>);

impl ApprovalSet {
    fn with_first(approver: Address) -> Self {
        Self(vec![approver])
    }

    pub fn contains(&self, approver: &Address) -> bool {
        self.0.contains(approver)
    }

    pub fn count(&self) -> u32 {
        self.0.len() as u32
    }

    /// Record an approval. Returns false if the approver was already present.
    fn insert(&mut self, approver: Address) -> bool {
        if self.contains(&approver) {
            return false;
        }
        self.0.push(approver);
        true
    }
}

/// A proposal to pay native currency out of the wallet
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Transfer {
    pub id: u64,
    pub amount: Amount,
    pub to: Address,
    approved_by: ApprovalSet,
    pub sent: bool,
}

impl Transfer {
    /// Number of distinct approvers so far
    pub fn approvals(&self) -> u32 {
        self.approved_by.count()
    }

    pub fn has_approved(&self, approver: &Address) -> bool {
        self.approved_by.contains(approver)
    }

    pub(crate) fn record_approval(&mut self, approver: Address) -> bool {
        self.approved_by.insert(approver)
    }
}

/// A proposal to call another contract with the wallet as caller
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Transaction {
    pub id: u64,
    pub to: Address,
    pub data: Payload,
    approved_by: ApprovalSet,
    pub executed: bool,
}

impl Transaction {
    /// Number of distinct approvers so far, the creator included
    pub fn approvals(&self) -> u32 {
        self.approved_by.count()
    }

    pub fn has_approved(&self, approver: &Address) -> bool {
        self.approved_by.contains(approver)
    }

    pub(crate) fn record_approval(&mut self, approver: Address) -> bool {
        self.approved_by.insert(approver)
    }
}

/// Append-only storage of a wallet's proposals
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProposalStore {
    transfers: Vec<Transfer>,
    transactions: Vec<Transaction>,
}

impl ProposalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a transfer with no approvals; returns its id
    pub fn push_transfer(&mut self, amount: Amount, to: Address) -> u64 {
        let id = self.next_transfer_id();
        self.transfers.push(Transfer {
            id,
            amount,
            to,
            approved_by: ApprovalSet::default(),
            sent: false,
        });
        id
    }

    /// Append a transaction already approved by its creator; returns its id
    pub fn push_transaction(&mut self, creator: Address, to: Address, data: Payload) -> u64 {
        let id = self.next_transaction_id();
        self.transactions.push(Transaction {
            id,
            to,
            data,
            approved_by: ApprovalSet::with_first(creator),
            executed: false,
        });
        id
    }

    pub fn transfer(&self, id: u64) -> Option<&Transfer> {
        self.transfers.get(usize::try_from(id).ok()?)
    }

    pub(crate) fn transfer_mut(&mut self, id: u64) -> Option<&mut Transfer> {
        self.transfers.get_mut(usize::try_from(id).ok()?)
    }

    pub fn transaction(&self, id: u64) -> Option<&Transaction> {
        self.transactions.get(transaction_slot(id)?)
    }

    pub(crate) fn transaction_mut(&mut self, id: u64) -> Option<&mut Transaction> {
        let slot = transaction_slot(id)?;
        self.transactions.get_mut(slot)
    }

    pub fn transfers(&self) -> &[Transfer] {
        &self.transfers
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn next_transfer_id(&self) -> u64 {
        self.transfers.len() as u64
    }

    pub fn next_transaction_id(&self) -> u64 {
        self.transactions.len() as u64 + FIRST_TRANSACTION_ID
    }
}

fn transaction_slot(id: u64) -> Option<usize> {
    usize::try_from(id.checked_sub(FIRST_TRANSACTION_ID)?).ok()
}
