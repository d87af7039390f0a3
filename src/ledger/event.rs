//! Ledger event log
//!
//! Events are staged while an operation runs and committed only if the
//! whole operation succeeds.

use crate::core::amount::as_string;
use crate::core::{Address, Amount, Payload};
use crate::multisig::WalletCreated;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Something observable that happened on the ledger
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "data")]
pub enum Event {
    /// Native currency was minted into an account
    Funded {
        account: Address,
        #[serde(with = "as_string")]
        amount: Amount,
    },
    /// Native currency moved between two accounts
    Payment {
        from: Address,
        to: Address,
        #[serde(with = "as_string")]
        amount: Amount,
    },
    /// A wallet received native currency
    Deposit {
        wallet: Address,
        from: Address,
        #[serde(with = "as_string")]
        amount: Amount,
    },
    FactoryDeployed { factory: Address, deployer: Address },
    /// A wallet was deployed directly, outside any factory
    WalletDeployed {
        wallet: Address,
        deployer: Address,
        approvers: Vec<Address>,
        quorum: u32,
        name: String,
    },
    WalletCreated(WalletCreated),
    TransferCreated {
        wallet: Address,
        id: u64,
        #[serde(with = "as_string")]
        amount: Amount,
        to: Address,
        creator: Address,
    },
    TransferApproved {
        wallet: Address,
        id: u64,
        approver: Address,
        approvals: u32,
    },
    TransferSent {
        wallet: Address,
        id: u64,
        to: Address,
        #[serde(with = "as_string")]
        amount: Amount,
    },
    TransactionCreated {
        wallet: Address,
        id: u64,
        to: Address,
        data: Payload,
        creator: Address,
    },
    TransactionApproved {
        wallet: Address,
        id: u64,
        approver: Address,
        approvals: u32,
    },
    TransactionExecuted { wallet: Address, id: u64, to: Address },
    ContractDeployed { contract: Address, deployer: Address },
}

impl Event {
    /// Variant name, e.g. `"TransferSent"`
    pub fn name(&self) -> &'static str {
        match self {
            Event::Funded { .. } => "Funded",
            Event::Payment { .. } => "Payment",
            Event::Deposit { .. } => "Deposit",
            Event::FactoryDeployed { .. } => "FactoryDeployed",
            Event::WalletDeployed { .. } => "WalletDeployed",
            Event::WalletCreated(_) => "WalletCreated",
            Event::TransferCreated { .. } => "TransferCreated",
            Event::TransferApproved { .. } => "TransferApproved",
            Event::TransferSent { .. } => "TransferSent",
            Event::TransactionCreated { .. } => "TransactionCreated",
            Event::TransactionApproved { .. } => "TransactionApproved",
            Event::TransactionExecuted { .. } => "TransactionExecuted",
            Event::ContractDeployed { .. } => "ContractDeployed",
        }
    }
}

/// A committed event with its origin
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogEntry {
    /// Sequence number of the operation that emitted it
    pub sequence: u64,
    /// Account that emitted it
    pub emitter: Address,
    pub event: Event,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::address::ADDRESS_LEN;

    #[test]
    fn test_event_serialization() {
        let wallet = Address::from_bytes([1; ADDRESS_LEN]);
        let event = Event::TransferSent {
            wallet,
            id: 0,
            to: Address::from_bytes([2; ADDRESS_LEN]),
            amount: 5,
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"TransferSent\""));
        assert!(json.contains(&wallet.to_string()));
        assert_eq!(event.name(), "TransferSent");

        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_wallet_created_carries_parameters() {
        let event = Event::WalletCreated(WalletCreated {
            factory: Address::ZERO,
            wallet: Address::from_bytes([3; ADDRESS_LEN]),
            approvers: vec![Address::from_bytes([4; ADDRESS_LEN])],
            quorum: 1,
            name: "Ops".to_string(),
        });

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "WalletCreated");
        assert_eq!(json["data"]["quorum"], 1);
        assert_eq!(json["data"]["name"], "Ops");
    }
}
