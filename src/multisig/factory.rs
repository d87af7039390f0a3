//! Wallet factory
//!
//! Creates wallets, keeps a record of every wallet it created, and indexes
//! them by approver so a client can discover the wallets an identity
//! belongs to.

use crate::core::Address;
use crate::multisig::registry::ApproverRegistry;
use crate::multisig::wallet::{MultisigError, MultisigWallet};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Construction parameters of a wallet created by a factory
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct WalletRecord {
    pub address: Address,
    pub approvers: Vec<Address>,
    pub quorum: u32,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Emitted when a factory creates a wallet
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct WalletCreated {
    pub factory: Address,
    pub wallet: Address,
    pub approvers: Vec<Address>,
    pub quorum: u32,
    pub name: String,
}

/// Creates wallets and maintains the approver → wallets index
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WalletFactory {
    address: Address,
    records: Vec<WalletRecord>,
    /// Approver → wallets that list it, in creation order
    approver_index: HashMap<Address, Vec<Address>>,
}

impl WalletFactory {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            records: Vec::new(),
            approver_index: HashMap::new(),
        }
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Validate parameters, create a wallet at `address` and index it under
    /// each approver
    ///
    /// The caller allocates `address`; the ledger derives it from the
    /// factory's deployment nonce.
    ///
    /// # Errors
    /// `ApproversRequired`, `InvalidQuorum` or `DuplicateApprover`; the
    /// factory is left unchanged on error.
    pub fn create_wallet(
        &mut self,
        address: Address,
        approvers: Vec<Address>,
        quorum: u32,
        name: &str,
    ) -> Result<(MultisigWallet, WalletCreated), MultisigError> {
        ApproverRegistry::new(approvers.clone(), quorum)?;

        let wallet = MultisigWallet::new(address, name, approvers.clone(), quorum)?;

        for approver in &approvers {
            self.approver_index
                .entry(*approver)
                .or_default()
                .push(address);
        }

        self.records.push(WalletRecord {
            address,
            approvers: approvers.clone(),
            quorum,
            name: name.to_string(),
            created_at: wallet.created_at(),
        });

        log::info!(
            "Factory {} created wallet {} ({}, {}-of-{})",
            self.address,
            address,
            name,
            quorum,
            approvers.len()
        );

        let event = WalletCreated {
            factory: self.address,
            wallet: address,
            approvers,
            quorum,
            name: name.to_string(),
        };
        Ok((wallet, event))
    }

    /// Wallets that list `approver`, oldest first. Empty if none.
    pub fn wallets_for_approver(&self, approver: &Address) -> &[Address] {
        self.approver_index
            .get(approver)
            .map(|w| w.as_slice())
            .unwrap_or(&[])
    }

    pub fn wallet(&self, address: &Address) -> Option<&WalletRecord> {
        self.records.iter().find(|r| &r.address == address)
    }

    pub fn wallets(&self) -> &[WalletRecord] {
        &self.records
    }

    pub fn wallet_count(&self) -> usize {
        self.records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::address::ADDRESS_LEN;
    use rand::rngs::StdRng;
    use rand::seq::SliceRandom;
    use rand::{Rng, SeedableRng};

    fn addr(byte: u8) -> Address {
        Address::from_bytes([byte; ADDRESS_LEN])
    }

    fn factory() -> WalletFactory {
        WalletFactory::new(addr(0xfa))
    }

    #[test]
    fn test_create_wallet() {
        let mut f = factory();
        let expected = addr(0x10);
        let (wallet, event) = f
            .create_wallet(expected, vec![addr(1), addr(2), addr(3)], 2, "Ops")
            .unwrap();

        assert_eq!(wallet.address(), &expected);
        assert_eq!(wallet.name(), "Ops");
        assert_eq!(wallet.quorum(), 2);
        assert_eq!(event.wallet, expected);
        assert_eq!(event.factory, addr(0xfa));
        assert_eq!(event.approvers, vec![addr(1), addr(2), addr(3)]);
        assert_eq!(f.wallet_count(), 1);
        assert_eq!(f.wallet(&expected).unwrap().name, "Ops");
    }

    #[test]
    fn test_index_keeps_creation_order() {
        let mut f = factory();
        f.create_wallet(addr(0x20), vec![addr(1), addr(2)], 1, "a").unwrap();
        f.create_wallet(addr(0x21), vec![addr(2)], 1, "b").unwrap();

        assert_eq!(f.wallets_for_approver(&addr(2)), &[addr(0x20), addr(0x21)]);
        assert_eq!(f.wallets_for_approver(&addr(1)), &[addr(0x20)]);
        assert_eq!(f.wallets()[1].name, "b");
    }

    #[test]
    fn test_create_wallet_validation() {
        let mut f = factory();

        let err = f.create_wallet(addr(0x10), vec![], 2, "X").unwrap_err();
        assert_eq!(err.to_string(), "Approvers required");

        let three = vec![addr(1), addr(2), addr(3)];
        let err = f.create_wallet(addr(0x10), three.clone(), 0, "X").unwrap_err();
        assert_eq!(err.to_string(), "Invalid quorum");
        let err = f.create_wallet(addr(0x10), three, 4, "X").unwrap_err();
        assert_eq!(err.to_string(), "Invalid quorum");

        assert_eq!(f.wallet_count(), 0);
        assert!(f.wallets_for_approver(&addr(1)).is_empty());
    }

    #[test]
    fn test_unknown_approver_has_no_wallets() {
        assert!(factory().wallets_for_approver(&addr(42)).is_empty());
    }

    /// Every approver of a created wallet finds it in the index afterwards and
    /// not before; non-members never do.
    #[test]
    fn test_approver_index_property() {
        let population: Vec<Address> = (1..=8).map(addr).collect();

        for seed in 0..20u64 {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut f = factory();

            for i in 0..15 {
                let size = rng.gen_range(1..=population.len());
                let approvers: Vec<Address> = population
                    .choose_multiple(&mut rng, size)
                    .copied()
                    .collect();
                let quorum = rng.gen_range(1..=size as u32);

                let upcoming = Address::derive(f.address(), i);
                for a in &population {
                    assert!(!f.wallets_for_approver(a).contains(&upcoming));
                }

                let (wallet, _) = f
                    .create_wallet(upcoming, approvers.clone(), quorum, &format!("w{}", i))
                    .unwrap();

                for a in &population {
                    let listed = f.wallets_for_approver(a).contains(wallet.address());
                    assert_eq!(listed, approvers.contains(a));
                }
            }

            let indexed: usize = population
                .iter()
                .map(|a| f.wallets_for_approver(a).len())
                .sum();
            let expected: usize = f.wallets().iter().map(|r| r.approvers.len()).sum();
            assert_eq!(indexed, expected);
        }
    }
}
