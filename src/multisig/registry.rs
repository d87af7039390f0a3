//! Approver registry
//!
//! The fixed approver set and quorum of one wallet. Both are validated
//! once at construction and never change afterwards.

use crate::core::Address;
use crate::multisig::wallet::MultisigError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Approvers and quorum for one wallet
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApproverRegistry {
    /// Approvers in construction order
    approvers: Vec<Address>,
    /// Distinct approvals needed to execute a proposal
    quorum: u32,
}

impl ApproverRegistry {
    /// Validate and build a registry
    ///
    /// # Errors
    /// - `ApproversRequired` if `approvers` is empty
    /// - `InvalidQuorum` unless `1 <= quorum <= approvers.len()`
    /// - `DuplicateApprover` if an address is listed twice
    pub fn new(approvers: Vec<Address>, quorum: u32) -> Result<Self, MultisigError> {
        if approvers.is_empty() {
            return Err(MultisigError::ApproversRequired);
        }

        if quorum == 0 || quorum as usize > approvers.len() {
            return Err(MultisigError::InvalidQuorum {
                quorum,
                approvers: approvers.len(),
            });
        }

        let mut seen = HashSet::with_capacity(approvers.len());
        for approver in &approvers {
            if !seen.insert(approver) {
                return Err(MultisigError::DuplicateApprover(*approver));
            }
        }

        Ok(Self { approvers, quorum })
    }

    pub fn is_approver(&self, identity: &Address) -> bool {
        self.approvers.contains(identity)
    }

    /// Approvers in the order they were registered
    pub fn approvers(&self) -> &[Address] {
        &self.approvers
    }

    pub fn quorum(&self) -> u32 {
        self.quorum
    }

    pub fn approver_count(&self) -> usize {
        self.approvers.len()
    }

    /// Get description like "2-of-3"
    pub fn description(&self) -> String {
        format!("{}-of-{}", self.quorum, self.approvers.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::address::ADDRESS_LEN;

    fn approvers(n: u8) -> Vec<Address> {
        (1..=n).map(|i| Address::from_bytes([i; ADDRESS_LEN])).collect()
    }

    #[test]
    fn test_registry_creation() {
        let registry = ApproverRegistry::new(approvers(3), 2).unwrap();

        assert_eq!(registry.quorum(), 2);
        assert_eq!(registry.approver_count(), 3);
        assert_eq!(registry.description(), "2-of-3");
        assert_eq!(registry.approvers(), approvers(3).as_slice());
    }

    #[test]
    fn test_membership() {
        let registry = ApproverRegistry::new(approvers(3), 1).unwrap();

        assert!(registry.is_approver(&approvers(3)[2]));
        assert!(!registry.is_approver(&Address::from_bytes([9; ADDRESS_LEN])));
    }

    #[test]
    fn test_registry_validation() {
        assert_eq!(
            ApproverRegistry::new(vec![], 2),
            Err(MultisigError::ApproversRequired)
        );
        assert!(matches!(
            ApproverRegistry::new(approvers(3), 0),
            Err(MultisigError::InvalidQuorum { quorum: 0, .. })
        ));
        assert!(matches!(
            ApproverRegistry::new(approvers(3), 4),
            Err(MultisigError::InvalidQuorum { quorum: 4, .. })
        ));

        let mut dup = approvers(2);
        dup.push(dup[0]);
        assert_eq!(
            ApproverRegistry::new(dup.clone(), 2),
            Err(MultisigError::DuplicateApprover(dup[0]))
        );
    }

    #[test]
    fn test_quorum_equal_to_size_is_allowed() {
        assert!(ApproverRegistry::new(approvers(1), 1).is_ok());
        assert!(ApproverRegistry::new(approvers(5), 5).is_ok());
    }
}
