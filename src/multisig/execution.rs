//! Effects performed when a proposal reaches quorum
//!
//! The wallet engine never moves funds or calls other contracts itself.
//! The approval that reaches quorum hands back an [`Execution`], and the
//! ledger performs it through the [`Runtime`] trait inside the same atomic
//! operation. A failed effect fails the whole approval.

use crate::core::amount::as_string;
use crate::core::{Address, Amount, Payload};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures of a dispatched payment or call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("Insufficient balance: {account} has {available}, needs {required}")]
    InsufficientBalance {
        account: Address,
        available: Amount,
        required: Amount,
    },
    #[error("Balance overflow: {0}")]
    BalanceOverflow(Address),
    #[error("Call reverted: {0}")]
    Reverted(String),
    #[error("Call depth exceeded: {0}")]
    CallDepthExceeded(usize),
}

/// Capabilities the engine needs from the ledger it runs on
pub trait Runtime {
    /// Move native currency from one account to another
    fn pay(&mut self, from: &Address, to: &Address, amount: Amount)
        -> Result<(), ExecutionError>;

    /// Deliver call data to `to` on behalf of `caller`, returning the call's output
    fn dispatch(
        &mut self,
        caller: &Address,
        to: &Address,
        data: &[u8],
    ) -> Result<Vec<u8>, ExecutionError>;
}

/// The effect of a proposal that reached quorum
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Execution {
    /// Pay `amount` from the wallet to `to`
    Payment {
        transfer_id: u64,
        to: Address,
        #[serde(with = "as_string")]
        amount: Amount,
    },
    /// Call `to` with `data`, the wallet being the caller
    Call {
        transaction_id: u64,
        to: Address,
        data: Payload,
    },
}

impl Execution {
    /// Perform the effect on behalf of `wallet`
    pub fn perform<R: Runtime + ?Sized>(
        &self,
        wallet: &Address,
        runtime: &mut R,
    ) -> Result<Vec<u8>, ExecutionError> {
        match self {
            Execution::Payment { to, amount, .. } => {
                runtime.pay(wallet, to, *amount)?;
                Ok(Vec::new())
            }
            Execution::Call { to, data, .. } => runtime.dispatch(wallet, to, data.as_bytes()),
        }
    }

    /// Recipient or call target
    pub fn target(&self) -> &Address {
        match self {
            Execution::Payment { to, .. } | Execution::Call { to, .. } => to,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::address::ADDRESS_LEN;

    #[derive(Default)]
    struct RecordingRuntime {
        payments: Vec<(Address, Address, Amount)>,
        calls: Vec<(Address, Address, Vec<u8>)>,
        fail_calls: bool,
    }

    impl Runtime for RecordingRuntime {
        fn pay(
            &mut self,
            from: &Address,
            to: &Address,
            amount: Amount,
        ) -> Result<(), ExecutionError> {
            self.payments.push((*from, *to, amount));
            Ok(())
        }

        fn dispatch(
            &mut self,
            caller: &Address,
            to: &Address,
            data: &[u8],
        ) -> Result<Vec<u8>, ExecutionError> {
            if self.fail_calls {
                return Err(ExecutionError::Reverted("nope".to_string()));
            }
            self.calls.push((*caller, *to, data.to_vec()));
            Ok(vec![1])
        }
    }

    fn addr(byte: u8) -> Address {
        Address::from_bytes([byte; ADDRESS_LEN])
    }

    #[test]
    fn test_payment_comes_from_wallet() {
        let mut rt = RecordingRuntime::default();
        let exec = Execution::Payment {
            transfer_id: 0,
            to: addr(2),
            amount: 10,
        };

        exec.perform(&addr(1), &mut rt).unwrap();
        assert_eq!(rt.payments, vec![(addr(1), addr(2), 10)]);
        assert_eq!(exec.target(), &addr(2));
    }

    #[test]
    fn test_call_forwards_payload_untouched() {
        let mut rt = RecordingRuntime::default();
        let exec = Execution::Call {
            transaction_id: 1,
            to: addr(3),
            data: Payload::new(vec![0xde, 0xad]),
        };

        let output = exec.perform(&addr(1), &mut rt).unwrap();
        assert_eq!(output, vec![1]);
        assert_eq!(rt.calls, vec![(addr(1), addr(3), vec![0xde, 0xad])]);
    }

    #[test]
    fn test_call_failure_propagates() {
        let mut rt = RecordingRuntime {
            fail_calls: true,
            ..Default::default()
        };
        let exec = Execution::Call {
            transaction_id: 1,
            to: addr(3),
            data: Payload::default(),
        };

        assert!(matches!(
            exec.perform(&addr(1), &mut rt),
            Err(ExecutionError::Reverted(_))
        ));
    }
}
