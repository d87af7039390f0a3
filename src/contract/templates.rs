//! Ready-made contract sources
//!
//! Small contracts that are useful as transaction targets from a wallet.

/// `withdraw(address to, uint256 amount)`: pays `amount` of the contract's
/// own balance to `to`. Any other selector reverts.
pub const WITHDRAW: &str = "
; withdraw(address,uint256)
SELECTOR
PUSH @withdraw(address,uint256)
EQ
JUMPI withdraw
REVERT
:withdraw
ARGADDR 0
ARG 1
TRANSFER
RETURN
";

/// `increment()`: bumps a counter in slot 0 and returns the new value.
/// `count()`: returns the counter.
pub const COUNTER: &str = "
SELECTOR
PUSH @increment()
EQ
JUMPI increment
SELECTOR
PUSH @count()
EQ
JUMPI count
REVERT
:increment
PUSH 0
PUSH 0
SLOAD
PUSH 1
ADD
SSTORE
:count
PUSH 0
SLOAD
RETURN
";

/// Rejects every call
pub const ALWAYS_REVERT: &str = "REVERT";

/// Look up a template by name
pub fn source(name: &str) -> Option<&'static str> {
    match name {
        "withdraw" => Some(WITHDRAW),
        "counter" => Some(COUNTER),
        "revert" => Some(ALWAYS_REVERT),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{Compiler, ContractManager};
    use crate::contract::contract::CallParams;
    use crate::core::abi::{encode_call, Token};
    use crate::core::Address;

    #[test]
    fn test_templates_compile() {
        for name in ["withdraw", "counter", "revert"] {
            let mut compiler = Compiler::new();
            assert!(compiler.compile(source(name).unwrap()).is_ok(), "{}", name);
        }
        assert!(source("missing").is_none());
    }

    #[test]
    fn test_withdraw_requests_payment() {
        let code = Compiler::new().compile(WITHDRAW).unwrap();
        let mut manager = ContractManager::new();
        let contract = Address::random();
        manager.deploy(contract, code, Address::random(), 0).unwrap();

        let to = Address::random();
        let data = encode_call("withdraw(address,uint256)", &[Token::Address(to), Token::Uint(250)]);
        let result = manager
            .call(
                &contract,
                CallParams {
                    caller: Address::random(),
                    data: data.as_bytes(),
                    balance: 1_000,
                    sequence: 0,
                    gas_limit: None,
                },
            )
            .unwrap();

        assert_eq!(result.transfers, vec![(to, 250)]);
    }

    #[test]
    fn test_counter_increments() {
        let code = Compiler::new().compile(COUNTER).unwrap();
        let mut manager = ContractManager::new();
        let contract = Address::random();
        manager.deploy(contract, code, Address::random(), 0).unwrap();

        let increment = encode_call("increment()", &[]);
        for expected in 1..=3u128 {
            let result = manager
                .call(
                    &contract,
                    CallParams {
                        caller: Address::random(),
                        data: increment.as_bytes(),
                        balance: 0,
                        sequence: 0,
                        gas_limit: None,
                    },
                )
                .unwrap();
            assert_eq!(result.return_value, Some(expected));
        }
    }
}
