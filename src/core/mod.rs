//! Core ledger types
//!
//! Identities, native currency amounts and call encoding shared by the
//! wallet engine, the VM and the ledger runtime.

pub mod abi;
pub mod address;
pub mod amount;

pub use abi::{encode_call, encode_call_args, AbiError, ParamType, Payload, Selector, Token};
pub use address::{Address, AddressError};
pub use amount::{format_amount, parse_amount, Amount, AmountError, DECIMALS, ONE_COIN};
