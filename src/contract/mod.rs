//! Smart contract module
//!
//! A stack-based VM whose contracts serve as call targets for wallet
//! transactions.
//!
//! # Overview
//!
//! This module implements:
//! - A stack-based VM with 128-bit words and gas metering
//! - Contract deployment and invocation with word-encoded call data
//! - A simple assembly-like compiler and a disassembler
//! - Ready-made contract templates
//!
//! # Example
//!
//! ```rust
//! use multisig_wallet::contract::{CallParams, Compiler, ContractManager};
//! use multisig_wallet::core::Address;
//!
//! // Compile a simple contract
//! let mut compiler = Compiler::new();
//! let bytecode = compiler.compile("
//!     PUSH 42
//!     RETURN
//! ").unwrap();
//!
//! // Deploy the contract
//! let mut manager = ContractManager::new();
//! let address = manager.deploy(Address::random(), bytecode, Address::random(), 1).unwrap();
//!
//! // Call the contract
//! let params = CallParams {
//!     caller: Address::random(),
//!     data: &[],
//!     balance: 0,
//!     sequence: 1,
//!     gas_limit: None,
//! };
//! let result = manager.call(&address, params).unwrap();
//! assert_eq!(result.return_value, Some(42));
//! ```

pub mod compiler;
pub mod contract;
pub mod opcodes;
pub mod templates;
pub mod vm;

pub use compiler::{disassemble, Compiler, CompilerError};
pub use contract::{CallParams, Contract, ContractError, ContractManager};
pub use opcodes::OpCode;
pub use vm::{ExecutionContext, ExecutionResult, VmError, DEFAULT_GAS_LIMIT, VM};
