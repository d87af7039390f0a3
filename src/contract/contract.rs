//! Smart contract management
//!
//! Handles contract deployment, storage, and invocation. Addresses are
//! assigned by the ledger so they stay unique across wallets, factories
//! and contracts.

use crate::contract::opcodes::validate_bytecode;
use crate::contract::vm::{ExecutionContext, ExecutionResult, VmError, DEFAULT_GAS_LIMIT, VM};
use crate::core::abi::{split_call, words, AbiError};
use crate::core::{Address, Amount};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Contract errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContractError {
    #[error("Contract not found: {0}")]
    NotFound(Address),
    #[error("Contract already exists: {0}")]
    AlreadyExists(Address),
    #[error("VM error: {0}")]
    VmError(#[from] VmError),
    #[error("Invalid bytecode")]
    InvalidBytecode,
    #[error("Invalid call data: {0}")]
    InvalidCallData(#[from] AbiError),
}

/// A deployed smart contract
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contract {
    /// Contract address
    pub address: Address,
    /// Contract bytecode
    pub code: Vec<u8>,
    /// Contract storage (key-value pairs)
    pub storage: HashMap<String, u128>,
    /// Deployer address
    pub deployer: Address,
    /// Ledger sequence number at deployment
    pub deployed_at: u64,
}

impl Contract {
    /// Create a new contract
    pub fn new(address: Address, code: Vec<u8>, deployer: Address, sequence: u64) -> Self {
        Self {
            address,
            code,
            storage: HashMap::new(),
            deployer,
            deployed_at: sequence,
        }
    }

    /// Execute the contract and keep its storage changes
    pub fn execute(&mut self, context: ExecutionContext) -> Result<ExecutionResult, VmError> {
        let mut vm = VM::new(self.code.clone(), self.storage.clone(), context);
        let result = vm.execute()?;

        for (key, value) in &result.storage_changes {
            self.storage.insert(key.clone(), *value);
        }

        Ok(result)
    }
}

/// Parameters of one contract call
#[derive(Debug, Clone)]
pub struct CallParams<'a> {
    pub caller: Address,
    /// Selector followed by word-aligned arguments; may be empty
    pub data: &'a [u8],
    /// The contract's balance before the call
    pub balance: Amount,
    pub sequence: u64,
    pub gas_limit: Option<u64>,
}

/// Manages all deployed contracts
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContractManager {
    /// All deployed contracts
    contracts: HashMap<Address, Contract>,
}

impl ContractManager {
    /// Create a new contract manager
    pub fn new() -> Self {
        Self {
            contracts: HashMap::new(),
        }
    }

    /// Deploy bytecode at `address`
    pub fn deploy(
        &mut self,
        address: Address,
        code: Vec<u8>,
        deployer: Address,
        sequence: u64,
    ) -> Result<Address, ContractError> {
        if code.is_empty() || !validate_bytecode(&code) {
            return Err(ContractError::InvalidBytecode);
        }

        if self.contracts.contains_key(&address) {
            return Err(ContractError::AlreadyExists(address));
        }

        let contract = Contract::new(address, code, deployer, sequence);
        self.contracts.insert(address, contract);

        log::info!("Contract deployed at {}", address);
        Ok(address)
    }

    /// Call a contract
    pub fn call(
        &mut self,
        address: &Address,
        params: CallParams<'_>,
    ) -> Result<ExecutionResult, ContractError> {
        let contract = self
            .contracts
            .get_mut(address)
            .ok_or(ContractError::NotFound(*address))?;

        let (selector, args) = if params.data.is_empty() {
            (0, Vec::new())
        } else {
            let (selector, body) = split_call(params.data)?;
            (u32::from_be_bytes(selector), words(body)?)
        };

        let context = ExecutionContext {
            caller: params.caller,
            contract_address: *address,
            sequence: params.sequence,
            selector,
            args,
            balance: params.balance,
            gas_limit: params.gas_limit.unwrap_or(DEFAULT_GAS_LIMIT),
        };

        let result = contract.execute(context)?;
        log::debug!(
            "Contract {} called by {}: gas used {}",
            address,
            params.caller,
            result.gas_used
        );
        Ok(result)
    }

    /// Get a contract by address
    pub fn get(&self, address: &Address) -> Option<&Contract> {
        self.contracts.get(address)
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.contracts.contains_key(address)
    }

    /// Put back `contract` as it was, or remove the address if it was empty
    pub fn restore(&mut self, address: Address, contract: Option<Contract>) {
        match contract {
            Some(contract) => {
                self.contracts.insert(address, contract);
            }
            None => {
                self.contracts.remove(&address);
            }
        }
    }

    /// Get all contract addresses
    pub fn list(&self) -> Vec<Address> {
        let mut addresses: Vec<Address> = self.contracts.keys().copied().collect();
        addresses.sort();
        addresses
    }

    /// Get contract count
    pub fn count(&self) -> usize {
        self.contracts.len()
    }
}
