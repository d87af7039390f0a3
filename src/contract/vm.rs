//! Smart contract virtual machine
//!
//! A stack-based VM with 128-bit words, gas metering and a bounded stack.
//!
//! Addresses never sit on the stack directly. `CALLER`, `SELF` and
//! `ARGADDR` push small handles into a per-call address table, and
//! `TRANSFER` resolves the handle back to the recipient.

use crate::contract::opcodes::OpCode;
use crate::core::abi::{word_to_address, word_to_uint, WORD};
use crate::core::{Address, Amount};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Maximum stack size
const MAX_STACK_SIZE: usize = 1024;

/// Default gas limit
pub const DEFAULT_GAS_LIMIT: u64 = 100_000;

/// Handle of the caller in the address table
const CALLER_HANDLE: u128 = 0;

/// Handle of the executing contract in the address table
const SELF_HANDLE: u128 = 1;

/// VM execution errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VmError {
    #[error("Stack overflow")]
    StackOverflow,
    #[error("Stack underflow")]
    StackUnderflow,
    #[error("Invalid opcode: {0}")]
    InvalidOpcode(u8),
    #[error("Out of gas")]
    OutOfGas,
    #[error("Invalid jump destination: {0}")]
    InvalidJump(u32),
    #[error("Division by zero")]
    DivisionByZero,
    #[error("Invalid argument index: {0}")]
    InvalidArgument(u8),
    #[error("Execution reverted")]
    Reverted,
    #[error("Invalid address handle: {0}")]
    InvalidAddress(u128),
}

/// Execution context for the VM
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// Caller address
    pub caller: Address,
    /// Contract address
    pub contract_address: Address,
    /// Ledger sequence number
    pub sequence: u64,
    /// Selector of the call (0 for a call without data)
    pub selector: u32,
    /// Raw argument words
    pub args: Vec<[u8; WORD]>,
    /// Contract balance when the call started
    pub balance: Amount,
    /// Available gas
    pub gas_limit: u64,
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self {
            caller: Address::ZERO,
            contract_address: Address::ZERO,
            sequence: 0,
            selector: 0,
            args: Vec::new(),
            balance: 0,
            gas_limit: DEFAULT_GAS_LIMIT,
        }
    }
}

/// Result of VM execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Whether execution succeeded
    pub success: bool,
    /// Return value (if any)
    pub return_value: Option<u128>,
    /// Gas used
    pub gas_used: u64,
    /// Storage changes: key -> value
    pub storage_changes: HashMap<String, u128>,
    /// Payments requested by the contract: (to, amount)
    pub transfers: Vec<(Address, Amount)>,
}

/// The smart contract virtual machine
pub struct VM {
    /// Stack for computation
    stack: Vec<u128>,
    /// Program counter
    pc: usize,
    /// Gas remaining
    gas: u64,
    /// Contract storage
    storage: HashMap<String, u128>,
    /// Pending storage changes
    storage_changes: HashMap<String, u128>,
    /// Pending transfers
    transfers: Vec<(Address, Amount)>,
    /// Addresses reachable through stack handles
    addresses: Vec<Address>,
    /// Bytecode being executed
    code: Vec<u8>,
    /// Execution context
    context: ExecutionContext,
    /// Whether execution has halted
    halted: bool,
    /// Return value
    return_value: Option<u128>,
}

impl VM {
    /// Create a new VM instance
    pub fn new(code: Vec<u8>, storage: HashMap<String, u128>, context: ExecutionContext) -> Self {
        Self {
            stack: Vec::with_capacity(256),
            pc: 0,
            gas: context.gas_limit,
            storage,
            storage_changes: HashMap::new(),
            transfers: Vec::new(),
            addresses: vec![context.caller, context.contract_address],
            code,
            context,
            halted: false,
            return_value: None,
        }
    }

    /// Execute the bytecode
    pub fn execute(&mut self) -> Result<ExecutionResult, VmError> {
        while !self.halted && self.pc < self.code.len() {
            self.step()?;
        }

        Ok(ExecutionResult {
            success: true,
            return_value: self.return_value,
            gas_used: self.context.gas_limit - self.gas,
            storage_changes: self.storage_changes.clone(),
            transfers: self.transfers.clone(),
        })
    }

    /// Execute a single instruction
    fn step(&mut self) -> Result<(), VmError> {
        let opcode_byte = self.code[self.pc];
        let opcode = OpCode::from_byte(opcode_byte).ok_or(VmError::InvalidOpcode(opcode_byte))?;

        let gas_cost = self.gas_cost(&opcode);
        if self.gas < gas_cost {
            return Err(VmError::OutOfGas);
        }
        self.gas -= gas_cost;

        self.pc += 1;

        match opcode {
            OpCode::Push => {
                let value = self.read_u128()?;
                self.push(value)?;
            }
            OpCode::Pop => {
                self.pop()?;
            }
            OpCode::Dup => {
                let value = *self.stack.last().ok_or(VmError::StackUnderflow)?;
                self.push(value)?;
            }
            OpCode::Swap => {
                let len = self.stack.len();
                if len < 2 {
                    return Err(VmError::StackUnderflow);
                }
                self.stack.swap(len - 1, len - 2);
            }
            OpCode::Add => self.binary(|a, b| Ok(a.wrapping_add(b)))?,
            OpCode::Sub => self.binary(|a, b| Ok(a.wrapping_sub(b)))?,
            OpCode::Mul => self.binary(|a, b| Ok(a.wrapping_mul(b)))?,
            OpCode::Div => self.binary(|a, b| a.checked_div(b).ok_or(VmError::DivisionByZero))?,
            OpCode::Mod => self.binary(|a, b| a.checked_rem(b).ok_or(VmError::DivisionByZero))?,
            OpCode::Eq => self.binary(|a, b| Ok(u128::from(a == b)))?,
            OpCode::Lt => self.binary(|a, b| Ok(u128::from(a < b)))?,
            OpCode::Gt => self.binary(|a, b| Ok(u128::from(a > b)))?,
            OpCode::IsZero => {
                let a = self.pop()?;
                self.push(u128::from(a == 0))?;
            }
            OpCode::And => self.binary(|a, b| Ok(a & b))?,
            OpCode::Or => self.binary(|a, b| Ok(a | b))?,
            OpCode::Not => {
                let a = self.pop()?;
                self.push(!a)?;
            }
            OpCode::Jump => {
                let offset = self.read_u32()?;
                self.jump(offset)?;
            }
            OpCode::JumpIf => {
                let offset = self.read_u32()?;
                let condition = self.pop()?;
                if condition != 0 {
                    self.jump(offset)?;
                }
            }
            OpCode::Halt => {
                self.halted = true;
            }
            OpCode::Return => {
                self.return_value = Some(self.pop()?);
                self.halted = true;
            }
            OpCode::Revert => {
                return Err(VmError::Reverted);
            }
            OpCode::SStore => {
                let value = self.pop()?;
                let key = self.pop()?;
                let key_str = format!("{:032x}", key);
                self.storage.insert(key_str.clone(), value);
                self.storage_changes.insert(key_str, value);
            }
            OpCode::SLoad => {
                let key = self.pop()?;
                let key_str = format!("{:032x}", key);
                let value = self.storage.get(&key_str).copied().unwrap_or(0);
                self.push(value)?;
            }
            OpCode::Transfer => {
                let amount = self.pop()?;
                let handle = self.pop()?;
                let to = self.resolve(handle)?;
                self.transfers.push((to, amount));
                self.push(1)?;
            }
            OpCode::Caller => self.push(CALLER_HANDLE)?,
            OpCode::Self_ => self.push(SELF_HANDLE)?,
            OpCode::Sequence => self.push(u128::from(self.context.sequence))?,
            OpCode::SelfBalance => self.push(self.context.balance)?,
            OpCode::Selector => self.push(u128::from(self.context.selector))?,
            OpCode::Arg => {
                let index = self.read_u8()?;
                let value = self
                    .arg_word(index)
                    .and_then(|w| word_to_uint(&w).ok())
                    .ok_or(VmError::InvalidArgument(index))?;
                self.push(value)?;
            }
            OpCode::ArgCount => {
                self.push(self.context.args.len() as u128)?;
            }
            OpCode::ArgAddr => {
                let index = self.read_u8()?;
                let address = self
                    .arg_word(index)
                    .and_then(|w| word_to_address(&w).ok())
                    .ok_or(VmError::InvalidArgument(index))?;
                self.addresses.push(address);
                self.push((self.addresses.len() - 1) as u128)?;
            }
            OpCode::Nop => {}
        }

        Ok(())
    }

    fn binary(
        &mut self,
        op: impl FnOnce(u128, u128) -> Result<u128, VmError>,
    ) -> Result<(), VmError> {
        let b = self.pop()?;
        let a = self.pop()?;
        let value = op(a, b)?;
        self.push(value)
    }

    fn jump(&mut self, offset: u32) -> Result<(), VmError> {
        if offset as usize >= self.code.len() {
            return Err(VmError::InvalidJump(offset));
        }
        self.pc = offset as usize;
        Ok(())
    }

    fn arg_word(&self, index: u8) -> Option<[u8; WORD]> {
        self.context.args.get(index as usize).copied()
    }

    fn resolve(&self, handle: u128) -> Result<Address, VmError> {
        usize::try_from(handle)
            .ok()
            .and_then(|i| self.addresses.get(i))
            .copied()
            .ok_or(VmError::InvalidAddress(handle))
    }

    /// Push value onto stack
    fn push(&mut self, value: u128) -> Result<(), VmError> {
        if self.stack.len() >= MAX_STACK_SIZE {
            return Err(VmError::StackOverflow);
        }
        self.stack.push(value);
        Ok(())
    }

    /// Pop value from stack
    fn pop(&mut self) -> Result<u128, VmError> {
        self.stack.pop().ok_or(VmError::StackUnderflow)
    }

    /// Read u8 from bytecode
    fn read_u8(&mut self) -> Result<u8, VmError> {
        let value = *self.code.get(self.pc).ok_or(VmError::InvalidOpcode(0))?;
        self.pc += 1;
        Ok(value)
    }

    /// Read u32 from bytecode
    fn read_u32(&mut self) -> Result<u32, VmError> {
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(self.read_bytes(4)?);
        Ok(u32::from_be_bytes(bytes))
    }

    /// Read u128 from bytecode
    fn read_u128(&mut self) -> Result<u128, VmError> {
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(self.read_bytes(16)?);
        Ok(u128::from_be_bytes(bytes))
    }

    fn read_bytes(&mut self, len: usize) -> Result<&[u8], VmError> {
        if self.pc + len > self.code.len() {
            return Err(VmError::InvalidOpcode(0));
        }
        let start = self.pc;
        self.pc += len;
        Ok(&self.code[start..start + len])
    }

    /// Get gas cost for opcode
    fn gas_cost(&self, opcode: &OpCode) -> u64 {
        match opcode {
            OpCode::Push | OpCode::Pop | OpCode::Dup | OpCode::Swap => 2,
            OpCode::Add | OpCode::Sub | OpCode::Mul => 3,
            OpCode::Div | OpCode::Mod => 5,
            OpCode::Eq | OpCode::Lt | OpCode::Gt => 3,
            OpCode::And | OpCode::Or | OpCode::Not | OpCode::IsZero => 3,
            OpCode::Jump | OpCode::JumpIf => 8,
            OpCode::SStore => 20,
            OpCode::SLoad => 5,
            OpCode::SelfBalance => 10,
            OpCode::Transfer => 50,
            OpCode::Caller | OpCode::Self_ | OpCode::Sequence | OpCode::Selector => 2,
            OpCode::Arg | OpCode::ArgCount | OpCode::ArgAddr => 2,
            OpCode::Halt | OpCode::Return | OpCode::Revert => 0,
            OpCode::Nop => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::abi::{address_word, uint_word};
    use crate::core::address::ADDRESS_LEN;

    fn make_push(value: u128) -> Vec<u8> {
        let mut bytes = vec![OpCode::Push as u8];
        bytes.extend_from_slice(&value.to_be_bytes());
        bytes
    }

    fn run(code: Vec<u8>, context: ExecutionContext) -> Result<ExecutionResult, VmError> {
        VM::new(code, HashMap::new(), context).execute()
    }

    #[test]
    fn test_simple_addition() {
        let mut code = make_push(10);
        code.extend(make_push(20));
        code.push(OpCode::Add as u8);
        code.push(OpCode::Return as u8);

        let result = run(code, ExecutionContext::default()).unwrap();
        assert!(result.success);
        assert_eq!(result.return_value, Some(30));
    }

    #[test]
    fn test_large_values() {
        let big = 5 * 10u128.pow(30);
        let mut code = make_push(big);
        code.extend(make_push(2));
        code.push(OpCode::Mul as u8);
        code.push(OpCode::Return as u8);

        let result = run(code, ExecutionContext::default()).unwrap();
        assert_eq!(result.return_value, Some(big * 2));
    }

    #[test]
    fn test_comparison() {
        let mut code = make_push(10);
        code.extend(make_push(20));
        code.push(OpCode::Lt as u8);
        code.push(OpCode::Return as u8);

        let result = run(code, ExecutionContext::default()).unwrap();
        assert_eq!(result.return_value, Some(1)); // 10 < 20
    }

    #[test]
    fn test_storage() {
        let mut code = make_push(1); // key
        code.extend(make_push(42)); // value
        code.push(OpCode::SStore as u8);
        code.extend(make_push(1));
        code.push(OpCode::SLoad as u8);
        code.push(OpCode::Return as u8);

        let result = run(code, ExecutionContext::default()).unwrap();
        assert_eq!(result.return_value, Some(42));
        assert_eq!(result.storage_changes.len(), 1);
    }

    #[test]
    fn test_division_by_zero() {
        let mut code = make_push(1);
        code.extend(make_push(0));
        code.push(OpCode::Div as u8);

        assert_eq!(
            run(code, ExecutionContext::default()).unwrap_err(),
            VmError::DivisionByZero
        );
    }

    #[test]
    fn test_transfer_to_argument_address() {
        let recipient = Address::from_bytes([7; ADDRESS_LEN]);
        let context = ExecutionContext {
            args: vec![address_word(&recipient), uint_word(500)],
            balance: 1_000,
            ..Default::default()
        };

        let code = vec![
            OpCode::ArgAddr as u8,
            0,
            OpCode::Arg as u8,
            1,
            OpCode::Transfer as u8,
            OpCode::Halt as u8,
        ];

        let result = run(code, context).unwrap();
        assert_eq!(result.transfers, vec![(recipient, 500)]);
    }

    #[test]
    fn test_transfer_to_caller() {
        let caller = Address::from_bytes([3; ADDRESS_LEN]);
        let context = ExecutionContext {
            caller,
            ..Default::default()
        };

        let mut code = vec![OpCode::Caller as u8];
        code.extend(make_push(9));
        code.push(OpCode::Transfer as u8);
        code.push(OpCode::Return as u8);

        let result = run(code, context).unwrap();
        assert_eq!(result.transfers, vec![(caller, 9)]);
        assert_eq!(result.return_value, Some(1));
    }

    #[test]
    fn test_invalid_handle() {
        let mut code = make_push(99);
        code.extend(make_push(1));
        code.push(OpCode::Transfer as u8);

        assert_eq!(
            run(code, ExecutionContext::default()).unwrap_err(),
            VmError::InvalidAddress(99)
        );
    }

    #[test]
    fn test_missing_argument() {
        let code = vec![OpCode::Arg as u8, 2];
        assert_eq!(
            run(code, ExecutionContext::default()).unwrap_err(),
            VmError::InvalidArgument(2)
        );
    }

    #[test]
    fn test_selector_and_balance() {
        let context = ExecutionContext {
            selector: 0xdeadbeef,
            balance: 77,
            ..Default::default()
        };
        let code = vec![
            OpCode::Selector as u8,
            OpCode::SelfBalance as u8,
            OpCode::Add as u8,
            OpCode::Return as u8,
        ];

        let result = run(code, context).unwrap();
        assert_eq!(result.return_value, Some(0xdeadbeef + 77));
    }

    #[test]
    fn test_revert() {
        let code = vec![OpCode::Revert as u8];
        assert_eq!(
            run(code, ExecutionContext::default()).unwrap_err(),
            VmError::Reverted
        );
    }

    #[test]
    fn test_out_of_gas() {
        let mut code = Vec::new();
        for _ in 0..10000 {
            code.extend(make_push(1));
        }

        let context = ExecutionContext {
            gas_limit: 100,
            ..Default::default()
        };

        assert_eq!(run(code, context).unwrap_err(), VmError::OutOfGas);
    }
}
