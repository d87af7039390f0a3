//! Simple contract compiler
//!
//! Compiles assembly-like syntax to bytecode. One instruction per line,
//! `;` or `#` starts a comment line, `:name` defines a label. `PUSH`
//! takes a decimal or hex literal, or `@signature` to push a method
//! selector for comparison against `SELECTOR`.

use crate::contract::opcodes::OpCode;
use crate::core::abi::selector;
use std::collections::HashMap;
use thiserror::Error;

/// Compiler errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompilerError {
    #[error("Unknown instruction: {0}")]
    UnknownInstruction(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Undefined label: {0}")]
    UndefinedLabel(String),
    #[error("Invalid number: {0}")]
    InvalidNumber(String),
}

/// Simple compiler for contract bytecode
pub struct Compiler {
    /// Output bytecode
    code: Vec<u8>,
    /// Label positions
    labels: HashMap<String, u32>,
    /// Pending label references (position, label_name)
    label_refs: Vec<(usize, String)>,
}

impl Compiler {
    /// Create a new compiler
    pub fn new() -> Self {
        Self {
            code: Vec::new(),
            labels: HashMap::new(),
            label_refs: Vec::new(),
        }
    }

    /// Compile source code to bytecode
    pub fn compile(&mut self, source: &str) -> Result<Vec<u8>, CompilerError> {
        self.code.clear();
        self.labels.clear();
        self.label_refs.clear();

        // First pass: emit code and record labels
        for line in source.lines() {
            let line = line.trim();

            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }

            if let Some(label) = line.strip_prefix(':') {
                self.labels
                    .insert(label.trim().to_string(), self.code.len() as u32);
                continue;
            }

            self.compile_instruction(line)?;
        }

        // Second pass: resolve label references
        for (pos, label) in &self.label_refs {
            let addr = self
                .labels
                .get(label)
                .ok_or_else(|| CompilerError::UndefinedLabel(label.clone()))?;
            self.code[*pos..*pos + 4].copy_from_slice(&addr.to_be_bytes());
        }

        Ok(self.code.clone())
    }

    /// Compile a single instruction
    fn compile_instruction(&mut self, line: &str) -> Result<(), CompilerError> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.is_empty() {
            return Ok(());
        }

        let instruction = parts[0].to_uppercase();

        match instruction.as_str() {
            // Stack operations
            "PUSH" => {
                let operand = parts.get(1).ok_or_else(|| {
                    CompilerError::InvalidArgument("PUSH requires a value".to_string())
                })?;
                let value = self.parse_operand(operand)?;
                self.code.push(OpCode::Push as u8);
                self.code.extend_from_slice(&value.to_be_bytes());
            }
            "POP" => self.code.push(OpCode::Pop as u8),
            "DUP" => self.code.push(OpCode::Dup as u8),
            "SWAP" => self.code.push(OpCode::Swap as u8),

            // Arithmetic
            "ADD" => self.code.push(OpCode::Add as u8),
            "SUB" => self.code.push(OpCode::Sub as u8),
            "MUL" => self.code.push(OpCode::Mul as u8),
            "DIV" => self.code.push(OpCode::Div as u8),
            "MOD" => self.code.push(OpCode::Mod as u8),

            // Comparison
            "EQ" => self.code.push(OpCode::Eq as u8),
            "LT" => self.code.push(OpCode::Lt as u8),
            "GT" => self.code.push(OpCode::Gt as u8),
            "ISZERO" => self.code.push(OpCode::IsZero as u8),

            // Logic
            "AND" => self.code.push(OpCode::And as u8),
            "OR" => self.code.push(OpCode::Or as u8),
            "NOT" => self.code.push(OpCode::Not as u8),

            // Control flow
            "JUMP" => self.compile_jump(OpCode::Jump, &parts)?,
            "JUMPI" => self.compile_jump(OpCode::JumpIf, &parts)?,
            "HALT" => self.code.push(OpCode::Halt as u8),
            "RETURN" => self.code.push(OpCode::Return as u8),
            "REVERT" => self.code.push(OpCode::Revert as u8),

            // Storage
            "SSTORE" => self.code.push(OpCode::SStore as u8),
            "SLOAD" => self.code.push(OpCode::SLoad as u8),

            // Ledger context
            "TRANSFER" => self.code.push(OpCode::Transfer as u8),
            "CALLER" => self.code.push(OpCode::Caller as u8),
            "SELF" => self.code.push(OpCode::Self_ as u8),
            "SEQUENCE" => self.code.push(OpCode::Sequence as u8),
            "SELFBALANCE" => self.code.push(OpCode::SelfBalance as u8),
            "SELECTOR" => self.code.push(OpCode::Selector as u8),

            // Arguments
            "ARG" => self.compile_indexed(OpCode::Arg, &parts)?,
            "ARGADDR" => self.compile_indexed(OpCode::ArgAddr, &parts)?,
            "ARGCOUNT" => self.code.push(OpCode::ArgCount as u8),

            "NOP" => self.code.push(OpCode::Nop as u8),

            _ => return Err(CompilerError::UnknownInstruction(instruction)),
        }

        Ok(())
    }

    fn compile_jump(&mut self, opcode: OpCode, parts: &[&str]) -> Result<(), CompilerError> {
        let label = parts.get(1).ok_or_else(|| {
            CompilerError::InvalidArgument(format!("{} requires label", opcode.name()))
        })?;
        self.code.push(opcode as u8);
        self.label_refs.push((self.code.len(), label.to_string()));
        self.code.extend_from_slice(&[0, 0, 0, 0]); // Placeholder
        Ok(())
    }

    fn compile_indexed(&mut self, opcode: OpCode, parts: &[&str]) -> Result<(), CompilerError> {
        let raw = parts.get(1).ok_or_else(|| {
            CompilerError::InvalidArgument(format!("{} requires index", opcode.name()))
        })?;
        let index = raw
            .parse::<u8>()
            .map_err(|_| CompilerError::InvalidNumber(raw.to_string()))?;
        self.code.push(opcode as u8);
        self.code.push(index);
        Ok(())
    }

    /// Parse a PUSH operand: decimal, hex or `@signature`
    fn parse_operand(&self, s: &str) -> Result<u128, CompilerError> {
        let s = s.trim();
        if let Some(signature) = s.strip_prefix('@') {
            return Ok(u128::from(u32::from_be_bytes(selector(signature))));
        }
        if let Some(digits) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            u128::from_str_radix(digits, 16)
                .map_err(|_| CompilerError::InvalidNumber(s.to_string()))
        } else {
            s.parse::<u128>()
                .map_err(|_| CompilerError::InvalidNumber(s.to_string()))
        }
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

/// Disassemble bytecode to readable format
pub fn disassemble(code: &[u8]) -> String {
    let mut output = String::new();
    let mut pc = 0;

    while pc < code.len() {
        let opcode_byte = code[pc];
        let Some(opcode) = OpCode::from_byte(opcode_byte) else {
            output.push_str(&format!("{:04x}: UNKNOWN 0x{:02x}\n", pc, opcode_byte));
            pc += 1;
            continue;
        };

        output.push_str(&format!("{:04x}: {}", pc, opcode.name()));
        pc += 1;

        let operand_len = opcode.arg_bytes();
        if operand_len > 0 && pc + operand_len <= code.len() {
            let operand = &code[pc..pc + operand_len];
            match opcode {
                OpCode::Push => {
                    let mut bytes = [0u8; 16];
                    bytes.copy_from_slice(operand);
                    output.push_str(&format!(" {}", u128::from_be_bytes(bytes)));
                }
                OpCode::Jump | OpCode::JumpIf => {
                    let addr = u32::from_be_bytes([operand[0], operand[1], operand[2], operand[3]]);
                    output.push_str(&format!(" 0x{:04x}", addr));
                }
                _ => output.push_str(&format!(" {}", operand[0])),
            }
            pc += operand_len;
        }

        output.push('\n');
    }

    output
}
