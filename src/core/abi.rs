//! Call encoding
//!
//! A call is a 4-byte method selector followed by its arguments, each
//! laid out in 32-byte words:
//!
//! - `uint256`: big-endian, limited to 128 bits on decode
//! - `address`: 12 zero bytes followed by the 20 address bytes
//! - `bool`: 0 or 1
//! - `bytes` / `string`: a length word, then the data zero-padded to a word boundary
//! - `address[]`: a length word, then one address word per element
//!
//! The wallet engine never looks inside a [`Payload`]; only the ledger's
//! dispatcher and VM contracts decode one.

use crate::core::address::{Address, ADDRESS_LEN};
use crate::crypto::selector as hash_selector;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

/// Size of one encoded word
pub const WORD: usize = 32;

/// Method selector: the first four bytes of SHA-256 of the signature
pub type Selector = [u8; 4];

/// Encoding and decoding errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AbiError {
    #[error("Call data too short: {0} bytes")]
    TooShort(usize),
    #[error("Unexpected end of call data at offset {0}")]
    UnexpectedEnd(usize),
    #[error("Value does not fit in 128 bits")]
    Overflow,
    #[error("Invalid address word")]
    InvalidAddress,
    #[error("Invalid bool word")]
    InvalidBool,
    #[error("Invalid UTF-8 string")]
    InvalidString,
    #[error("Non-zero padding after dynamic data at offset {0}")]
    InvalidPadding(usize),
    #[error("Trailing bytes after arguments: {0}")]
    TrailingBytes(usize),
    #[error("Unknown method selector: 0x{0}")]
    UnknownSelector(String),
    #[error("Argument type mismatch: expected {0}")]
    TypeMismatch(&'static str),
    #[error("Unsupported parameter type: {0}")]
    UnsupportedType(String),
    #[error("Invalid method signature: {0}")]
    InvalidSignature(String),
    #[error("Invalid argument {0}: {1}")]
    InvalidArgument(String, String),
    #[error("Expected {expected} arguments, got {found}")]
    ArgumentCount { expected: usize, found: usize },
    #[error("Invalid hex payload: {0}")]
    InvalidHex(String),
}

/// Supported parameter types
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamType {
    Uint,
    Address,
    Bool,
    Bytes,
    String,
    AddressArray,
    UintArray,
    BoolArray,
}

impl ParamType {
    /// Parse a type name as it appears in a method signature
    pub fn parse(name: &str) -> Result<Self, AbiError> {
        match name.trim() {
            "uint" | "uint256" => Ok(ParamType::Uint),
            "address" => Ok(ParamType::Address),
            "bool" => Ok(ParamType::Bool),
            "bytes" => Ok(ParamType::Bytes),
            "string" => Ok(ParamType::String),
            "address[]" => Ok(ParamType::AddressArray),
            "uint[]" | "uint256[]" => Ok(ParamType::UintArray),
            "bool[]" => Ok(ParamType::BoolArray),
            other => Err(AbiError::UnsupportedType(other.to_string())),
        }
    }

    /// Canonical name used in signatures
    pub fn name(&self) -> &'static str {
        match self {
            ParamType::Uint => "uint256",
            ParamType::Address => "address",
            ParamType::Bool => "bool",
            ParamType::Bytes => "bytes",
            ParamType::String => "string",
            ParamType::AddressArray => "address[]",
            ParamType::UintArray => "uint256[]",
            ParamType::BoolArray => "bool[]",
        }
    }
}

/// A single encoded argument or return value
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Token {
    Uint(u128),
    Address(Address),
    Bool(bool),
    Bytes(Vec<u8>),
    String(String),
    AddressArray(Vec<Address>),
    UintArray(Vec<u128>),
    BoolArray(Vec<bool>),
}

impl Token {
    /// Parse a textual argument (as typed on the command line) into a token
    pub fn parse(param: ParamType, text: &str) -> Result<Self, AbiError> {
        let invalid = |reason: &str| AbiError::InvalidArgument(text.to_string(), reason.to_string());
        let items = || text.split(',').filter(|s| !s.trim().is_empty());
        match param {
            ParamType::Uint => text
                .trim()
                .parse::<u128>()
                .map(Token::Uint)
                .map_err(|_| invalid("expected an unsigned integer")),
            ParamType::Address => text
                .parse::<Address>()
                .map(Token::Address)
                .map_err(|e| invalid(&e.to_string())),
            ParamType::Bool => match text.trim() {
                "true" | "1" => Ok(Token::Bool(true)),
                "false" | "0" => Ok(Token::Bool(false)),
                _ => Err(invalid("expected true or false")),
            },
            ParamType::Bytes => Payload::from_hex(text).map(|p| Token::Bytes(p.into_vec())),
            ParamType::String => Ok(Token::String(text.to_string())),
            ParamType::AddressArray => items()
                .map(|s| s.parse::<Address>().map_err(|e| invalid(&e.to_string())))
                .collect::<Result<Vec<_>, _>>()
                .map(Token::AddressArray),
            ParamType::UintArray => items()
                .map(|s| match Token::parse(ParamType::Uint, s) {
                    Ok(Token::Uint(v)) => Ok(v),
                    _ => Err(invalid("expected unsigned integers")),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Token::UintArray),
            ParamType::BoolArray => items()
                .map(|s| match Token::parse(ParamType::Bool, s) {
                    Ok(Token::Bool(b)) => Ok(b),
                    _ => Err(invalid("expected true or false values")),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Token::BoolArray),
        }
    }

    pub fn into_uint(self) -> Result<u128, AbiError> {
        match self {
            Token::Uint(v) => Ok(v),
            _ => Err(AbiError::TypeMismatch("uint256")),
        }
    }

    pub fn into_address(self) -> Result<Address, AbiError> {
        match self {
            Token::Address(a) => Ok(a),
            _ => Err(AbiError::TypeMismatch("address")),
        }
    }

    pub fn into_bytes(self) -> Result<Vec<u8>, AbiError> {
        match self {
            Token::Bytes(b) => Ok(b),
            _ => Err(AbiError::TypeMismatch("bytes")),
        }
    }

    pub fn into_string(self) -> Result<String, AbiError> {
        match self {
            Token::String(s) => Ok(s),
            _ => Err(AbiError::TypeMismatch("string")),
        }
    }

    pub fn into_address_array(self) -> Result<Vec<Address>, AbiError> {
        match self {
            Token::AddressArray(list) => Ok(list),
            _ => Err(AbiError::TypeMismatch("address[]")),
        }
    }

    pub fn into_uint_array(self) -> Result<Vec<u128>, AbiError> {
        match self {
            Token::UintArray(list) => Ok(list),
            _ => Err(AbiError::TypeMismatch("uint256[]")),
        }
    }

    pub fn into_bool_array(self) -> Result<Vec<bool>, AbiError> {
        match self {
            Token::BoolArray(list) => Ok(list),
            _ => Err(AbiError::TypeMismatch("bool[]")),
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Uint(v) => write!(f, "{}", v),
            Token::Address(a) => write!(f, "{}", a),
            Token::Bool(b) => write!(f, "{}", b),
            Token::Bytes(b) => write!(f, "0x{}", hex::encode(b)),
            Token::String(s) => write!(f, "{:?}", s),
            Token::AddressArray(list) => {
                let items: Vec<String> = list.iter().map(|a| a.to_string()).collect();
                write!(f, "[{}]", items.join(", "))
            }
            Token::UintArray(list) => {
                let items: Vec<String> = list.iter().map(|v| v.to_string()).collect();
                write!(f, "[{}]", items.join(", "))
            }
            Token::BoolArray(list) => {
                let items: Vec<String> = list.iter().map(|b| b.to_string()).collect();
                write!(f, "[{}]", items.join(", "))
            }
        }
    }
}

/// Opaque call data carried by a transaction proposal
#[derive(Clone, PartialEq, Eq, Default)]
pub struct Payload(Vec<u8>);

impl Payload {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Parse `0x`-prefixed (or bare) hex. An empty string is an empty payload.
    pub fn from_hex(text: &str) -> Result<Self, AbiError> {
        let text = text.trim();
        let digits = text
            .strip_prefix("0x")
            .or_else(|| text.strip_prefix("0X"))
            .unwrap_or(text);
        hex::decode(digits)
            .map(Self)
            .map_err(|_| AbiError::InvalidHex(text.to_string()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Selector of the call, if the payload is long enough to carry one
    pub fn selector(&self) -> Option<Selector> {
        split_call(&self.0).ok().map(|(selector, _)| selector)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(&self.0))
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Payload({})", self)
    }
}

impl Serialize for Payload {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Payload {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Payload::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Selector for a method signature
pub fn selector(signature: &str) -> Selector {
    hash_selector(signature)
}

/// Parse the parameter list out of a signature like `withdraw(address,uint256)`
pub fn param_types(signature: &str) -> Result<Vec<ParamType>, AbiError> {
    let open = signature
        .find('(')
        .ok_or_else(|| AbiError::InvalidSignature(signature.to_string()))?;
    let inner = signature[open + 1..]
        .strip_suffix(')')
        .ok_or_else(|| AbiError::InvalidSignature(signature.to_string()))?;

    if open == 0 {
        return Err(AbiError::InvalidSignature(signature.to_string()));
    }
    if inner.trim().is_empty() {
        return Ok(Vec::new());
    }
    inner.split(',').map(ParamType::parse).collect()
}

/// Encode a selector followed by its arguments
pub fn encode_call(signature: &str, tokens: &[Token]) -> Payload {
    let mut data = selector(signature).to_vec();
    data.extend(encode(tokens));
    Payload(data)
}

/// Encode a call from textual arguments, one per parameter of `signature`
pub fn encode_call_args<S: AsRef<str>>(signature: &str, args: &[S]) -> Result<Payload, AbiError> {
    let types = param_types(signature)?;
    if types.len() != args.len() {
        return Err(AbiError::ArgumentCount {
            expected: types.len(),
            found: args.len(),
        });
    }

    let tokens = types
        .into_iter()
        .zip(args)
        .map(|(param, text)| Token::parse(param, text.as_ref()))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(encode_call(signature, &tokens))
}

/// Split call data into its selector and argument body
pub fn split_call(data: &[u8]) -> Result<(Selector, &[u8]), AbiError> {
    if data.len() < 4 {
        return Err(AbiError::TooShort(data.len()));
    }
    let selector = [data[0], data[1], data[2], data[3]];
    Ok((selector, &data[4..]))
}

/// Encode tokens as a sequence of words
pub fn encode(tokens: &[Token]) -> Vec<u8> {
    let mut out = Vec::with_capacity(tokens.len() * WORD);
    for token in tokens {
        match token {
            Token::Uint(v) => out.extend_from_slice(&uint_word(*v)),
            Token::Address(a) => out.extend_from_slice(&address_word(a)),
            Token::Bool(b) => out.extend_from_slice(&uint_word(u128::from(*b))),
            Token::Bytes(b) => push_dynamic(&mut out, b),
            Token::String(s) => push_dynamic(&mut out, s.as_bytes()),
            Token::AddressArray(list) => {
                out.extend_from_slice(&uint_word(list.len() as u128));
                for a in list {
                    out.extend_from_slice(&address_word(a));
                }
            }
            Token::UintArray(list) => {
                out.extend_from_slice(&uint_word(list.len() as u128));
                for v in list {
                    out.extend_from_slice(&uint_word(*v));
                }
            }
            Token::BoolArray(list) => {
                out.extend_from_slice(&uint_word(list.len() as u128));
                for b in list {
                    out.extend_from_slice(&uint_word(u128::from(*b)));
                }
            }
        }
    }
    out
}

/// Decode words into tokens of the given types. The data must be consumed exactly.
pub fn decode(types: &[ParamType], data: &[u8]) -> Result<Vec<Token>, AbiError> {
    let mut reader = WordReader { data, offset: 0 };
    let mut tokens = Vec::with_capacity(types.len());

    for param in types {
        let token = match param {
            ParamType::Uint => Token::Uint(reader.uint()?),
            ParamType::Address => Token::Address(reader.address()?),
            ParamType::Bool => Token::Bool(reader.bool()?),
            ParamType::Bytes => Token::Bytes(reader.dynamic()?),
            ParamType::String => {
                let raw = reader.dynamic()?;
                Token::String(String::from_utf8(raw).map_err(|_| AbiError::InvalidString)?)
            }
            ParamType::AddressArray => {
                let len = reader.length()?;
                let mut list = Vec::with_capacity(len.min(1024));
                for _ in 0..len {
                    list.push(reader.address()?);
                }
                Token::AddressArray(list)
            }
            ParamType::UintArray => {
                let len = reader.length()?;
                let mut list = Vec::with_capacity(len.min(1024));
                for _ in 0..len {
                    list.push(reader.uint()?);
                }
                Token::UintArray(list)
            }
            ParamType::BoolArray => {
                let len = reader.length()?;
                let mut list = Vec::with_capacity(len.min(1024));
                for _ in 0..len {
                    list.push(reader.bool()?);
                }
                Token::BoolArray(list)
            }
        };
        tokens.push(token);
    }

    if reader.offset != data.len() {
        return Err(AbiError::TrailingBytes(data.len() - reader.offset));
    }
    Ok(tokens)
}

/// Split an argument body into raw words. The body must be word-aligned.
pub fn words(data: &[u8]) -> Result<Vec<[u8; WORD]>, AbiError> {
    if data.len() % WORD != 0 {
        return Err(AbiError::TrailingBytes(data.len() % WORD));
    }
    Ok(data
        .chunks_exact(WORD)
        .map(|chunk| {
            let mut word = [0u8; WORD];
            word.copy_from_slice(chunk);
            word
        })
        .collect())
}

/// Interpret a word as an unsigned integer
pub fn word_to_uint(word: &[u8; WORD]) -> Result<u128, AbiError> {
    if word[..16].iter().any(|b| *b != 0) {
        return Err(AbiError::Overflow);
    }
    let mut low = [0u8; 16];
    low.copy_from_slice(&word[16..]);
    Ok(u128::from_be_bytes(low))
}

/// Interpret a word as an address
pub fn word_to_address(word: &[u8; WORD]) -> Result<Address, AbiError> {
    if word[..WORD - ADDRESS_LEN].iter().any(|b| *b != 0) {
        return Err(AbiError::InvalidAddress);
    }
    let mut bytes = [0u8; ADDRESS_LEN];
    bytes.copy_from_slice(&word[WORD - ADDRESS_LEN..]);
    Ok(Address::from_bytes(bytes))
}

pub fn uint_word(value: u128) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    word[16..].copy_from_slice(&value.to_be_bytes());
    word
}

pub fn address_word(address: &Address) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    word[WORD - ADDRESS_LEN..].copy_from_slice(address.as_bytes());
    word
}

fn push_dynamic(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&uint_word(bytes.len() as u128));
    out.extend_from_slice(bytes);
    let padding = (WORD - bytes.len() % WORD) % WORD;
    out.extend(std::iter::repeat(0u8).take(padding));
}

struct WordReader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl WordReader<'_> {
    fn take(&mut self, len: usize) -> Result<&[u8], AbiError> {
        let end = self
            .offset
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or(AbiError::UnexpectedEnd(self.offset))?;
        let slice = &self.data[self.offset..end];
        self.offset = end;
        Ok(slice)
    }

    fn word(&mut self) -> Result<[u8; WORD], AbiError> {
        let mut word = [0u8; WORD];
        word.copy_from_slice(self.take(WORD)?);
        Ok(word)
    }

    fn uint(&mut self) -> Result<u128, AbiError> {
        word_to_uint(&self.word()?)
    }

    fn address(&mut self) -> Result<Address, AbiError> {
        word_to_address(&self.word()?)
    }

    fn bool(&mut self) -> Result<bool, AbiError> {
        match self.uint()? {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(AbiError::InvalidBool),
        }
    }

    fn length(&mut self) -> Result<usize, AbiError> {
        let len = self.uint()?;
        usize::try_from(len).map_err(|_| AbiError::Overflow)
    }

    fn dynamic(&mut self) -> Result<Vec<u8>, AbiError> {
        let len = self.length()?;
        let padded = len
            .checked_add((WORD - len % WORD) % WORD)
            .ok_or(AbiError::Overflow)?;
        let start = self.offset;
        let bytes = self.take(padded)?;
        let (data, padding) = bytes.split_at(len);
        if padding.iter().any(|b| *b != 0) {
            return Err(AbiError::InvalidPadding(start + len));
        }
        Ok(data.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(byte: u8) -> Address {
        Address::from_bytes([byte; ADDRESS_LEN])
    }

    #[test]
    fn test_static_layout() {
        let data = encode(&[Token::Uint(5), Token::Address(addr(0xaa))]);
        assert_eq!(data.len(), 2 * WORD);
        assert_eq!(data[31], 5);
        assert!(data[WORD..WORD + 12].iter().all(|b| *b == 0));
        assert_eq!(data[WORD + 12], 0xaa);
    }

    #[test]
    fn test_encode_call_from_text() {
        let to = addr(0x2a).to_string();
        let data = encode_call_args("withdraw(address,uint256)", &[to.as_str(), "500"]).unwrap();
        assert_eq!(
            data,
            encode_call(
                "withdraw(address,uint256)",
                &[Token::Address(addr(0x2a)), Token::Uint(500)]
            )
        );

        assert_eq!(
            encode_call_args("quorum()", &["1"]).unwrap_err(),
            AbiError::ArgumentCount {
                expected: 0,
                found: 1
            }
        );
        assert!(matches!(
            encode_call_args("approveTransfer(uint256)", &["ten"]),
            Err(AbiError::InvalidArgument(_, _))
        ));
    }

    #[test]
    fn test_dynamic_padding() {
        let data = encode(&[Token::String("hello".to_string())]);
        // length word + one padded data word
        assert_eq!(data.len(), 2 * WORD);
        assert_eq!(data[31], 5);
        assert_eq!(&data[WORD..WORD + 5], b"hello");

        let decoded = decode(&[ParamType::String], &data).unwrap();
        assert_eq!(decoded, vec![Token::String("hello".to_string())]);
    }

    #[test]
    fn test_create_wallet_arguments() {
        let tokens = vec![
            Token::AddressArray(vec![addr(1), addr(2), addr(3)]),
            Token::Uint(2),
            Token::String("Treasury".to_string()),
        ];
        let data = encode(&tokens);
        let types = [ParamType::AddressArray, ParamType::Uint, ParamType::String];
        assert_eq!(decode(&types, &data).unwrap(), tokens);
    }

    #[test]
    fn test_decode_rejects_malformed_input() {
        let data = encode(&[Token::Uint(1)]);
        assert_eq!(
            decode(&[ParamType::Uint, ParamType::Uint], &data),
            Err(AbiError::UnexpectedEnd(WORD))
        );
        assert_eq!(decode(&[], &data), Err(AbiError::TrailingBytes(WORD)));

        let mut big = [0u8; WORD];
        big[0] = 1;
        assert_eq!(decode(&[ParamType::Uint], &big), Err(AbiError::Overflow));
        assert_eq!(decode(&[ParamType::Address], &big), Err(AbiError::InvalidAddress));
        assert_eq!(
            decode(&[ParamType::Bool], &uint_word(2)),
            Err(AbiError::InvalidBool)
        );
    }

    #[test]
    fn test_decode_rejects_dirty_padding() {
        let mut data = encode(&[Token::Bytes(vec![0xaa])]);
        assert_eq!(data.len(), 2 * WORD);
        *data.last_mut().unwrap() = 0xff;
        assert_eq!(
            decode(&[ParamType::Bytes], &data),
            Err(AbiError::InvalidPadding(WORD + 1))
        );

        let mut text = encode(&[Token::String("ok".to_string())]);
        text[WORD + 2] = 1;
        assert_eq!(
            decode(&[ParamType::String], &text),
            Err(AbiError::InvalidPadding(WORD + 2))
        );

        // A length that is a multiple of the word size has no padding
        let full = encode(&[Token::Bytes(vec![0xff; WORD])]);
        assert_eq!(
            decode(&[ParamType::Bytes], &full).unwrap(),
            vec![Token::Bytes(vec![0xff; WORD])]
        );
    }

    #[test]
    fn test_encode_call_prefixes_selector() {
        let payload = encode_call("approveTransfer(uint256)", &[Token::Uint(7)]);
        assert_eq!(payload.len(), 4 + WORD);
        assert_eq!(payload.selector(), Some(selector("approveTransfer(uint256)")));

        let (sel, body) = split_call(payload.as_bytes()).unwrap();
        assert_eq!(sel, selector("approveTransfer(uint256)"));
        assert_eq!(words(body).unwrap().len(), 1);
        assert!(matches!(split_call(&[1, 2]), Err(AbiError::TooShort(2))));
    }

    #[test]
    fn test_param_types() {
        assert_eq!(
            param_types("withdraw(address,uint256)").unwrap(),
            vec![ParamType::Address, ParamType::Uint]
        );
        assert!(param_types("name()").unwrap().is_empty());
        assert!(param_types("broken").is_err());
        assert!(matches!(
            param_types("f(int8)"),
            Err(AbiError::UnsupportedType(_))
        ));
    }

    #[test]
    fn test_payload_hex() {
        let payload = Payload::from_hex("0x0a0b").unwrap();
        assert_eq!(payload.as_bytes(), &[0x0a, 0x0b]);
        assert_eq!(payload.to_string(), "0x0a0b");
        assert!(Payload::from_hex("").unwrap().is_empty());
        assert!(Payload::from_hex("0xzz").is_err());

        let json = serde_json::to_string(&payload).unwrap();
        assert_eq!(json, "\"0x0a0b\"");
        assert_eq!(serde_json::from_str::<Payload>(&json).unwrap(), payload);
    }

    #[test]
    fn test_token_parse() {
        assert_eq!(Token::parse(ParamType::Uint, "42").unwrap(), Token::Uint(42));
        assert_eq!(Token::parse(ParamType::Bool, "true").unwrap(), Token::Bool(true));
        let list = format!("{},{}", addr(1), addr(2));
        assert_eq!(
            Token::parse(ParamType::AddressArray, &list).unwrap(),
            Token::AddressArray(vec![addr(1), addr(2)])
        );
        assert!(Token::parse(ParamType::Uint, "-1").is_err());
    }
}
