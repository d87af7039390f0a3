//! Cryptographic utilities
//!
//! SHA-256 hashing, method selectors and address derivation.

pub mod hash;

pub use hash::{derive_address_bytes, selector, sha256, sha256_hex};
