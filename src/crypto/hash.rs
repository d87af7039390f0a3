//! Hashing utilities
//!
//! SHA-256 helpers used for method selectors and deterministic
//! address derivation.

use sha2::{Digest, Sha256};

/// Computes SHA-256 hash of the input data
pub fn sha256(data: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().to_vec()
}

/// Computes SHA-256 hash and returns it as a hex string
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(sha256(data))
}

/// First four bytes of the SHA-256 of a method signature such as
/// `approveTransfer(uint256)`.
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = sha256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// First twenty bytes of the SHA-256 of `deployer:nonce`.
pub fn derive_address_bytes(deployer: &str, nonce: u64) -> [u8; 20] {
    let input = format!("{}:{}", deployer, nonce);
    let hash = sha256(input.as_bytes());
    let mut bytes = [0u8; 20];
    bytes.copy_from_slice(&hash[..20]);
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256() {
        let data = b"hello world";
        let hash = sha256(data);
        assert_eq!(hash.len(), 32);
        assert_eq!(
            sha256_hex(data),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_selector_is_hash_prefix() {
        let hash = sha256(b"name()");
        assert_eq!(selector("name()").to_vec(), hash[..4].to_vec());
        assert_ne!(selector("name()"), selector("quorum()"));
    }

    #[test]
    fn test_derived_address_depends_on_nonce() {
        let a = derive_address_bytes("0xfactory", 0);
        let b = derive_address_bytes("0xfactory", 1);
        assert_ne!(a, b);
        assert_eq!(a, derive_address_bytes("0xfactory", 0));
    }
}
