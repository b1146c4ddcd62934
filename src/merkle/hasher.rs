pub use alloy_primitives::keccak256;
use alloy_primitives::{Keccak256, B256};

/// Keccak-256 over the concatenation of `parts`, without allocating the concatenation
pub fn keccak256_concat(parts: &[&[u8]]) -> B256 {
    let mut hasher = Keccak256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize()
}

/// Parent of two nodes: the pair is sorted before hashing, so verification needs no position bits
pub fn hash_pair(a: &B256, b: &B256) -> B256 {
    if a <= b {
        keccak256_concat(&[a.as_slice(), b.as_slice()])
    } else {
        keccak256_concat(&[b.as_slice(), a.as_slice()])
    }
}
