// Merkle Accumulator - fixed-shape binary tree over an ordered list of 32-byte leaves
//
// Leaves are used as given (callers hash their records first). Parents hash the
// sorted pair, so a proof is just the ordered sibling list from leaf to root.

use crate::merkle::hash_pair;
use alloy_primitives::B256;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MerkleError {
    #[error("Leaf {0} is not in the tree")]
    ProofNotFound(B256),

    #[error("Empty tree has no root")]
    EmptyTree,

    #[error("Invalid proof encoding: length {0} is not a multiple of 32")]
    InvalidProofLength(usize),

    #[error("Invalid hex string: {0}")]
    InvalidHex(String),
}

/// How a level with an odd number of nodes is closed off
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OddNodePolicy {
    /// Pair the last node with itself
    #[default]
    Duplicate,
    /// Carry the last node up to the next level unchanged
    Promote,
}

// ============================================================================
// PROOF
// ============================================================================

/// Ordered sibling hashes from a leaf up to the root
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Proof(Vec<B256>);

impl Proof {
    pub fn new(siblings: Vec<B256>) -> Self {
        Self(siblings)
    }

    pub fn siblings(&self) -> &[B256] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Flat concatenation of the siblings, the form verifiers consume
    pub fn to_bytes(&self) -> Vec<u8> {
        self.0.iter().flat_map(|s| s.0).collect()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MerkleError> {
        if bytes.len() % 32 != 0 {
            return Err(MerkleError::InvalidProofLength(bytes.len()));
        }
        Ok(Self(bytes.chunks_exact(32).map(B256::from_slice).collect()))
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.to_bytes()))
    }

    pub fn from_hex(s: &str) -> Result<Self, MerkleError> {
        let stripped = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(stripped).map_err(|e| MerkleError::InvalidHex(e.to_string()))?;
        Self::from_bytes(&bytes)
    }
}

// ============================================================================
// ACCUMULATOR
// ============================================================================

/// Binary Merkle tree, rebuilt from scratch on every construction
#[derive(Clone, Debug)]
pub struct MerkleAccumulator {
    /// layers[0] = leaves, last layer = [root]; empty when there are no leaves
    layers: Vec<Vec<B256>>,
    policy: OddNodePolicy,
}

impl MerkleAccumulator {
    /// Build with the default odd-node policy
    pub fn new(leaves: Vec<B256>) -> Self {
        Self::with_policy(leaves, OddNodePolicy::default())
    }

    pub fn with_policy(leaves: Vec<B256>, policy: OddNodePolicy) -> Self {
        if leaves.is_empty() {
            return Self {
                layers: Vec::new(),
                policy,
            };
        }

        let mut layers = vec![leaves];
        while let Some(current) = layers.last().filter(|layer| layer.len() > 1) {
            let next: Vec<B256> = current
                .chunks(2)
                .map(|pair| match pair {
                    [left, right] => hash_pair(left, right),
                    [last] => match policy {
                        OddNodePolicy::Duplicate => hash_pair(last, last),
                        OddNodePolicy::Promote => *last,
                    },
                    _ => unreachable!("chunks(2) yields one or two nodes"),
                })
                .collect();
            layers.push(next);
        }

        Self { layers, policy }
    }

    pub fn policy(&self) -> OddNodePolicy {
        self.policy
    }

    pub fn leaves(&self) -> &[B256] {
        self.layers.first().map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.leaves().len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Number of levels above the leaves
    pub fn depth(&self) -> usize {
        self.layers.len().saturating_sub(1)
    }

    pub fn contains(&self, leaf: &B256) -> bool {
        self.leaves().contains(leaf)
    }

    pub fn root(&self) -> Result<B256, MerkleError> {
        self.layers
            .last()
            .and_then(|layer| layer.first())
            .copied()
            .ok_or(MerkleError::EmptyTree)
    }

    /// Proof for the first occurrence of `leaf`
    pub fn proof(&self, leaf: &B256) -> Result<Proof, MerkleError> {
        let index = self
            .leaves()
            .iter()
            .position(|candidate| candidate == leaf)
            .ok_or(MerkleError::ProofNotFound(*leaf))?;
        Ok(self.proof_at(index))
    }

    fn proof_at(&self, mut index: usize) -> Proof {
        let mut siblings = Vec::with_capacity(self.depth());

        for layer in &self.layers[..self.depth()] {
            let sibling = index ^ 1;
            if sibling < layer.len() {
                siblings.push(layer[sibling]);
            } else if self.policy == OddNodePolicy::Duplicate {
                siblings.push(layer[index]);
            }
            index /= 2;
        }

        Proof(siblings)
    }
}

/// Recompute the root from `leaf` and `proof` and compare with `expected_root`
pub fn verify(proof: &Proof, leaf: &B256, expected_root: &B256) -> bool {
    let computed = proof
        .siblings()
        .iter()
        .fold(*leaf, |node, sibling| hash_pair(&node, sibling));
    computed == *expected_root
}
