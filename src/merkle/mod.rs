// Merkle module - Keccak hashing and the accumulator behind every checkpoint root

mod accumulator;
mod hasher;

pub use accumulator::{verify, MerkleAccumulator, MerkleError, OddNodePolicy, Proof};
pub use hasher::{hash_pair, keccak256, keccak256_concat};
