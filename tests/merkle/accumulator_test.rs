// Merkle Accumulator Tests
// Roots, proofs and verification over both odd-node policies

use alloy_primitives::B256;
use plasmoid::merkle::{hash_pair, keccak256, verify, MerkleAccumulator, MerkleError, OddNodePolicy, Proof};
use proptest::prelude::*;

fn leaves(n: u64) -> Vec<B256> {
    (0..n).map(|i| keccak256(i.to_be_bytes())).collect()
}

// ============================================================================
// ROOTS
// ============================================================================

#[test]
fn test_empty_tree_has_no_root() {
    let tree = MerkleAccumulator::new(Vec::new());
    assert!(tree.is_empty());
    assert_eq!(tree.root(), Err(MerkleError::EmptyTree));
    assert!(matches!(tree.proof(&B256::ZERO), Err(MerkleError::ProofNotFound(_))));
}

#[test]
fn test_single_leaf_is_root_with_empty_proof() {
    let leaf = keccak256(b"only");
    let tree = MerkleAccumulator::new(vec![leaf]);

    assert_eq!(tree.root().unwrap(), leaf);
    let proof = tree.proof(&leaf).unwrap();
    assert!(proof.is_empty());
    assert!(verify(&proof, &leaf, &leaf));
}

#[test]
fn test_two_leaves_hash_sorted_pair() {
    let a = keccak256(b"a");
    let b = keccak256(b"b");

    let forward = MerkleAccumulator::new(vec![a, b]).root().unwrap();
    let reverse = MerkleAccumulator::new(vec![b, a]).root().unwrap();

    assert_eq!(forward, hash_pair(&a, &b));
    assert_eq!(forward, reverse);
}

#[test]
fn test_three_leaves_duplicate_policy() {
    let l = leaves(3);
    let tree = MerkleAccumulator::with_policy(l.clone(), OddNodePolicy::Duplicate);

    let expected = hash_pair(&hash_pair(&l[0], &l[1]), &hash_pair(&l[2], &l[2]));
    assert_eq!(tree.root().unwrap(), expected);
    assert_eq!(tree.depth(), 2);
}

#[test]
fn test_three_leaves_promote_policy() {
    let l = leaves(3);
    let tree = MerkleAccumulator::with_policy(l.clone(), OddNodePolicy::Promote);

    let expected = hash_pair(&hash_pair(&l[0], &l[1]), &l[2]);
    assert_eq!(tree.root().unwrap(), expected);

    // Promoted node has no sibling on the first level
    assert_eq!(tree.proof(&l[2]).unwrap().len(), 1);
}

#[test]
fn test_policies_agree_on_powers_of_two() {
    let l = leaves(8);
    let dup = MerkleAccumulator::with_policy(l.clone(), OddNodePolicy::Duplicate);
    let promote = MerkleAccumulator::with_policy(l, OddNodePolicy::Promote);
    assert_eq!(dup.root().unwrap(), promote.root().unwrap());
}

#[test]
fn test_leaf_order_changes_root() {
    let l = leaves(4);
    let mut swapped = l.clone();
    swapped.swap(0, 2);

    assert_ne!(
        MerkleAccumulator::new(l).root().unwrap(),
        MerkleAccumulator::new(swapped).root().unwrap()
    );
}

// ============================================================================
// PROOFS
// ============================================================================

#[test]
fn test_proof_for_missing_leaf() {
    let tree = MerkleAccumulator::new(leaves(5));
    let missing = keccak256(b"missing");
    assert_eq!(tree.proof(&missing), Err(MerkleError::ProofNotFound(missing)));
}

#[test]
fn test_duplicate_leaves_prove_first_occurrence() {
    let x = keccak256(b"x");
    let y = keccak256(b"y");
    let tree = MerkleAccumulator::new(vec![x, y, x, keccak256(b"z")]);

    let proof = tree.proof(&x).unwrap();
    assert_eq!(proof.siblings()[0], y);
    assert!(verify(&proof, &x, &tree.root().unwrap()));
}

#[test]
fn test_proof_for_wrong_root_fails() {
    let l = leaves(6);
    let tree = MerkleAccumulator::new(l.clone());
    let other = MerkleAccumulator::new(leaves(7));

    let proof = tree.proof(&l[3]).unwrap();
    assert!(!verify(&proof, &l[3], &other.root().unwrap()));
}

#[test]
fn test_proof_hex_encoding() {
    let l = leaves(5);
    let tree = MerkleAccumulator::new(l.clone());
    let proof = tree.proof(&l[4]).unwrap();

    let hex = proof.to_hex();
    assert!(hex.starts_with("0x"));
    assert_eq!(hex.len(), 2 + 64 * proof.len());
    assert_eq!(Proof::from_hex(&hex).unwrap(), proof);
    assert_eq!(Proof::from_bytes(&[0u8; 33]), Err(MerkleError::InvalidProofLength(33)));
    assert!(matches!(Proof::from_hex("0xzz"), Err(MerkleError::InvalidHex(_))));
}

// ============================================================================
// PROPERTIES
// ============================================================================

fn policy() -> impl Strategy<Value = OddNodePolicy> {
    prop_oneof![Just(OddNodePolicy::Duplicate), Just(OddNodePolicy::Promote)]
}

proptest! {
    #[test]
    fn prop_every_leaf_proves_against_root(n in 1u64..40, policy in policy()) {
        let l = leaves(n);
        let tree = MerkleAccumulator::with_policy(l.clone(), policy);
        let root = tree.root().unwrap();

        for leaf in &l {
            let proof = tree.proof(leaf).unwrap();
            prop_assert!(verify(&proof, leaf, &root));
        }
    }

    #[test]
    fn prop_tampered_sibling_fails(
        n in 2u64..40,
        pick in any::<prop::sample::Index>(),
        level in any::<prop::sample::Index>(),
        byte in 0usize..32,
        policy in policy(),
    ) {
        let l = leaves(n);
        let tree = MerkleAccumulator::with_policy(l.clone(), policy);
        let root = tree.root().unwrap();
        let leaf = l[pick.index(l.len())];

        let mut siblings = tree.proof(&leaf).unwrap().siblings().to_vec();
        prop_assume!(!siblings.is_empty());
        let at = level.index(siblings.len());
        siblings[at].0[byte] ^= 0x01;

        prop_assert!(!verify(&Proof::new(siblings), &leaf, &root));
    }

    #[test]
    fn prop_foreign_leaf_fails(n in 1u64..40, policy in policy()) {
        let l = leaves(n);
        let tree = MerkleAccumulator::with_policy(l.clone(), policy);
        let root = tree.root().unwrap();
        let proof = tree.proof(&l[0]).unwrap();

        prop_assert!(!verify(&proof, &keccak256(b"not a leaf"), &root));
    }
}
