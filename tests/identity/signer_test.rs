// Signer Tests
// Personal-message signatures, address recovery and the async signing client

use alloy_primitives::{Address, B256};
use plasmoid::identity::{Keypair, LocalKeystore, Signature, SignatureError, Signer, SigningClient};
use plasmoid::merkle::keccak256;

// ============================================================================
// KEYS AND ADDRESSES
// ============================================================================

#[test]
fn test_known_private_key_address() {
    let mut secret = [0u8; 32];
    secret[31] = 1;
    let keypair = Keypair::from_bytes(&secret).unwrap();

    let expected: Address = "0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf".parse().unwrap();
    assert_eq!(keypair.address(), expected);
}

#[test]
fn test_keypair_bytes_roundtrip_keeps_address() {
    let keypair = Keypair::generate();
    let restored = Keypair::from_bytes(&keypair.to_bytes()).unwrap();
    assert_eq!(restored.address(), keypair.address());
}

#[test]
fn test_generated_keypairs_differ() {
    assert_ne!(Keypair::generate().address(), Keypair::generate().address());
}

#[test]
fn test_short_secret_rejected() {
    assert!(Keypair::from_bytes(&[7u8; 16]).is_err());
}

// ============================================================================
// SIGNING AND RECOVERY
// ============================================================================

#[test]
fn test_signature_recovers_signer() {
    let keypair = Keypair::generate();
    let digest = keccak256(b"checkpoint roots");

    let signature = Signer::sign(&keypair, &digest);

    assert_eq!(Signer::recover(&signature, &digest).unwrap(), keypair.address());
    assert!(Signer::verify(&keypair.address(), &digest, &signature));
}

#[test]
fn test_signature_has_ethereum_recovery_byte() {
    let keypair = Keypair::generate();
    let signature = Signer::sign(&keypair, &keccak256(b"v byte"));

    let v = signature.as_bytes()[64];
    assert!(v == 27 || v == 28, "unexpected v = {v}");
    assert_eq!(signature.to_hex().len(), 2 + 130);
}

#[test]
fn test_other_key_does_not_verify() {
    let alice = Keypair::generate();
    let mallory = Keypair::generate();
    let digest = keccak256(b"transfer");

    let forged = Signer::sign(&mallory, &digest);
    assert!(!Signer::verify(&alice.address(), &digest, &forged));
}

#[test]
fn test_personal_digest_differs_from_raw_digest() {
    let digest = keccak256(b"payload");
    assert_ne!(Signer::personal_digest(&digest), digest);
}

#[test]
fn test_bad_length_and_recovery_byte_rejected() {
    assert!(matches!(
        Signature::from_bytes(&[0u8; 64]),
        Err(SignatureError::InvalidLength(64))
    ));

    let mut raw = [1u8; 65];
    raw[64] = 5;
    assert!(matches!(
        Signature::from_bytes(&raw),
        Err(SignatureError::InvalidRecoveryId(5))
    ));
}

#[test]
fn test_signature_serde_roundtrip() {
    let keypair = Keypair::generate();
    let signature = Signer::sign(&keypair, &B256::repeat_byte(9));

    let bytes = postcard::to_allocvec(&signature).unwrap();
    let decoded: Signature = postcard::from_bytes(&bytes).unwrap();
    assert_eq!(decoded, signature);
}

// ============================================================================
// SIGNING CLIENT
// ============================================================================

#[tokio::test]
async fn test_keystore_signs_for_each_identity() {
    let mut keystore = LocalKeystore::new();
    let alice = keystore.generate();
    let bob = keystore.generate();
    let digest = keccak256(b"slot 1");

    let by_alice = keystore.sign(alice, digest).await.unwrap();
    let by_bob = keystore.sign(bob, digest).await.unwrap();

    assert!(Signer::verify(&alice, &digest, &by_alice));
    assert!(Signer::verify(&bob, &digest, &by_bob));
    assert_ne!(by_alice, by_bob);
}

#[tokio::test]
async fn test_keystore_refuses_unknown_identity() {
    let keystore = LocalKeystore::new().with_key(Keypair::generate());
    let stranger = Keypair::generate().address();

    assert!(keystore.sign(stranger, B256::ZERO).await.is_err());
    assert_eq!(keystore.len(), 1);
}
