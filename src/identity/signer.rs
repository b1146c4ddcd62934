use crate::identity::{Keypair, PublicKey};
use crate::merkle::keccak256_concat;
use alloy_primitives::{Address, B256};
use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::{Message, Secp256k1};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

/// Prefix the signer prepends before hashing a 32-byte digest (personal message)
pub const PERSONAL_MESSAGE_PREFIX: &[u8] = b"\x19Ethereum Signed Message:\n32";

pub const SIGNATURE_LENGTH: usize = 65;

#[derive(Error, Debug)]
pub enum SignatureError {
    #[error("Invalid signature length: expected 65, got {0}")]
    InvalidLength(usize),

    #[error("Invalid recovery byte: {0}")]
    InvalidRecoveryId(u8),

    #[error("Invalid signature bytes: {0}")]
    InvalidBytes(String),
}

/// Recoverable ECDSA signature, `r ‖ s ‖ v` with `v` in {27, 28}
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature {
    bytes: [u8; SIGNATURE_LENGTH],
}

impl Serialize for Signature {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_bytes(&self.bytes)
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::{self, Visitor};

        struct SignatureVisitor;

        impl<'de> Visitor<'de> for SignatureVisitor {
            type Value = Signature;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("65 bytes for a recoverable signature")
            }

            fn visit_bytes<E>(self, v: &[u8]) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Signature::from_bytes(v).map_err(|e| E::custom(e.to_string()))
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
            where
                A: de::SeqAccess<'de>,
            {
                let mut bytes = Vec::with_capacity(SIGNATURE_LENGTH);
                while let Some(byte) = seq.next_element()? {
                    bytes.push(byte);
                }
                Signature::from_bytes(&bytes).map_err(|e| de::Error::custom(e.to_string()))
            }
        }

        deserializer.deserialize_bytes(SignatureVisitor)
    }
}

impl Signature {
    pub fn as_bytes(&self) -> &[u8; SIGNATURE_LENGTH] {
        &self.bytes
    }

    /// Create a signature from raw bytes; accepts `v` as 0/1 or 27/28
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SignatureError> {
        if bytes.len() != SIGNATURE_LENGTH {
            return Err(SignatureError::InvalidLength(bytes.len()));
        }

        let mut array = [0u8; SIGNATURE_LENGTH];
        array.copy_from_slice(bytes);
        array[64] = match array[64] {
            0 | 1 => array[64] + 27,
            27 | 28 => array[64],
            other => return Err(SignatureError::InvalidRecoveryId(other)),
        };
        Ok(Self { bytes: array })
    }

    /// 0x-prefixed hex form handed to the contract
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.bytes))
    }

    fn to_recoverable(self) -> Result<RecoverableSignature, SignatureError> {
        let recovery_id = RecoveryId::from_i32(i32::from(self.bytes[64] - 27))
            .map_err(|_| SignatureError::InvalidRecoveryId(self.bytes[64]))?;
        RecoverableSignature::from_compact(&self.bytes[..64], recovery_id)
            .map_err(|e| SignatureError::InvalidBytes(e.to_string()))
    }

    fn from_recoverable(signature: &RecoverableSignature) -> Self {
        let (recovery_id, compact) = signature.serialize_compact();
        let mut bytes = [0u8; SIGNATURE_LENGTH];
        bytes[..64].copy_from_slice(&compact);
        bytes[64] = 27 + recovery_id.to_i32() as u8;
        Self { bytes }
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", self.to_hex())
    }
}

/// Personal-message signing and recovery over 32-byte digests
pub struct Signer;

impl Signer {
    /// keccak256(prefix ‖ digest), the value the curve operation actually signs
    pub fn personal_digest(digest: &B256) -> B256 {
        keccak256_concat(&[PERSONAL_MESSAGE_PREFIX, digest.as_slice()])
    }

    pub fn sign(keypair: &Keypair, digest: &B256) -> Signature {
        let secp = Secp256k1::signing_only();
        let message = Message::from_digest(Self::personal_digest(digest).0);
        let signature = secp.sign_ecdsa_recoverable(&message, keypair.secret());
        Signature::from_recoverable(&signature)
    }

    /// Recover the address that produced `signature` over `digest`
    pub fn recover(signature: &Signature, digest: &B256) -> Result<Address, SignatureError> {
        let secp = Secp256k1::verification_only();
        let message = Message::from_digest(Self::personal_digest(digest).0);
        let recoverable = signature.to_recoverable()?;
        let public = secp
            .recover_ecdsa(&message, &recoverable)
            .map_err(|e| SignatureError::InvalidBytes(e.to_string()))?;
        Ok(PublicKey::from_inner(public).address())
    }

    /// True when `signature` over `digest` recovers to `expected`
    pub fn verify(expected: &Address, digest: &B256, signature: &Signature) -> bool {
        matches!(Self::recover(signature, digest), Ok(address) if address == *expected)
    }
}
