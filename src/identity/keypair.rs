// Keypair - secp256k1 keys and the 20-byte addresses derived from them

use crate::merkle::keccak256;
use alloy_primitives::Address;
use secp256k1::{PublicKey as SecpPublicKey, Secp256k1, SecretKey};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum KeypairError {
    #[error("Invalid key length: expected {expected}, got {got}")]
    InvalidLength { expected: usize, got: usize },

    #[error("Invalid key bytes: {0}")]
    InvalidBytes(String),
}

/// secp256k1 public key
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PublicKey(SecpPublicKey);

impl PublicKey {
    /// Uncompressed SEC1 encoding (0x04 ‖ x ‖ y)
    pub fn to_uncompressed(&self) -> [u8; 65] {
        self.0.serialize_uncompressed()
    }

    /// Parse from a compressed or uncompressed SEC1 encoding
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeypairError> {
        SecpPublicKey::from_slice(bytes)
            .map(Self)
            .map_err(|e| KeypairError::InvalidBytes(e.to_string()))
    }

    /// Address = last 20 bytes of keccak256 over the uncompressed point without its tag byte
    pub fn address(&self) -> Address {
        let uncompressed = self.to_uncompressed();
        let hash = keccak256(&uncompressed[1..]);
        Address::from_slice(&hash[12..])
    }

    pub(crate) fn from_inner(inner: SecpPublicKey) -> Self {
        Self(inner)
    }
}

/// secp256k1 keypair
#[derive(Clone)]
pub struct Keypair {
    secret: SecretKey,
    public: PublicKey,
}

impl Keypair {
    /// Generate a new random keypair
    pub fn generate() -> Self {
        let secp = Secp256k1::new();
        let (secret, public) = secp.generate_keypair(&mut rand::thread_rng());
        Self {
            secret,
            public: PublicKey(public),
        }
    }

    /// Restore a keypair from its 32 secret bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeypairError> {
        if bytes.len() != 32 {
            return Err(KeypairError::InvalidLength {
                expected: 32,
                got: bytes.len(),
            });
        }

        let secret =
            SecretKey::from_slice(bytes).map_err(|e| KeypairError::InvalidBytes(e.to_string()))?;
        let secp = Secp256k1::new();
        let public = PublicKey(secret.public_key(&secp));
        Ok(Self { secret, public })
    }

    /// Secret key bytes (for backup/restore)
    pub fn to_bytes(&self) -> [u8; 32] {
        self.secret.secret_bytes()
    }

    pub fn public_key(&self) -> PublicKey {
        self.public
    }

    /// The identity this keypair signs for
    pub fn address(&self) -> Address {
        self.public.address()
    }

    pub(crate) fn secret(&self) -> &SecretKey {
        &self.secret
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}
