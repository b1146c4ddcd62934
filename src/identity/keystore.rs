// Signing collaborator - the injected capability participants sign with
// A real deployment backs this with a wallet or RPC signer; LocalKeystore keeps keys in memory.

use crate::identity::{Keypair, Signature, SignatureError, Signer};
use alloy_primitives::{Address, B256};
use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SignerError {
    #[error("No key held for identity {0}")]
    UnknownIdentity(Address),

    #[error("Signer unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Signature(#[from] SignatureError),
}

/// Signs digests on behalf of identities and recovers signers from signatures
#[async_trait]
pub trait SigningClient: Send + Sync {
    /// Personal-message signature by `identity` over `digest`
    async fn sign(&self, identity: Address, digest: B256) -> Result<Signature, SignerError>;

    /// Recover the identity that signed `digest`
    fn recover(&self, signature: &Signature, digest: &B256) -> Result<Address, SignerError> {
        Ok(Signer::recover(signature, digest)?)
    }
}

/// In-memory keystore, one keypair per identity
#[derive(Debug, Default)]
pub struct LocalKeystore {
    keys: HashMap<Address, Keypair>,
}

impl LocalKeystore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a keypair, returning the identity it signs for
    pub fn insert(&mut self, keypair: Keypair) -> Address {
        let address = keypair.address();
        self.keys.insert(address, keypair);
        address
    }

    /// Generate and hold a fresh keypair
    pub fn generate(&mut self) -> Address {
        self.insert(Keypair::generate())
    }

    pub fn with_key(mut self, keypair: Keypair) -> Self {
        self.insert(keypair);
        self
    }

    pub fn contains(&self, identity: &Address) -> bool {
        self.keys.contains_key(identity)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[async_trait]
impl SigningClient for LocalKeystore {
    async fn sign(&self, identity: Address, digest: B256) -> Result<Signature, SignerError> {
        let keypair = self
            .keys
            .get(&identity)
            .ok_or(SignerError::UnknownIdentity(identity))?;
        Ok(Signer::sign(keypair, &digest))
    }
}
