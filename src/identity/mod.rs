// Identity module - secp256k1 keys, addresses and recoverable signatures

mod keypair;
mod keystore;
mod signer;

pub use keypair::*;
pub use keystore::*;
pub use signer::*;
