// Plasmoid - off-chain coordinator for a Plasma-style commit chain
//
// Participants keep replicas of a ledger whose three Merkle roots are
// periodically anchored on-chain as checkpoints. Balances leave the chain
// through proof-backed exits, and any participant can halt the system with a
// fraud proof against an inconsistent checkpoint.

pub mod chain;
pub mod identity;
pub mod ids;
pub mod ledger;
pub mod merkle;
pub mod protocol;
pub mod sync;

pub use chain::{ContractConfig, ContractError, LocalContract, PlasmoidContract};
pub use identity::{Keypair, LocalKeystore, Signature, Signer, SigningClient};
pub use ids::{CheckpointId, DepositId, DepositWithdrawalId, QueryId, SlotId, TxId, WithdrawalId};
pub use ledger::{Ledger, LedgerError, LedgerRoots, Transaction, TxKind};
pub use merkle::{verify, MerkleAccumulator, MerkleError, OddNodePolicy, Proof};
pub use protocol::{Participant, ParticipantConfig, ProtocolError};
pub use sync::{ReplicationChannel, SyncConfig, SyncError};
