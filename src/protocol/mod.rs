// Protocol module - WHAT PARTICIPANTS DO
// Commitment, exit and dispute protocols on top of the ledger, replication and contract

mod commitment;
mod dispute;
mod error;
mod exit;
mod participant;

pub use commitment::{Checkpoint, CheckpointBook, CheckpointState, PendingCheckpoint};
pub use dispute::{build_fraud_proof, DisputeTarget};
pub use error::ProtocolError;
pub use exit::{DepositReceipt, ExitBook, ExitRequest, SlotExitState};
pub use participant::{connect_mesh, Participant, ParticipantConfig};
