// Protocol errors - one taxonomy for everything a participant can run into
//
// Lower layers keep their own error enums; conversions fold the cases callers
// must tell apart (stale trees, timing, halts, missing ids) into dedicated variants.

use crate::chain::{ContractError, RecordKind};
use crate::identity::SignerError;
use crate::ids::SlotId;
use crate::ledger::LedgerError;
use crate::merkle::MerkleError;
use crate::protocol::DepositReceipt;
use crate::sync::SyncError;
use alloy_primitives::{Address, B256};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Leaf {0} is not in the tree")]
    ProofNotFound(B256),

    #[error("Ledger trees are stale; update_trees() has not run since the last mutation")]
    StaleTree,

    #[error("Digest mismatch: local {local}, on-chain {remote}")]
    DigestMismatch { local: B256, remote: B256 },

    #[error("Not yet: ready at chain time {ready_at}, now {now}")]
    Timing { ready_at: u64, now: u64 },

    #[error("Unknown {kind} {id}")]
    NotFound { kind: &'static str, id: u64 },

    #[error("Signature does not recover to {expected}")]
    SignatureInvalid { expected: Address },

    #[error("System is halted")]
    Halted,

    #[error("Slot {slot_id} is not exitable: {reason}")]
    NotExitable { slot_id: SlotId, reason: String },

    #[error("Contract rejected the call: {0}")]
    Rejected(ContractError),

    #[error(transparent)]
    Ledger(LedgerError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    /// The deposit is on-chain and in the local ledger, but peers did not confirm it
    #[error("Deposit {} recorded but not replicated: {source}", .receipt.deposit_id)]
    Unreplicated {
        receipt: DepositReceipt,
        source: SyncError,
    },

    #[error(transparent)]
    Signer(#[from] SignerError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ProtocolError {
    pub fn not_found(kind: &'static str, id: u64) -> Self {
        ProtocolError::NotFound { kind, id }
    }

    /// Only timing failures, and replicas that were slow to acknowledge, clear up by waiting
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProtocolError::Timing { .. } | ProtocolError::Sync(SyncError::AckTimeout(_))
        )
    }

    pub fn is_halted(&self) -> bool {
        matches!(self, ProtocolError::Halted)
    }
}

impl From<MerkleError> for ProtocolError {
    fn from(e: MerkleError) -> Self {
        match e {
            MerkleError::ProofNotFound(leaf) => ProtocolError::ProofNotFound(leaf),
            other => ProtocolError::Ledger(LedgerError::Merkle(other)),
        }
    }
}

impl From<LedgerError> for ProtocolError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::StaleTree => ProtocolError::StaleTree,
            LedgerError::Merkle(inner) => inner.into(),
            LedgerError::UnknownSlot(slot) => ProtocolError::not_found("slot", slot.value()),
            LedgerError::UnknownTransaction(tx) => {
                ProtocolError::not_found("transaction", tx.value())
            }
            other => ProtocolError::Ledger(other),
        }
    }
}

impl From<ContractError> for ProtocolError {
    fn from(e: ContractError) -> Self {
        match e {
            ContractError::Halted => ProtocolError::Halted,
            ContractError::TooEarly { ready_at, now } => ProtocolError::Timing { ready_at, now },
            ContractError::SignatureMismatch { expected } => {
                ProtocolError::SignatureInvalid { expected }
            }
            ContractError::NotFound { kind, id } => ProtocolError::NotFound {
                kind: match kind {
                    RecordKind::Checkpoint => "checkpoint",
                    RecordKind::Withdrawal => "withdrawal",
                    RecordKind::Deposit => "deposit",
                    RecordKind::DepositWithdrawal => "deposit-withdrawal",
                    RecordKind::SlotQuery => "slot query",
                },
                id,
            },
            other => ProtocolError::Rejected(other),
        }
    }
}
