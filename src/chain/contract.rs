// Contract - the on-chain collaborator every participant talks to
// Deployments put a chain client behind this trait; LocalContract runs the same rules in memory.

use crate::identity::Signature;
use crate::ids::{CheckpointId, DepositId, DepositWithdrawalId, QueryId, SlotId, TxId, WithdrawalId};
use crate::ledger::{AccountValue, LedgerRoots, TxKind};
use crate::merkle::Proof;
use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

// ============================================================================
// CONTRACT ERROR
// ============================================================================

/// Kind of record a contract call referenced
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordKind {
    Checkpoint,
    Withdrawal,
    Deposit,
    DepositWithdrawal,
    SlotQuery,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKind::Checkpoint => write!(f, "checkpoint"),
            RecordKind::Withdrawal => write!(f, "withdrawal"),
            RecordKind::Deposit => write!(f, "deposit"),
            RecordKind::DepositWithdrawal => write!(f, "deposit-withdrawal"),
            RecordKind::SlotQuery => write!(f, "slot query"),
        }
    }
}

/// Reasons the contract refuses a call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContractError {
    #[error("Contract is halted")]
    Halted,

    #[error("Unknown {kind} {id}")]
    NotFound { kind: RecordKind, id: u64 },

    #[error("Too early: ready at {ready_at}, chain time {now}")]
    TooEarly { ready_at: u64, now: u64 },

    #[error("Window closed at {closed_at}, chain time {now}")]
    WindowClosed { closed_at: u64, now: u64 },

    #[error("Signature does not recover to {expected}")]
    SignatureMismatch { expected: Address },

    #[error("Signer {0} is not the operator")]
    NotOperator(Address),

    #[error("Invalid proof: {0}")]
    InvalidProof(String),

    #[error("Amount must be greater than zero")]
    ZeroAmount,

    #[error("Insufficient balance: have {have}, need {need}")]
    InsufficientBalance { have: U256, need: U256 },

    #[error("Slot {slot_id} already has a withdrawal against checkpoint {checkpoint_id}")]
    AlreadyWithdrawing {
        checkpoint_id: CheckpointId,
        slot_id: SlotId,
    },

    #[error("Deposit {0} already has a withdrawal request")]
    DepositAlreadyWithdrawing(DepositId),

    #[error("Checkpoint {0} was invalidated")]
    CheckpointInvalidated(CheckpointId),

    #[error("Deposit-withdrawal {0} was challenged")]
    Challenged(DepositWithdrawalId),

    #[error("No checkpoint newer than {0} to challenge with")]
    NothingToChallenge(CheckpointId),

    #[error("Slot query {0} was already answered")]
    AlreadyAnswered(QueryId),

    #[error("Checkpoint {0} is consistent with the submitted evidence")]
    ConsistentCheckpoint(CheckpointId),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Contract unavailable: {0}")]
    Unavailable(String),
}

impl ContractError {
    pub fn not_found(kind: RecordKind, id: u64) -> Self {
        ContractError::NotFound { kind, id }
    }
}

// ============================================================================
// RECORDS
// ============================================================================

/// Checkpoint as stored on-chain
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckpointRecord {
    pub id: CheckpointId,
    pub tx_root: B256,
    pub changes_root: B256,
    pub accounts_root: B256,
    pub created_at: u64,
    /// Chain time from which the checkpoint counts as settled
    pub final_at: u64,
    pub invalidated: bool,
}

impl CheckpointRecord {
    pub fn roots(&self) -> LedgerRoots {
        LedgerRoots {
            tx_root: self.tx_root,
            changes_root: self.changes_root,
            accounts_root: self.accounts_root,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WithdrawalRecord {
    pub id: WithdrawalId,
    pub checkpoint_id: CheckpointId,
    pub slot_id: SlotId,
    pub kind: TxKind,
    pub lock: Address,
    pub amount: U256,
    pub requested_at: u64,
    pub ready_at: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DepositRecord {
    pub id: DepositId,
    pub owner: Address,
    pub amount: U256,
    pub created_at: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DepositWithdrawalRecord {
    pub id: DepositWithdrawalId,
    pub deposit_id: DepositId,
    pub owner: Address,
    pub amount: U256,
    /// Latest checkpoint when the request was made (0 if none)
    pub checkpoint_id: CheckpointId,
    pub requested_at: u64,
    pub ready_at: u64,
    pub challenged: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlotQueryRecord {
    pub id: QueryId,
    pub checkpoint_id: CheckpointId,
    pub slot_id: SlotId,
    pub requester: Address,
    pub asked_at: u64,
    pub deadline: u64,
    pub answered: bool,
}

// ============================================================================
// CALL PAYLOADS
// ============================================================================

/// Evidence that a transaction for `slot_id` is committed in `checkpoint_id`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WithdrawalClaim {
    pub checkpoint_id: CheckpointId,
    pub slot_id: SlotId,
    pub kind: TxKind,
    pub lock: Address,
    pub amount: U256,
    /// Proof of the transaction digest against the checkpoint's tx root
    pub proof: Proof,
    /// Signature by `lock` over the transaction digest
    pub signature: Signature,
}

/// Proof material for a fast deposit-withdrawal challenge
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DepositWithdrawChallenge {
    pub id: DepositWithdrawalId,
    pub proof_transactions: Proof,
    pub proof_changes: Proof,
    pub proof_accounts: Proof,
}

/// Fraud proof against a committed checkpoint
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FraudProof {
    pub checkpoint_id: CheckpointId,
    pub tx_id: TxId,
    /// Transaction digest against the checkpoint's tx root
    pub tx_proof: Proof,
    pub prev_slot_key_hash: B256,
    /// Against the previous checkpoint's accounts root
    pub prev_slot_proof: Proof,
    pub cur_slot_key_hash: B256,
    /// Against the previous checkpoint's accounts root
    pub cur_slot_proof: Proof,
    pub kind: TxKind,
    pub lock: Address,
    pub amount: U256,
    pub signature: Signature,
}

// ============================================================================
// CONTRACT TRAIT
// ============================================================================

/// Calls the off-chain core makes against the commit-chain contract
#[async_trait]
pub trait PlasmoidContract: Send + Sync {
    /// Lock `amount` of `from`'s tokens in the contract
    async fn deposit(&self, from: Address, amount: U256) -> Result<DepositId, ContractError>;

    /// Anchor three roots signed by the operator; returns the assigned id
    async fn checkpoint(
        &self,
        tx_root: B256,
        changes_root: B256,
        accounts_root: B256,
        signature: Signature,
    ) -> Result<CheckpointId, ContractError>;

    async fn start_withdrawal(&self, claim: &WithdrawalClaim) -> Result<WithdrawalId, ContractError>;

    /// Pay out a withdrawal whose challenge period has elapsed
    async fn finalise_withdrawal(&self, id: WithdrawalId) -> Result<(), ContractError>;

    /// Request a fast exit of a deposit, authorised by the depositor's signature
    async fn deposit_withdraw(
        &self,
        deposit_id: DepositId,
        unlock: Signature,
    ) -> Result<DepositWithdrawalId, ContractError>;

    async fn challenge_deposit_withdraw(
        &self,
        challenge: &DepositWithdrawChallenge,
    ) -> Result<(), ContractError>;

    async fn finalise_deposit_withdraw(&self, id: DepositWithdrawalId) -> Result<(), ContractError>;

    /// View: does `unlock` authorise an exit of `deposit_id`
    async fn deposit_withdraw_prove(
        &self,
        deposit_id: DepositId,
        unlock: &Signature,
    ) -> Result<bool, ContractError>;

    /// Submit a fraud proof; true when the contract halted
    async fn invalidate(&self, proof: &FraudProof) -> Result<bool, ContractError>;

    /// Demand that the data behind a slot of a checkpoint be published
    async fn query_slot(
        &self,
        requester: Address,
        checkpoint_id: CheckpointId,
        slot_id: SlotId,
    ) -> Result<QueryId, ContractError>;

    async fn answer_slot_query(
        &self,
        query_id: QueryId,
        value: AccountValue,
        proof: &Proof,
    ) -> Result<(), ContractError>;

    /// Current chain time in seconds
    async fn now(&self) -> Result<u64, ContractError>;

    async fn halted(&self) -> Result<bool, ContractError>;

    async fn latest_checkpoint(&self) -> Result<Option<CheckpointId>, ContractError>;

    async fn checkpoint_record(
        &self,
        id: CheckpointId,
    ) -> Result<Option<CheckpointRecord>, ContractError>;

    async fn withdrawal_record(
        &self,
        id: WithdrawalId,
    ) -> Result<Option<WithdrawalRecord>, ContractError>;

    async fn deposit_record(&self, id: DepositId) -> Result<Option<DepositRecord>, ContractError>;

    async fn deposit_withdrawal_record(
        &self,
        id: DepositWithdrawalId,
    ) -> Result<Option<DepositWithdrawalRecord>, ContractError>;

    async fn slot_query_record(&self, id: QueryId)
        -> Result<Option<SlotQueryRecord>, ContractError>;
}
