// Chain module - THE CONTRACT SIDE
// The contract interface participants call and an in-memory implementation of its rules

mod contract;
mod local;

pub use contract::{
    CheckpointRecord, ContractError, DepositRecord, DepositWithdrawChallenge,
    DepositWithdrawalRecord, FraudProof, PlasmoidContract, RecordKind, SlotQueryRecord,
    WithdrawalClaim, WithdrawalRecord,
};
pub use local::{ContractConfig, ContractEvent, LocalContract};
