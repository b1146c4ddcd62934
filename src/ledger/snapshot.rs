// Ledger Snapshot - immutable copy of a ledger's collections, the unit of replication

use crate::ids::{SlotId, TxId};
use crate::ledger::{AccountValue, Transaction};
use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Why a replica refused to install a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SnapshotError {
    #[error("Next tx id {next_tx_id} does not follow {transactions} transactions")]
    TxCounterMismatch { next_tx_id: TxId, transactions: usize },

    #[error("Changes and accounts cover different slots")]
    SlotSetMismatch,

    #[error("Slot {slot} is not below next slot id {next_slot_id}")]
    SlotOutOfRange { slot: SlotId, next_slot_id: SlotId },

    #[error("Change references unknown transaction {0}")]
    UnknownTransaction(TxId),
}

/// Full contents of a ledger as published by `origin` at logical version `sequence`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    origin: Address,
    sequence: u64,
    transactions: Vec<Transaction>,
    changes: BTreeMap<SlotId, TxId>,
    accounts: BTreeMap<SlotId, AccountValue>,
    next_tx_id: TxId,
    next_slot_id: SlotId,
}

impl LedgerSnapshot {
    pub(crate) fn new(
        origin: Address,
        sequence: u64,
        transactions: Vec<Transaction>,
        changes: BTreeMap<SlotId, TxId>,
        accounts: BTreeMap<SlotId, AccountValue>,
        next_tx_id: TxId,
        next_slot_id: SlotId,
    ) -> Self {
        Self {
            origin,
            sequence,
            transactions,
            changes,
            accounts,
            next_tx_id,
            next_slot_id,
        }
    }

    pub fn origin(&self) -> Address {
        self.origin
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn changes(&self) -> &BTreeMap<SlotId, TxId> {
        &self.changes
    }

    pub fn accounts(&self) -> &BTreeMap<SlotId, AccountValue> {
        &self.accounts
    }

    pub fn next_tx_id(&self) -> TxId {
        self.next_tx_id
    }

    pub fn next_slot_id(&self) -> SlotId {
        self.next_slot_id
    }

    /// Structural checks a replica runs before replacing its state with this snapshot
    pub fn check_consistency(&self) -> Result<(), SnapshotError> {
        if self.next_tx_id.value() != self.transactions.len() as u64 + 1 {
            return Err(SnapshotError::TxCounterMismatch {
                next_tx_id: self.next_tx_id,
                transactions: self.transactions.len(),
            });
        }

        if !self.changes.keys().eq(self.accounts.keys()) {
            return Err(SnapshotError::SlotSetMismatch);
        }

        if let Some(slot) = self.changes.keys().find(|slot| **slot >= self.next_slot_id) {
            return Err(SnapshotError::SlotOutOfRange {
                slot: *slot,
                next_slot_id: self.next_slot_id,
            });
        }

        if let Some(tx_id) = self
            .changes
            .values()
            .find(|tx_id| tx_id.value() == 0 || **tx_id >= self.next_tx_id)
        {
            return Err(SnapshotError::UnknownTransaction(*tx_id));
        }

        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, postcard::Error> {
        postcard::to_allocvec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, postcard::Error> {
        postcard::from_bytes(bytes)
    }
}
