// Transaction - the tagged Deposit/Withdrawal record and the account value it writes

use crate::ids::{DepositId, TxId};
use crate::merkle::{keccak256, keccak256_concat};
use alloy_primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEPOSIT_TAG: u8 = b'd';
pub const WITHDRAWAL_TAG: u8 = b'w';

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TxKind {
    Deposit,
    Withdrawal,
}

impl TxKind {
    pub fn tag(&self) -> u8 {
        match self {
            TxKind::Deposit => DEPOSIT_TAG,
            TxKind::Withdrawal => WITHDRAWAL_TAG,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            DEPOSIT_TAG => Some(TxKind::Deposit),
            WITHDRAWAL_TAG => Some(TxKind::Withdrawal),
            _ => None,
        }
    }
}

impl fmt::Display for TxKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TxKind::Deposit => write!(f, "deposit"),
            TxKind::Withdrawal => write!(f, "withdrawal"),
        }
    }
}

/// An immutable ledger transaction
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Transaction {
    kind: TxKind,
    lock: Address,
    amount: U256,
}

impl Transaction {
    pub fn new(kind: TxKind, lock: Address, amount: U256) -> Self {
        Self { kind, lock, amount }
    }

    pub fn deposit(lock: Address, amount: U256) -> Self {
        Self::new(TxKind::Deposit, lock, amount)
    }

    pub fn withdrawal(lock: Address, amount: U256) -> Self {
        Self::new(TxKind::Withdrawal, lock, amount)
    }

    pub fn kind(&self) -> TxKind {
        self.kind
    }

    pub fn lock(&self) -> Address {
        self.lock
    }

    pub fn amount(&self) -> U256 {
        self.amount
    }

    /// keccak256(tag ‖ lock ‖ amount_be256)
    pub fn digest(&self) -> B256 {
        transaction_digest(self.kind, &self.lock, &self.amount)
    }
}

/// Digest of a transaction from its parts, as a verifier re-derives it
pub fn transaction_digest(kind: TxKind, lock: &Address, amount: &U256) -> B256 {
    keccak256_concat(&[
        &[kind.tag()],
        lock.as_slice(),
        &amount.to_be_bytes::<32>(),
    ])
}

/// Leaf of the changes tree for the transaction that last touched a slot
pub fn change_leaf(tx_id: TxId) -> B256 {
    keccak256(tx_id.to_word())
}

/// Digest a depositor signs to authorise a fast deposit-withdrawal
pub fn deposit_digest(deposit_id: DepositId, amount: &U256, owner: &Address) -> B256 {
    keccak256_concat(&[
        deposit_id.to_word().as_slice(),
        &amount.to_be_bytes::<32>(),
        owner.as_slice(),
    ])
}

/// Current balance commitment of one slot: `owner ‖ amount_be256`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountValue {
    owner: Address,
    amount: U256,
}

impl AccountValue {
    pub const ENCODED_LEN: usize = 52;

    pub fn new(owner: Address, amount: U256) -> Self {
        Self { owner, amount }
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn amount(&self) -> U256 {
        self.amount
    }

    pub fn to_bytes(&self) -> [u8; Self::ENCODED_LEN] {
        let mut bytes = [0u8; Self::ENCODED_LEN];
        bytes[..20].copy_from_slice(self.owner.as_slice());
        bytes[20..].copy_from_slice(&self.amount.to_be_bytes::<32>());
        bytes
    }

    /// Leaf of the accounts tree, also the slot key hash used in fraud proofs
    pub fn leaf(&self) -> B256 {
        keccak256(self.to_bytes())
    }
}
