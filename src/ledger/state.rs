// Ledger - Tracks one participant's replica of the commit-chain state
//
// Three collections feed three Merkle trees:
// - transactions: append-only, leaf = transaction digest
// - changes:      slot -> last tx id, leaf = keccak(tx id word)
// - accounts:     slot -> owner ‖ amount, leaf = keccak(account value)
//
// Trees are only rebuilt by update_trees(). Any mutation marks them stale and
// every root or proof read fails until they are rebuilt.

use crate::ids::{SlotId, TxId};
use crate::ledger::transaction::change_leaf;
use crate::ledger::{AccountValue, LedgerSnapshot, SnapshotError, Transaction};
use crate::merkle::{keccak256_concat, MerkleAccumulator, MerkleError, OddNodePolicy, Proof};
use alloy_primitives::{Address, B256, U256};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;
use tracing::debug;

/// Which of the three commitment trees an operation refers to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TreeKind {
    Transactions,
    Changes,
    Accounts,
}

impl fmt::Display for TreeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TreeKind::Transactions => write!(f, "transactions"),
            TreeKind::Changes => write!(f, "changes"),
            TreeKind::Accounts => write!(f, "accounts"),
        }
    }
}

/// Errors that can occur during ledger operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Merkle trees are stale; update_trees() must run after the last mutation")]
    StaleTree,

    #[error("The {0} tree is empty")]
    EmptyTree(TreeKind),

    #[error("Unknown transaction {0}")]
    UnknownTransaction(TxId),

    #[error("Unknown slot {0}")]
    UnknownSlot(SlotId),

    #[error("Rejected snapshot: {0}")]
    InvalidSnapshot(#[from] SnapshotError),

    #[error(transparent)]
    Merkle(#[from] MerkleError),
}

/// The three roots a checkpoint commits to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LedgerRoots {
    pub tx_root: B256,
    pub changes_root: B256,
    pub accounts_root: B256,
}

impl LedgerRoots {
    /// keccak256(txRoot ‖ changesRoot ‖ accountsRoot), the digest the operator signs
    pub fn digest(&self) -> B256 {
        keccak256_concat(&[
            self.tx_root.as_slice(),
            self.changes_root.as_slice(),
            self.accounts_root.as_slice(),
        ])
    }
}

/// Ids assigned to a freshly appended transaction
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LedgerEntry {
    pub tx_id: TxId,
    pub slot_id: SlotId,
    pub transaction: Transaction,
}

#[derive(Clone, Debug)]
struct Trees {
    transactions: MerkleAccumulator,
    changes: MerkleAccumulator,
    accounts: MerkleAccumulator,
}

/// A participant's ledger replica
#[derive(Clone, Debug)]
pub struct Ledger {
    /// Identity this replica publishes snapshots as
    owner: Address,
    /// transactions[i] has TxId(i + 1)
    transactions: Vec<Transaction>,
    changes: BTreeMap<SlotId, TxId>,
    accounts: BTreeMap<SlotId, AccountValue>,
    next_tx_id: TxId,
    next_slot_id: SlotId,
    participants: BTreeSet<Address>,
    /// Logical clock, bumped on every mutation
    version: u64,
    policy: OddNodePolicy,
    trees: Option<Trees>,
    dirty: bool,
}

impl Ledger {
    /// Create an empty ledger owned by `owner`
    pub fn new(owner: Address) -> Self {
        Self::with_policy(owner, OddNodePolicy::default())
    }

    pub fn with_policy(owner: Address, policy: OddNodePolicy) -> Self {
        let mut participants = BTreeSet::new();
        participants.insert(owner);
        Self {
            owner,
            transactions: Vec::new(),
            changes: BTreeMap::new(),
            accounts: BTreeMap::new(),
            next_tx_id: TxId::new(1),
            next_slot_id: SlotId::new(1),
            participants,
            version: 0,
            policy,
            trees: None,
            dirty: true,
        }
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn policy(&self) -> OddNodePolicy {
        self.policy
    }

    pub fn next_tx_id(&self) -> TxId {
        self.next_tx_id
    }

    pub fn next_slot_id(&self) -> SlotId {
        self.next_slot_id
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    pub fn transaction_count(&self) -> usize {
        self.transactions.len()
    }

    /// True when update_trees() has run since the last mutation
    pub fn is_fresh(&self) -> bool {
        !self.dirty && self.trees.is_some()
    }

    // ========================================================================
    // MUTATIONS
    // ========================================================================

    /// Record a deposit by `owner` into a new slot
    pub fn add_deposit(&mut self, owner: Address, amount: U256) -> LedgerEntry {
        self.append(Transaction::deposit(owner, amount))
    }

    /// Record a withdrawal by `owner` into a new slot
    pub fn add_withdrawal(&mut self, owner: Address, amount: U256) -> LedgerEntry {
        self.append(Transaction::withdrawal(owner, amount))
    }

    fn append(&mut self, transaction: Transaction) -> LedgerEntry {
        let tx_id = self.next_tx_id;
        let slot_id = self.next_slot_id;

        self.transactions.push(transaction);
        self.changes.insert(slot_id, tx_id);
        self.accounts.insert(
            slot_id,
            AccountValue::new(transaction.lock(), transaction.amount()),
        );

        self.next_tx_id = tx_id.next();
        self.next_slot_id = slot_id.next();
        self.participants.insert(transaction.lock());
        self.touch();

        debug!(
            tx_id = %tx_id,
            slot_id = %slot_id,
            kind = %transaction.kind(),
            lock = %transaction.lock(),
            amount = %transaction.amount(),
            "ledger append"
        );

        LedgerEntry {
            tx_id,
            slot_id,
            transaction,
        }
    }

    /// Replace all collections with `snapshot`, last writer wins
    pub fn apply(&mut self, snapshot: &LedgerSnapshot) -> Result<(), LedgerError> {
        snapshot.check_consistency()?;

        self.transactions = snapshot.transactions().to_vec();
        self.changes = snapshot.changes().clone();
        self.accounts = snapshot.accounts().clone();
        self.next_tx_id = snapshot.next_tx_id();
        self.next_slot_id = snapshot.next_slot_id();
        self.participants.insert(snapshot.origin());
        self.participants
            .extend(self.accounts.values().map(AccountValue::owner));
        self.version = self.version.max(snapshot.sequence());
        self.dirty = true;

        debug!(
            origin = %snapshot.origin(),
            sequence = snapshot.sequence(),
            transactions = self.transactions.len(),
            "ledger replaced from snapshot"
        );
        Ok(())
    }

    fn touch(&mut self) {
        self.version += 1;
        self.dirty = true;
    }

    /// Rebuild the three Merkle trees from the current collections
    pub fn update_trees(&mut self) {
        let tx_leaves = self.transactions.iter().map(Transaction::digest).collect();
        let change_leaves = self.changes.values().copied().map(change_leaf).collect();
        let account_leaves = self.accounts.values().map(AccountValue::leaf).collect();

        self.trees = Some(Trees {
            transactions: MerkleAccumulator::with_policy(tx_leaves, self.policy),
            changes: MerkleAccumulator::with_policy(change_leaves, self.policy),
            accounts: MerkleAccumulator::with_policy(account_leaves, self.policy),
        });
        self.dirty = false;
    }

    // ========================================================================
    // ROOTS AND PROOFS
    // ========================================================================

    fn fresh_trees(&self) -> Result<&Trees, LedgerError> {
        match &self.trees {
            Some(trees) if !self.dirty => Ok(trees),
            _ => Err(LedgerError::StaleTree),
        }
    }

    fn root_of(&self, kind: TreeKind) -> Result<B256, LedgerError> {
        let trees = self.fresh_trees()?;
        let tree = match kind {
            TreeKind::Transactions => &trees.transactions,
            TreeKind::Changes => &trees.changes,
            TreeKind::Accounts => &trees.accounts,
        };
        tree.root().map_err(|_| LedgerError::EmptyTree(kind))
    }

    pub fn tx_root(&self) -> Result<B256, LedgerError> {
        self.root_of(TreeKind::Transactions)
    }

    pub fn changes_root(&self) -> Result<B256, LedgerError> {
        self.root_of(TreeKind::Changes)
    }

    pub fn accounts_root(&self) -> Result<B256, LedgerError> {
        self.root_of(TreeKind::Accounts)
    }

    /// All three roots, read from the same tree build
    pub fn roots(&self) -> Result<LedgerRoots, LedgerError> {
        Ok(LedgerRoots {
            tx_root: self.tx_root()?,
            changes_root: self.changes_root()?,
            accounts_root: self.accounts_root()?,
        })
    }

    /// Inclusion proof of `transaction`'s digest in the transactions tree
    pub fn tx_proof(&self, transaction: &Transaction) -> Result<Proof, LedgerError> {
        Ok(self.fresh_trees()?.transactions.proof(&transaction.digest())?)
    }

    pub fn tx_proof_by_id(&self, tx_id: TxId) -> Result<Proof, LedgerError> {
        let transaction = self
            .transaction(tx_id)
            .ok_or(LedgerError::UnknownTransaction(tx_id))?;
        self.tx_proof(&transaction)
    }

    /// Inclusion proof of a slot's account value in the accounts tree
    pub fn account_proof(&self, slot_id: SlotId) -> Result<Proof, LedgerError> {
        let trees = self.fresh_trees()?;
        let value = self
            .accounts
            .get(&slot_id)
            .ok_or(LedgerError::UnknownSlot(slot_id))?;
        Ok(trees.accounts.proof(&value.leaf())?)
    }

    /// Inclusion proof of a slot's last tx id in the changes tree
    pub fn change_proof(&self, slot_id: SlotId) -> Result<Proof, LedgerError> {
        let trees = self.fresh_trees()?;
        let tx_id = self
            .changes
            .get(&slot_id)
            .ok_or(LedgerError::UnknownSlot(slot_id))?;
        Ok(trees.changes.proof(&change_leaf(*tx_id))?)
    }

    // ========================================================================
    // READS
    // ========================================================================

    pub fn transaction(&self, tx_id: TxId) -> Option<Transaction> {
        let index = tx_id.value().checked_sub(1)?;
        self.transactions.get(usize::try_from(index).ok()?).copied()
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn account(&self, slot_id: SlotId) -> Option<AccountValue> {
        self.accounts.get(&slot_id).copied()
    }

    pub fn change(&self, slot_id: SlotId) -> Option<TxId> {
        self.changes.get(&slot_id).copied()
    }

    pub fn accounts(&self) -> impl Iterator<Item = (SlotId, AccountValue)> + '_ {
        self.accounts.iter().map(|(slot, value)| (*slot, *value))
    }

    /// Slots whose current account value belongs to `owner`
    pub fn slots_owned_by(&self, owner: &Address) -> Vec<SlotId> {
        self.accounts
            .iter()
            .filter(|(_, value)| value.owner() == *owner)
            .map(|(slot, _)| *slot)
            .collect()
    }

    /// Transaction that last wrote `slot_id`
    pub fn slot_transaction(&self, slot_id: SlotId) -> Option<(TxId, Transaction)> {
        let tx_id = self.change(slot_id)?;
        self.transaction(tx_id).map(|tx| (tx_id, tx))
    }

    // ========================================================================
    // PARTICIPANTS AND SNAPSHOTS
    // ========================================================================

    /// Register a known participant; returns false if already known
    pub fn add_participant(&mut self, participant: Address) -> bool {
        self.participants.insert(participant)
    }

    pub fn participants(&self) -> impl Iterator<Item = &Address> {
        self.participants.iter()
    }

    pub fn is_participant(&self, participant: &Address) -> bool {
        self.participants.contains(participant)
    }

    /// Immutable copy of the collections, stamped with this replica's identity and version
    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot::new(
            self.owner,
            self.version,
            self.transactions.clone(),
            self.changes.clone(),
            self.accounts.clone(),
            self.next_tx_id,
            self.next_slot_id,
        )
    }
}
