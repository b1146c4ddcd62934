// Ledger module - THE COMMITTED STATE
// Transactions, slot changes and account values, and the Merkle roots derived from them

mod snapshot;
mod state;
mod transaction;

pub use snapshot::{LedgerSnapshot, SnapshotError};
pub use state::{Ledger, LedgerEntry, LedgerError, LedgerRoots, TreeKind};
pub use transaction::{
    change_leaf, deposit_digest, transaction_digest, AccountValue, Transaction, TxKind,
    DEPOSIT_TAG, WITHDRAWAL_TAG,
};
