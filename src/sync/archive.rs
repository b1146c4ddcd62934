// Checkpoint Archive - frozen ledgers keyed by the roots a checkpoint committed to
//
// Filled by the committing participant and by replica listeners receiving
// checkpoint announcements. Ledgers with identical roots share one allocation.

use crate::ledger::{Ledger, LedgerError, LedgerRoots};
use alloy_primitives::B256;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Clone, Debug, Default)]
pub struct CheckpointArchive {
    ledgers: Arc<Mutex<HashMap<B256, Arc<Ledger>>>>,
}

impl CheckpointArchive {
    pub fn new() -> Self {
        Self::default()
    }

    /// Freeze `ledger` under the digest of its roots
    ///
    /// Returns the ledger already archived under the same roots if there is
    /// one. Fails with `StaleTree` unless the trees were rebuilt after the last
    /// mutation.
    pub async fn store(&self, ledger: Ledger) -> Result<Arc<Ledger>, LedgerError> {
        let digest = ledger.roots()?.digest();
        let mut ledgers = self.ledgers.lock().await;
        let frozen = ledgers.entry(digest).or_insert_with(|| {
            debug!(digest = %digest, "ledger archived");
            Arc::new(ledger)
        });
        Ok(Arc::clone(frozen))
    }

    pub async fn get(&self, roots: &LedgerRoots) -> Option<Arc<Ledger>> {
        self.ledgers.lock().await.get(&roots.digest()).cloned()
    }

    pub async fn len(&self) -> usize {
        self.ledgers.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.ledgers.lock().await.is_empty()
    }
}
