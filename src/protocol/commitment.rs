// Commitment - turning the ledger into signed, contract-anchored checkpoints
//
// Lifecycle of a checkpoint as seen by one participant:
//   Pending    signed locally, not yet accepted
//   Committed  contract assigned an id, roots cross-checked
//   Valid      checkpoint period elapsed without invalidation
//   Invalidated  a fraud proof halted the contract on it
//
// Each known checkpoint keeps a frozen copy of the ledger whose roots it
// commits to, so exits and fraud proofs are built against the committed
// contents rather than whatever the replica holds now. The committer announces
// those contents to every peer, whose listeners archive them by roots digest.

use crate::chain::CheckpointRecord;
use crate::identity::Signature;
use crate::ids::CheckpointId;
use crate::ledger::{Ledger, LedgerRoots};
use crate::protocol::{Participant, ProtocolError};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CheckpointState {
    Pending,
    Committed,
    Valid,
    Invalidated,
}

/// Local copy of a checkpoint
#[derive(Clone, Debug)]
pub struct Checkpoint {
    id: CheckpointId,
    roots: LedgerRoots,
    signature: Option<Signature>,
    state: CheckpointState,
    created_at: u64,
    final_at: u64,
    /// Ledger contents the roots were computed from, when this replica holds them
    contents: Option<Arc<Ledger>>,
}

impl Checkpoint {
    fn from_record(record: &CheckpointRecord) -> Self {
        Self {
            id: record.id,
            roots: record.roots(),
            signature: None,
            state: CheckpointState::Committed,
            created_at: record.created_at,
            final_at: record.final_at,
            contents: None,
        }
    }

    pub fn id(&self) -> CheckpointId {
        self.id
    }

    pub fn roots(&self) -> &LedgerRoots {
        &self.roots
    }

    /// Operator signature, known only to the participant that committed it
    pub fn signature(&self) -> Option<&Signature> {
        self.signature.as_ref()
    }

    pub fn state(&self) -> CheckpointState {
        self.state
    }

    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    pub fn final_at(&self) -> u64 {
        self.final_at
    }

    pub fn contents(&self) -> Option<&Ledger> {
        self.contents.as_deref()
    }

    /// Shared handle to the frozen contents; checkpoints with equal roots share one
    pub fn contents_handle(&self) -> Option<Arc<Ledger>> {
        self.contents.clone()
    }
}

/// Signed roots waiting for the contract to accept them
#[derive(Clone, Debug)]
pub struct PendingCheckpoint {
    pub roots: LedgerRoots,
    pub signature: Signature,
}

// ============================================================================
// CHECKPOINT BOOK
// ============================================================================

/// Append-only map of every checkpoint this participant knows about
#[derive(Clone, Debug, Default)]
pub struct CheckpointBook {
    checkpoints: BTreeMap<CheckpointId, Checkpoint>,
    pending: Option<PendingCheckpoint>,
}

impl CheckpointBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: CheckpointId) -> Option<&Checkpoint> {
        self.checkpoints.get(&id)
    }

    pub fn latest(&self) -> Option<&Checkpoint> {
        self.checkpoints.values().next_back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Checkpoint> {
        self.checkpoints.values()
    }

    pub fn len(&self) -> usize {
        self.checkpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checkpoints.is_empty()
    }

    /// Roots signed but not yet accepted, if the last commit did not complete
    pub fn pending(&self) -> Option<&PendingCheckpoint> {
        self.pending.as_ref()
    }

    pub fn state_of(&self, id: CheckpointId) -> Option<CheckpointState> {
        self.checkpoints.get(&id).map(Checkpoint::state)
    }

    fn insert(&mut self, checkpoint: Checkpoint) {
        self.checkpoints.insert(checkpoint.id, checkpoint);
    }

    pub(crate) fn mark_invalidated(&mut self, id: CheckpointId) {
        if let Some(checkpoint) = self.checkpoints.get_mut(&id) {
            checkpoint.state = CheckpointState::Invalidated;
        }
    }
}

// ============================================================================
// COMMITMENT PROTOCOL
// ============================================================================

impl Participant {
    /// Sign the current roots, anchor them on-chain and replicate the committed state
    pub async fn make_checkpoint(&mut self) -> Result<Checkpoint, ProtocolError> {
        self.ensure_not_halted().await?;

        let (roots, frozen) = {
            let mut ledger = self.ledger.lock().await;
            ledger.update_trees();
            (ledger.roots()?, ledger.clone())
        };
        let digest = roots.digest();

        let signature = self.signer.sign(self.address, digest).await?;
        self.checkpoints.pending = Some(PendingCheckpoint { roots, signature });
        debug!(digest = %digest, "checkpoint signed");

        let id = self
            .contract
            .checkpoint(roots.tx_root, roots.changes_root, roots.accounts_root, signature)
            .await?;

        let record = self
            .contract
            .checkpoint_record(id)
            .await?
            .ok_or(ProtocolError::not_found("checkpoint", id.value()))?;
        if self.config.verify_committed_roots && record.roots().digest() != digest {
            warn!(checkpoint_id = %id, "contract stored different roots than were signed");
            return Err(ProtocolError::DigestMismatch {
                local: digest,
                remote: record.roots().digest(),
            });
        }

        let frozen = self.archive.store(frozen).await?;
        let mut checkpoint = Checkpoint::from_record(&record);
        checkpoint.roots = roots;
        checkpoint.signature = Some(signature);
        checkpoint.contents = Some(Arc::clone(&frozen));
        self.checkpoints.insert(checkpoint.clone());
        self.checkpoints.pending = None;

        info!(
            checkpoint_id = %id,
            tx_root = %roots.tx_root,
            changes_root = %roots.changes_root,
            accounts_root = %roots.accounts_root,
            "checkpoint committed"
        );

        self.channel
            .announce_checkpoint(id, &frozen.snapshot())
            .await?;
        Ok(checkpoint)
    }

    /// Bring the local copy of checkpoint `id` up to date with the contract
    ///
    /// Learns checkpoints committed by others. Contents come from the archive
    /// when they were announced, otherwise from the live ledger if it holds
    /// exactly the committed roots.
    pub async fn refresh_checkpoint(
        &mut self,
        id: CheckpointId,
    ) -> Result<CheckpointState, ProtocolError> {
        let record = self
            .contract
            .checkpoint_record(id)
            .await?
            .ok_or(ProtocolError::not_found("checkpoint", id.value()))?;
        let now = self.contract.now().await?;

        let state = if record.invalidated {
            CheckpointState::Invalidated
        } else if now >= record.final_at {
            CheckpointState::Valid
        } else {
            CheckpointState::Committed
        };

        let mut checkpoint = match self.checkpoints.get(id) {
            Some(known) => known.clone(),
            None => Checkpoint::from_record(&record),
        };
        checkpoint.state = state;

        if checkpoint.contents.is_none() {
            checkpoint.contents = match self.archive.get(&record.roots()).await {
                Some(frozen) => Some(frozen),
                None => self.freeze_if_current(&record.roots()).await?,
            };
        }

        self.checkpoints.insert(checkpoint);
        debug!(checkpoint_id = %id, state = ?state, "checkpoint refreshed");
        Ok(state)
    }

    async fn freeze_if_current(
        &self,
        roots: &LedgerRoots,
    ) -> Result<Option<Arc<Ledger>>, ProtocolError> {
        let current = {
            let mut ledger = self.ledger.lock().await;
            ledger.update_trees();
            if ledger.roots().ok().as_ref() != Some(roots) {
                return Ok(None);
            }
            ledger.clone()
        };
        Ok(Some(self.archive.store(current).await?))
    }

    /// Refresh every checkpoint the contract has issued up to the latest one
    pub async fn track_checkpoints(&mut self) -> Result<usize, ProtocolError> {
        let latest = match self.contract.latest_checkpoint().await? {
            Some(id) => id.value(),
            None => return Ok(0),
        };
        for id in 1..=latest {
            self.refresh_checkpoint(CheckpointId::new(id)).await?;
        }
        Ok(latest as usize)
    }

    /// Frozen ledger contents of checkpoint `id`
    ///
    /// Fails with `DigestMismatch` when the replica never held the committed
    /// contents, so nothing can be proven against that checkpoint from here.
    pub async fn checkpoint_contents(
        &mut self,
        id: CheckpointId,
    ) -> Result<Arc<Ledger>, ProtocolError> {
        if self.checkpoints.get(id).and_then(Checkpoint::contents).is_none() {
            self.refresh_checkpoint(id).await?;
        }

        let checkpoint = self
            .checkpoints
            .get(id)
            .ok_or(ProtocolError::not_found("checkpoint", id.value()))?;
        match checkpoint.contents_handle() {
            Some(ledger) => Ok(ledger),
            None => {
                let local = self.ledger.lock().await.roots()?.digest();
                Err(ProtocolError::DigestMismatch {
                    local,
                    remote: checkpoint.roots().digest(),
                })
            }
        }
    }
}
