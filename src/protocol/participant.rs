// Participant - one party's machine: identity, ledger replica and injected collaborators
//
// Protocol operations live in commitment.rs, exit.rs and dispute.rs as further
// impl blocks on Participant.

use crate::chain::PlasmoidContract;
use crate::identity::SigningClient;
use crate::ledger::{Ledger, LedgerEntry};
use crate::merkle::OddNodePolicy;
use crate::protocol::commitment::CheckpointBook;
use crate::protocol::exit::ExitBook;
use crate::protocol::ProtocolError;
use crate::sync::{
    inbox, BroadcastReport, CheckpointArchive, InboxSender, ReplicaListener, ReplicationChannel,
    SyncConfig, SyncError, SyncStats,
};
use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tracing::warn;

// ============================================================================
// PARTICIPANT CONFIG
// ============================================================================

/// Configuration for a participant
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ParticipantConfig {
    /// Replication settings for this participant's channel
    pub sync: SyncConfig,
    /// Cross-check roots the contract stored against the roots we signed
    pub verify_committed_roots: bool,
    /// Broadcast the ledger after every local append
    pub replicate_on_append: bool,
    /// Odd-level convention of every Merkle tree this participant builds
    pub odd_node_policy: OddNodePolicy,
}

impl Default for ParticipantConfig {
    fn default() -> Self {
        Self {
            sync: SyncConfig::default(),
            verify_committed_roots: true,
            replicate_on_append: true,
            odd_node_policy: OddNodePolicy::default(),
        }
    }
}

impl ParticipantConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sync(mut self, sync: SyncConfig) -> Self {
        self.sync = sync;
        self
    }

    pub fn with_verify_committed_roots(mut self, verify: bool) -> Self {
        self.verify_committed_roots = verify;
        self
    }

    pub fn with_replicate_on_append(mut self, replicate: bool) -> Self {
        self.replicate_on_append = replicate;
        self
    }

    pub fn with_odd_node_policy(mut self, policy: OddNodePolicy) -> Self {
        self.odd_node_policy = policy;
        self
    }

    pub fn validate(&self) -> Result<(), ProtocolError> {
        self.sync
            .validate()
            .map_err(|e| ProtocolError::InvalidConfig(e.to_string()))
    }
}

// ============================================================================
// PARTICIPANT
// ============================================================================

pub struct Participant {
    pub(crate) address: Address,
    pub(crate) config: ParticipantConfig,
    pub(crate) ledger: Arc<Mutex<Ledger>>,
    pub(crate) channel: ReplicationChannel,
    pub(crate) contract: Arc<dyn PlasmoidContract>,
    pub(crate) signer: Arc<dyn SigningClient>,
    pub(crate) checkpoints: CheckpointBook,
    pub(crate) archive: CheckpointArchive,
    pub(crate) exits: ExitBook,
}

impl Participant {
    /// Create a participant with an empty ledger replica
    pub fn new(
        address: Address,
        config: ParticipantConfig,
        contract: Arc<dyn PlasmoidContract>,
        signer: Arc<dyn SigningClient>,
    ) -> Result<Self, ProtocolError> {
        config.validate()?;
        let ledger = Ledger::with_policy(address, config.odd_node_policy);
        Ok(Self {
            address,
            channel: ReplicationChannel::new(address, config.sync.clone()),
            config,
            ledger: Arc::new(Mutex::new(ledger)),
            contract,
            signer,
            checkpoints: CheckpointBook::new(),
            archive: CheckpointArchive::new(),
            exits: ExitBook::new(),
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn config(&self) -> &ParticipantConfig {
        &self.config
    }

    pub fn contract(&self) -> &Arc<dyn PlasmoidContract> {
        &self.contract
    }

    /// Shared handle to this participant's ledger replica
    pub fn ledger_handle(&self) -> Arc<Mutex<Ledger>> {
        Arc::clone(&self.ledger)
    }

    pub async fn ledger(&self) -> MutexGuard<'_, Ledger> {
        self.ledger.lock().await
    }

    pub fn checkpoints(&self) -> &CheckpointBook {
        &self.checkpoints
    }

    /// Frozen contents of every checkpoint this participant committed or was announced
    pub fn archive(&self) -> &CheckpointArchive {
        &self.archive
    }

    pub fn exits(&self) -> &ExitBook {
        &self.exits
    }

    pub fn channel(&self) -> &ReplicationChannel {
        &self.channel
    }

    // ========================================================================
    // REPLICATION
    // ========================================================================

    /// Inbox for this participant's replica plus the listener that drains it
    pub fn open_inbox(&self) -> (InboxSender, ReplicaListener) {
        let (sender, receiver) = inbox(&self.config.sync);
        let listener =
            ReplicaListener::new(self.ledger_handle(), receiver).with_archive(self.archive.clone());
        (sender, listener)
    }

    /// Register a peer's inbox and record the peer as a known participant
    pub async fn connect(&mut self, peer: Address, sender: InboxSender) {
        if self.channel.add_peer(peer, sender) {
            self.ledger.lock().await.add_participant(peer);
        }
    }

    /// Push a snapshot of the local ledger to every peer and wait for their acknowledgements
    pub async fn sync(&self) -> Result<BroadcastReport, ProtocolError> {
        Ok(self.broadcast_ledger().await?)
    }

    async fn broadcast_ledger(&self) -> Result<BroadcastReport, SyncError> {
        let snapshot = self.ledger.lock().await.snapshot();
        self.channel.broadcast(&snapshot).await
    }

    /// Fails with `Halted` once the contract has accepted a fraud proof
    pub async fn ensure_not_halted(&self) -> Result<(), ProtocolError> {
        if self.contract.halted().await? {
            warn!(participant = %self.address, "action refused: contract halted");
            return Err(ProtocolError::Halted);
        }
        Ok(())
    }

    /// Append a deposit to the local ledger, replicating if configured
    pub async fn record_deposit(
        &self,
        owner: Address,
        amount: U256,
    ) -> Result<LedgerEntry, ProtocolError> {
        let entry = self.append(|ledger| ledger.add_deposit(owner, amount)).await;
        self.replicate_if_configured().await?;
        Ok(entry)
    }

    /// Append a withdrawal to the local ledger, replicating if configured
    pub async fn record_withdrawal(
        &self,
        owner: Address,
        amount: U256,
    ) -> Result<LedgerEntry, ProtocolError> {
        let entry = self.append(|ledger| ledger.add_withdrawal(owner, amount)).await;
        self.replicate_if_configured().await?;
        Ok(entry)
    }

    /// Mutate and rebuild the trees under one lock, so the ledger is never
    /// observed stale after a local append
    pub(crate) async fn append(&self, add: impl FnOnce(&mut Ledger) -> LedgerEntry) -> LedgerEntry {
        let mut ledger = self.ledger.lock().await;
        let entry = add(&mut ledger);
        ledger.update_trees();
        entry
    }

    pub(crate) async fn replicate_if_configured(&self) -> Result<(), SyncError> {
        if self.config.replicate_on_append {
            self.broadcast_ledger().await?;
        }
        Ok(())
    }
}

/// Wire every participant to every other one and spawn their replica listeners
pub async fn connect_mesh(participants: &mut [Participant]) -> Vec<JoinHandle<SyncStats>> {
    let mut inboxes = Vec::with_capacity(participants.len());
    let mut handles = Vec::with_capacity(participants.len());
    for participant in participants.iter() {
        let (sender, listener) = participant.open_inbox();
        inboxes.push((participant.address(), sender));
        handles.push(listener.spawn());
    }

    for participant in participants.iter_mut() {
        for (peer, sender) in &inboxes {
            participant.connect(*peer, sender.clone()).await;
        }
    }
    handles
}
