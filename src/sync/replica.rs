// Replica Listener - drains one inbox and applies snapshots to the local ledger
//
// Snapshots replace the ledger wholesale. A frame whose (origin, sequence) is
// not newer than the last one applied from that origin is dropped.
// Checkpoint frames are additionally frozen into the archive, even when the
// live ledger has already moved past them.

use crate::ledger::{Ledger, LedgerSnapshot};
use crate::sync::archive::CheckpointArchive;
use crate::sync::channel::InboxReceiver;
use crate::sync::protocol::{Ack, AckOutcome, CheckpointAnnouncement, Envelope, Message};
use alloy_primitives::Address;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Statistics about one replica's inbound traffic
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub frames_received: u64,
    pub snapshots_applied: u64,
    pub checkpoints_archived: u64,
    pub duplicates_dropped: u64,
    pub frames_rejected: u64,
    pub heartbeats_received: u64,
}

/// Owns the receiving end of a replica inbox
pub struct ReplicaListener {
    ledger: Arc<Mutex<Ledger>>,
    inbox: InboxReceiver,
    archive: Option<CheckpointArchive>,
    /// Highest sequence applied per origin
    applied: HashMap<Address, u64>,
    /// Latest version announced per peer
    heartbeats: HashMap<Address, u64>,
    stats: SyncStats,
}

impl ReplicaListener {
    pub fn new(ledger: Arc<Mutex<Ledger>>, inbox: InboxReceiver) -> Self {
        Self {
            ledger,
            inbox,
            archive: None,
            applied: HashMap::new(),
            heartbeats: HashMap::new(),
            stats: SyncStats::default(),
        }
    }

    /// Freeze announced checkpoint contents into `archive`
    pub fn with_archive(mut self, archive: CheckpointArchive) -> Self {
        self.archive = Some(archive);
        self
    }

    pub fn stats(&self) -> &SyncStats {
        &self.stats
    }

    /// Last version a peer announced by heartbeat
    pub fn peer_version(&self, peer: &Address) -> Option<u64> {
        self.heartbeats.get(peer).copied()
    }

    /// Process frames until every sender is dropped
    pub async fn run(mut self) -> SyncStats {
        while let Some(envelope) = self.inbox.recv().await {
            self.handle(envelope).await;
        }
        self.stats
    }

    /// Run on a background task; the handle yields final stats once the inbox closes
    pub fn spawn(self) -> JoinHandle<SyncStats> {
        tokio::spawn(self.run())
    }

    /// Process a single frame and acknowledge it if the sender asked
    pub async fn handle(&mut self, envelope: Envelope) {
        self.stats.frames_received += 1;

        let (message_id, outcome) = match Message::from_bytes(&envelope.bytes) {
            Ok(message) => {
                let id = message.id();
                (Some(id), self.process(message).await)
            }
            Err(e) => {
                self.stats.frames_rejected += 1;
                warn!(error = %e, "undecodable replication frame");
                (None, AckOutcome::Rejected(format!("decode: {e}")))
            }
        };

        if let Some(ack) = envelope.ack {
            // Broadcaster may have timed out and gone away
            let _ = ack.send(Ack {
                message_id,
                outcome,
            });
        }
    }

    async fn process(&mut self, message: Message) -> AckOutcome {
        match message {
            Message::Heartbeat(heartbeat) => {
                self.stats.heartbeats_received += 1;
                self.heartbeats.insert(heartbeat.sender(), heartbeat.version());
                AckOutcome::Applied
            }
            Message::Snapshot(snapshot) => self.apply_snapshot(&snapshot).await,
            Message::Checkpoint(announcement) => {
                if let Err(reason) = self.archive_checkpoint(&announcement).await {
                    self.stats.frames_rejected += 1;
                    return AckOutcome::Rejected(reason);
                }
                self.apply_snapshot(announcement.snapshot()).await
            }
        }
    }

    async fn apply_snapshot(&mut self, snapshot: &LedgerSnapshot) -> AckOutcome {
        let origin = snapshot.origin();
        let sequence = snapshot.sequence();

        if matches!(self.applied.get(&origin), Some(last) if *last >= sequence) {
            self.stats.duplicates_dropped += 1;
            debug!(origin = %origin, sequence, "stale snapshot dropped");
            return AckOutcome::Ignored;
        }

        let mut ledger = self.ledger.lock().await;
        if let Err(e) = ledger.apply(snapshot) {
            self.stats.frames_rejected += 1;
            warn!(origin = %origin, sequence, error = %e, "snapshot rejected");
            return AckOutcome::Rejected(e.to_string());
        }
        ledger.update_trees();
        drop(ledger);

        self.applied.insert(origin, sequence);
        self.stats.snapshots_applied += 1;
        debug!(origin = %origin, sequence, "snapshot applied");
        AckOutcome::Applied
    }

    async fn archive_checkpoint(&mut self, announcement: &CheckpointAnnouncement) -> Result<(), String> {
        let Some(archive) = &self.archive else {
            return Ok(());
        };

        let (owner, policy) = {
            let ledger = self.ledger.lock().await;
            (ledger.owner(), ledger.policy())
        };
        let mut frozen = Ledger::with_policy(owner, policy);
        frozen.apply(announcement.snapshot()).map_err(|e| e.to_string())?;
        frozen.update_trees();
        archive.store(frozen).await.map_err(|e| {
            warn!(checkpoint_id = %announcement.checkpoint_id(), error = %e, "checkpoint not archived");
            e.to_string()
        })?;

        self.stats.checkpoints_archived += 1;
        debug!(checkpoint_id = %announcement.checkpoint_id(), "checkpoint contents archived");
        Ok(())
    }
}
