// Replication Channel - pushes ledger snapshots into every peer's inbox
//
// A broadcast encodes the frame once, hands a copy to each peer together
// with a oneshot acknowledgement slot, then waits for every peer to report
// back. The caller only proceeds once all replicas have applied (or already
// hold) the snapshot.

use crate::ids::CheckpointId;
use crate::ledger::{LedgerError, LedgerSnapshot};
use crate::sync::protocol::{
    Ack, AckOutcome, CheckpointAnnouncement, Envelope, Heartbeat, Message, MessageId,
};
use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// Sending half of a replica inbox
pub type InboxSender = mpsc::Sender<Envelope>;
/// Receiving half of a replica inbox
pub type InboxReceiver = mpsc::Receiver<Envelope>;

/// Replication errors
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Encoding failed: {0}")]
    Encode(String),

    #[error("Decoding failed: {0}")]
    Decode(String),

    #[error("Message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },

    #[error("Peer {0} is unreachable")]
    PeerUnreachable(Address),

    #[error("Peer {0} did not acknowledge in time")]
    AckTimeout(Address),

    #[error("Peer {peer} rejected the snapshot: {reason}")]
    Rejected { peer: Address, reason: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Configuration for replication
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SyncConfig {
    /// How long to wait for each peer's acknowledgement
    pub ack_timeout_ms: u64,
    /// Buffered frames per inbox
    pub inbox_capacity: usize,
    /// Largest encoded frame accepted for sending
    pub max_message_size: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            ack_timeout_ms: 5_000,
            inbox_capacity: 64,
            max_message_size: 4 * 1024 * 1024,
        }
    }
}

impl SyncConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ack_timeout_ms(mut self, ms: u64) -> Self {
        self.ack_timeout_ms = ms;
        self
    }

    pub fn with_inbox_capacity(mut self, capacity: usize) -> Self {
        self.inbox_capacity = capacity;
        self
    }

    pub fn with_max_message_size(mut self, bytes: usize) -> Self {
        self.max_message_size = bytes;
        self
    }

    pub fn validate(&self) -> Result<(), SyncError> {
        if self.ack_timeout_ms == 0 {
            return Err(SyncError::InvalidConfig("ack_timeout_ms must be > 0".into()));
        }
        if self.inbox_capacity == 0 {
            return Err(SyncError::InvalidConfig("inbox_capacity must be > 0".into()));
        }
        if self.max_message_size == 0 {
            return Err(SyncError::InvalidConfig("max_message_size must be > 0".into()));
        }
        Ok(())
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }
}

/// Create a bounded inbox for one replica
pub fn inbox(config: &SyncConfig) -> (InboxSender, InboxReceiver) {
    mpsc::channel(config.inbox_capacity)
}

/// Result of a completed broadcast
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub message_id: Option<MessageId>,
    pub applied: Vec<Address>,
    pub ignored: Vec<Address>,
}

impl BroadcastReport {
    pub fn peers_reached(&self) -> usize {
        self.applied.len() + self.ignored.len()
    }
}

/// Fan-out of ledger snapshots to peer replicas
#[derive(Clone, Debug)]
pub struct ReplicationChannel {
    local: Address,
    config: SyncConfig,
    peers: BTreeMap<Address, InboxSender>,
}

impl ReplicationChannel {
    pub fn new(local: Address, config: SyncConfig) -> Self {
        Self {
            local,
            config,
            peers: BTreeMap::new(),
        }
    }

    pub fn local(&self) -> Address {
        self.local
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Register a peer's inbox; the local identity is never its own peer
    pub fn add_peer(&mut self, peer: Address, sender: InboxSender) -> bool {
        if peer == self.local {
            return false;
        }
        self.peers.insert(peer, sender).is_none()
    }

    pub fn remove_peer(&mut self, peer: &Address) -> bool {
        self.peers.remove(peer).is_some()
    }

    pub fn peers(&self) -> impl Iterator<Item = &Address> {
        self.peers.keys()
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    fn encode(&self, message: &Message) -> Result<Vec<u8>, SyncError> {
        let bytes = message
            .to_bytes()
            .map_err(|e| SyncError::Encode(e.to_string()))?;
        if bytes.len() > self.config.max_message_size {
            return Err(SyncError::MessageTooLarge {
                size: bytes.len(),
                max: self.config.max_message_size,
            });
        }
        Ok(bytes)
    }

    /// Push `snapshot` to every peer and wait until each has acknowledged it
    pub async fn broadcast(&self, snapshot: &LedgerSnapshot) -> Result<BroadcastReport, SyncError> {
        debug!(
            origin = %snapshot.origin(),
            sequence = snapshot.sequence(),
            "snapshot broadcast"
        );
        self.deliver(Message::Snapshot(snapshot.clone())).await
    }

    /// Push the contents checkpoint `checkpoint_id` commits to; replicas archive
    /// them and apply them like any other snapshot
    pub async fn announce_checkpoint(
        &self,
        checkpoint_id: CheckpointId,
        snapshot: &LedgerSnapshot,
    ) -> Result<BroadcastReport, SyncError> {
        debug!(
            checkpoint_id = %checkpoint_id,
            origin = %snapshot.origin(),
            sequence = snapshot.sequence(),
            "checkpoint announced"
        );
        self.deliver(Message::Checkpoint(CheckpointAnnouncement::new(
            checkpoint_id,
            snapshot.clone(),
        )))
        .await
    }

    async fn deliver(&self, message: Message) -> Result<BroadcastReport, SyncError> {
        let message_id = message.id();
        let bytes = self.encode(&message)?;

        let mut pending: Vec<(Address, oneshot::Receiver<Ack>)> = Vec::with_capacity(self.peers.len());
        for (peer, sender) in &self.peers {
            let (ack_tx, ack_rx) = oneshot::channel();
            let envelope = Envelope {
                bytes: bytes.clone(),
                ack: Some(ack_tx),
            };
            sender
                .send(envelope)
                .await
                .map_err(|_| SyncError::PeerUnreachable(*peer))?;
            pending.push((*peer, ack_rx));
        }
        debug!(
            message_id = ?message_id,
            peers = pending.len(),
            size = bytes.len(),
            "frame sent"
        );

        let mut report = BroadcastReport {
            message_id: Some(message_id),
            ..Default::default()
        };
        for (peer, ack_rx) in pending {
            let ack = match tokio::time::timeout(self.config.ack_timeout(), ack_rx).await {
                Ok(Ok(ack)) => ack,
                Ok(Err(_)) => return Err(SyncError::PeerUnreachable(peer)),
                Err(_) => {
                    warn!(peer = %peer, "acknowledgement timed out");
                    return Err(SyncError::AckTimeout(peer));
                }
            };
            match ack.outcome {
                AckOutcome::Applied => report.applied.push(peer),
                AckOutcome::Ignored => report.ignored.push(peer),
                AckOutcome::Rejected(reason) => {
                    warn!(peer = %peer, reason = %reason, "frame rejected");
                    return Err(SyncError::Rejected { peer, reason });
                }
            }
        }

        Ok(report)
    }

    /// Fire-and-forget liveness beacon; peers that are gone are skipped
    pub async fn heartbeat(&self, version: u64) -> Result<usize, SyncError> {
        let bytes = self.encode(&Message::Heartbeat(Heartbeat::new(self.local, version)))?;
        let mut delivered = 0;
        for sender in self.peers.values() {
            let envelope = Envelope {
                bytes: bytes.clone(),
                ack: None,
            };
            if sender.send(envelope).await.is_ok() {
                delivered += 1;
            }
        }
        Ok(delivered)
    }
}
