// Protocol - Frames exchanged between ledger replicas
//
// - Snapshot: full ledger contents pushed by the replica that last mutated
// - Checkpoint: the exact contents a freshly committed checkpoint covers
// - Heartbeat: liveness and version broadcast, never acknowledged

use crate::ids::CheckpointId;
use crate::ledger::LedgerSnapshot;
use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use tokio::sync::oneshot;

/// Unique identifier for a frame (for deduplication and acknowledgements)
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId([u8; 32]);

impl MessageId {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MessageId({})", hex::encode(&self.0[..8]))
    }
}

/// Types of frames in the protocol
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageType {
    Snapshot,
    Checkpoint,
    Heartbeat,
}

/// Liveness beacon carrying the sender's ledger version
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heartbeat {
    sender: Address,
    version: u64,
}

impl Heartbeat {
    pub fn new(sender: Address, version: u64) -> Self {
        Self { sender, version }
    }

    pub fn sender(&self) -> Address {
        self.sender
    }

    pub fn version(&self) -> u64 {
        self.version
    }
}

/// Ledger contents that checkpoint `checkpoint_id` commits to
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointAnnouncement {
    checkpoint_id: CheckpointId,
    snapshot: LedgerSnapshot,
}

impl CheckpointAnnouncement {
    pub fn new(checkpoint_id: CheckpointId, snapshot: LedgerSnapshot) -> Self {
        Self {
            checkpoint_id,
            snapshot,
        }
    }

    pub fn checkpoint_id(&self) -> CheckpointId {
        self.checkpoint_id
    }

    pub fn snapshot(&self) -> &LedgerSnapshot {
        &self.snapshot
    }
}

/// Wrapper for all frame types
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    Snapshot(LedgerSnapshot),
    Checkpoint(CheckpointAnnouncement),
    Heartbeat(Heartbeat),
}

impl Message {
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::Snapshot(_) => MessageType::Snapshot,
            Message::Checkpoint(_) => MessageType::Checkpoint,
            Message::Heartbeat(_) => MessageType::Heartbeat,
        }
    }

    /// Identity of the frame: sender plus logical version
    pub fn id(&self) -> MessageId {
        let mut hasher = Sha256::new();
        hasher.update(b"msg:");

        match self {
            Message::Snapshot(s) => {
                hasher.update(b"snapshot:");
                hasher.update(s.origin().as_slice());
                hasher.update(s.sequence().to_le_bytes());
            }
            Message::Checkpoint(c) => {
                hasher.update(b"checkpoint:");
                hasher.update(c.checkpoint_id.value().to_le_bytes());
                hasher.update(c.snapshot.origin().as_slice());
                hasher.update(c.snapshot.sequence().to_le_bytes());
            }
            Message::Heartbeat(h) => {
                hasher.update(b"heartbeat:");
                hasher.update(h.sender.as_slice());
                hasher.update(h.version.to_le_bytes());
            }
        }

        let result = hasher.finalize();
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&result);
        MessageId(bytes)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, postcard::Error> {
        postcard::to_allocvec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, postcard::Error> {
        postcard::from_bytes(bytes)
    }
}

// ============================================================================
// DELIVERY
// ============================================================================

/// What a replica did with a frame
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AckOutcome {
    /// Replaced local state and rebuilt trees
    Applied,
    /// Already applied this or a newer version from the same origin
    Ignored,
    /// Frame could not be decoded or failed consistency checks
    Rejected(String),
}

/// Acknowledgement returned to the broadcaster
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ack {
    pub message_id: Option<MessageId>,
    pub outcome: AckOutcome,
}

/// Encoded frame in a replica's inbox, with an optional acknowledgement slot
#[derive(Debug)]
pub struct Envelope {
    pub bytes: Vec<u8>,
    pub ack: Option<oneshot::Sender<Ack>>,
}
