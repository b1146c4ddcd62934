// Sync module - HOW REPLICAS AGREE
// Snapshot frames, the broadcast channel, the listener that applies them and
// the archive of checkpointed contents

mod archive;
mod channel;
mod protocol;
mod replica;

pub use archive::CheckpointArchive;
pub use channel::{
    inbox, BroadcastReport, InboxReceiver, InboxSender, ReplicationChannel, SyncConfig, SyncError,
};
pub use protocol::{
    Ack, AckOutcome, CheckpointAnnouncement, Envelope, Heartbeat, Message, MessageId, MessageType,
};
pub use replica::{ReplicaListener, SyncStats};
