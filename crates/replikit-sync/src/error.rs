use replikit_store::StorageError;
use thiserror::Error;

/// Convenience alias for results in this crate.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Everything that can go wrong between a replica and its sync server.
///
/// The variants mirror the protocol's error taxonomy. Two policies hold
/// throughout the crate: local writes never fail because of a remote error
/// (the write path swallows transport failures and queues the operation),
/// and remote application never fails local state (a bad operation is
/// logged and skipped).
#[derive(Debug, Error)]
pub enum SyncError {
    /// The transport could not open or keep a connection.
    #[error("connection error: {0}")]
    Connection(String),

    /// The engine could not be initialized from its configuration.
    #[error("initialization error: {0}")]
    Init(String),

    /// An RPC was attempted while the engine was not connected.
    #[error("not connected")]
    NotConnected,

    /// The server did not answer within the operation's deadline.
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),

    /// A push could not be delivered or acknowledged.
    #[error("send error: {0}")]
    Send(String),

    /// A pull failed or returned something unexpected.
    #[error("pull error: {0}")]
    Pull(String),

    /// A reconciliation round failed.
    #[error("reconcile error: {0}")]
    Reconcile(String),

    /// A partial-sync request failed.
    #[error("partial sync error: {0}")]
    PartialSync(String),

    /// The replica configuration is unusable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The storage backend refused an operation.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// A value could not be serialized or deserialized.
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// A CRDT invariant was violated (e.g. an out-of-range index).
    #[error("invalid operation: {0}")]
    Crdt(String),
}
