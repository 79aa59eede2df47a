//! Sync transports.
//!
//! [`SyncEngine`] is the closed set of transports a replica can run on:
//! a WebSocket connection to a sync server, or the degenerate manual mode
//! where every call succeeds locally and nothing leaves the process.

mod manual;
mod websocket;

pub use manual::ManualSync;
pub use websocket::{WebSocketConfig, WebSocketSync};

use std::sync::Mutex;

use tokio::sync::mpsc;

use crate::error::{Result, SyncError};
use crate::protocol::{
    DataConflict, PartialSyncConfig, ReconciliationRequest, ReconciliationResponse, SyncOperation,
};

/// Coarse sync state reported on the status stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    /// Connected and idle.
    Online,
    /// Not connected.
    Offline,
    /// A push or reconciliation round is in flight.
    Syncing,
}

/// Fine-grained connection lifecycle, as seen by the transport itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection and none being attempted.
    Disconnected,
    /// A connection attempt is in flight.
    Connecting,
    /// Connected and idle.
    Online,
    /// Connected with a push or reconcile round in flight.
    Syncing,
    /// Unexpectedly closed; waiting out the backoff before retrying.
    Reconnecting,
}

impl ConnectionState {
    /// Whether RPCs may be issued in this state.
    #[must_use]
    pub fn is_connected(self) -> bool {
        matches!(self, ConnectionState::Online | ConnectionState::Syncing)
    }
}

/// Fan-out of values to any number of unbounded channel subscribers.
pub(crate) struct Fanout<T> {
    senders: Mutex<Vec<mpsc::UnboundedSender<T>>>,
}

impl<T: Clone> Default for Fanout<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> Fanout<T> {
    pub(crate) fn new() -> Self {
        Self {
            senders: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn subscribe(&self) -> mpsc::UnboundedReceiver<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.senders.lock().unwrap().push(tx);
        rx
    }

    pub(crate) fn emit(&self, value: T) {
        self.senders
            .lock()
            .unwrap()
            .retain(|tx| tx.send(value.clone()).is_ok());
    }
}

/// Lazy stream of [`SyncStatus`] transitions.
pub struct StatusStream {
    rx: mpsc::UnboundedReceiver<SyncStatus>,
}

impl StatusStream {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<SyncStatus>) -> Self {
        Self { rx }
    }

    /// The next status transition.
    pub async fn next(&mut self) -> Option<SyncStatus> {
        self.rx.recv().await
    }

    /// The next queued transition, if one is pending.
    pub fn try_next(&mut self) -> Option<SyncStatus> {
        self.rx.try_recv().ok()
    }
}

/// Lazy stream of server-reported [`DataConflict`]s.
pub struct ConflictStream {
    rx: mpsc::UnboundedReceiver<DataConflict>,
}

impl ConflictStream {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<DataConflict>) -> Self {
        Self { rx }
    }

    /// The next reported conflict.
    pub async fn next(&mut self) -> Option<DataConflict> {
        self.rx.recv().await
    }

    /// The next queued conflict, if one is pending.
    pub fn try_next(&mut self) -> Option<DataConflict> {
        self.rx.try_recv().ok()
    }
}

/// Lazy stream of server-initiated operation broadcasts.
pub struct OperationStream {
    rx: mpsc::UnboundedReceiver<SyncOperation>,
}

impl OperationStream {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<SyncOperation>) -> Self {
        Self { rx }
    }

    /// The next broadcast operation.
    pub async fn next(&mut self) -> Option<SyncOperation> {
        self.rx.recv().await
    }

    /// The next queued operation, if one is pending.
    pub fn try_next(&mut self) -> Option<SyncOperation> {
        self.rx.try_recv().ok()
    }
}

/// The transports a replica can run on.
///
/// A closed enum rather than a trait object: the set of transports is part
/// of the engine's contract, and matching keeps every call site free of
/// dynamic dispatch.
pub enum SyncEngine {
    /// Framed JSON over a WebSocket connection.
    WebSocket(WebSocketSync),
    /// Degenerate offline engine; see [`ManualSync`].
    Manual(ManualSync),
}

impl SyncEngine {
    /// Open the connection (no-op in manual mode).
    pub async fn connect(&self) -> Result<()> {
        match self {
            SyncEngine::WebSocket(ws) => ws.connect().await,
            SyncEngine::Manual(_) => Ok(()),
        }
    }

    /// Close the connection (no-op in manual mode). Infallible.
    pub async fn disconnect(&self) {
        match self {
            SyncEngine::WebSocket(ws) => ws.disconnect().await,
            SyncEngine::Manual(_) => {}
        }
    }

    /// Deliver operations to the server and wait for the ack.
    pub async fn push(&self, operations: Vec<SyncOperation>) -> Result<()> {
        match self {
            SyncEngine::WebSocket(ws) => ws.push(operations).await,
            SyncEngine::Manual(m) => m.push(operations),
        }
    }

    /// Fetch operations from the server.
    pub async fn pull(&self, config: Option<PartialSyncConfig>) -> Result<Vec<SyncOperation>> {
        match self {
            SyncEngine::WebSocket(ws) => ws.pull(config).await,
            SyncEngine::Manual(m) => m.pull(config),
        }
    }

    /// Run a reconciliation round.
    pub async fn reconcile(&self, request: ReconciliationRequest) -> Result<ReconciliationResponse> {
        match self {
            SyncEngine::WebSocket(ws) => ws.reconcile(request).await,
            SyncEngine::Manual(m) => m.reconcile(request),
        }
    }

    /// Install a partial-sync selection on the server.
    pub async fn partial_sync(&self, config: PartialSyncConfig) -> Result<()> {
        match self {
            SyncEngine::WebSocket(ws) => ws.partial_sync(config).await,
            SyncEngine::Manual(_) => Err(SyncError::PartialSync(
                "manual engine has no server to configure".into(),
            )),
        }
    }

    /// Subscribe to status transitions.
    pub fn status(&self) -> StatusStream {
        match self {
            SyncEngine::WebSocket(ws) => ws.status(),
            SyncEngine::Manual(m) => m.status(),
        }
    }

    /// Subscribe to server-reported conflicts.
    pub fn conflicts(&self) -> ConflictStream {
        match self {
            SyncEngine::WebSocket(ws) => ws.conflicts(),
            SyncEngine::Manual(m) => m.conflicts(),
        }
    }

    /// Subscribe to server-initiated operation broadcasts.
    pub fn incoming(&self) -> OperationStream {
        match self {
            SyncEngine::WebSocket(ws) => ws.incoming(),
            SyncEngine::Manual(m) => m.incoming(),
        }
    }

    /// The transport's current lifecycle state.
    pub fn connection_state(&self) -> ConnectionState {
        match self {
            SyncEngine::WebSocket(ws) => ws.connection_state(),
            SyncEngine::Manual(_) => ConnectionState::Disconnected,
        }
    }

    /// Whether this is the manual (offline) engine.
    #[must_use]
    pub fn is_manual(&self) -> bool {
        matches!(self, SyncEngine::Manual(_))
    }
}
