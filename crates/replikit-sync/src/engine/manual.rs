use tokio::sync::mpsc;

use crate::engine::{ConflictStream, Fanout, OperationStream, StatusStream, SyncStatus};
use crate::error::Result;
use crate::protocol::{
    DataConflict, PartialSyncConfig, ReconciliationRequest, ReconciliationResponse, SyncOperation,
};

/// The degenerate offline engine.
///
/// Every call succeeds as a local no-op: pushes are accepted and
/// discarded, pulls yield nothing, and a reconciliation round is answered
/// `accepted` echoing the client's own clock — the replica's state is
/// authoritative because there is nobody else. The status stream reports a
/// single `Offline`.
///
/// Applications drive replication themselves in this mode, feeding
/// operations obtained elsewhere through the replica's apply/integrate
/// entry points.
#[derive(Default)]
pub struct ManualSync {
    conflicts: Fanout<DataConflict>,
    incoming: Fanout<SyncOperation>,
}

impl ManualSync {
    /// Create a manual engine.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept and discard; the local write already succeeded.
    pub fn push(&self, operations: Vec<SyncOperation>) -> Result<()> {
        tracing::trace!(count = operations.len(), "manual push discarded");
        Ok(())
    }

    /// There is no server to pull from.
    pub fn pull(&self, _config: Option<PartialSyncConfig>) -> Result<Vec<SyncOperation>> {
        Ok(Vec::new())
    }

    /// Accept the client's state unchanged.
    pub fn reconcile(&self, request: ReconciliationRequest) -> Result<ReconciliationResponse> {
        Ok(ReconciliationResponse::accepted(
            request.id,
            request.client_state,
        ))
    }

    /// A stream holding the single status `Offline`.
    pub fn status(&self) -> StatusStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(SyncStatus::Offline);
        StatusStream::new(rx)
    }

    /// A stream that never yields; the manual engine reports no conflicts.
    pub fn conflicts(&self) -> ConflictStream {
        ConflictStream::new(self.conflicts.subscribe())
    }

    /// A stream that never yields; there is no server to broadcast.
    pub fn incoming(&self) -> OperationStream {
        OperationStream::new(self.incoming.subscribe())
    }
}
