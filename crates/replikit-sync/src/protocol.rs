//! Wire protocol types.
//!
//! Everything that crosses the transport is JSON-shaped: an envelope per
//! operation ([`SyncOperation`]), the reconciliation request/response pair,
//! and the framed messages themselves ([`ClientMessage`] /
//! [`ServerMessage`]), tagged by a `type` field. Field names are camelCase
//! and tags kebab-case on the wire.

use replikit::VectorClock;
use replikit_store::Value;
use serde::{Deserialize, Serialize};

/// Fresh identifier for envelopes and requests.
pub(crate) fn fresh_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Current wall clock in milliseconds.
pub(crate) fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// What a [`SyncOperation`] does to its storage slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    /// Write `value` to the slot.
    Set,
    /// Delete the slot.
    Delete,
    /// Carry an authoritative server clock.
    Reconcile,
}

/// The envelope carried by the transport for every replicated mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOperation {
    /// Fresh per envelope.
    pub id: String,
    /// What to do with the slot.
    pub kind: OperationKind,
    /// Storage slot name.
    pub key: String,
    /// Present for `Set`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// Wall-clock milliseconds at emission.
    pub timestamp: i64,
    /// The replica that originated the operation.
    pub replica: String,
    /// The sender's vector clock at emission.
    pub clock: VectorClock,
    /// Authoritative clock, present for `Reconcile`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_clock: Option<VectorClock>,
    /// Per-operation clock, present for `Reconcile`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub op_vector: Option<VectorClock>,
    /// Optional partial-sync collection tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
    /// Optional partial-sync tags.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    /// Optional partial-sync scope.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl SyncOperation {
    /// A `Set` of `key` to `value`, originated by `replica` at the given
    /// clock.
    pub fn set(
        key: impl Into<String>,
        value: Value,
        timestamp: i64,
        replica: impl Into<String>,
        clock: VectorClock,
    ) -> Self {
        Self {
            id: fresh_id(),
            kind: OperationKind::Set,
            key: key.into(),
            value: Some(value),
            timestamp,
            replica: replica.into(),
            clock,
            server_clock: None,
            op_vector: None,
            collection: None,
            tags: None,
            scope: None,
        }
    }

    /// A `Delete` of `key`, originated by `replica` at the given clock.
    pub fn delete(
        key: impl Into<String>,
        timestamp: i64,
        replica: impl Into<String>,
        clock: VectorClock,
    ) -> Self {
        Self {
            id: fresh_id(),
            kind: OperationKind::Delete,
            key: key.into(),
            value: None,
            timestamp,
            replica: replica.into(),
            clock,
            server_clock: None,
            op_vector: None,
            collection: None,
            tags: None,
            scope: None,
        }
    }

    /// Tag the operation with a collection name for partial sync.
    #[must_use]
    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }
}

/// Selection criteria for a partial pull.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialSyncConfig {
    /// Restrict to these collections.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collections: Option<Vec<String>>,
    /// Restrict to operations carrying any of these tags.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    /// Restrict to one scope.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Only operations stamped after this time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<i64>,
    /// At most this many operations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
}

/// How the server resolved a reported conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictResolution {
    /// Keep the client's value.
    Client,
    /// Take the server's value.
    Server,
    /// Combine both values; the replica's conflict merger decides how.
    Merge,
}

/// One conflicting key in a [`ReconciliationResponse`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportedConflict {
    /// The storage slot in conflict.
    pub key: String,
    /// The client-side value, if the client had one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_value: Option<Value>,
    /// The server-side value, if the server has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_value: Option<Value>,
    /// The server's resolution choice.
    pub resolution: ConflictResolution,
}

/// A client-initiated reconciliation round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationRequest {
    /// Fresh request id, echoed by the response.
    pub id: String,
    /// Locally queued operations the server has not seen.
    pub operations: Vec<SyncOperation>,
    /// The client's current vector clock.
    pub client_state: VectorClock,
    /// The requesting replica.
    pub replica_id: String,
    /// Wall-clock milliseconds at emission.
    pub timestamp: i64,
}

impl ReconciliationRequest {
    /// Build a request with a fresh id, stamped now.
    pub fn new(
        operations: Vec<SyncOperation>,
        client_state: VectorClock,
        replica_id: impl Into<String>,
    ) -> Self {
        Self {
            id: fresh_id(),
            operations,
            client_state,
            replica_id: replica_id.into(),
            timestamp: now_ms(),
        }
    }
}

/// Outcome of a reconciliation round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconciliationStatus {
    /// The server accepted the client's operations.
    Accepted,
    /// The server accepted some state but reports conflicts.
    Conflict,
    /// The server rejected the round.
    Rejected,
}

/// The server's answer to a [`ReconciliationRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationResponse {
    /// Echo of the request id.
    pub id: String,
    /// Round outcome.
    pub status: ReconciliationStatus,
    /// Operations the client is missing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_operations: Option<Vec<SyncOperation>>,
    /// Authoritative clock after the round.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_state: Option<VectorClock>,
    /// Keys the server resolved on the client's behalf.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conflicts: Option<Vec<ReportedConflict>>,
}

impl ReconciliationResponse {
    /// An `Accepted` response echoing the given state, with no extras.
    pub fn accepted(id: impl Into<String>, resolved_state: VectorClock) -> Self {
        Self {
            id: id.into(),
            status: ReconciliationStatus::Accepted,
            server_operations: None,
            resolved_state: Some(resolved_state),
            conflicts: None,
        }
    }
}

/// A divergence surfaced to conflict-stream observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataConflict {
    /// The storage slot in conflict.
    pub key: String,
    /// The local value at detection time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_value: Option<Value>,
    /// The remote value at detection time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_value: Option<Value>,
    /// Wall-clock milliseconds at detection.
    pub timestamp: i64,
}

/// Client-to-server frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    /// Deliver local operations; answered by `ack`.
    Push {
        /// Request id, echoed by the ack.
        id: String,
        /// The operations to deliver.
        operations: Vec<SyncOperation>,
    },
    /// Ask for operations; answered by `operations`.
    Pull {
        /// Request id, echoed by the response.
        id: String,
        /// Optional partial-sync selection.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        config: Option<PartialSyncConfig>,
    },
    /// Start a reconciliation round; answered by `reconcile-response`.
    /// The request is flattened into the frame.
    Reconcile(ReconciliationRequest),
    /// Configure partial sync; answered by `partial-sync-complete`.
    PartialSync {
        /// The selection to install.
        config: PartialSyncConfig,
    },
}

/// Server-to-client frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// Acknowledges a `push`.
    Ack {
        /// Echo of the push id.
        id: String,
    },
    /// Operations for the client: a pull answer when `request_id` is
    /// present, a server-initiated broadcast otherwise.
    #[serde(rename_all = "camelCase")]
    Operations {
        /// Echo of the pull id; absent on broadcast.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
        /// The delivered operations.
        operations: Vec<SyncOperation>,
    },
    /// Answers a `reconcile`.
    ReconcileResponse {
        /// Echo of the request id.
        id: String,
        /// The round's outcome.
        response: ReconciliationResponse,
    },
    /// Acknowledges a `partial-sync`.
    PartialSyncComplete,
    /// Server-detected conflict, delivered out of band.
    Conflict {
        /// The conflict payload.
        conflict: DataConflict,
    },
}
