//! Replica configuration.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use replikit_store::Value;

use crate::error::{Result, SyncError};
use crate::protocol::{ReportedConflict, SyncOperation};

/// Which storage backend the replica runs on.
///
/// Durable backends implement `replikit_store::Storage` outside this crate
/// and are installed with [`ReplicaConfig::with_storage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageKind {
    /// The in-tree `MemoryStorage`.
    #[default]
    Memory,
}

/// Which transport the replica syncs over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncKind {
    /// No transport; every sync call is a local no-op.
    #[default]
    Manual,
    /// Framed JSON over a WebSocket connection; requires `sync_url`.
    WebSocket,
}

/// Veto hook over incoming operations. Returning `false` skips the
/// operation (logged, never an error).
pub type OperationHook = Arc<dyn Fn(&SyncOperation) -> bool + Send + Sync>;

/// Per-key merger consulted when the server resolves a conflict with
/// `merge`. Returning `None` falls back to the server's value.
pub type ConflictMerger = Arc<dyn Fn(&ReportedConflict) -> Option<Value> + Send + Sync>;

/// Authorization extension point. Carried by the replica and exposed to
/// application hooks; no policy is enforced in-tree.
#[derive(Debug, Clone, Default)]
pub struct AuthorizationConfig {
    /// Whether the application enforces authorization.
    pub enabled: bool,
    /// Subject assumed when an operation carries none.
    pub default_subject: Option<String>,
}

/// Business-logic extension point: veto hooks over incoming operations.
///
/// The global hook sees every operation; a collection hook sees the
/// operations tagged with its collection name (falling back to the storage
/// key for untagged operations).
#[derive(Clone, Default)]
pub struct BusinessHooks {
    /// Applied to every incoming operation.
    pub global: Option<OperationHook>,
    /// Applied per collection tag.
    pub collections: HashMap<String, OperationHook>,
}

impl BusinessHooks {
    pub(crate) fn allows(&self, operation: &SyncOperation) -> bool {
        if let Some(global) = &self.global {
            if !global(operation) {
                return false;
            }
        }
        let name = operation
            .collection
            .as_deref()
            .unwrap_or(operation.key.as_str());
        match self.collections.get(name) {
            Some(hook) => hook(operation),
            None => true,
        }
    }
}

impl fmt::Debug for BusinessHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BusinessHooks")
            .field("global", &self.global.is_some())
            .field("collections", &self.collections.keys())
            .finish()
    }
}

/// Everything needed to open a [`Replica`](crate::Replica).
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use replikit_sync::ReplicaConfig;
///
/// let config = ReplicaConfig::new("replica-1")
///     .with_websocket("ws://localhost:4000/sync")
///     .with_auto_sync(Duration::from_secs(5));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Clone)]
pub struct ReplicaConfig {
    /// Stable, unique identifier for this replica.
    pub replica_id: String,
    /// Storage backend selection.
    pub storage: StorageKind,
    /// Transport selection.
    pub sync: SyncKind,
    /// Sync server URL; required iff `sync` is WebSocket.
    pub sync_url: Option<String>,
    /// When set (and the transport is not manual), the pull loop runs at
    /// this interval and the reconcile loop at five times it.
    pub auto_sync_interval: Option<Duration>,
    /// Authorization extension point.
    pub authorization: Option<AuthorizationConfig>,
    /// Business-logic veto hooks.
    pub business_logic: BusinessHooks,
    /// Merger consulted for `merge`-resolved conflicts.
    pub conflict_merger: Option<ConflictMerger>,
}

impl ReplicaConfig {
    /// Manual sync over memory storage, no background loops.
    pub fn new(replica_id: impl Into<String>) -> Self {
        Self {
            replica_id: replica_id.into(),
            storage: StorageKind::Memory,
            sync: SyncKind::Manual,
            sync_url: None,
            auto_sync_interval: None,
            authorization: None,
            business_logic: BusinessHooks::default(),
            conflict_merger: None,
        }
    }

    /// Sync over a WebSocket connection to `url`.
    #[must_use]
    pub fn with_websocket(mut self, url: impl Into<String>) -> Self {
        self.sync = SyncKind::WebSocket;
        self.sync_url = Some(url.into());
        self
    }

    /// Enable the background pull/reconcile loops at `interval`.
    #[must_use]
    pub fn with_auto_sync(mut self, interval: Duration) -> Self {
        self.auto_sync_interval = Some(interval);
        self
    }

    /// Install the authorization extension point.
    #[must_use]
    pub fn with_authorization(mut self, authorization: AuthorizationConfig) -> Self {
        self.authorization = Some(authorization);
        self
    }

    /// Install a global veto hook over incoming operations.
    #[must_use]
    pub fn with_global_hook(mut self, hook: OperationHook) -> Self {
        self.business_logic.global = Some(hook);
        self
    }

    /// Install a veto hook for one collection.
    #[must_use]
    pub fn with_collection_hook(mut self, collection: impl Into<String>, hook: OperationHook) -> Self {
        self.business_logic.collections.insert(collection.into(), hook);
        self
    }

    /// Install the per-key merger used for `merge`-resolved conflicts.
    #[must_use]
    pub fn with_conflict_merger(mut self, merger: ConflictMerger) -> Self {
        self.conflict_merger = Some(merger);
        self
    }

    /// Check the configuration for internal consistency.
    pub fn validate(&self) -> Result<()> {
        if self.replica_id.is_empty() {
            return Err(SyncError::InvalidConfig(
                "replica_id must be a non-empty, stable identifier".into(),
            ));
        }
        match (self.sync, &self.sync_url) {
            (SyncKind::WebSocket, None) => Err(SyncError::InvalidConfig(
                "sync_url is required for websocket sync".into(),
            )),
            (SyncKind::Manual, Some(_)) => Err(SyncError::InvalidConfig(
                "sync_url is only meaningful for websocket sync".into(),
            )),
            _ => Ok(()),
        }
    }
}

impl fmt::Debug for ReplicaConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplicaConfig")
            .field("replica_id", &self.replica_id)
            .field("storage", &self.storage)
            .field("sync", &self.sync)
            .field("sync_url", &self.sync_url)
            .field("auto_sync_interval", &self.auto_sync_interval)
            .field("authorization", &self.authorization)
            .field("business_logic", &self.business_logic)
            .field("conflict_merger", &self.conflict_merger.is_some())
            .finish()
    }
}
