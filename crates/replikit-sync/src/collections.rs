//! Typed collection facades.
//!
//! Each facade binds one CRDT type to one storage slot. Every mutation is
//! a read-modify-write of the whole CRDT state: load the current value
//! (empty on miss), apply the mutator, write it back, bump the local
//! clock, and emit a `Set` operation to the transport. Transport errors on
//! that path are swallowed — the local write is authoritative and the
//! operation rides along with the next reconciliation round instead.
//!
//! Reads are pure projections through storage. `watch()` adapts the
//! storage watch stream into typed CRDT snapshots.

use std::marker::PhantomData;
use std::sync::Arc;

use replikit::prelude::*;
use replikit_store::{Value, Watch};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::engine::SyncEngine;
use crate::error::{Result, SyncError};
use crate::hub::Hub;
use crate::protocol::{now_ms, SyncOperation};
use crate::replication::{OutboundQueue, SharedClock, SharedStorage};

/// Event broadcast on the replica's hub after every local write.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    /// The storage slot that changed.
    pub key: String,
    /// The slot's new contents (the serialized CRDT state).
    pub value: Value,
}

/// Everything a facade needs to read, write, and replicate its slot.
#[derive(Clone)]
pub(crate) struct SlotContext {
    pub(crate) name: String,
    pub(crate) replica_id: String,
    pub(crate) storage: SharedStorage,
    pub(crate) clock: SharedClock,
    pub(crate) engine: Arc<SyncEngine>,
    pub(crate) queue: OutboundQueue,
    pub(crate) events: Hub<ChangeEvent>,
}

impl SlotContext {
    /// The slot's current CRDT state, or `None` on a missing slot.
    fn load<C: DeserializeOwned>(&self) -> Result<Option<C>> {
        let value = match self.storage.lock().unwrap().get(&self.name) {
            Ok(value) => value,
            Err(_missing) => return Ok(None),
        };
        Ok(Some(serde_json::from_value(value)?))
    }

    /// Write the new CRDT state back, bump the clock, and replicate.
    ///
    /// Storage errors surface to the caller; transport errors do not — the
    /// operation is queued for the next reconciliation round instead.
    async fn commit<C: Serialize>(&self, state: &C) -> Result<()> {
        let value = serde_json::to_value(state)?;
        self.storage
            .lock()
            .unwrap()
            .set(&self.name, value.clone())?;

        let clock = {
            let mut clock = self.clock.lock().unwrap();
            clock.increment(&self.replica_id);
            clock.clone()
        };

        let operation =
            SyncOperation::set(&self.name, value.clone(), now_ms(), &self.replica_id, clock)
                .with_collection(&self.name);

        self.events
            .publish(ChangeEvent {
                key: self.name.clone(),
                value,
            })
            .await;

        if let Err(e) = self.engine.push(vec![operation.clone()]).await {
            debug!(key = %self.name, error = %e, "push failed, queueing for reconciliation");
            self.queue.lock().unwrap().push(operation);
        }
        Ok(())
    }

    fn watch<C>(&self) -> CollectionWatch<C> {
        CollectionWatch {
            inner: self.storage.lock().unwrap().watch(&self.name),
            _marker: PhantomData,
        }
    }
}

/// Typed view over a slot's watch stream: each write yields the new CRDT
/// snapshot. Writes that do not deserialize are logged and skipped.
pub struct CollectionWatch<C> {
    inner: Watch,
    _marker: PhantomData<fn() -> C>,
}

impl<C: DeserializeOwned> CollectionWatch<C> {
    /// The next CRDT snapshot.
    pub async fn next(&mut self) -> Option<C> {
        while let Some(value) = self.inner.next().await {
            match serde_json::from_value(value) {
                Ok(state) => return Some(state),
                Err(e) => warn!(error = %e, "ignoring slot value of the wrong shape"),
            }
        }
        None
    }
}

/// Last-writer-wins register bound to a slot.
#[derive(Clone)]
pub struct RegisterCollection<T> {
    ctx: SlotContext,
    _marker: PhantomData<fn() -> T>,
}

impl<T> RegisterCollection<T>
where
    T: Serialize + DeserializeOwned + Clone,
{
    pub(crate) fn new(ctx: SlotContext) -> Self {
        Self {
            ctx,
            _marker: PhantomData,
        }
    }

    /// The slot name this register is bound to.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.ctx.name
    }

    /// The register's current value, if one was ever set.
    pub fn get_value(&self) -> Result<Option<T>> {
        let register: Option<LWWRegister<T>> = self.ctx.load()?;
        Ok(register.map(|r| r.value().clone()))
    }

    /// Overwrite the value, stamped with this replica and the wall clock.
    pub async fn set_value(&self, value: T) -> Result<()> {
        let register = match self.ctx.load::<LWWRegister<T>>()? {
            Some(mut register) => {
                register.write(value, now_ms(), &self.ctx.replica_id);
                register
            }
            None => LWWRegister::new(value, now_ms(), &self.ctx.replica_id),
        };
        self.ctx.commit(&register).await
    }

    /// Watch the register's state as it changes.
    #[must_use]
    pub fn watch(&self) -> CollectionWatch<LWWRegister<T>> {
        self.ctx.watch()
    }
}

/// Grow-only set bound to a slot.
#[derive(Clone)]
pub struct SetCollection<T> {
    ctx: SlotContext,
    _marker: PhantomData<fn() -> T>,
}

impl<T> SetCollection<T>
where
    T: Serialize + DeserializeOwned + Ord + Clone,
{
    pub(crate) fn new(ctx: SlotContext) -> Self {
        Self {
            ctx,
            _marker: PhantomData,
        }
    }

    /// Add an element.
    pub async fn add(&self, value: T) -> Result<()> {
        let mut set: GSet<T> = self.ctx.load()?.unwrap_or_default();
        set.insert(value);
        self.ctx.commit(&set).await
    }

    /// Membership test.
    pub fn contains(&self, value: &T) -> Result<bool> {
        let set: Option<GSet<T>> = self.ctx.load()?;
        Ok(set.is_some_and(|s| s.contains(value)))
    }

    /// All elements, ascending.
    pub fn values(&self) -> Result<Vec<T>> {
        let set: Option<GSet<T>> = self.ctx.load()?;
        Ok(set.map(|s| s.values()).unwrap_or_default())
    }

    /// Number of elements.
    pub fn len(&self) -> Result<usize> {
        let set: Option<GSet<T>> = self.ctx.load()?;
        Ok(set.map(|s| s.len()).unwrap_or(0))
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Watch the set's state as it changes.
    #[must_use]
    pub fn watch(&self) -> CollectionWatch<GSet<T>> {
        self.ctx.watch()
    }
}

/// Two-phase set bound to a slot. Removals are permanent.
#[derive(Clone)]
pub struct TwoPhaseSetCollection<T> {
    ctx: SlotContext,
    _marker: PhantomData<fn() -> T>,
}

impl<T> TwoPhaseSetCollection<T>
where
    T: Serialize + DeserializeOwned + Ord + Clone,
{
    pub(crate) fn new(ctx: SlotContext) -> Self {
        Self {
            ctx,
            _marker: PhantomData,
        }
    }

    /// Add an element; refused if it was ever removed.
    pub async fn add(&self, value: T) -> Result<bool> {
        let mut set: TwoPSet<T> = self.ctx.load()?.unwrap_or_default();
        let added = set.insert(value);
        self.ctx.commit(&set).await?;
        Ok(added)
    }

    /// Remove an element, permanently.
    pub async fn remove(&self, value: &T) -> Result<bool> {
        let mut set: TwoPSet<T> = self.ctx.load()?.unwrap_or_default();
        let removed = set.remove(value);
        self.ctx.commit(&set).await?;
        Ok(removed)
    }

    /// Membership test.
    pub fn contains(&self, value: &T) -> Result<bool> {
        let set: Option<TwoPSet<T>> = self.ctx.load()?;
        Ok(set.is_some_and(|s| s.contains(value)))
    }

    /// Visible elements, ascending.
    pub fn values(&self) -> Result<Vec<T>> {
        let set: Option<TwoPSet<T>> = self.ctx.load()?;
        Ok(set.map(|s| s.values()).unwrap_or_default())
    }

    /// Watch the set's state as it changes.
    #[must_use]
    pub fn watch(&self) -> CollectionWatch<TwoPSet<T>> {
        self.ctx.watch()
    }
}

/// Keyed tombstone set bound to a slot: removals can be superseded by
/// later adds.
#[derive(Clone)]
pub struct TombstoneSetCollection<T> {
    ctx: SlotContext,
    _marker: PhantomData<fn() -> T>,
}

impl<T> TombstoneSetCollection<T>
where
    T: Serialize + DeserializeOwned + Clone,
{
    pub(crate) fn new(ctx: SlotContext) -> Self {
        Self {
            ctx,
            _marker: PhantomData,
        }
    }

    /// Add `value` under `id`, stamped now.
    pub async fn add(&self, id: impl Into<String>, value: T) -> Result<bool> {
        let mut set: TombstoneSet<T> = self.ctx.load()?.unwrap_or_default();
        let added = set.insert(id, value, now_ms(), &self.ctx.replica_id);
        self.ctx.commit(&set).await?;
        Ok(added)
    }

    /// Remove `id`, stamped now.
    pub async fn remove(&self, id: impl Into<String>) -> Result<bool> {
        let mut set: TombstoneSet<T> = self.ctx.load()?.unwrap_or_default();
        let removed = set.remove(id, now_ms(), &self.ctx.replica_id);
        self.ctx.commit(&set).await?;
        Ok(removed)
    }

    /// The visible value under `id`.
    pub fn get(&self, id: &str) -> Result<Option<T>> {
        let set: Option<TombstoneSet<T>> = self.ctx.load()?;
        Ok(set.and_then(|s| s.get(id).cloned()))
    }

    /// Whether `id` is visible.
    pub fn contains(&self, id: &str) -> Result<bool> {
        let set: Option<TombstoneSet<T>> = self.ctx.load()?;
        Ok(set.is_some_and(|s| s.contains(id)))
    }

    /// Visible values in ascending `(timestamp, replica)` order.
    pub fn values(&self) -> Result<Vec<T>> {
        let set: Option<TombstoneSet<T>> = self.ctx.load()?;
        Ok(set
            .map(|s| s.values().into_iter().cloned().collect())
            .unwrap_or_default())
    }

    /// Watch the set's state as it changes.
    #[must_use]
    pub fn watch(&self) -> CollectionWatch<TombstoneSet<T>> {
        self.ctx.watch()
    }
}

/// Keyed ordered set bound to a slot. Tombstones are permanent.
#[derive(Clone)]
pub struct OrderedSetCollection<T> {
    ctx: SlotContext,
    _marker: PhantomData<fn() -> T>,
}

impl<T> OrderedSetCollection<T>
where
    T: Serialize + DeserializeOwned + Clone,
{
    pub(crate) fn new(ctx: SlotContext) -> Self {
        Self {
            ctx,
            _marker: PhantomData,
        }
    }

    /// Add `value` under `id`, stamped now.
    pub async fn add(&self, id: impl Into<String>, value: T) -> Result<bool> {
        let mut set: OrderedSet<T> = self.ctx.load()?.unwrap_or_default();
        let added = set.insert(id, value, now_ms(), &self.ctx.replica_id);
        self.ctx.commit(&set).await?;
        Ok(added)
    }

    /// Remove `id`, permanently.
    pub async fn remove(&self, id: impl Into<String>) -> Result<bool> {
        let mut set: OrderedSet<T> = self.ctx.load()?.unwrap_or_default();
        let removed = set.remove(id);
        self.ctx.commit(&set).await?;
        Ok(removed)
    }

    /// The visible value under `id`.
    pub fn get(&self, id: &str) -> Result<Option<T>> {
        let set: Option<OrderedSet<T>> = self.ctx.load()?;
        Ok(set.and_then(|s| s.get(id).cloned()))
    }

    /// Visible values in ascending `(timestamp, replica)` order.
    pub fn values(&self) -> Result<Vec<T>> {
        let set: Option<OrderedSet<T>> = self.ctx.load()?;
        Ok(set
            .map(|s| s.values().into_iter().cloned().collect())
            .unwrap_or_default())
    }

    /// Watch the set's state as it changes.
    #[must_use]
    pub fn watch(&self) -> CollectionWatch<OrderedSet<T>> {
        self.ctx.watch()
    }
}

/// Observed-remove map bound to a slot.
#[derive(Clone)]
pub struct MapCollection<T> {
    ctx: SlotContext,
    _marker: PhantomData<fn() -> T>,
}

impl<T> MapCollection<T>
where
    T: Serialize + DeserializeOwned + Clone,
{
    pub(crate) fn new(ctx: SlotContext) -> Self {
        Self {
            ctx,
            _marker: PhantomData,
        }
    }

    /// Put `value` under `key`, stamped now.
    pub async fn put(&self, key: impl Into<String>, value: T) -> Result<()> {
        let mut map: ORMap<T> = self.ctx.load()?.unwrap_or_default();
        map.put(key, value, now_ms(), &self.ctx.replica_id);
        self.ctx.commit(&map).await
    }

    /// Remove `key`, stamped now.
    pub async fn remove(&self, key: &str) -> Result<bool> {
        let mut map: ORMap<T> = self.ctx.load()?.unwrap_or_default();
        let removed = map.remove(key, now_ms(), &self.ctx.replica_id);
        self.ctx.commit(&map).await?;
        Ok(removed)
    }

    /// The visible value under `key`.
    pub fn get(&self, key: &str) -> Result<Option<T>> {
        let map: Option<ORMap<T>> = self.ctx.load()?;
        Ok(map.and_then(|m| m.get(key).cloned()))
    }

    /// Visible `(key, value)` pairs in key order.
    pub fn entries(&self) -> Result<Vec<(String, T)>> {
        let map: Option<ORMap<T>> = self.ctx.load()?;
        Ok(map
            .map(|m| {
                m.iter()
                    .map(|(k, v)| (k.to_string(), v.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    /// Visible keys in key order.
    pub fn keys(&self) -> Result<Vec<String>> {
        let map: Option<ORMap<T>> = self.ctx.load()?;
        Ok(map
            .map(|m| m.keys().into_iter().map(str::to_string).collect())
            .unwrap_or_default())
    }

    /// Watch the map's state as it changes.
    #[must_use]
    pub fn watch(&self) -> CollectionWatch<ORMap<T>> {
        self.ctx.watch()
    }
}

/// Positive-negative counter bound to a slot.
#[derive(Clone)]
pub struct CounterCollection {
    ctx: SlotContext,
}

impl CounterCollection {
    pub(crate) fn new(ctx: SlotContext) -> Self {
        Self { ctx }
    }

    /// Add `amount` on behalf of this replica.
    pub async fn increment(&self, amount: u64) -> Result<()> {
        let mut counter: PNCounter = self.ctx.load()?.unwrap_or_default();
        counter.increment(&self.ctx.replica_id, amount);
        self.ctx.commit(&counter).await
    }

    /// Subtract `amount` on behalf of this replica.
    pub async fn decrement(&self, amount: u64) -> Result<()> {
        let mut counter: PNCounter = self.ctx.load()?.unwrap_or_default();
        counter.decrement(&self.ctx.replica_id, amount);
        self.ctx.commit(&counter).await
    }

    /// Current value.
    pub fn value(&self) -> Result<i64> {
        let counter: Option<PNCounter> = self.ctx.load()?;
        Ok(counter.map(|c| c.value()).unwrap_or(0))
    }

    /// Watch the counter's state as it changes.
    #[must_use]
    pub fn watch(&self) -> CollectionWatch<PNCounter> {
        self.ctx.watch()
    }
}

/// Replicated sequence bound to a slot.
#[derive(Clone)]
pub struct ListCollection<T> {
    ctx: SlotContext,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ListCollection<T>
where
    T: Serialize + DeserializeOwned + Clone,
{
    pub(crate) fn new(ctx: SlotContext) -> Self {
        Self {
            ctx,
            _marker: PhantomData,
        }
    }

    /// Append `value`, stamped now.
    pub async fn append(&self, value: T) -> Result<()> {
        let mut list: Rga<T> = self.ctx.load()?.unwrap_or_default();
        list.append(value, now_ms(), &self.ctx.replica_id);
        self.ctx.commit(&list).await
    }

    /// Insert `value` at `index`, stamped now.
    ///
    /// Fails with [`SyncError::Crdt`] when the index is out of range; the
    /// slot is left untouched.
    pub async fn insert_at(&self, index: usize, value: T) -> Result<()> {
        let mut list: Rga<T> = self.ctx.load()?.unwrap_or_default();
        list.insert_at(index, value, now_ms(), &self.ctx.replica_id)
            .map_err(|e| SyncError::Crdt(e.to_string()))?;
        self.ctx.commit(&list).await
    }

    /// Remove the element at `index`; `None` when out of range (the slot
    /// is left untouched).
    pub async fn remove_at(&self, index: usize) -> Result<Option<T>> {
        let mut list: Rga<T> = self.ctx.load()?.unwrap_or_default();
        match list.remove_at(index) {
            Some(removed) => {
                self.ctx.commit(&list).await?;
                Ok(Some(removed))
            }
            None => Ok(None),
        }
    }

    /// The element at `index`.
    pub fn get(&self, index: usize) -> Result<Option<T>> {
        let list: Option<Rga<T>> = self.ctx.load()?;
        Ok(list.and_then(|l| l.get(index).cloned()))
    }

    /// The whole sequence, in order.
    pub fn to_vec(&self) -> Result<Vec<T>> {
        let list: Option<Rga<T>> = self.ctx.load()?;
        Ok(list.map(|l| l.to_vec()).unwrap_or_default())
    }

    /// Number of elements.
    pub fn len(&self) -> Result<usize> {
        let list: Option<Rga<T>> = self.ctx.load()?;
        Ok(list.map(|l| l.len()).unwrap_or(0))
    }

    /// Whether the sequence is empty.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Watch the sequence's state as it changes.
    #[must_use]
    pub fn watch(&self) -> CollectionWatch<Rga<T>> {
        self.ctx.watch()
    }
}
