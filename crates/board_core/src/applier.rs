//! Optimistic mutation applier.
//!
//! A mutation is applied to the in-memory snapshot synchronously and then
//! persisted by a spawned task. Every entity key has a lane in the ledger:
//! the writes in flight for that key, in issue order, each holding the value
//! the key had before it. A write waits for the earlier writes on each of its
//! keys before touching storage, so one key reaches storage in issue order.
//!
//! When a write fails its rollback image goes to the next write on the same
//! key, if there is one, because storage still holds that image. Otherwise
//! the key is restored locally. A failed write never overwrites newer local
//! state.

use std::{
    collections::{BTreeSet, HashMap, VecDeque},
    sync::{Arc, Mutex, PoisonError, RwLock},
};

use futures::future::join_all;
use shared::{
    domain::{CollectionId, Container, EntityKey, Item},
    protocol::{BoardEvent, MutationTag},
};
use storage::{Filter, OrderBy, Record, RecordStore, Table};
use tokio::{
    sync::{broadcast, oneshot},
    task::JoinHandle,
};
use tracing::{debug, error, info, warn};

use crate::{
    config::EngineConfig,
    error::EngineError,
    mutation::{Mutation, WriteOp},
    snapshot::BoardSnapshot,
};

/// Handle on the persistence of one applied mutation.
#[derive(Debug)]
pub struct PendingWrite {
    inner: PendingInner,
}

#[derive(Debug)]
enum PendingInner {
    Settled,
    Spawned {
        tag: MutationTag,
        handle: JoinHandle<Result<(), EngineError>>,
    },
}

impl PendingWrite {
    pub(crate) fn noop() -> Self {
        Self {
            inner: PendingInner::Settled,
        }
    }

    pub fn tag(&self) -> Option<&MutationTag> {
        match &self.inner {
            PendingInner::Settled => None,
            PendingInner::Spawned { tag, .. } => Some(tag),
        }
    }

    /// True when the call changed nothing and nothing was written.
    pub fn is_noop(&self) -> bool {
        matches!(self.inner, PendingInner::Settled)
    }

    /// Waits for the write to reach storage, or for its rollback.
    pub async fn settled(self) -> Result<(), EngineError> {
        match self.inner {
            PendingInner::Settled => Ok(()),
            PendingInner::Spawned { tag, handle } => match handle.await {
                Ok(result) => result,
                Err(err) => {
                    error!(mutation = %tag, "applier: persist task lost: {err}");
                    Err(EngineError::Aborted(tag))
                }
            },
        }
    }
}

#[derive(Debug)]
struct InflightWrite {
    ticket: u64,
    image: Option<Record>,
}

#[derive(Debug, Default)]
struct KeyLane {
    pending: VecDeque<InflightWrite>,
    /// Completes when the newest write on this key has settled.
    tail: Option<oneshot::Receiver<()>>,
}

#[derive(Debug, Default)]
struct Ledger {
    next_ticket: u64,
    lanes: HashMap<EntityKey, KeyLane>,
}

impl Ledger {
    /// Queues `ticket` on every key and returns what it must wait for, plus
    /// the senders that release its successors.
    fn enqueue(
        &mut self,
        ticket: u64,
        images: Vec<(EntityKey, Option<Record>)>,
    ) -> (Vec<oneshot::Receiver<()>>, Vec<oneshot::Sender<()>>) {
        let mut waits = Vec::new();
        let mut releases = Vec::with_capacity(images.len());
        for (key, image) in images {
            let lane = self.lanes.entry(key).or_default();
            let (release, tail) = oneshot::channel();
            if let Some(previous) = lane.tail.replace(tail) {
                waits.push(previous);
            }
            lane.pending.push_back(InflightWrite { ticket, image });
            releases.push(release);
        }
        (waits, releases)
    }

    fn image(&self, key: EntityKey, ticket: u64) -> Option<Record> {
        self.lanes
            .get(&key)
            .and_then(|lane| lane.pending.iter().find(|write| write.ticket == ticket))
            .and_then(|write| write.image.clone())
    }

    /// Drops `ticket` from the lane of `key`. On failure the image moves to
    /// the next write in the lane; the image comes back only when there is
    /// no such write and the key must be restored locally.
    fn settle(&mut self, key: EntityKey, ticket: u64, failed: bool) -> Option<Option<Record>> {
        let lane = self.lanes.get_mut(&key)?;
        let position = lane.pending.iter().position(|write| write.ticket == ticket)?;
        let write = lane.pending.remove(position)?;

        let restore = if !failed {
            None
        } else if let Some(next) = lane.pending.get_mut(position) {
            next.image = write.image;
            None
        } else {
            Some(write.image)
        };
        if lane.pending.is_empty() {
            self.lanes.remove(&key);
        }
        restore
    }

    fn is_pinned(&self, key: EntityKey) -> bool {
        self.lanes.contains_key(&key)
    }
}

pub struct Applier {
    store: Arc<dyn RecordStore>,
    config: EngineConfig,
    state: RwLock<Arc<BoardSnapshot>>,
    ledger: Mutex<Ledger>,
    events: broadcast::Sender<BoardEvent>,
}

impl Applier {
    pub fn new(store: Arc<dyn RecordStore>, config: EngineConfig) -> Arc<Self> {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Arc::new(Self {
            store,
            config,
            state: RwLock::new(Arc::new(BoardSnapshot::default())),
            ledger: Mutex::new(Ledger {
                next_ticket: 1,
                lanes: HashMap::new(),
            }),
            events,
        })
    }

    pub fn snapshot(&self) -> Arc<BoardSnapshot> {
        Arc::clone(&self.state.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<BoardEvent> {
        self.events.subscribe()
    }

    /// Plans against the current snapshot and applies the result, with no
    /// other mutation in between. Must run inside a tokio runtime.
    pub fn apply_with<F>(self: &Arc<Self>, plan: F) -> Result<PendingWrite, EngineError>
    where
        F: FnOnce(&BoardSnapshot) -> Result<Option<Mutation>, EngineError>,
    {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let Some(mutation) = plan(&**state)? else {
            return Ok(PendingWrite::noop());
        };

        let keys: Vec<EntityKey> = mutation.keys().into_iter().collect();
        let images: Vec<(EntityKey, Option<Record>)> =
            keys.iter().map(|key| (*key, state.record(*key))).collect();
        let next = Arc::new(state.with_changes(&mutation.changes));
        let version = next.version();
        *state = next;

        let (tag, waits, releases) = {
            let mut ledger = self.ledger.lock().unwrap_or_else(PoisonError::into_inner);
            let ticket = ledger.next_ticket;
            ledger.next_ticket += 1;
            let (waits, releases) = ledger.enqueue(ticket, images);
            let tag = MutationTag {
                ticket,
                kind: mutation.kind,
            };
            (tag, waits, releases)
        };
        drop(state);

        debug!(
            mutation = %tag,
            version,
            keys = keys.len(),
            steps = mutation.steps.len(),
            "applier: applied locally"
        );
        let _ = self.events.send(BoardEvent::SnapshotChanged { version });

        let applier = Arc::clone(self);
        let task_tag = tag.clone();
        let handle = tokio::spawn(async move {
            join_all(waits).await;
            let result = applier.persist(&task_tag, &mutation, &keys).await;
            applier.settle(&task_tag, &keys, &result);
            drop(releases);
            result
        });

        Ok(PendingWrite {
            inner: PendingInner::Spawned { tag, handle },
        })
    }

    /// Replaces the collection's entities with the stored rows. Keys with
    /// writes in flight keep their local value.
    pub async fn load_collection(&self, collection_id: CollectionId) -> Result<(), EngineError> {
        let containers: Vec<Container> = self
            .store
            .select(
                Table::Containers,
                Filter::Collection(collection_id),
                OrderBy::Order,
            )
            .await
            .map_err(|source| EngineError::Load { source })?
            .into_iter()
            .filter_map(Record::into_container)
            .collect();
        let items: Vec<Item> = self
            .store
            .select(Table::Items, Filter::Collection(collection_id), OrderBy::Order)
            .await
            .map_err(|source| EngineError::Load { source })?
            .into_iter()
            .filter_map(Record::into_item)
            .collect();

        let (container_count, item_count) = (containers.len(), items.len());
        let version = {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            let ledger = self.ledger.lock().unwrap_or_else(PoisonError::into_inner);
            let next = state.with_collection(collection_id, containers, items, |key| {
                ledger.is_pinned(key)
            });
            let version = next.version();
            *state = Arc::new(next);
            version
        };
        info!(
            collection_id = collection_id.0,
            containers = container_count,
            items = item_count,
            "applier: collection loaded"
        );
        let _ = self.events.send(BoardEvent::SnapshotChanged { version });
        Ok(())
    }

    /// Inserts a new row and merges the stored result. Creation is not
    /// optimistic: the snapshot only changes once the store assigned an id.
    pub async fn insert(&self, record: Record) -> Result<Record, EngineError> {
        let table = record.table();
        let stored = self
            .store
            .insert(record)
            .await
            .map_err(|source| EngineError::Create { table, source })?;
        let version = {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            let next = match stored.clone() {
                Record::Item(item) => state.with_item(item),
                Record::Container(container) => state.with_container(container),
            };
            let version = next.version();
            *state = Arc::new(next);
            version
        };
        debug!(table = %stored.table(), id = stored.raw_id(), "applier: record created");
        let _ = self.events.send(BoardEvent::SnapshotChanged { version });
        Ok(stored)
    }

    async fn persist(
        &self,
        tag: &MutationTag,
        mutation: &Mutation,
        keys: &[EntityKey],
    ) -> Result<(), EngineError> {
        for (index, step) in mutation.steps.iter().enumerate() {
            let cause = match self.execute_with_retry(tag, index, &step.op).await {
                Ok(()) => continue,
                Err(cause) => cause,
            };
            return Err(self.compensate(tag, mutation, keys, index, cause).await);
        }
        Ok(())
    }

    async fn execute_with_retry(
        &self,
        tag: &MutationTag,
        index: usize,
        op: &WriteOp,
    ) -> anyhow::Result<()> {
        let attempts = self.config.retry_attempts + 1;
        let mut attempt = 1;
        loop {
            match op.execute(self.store.as_ref()).await {
                Ok(()) => return Ok(()),
                Err(err) if attempt < attempts => {
                    warn!(
                        mutation = %tag,
                        step = index,
                        attempt,
                        "applier: write step failed, retrying: {err:#}"
                    );
                    attempt += 1;
                    tokio::time::sleep(self.config.retry_delay()).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Undoes steps `0..failed_step` in reverse, putting every key they
    /// touched back to its rollback image. Each restore gets the same retries
    /// as a forward step, and every restore is attempted even after one
    /// fails; the first failure is reported.
    async fn compensate(
        &self,
        tag: &MutationTag,
        mutation: &Mutation,
        keys: &[EntityKey],
        failed_step: usize,
        cause: anyhow::Error,
    ) -> EngineError {
        let images: HashMap<EntityKey, Option<Record>> = {
            let ledger = self.ledger.lock().unwrap_or_else(PoisonError::into_inner);
            keys.iter()
                .map(|key| (*key, ledger.image(*key, tag.ticket)))
                .collect()
        };

        let mut restored = BTreeSet::new();
        let mut first_failure = None;
        for (index, step) in mutation.steps[..failed_step].iter().enumerate().rev() {
            for key in &step.touches {
                if !restored.insert(*key) {
                    continue;
                }
                let image = images.get(key).and_then(Option::as_ref);
                let Some(op) = WriteOp::restoring(*key, image, mutation.removes(*key)) else {
                    continue;
                };
                if let Err(source) = self.execute_with_retry(tag, index, &op).await {
                    error!(
                        mutation = %tag,
                        failed_step,
                        key = %key,
                        "applier: compensation failed, storage is partially written: {source:#}"
                    );
                    if first_failure.is_none() {
                        first_failure = Some(source);
                    }
                }
            }
        }

        if let Some(source) = first_failure {
            return EngineError::CascadeIntegrity {
                mutation: tag.clone(),
                failed_step,
                cause: format!("{cause:#}"),
                source,
            };
        }
        if failed_step > 0 {
            warn!(mutation = %tag, failed_step, "applier: completed steps compensated");
        }
        EngineError::Persistence {
            mutation: tag.clone(),
            source: cause,
        }
    }

    fn settle(&self, tag: &MutationTag, keys: &[EntityKey], result: &Result<(), EngineError>) {
        let failed = result.is_err();
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let restores: Vec<(EntityKey, Option<Record>)> = {
            let mut ledger = self.ledger.lock().unwrap_or_else(PoisonError::into_inner);
            keys.iter()
                .filter_map(|key| {
                    ledger
                        .settle(*key, tag.ticket, failed)
                        .map(|image| (*key, image))
                })
                .collect()
        };

        let Err(err) = result else {
            drop(state);
            debug!(mutation = %tag, "applier: write confirmed");
            let _ = self.events.send(BoardEvent::WriteConfirmed {
                mutation: tag.clone(),
            });
            return;
        };

        let rolled_back = if restores.is_empty() {
            None
        } else {
            let next = state.with_restored(&restores);
            let version = next.version();
            *state = Arc::new(next);
            Some(version)
        };
        drop(state);

        error!(
            mutation = %tag,
            restored = restores.len(),
            superseded = keys.len() - restores.len(),
            "applier: write failed: {err}"
        );
        if let Some(version) = rolled_back {
            let _ = self.events.send(BoardEvent::SnapshotChanged { version });
            let _ = self.events.send(BoardEvent::RolledBack {
                mutation: tag.clone(),
                version,
            });
        }
        let _ = self.events.send(BoardEvent::WriteFailed {
            mutation: tag.clone(),
            error: err.report(),
        });
    }
}

#[cfg(test)]
#[path = "tests/applier_tests.rs"]
mod tests;
