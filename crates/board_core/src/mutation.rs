use std::collections::BTreeSet;

use anyhow::Result;
use shared::{
    domain::{Container, ContainerId, EntityKey, Item, ItemId},
    protocol::MutationKind,
};
use storage::{ContainerPatch, Filter, ItemPatch, Patch, Record, RecordStore, Table};

/// Local effect of a mutation on the in-memory snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    PutItem(Item),
    PutContainer(Container),
    RemoveItem(ItemId),
    RemoveContainer(ContainerId),
}

impl Change {
    pub fn key(&self) -> EntityKey {
        match self {
            Change::PutItem(item) => EntityKey::Item(item.id),
            Change::PutContainer(container) => EntityKey::Container(container.id),
            Change::RemoveItem(id) => EntityKey::Item(*id),
            Change::RemoveContainer(id) => EntityKey::Container(*id),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    Insert(Record),
    Update { table: Table, id: i64, patch: Patch },
    Delete { table: Table, filter: Filter },
}

impl WriteOp {
    pub async fn execute(&self, store: &dyn RecordStore) -> Result<()> {
        match self {
            WriteOp::Insert(record) => store.insert(record.clone()).await.map(|_| ()),
            WriteOp::Update { table, id, patch } => store.update(*table, *id, patch.clone()).await,
            WriteOp::Delete { table, filter } => store.delete(*table, *filter).await.map(|_| ()),
        }
    }

    /// Write that puts `key` back to `image` in storage. `removed` tells
    /// whether the failed mutation deleted the row.
    pub fn restoring(key: EntityKey, image: Option<&Record>, removed: bool) -> Option<Self> {
        match (image, removed) {
            (Some(record), true) => Some(WriteOp::Insert(record.clone())),
            (Some(Record::Item(item)), false) => Some(WriteOp::Update {
                table: Table::Items,
                id: item.id.0,
                patch: Patch::Item(ItemPatch::full(item)),
            }),
            (Some(Record::Container(container)), false) => Some(WriteOp::Update {
                table: Table::Containers,
                id: container.id.0,
                patch: Patch::Container(ContainerPatch::full(container)),
            }),
            (None, false) => Some(match key {
                EntityKey::Item(id) => WriteOp::Delete {
                    table: Table::Items,
                    filter: Filter::Id(id.0),
                },
                EntityKey::Container(id) => WriteOp::Delete {
                    table: Table::Containers,
                    filter: Filter::Id(id.0),
                },
            }),
            (None, true) => None,
        }
    }
}

/// One persisted write together with the entities it affects.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteStep {
    pub op: WriteOp,
    pub touches: Vec<EntityKey>,
}

/// A planned structural change: what the snapshot gains or loses, and the
/// ordered writes that make storage agree. The steps form one logical
/// transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct Mutation {
    pub kind: MutationKind,
    pub changes: Vec<Change>,
    pub steps: Vec<WriteStep>,
}

impl Mutation {
    pub fn new(kind: MutationKind) -> Self {
        Self {
            kind,
            changes: Vec::new(),
            steps: Vec::new(),
        }
    }

    pub fn put_item(&mut self, item: Item) {
        self.steps.push(WriteStep {
            op: WriteOp::Update {
                table: Table::Items,
                id: item.id.0,
                patch: Patch::Item(ItemPatch::full(&item)),
            },
            touches: vec![EntityKey::Item(item.id)],
        });
        self.changes.push(Change::PutItem(item));
    }

    pub fn put_container(&mut self, container: Container) {
        self.steps.push(WriteStep {
            op: WriteOp::Update {
                table: Table::Containers,
                id: container.id.0,
                patch: Patch::Container(ContainerPatch::full(&container)),
            },
            touches: vec![EntityKey::Container(container.id)],
        });
        self.changes.push(Change::PutContainer(container));
    }

    /// Removes `ids` locally and deletes rows matching `filter` in one write.
    pub fn remove_items(&mut self, filter: Filter, ids: impl IntoIterator<Item = ItemId>) {
        let ids: Vec<ItemId> = ids.into_iter().collect();
        self.steps.push(WriteStep {
            op: WriteOp::Delete {
                table: Table::Items,
                filter,
            },
            touches: ids.iter().copied().map(EntityKey::Item).collect(),
        });
        self.changes.extend(ids.into_iter().map(Change::RemoveItem));
    }

    pub fn remove_containers(
        &mut self,
        filter: Filter,
        ids: impl IntoIterator<Item = ContainerId>,
    ) {
        let ids: Vec<ContainerId> = ids.into_iter().collect();
        self.steps.push(WriteStep {
            op: WriteOp::Delete {
                table: Table::Containers,
                filter,
            },
            touches: ids.iter().copied().map(EntityKey::Container).collect(),
        });
        self.changes.extend(ids.into_iter().map(Change::RemoveContainer));
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty() && self.steps.is_empty()
    }

    /// Every entity the mutation changes locally or writes, sorted.
    pub fn keys(&self) -> BTreeSet<EntityKey> {
        self.changes
            .iter()
            .map(Change::key)
            .chain(self.steps.iter().flat_map(|step| step.touches.iter().copied()))
            .collect()
    }

    pub fn removes(&self, key: EntityKey) -> bool {
        self.changes.iter().any(|change| {
            matches!(change, Change::RemoveItem(_) | Change::RemoveContainer(_))
                && change.key() == key
        })
    }

    pub(crate) fn into_option(self) -> Option<Self> {
        (!self.is_empty()).then_some(self)
    }
}
