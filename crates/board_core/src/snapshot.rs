use std::collections::BTreeMap;

use shared::domain::{CollectionId, Container, ContainerId, EntityKey, Item, ItemId};
use storage::Record;

use crate::mutation::Change;

/// Immutable copy of every loaded container and item.
///
/// Snapshots are shared behind `Arc` and never edited in place: each
/// mutation derives a new one with a higher `version`. Equality compares
/// content only, so a rolled-back snapshot equals the one it restores.
#[derive(Debug, Clone, Default)]
pub struct BoardSnapshot {
    version: u64,
    containers: BTreeMap<ContainerId, Container>,
    items: BTreeMap<ItemId, Item>,
}

impl PartialEq for BoardSnapshot {
    fn eq(&self, other: &Self) -> bool {
        self.containers == other.containers && self.items == other.items
    }
}

impl BoardSnapshot {
    pub fn new(
        containers: impl IntoIterator<Item = Container>,
        items: impl IntoIterator<Item = Item>,
    ) -> Self {
        Self {
            version: 0,
            containers: containers.into_iter().map(|c| (c.id, c)).collect(),
            items: items.into_iter().map(|i| (i.id, i)).collect(),
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn item(&self, id: ItemId) -> Option<&Item> {
        self.items.get(&id)
    }

    pub fn container(&self, id: ContainerId) -> Option<&Container> {
        self.containers.get(&id)
    }

    pub fn items(&self) -> impl Iterator<Item = &Item> {
        self.items.values()
    }

    pub fn containers(&self) -> impl Iterator<Item = &Container> {
        self.containers.values()
    }

    pub fn items_in_collection(&self, collection_id: CollectionId) -> impl Iterator<Item = &Item> {
        self.items
            .values()
            .filter(move |item| item.collection_id == collection_id)
    }

    pub fn containers_in_collection(
        &self,
        collection_id: CollectionId,
    ) -> impl Iterator<Item = &Container> {
        self.containers
            .values()
            .filter(move |container| container.collection_id == collection_id)
    }

    pub fn children_of(&self, parent_id: ItemId) -> impl Iterator<Item = &Item> {
        self.items
            .values()
            .filter(move |item| item.parent_id == Some(parent_id))
    }

    pub fn contains(&self, key: EntityKey) -> bool {
        match key {
            EntityKey::Container(id) => self.containers.contains_key(&id),
            EntityKey::Item(id) => self.items.contains_key(&id),
        }
    }

    /// Current value of `key` as a store record, `None` when absent.
    pub fn record(&self, key: EntityKey) -> Option<Record> {
        match key {
            EntityKey::Container(id) => self.containers.get(&id).cloned().map(Record::Container),
            EntityKey::Item(id) => self.items.get(&id).cloned().map(Record::Item),
        }
    }

    pub(crate) fn with_changes(&self, changes: &[Change]) -> Self {
        let mut next = self.successor();
        for change in changes {
            match change {
                Change::PutItem(item) => {
                    next.items.insert(item.id, item.clone());
                }
                Change::PutContainer(container) => {
                    next.containers.insert(container.id, container.clone());
                }
                Change::RemoveItem(id) => {
                    next.items.remove(id);
                }
                Change::RemoveContainer(id) => {
                    next.containers.remove(id);
                }
            }
        }
        next
    }

    /// Puts each key back to its image; a `None` image removes the entity.
    pub(crate) fn with_restored(&self, images: &[(EntityKey, Option<Record>)]) -> Self {
        let mut next = self.successor();
        for (key, image) in images {
            match (key, image) {
                (EntityKey::Item(id), None) => {
                    next.items.remove(id);
                }
                (EntityKey::Container(id), None) => {
                    next.containers.remove(id);
                }
                (_, Some(Record::Item(item))) => {
                    next.items.insert(item.id, item.clone());
                }
                (_, Some(Record::Container(container))) => {
                    next.containers.insert(container.id, container.clone());
                }
            }
        }
        next
    }

    /// Replaces one collection's entities with freshly loaded rows, keeping
    /// the local value of every key in `pinned`.
    pub(crate) fn with_collection(
        &self,
        collection_id: CollectionId,
        containers: Vec<Container>,
        items: Vec<Item>,
        pinned: impl Fn(EntityKey) -> bool,
    ) -> Self {
        let mut next = self.successor();
        next.containers.retain(|id, container| {
            container.collection_id != collection_id || pinned(EntityKey::Container(*id))
        });
        next.items
            .retain(|id, item| item.collection_id != collection_id || pinned(EntityKey::Item(*id)));
        for container in containers {
            if !pinned(EntityKey::Container(container.id)) {
                next.containers.insert(container.id, container);
            }
        }
        for item in items {
            if !pinned(EntityKey::Item(item.id)) {
                next.items.insert(item.id, item);
            }
        }
        next
    }

    pub(crate) fn with_container(&self, container: Container) -> Self {
        let mut next = self.successor();
        next.containers.insert(container.id, container);
        next
    }

    pub(crate) fn with_item(&self, item: Item) -> Self {
        let mut next = self.successor();
        next.items.insert(item.id, item);
        next
    }

    fn successor(&self) -> Self {
        Self {
            version: self.version + 1,
            containers: self.containers.clone(),
            items: self.items.clone(),
        }
    }
}
