use std::sync::Arc;

use anyhow::anyhow;
use shared::{
    domain::{
        CollectionId, Container, ContainerId, ContainerRef, EntityKey, GroupKey, Item, ItemId,
    },
    protocol::{BoardEvent, ContainerMove, ItemMove, MoveDescriptor},
};
use storage::{Record, RecordStore, Table};
use tokio::sync::broadcast;

mod applier;
pub mod cascade;
pub mod config;
pub mod error;
pub mod grouping;
pub mod mutation;
pub mod order_key;
pub mod planner;
pub mod session;
pub mod snapshot;

pub use applier::PendingWrite;
pub use config::EngineConfig;
pub use error::EngineError;
pub use grouping::GroupedView;
pub use session::{DragOutcome, DragSession, DragSource, DragState, DropTarget};
pub use snapshot::BoardSnapshot;

use applier::Applier;

/// Entry point for UI and command callers.
///
/// Every mutating call plans against the current snapshot, applies the
/// result locally before returning, and persists it in the background. The
/// returned [`PendingWrite`] settles with the persistence outcome; a failed
/// write has already been rolled back locally by the time it settles.
///
/// Mutating calls spawn onto the current tokio runtime.
#[derive(Clone)]
pub struct BoardEngine {
    applier: Arc<Applier>,
}

impl BoardEngine {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self::with_config(store, EngineConfig::default())
    }

    pub fn with_config(store: Arc<dyn RecordStore>, config: EngineConfig) -> Self {
        Self {
            applier: Applier::new(store, config),
        }
    }

    pub async fn load_collection(&self, collection_id: CollectionId) -> Result<(), EngineError> {
        self.applier.load_collection(collection_id).await
    }

    pub fn snapshot(&self) -> Arc<BoardSnapshot> {
        self.applier.snapshot()
    }

    pub fn view(&self, collection_id: CollectionId) -> GroupedView {
        grouping::view(&self.snapshot(), collection_id)
    }

    pub fn sub_items_of(&self, item_id: ItemId) -> Vec<Item> {
        grouping::sub_items_of(&self.snapshot(), item_id)
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<BoardEvent> {
        self.applier.subscribe_events()
    }

    /// Appends a container after the collection's last one.
    pub async fn add_container(
        &self,
        collection_id: CollectionId,
        name: &str,
    ) -> Result<Container, EngineError> {
        let order = grouping::ordered_containers(&self.snapshot(), collection_id)
            .last()
            .map_or(0.0, |last| last.order.floor() + 1.0);
        let stored = self
            .applier
            .insert(Record::Container(Container::new(collection_id, name, order)))
            .await?;
        stored
            .into_container()
            .ok_or_else(|| unexpected_record(Table::Containers))
    }

    /// Appends an open item at the end of the open tier of `group`.
    pub async fn add_item(
        &self,
        collection_id: CollectionId,
        group: GroupKey,
        title: &str,
    ) -> Result<Item, EngineError> {
        let order = {
            let snapshot = self.snapshot();
            if let GroupKey::Container(container_id) = group {
                let container = snapshot
                    .container(container_id)
                    .ok_or(EngineError::NotFound(EntityKey::Container(container_id)))?;
                if container.collection_id != collection_id {
                    return Err(EngineError::invalid_move(format!(
                        "container {container_id} belongs to another collection"
                    )));
                }
            }
            let siblings = grouping::sibling_list(&snapshot, collection_id, group);
            order_key::between(highest_order(&siblings), None)
        };
        let item = Item::new(collection_id, group.container_id(), title, order);
        self.applier
            .insert(Record::Item(item))
            .await?
            .into_item()
            .ok_or_else(|| unexpected_record(Table::Items))
    }

    /// Appends a sub-item under a top-level item. The sub-item joins the
    /// parent's group.
    pub async fn add_sub_item(&self, parent_id: ItemId, title: &str) -> Result<Item, EngineError> {
        let item = {
            let snapshot = self.snapshot();
            let parent = snapshot
                .item(parent_id)
                .ok_or(EngineError::NotFound(EntityKey::Item(parent_id)))?;
            if !parent.is_top_level() {
                return Err(EngineError::invalid_move(format!(
                    "item {parent_id} is already a sub-item"
                )));
            }
            let children = grouping::child_list(&snapshot, parent_id);
            let order = order_key::between(highest_order(&children), None);
            let mut item = Item::new(parent.collection_id, parent.container_id, title, order);
            item.parent_id = Some(parent_id);
            item
        };
        self.applier
            .insert(Record::Item(item))
            .await?
            .into_item()
            .ok_or_else(|| unexpected_record(Table::Items))
    }

    pub fn move_item(&self, request: ItemMove) -> Result<PendingWrite, EngineError> {
        self.applier
            .apply_with(|snapshot| planner::plan_item_move(snapshot, &request))
    }

    pub fn move_container(&self, request: ContainerMove) -> Result<PendingWrite, EngineError> {
        self.applier
            .apply_with(|snapshot| planner::plan_container_move(snapshot, &request))
    }

    pub fn apply_descriptor(&self, descriptor: MoveDescriptor) -> Result<PendingWrite, EngineError> {
        match descriptor {
            MoveDescriptor::Item(request) => self.move_item(request),
            MoveDescriptor::Container(request) => self.move_container(request),
        }
    }

    /// Nests an item under `parent`, or lifts it to the top level of its
    /// group when `parent` is `None`.
    pub fn reparent_item(
        &self,
        item_id: ItemId,
        parent: Option<ItemId>,
        destination_index: usize,
    ) -> Result<PendingWrite, EngineError> {
        self.applier.apply_with(|snapshot| {
            planner::plan_reparent(snapshot, item_id, parent, destination_index)
        })
    }

    pub fn archive_container(&self, container_id: ContainerId) -> Result<PendingWrite, EngineError> {
        self.applier
            .apply_with(|snapshot| cascade::plan_archive_container(snapshot, container_id))
    }

    pub fn unarchive_container(
        &self,
        container_id: ContainerId,
    ) -> Result<PendingWrite, EngineError> {
        self.applier
            .apply_with(|snapshot| cascade::plan_unarchive_container(snapshot, container_id))
    }

    pub fn delete_container(&self, target: ContainerRef) -> Result<PendingWrite, EngineError> {
        self.applier
            .apply_with(|snapshot| cascade::plan_delete_container(snapshot, target))
    }

    pub fn delete_collection(
        &self,
        collection_id: CollectionId,
    ) -> Result<PendingWrite, EngineError> {
        self.applier
            .apply_with(|snapshot| cascade::plan_delete_collection(snapshot, collection_id))
    }

    pub fn rename_container(
        &self,
        container_id: ContainerId,
        name: &str,
    ) -> Result<PendingWrite, EngineError> {
        self.applier
            .apply_with(|snapshot| cascade::plan_rename_container(snapshot, container_id, name))
    }

    pub fn rename_item(&self, item_id: ItemId, title: &str) -> Result<PendingWrite, EngineError> {
        self.applier
            .apply_with(|snapshot| cascade::plan_rename_item(snapshot, item_id, title))
    }

    pub fn set_item_completed(
        &self,
        item_id: ItemId,
        completed: bool,
    ) -> Result<PendingWrite, EngineError> {
        self.applier.apply_with(|snapshot| {
            cascade::plan_set_item_completed(snapshot, item_id, completed)
        })
    }

    pub fn set_container_collapsed(
        &self,
        container_id: ContainerId,
        collapsed: bool,
    ) -> Result<PendingWrite, EngineError> {
        self.applier.apply_with(|snapshot| {
            cascade::plan_set_container_collapsed(snapshot, container_id, collapsed)
        })
    }
}

/// Highest key in the list across both tiers. Completed items keep their
/// keys, so a new key must clear them too.
fn highest_order(list: &[&Item]) -> Option<f64> {
    list.iter().map(|item| item.order).reduce(f64::max)
}

fn unexpected_record(table: Table) -> EngineError {
    EngineError::Create {
        table,
        source: anyhow!("store returned a record of the wrong kind"),
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
