use std::{cmp::Ordering, collections::BTreeMap};

use shared::domain::{CollectionId, Container, ContainerId, GroupKey, Item, ItemId};

use crate::snapshot::BoardSnapshot;

/// Display order inside one list: open items first, then by `order`.
/// Ids break ties so the order is total.
pub fn two_tier_cmp(a: &Item, b: &Item) -> Ordering {
    a.completed
        .cmp(&b.completed)
        .then(a.order.total_cmp(&b.order))
        .then(a.id.cmp(&b.id))
}

pub fn container_cmp(a: &Container, b: &Container) -> Ordering {
    a.order.total_cmp(&b.order).then(a.id.cmp(&b.id))
}

/// Per-collection ordered view consumed by the UI.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupedView {
    pub collection_id: CollectionId,
    pub containers: Vec<Container>,
    pub items_by_group: BTreeMap<GroupKey, Vec<Item>>,
}

impl GroupedView {
    pub fn items(&self, group: GroupKey) -> &[Item] {
        self.items_by_group
            .get(&group)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn has_ungrouped(&self) -> bool {
        self.items_by_group.contains_key(&GroupKey::Ungrouped)
    }

    /// Group and display index of a top-level item.
    pub fn position_of(&self, item_id: ItemId) -> Option<(GroupKey, usize)> {
        self.items_by_group.iter().find_map(|(group, items)| {
            items
                .iter()
                .position(|item| item.id == item_id)
                .map(|index| (*group, index))
        })
    }

    pub fn container_index(&self, container_id: ContainerId) -> Option<usize> {
        self.containers.iter().position(|c| c.id == container_id)
    }
}

pub fn view(snapshot: &BoardSnapshot, collection_id: CollectionId) -> GroupedView {
    let containers: Vec<Container> = ordered_containers(snapshot, collection_id)
        .into_iter()
        .cloned()
        .collect();

    let mut items_by_group: BTreeMap<GroupKey, Vec<Item>> = containers
        .iter()
        .map(|container| (GroupKey::Container(container.id), Vec::new()))
        .collect();
    for item in snapshot
        .items_in_collection(collection_id)
        .filter(|item| item.is_top_level())
    {
        items_by_group
            .entry(item.group())
            .or_default()
            .push(item.clone());
    }
    for items in items_by_group.values_mut() {
        items.sort_by(two_tier_cmp);
    }

    GroupedView {
        collection_id,
        containers,
        items_by_group,
    }
}

pub fn sub_items_of(snapshot: &BoardSnapshot, item_id: ItemId) -> Vec<Item> {
    child_list(snapshot, item_id).into_iter().cloned().collect()
}

/// Top-level items of one group in display order.
pub(crate) fn sibling_list(
    snapshot: &BoardSnapshot,
    collection_id: CollectionId,
    group: GroupKey,
) -> Vec<&Item> {
    let mut items: Vec<&Item> = snapshot
        .items_in_collection(collection_id)
        .filter(|item| item.is_top_level() && item.group() == group)
        .collect();
    items.sort_by(|a, b| two_tier_cmp(a, b));
    items
}

pub(crate) fn child_list(snapshot: &BoardSnapshot, parent_id: ItemId) -> Vec<&Item> {
    let mut items: Vec<&Item> = snapshot.children_of(parent_id).collect();
    items.sort_by(|a, b| two_tier_cmp(a, b));
    items
}

pub(crate) fn ordered_containers(
    snapshot: &BoardSnapshot,
    collection_id: CollectionId,
) -> Vec<&Container> {
    let mut containers: Vec<&Container> =
        snapshot.containers_in_collection(collection_id).collect();
    containers.sort_by(|a, b| container_cmp(a, b));
    containers
}

#[cfg(test)]
#[path = "tests/grouping_tests.rs"]
mod tests;
