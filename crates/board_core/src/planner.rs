//! Turns move descriptors into mutations.
//!
//! Items take a bisected key between their new neighbours and only fall back
//! to rewriting the sibling list when bisection is exhausted. Containers are
//! few per collection, so a container move always rewrites the whole list
//! with dense keys.

use shared::{
    domain::{ContainerId, EntityKey, GroupKey, Item, ItemId},
    protocol::{ContainerMove, ItemMove, MutationKind},
};
use tracing::debug;

use crate::{
    error::EngineError,
    grouping::{child_list, ordered_containers, sibling_list},
    mutation::Mutation,
    order_key,
    snapshot::BoardSnapshot,
};

/// New `order` values produced by placing one item into a sibling list.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Placement {
    pub orders: Vec<(ItemId, f64)>,
    pub renormalized: bool,
}

/// Places `moving` at insertion slot `slot` of `siblings` (the list as
/// displayed, which may already contain `moving`). Returns `None` when the
/// item would end up where it already is.
pub(crate) fn place_item(siblings: &[&Item], moving: &Item, slot: usize) -> Option<Placement> {
    let current = siblings.iter().position(|sibling| sibling.id == moving.id);
    let others: Vec<&Item> = siblings
        .iter()
        .copied()
        .filter(|sibling| sibling.id != moving.id)
        .collect();

    let slot = slot.min(siblings.len());
    let index = match current {
        Some(current) if slot > current => slot - 1,
        _ => slot,
    };

    // Completion splits the list in two tiers; an item never leaves its own.
    let open = others.iter().filter(|sibling| !sibling.completed).count();
    let (tier_start, tier_end) = if moving.completed {
        (open, others.len())
    } else {
        (0, open)
    };
    let index = index.clamp(tier_start, tier_end);
    if current == Some(index) {
        return None;
    }

    let before = (index > tier_start).then(|| others[index - 1].order);
    let after = (index < tier_end).then(|| others[index].order);
    let key = order_key::between(before, after);
    let collides = others.iter().any(|sibling| sibling.order == key);
    if !order_key::is_exhausted(before, after, key) && !collides {
        return Some(Placement {
            orders: vec![(moving.id, key)],
            renormalized: false,
        });
    }

    let mut sequence = others;
    sequence.insert(index, moving);
    let orders = order_key::dense(sequence.len())
        .zip(sequence)
        .filter(|(order, sibling)| sibling.id == moving.id || sibling.order != *order)
        .map(|(order, sibling)| (sibling.id, order))
        .collect();
    Some(Placement {
        orders,
        renormalized: true,
    })
}

pub fn plan_item_move(
    snapshot: &BoardSnapshot,
    request: &ItemMove,
) -> Result<Option<Mutation>, EngineError> {
    let item = snapshot
        .item(request.item_id)
        .ok_or(EngineError::NotFound(EntityKey::Item(request.item_id)))?;
    if !item.is_top_level() {
        return Err(EngineError::invalid_move(format!(
            "item {} is a sub-item; reparent it instead",
            item.id
        )));
    }
    if item.group() != request.from {
        return Err(EngineError::invalid_move(format!(
            "item {} is in {}, not {}",
            item.id,
            item.group(),
            request.from
        )));
    }
    if let GroupKey::Container(container_id) = request.to {
        ensure_container_in_collection(snapshot, container_id, item)?;
    }

    let siblings = sibling_list(snapshot, item.collection_id, request.to);
    let Some(placement) = place_item(&siblings, item, request.destination_index) else {
        return Ok(None);
    };
    if placement.renormalized {
        debug!(group = %request.to, siblings = siblings.len(), "renormalizing item order keys");
    }

    let target_container = request.to.container_id();
    let mut mutation = Mutation::new(MutationKind::MoveItem);
    for (id, order) in placement.orders {
        let Some(sibling) = snapshot.item(id) else {
            continue;
        };
        let mut updated = sibling.clone();
        updated.order = order;
        if id == item.id {
            updated.container_id = target_container;
        }
        mutation.put_item(updated);
    }
    if item.container_id != target_container {
        for child in child_list(snapshot, item.id) {
            let mut moved = child.clone();
            moved.container_id = target_container;
            mutation.put_item(moved);
        }
    }
    Ok(mutation.into_option())
}

pub fn plan_container_move(
    snapshot: &BoardSnapshot,
    request: &ContainerMove,
) -> Result<Option<Mutation>, EngineError> {
    let container = snapshot
        .container(request.container_id)
        .ok_or(EngineError::NotFound(EntityKey::Container(request.container_id)))?;

    let mut sequence = ordered_containers(snapshot, container.collection_id);
    let Some(current) = sequence.iter().position(|c| c.id == container.id) else {
        return Ok(None);
    };
    let slot = request.destination_index.min(sequence.len());
    let index = if slot > current { slot - 1 } else { slot };
    if index == current {
        return Ok(None);
    }

    let moving = sequence.remove(current);
    sequence.insert(index, moving);

    let mut mutation = Mutation::new(MutationKind::MoveContainer);
    for (order, container) in order_key::dense(sequence.len()).zip(sequence) {
        if container.order != order {
            let mut updated = container.clone();
            updated.order = order;
            mutation.put_container(updated);
        }
    }
    Ok(mutation.into_option())
}

/// Nests `item_id` under `parent` (or lifts it back to the top level of its
/// group when `parent` is `None`) at `destination_index` among the new
/// siblings. Nesting is one level deep.
pub fn plan_reparent(
    snapshot: &BoardSnapshot,
    item_id: ItemId,
    parent: Option<ItemId>,
    destination_index: usize,
) -> Result<Option<Mutation>, EngineError> {
    let item = snapshot
        .item(item_id)
        .ok_or(EngineError::NotFound(EntityKey::Item(item_id)))?;

    let (siblings, container_id) = match parent {
        Some(parent_id) => {
            if parent_id == item_id {
                return Err(EngineError::invalid_move(format!(
                    "item {item_id} cannot be nested under itself"
                )));
            }
            let parent = snapshot
                .item(parent_id)
                .ok_or(EngineError::NotFound(EntityKey::Item(parent_id)))?;
            if parent.collection_id != item.collection_id {
                return Err(EngineError::invalid_move(format!(
                    "item {parent_id} belongs to another collection"
                )));
            }
            if !parent.is_top_level() {
                return Err(EngineError::invalid_move(format!(
                    "item {parent_id} is already a sub-item"
                )));
            }
            if snapshot.children_of(item_id).next().is_some() {
                return Err(EngineError::invalid_move(format!(
                    "item {item_id} has sub-items and cannot be nested"
                )));
            }
            (child_list(snapshot, parent_id), parent.container_id)
        }
        None => (
            sibling_list(snapshot, item.collection_id, item.group()),
            item.container_id,
        ),
    };

    let Some(placement) = place_item(&siblings, item, destination_index) else {
        return Ok(None);
    };

    let mut mutation = Mutation::new(MutationKind::ReparentItem);
    for (id, order) in placement.orders {
        let Some(sibling) = snapshot.item(id) else {
            continue;
        };
        let mut updated = sibling.clone();
        updated.order = order;
        if id == item_id {
            updated.parent_id = parent;
            updated.container_id = container_id;
        }
        mutation.put_item(updated);
    }
    Ok(mutation.into_option())
}

fn ensure_container_in_collection(
    snapshot: &BoardSnapshot,
    container_id: ContainerId,
    item: &Item,
) -> Result<(), EngineError> {
    let container = snapshot
        .container(container_id)
        .ok_or(EngineError::NotFound(EntityKey::Container(container_id)))?;
    if container.collection_id != item.collection_id {
        return Err(EngineError::invalid_move(format!(
            "container {container_id} belongs to another collection"
        )));
    }
    Ok(())
}

#[cfg(test)]
#[path = "tests/planner_tests.rs"]
mod tests;
