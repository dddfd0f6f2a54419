//! Structural edits whose effect reaches past the entity named in the call:
//! archiving completes member items, deleting removes members and their
//! sub-items. Simple field edits live here too so every mutation is planned
//! the same way.

use std::collections::BTreeSet;

use shared::{
    domain::{CollectionId, Container, ContainerId, ContainerRef, EntityKey, Item, ItemId},
    protocol::MutationKind,
};
use storage::Filter;

use crate::{error::EngineError, mutation::Mutation, snapshot::BoardSnapshot};

pub fn plan_archive_container(
    snapshot: &BoardSnapshot,
    container_id: ContainerId,
) -> Result<Option<Mutation>, EngineError> {
    let container = find_container(snapshot, container_id)?;
    let open_members: Vec<&Item> = members(snapshot, container_id)
        .filter(|item| !item.completed)
        .collect();

    let mut mutation = Mutation::new(MutationKind::ArchiveContainer);
    if !container.archived {
        let mut archived = container.clone();
        archived.archived = true;
        mutation.put_container(archived);
    }
    for item in open_members {
        let mut completed = item.clone();
        completed.completed = true;
        mutation.put_item(completed);
    }
    Ok(mutation.into_option())
}

/// Clears the archived flag. Items completed by the archive stay completed.
pub fn plan_unarchive_container(
    snapshot: &BoardSnapshot,
    container_id: ContainerId,
) -> Result<Option<Mutation>, EngineError> {
    let container = find_container(snapshot, container_id)?;
    if !container.archived {
        return Ok(None);
    }
    let mut restored = container.clone();
    restored.archived = false;

    let mut mutation = Mutation::new(MutationKind::UnarchiveContainer);
    mutation.put_container(restored);
    Ok(Some(mutation))
}

pub fn plan_delete_container(
    snapshot: &BoardSnapshot,
    target: ContainerRef,
) -> Result<Option<Mutation>, EngineError> {
    let mut mutation = Mutation::new(MutationKind::DeleteContainer);
    match target {
        ContainerRef::Container(container_id) => {
            find_container(snapshot, container_id)?;
            let doomed: Vec<&Item> = members(snapshot, container_id).collect();
            remove_with_sub_items(&mut mutation, snapshot, &doomed);
            mutation.remove_containers(Filter::Id(container_id.0), [container_id]);
        }
        ContainerRef::Ungrouped(collection_id) => {
            let doomed: Vec<&Item> = snapshot
                .items_in_collection(collection_id)
                .filter(|item| item.container_id.is_none())
                .collect();
            if doomed.is_empty() {
                return Ok(None);
            }
            remove_with_sub_items(&mut mutation, snapshot, &doomed);
        }
    }
    Ok(mutation.into_option())
}

pub fn plan_delete_collection(
    snapshot: &BoardSnapshot,
    collection_id: CollectionId,
) -> Result<Option<Mutation>, EngineError> {
    let items: Vec<ItemId> = snapshot
        .items_in_collection(collection_id)
        .map(|item| item.id)
        .collect();
    let containers: Vec<ContainerId> = snapshot
        .containers_in_collection(collection_id)
        .map(|container| container.id)
        .collect();
    if items.is_empty() && containers.is_empty() {
        return Ok(None);
    }

    let mut mutation = Mutation::new(MutationKind::DeleteCollection);
    mutation.remove_items(Filter::Collection(collection_id), items);
    mutation.remove_containers(Filter::Collection(collection_id), containers);
    Ok(Some(mutation))
}

pub fn plan_rename_container(
    snapshot: &BoardSnapshot,
    container_id: ContainerId,
    name: &str,
) -> Result<Option<Mutation>, EngineError> {
    let container = find_container(snapshot, container_id)?;
    if container.name == name {
        return Ok(None);
    }
    let mut renamed = container.clone();
    renamed.name = name.to_owned();

    let mut mutation = Mutation::new(MutationKind::RenameContainer);
    mutation.put_container(renamed);
    Ok(Some(mutation))
}

pub fn plan_rename_item(
    snapshot: &BoardSnapshot,
    item_id: ItemId,
    title: &str,
) -> Result<Option<Mutation>, EngineError> {
    let item = find_item(snapshot, item_id)?;
    if item.title == title {
        return Ok(None);
    }
    let mut renamed = item.clone();
    renamed.title = title.to_owned();

    let mut mutation = Mutation::new(MutationKind::RenameItem);
    mutation.put_item(renamed);
    Ok(Some(mutation))
}

/// Completing a parent completes its sub-items as well; reopening it leaves
/// them alone.
pub fn plan_set_item_completed(
    snapshot: &BoardSnapshot,
    item_id: ItemId,
    completed: bool,
) -> Result<Option<Mutation>, EngineError> {
    let item = find_item(snapshot, item_id)?;

    let mut mutation = Mutation::new(MutationKind::SetItemCompleted);
    let mut targets = vec![item];
    if completed {
        targets.extend(snapshot.children_of(item_id));
    }
    for target in targets {
        if target.completed != completed {
            let mut updated = target.clone();
            updated.completed = completed;
            mutation.put_item(updated);
        }
    }
    Ok(mutation.into_option())
}

pub fn plan_set_container_collapsed(
    snapshot: &BoardSnapshot,
    container_id: ContainerId,
    collapsed: bool,
) -> Result<Option<Mutation>, EngineError> {
    let container = find_container(snapshot, container_id)?;
    if container.collapsed == collapsed {
        return Ok(None);
    }
    let mut updated = container.clone();
    updated.collapsed = collapsed;

    let mut mutation = Mutation::new(MutationKind::SetContainerCollapsed);
    mutation.put_container(updated);
    Ok(Some(mutation))
}

fn find_container(
    snapshot: &BoardSnapshot,
    container_id: ContainerId,
) -> Result<&Container, EngineError> {
    snapshot
        .container(container_id)
        .ok_or(EngineError::NotFound(EntityKey::Container(container_id)))
}

fn find_item(snapshot: &BoardSnapshot, item_id: ItemId) -> Result<&Item, EngineError> {
    snapshot
        .item(item_id)
        .ok_or(EngineError::NotFound(EntityKey::Item(item_id)))
}

fn members(snapshot: &BoardSnapshot, container_id: ContainerId) -> impl Iterator<Item = &Item> {
    snapshot
        .items()
        .filter(move |item| item.container_id == Some(container_id))
}

/// Deletes `doomed` and every sub-item of a doomed parent, one row per
/// step. Rows are named by id: a broad filter would also reach rows whose
/// in-flight writes are moving them out of the doomed group.
fn remove_with_sub_items(mutation: &mut Mutation, snapshot: &BoardSnapshot, doomed: &[&Item]) {
    let mut ids: BTreeSet<ItemId> = doomed.iter().map(|item| item.id).collect();
    let sub_items: Vec<ItemId> = ids
        .iter()
        .flat_map(|parent_id| snapshot.children_of(*parent_id))
        .map(|child| child.id)
        .collect();
    ids.extend(sub_items);
    for id in ids {
        mutation.remove_items(Filter::Id(id.0), [id]);
    }
}

#[cfg(test)]
#[path = "tests/cascade_tests.rs"]
mod tests;
