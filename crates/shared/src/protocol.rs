use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    domain::{ContainerId, GroupKey, ItemId},
    error::ErrorReport,
};

/// A single item relocation produced by a drop gesture or a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemMove {
    pub item_id: ItemId,
    pub from: GroupKey,
    pub to: GroupKey,
    /// Insertion slot in the destination list as currently displayed.
    pub destination_index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerMove {
    pub container_id: ContainerId,
    pub destination_index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum MoveDescriptor {
    Item(ItemMove),
    Container(ContainerMove),
}

/// Identifies one applied mutation in events and errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationTag {
    pub ticket: u64,
    pub kind: MutationKind,
}

impl fmt::Display for MutationTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.kind, self.ticket)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    MoveItem,
    MoveContainer,
    ReparentItem,
    ArchiveContainer,
    UnarchiveContainer,
    DeleteContainer,
    DeleteCollection,
    RenameContainer,
    RenameItem,
    SetItemCompleted,
    SetContainerCollapsed,
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MutationKind::MoveItem => "move_item",
            MutationKind::MoveContainer => "move_container",
            MutationKind::ReparentItem => "reparent_item",
            MutationKind::ArchiveContainer => "archive_container",
            MutationKind::UnarchiveContainer => "unarchive_container",
            MutationKind::DeleteContainer => "delete_container",
            MutationKind::DeleteCollection => "delete_collection",
            MutationKind::RenameContainer => "rename_container",
            MutationKind::RenameItem => "rename_item",
            MutationKind::SetItemCompleted => "set_item_completed",
            MutationKind::SetContainerCollapsed => "set_container_collapsed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum BoardEvent {
    SnapshotChanged {
        version: u64,
    },
    WriteConfirmed {
        mutation: MutationTag,
    },
    RolledBack {
        mutation: MutationTag,
        version: u64,
    },
    WriteFailed {
        mutation: MutationTag,
        error: ErrorReport,
    },
}
