use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        pub struct $name(pub i64);

        impl $name {
            /// Placeholder carried by records that the store has not assigned an id to yet.
            pub const UNASSIGNED: Self = Self(0);

            pub fn is_assigned(self) -> bool {
                self.0 > 0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(ItemId);
id_newtype!(ContainerId);
id_newtype!(CollectionId);

/// A work unit. `container_id == None` places it in the ungrouped bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub collection_id: CollectionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_id: Option<ContainerId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<ItemId>,
    pub title: String,
    pub order: f64,
    pub completed: bool,
}

impl Item {
    pub fn new(
        collection_id: CollectionId,
        container_id: Option<ContainerId>,
        title: impl Into<String>,
        order: f64,
    ) -> Self {
        Self {
            id: ItemId::UNASSIGNED,
            collection_id,
            container_id,
            parent_id: None,
            title: title.into(),
            order,
            completed: false,
        }
    }

    pub fn group(&self) -> GroupKey {
        GroupKey::from(self.container_id)
    }

    pub fn is_top_level(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// A named, ordered grouping of items ("section" / "column").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Container {
    pub id: ContainerId,
    pub collection_id: CollectionId,
    pub name: String,
    pub order: f64,
    pub collapsed: bool,
    pub archived: bool,
}

impl Container {
    pub fn new(collection_id: CollectionId, name: impl Into<String>, order: f64) -> Self {
        Self {
            id: ContainerId::UNASSIGNED,
            collection_id,
            name: name.into(),
            order,
            collapsed: false,
            archived: false,
        }
    }
}

/// Key of one ordered item list inside a collection view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum GroupKey {
    Ungrouped,
    Container(ContainerId),
}

impl GroupKey {
    pub fn container_id(self) -> Option<ContainerId> {
        match self {
            GroupKey::Ungrouped => None,
            GroupKey::Container(id) => Some(id),
        }
    }
}

impl From<Option<ContainerId>> for GroupKey {
    fn from(value: Option<ContainerId>) -> Self {
        match value {
            Some(id) => GroupKey::Container(id),
            None => GroupKey::Ungrouped,
        }
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupKey::Ungrouped => f.write_str("ungrouped"),
            GroupKey::Container(id) => write!(f, "container:{id}"),
        }
    }
}

/// Target of a container deletion. The ungrouped bucket has no record of its
/// own, so it is addressed through its collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ContainerRef {
    Container(ContainerId),
    Ungrouped(CollectionId),
}

/// Identity of any persisted entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum EntityKey {
    Container(ContainerId),
    Item(ItemId),
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKey::Container(id) => write!(f, "container {id}"),
            EntityKey::Item(id) => write!(f, "item {id}"),
        }
    }
}
