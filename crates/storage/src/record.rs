use std::fmt;

use serde::{Deserialize, Serialize};
use shared::domain::{CollectionId, Container, ContainerId, Item, ItemId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Items,
    Containers,
}

impl Table {
    pub fn name(self) -> &'static str {
        match self {
            Table::Items => "items",
            Table::Containers => "containers",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "table", content = "record", rename_all = "snake_case")]
pub enum Record {
    Item(Item),
    Container(Container),
}

impl Record {
    pub fn table(&self) -> Table {
        match self {
            Record::Item(_) => Table::Items,
            Record::Container(_) => Table::Containers,
        }
    }

    pub fn raw_id(&self) -> i64 {
        match self {
            Record::Item(item) => item.id.0,
            Record::Container(container) => container.id.0,
        }
    }

    pub fn into_item(self) -> Option<Item> {
        match self {
            Record::Item(item) => Some(item),
            Record::Container(_) => None,
        }
    }

    pub fn into_container(self) -> Option<Container> {
        match self {
            Record::Container(container) => Some(container),
            Record::Item(_) => None,
        }
    }
}

/// Partial update of an item. `None` leaves a field untouched; the nested
/// options of the nullable columns distinguish "set to null" from "keep".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemPatch {
    pub container_id: Option<Option<ContainerId>>,
    pub parent_id: Option<Option<ItemId>>,
    pub title: Option<String>,
    pub order: Option<f64>,
    pub completed: Option<bool>,
}

impl ItemPatch {
    /// Patch carrying every mutable column of `item`.
    pub fn full(item: &Item) -> Self {
        Self {
            container_id: Some(item.container_id),
            parent_id: Some(item.parent_id),
            title: Some(item.title.clone()),
            order: Some(item.order),
            completed: Some(item.completed),
        }
    }

    pub fn apply_to(&self, item: &mut Item) {
        if let Some(container_id) = self.container_id {
            item.container_id = container_id;
        }
        if let Some(parent_id) = self.parent_id {
            item.parent_id = parent_id;
        }
        if let Some(title) = &self.title {
            item.title.clone_from(title);
        }
        if let Some(order) = self.order {
            item.order = order;
        }
        if let Some(completed) = self.completed {
            item.completed = completed;
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerPatch {
    pub name: Option<String>,
    pub order: Option<f64>,
    pub collapsed: Option<bool>,
    pub archived: Option<bool>,
}

impl ContainerPatch {
    pub fn full(container: &Container) -> Self {
        Self {
            name: Some(container.name.clone()),
            order: Some(container.order),
            collapsed: Some(container.collapsed),
            archived: Some(container.archived),
        }
    }

    pub fn apply_to(&self, container: &mut Container) {
        if let Some(name) = &self.name {
            container.name.clone_from(name);
        }
        if let Some(order) = self.order {
            container.order = order;
        }
        if let Some(collapsed) = self.collapsed {
            container.collapsed = collapsed;
        }
        if let Some(archived) = self.archived {
            container.archived = archived;
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "table", content = "patch", rename_all = "snake_case")]
pub enum Patch {
    Item(ItemPatch),
    Container(ContainerPatch),
}

impl Patch {
    pub fn table(&self) -> Table {
        match self {
            Patch::Item(_) => Table::Items,
            Patch::Container(_) => Table::Containers,
        }
    }
}

/// Row selector shared by `delete` and `select`.
///
/// `Container`, `Ungrouped` and `Parent` are item-table filters; against the
/// containers table `Container` selects the container row itself and the
/// other two match nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "by", content = "value", rename_all = "snake_case")]
pub enum Filter {
    Id(i64),
    Collection(CollectionId),
    Container(ContainerId),
    Ungrouped(CollectionId),
    Parent(ItemId),
}

impl Filter {
    pub fn matches(&self, record: &Record) -> bool {
        match record {
            Record::Item(item) => self.matches_item(item),
            Record::Container(container) => self.matches_container(container),
        }
    }

    pub fn matches_item(&self, item: &Item) -> bool {
        match *self {
            Filter::Id(id) => item.id.0 == id,
            Filter::Collection(collection_id) => item.collection_id == collection_id,
            Filter::Container(container_id) => item.container_id == Some(container_id),
            Filter::Ungrouped(collection_id) => {
                item.collection_id == collection_id && item.container_id.is_none()
            }
            Filter::Parent(parent_id) => item.parent_id == Some(parent_id),
        }
    }

    pub fn matches_container(&self, container: &Container) -> bool {
        match *self {
            Filter::Id(id) => container.id.0 == id,
            Filter::Collection(collection_id) => container.collection_id == collection_id,
            Filter::Container(container_id) => container.id == container_id,
            Filter::Ungrouped(_) | Filter::Parent(_) => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderBy {
    #[default]
    Order,
    Id,
}
