use std::collections::BTreeMap;

use anyhow::{bail, Result};
use async_trait::async_trait;
use shared::domain::{Container, ContainerId, Item, ItemId};
use tokio::sync::Mutex;

use crate::{
    record::{Filter, OrderBy, Patch, Record, Table},
    RecordStore,
};

/// Process-local record store with the same contract as [`crate::SqliteStore`].
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryTables>,
}

#[derive(Default)]
struct MemoryTables {
    items: BTreeMap<i64, Item>,
    containers: BTreeMap<i64, Container>,
    last_id: i64,
}

impl MemoryTables {
    fn allocate(&mut self, requested: i64) -> i64 {
        if requested > 0 {
            self.last_id = self.last_id.max(requested);
            requested
        } else {
            self.last_id += 1;
            self.last_id
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds rows verbatim, keeping their ids.
    pub async fn with_records(records: impl IntoIterator<Item = Record>) -> Result<Self> {
        let store = Self::new();
        for record in records {
            store.insert(record).await?;
        }
        Ok(store)
    }

    pub async fn item_count(&self) -> usize {
        self.inner.lock().await.items.len()
    }

    pub async fn container_count(&self) -> usize {
        self.inner.lock().await.containers.len()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn insert(&self, record: Record) -> Result<Record> {
        let mut tables = self.inner.lock().await;
        match record {
            Record::Item(mut item) => {
                if item.id.is_assigned() && tables.items.contains_key(&item.id.0) {
                    bail!("items row {} already exists", item.id);
                }
                item.id = ItemId(tables.allocate(item.id.0));
                tables.items.insert(item.id.0, item.clone());
                Ok(Record::Item(item))
            }
            Record::Container(mut container) => {
                if container.id.is_assigned() && tables.containers.contains_key(&container.id.0) {
                    bail!("containers row {} already exists", container.id);
                }
                container.id = ContainerId(tables.allocate(container.id.0));
                tables
                    .containers
                    .insert(container.id.0, container.clone());
                Ok(Record::Container(container))
            }
        }
    }

    async fn update(&self, table: Table, id: i64, patch: Patch) -> Result<()> {
        let mut tables = self.inner.lock().await;
        match (table, patch) {
            (Table::Items, Patch::Item(patch)) => match tables.items.get_mut(&id) {
                Some(item) => patch.apply_to(item),
                None => bail!("items row {id} not found"),
            },
            (Table::Containers, Patch::Container(patch)) => {
                match tables.containers.get_mut(&id) {
                    Some(container) => patch.apply_to(container),
                    None => bail!("containers row {id} not found"),
                }
            }
            (table, patch) => bail!("{} patch cannot be applied to table {table}", patch.table()),
        }
        Ok(())
    }

    async fn delete(&self, table: Table, filter: Filter) -> Result<u64> {
        let mut tables = self.inner.lock().await;
        let removed = match table {
            Table::Items => {
                let before = tables.items.len();
                tables
                    .items
                    .retain(|_, item| !filter.matches_item(item));
                before - tables.items.len()
            }
            Table::Containers => {
                let before = tables.containers.len();
                tables
                    .containers
                    .retain(|_, container| !filter.matches_container(container));
                before - tables.containers.len()
            }
        };
        Ok(removed as u64)
    }

    async fn select(&self, table: Table, filter: Filter, order_by: OrderBy) -> Result<Vec<Record>> {
        let tables = self.inner.lock().await;
        let mut records: Vec<Record> = match table {
            Table::Items => tables
                .items
                .values()
                .filter(|item| filter.matches_item(item))
                .cloned()
                .map(Record::Item)
                .collect(),
            Table::Containers => tables
                .containers
                .values()
                .filter(|container| filter.matches_container(container))
                .cloned()
                .map(Record::Container)
                .collect(),
        };
        if order_by == OrderBy::Order {
            records.sort_by(|a, b| {
                sort_order(a)
                    .total_cmp(&sort_order(b))
                    .then(a.raw_id().cmp(&b.raw_id()))
            });
        }
        Ok(records)
    }
}

fn sort_order(record: &Record) -> f64 {
    match record {
        Record::Item(item) => item.order,
        Record::Container(container) => container.order,
    }
}

#[cfg(test)]
#[path = "tests/memory_tests.rs"]
mod tests;
