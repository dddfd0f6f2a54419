use anyhow::Result;
use async_trait::async_trait;

mod memory;
pub mod record;
mod sqlite;

pub use memory::MemoryStore;
pub use record::{ContainerPatch, Filter, ItemPatch, OrderBy, Patch, Record, Table};
pub use sqlite::SqliteStore;

/// Persisted record store consumed by the board engine.
///
/// Implementations must not cascade on their own: every row the engine wants
/// gone is named by an explicit `delete`.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Inserts `record`. Records carrying an unassigned id receive a fresh
    /// one; records with an assigned id are stored under that id.
    async fn insert(&self, record: Record) -> Result<Record>;

    /// Fails when no row with `id` exists.
    async fn update(&self, table: Table, id: i64, patch: Patch) -> Result<()>;

    /// Returns the number of removed rows.
    async fn delete(&self, table: Table, filter: Filter) -> Result<u64>;

    async fn select(&self, table: Table, filter: Filter, order_by: OrderBy) -> Result<Vec<Record>>;
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
