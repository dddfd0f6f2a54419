use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use shared::domain::{CollectionId, Container, ContainerId, Item, ItemId};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, QueryBuilder, Row, Sqlite,
};
use tracing::debug;

use crate::{
    record::{ContainerPatch, Filter, ItemPatch, OrderBy, Patch, Record, Table},
    RecordStore,
};

#[derive(Clone)]
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        // Every connection to `sqlite::memory:` opens a separate database.
        let pool = if is_memory_url(database_url) {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(connect_options)
                .await?
        } else {
            SqlitePoolOptions::new()
                .max_connections(5)
                .connect_with(connect_options)
                .await?
        };
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("failed to apply board schema migrations")?;
        debug!(%database_url, "sqlite record store ready");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    async fn insert_item(&self, mut item: Item) -> Result<Item> {
        let row = sqlx::query(
            "INSERT INTO items (id, collection_id, container_id, parent_id, title, sort_order, completed)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             RETURNING id",
        )
        .bind(item.id.is_assigned().then_some(item.id.0))
        .bind(item.collection_id.0)
        .bind(item.container_id.map(|id| id.0))
        .bind(item.parent_id.map(|id| id.0))
        .bind(item.title.clone())
        .bind(item.order)
        .bind(item.completed)
        .fetch_one(&self.pool)
        .await
        .context("failed to insert item")?;
        item.id = ItemId(row.get::<i64, _>(0));
        Ok(item)
    }

    async fn insert_container(&self, mut container: Container) -> Result<Container> {
        let row = sqlx::query(
            "INSERT INTO containers (id, collection_id, name, sort_order, collapsed, archived)
             VALUES (?, ?, ?, ?, ?, ?)
             RETURNING id",
        )
        .bind(container.id.is_assigned().then_some(container.id.0))
        .bind(container.collection_id.0)
        .bind(container.name.clone())
        .bind(container.order)
        .bind(container.collapsed)
        .bind(container.archived)
        .fetch_one(&self.pool)
        .await
        .context("failed to insert container")?;
        container.id = ContainerId(row.get::<i64, _>(0));
        Ok(container)
    }

    async fn row_exists(&self, table: Table, id: i64) -> Result<bool> {
        let mut builder = QueryBuilder::<Sqlite>::new("SELECT 1 FROM ");
        builder.push(table.name()).push(" WHERE id = ").push_bind(id);
        let row = builder.build().fetch_optional(&self.pool).await?;
        Ok(row.is_some())
    }
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn insert(&self, record: Record) -> Result<Record> {
        match record {
            Record::Item(item) => Ok(Record::Item(self.insert_item(item).await?)),
            Record::Container(container) => {
                Ok(Record::Container(self.insert_container(container).await?))
            }
        }
    }

    async fn update(&self, table: Table, id: i64, patch: Patch) -> Result<()> {
        if patch.table() != table {
            bail!("{} patch cannot be applied to table {table}", patch.table());
        }

        let mut builder = QueryBuilder::<Sqlite>::new("UPDATE ");
        builder.push(table.name()).push(" SET ");
        let assigned = match patch {
            Patch::Item(patch) => push_item_assignments(&mut builder, patch),
            Patch::Container(patch) => push_container_assignments(&mut builder, patch),
        };
        if assigned == 0 {
            if self.row_exists(table, id).await? {
                return Ok(());
            }
            bail!("{table} row {id} not found");
        }
        builder.push(" WHERE id = ").push_bind(id);

        let result = builder
            .build()
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to update {table} row {id}"))?;
        if result.rows_affected() == 0 {
            bail!("{table} row {id} not found");
        }
        Ok(())
    }

    async fn delete(&self, table: Table, filter: Filter) -> Result<u64> {
        let mut builder = QueryBuilder::<Sqlite>::new("DELETE FROM ");
        builder.push(table.name());
        push_filter(&mut builder, table, filter);
        let result = builder
            .build()
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to delete from {table} by {filter:?}"))?;
        Ok(result.rows_affected())
    }

    async fn select(&self, table: Table, filter: Filter, order_by: OrderBy) -> Result<Vec<Record>> {
        let mut builder = QueryBuilder::<Sqlite>::new("SELECT * FROM ");
        builder.push(table.name());
        push_filter(&mut builder, table, filter);
        builder.push(match order_by {
            OrderBy::Order => " ORDER BY sort_order ASC, id ASC",
            OrderBy::Id => " ORDER BY id ASC",
        });

        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("failed to select from {table} by {filter:?}"))?;
        rows.iter()
            .map(|row| match table {
                Table::Items => item_from_row(row).map(Record::Item),
                Table::Containers => container_from_row(row).map(Record::Container),
            })
            .collect()
    }
}

fn push_item_assignments(builder: &mut QueryBuilder<'_, Sqlite>, patch: ItemPatch) -> usize {
    let mut assigned = 0;
    let mut set = builder.separated(", ");
    if let Some(container_id) = patch.container_id {
        set.push("container_id = ")
            .push_bind_unseparated(container_id.map(|id| id.0));
        assigned += 1;
    }
    if let Some(parent_id) = patch.parent_id {
        set.push("parent_id = ")
            .push_bind_unseparated(parent_id.map(|id| id.0));
        assigned += 1;
    }
    if let Some(title) = patch.title {
        set.push("title = ").push_bind_unseparated(title);
        assigned += 1;
    }
    if let Some(order) = patch.order {
        set.push("sort_order = ").push_bind_unseparated(order);
        assigned += 1;
    }
    if let Some(completed) = patch.completed {
        set.push("completed = ").push_bind_unseparated(completed);
        assigned += 1;
    }
    assigned
}

fn push_container_assignments(
    builder: &mut QueryBuilder<'_, Sqlite>,
    patch: ContainerPatch,
) -> usize {
    let mut assigned = 0;
    let mut set = builder.separated(", ");
    if let Some(name) = patch.name {
        set.push("name = ").push_bind_unseparated(name);
        assigned += 1;
    }
    if let Some(order) = patch.order {
        set.push("sort_order = ").push_bind_unseparated(order);
        assigned += 1;
    }
    if let Some(collapsed) = patch.collapsed {
        set.push("collapsed = ").push_bind_unseparated(collapsed);
        assigned += 1;
    }
    if let Some(archived) = patch.archived {
        set.push("archived = ").push_bind_unseparated(archived);
        assigned += 1;
    }
    assigned
}

fn push_filter(builder: &mut QueryBuilder<'_, Sqlite>, table: Table, filter: Filter) {
    builder.push(" WHERE ");
    match (table, filter) {
        (_, Filter::Id(id)) => {
            builder.push("id = ").push_bind(id);
        }
        (_, Filter::Collection(collection_id)) => {
            builder.push("collection_id = ").push_bind(collection_id.0);
        }
        (Table::Items, Filter::Container(container_id)) => {
            builder.push("container_id = ").push_bind(container_id.0);
        }
        (Table::Containers, Filter::Container(container_id)) => {
            builder.push("id = ").push_bind(container_id.0);
        }
        (Table::Items, Filter::Ungrouped(collection_id)) => {
            builder
                .push("collection_id = ")
                .push_bind(collection_id.0)
                .push(" AND container_id IS NULL");
        }
        (Table::Items, Filter::Parent(parent_id)) => {
            builder.push("parent_id = ").push_bind(parent_id.0);
        }
        (Table::Containers, Filter::Ungrouped(_) | Filter::Parent(_)) => {
            builder.push("0");
        }
    }
}

fn item_from_row(row: &SqliteRow) -> Result<Item> {
    Ok(Item {
        id: ItemId(row.try_get("id")?),
        collection_id: CollectionId(row.try_get("collection_id")?),
        container_id: row.try_get::<Option<i64>, _>("container_id")?.map(ContainerId),
        parent_id: row.try_get::<Option<i64>, _>("parent_id")?.map(ItemId),
        title: row.try_get("title")?,
        order: row.try_get("sort_order")?,
        completed: row.try_get("completed")?,
    })
}

fn container_from_row(row: &SqliteRow) -> Result<Container> {
    Ok(Container {
        id: ContainerId(row.try_get("id")?),
        collection_id: CollectionId(row.try_get("collection_id")?),
        name: row.try_get("name")?,
        order: row.try_get("sort_order")?,
        collapsed: row.try_get("collapsed")?,
        archived: row.try_get("archived")?,
    })
}

fn is_memory_url(database_url: &str) -> bool {
    database_url.contains(":memory:") || database_url.contains("mode=memory")
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }
    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if is_memory_url(database_url) || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/sqlite_tests.rs"]
mod tests;
