use std::{path::PathBuf, sync::Arc};

use anyhow::{bail, Context, Result};
use board_core::{BoardEngine, GroupedView, PendingWrite};
use clap::{Parser, Subcommand};
use serde::Serialize;
use shared::{
    domain::{CollectionId, Container, ContainerId, ContainerRef, GroupKey, Item, ItemId},
    protocol::{ContainerMove, ItemMove},
};
use storage::SqliteStore;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod config;

use config::{load_settings, normalize_database_url, DEFAULT_CONFIG_FILE};

#[derive(Parser, Debug)]
#[command(about = "Inspect and edit boards stored in SQLite")]
struct Cli {
    /// Overrides `database_url` from the settings file.
    #[arg(long)]
    database_url: Option<String>,
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
    #[arg(long, default_value_t = 1)]
    collection: i64,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Creates the database and applies migrations.
    Init,
    AddContainer {
        name: String,
    },
    AddItem {
        title: String,
        #[arg(long, conflicts_with = "parent")]
        container: Option<i64>,
        #[arg(long)]
        parent: Option<i64>,
    },
    Show {
        #[arg(long)]
        json: bool,
    },
    /// Moves an item to insertion slot `index` of a container (or the
    /// ungrouped bucket when `--container` is omitted).
    MoveItem {
        item: i64,
        #[arg(long)]
        container: Option<i64>,
        #[arg(long)]
        index: usize,
    },
    MoveContainer {
        container: i64,
        #[arg(long)]
        index: usize,
    },
    Archive {
        container: i64,
    },
    Unarchive {
        container: i64,
    },
    /// Deletes a container and its items, or every ungrouped item.
    DeleteContainer {
        #[arg(required_unless_present = "ungrouped")]
        container: Option<i64>,
        #[arg(long)]
        ungrouped: bool,
    },
    DeleteCollection,
    RenameContainer {
        container: i64,
        name: String,
    },
    Complete {
        item: i64,
        #[arg(long)]
        undo: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = load_settings(&cli.config)?;
    let database_url =
        normalize_database_url(cli.database_url.as_deref().unwrap_or(&settings.database_url));
    let store = SqliteStore::new(&database_url).await.map_err(|err| {
        error!(%database_url, "boardctl: failed to open board database: {err:#}");
        err
    })?;

    if let Command::Init = cli.command {
        store.health_check().await?;
        info!(%database_url, "boardctl: database ready");
        println!("initialized {database_url}");
        return Ok(());
    }

    let collection = CollectionId(cli.collection);
    let engine = BoardEngine::with_config(Arc::new(store), settings.engine);
    engine.load_collection(collection).await?;

    match cli.command {
        Command::Init => {}
        Command::AddContainer { name } => {
            let container = engine.add_container(collection, &name).await?;
            println!("created container_id={}", container.id);
        }
        Command::AddItem {
            title,
            container,
            parent,
        } => {
            let item = match parent {
                Some(parent) => engine.add_sub_item(ItemId(parent), &title).await?,
                None => {
                    let group = GroupKey::from(container.map(ContainerId));
                    engine.add_item(collection, group, &title).await?
                }
            };
            println!("created item_id={}", item.id);
        }
        Command::Show { json } => {
            let view = engine.view(collection);
            if json {
                let dump = BoardDump::new(&engine, &view);
                println!("{}", serde_json::to_string_pretty(&dump)?);
            } else {
                print_view(&engine, &view);
            }
        }
        Command::MoveItem {
            item,
            container,
            index,
        } => {
            let item_id = ItemId(item);
            let from = engine
                .snapshot()
                .item(item_id)
                .map(Item::group)
                .with_context(|| format!("item {item_id} not found in collection {collection}"))?;
            let request = ItemMove {
                item_id,
                from,
                to: GroupKey::from(container.map(ContainerId)),
                destination_index: index,
            };
            settle(engine.move_item(request)?).await?;
        }
        Command::MoveContainer { container, index } => {
            let request = ContainerMove {
                container_id: ContainerId(container),
                destination_index: index,
            };
            settle(engine.move_container(request)?).await?;
        }
        Command::Archive { container } => {
            settle(engine.archive_container(ContainerId(container))?).await?;
        }
        Command::Unarchive { container } => {
            settle(engine.unarchive_container(ContainerId(container))?).await?;
        }
        Command::DeleteContainer {
            container,
            ungrouped,
        } => {
            let target = match (container, ungrouped) {
                (Some(id), false) => ContainerRef::Container(ContainerId(id)),
                (None, true) => ContainerRef::Ungrouped(collection),
                _ => bail!("pass either a container id or --ungrouped"),
            };
            settle(engine.delete_container(target)?).await?;
        }
        Command::DeleteCollection => {
            settle(engine.delete_collection(collection)?).await?;
        }
        Command::RenameContainer { container, name } => {
            settle(engine.rename_container(ContainerId(container), &name)?).await?;
        }
        Command::Complete { item, undo } => {
            settle(engine.set_item_completed(ItemId(item), !undo)?).await?;
        }
    }

    Ok(())
}

async fn settle(pending: PendingWrite) -> Result<()> {
    let Some(tag) = pending.tag().cloned() else {
        println!("nothing to change");
        return Ok(());
    };
    pending.settled().await?;
    println!("applied {tag}");
    Ok(())
}

fn print_view(engine: &BoardEngine, view: &GroupedView) {
    let print_items = |items: &[Item]| {
        for item in items {
            println!("  {}", item_line(item));
            for sub_item in engine.sub_items_of(item.id) {
                println!("    {}", item_line(&sub_item));
            }
        }
    };

    for container in &view.containers {
        let mut flags = Vec::new();
        if container.archived {
            flags.push("archived");
        }
        if container.collapsed {
            flags.push("collapsed");
        }
        let flags = if flags.is_empty() {
            String::new()
        } else {
            format!(" ({})", flags.join(", "))
        };
        println!("[{}] {}{flags}", container.id, container.name);
        print_items(view.items(GroupKey::Container(container.id)));
    }
    if view.has_ungrouped() {
        println!("[ungrouped]");
        print_items(view.items(GroupKey::Ungrouped));
    }
}

fn item_line(item: &Item) -> String {
    let mark = if item.completed { "x" } else { " " };
    format!("[{mark}] {} {} (order {})", item.id, item.title, item.order)
}

#[derive(Serialize)]
struct BoardDump<'a> {
    collection_id: CollectionId,
    containers: Vec<ContainerDump<'a>>,
    ungrouped: Vec<ItemDump>,
}

#[derive(Serialize)]
struct ContainerDump<'a> {
    #[serde(flatten)]
    container: &'a Container,
    items: Vec<ItemDump>,
}

#[derive(Serialize)]
struct ItemDump {
    #[serde(flatten)]
    item: Item,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    sub_items: Vec<Item>,
}

impl<'a> BoardDump<'a> {
    fn new(engine: &BoardEngine, view: &'a GroupedView) -> Self {
        let dump_items = |group: GroupKey| -> Vec<ItemDump> {
            view.items(group)
                .iter()
                .map(|item| ItemDump {
                    item: item.clone(),
                    sub_items: engine.sub_items_of(item.id),
                })
                .collect()
        };
        Self {
            collection_id: view.collection_id,
            containers: view
                .containers
                .iter()
                .map(|container| ContainerDump {
                    container,
                    items: dump_items(GroupKey::Container(container.id)),
                })
                .collect(),
            ungrouped: dump_items(GroupKey::Ungrouped),
        }
    }
}
