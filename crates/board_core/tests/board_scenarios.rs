use std::{collections::BTreeMap, sync::Arc};

use board_core::{BoardEngine, DragSession, DragSource, DropTarget, EngineConfig};
use shared::{
    domain::{CollectionId, ContainerRef, GroupKey, ItemId},
    protocol::{ContainerMove, ItemMove},
};
use storage::{Filter, MemoryStore, OrderBy, Record, RecordStore, Table};

const BOARD: CollectionId = CollectionId(1);

fn engine_over(store: &Arc<MemoryStore>) -> BoardEngine {
    BoardEngine::with_config(store.clone(), EngineConfig::fail_fast())
}

async fn set_completed(engine: &BoardEngine, id: ItemId, completed: bool) {
    engine
        .set_item_completed(id, completed)
        .expect("plan")
        .settled()
        .await
        .expect("persisted");
}

/// Every sibling list, top-level per group and sub-items per parent, holds
/// distinct keys in both tiers.
fn assert_distinct_sibling_orders(engine: &BoardEngine) {
    let snapshot = engine.snapshot();
    let mut lists: BTreeMap<(GroupKey, Option<ItemId>), Vec<f64>> = BTreeMap::new();
    for item in snapshot.items() {
        lists
            .entry((item.group(), item.parent_id))
            .or_default()
            .push(item.order);
    }
    for (siblings, mut orders) in lists {
        orders.sort_by(f64::total_cmp);
        assert!(
            orders.windows(2).all(|pair| pair[0] < pair[1]),
            "duplicate order keys in {siblings:?}: {orders:?}"
        );
    }
}

async fn stored_item_order(store: &MemoryStore, id: ItemId) -> f64 {
    store
        .select(Table::Items, Filter::Id(id.0), OrderBy::Id)
        .await
        .expect("select")
        .into_iter()
        .find_map(Record::into_item)
        .map(|item| item.order)
        .expect("stored item")
}

#[tokio::test]
async fn moving_the_first_item_down_bisects_and_persists() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine_over(&store);
    let todo = engine.add_container(BOARD, "Todo").await.expect("container");
    let group = GroupKey::Container(todo.id);
    let mut ids = Vec::new();
    for title in ["one", "two", "three"] {
        ids.push(engine.add_item(BOARD, group, title).await.expect("item").id);
    }

    engine
        .move_item(ItemMove {
            item_id: ids[0],
            from: group,
            to: group,
            destination_index: 2,
        })
        .expect("move")
        .settled()
        .await
        .expect("persisted");

    let orders: Vec<f64> = engine
        .view(BOARD)
        .items(group)
        .iter()
        .map(|item| item.order)
        .collect();
    assert_eq!(orders, [2.0, 2.5, 3.0]);
    assert_eq!(stored_item_order(&store, ids[0]).await, 2.5);
}

#[tokio::test]
async fn moving_into_an_empty_container_seeds_its_order() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine_over(&store);
    let todo = engine.add_container(BOARD, "Todo").await.expect("todo");
    let done = engine.add_container(BOARD, "Done").await.expect("done");
    let item = engine
        .add_item(BOARD, GroupKey::Container(todo.id), "ship")
        .await
        .expect("item");
    let child = engine.add_sub_item(item.id, "tests").await.expect("child");

    engine
        .move_item(ItemMove {
            item_id: item.id,
            from: GroupKey::Container(todo.id),
            to: GroupKey::Container(done.id),
            destination_index: 0,
        })
        .expect("move")
        .settled()
        .await
        .expect("persisted");

    let snapshot = engine.snapshot();
    let moved = snapshot.item(item.id).expect("moved");
    assert_eq!(moved.order, 1.0);
    assert_eq!(moved.container_id, Some(done.id));
    assert_eq!(
        snapshot.item(child.id).and_then(|child| child.container_id),
        Some(done.id)
    );

    let reloaded = engine_over(&store);
    reloaded.load_collection(BOARD).await.expect("reload");
    assert_eq!(reloaded.snapshot(), engine.snapshot());
}

#[tokio::test]
async fn archive_completes_members_and_unarchive_leaves_them_completed() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine_over(&store);
    let sprint = engine.add_container(BOARD, "Sprint").await.expect("container");
    let group = GroupKey::Container(sprint.id);
    let mut ids = Vec::new();
    for title in ["a", "b", "c"] {
        ids.push(engine.add_item(BOARD, group, title).await.expect("item").id);
    }
    engine
        .set_item_completed(ids[2], true)
        .expect("complete")
        .settled()
        .await
        .expect("persisted");

    engine
        .archive_container(sprint.id)
        .expect("archive")
        .settled()
        .await
        .expect("persisted");
    let snapshot = engine.snapshot();
    assert!(snapshot.container(sprint.id).expect("sprint").archived);
    assert!(ids
        .iter()
        .all(|id| snapshot.item(*id).is_some_and(|item| item.completed)));

    engine
        .unarchive_container(sprint.id)
        .expect("unarchive")
        .settled()
        .await
        .expect("persisted");
    let snapshot = engine.snapshot();
    assert!(!snapshot.container(sprint.id).expect("sprint").archived);
    assert!(ids
        .iter()
        .all(|id| snapshot.item(*id).is_some_and(|item| item.completed)));

    let reloaded = engine_over(&store);
    reloaded.load_collection(BOARD).await.expect("reload");
    assert_eq!(reloaded.snapshot(), engine.snapshot());
}

#[tokio::test]
async fn deleting_a_container_leaves_no_dangling_items() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine_over(&store);
    let doomed = engine.add_container(BOARD, "Doomed").await.expect("doomed");
    let keep = engine.add_container(BOARD, "Keep").await.expect("keep");
    for index in 0..4 {
        let item = engine
            .add_item(BOARD, GroupKey::Container(doomed.id), &format!("task {index}"))
            .await
            .expect("item");
        engine.add_sub_item(item.id, "step").await.expect("sub-item");
    }
    let survivor = engine
        .add_item(BOARD, GroupKey::Container(keep.id), "survivor")
        .await
        .expect("survivor");
    assert_eq!(store.item_count().await, 9);

    engine
        .delete_container(ContainerRef::Container(doomed.id))
        .expect("delete")
        .settled()
        .await
        .expect("persisted");

    let snapshot = engine.snapshot();
    assert!(snapshot.container(doomed.id).is_none());
    let remaining: Vec<ItemId> = snapshot.items().map(|item| item.id).collect();
    assert_eq!(remaining, [survivor.id]);
    assert_eq!(store.item_count().await, 1);
    assert_eq!(store.container_count().await, 1);
}

#[tokio::test]
async fn deleting_a_collection_clears_storage() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine_over(&store);
    let column = engine.add_container(BOARD, "Column").await.expect("column");
    engine
        .add_item(BOARD, GroupKey::Container(column.id), "grouped")
        .await
        .expect("grouped");
    engine
        .add_item(BOARD, GroupKey::Ungrouped, "loose")
        .await
        .expect("loose");
    engine
        .add_item(CollectionId(2), GroupKey::Ungrouped, "other board")
        .await
        .expect("other");

    engine
        .delete_collection(BOARD)
        .expect("delete")
        .settled()
        .await
        .expect("persisted");

    assert_eq!(store.container_count().await, 0);
    assert_eq!(store.item_count().await, 1);
    assert!(engine.view(BOARD).items_by_group.is_empty());
}

#[tokio::test]
async fn dragging_the_last_container_to_the_front_rewrites_dense_orders() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine_over(&store);
    let mut ids = Vec::new();
    for name in ["S1", "S2", "S3"] {
        ids.push(engine.add_container(BOARD, name).await.expect("container").id);
    }

    let mut session = DragSession::new();
    session
        .begin(&engine.view(BOARD), DragSource::Container { index: 2 })
        .expect("begin");
    assert!(session.hover(DropTarget::Container { index: 0 }));
    let descriptor = session.release().into_descriptor().expect("descriptor");
    engine
        .apply_descriptor(descriptor)
        .expect("apply")
        .settled()
        .await
        .expect("persisted");

    let snapshot = engine.snapshot();
    let orders: Vec<f64> = ids
        .iter()
        .map(|id| snapshot.container(*id).expect("container").order)
        .collect();
    assert_eq!(orders, [1.0, 2.0, 0.0]);

    let no_op = engine
        .move_container(ContainerMove {
            container_id: ids[2],
            destination_index: 1,
        })
        .expect("move");
    assert!(no_op.is_noop());
    assert!(Arc::ptr_eq(&snapshot, &engine.snapshot()));
}

#[tokio::test]
async fn repeated_bisection_eventually_renormalizes() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine_over(&store);
    let group = GroupKey::Ungrouped;
    let mut ids = Vec::new();
    for title in ["left", "right", "mover", "other"] {
        ids.push(engine.add_item(BOARD, group, title).await.expect("item").id);
    }

    // Keep dropping the last item between the first two.
    for _ in 0..80 {
        let view = engine.view(BOARD);
        let (_, index) = view.position_of(ids[3]).expect("position");
        let target = if index == 1 { ids[2] } else { ids[3] };
        engine
            .move_item(ItemMove {
                item_id: target,
                from: group,
                to: group,
                destination_index: 1,
            })
            .expect("move")
            .settled()
            .await
            .expect("persisted");
    }

    let orders: Vec<f64> = engine
        .view(BOARD)
        .items(group)
        .iter()
        .map(|item| item.order)
        .collect();
    assert!(orders.windows(2).all(|pair| pair[0] < pair[1]), "{orders:?}");
    assert_eq!(orders[0], 0.0, "the untouched first item only moves through renormalization");

    let reloaded = engine_over(&store);
    reloaded.load_collection(BOARD).await.expect("reload");
    assert_eq!(reloaded.snapshot(), engine.snapshot());
}

#[tokio::test]
async fn reparent_rejections_leave_state_untouched() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine_over(&store);
    let parent = engine
        .add_item(BOARD, GroupKey::Ungrouped, "parent")
        .await
        .expect("parent");
    let child = engine.add_sub_item(parent.id, "child").await.expect("child");
    let before = engine.snapshot();

    assert!(engine.reparent_item(parent.id, Some(parent.id), 0).is_err());
    assert!(engine.reparent_item(parent.id, Some(child.id), 0).is_err());
    assert!(Arc::ptr_eq(&before, &engine.snapshot()));

    engine
        .reparent_item(child.id, None, 0)
        .expect("lift")
        .settled()
        .await
        .expect("persisted");
    let view = engine.view(BOARD);
    assert_eq!(view.position_of(child.id), Some((GroupKey::Ungrouped, 0)));
}

#[tokio::test]
async fn completing_and_reopening_never_duplicates_order_keys() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine_over(&store);
    let todo = engine.add_container(BOARD, "Todo").await.expect("container");
    let group = GroupKey::Container(todo.id);

    let a = engine.add_item(BOARD, group, "a").await.expect("a");
    let b = engine.add_item(BOARD, group, "b").await.expect("b");
    set_completed(&engine, b.id, true).await;
    let c = engine.add_item(BOARD, group, "c").await.expect("c");
    assert_distinct_sibling_orders(&engine);

    set_completed(&engine, b.id, false).await;
    set_completed(&engine, a.id, true).await;
    let d = engine.add_item(BOARD, group, "d").await.expect("d");
    assert_distinct_sibling_orders(&engine);

    let first = engine.add_sub_item(c.id, "first step").await.expect("sub-item");
    set_completed(&engine, first.id, true).await;
    engine
        .add_sub_item(c.id, "second step")
        .await
        .expect("sub-item");
    assert_distinct_sibling_orders(&engine);

    // The bisected key lands on the completed item's key.
    engine
        .move_item(ItemMove {
            item_id: d.id,
            from: group,
            to: group,
            destination_index: 0,
        })
        .expect("move")
        .settled()
        .await
        .expect("persisted");
    assert_distinct_sibling_orders(&engine);

    let view = engine.view(BOARD);
    let titles: Vec<&str> = view
        .items(group)
        .iter()
        .map(|item| item.title.as_str())
        .collect();
    assert_eq!(titles, ["d", "b", "c", "a"]);

    let reloaded = engine_over(&store);
    reloaded.load_collection(BOARD).await.expect("reload");
    assert_eq!(reloaded.snapshot(), engine.snapshot());
}
