use serde_json::json;

use crate::{
    domain::{ContainerId, GroupKey, Item, CollectionId, ItemId},
    error::{ErrorCode, ErrorReport},
    protocol::{BoardEvent, ItemMove, MoveDescriptor, MutationKind, MutationTag},
};

#[test]
fn item_move_descriptor_uses_tagged_wire_shape() {
    let descriptor = MoveDescriptor::Item(ItemMove {
        item_id: ItemId(7),
        from: GroupKey::Ungrouped,
        to: GroupKey::Container(ContainerId(3)),
        destination_index: 2,
    });

    let value = serde_json::to_value(descriptor).expect("serialize");
    assert_eq!(
        value,
        json!({
            "type": "item",
            "payload": {
                "item_id": 7,
                "from": { "kind": "ungrouped" },
                "to": { "kind": "container", "id": 3 },
                "destination_index": 2
            }
        })
    );
}

#[test]
fn write_failed_event_carries_error_report() {
    let event = BoardEvent::WriteFailed {
        mutation: MutationTag {
            ticket: 4,
            kind: MutationKind::ArchiveContainer,
        },
        error: ErrorReport::new(ErrorCode::Persistence, "disk full"),
    };

    let value = serde_json::to_value(&event).expect("serialize");
    assert_eq!(value["type"], "write_failed");
    assert_eq!(value["payload"]["mutation"]["kind"], "archive_container");
    assert_eq!(value["payload"]["error"]["code"], "persistence");

    let decoded: BoardEvent = serde_json::from_value(value).expect("deserialize");
    assert_eq!(decoded, event);
}

#[test]
fn ungrouped_item_omits_container_field() {
    let item = Item::new(CollectionId(1), None, "write docs", 1.0);
    let value = serde_json::to_value(&item).expect("serialize");
    assert!(value.get("container_id").is_none());
    assert!(value.get("parent_id").is_none());
    assert_eq!(item.group(), GroupKey::Ungrouped);
    assert!(!item.id.is_assigned());
}

#[test]
fn mutation_tag_display_names_kind_and_ticket() {
    let tag = MutationTag {
        ticket: 12,
        kind: MutationKind::MoveItem,
    };
    assert_eq!(tag.to_string(), "move_item#12");
}
