use super::*;
use shared::domain::{CollectionId, Container, Item};

use crate::{grouping, snapshot::BoardSnapshot};

const BOARD: CollectionId = CollectionId(1);
const LEFT: ContainerId = ContainerId(10);
const RIGHT: ContainerId = ContainerId(20);

fn fixture() -> GroupedView {
    let containers = [LEFT, RIGHT].into_iter().enumerate().map(|(index, id)| Container {
        id,
        ..Container::new(BOARD, format!("column-{index}"), index as f64)
    });
    let items = (1..=3).map(|id| Item {
        id: ItemId(id),
        ..Item::new(BOARD, Some(LEFT), format!("card-{id}"), id as f64)
    });
    grouping::view(&BoardSnapshot::new(containers, items), BOARD)
}

fn left(index: usize) -> DropTarget {
    DropTarget::Item {
        group: GroupKey::Container(LEFT),
        index,
    }
}

#[test]
fn hover_then_release_produces_an_item_move() {
    let view = fixture();
    let mut session = DragSession::new();
    session
        .begin(
            &view,
            DragSource::Item {
                group: GroupKey::Container(LEFT),
                index: 0,
            },
        )
        .expect("begin");
    assert!(session.hover(DropTarget::Item {
        group: GroupKey::Container(RIGHT),
        index: 0,
    }));

    let outcome = session.release();
    assert_eq!(
        outcome.into_descriptor(),
        Some(MoveDescriptor::Item(ItemMove {
            item_id: ItemId(1),
            from: GroupKey::Container(LEFT),
            to: GroupKey::Container(RIGHT),
            destination_index: 0,
        }))
    );
    assert_eq!(session.state(), DragState::Idle);
}

#[test]
fn releasing_next_to_itself_is_a_no_op() {
    let view = fixture();
    for slot in [1, 2] {
        let mut session = DragSession::new();
        session
            .begin(
                &view,
                DragSource::Item {
                    group: GroupKey::Container(LEFT),
                    index: 1,
                },
            )
            .expect("begin");
        session.hover(left(slot));
        assert_eq!(session.release(), DragOutcome::NoOp, "slot {slot}");
    }
}

#[test]
fn releasing_outside_a_target_cancels() {
    let view = fixture();
    let mut session = DragSession::new();
    session
        .begin(&view, DragSource::Container { index: 0 })
        .expect("begin");
    assert!(session.hover(DropTarget::Container { index: 2 }));
    session.leave();
    assert!(matches!(session.state(), DragState::Dragging { .. }));
    assert_eq!(session.release(), DragOutcome::Cancelled);
}

#[test]
fn mismatched_target_kind_counts_as_leaving() {
    let view = fixture();
    let mut session = DragSession::new();
    session
        .begin(&view, DragSource::Container { index: 1 })
        .expect("begin");
    assert!(session.hover(DropTarget::Container { index: 0 }));
    assert!(!session.hover(left(0)));
    assert!(matches!(session.state(), DragState::Dragging { .. }));

    assert!(session.hover(DropTarget::Container { index: 0 }));
    assert_eq!(
        session.release(),
        DragOutcome::Dropped(MoveDescriptor::Container(ContainerMove {
            container_id: RIGHT,
            destination_index: 0,
        }))
    );
}

#[test]
fn cancel_resets_from_any_state() {
    let view = fixture();
    let mut session = DragSession::new();
    session
        .begin(
            &view,
            DragSource::Item {
                group: GroupKey::Container(LEFT),
                index: 2,
            },
        )
        .expect("begin");
    session.hover(left(0));
    session.cancel();
    assert!(!session.is_active());
    assert!(!session.hover(left(0)));
    assert_eq!(session.release(), DragOutcome::Cancelled);
}

#[test]
fn begin_rejects_unknown_positions_and_nested_drags() {
    let view = fixture();
    let mut session = DragSession::new();
    assert!(session
        .begin(
            &view,
            DragSource::Item {
                group: GroupKey::Container(RIGHT),
                index: 0,
            },
        )
        .is_err());
    assert!(session
        .begin(&view, DragSource::Container { index: 5 })
        .is_err());
    assert!(!session.is_active());

    session
        .begin(&view, DragSource::Container { index: 0 })
        .expect("begin");
    assert!(matches!(
        session.begin(&view, DragSource::Container { index: 1 }),
        Err(EngineError::InvalidMove(_))
    ));
}
