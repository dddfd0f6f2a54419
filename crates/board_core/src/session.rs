//! Drag gesture state machine.
//!
//! A session only tracks what is being dragged and where it would land. It
//! never touches the snapshot; releasing over a valid target yields a
//! [`MoveDescriptor`] for the engine to plan and apply.

use shared::{
    domain::{ContainerId, GroupKey, ItemId},
    protocol::{ContainerMove, ItemMove, MoveDescriptor},
};
use tracing::debug;

use crate::{error::EngineError, grouping::GroupedView};

/// What the pointer picked up, as a position in the displayed view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragSource {
    Item { group: GroupKey, index: usize },
    Container { index: usize },
}

/// Insertion slot under the pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropTarget {
    Item { group: GroupKey, index: usize },
    Container { index: usize },
}

/// A drag source resolved to the entity it refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragSubject {
    Item {
        item_id: ItemId,
        group: GroupKey,
        index: usize,
    },
    Container {
        container_id: ContainerId,
        index: usize,
    },
}

impl DragSubject {
    fn accepts(&self, target: &DropTarget) -> bool {
        matches!(
            (self, target),
            (DragSubject::Item { .. }, DropTarget::Item { .. })
                | (DragSubject::Container { .. }, DropTarget::Container { .. })
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DragState {
    #[default]
    Idle,
    Dragging {
        subject: DragSubject,
    },
    Hovering {
        subject: DragSubject,
        target: DropTarget,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragOutcome {
    Dropped(MoveDescriptor),
    /// Released over the slot the entity already occupies.
    NoOp,
    Cancelled,
}

impl DragOutcome {
    pub fn into_descriptor(self) -> Option<MoveDescriptor> {
        match self {
            DragOutcome::Dropped(descriptor) => Some(descriptor),
            DragOutcome::NoOp | DragOutcome::Cancelled => None,
        }
    }
}

#[derive(Debug, Default)]
pub struct DragSession {
    state: DragState,
}

impl DragSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> DragState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state != DragState::Idle
    }

    pub fn begin(&mut self, view: &GroupedView, source: DragSource) -> Result<(), EngineError> {
        if self.is_active() {
            return Err(EngineError::invalid_move("a drag is already in progress"));
        }
        let subject = match source {
            DragSource::Item { group, index } => {
                let item = view.items(group).get(index).ok_or_else(|| {
                    EngineError::invalid_move(format!("no item at {group}[{index}]"))
                })?;
                DragSubject::Item {
                    item_id: item.id,
                    group,
                    index,
                }
            }
            DragSource::Container { index } => {
                let container = view.containers.get(index).ok_or_else(|| {
                    EngineError::invalid_move(format!("no container at index {index}"))
                })?;
                DragSubject::Container {
                    container_id: container.id,
                    index,
                }
            }
        };
        self.state = DragState::Dragging { subject };
        Ok(())
    }

    /// Returns whether the target was accepted. A target of the wrong kind
    /// counts as leaving the current one.
    pub fn hover(&mut self, target: DropTarget) -> bool {
        let subject = match self.state {
            DragState::Idle => return false,
            DragState::Dragging { subject } | DragState::Hovering { subject, .. } => subject,
        };
        if !subject.accepts(&target) {
            self.state = DragState::Dragging { subject };
            return false;
        }
        self.state = DragState::Hovering { subject, target };
        true
    }

    pub fn leave(&mut self) {
        if let DragState::Hovering { subject, .. } = self.state {
            self.state = DragState::Dragging { subject };
        }
    }

    pub fn cancel(&mut self) {
        self.state = DragState::Idle;
    }

    /// Ends the gesture. Releasing while not over a target cancels it.
    pub fn release(&mut self) -> DragOutcome {
        let state = std::mem::take(&mut self.state);
        let outcome = match state {
            DragState::Idle | DragState::Dragging { .. } => DragOutcome::Cancelled,
            DragState::Hovering { subject, target } => resolve(subject, target),
        };
        debug!(?outcome, "drag released");
        outcome
    }
}

fn resolve(subject: DragSubject, target: DropTarget) -> DragOutcome {
    match (subject, target) {
        (
            DragSubject::Item {
                item_id,
                group,
                index,
            },
            DropTarget::Item {
                group: to,
                index: slot,
            },
        ) => {
            if group == to && lands_in_place(index, slot) {
                return DragOutcome::NoOp;
            }
            DragOutcome::Dropped(MoveDescriptor::Item(ItemMove {
                item_id,
                from: group,
                to,
                destination_index: slot,
            }))
        }
        (
            DragSubject::Container {
                container_id,
                index,
            },
            DropTarget::Container { index: slot },
        ) => {
            if lands_in_place(index, slot) {
                return DragOutcome::NoOp;
            }
            DragOutcome::Dropped(MoveDescriptor::Container(ContainerMove {
                container_id,
                destination_index: slot,
            }))
        }
        _ => DragOutcome::Cancelled,
    }
}

/// Slot `index` is just before the entity and `index + 1` just after it.
fn lands_in_place(index: usize, slot: usize) -> bool {
    slot == index || slot == index + 1
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
