//! Reversible compound edit operations.
//!
//! Every operation implements [`Command`]: `apply` validates first and then
//! performs store writes, synchronization updates and a layout refresh as
//! one unit; `revert` replays the exact inverse from the snapshot taken
//! during `apply`, never re-deriving state from business rules. A caller
//! owns the [`CommandHistory`] collecting them.

mod message;
mod paste;
mod signal;

pub use message::{
    AddMessage, ChangeMessageDirection, DeleteMessage, InsertMessage, SetMessageProperties,
};
pub use paste::{PasteMessages, PasteSignals, clip_message};
pub use signal::{AddSignal, DeleteSignal, InsertSignal, MoveSignal, SetSignalProperties};

use tracing::debug;

use crate::layout::BitGrid;
use crate::store::SystemStore;
use crate::sync::SyncEngine;
use crate::types::errors::CommandError;
use crate::types::reference::MessageReference;

/// One reversible edit operation.
///
/// `apply` is all-or-nothing: it rejects (without mutating) or commits the
/// store write, the group update and the layout recomputation together.
/// `revert` undoes exactly what the preceding `apply` did.
pub trait Command<S: SystemStore> {
    fn apply(&mut self, store: &mut S, engine: &mut SyncEngine) -> Result<(), CommandError>;
    fn revert(&mut self, store: &mut S, engine: &mut SyncEngine) -> Result<(), CommandError>;
}

/// Caller-owned undo/redo stacks.
///
/// A successfully executed command lands on the undo stack and clears the
/// redo stack. A command that fails to apply is dropped.
pub struct CommandHistory<S: SystemStore> {
    done: Vec<Box<dyn Command<S>>>,
    undone: Vec<Box<dyn Command<S>>>,
}

impl<S: SystemStore> Default for CommandHistory<S> {
    fn default() -> Self {
        Self {
            done: Vec::new(),
            undone: Vec::new(),
        }
    }
}

impl<S: SystemStore> CommandHistory<S> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn can_undo(&self) -> bool {
        !self.done.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.undone.is_empty()
    }

    /// Applies `command` and records it for undo.
    pub fn execute(
        &mut self,
        mut command: Box<dyn Command<S>>,
        store: &mut S,
        engine: &mut SyncEngine,
    ) -> Result<(), CommandError> {
        command.apply(store, engine)?;
        self.done.push(command);
        self.undone.clear();
        Ok(())
    }

    pub fn undo(&mut self, store: &mut S, engine: &mut SyncEngine) -> Result<(), CommandError> {
        let mut command = self.done.pop().ok_or(CommandError::NothingToUndo)?;
        command.revert(store, engine)?;
        self.undone.push(command);
        Ok(())
    }

    pub fn redo(&mut self, store: &mut S, engine: &mut SyncEngine) -> Result<(), CommandError> {
        let mut command = self.undone.pop().ok_or(CommandError::NothingToRedo)?;
        command.apply(store, engine)?;
        self.done.push(command);
        Ok(())
    }
}

/// Recomputes the payload grid of a touched message so occupancy never goes
/// stale; findings are only logged, rendering them is the host's concern.
pub(crate) fn refresh_layout<S: SystemStore>(store: &S, reference: &MessageReference) {
    if let Some(record) = store.message(reference) {
        let signals = store.signals(reference).unwrap_or(&[]);
        let mut grid = BitGrid::new();
        let diag = grid.recompute(
            signals,
            record.dlc,
            reference.protocol.policy(),
            None,
        );
        if !diag.is_valid() {
            debug!(?reference, ?diag, "layout diagnostics after edit");
        }
    }
}

/// All references the edit must touch: the whole group when the message
/// belongs to one, just the reference itself otherwise. Conflict members are
/// not synchronized, so edits there stay local to the named copy.
pub(crate) fn edit_targets(
    engine: &SyncEngine,
    reference: &MessageReference,
) -> Vec<MessageReference> {
    if engine.group_id(reference).is_some() {
        engine.matching_references(reference)
    } else {
        vec![*reference]
    }
}
