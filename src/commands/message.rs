use tracing::debug;

use crate::check::{check_direction_change, check_message_id, check_signal_list};
use crate::commands::{Command, edit_targets, refresh_layout};
use crate::store::SystemStore;
use crate::sync::SyncEngine;
use crate::types::errors::{CommandError, StoreError, ValidationError};
use crate::types::record::{MessageRecord, SignalRecord};
use crate::types::reference::{Direction, MessageReference, id_to_hex, max_can_id};

pub(crate) fn check_record_ranges(record: &MessageRecord) -> Result<(), ValidationError> {
    if record.can_id > max_can_id(record.extended) {
        return Err(ValidationError::IdOutOfRange {
            id_hex: id_to_hex(record.can_id),
            format: if record.extended {
                "extended".to_string()
            } else {
                "standard".to_string()
            },
        });
    }
    if record.dlc == 0 || record.dlc > 8 {
        return Err(ValidationError::DlcOutOfRange { dlc: record.dlc });
    }
    Ok(())
}

/// Appends a message copy to the container named by `target` (the target's
/// own `index` is ignored).
///
/// The copy joins the synchronization group of its CAN-ID; a second
/// transmitting copy is recorded as a critical conflict rather than
/// rejected. Name and ID policy checks stay with the host's validation
/// surface.
pub struct AddMessage {
    target: MessageReference,
    record: MessageRecord,
    signals: Vec<SignalRecord>,
    applied: Option<MessageReference>,
}

impl AddMessage {
    pub fn new(target: MessageReference, record: MessageRecord, signals: Vec<SignalRecord>) -> Self {
        Self {
            target,
            record,
            signals,
            applied: None,
        }
    }

    /// Reference created by the last successful `apply`.
    pub fn applied_reference(&self) -> Option<MessageReference> {
        self.applied
    }
}

impl<S: SystemStore> Command<S> for AddMessage {
    fn apply(&mut self, store: &mut S, engine: &mut SyncEngine) -> Result<(), CommandError> {
        check_record_ranges(&self.record)?;
        check_signal_list(&self.signals, self.record.dlc, self.target.protocol)?;

        let reference = self.target.with_index(store.message_count(&self.target));
        store.insert_message(&reference, self.record.clone(), self.signals.clone())?;
        engine.update_indices_to_new_message(&reference);
        engine.register_if_necessary(store, &reference);
        refresh_layout(store, &reference);
        debug!(?reference, name = %self.record.name, "message added");
        self.applied = Some(reference);
        Ok(())
    }

    fn revert(&mut self, store: &mut S, engine: &mut SyncEngine) -> Result<(), CommandError> {
        let reference = self.applied.take().ok_or(CommandError::NotApplied)?;
        let (record, signals) = store.delete_message(&reference)?;
        engine.remove_and_update_indices(&reference, true);
        self.record = record;
        self.signals = signals;
        Ok(())
    }
}

/// Inserts a message copy at an explicit list position, shifting later
/// entries up.
pub struct InsertMessage {
    target: MessageReference,
    record: MessageRecord,
    signals: Vec<SignalRecord>,
    applied: bool,
}

impl InsertMessage {
    pub fn new(target: MessageReference, record: MessageRecord, signals: Vec<SignalRecord>) -> Self {
        Self {
            target,
            record,
            signals,
            applied: false,
        }
    }
}

impl<S: SystemStore> Command<S> for InsertMessage {
    fn apply(&mut self, store: &mut S, engine: &mut SyncEngine) -> Result<(), CommandError> {
        check_record_ranges(&self.record)?;
        check_signal_list(&self.signals, self.record.dlc, self.target.protocol)?;
        if self.target.index > store.message_count(&self.target) {
            return Err(StoreError::MessageMissing {
                reference: self.target,
            }
            .into());
        }

        store.insert_message(&self.target, self.record.clone(), self.signals.clone())?;
        engine.update_indices_to_new_message(&self.target);
        engine.register_if_necessary(store, &self.target);
        refresh_layout(store, &self.target);
        self.applied = true;
        Ok(())
    }

    fn revert(&mut self, store: &mut S, engine: &mut SyncEngine) -> Result<(), CommandError> {
        if !self.applied {
            return Err(CommandError::NotApplied);
        }
        let (record, signals) = store.delete_message(&self.target)?;
        engine.remove_and_update_indices(&self.target, true);
        self.record = record;
        self.signals = signals;
        self.applied = false;
        Ok(())
    }
}

/// Deletes one message copy, capturing its full state for undo.
///
/// Only the named copy is removed; other members of its group survive. The
/// group itself is deleted once its last member goes.
pub struct DeleteMessage {
    target: MessageReference,
    captured: Option<(MessageRecord, Vec<SignalRecord>)>,
}

impl DeleteMessage {
    pub fn new(target: MessageReference) -> Self {
        Self {
            target,
            captured: None,
        }
    }
}

impl<S: SystemStore> Command<S> for DeleteMessage {
    fn apply(&mut self, store: &mut S, engine: &mut SyncEngine) -> Result<(), CommandError> {
        let (record, signals) = store.delete_message(&self.target)?;
        engine.remove_and_update_indices(&self.target, true);
        debug!(reference = ?self.target, name = %record.name, "message deleted");
        self.captured = Some((record, signals));
        Ok(())
    }

    fn revert(&mut self, store: &mut S, engine: &mut SyncEngine) -> Result<(), CommandError> {
        let (record, signals) = self.captured.take().ok_or(CommandError::NotApplied)?;
        store.insert_message(&self.target, record, signals)?;
        engine.update_indices_to_new_message(&self.target);
        engine.register_if_necessary(store, &self.target);
        refresh_layout(store, &self.target);
        Ok(())
    }
}

/// Rewrites the message record of every copy of a group.
///
/// A changed CAN-ID or ID format re-keys the group; unlike [`AddMessage`],
/// steering one message into another's identity is rejected here, so a group
/// keeps its id across property edits. For a conflict member the edit stays
/// local to the named copy, which is the re-ID resolution path.
pub struct SetMessageProperties {
    target: MessageReference,
    record: MessageRecord,
    applied: Option<(MessageRecord, Vec<MessageReference>)>,
}

impl SetMessageProperties {
    pub fn new(target: MessageReference, record: MessageRecord) -> Self {
        Self {
            target,
            record,
            applied: None,
        }
    }
}

impl<S: SystemStore> Command<S> for SetMessageProperties {
    fn apply(&mut self, store: &mut S, engine: &mut SyncEngine) -> Result<(), CommandError> {
        let previous = store
            .message(&self.target)
            .cloned()
            .ok_or(StoreError::MessageMissing {
                reference: self.target,
            })?;
        check_record_ranges(&self.record)?;

        let targets = edit_targets(engine, &self.target);
        let identity_changed = (self.record.can_id, self.record.extended)
            != (previous.can_id, previous.extended);
        if identity_changed {
            let is_tx = targets.iter().any(|r| r.direction == Direction::Tx);
            check_message_id(
                engine,
                self.record.can_id,
                self.record.extended,
                is_tx,
                Some(previous.can_id),
                Some(&self.target),
            )?;
        }
        if self.record.dlc != previous.dlc {
            let signals = store.signals(&self.target).unwrap_or(&[]);
            check_signal_list(signals, self.record.dlc, self.target.protocol)?;
        }

        for target in &targets {
            store.set_message(target, self.record.clone())?;
        }
        if identity_changed {
            engine.update_identity(&self.target, self.record.can_id, self.record.extended);
        }
        refresh_layout(store, &self.target);
        debug!(reference = ?self.target, name = %self.record.name, "message properties set");
        self.applied = Some((previous, targets));
        Ok(())
    }

    fn revert(&mut self, store: &mut S, engine: &mut SyncEngine) -> Result<(), CommandError> {
        let (previous, targets) = self.applied.take().ok_or(CommandError::NotApplied)?;
        for target in &targets {
            store.set_message(target, previous.clone())?;
        }
        if (self.record.can_id, self.record.extended) != (previous.can_id, previous.extended) {
            engine.update_identity(&self.target, previous.can_id, previous.extended);
        }
        refresh_layout(store, &self.target);
        Ok(())
    }
}

/// Moves a message copy between the Rx and Tx lists of its interface.
///
/// Rejected while it would leave the group without any transmitter. The copy
/// is appended to the destination list; its group keeps its id and the
/// engine patches both containers' indices in one step.
pub struct ChangeMessageDirection {
    target: MessageReference,
    new_direction: Direction,
    applied: Option<(MessageReference, MessageReference)>,
}

impl ChangeMessageDirection {
    pub fn new(target: MessageReference, new_direction: Direction) -> Self {
        Self {
            target,
            new_direction,
            applied: None,
        }
    }
}

impl<S: SystemStore> Command<S> for ChangeMessageDirection {
    fn apply(&mut self, store: &mut S, engine: &mut SyncEngine) -> Result<(), CommandError> {
        if self.target.direction == self.new_direction {
            return Err(ValidationError::DirectionUnchanged.into());
        }
        check_direction_change(engine, &self.target, self.new_direction)?;

        let (record, signals) = store.delete_message(&self.target)?;
        let container = self.target.with_direction(self.new_direction);
        let new_reference = container.with_index(store.message_count(&container));
        store.insert_message(&new_reference, record, signals)?;
        engine.update_indices_to_direction_change(&self.target, &new_reference);
        debug!(old = ?self.target, new = ?new_reference, "message direction changed");
        self.applied = Some((self.target, new_reference));
        Ok(())
    }

    fn revert(&mut self, store: &mut S, engine: &mut SyncEngine) -> Result<(), CommandError> {
        let (old_reference, new_reference) = self.applied.take().ok_or(CommandError::NotApplied)?;
        let (record, signals) = store.delete_message(&new_reference)?;
        store.insert_message(&old_reference, record, signals)?;
        engine.update_indices_to_direction_change(&new_reference, &old_reference);
        Ok(())
    }
}
