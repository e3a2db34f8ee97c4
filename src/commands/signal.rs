use tracing::debug;

use crate::check::check_signal_list;
use crate::commands::{Command, edit_targets, refresh_layout};
use crate::store::SystemStore;
use crate::sync::SyncEngine;
use crate::types::errors::{CommandError, StoreError};
use crate::types::record::SignalRecord;
use crate::types::reference::MessageReference;

/// Simulated signal list after an insertion, used to validate before any
/// store write happens.
fn list_with_inserted<S: SystemStore>(
    store: &S,
    message: &MessageReference,
    index: usize,
    signal: &SignalRecord,
) -> Result<Vec<SignalRecord>, StoreError> {
    let mut list = store
        .signals(message)
        .ok_or(StoreError::MessageMissing {
            reference: *message,
        })?
        .to_vec();
    if index > list.len() {
        return Err(StoreError::SignalMissing {
            reference: *message,
            index,
        });
    }
    list.insert(index, signal.clone());
    Ok(list)
}

fn message_dlc<S: SystemStore>(
    store: &S,
    message: &MessageReference,
) -> Result<u16, StoreError> {
    store
        .message(message)
        .map(|m| m.dlc)
        .ok_or(StoreError::MessageMissing {
            reference: *message,
        })
}

/// Inserts a signal at `index` into every copy of the message's group, so
/// the definition stays identical at all nodes.
pub struct InsertSignal {
    message: MessageReference,
    index: usize,
    signal: SignalRecord,
    applied: bool,
}

impl InsertSignal {
    pub fn new(message: MessageReference, index: usize, signal: SignalRecord) -> Self {
        Self {
            message,
            index,
            signal,
            applied: false,
        }
    }
}

impl<S: SystemStore> Command<S> for InsertSignal {
    fn apply(&mut self, store: &mut S, engine: &mut SyncEngine) -> Result<(), CommandError> {
        let dlc = message_dlc(store, &self.message)?;
        let list = list_with_inserted(store, &self.message, self.index, &self.signal)?;
        check_signal_list(&list, dlc, self.message.protocol)?;

        for target in edit_targets(engine, &self.message) {
            store.insert_signal(&target, self.index, self.signal.clone())?;
        }
        refresh_layout(store, &self.message);
        debug!(message = ?self.message, index = self.index, name = %self.signal.name, "signal inserted");
        self.applied = true;
        Ok(())
    }

    fn revert(&mut self, store: &mut S, engine: &mut SyncEngine) -> Result<(), CommandError> {
        if !self.applied {
            return Err(CommandError::NotApplied);
        }
        for target in edit_targets(engine, &self.message) {
            self.signal = store.delete_signal(&target, self.index)?;
        }
        refresh_layout(store, &self.message);
        self.applied = false;
        Ok(())
    }
}

/// Appends a signal to the end of the message's signal list (all copies).
pub struct AddSignal {
    inner: Option<InsertSignal>,
    message: MessageReference,
    signal: SignalRecord,
}

impl AddSignal {
    pub fn new(message: MessageReference, signal: SignalRecord) -> Self {
        Self {
            inner: None,
            message,
            signal,
        }
    }
}

impl<S: SystemStore> Command<S> for AddSignal {
    fn apply(&mut self, store: &mut S, engine: &mut SyncEngine) -> Result<(), CommandError> {
        // The append index is resolved at apply time; all group copies hold
        // identical lists, so one length fits them all.
        let index = store
            .signals(&self.message)
            .ok_or(StoreError::MessageMissing {
                reference: self.message,
            })?
            .len();
        let mut inner = InsertSignal::new(self.message, index, self.signal.clone());
        inner.apply(store, engine)?;
        self.inner = Some(inner);
        Ok(())
    }

    fn revert(&mut self, store: &mut S, engine: &mut SyncEngine) -> Result<(), CommandError> {
        let mut inner = self.inner.take().ok_or(CommandError::NotApplied)?;
        inner.revert(store, engine)
    }
}

/// Removes the signal at `index` from every copy of the message's group,
/// capturing it for undo.
pub struct DeleteSignal {
    message: MessageReference,
    index: usize,
    captured: Option<SignalRecord>,
}

impl DeleteSignal {
    pub fn new(message: MessageReference, index: usize) -> Self {
        Self {
            message,
            index,
            captured: None,
        }
    }
}

impl<S: SystemStore> Command<S> for DeleteSignal {
    fn apply(&mut self, store: &mut S, engine: &mut SyncEngine) -> Result<(), CommandError> {
        let mut captured: Option<SignalRecord> = None;
        for target in edit_targets(engine, &self.message) {
            captured = Some(store.delete_signal(&target, self.index)?);
        }
        refresh_layout(store, &self.message);
        self.captured = captured;
        Ok(())
    }

    fn revert(&mut self, store: &mut S, engine: &mut SyncEngine) -> Result<(), CommandError> {
        let signal = self.captured.take().ok_or(CommandError::NotApplied)?;
        for target in edit_targets(engine, &self.message) {
            store.insert_signal(&target, self.index, signal.clone())?;
        }
        refresh_layout(store, &self.message);
        Ok(())
    }
}

/// Rewrites the signal at `index` in every copy of the message's group.
///
/// The resulting layout is validated before any write, so a property edit
/// can never introduce an overlap or break the protocol's placement policy.
pub struct SetSignalProperties {
    message: MessageReference,
    index: usize,
    record: SignalRecord,
    captured: Option<SignalRecord>,
}

impl SetSignalProperties {
    pub fn new(message: MessageReference, index: usize, record: SignalRecord) -> Self {
        Self {
            message,
            index,
            record,
            captured: None,
        }
    }
}

impl<S: SystemStore> Command<S> for SetSignalProperties {
    fn apply(&mut self, store: &mut S, engine: &mut SyncEngine) -> Result<(), CommandError> {
        let dlc = message_dlc(store, &self.message)?;
        let mut list = store
            .signals(&self.message)
            .ok_or(StoreError::MessageMissing {
                reference: self.message,
            })?
            .to_vec();
        let previous = list
            .get_mut(self.index)
            .ok_or(StoreError::SignalMissing {
                reference: self.message,
                index: self.index,
            })?;
        let previous = std::mem::replace(previous, self.record.clone());
        check_signal_list(&list, dlc, self.message.protocol)?;

        for target in edit_targets(engine, &self.message) {
            store.set_signal(&target, self.index, self.record.clone())?;
        }
        refresh_layout(store, &self.message);
        debug!(message = ?self.message, index = self.index, name = %self.record.name, "signal properties set");
        self.captured = Some(previous);
        Ok(())
    }

    fn revert(&mut self, store: &mut S, engine: &mut SyncEngine) -> Result<(), CommandError> {
        let previous = self.captured.take().ok_or(CommandError::NotApplied)?;
        for target in edit_targets(engine, &self.message) {
            store.set_signal(&target, self.index, previous.clone())?;
        }
        refresh_layout(store, &self.message);
        Ok(())
    }
}

/// Moves a signal between two messages (possibly bridging two groups).
///
/// Implemented strictly as a delete leg followed by an add leg replaying the
/// captured signal. `revert` reverses that pairing exactly (add back at the
/// old location, delete from the new one) because the two legs may touch
/// different groups.
pub struct MoveSignal {
    from: MessageReference,
    from_index: usize,
    to: MessageReference,
    to_index: usize,
    applied: bool,
}

impl MoveSignal {
    pub fn new(
        from: MessageReference,
        from_index: usize,
        to: MessageReference,
        to_index: usize,
    ) -> Self {
        Self {
            from,
            from_index,
            to,
            to_index,
            applied: false,
        }
    }

    fn transfer<S: SystemStore>(
        store: &mut S,
        engine: &mut SyncEngine,
        from: &MessageReference,
        from_index: usize,
        to: &MessageReference,
        to_index: usize,
    ) -> Result<(), CommandError> {
        // Validate the destination layout with the moved signal in place
        // before touching anything.
        let moved = store
            .signals(from)
            .and_then(|list| list.get(from_index))
            .cloned()
            .ok_or(StoreError::SignalMissing {
                reference: *from,
                index: from_index,
            })?;
        let dlc = message_dlc(store, to)?;
        let same_message = from.container() == to.container() && from.index == to.index;
        let mut target_list = store
            .signals(to)
            .ok_or(StoreError::MessageMissing { reference: *to })?
            .to_vec();
        if same_message {
            target_list.remove(from_index);
        }
        if to_index > target_list.len() {
            return Err(StoreError::SignalMissing {
                reference: *to,
                index: to_index,
            }
            .into());
        }
        target_list.insert(to_index, moved.clone());
        check_signal_list(&target_list, dlc, to.protocol)?;

        // Delete leg.
        for target in edit_targets(engine, from) {
            store.delete_signal(&target, from_index)?;
        }
        // Add leg, replaying the captured signal.
        for target in edit_targets(engine, to) {
            store.insert_signal(&target, to_index, moved.clone())?;
        }
        refresh_layout(store, from);
        refresh_layout(store, to);
        Ok(())
    }
}

impl<S: SystemStore> Command<S> for MoveSignal {
    fn apply(&mut self, store: &mut S, engine: &mut SyncEngine) -> Result<(), CommandError> {
        Self::transfer(
            store,
            engine,
            &self.from,
            self.from_index,
            &self.to,
            self.to_index,
        )?;
        debug!(from = ?self.from, to = ?self.to, "signal moved");
        self.applied = true;
        Ok(())
    }

    fn revert(&mut self, store: &mut S, engine: &mut SyncEngine) -> Result<(), CommandError> {
        if !self.applied {
            return Err(CommandError::NotApplied);
        }
        Self::transfer(
            store,
            engine,
            &self.to,
            self.to_index,
            &self.from,
            self.from_index,
        )?;
        self.applied = false;
        Ok(())
    }
}
