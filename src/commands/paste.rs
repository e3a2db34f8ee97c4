use tracing::debug;

use crate::check::check_signal_list;
use crate::commands::message::check_record_ranges;
use crate::commands::{Command, edit_targets, refresh_layout};
use crate::store::{InterfaceSlot, SystemStore};
use crate::sync::SyncEngine;
use crate::types::errors::{CommandError, StoreError, ValidationError};
use crate::types::record::{MessageClip, SignalClip};
use crate::types::reference::{Direction, MessageReference, SyncScope};

/// Captures a message (record, signals, owner node name) into a clipboard
/// payload. The owner name is taken from the transmitting copy of the
/// reference's group so a later paste can re-attach it by name.
pub fn clip_message<S: SystemStore>(
    store: &S,
    engine: &SyncEngine,
    reference: &MessageReference,
) -> Option<MessageClip> {
    let record = store.message(reference)?;
    let signals = store.signals(reference)?.to_vec();
    let owner = engine
        .matching_references(reference)
        .into_iter()
        .find(|r| r.direction == Direction::Tx)
        .map_or(reference.node, |r| r.node);
    Some(MessageClip {
        message: record.clone(),
        signals,
        owner_node_name: store.node_name(owner).unwrap_or_default().to_string(),
    })
}

/// All interface slots a paste may land on within the engine's scope.
fn candidate_slots<S: SystemStore>(store: &S, engine: &SyncEngine) -> Vec<InterfaceSlot> {
    match *engine.scope() {
        SyncScope::NodeInterface {
            node,
            interface,
            datapool,
        } => vec![InterfaceSlot {
            node,
            interface,
            datapool,
        }],
        SyncScope::Bus { bus } => store.connected_interfaces(bus, engine.protocol()),
    }
}

/// The slot a clip should be pasted into: the clip's recorded owner node when
/// a connected slot still carries that name (compared case-insensitively),
/// the first connected slot otherwise.
fn resolve_slot<S: SystemStore>(
    store: &S,
    engine: &SyncEngine,
    clip: &MessageClip,
) -> Result<InterfaceSlot, ValidationError> {
    let slots = candidate_slots(store, engine);
    slots
        .iter()
        .find(|slot| {
            store
                .node_name(slot.node)
                .is_some_and(|name| name.eq_ignore_ascii_case(&clip.owner_node_name))
        })
        .or_else(|| slots.first())
        .copied()
        .ok_or(ValidationError::NoPasteTarget)
}

/// Bulk inserts copied messages as transmitting copies.
///
/// Each clip is appended to the Tx list of its resolved slot and registered
/// with the engine; identity collisions join groups or record conflicts the
/// same way [`AddMessage`](crate::commands::AddMessage) does. All clips are
/// validated before the first one is written.
pub struct PasteMessages {
    clips: Vec<MessageClip>,
    applied: Vec<MessageReference>,
}

impl PasteMessages {
    pub fn new(clips: Vec<MessageClip>) -> Self {
        Self {
            clips,
            applied: Vec::new(),
        }
    }

    /// References created by the last successful `apply`, in clip order.
    pub fn applied_references(&self) -> &[MessageReference] {
        &self.applied
    }
}

impl<S: SystemStore> Command<S> for PasteMessages {
    fn apply(&mut self, store: &mut S, engine: &mut SyncEngine) -> Result<(), CommandError> {
        let protocol = engine.protocol();
        let mut targets = Vec::with_capacity(self.clips.len());
        for clip in &self.clips {
            check_record_ranges(&clip.message)?;
            check_signal_list(&clip.signals, clip.message.dlc, protocol)?;
            targets.push(resolve_slot(store, engine, clip)?);
        }

        let mut applied = Vec::with_capacity(self.clips.len());
        for (clip, slot) in self.clips.iter().zip(targets) {
            let container = MessageReference {
                node: slot.node,
                interface: slot.interface,
                datapool: slot.datapool,
                protocol,
                direction: Direction::Tx,
                index: 0,
            };
            let reference = container.with_index(store.message_count(&container));
            store.insert_message(&reference, clip.message.clone(), clip.signals.clone())?;
            engine.update_indices_to_new_message(&reference);
            engine.register_if_necessary(store, &reference);
            refresh_layout(store, &reference);
            applied.push(reference);
        }
        debug!(count = applied.len(), "messages pasted");
        self.applied = applied;
        Ok(())
    }

    fn revert(&mut self, store: &mut S, engine: &mut SyncEngine) -> Result<(), CommandError> {
        if self.applied.is_empty() {
            return Err(CommandError::NotApplied);
        }
        for reference in self.applied.drain(..).rev() {
            store.delete_message(&reference)?;
            engine.remove_and_update_indices(&reference, true);
        }
        Ok(())
    }
}

/// Bulk appends copied signals to one message (every copy of its group).
///
/// The whole batch is validated against the resulting layout before any
/// write happens.
pub struct PasteSignals {
    message: MessageReference,
    clip: SignalClip,
    applied_base: Option<usize>,
}

impl PasteSignals {
    pub fn new(message: MessageReference, clip: SignalClip) -> Self {
        Self {
            message,
            clip,
            applied_base: None,
        }
    }
}

impl<S: SystemStore> Command<S> for PasteSignals {
    fn apply(&mut self, store: &mut S, engine: &mut SyncEngine) -> Result<(), CommandError> {
        let record = store
            .message(&self.message)
            .ok_or(StoreError::MessageMissing {
                reference: self.message,
            })?;
        let dlc = record.dlc;
        let mut list = store
            .signals(&self.message)
            .ok_or(StoreError::MessageMissing {
                reference: self.message,
            })?
            .to_vec();
        let base = list.len();
        list.extend(self.clip.signals.iter().cloned());
        check_signal_list(&list, dlc, self.message.protocol)?;

        for target in edit_targets(engine, &self.message) {
            for (offset, signal) in self.clip.signals.iter().enumerate() {
                store.insert_signal(&target, base + offset, signal.clone())?;
            }
        }
        refresh_layout(store, &self.message);
        debug!(message = ?self.message, count = self.clip.signals.len(), "signals pasted");
        self.applied_base = Some(base);
        Ok(())
    }

    fn revert(&mut self, store: &mut S, engine: &mut SyncEngine) -> Result<(), CommandError> {
        let base = self.applied_base.take().ok_or(CommandError::NotApplied)?;
        for target in edit_targets(engine, &self.message) {
            for _ in 0..self.clip.signals.len() {
                store.delete_signal(&target, base)?;
            }
        }
        refresh_layout(store, &self.message);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::AddMessage;
    use crate::store::MemoryStore;
    use crate::types::record::{MessageRecord, SignalRecord};
    use crate::types::reference::Protocol;

    fn reference(node: usize, direction: Direction, index: usize) -> MessageReference {
        MessageReference {
            node,
            interface: 0,
            datapool: 0,
            protocol: Protocol::Layer2,
            direction,
            index,
        }
    }

    fn clip(name: &str, can_id: u32, owner: &str) -> MessageClip {
        MessageClip {
            message: MessageRecord {
                name: name.to_string(),
                can_id,
                dlc: 8,
                ..Default::default()
            },
            signals: vec![SignalRecord {
                name: "Value".to_string(),
                start_bit: 0,
                bit_length: 16,
                ..Default::default()
            }],
            owner_node_name: owner.to_string(),
        }
    }

    fn setup() -> (MemoryStore, SyncEngine) {
        let mut store = MemoryStore::new();
        let a = store.add_node("ECU_A");
        let b = store.add_node("ECU_B");
        store.connect(0, a, 0, 0, Protocol::Layer2);
        store.connect(0, b, 0, 0, Protocol::Layer2);
        let mut engine = SyncEngine::new(SyncScope::Bus { bus: 0 }, Protocol::Layer2);
        engine.init(&store);
        (store, engine)
    }

    #[test]
    fn test_paste_reattaches_owner_by_name() {
        let (mut store, mut engine) = setup();
        let mut cmd = PasteMessages::new(vec![
            clip("MSG_A", 0x100, "ecu_b"),
            clip("MSG_B", 0x200, "Unknown_ECU"),
        ]);
        cmd.apply(&mut store, &mut engine).unwrap();

        let applied = cmd.applied_references().to_vec();
        // Case-insensitive owner match lands on node 1.
        assert_eq!(applied[0].node, 1);
        assert_eq!(applied[0].direction, Direction::Tx);
        // Unknown owner falls back to the first connected slot.
        assert_eq!(applied[1].node, 0);
        assert_eq!(engine.group_count(), 2);
        assert_eq!(store.message(&applied[0]).unwrap().name, "MSG_A");

        cmd.revert(&mut store, &mut engine).unwrap();
        assert_eq!(engine.group_count(), 0);
        assert_eq!(store.message_count(&reference(0, Direction::Tx, 0)), 0);
        assert_eq!(store.message_count(&reference(1, Direction::Tx, 0)), 0);
    }

    #[test]
    fn test_paste_without_connected_slot_is_rejected() {
        let mut store = MemoryStore::new();
        store.add_node("ECU_A");
        // Node exists but nothing is connected to bus 0.
        let mut engine = SyncEngine::new(SyncScope::Bus { bus: 0 }, Protocol::Layer2);
        engine.init(&store);

        let mut cmd = PasteMessages::new(vec![clip("MSG_A", 0x100, "ECU_A")]);
        assert!(matches!(
            cmd.apply(&mut store, &mut engine),
            Err(CommandError::Rejected(ValidationError::NoPasteTarget))
        ));
    }

    #[test]
    fn test_paste_validates_all_clips_before_writing() {
        let (mut store, mut engine) = setup();
        let mut cmd = PasteMessages::new(vec![
            clip("MSG_A", 0x100, "ECU_A"),
            clip("BAD", 0x800, "ECU_A"),
        ]);
        assert!(matches!(
            cmd.apply(&mut store, &mut engine),
            Err(CommandError::Rejected(ValidationError::IdOutOfRange { .. }))
        ));
        assert_eq!(store.message_count(&reference(0, Direction::Tx, 0)), 0);
        assert_eq!(engine.group_count(), 0);
    }

    #[test]
    fn test_clip_message_records_tx_owner_name() {
        let (mut store, mut engine) = setup();
        AddMessage::new(
            reference(1, Direction::Tx, 0),
            MessageRecord {
                name: "MSG_A".to_string(),
                can_id: 0x100,
                dlc: 8,
                ..Default::default()
            },
            Vec::new(),
        )
        .apply(&mut store, &mut engine)
        .unwrap();
        AddMessage::new(
            reference(0, Direction::Rx, 0),
            MessageRecord {
                name: "MSG_A".to_string(),
                can_id: 0x100,
                dlc: 8,
                ..Default::default()
            },
            Vec::new(),
        )
        .apply(&mut store, &mut engine)
        .unwrap();

        // Clipping the Rx copy still records the transmitting node's name.
        let clip = clip_message(&store, &engine, &reference(0, Direction::Rx, 0)).unwrap();
        assert_eq!(clip.owner_node_name, "ECU_B");
        assert_eq!(clip.message.can_id, 0x100);
    }

    #[test]
    fn test_paste_signals_batch_round_trip() {
        let (mut store, mut engine) = setup();
        let mut add = AddMessage::new(
            reference(0, Direction::Tx, 0),
            MessageRecord {
                name: "MSG_A".to_string(),
                can_id: 0x100,
                dlc: 8,
                ..Default::default()
            },
            vec![SignalRecord {
                name: "Existing".to_string(),
                start_bit: 0,
                bit_length: 8,
                ..Default::default()
            }],
        );
        add.apply(&mut store, &mut engine).unwrap();
        let tx = add.applied_reference().unwrap();
        AddMessage::new(
            reference(1, Direction::Rx, 0),
            store.message(&tx).unwrap().clone(),
            store.signals(&tx).unwrap().to_vec(),
        )
        .apply(&mut store, &mut engine)
        .unwrap();

        let batch = SignalClip {
            signals: vec![
                SignalRecord {
                    name: "A".to_string(),
                    start_bit: 8,
                    bit_length: 8,
                    ..Default::default()
                },
                SignalRecord {
                    name: "B".to_string(),
                    start_bit: 16,
                    bit_length: 16,
                    ..Default::default()
                },
            ],
        };
        let mut cmd = PasteSignals::new(tx, batch);
        cmd.apply(&mut store, &mut engine).unwrap();
        assert_eq!(store.signals(&tx).unwrap().len(), 3);
        // The Rx copy follows.
        let rx = reference(1, Direction::Rx, 0);
        assert_eq!(store.signals(&rx).unwrap().len(), 3);
        assert_eq!(store.signals(&rx).unwrap()[2].name, "B");

        cmd.revert(&mut store, &mut engine).unwrap();
        assert_eq!(store.signals(&tx).unwrap().len(), 1);
        assert_eq!(store.signals(&rx).unwrap().len(), 1);
        assert_eq!(store.signals(&tx).unwrap()[0].name, "Existing");
    }

    #[test]
    fn test_paste_signals_rejects_overlap_without_writing() {
        let (mut store, mut engine) = setup();
        let mut add = AddMessage::new(
            reference(0, Direction::Tx, 0),
            MessageRecord {
                name: "MSG_A".to_string(),
                can_id: 0x100,
                dlc: 1,
                ..Default::default()
            },
            vec![SignalRecord {
                name: "Existing".to_string(),
                start_bit: 0,
                bit_length: 8,
                ..Default::default()
            }],
        );
        add.apply(&mut store, &mut engine).unwrap();
        let tx = add.applied_reference().unwrap();

        let batch = SignalClip {
            signals: vec![SignalRecord {
                name: "Clash".to_string(),
                start_bit: 4,
                bit_length: 4,
                ..Default::default()
            }],
        };
        let mut cmd = PasteSignals::new(tx, batch);
        assert!(matches!(
            cmd.apply(&mut store, &mut engine),
            Err(CommandError::Rejected(ValidationError::SignalOverlap { .. }))
        ));
        assert_eq!(store.signals(&tx).unwrap().len(), 1);
    }
}
