//! Consistency and validation checks.
//!
//! Pure read-only rules over the current groups and layouts. Every check
//! returns `Result<(), ValidationError>`: the error names the violated rule
//! so a host can render inline feedback, and nothing is ever mutated or
//! thrown across the engine boundary.

use crate::layout::{BitGrid, flip_in_byte};
use crate::store::SystemStore;
use crate::sync::SyncEngine;
use crate::types::errors::ValidationError;
use crate::types::record::{ByteOrder, MuxRole, SignalRecord};
use crate::types::reference::{Direction, MessageReference, Protocol, id_to_hex, max_can_id};

/// Longest accepted message name (C identifier convention of embedded
/// targets).
pub const MAX_NAME_LENGTH: usize = 31;

/// Whether `name` matches the identifier grammar: ASCII letter or underscore
/// first, ASCII alphanumerics or underscores after.
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Checks a message name: non-empty, identifier grammar, length, and
/// uniqueness within the engine's scope.
///
/// `exclude` names the reference being edited; its own group does not count
/// as a duplicate.
pub fn check_message_name<S: SystemStore>(
    engine: &SyncEngine,
    store: &S,
    name: &str,
    exclude: Option<&MessageReference>,
) -> Result<(), ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::EmptyName);
    }
    if !is_valid_identifier(name) {
        return Err(ValidationError::InvalidIdentifier {
            name: name.to_string(),
        });
    }
    if name.len() > MAX_NAME_LENGTH {
        return Err(ValidationError::NameTooLong {
            name: name.to_string(),
            max: MAX_NAME_LENGTH,
        });
    }

    let excluded_group = exclude.and_then(|r| engine.group_id(r));
    let lower = name.to_lowercase();
    let conflict_peer = |r: &MessageReference| {
        exclude.is_some_and(|e| engine.matching_references(e).contains(r))
    };

    for (key, group) in engine.groups() {
        if Some(key) == excluded_group {
            continue;
        }
        if let Some(rep) = group.representative()
            && let Some(record) = store.message(rep)
            && record.name.to_lowercase() == lower
        {
            return Err(ValidationError::DuplicateName {
                name: name.to_string(),
            });
        }
    }
    for conflict in engine.conflicts() {
        for reference in &conflict.refs {
            if conflict_peer(reference) {
                continue;
            }
            if let Some(record) = store.message(reference)
                && record.name.to_lowercase() == lower
            {
                return Err(ValidationError::DuplicateName {
                    name: name.to_string(),
                });
            }
        }
    }
    Ok(())
}

/// Checks a CAN-ID for range, editability and collisions.
///
/// `is_tx` states whether the checked message transmits; a collision with a
/// group that also transmits is reported as the critical-conflict rule
/// rather than the plain "already used" one. `previous_id` is the currently
/// stored ID when editing; protocols with fixed device mappings reject any
/// change of it. `exclude` works as in [`check_message_name`].
pub fn check_message_id(
    engine: &SyncEngine,
    can_id: u32,
    extended: bool,
    is_tx: bool,
    previous_id: Option<u32>,
    exclude: Option<&MessageReference>,
) -> Result<(), ValidationError> {
    if can_id > max_can_id(extended) {
        return Err(ValidationError::IdOutOfRange {
            id_hex: id_to_hex(can_id),
            format: if extended {
                "extended".to_string()
            } else {
                "standard".to_string()
            },
        });
    }
    if engine.protocol().policy().fixed_ids
        && previous_id.is_some_and(|previous| previous != can_id)
    {
        return Err(ValidationError::IdReadOnly {
            protocol: engine.protocol().to_str(),
        });
    }

    let excluded_group = exclude.and_then(|r| engine.group_id(r));
    for (key, group) in engine.groups() {
        if Some(key) == excluded_group || !group.matches(can_id, extended) {
            continue;
        }
        if is_tx && group.tx().is_some() {
            return Err(ValidationError::IdCausesCriticalConflict {
                id_hex: id_to_hex(can_id),
            });
        }
        return Err(ValidationError::IdAlreadyUsed {
            id_hex: id_to_hex(can_id),
        });
    }
    for conflict in engine.conflicts() {
        if conflict.matches(can_id, extended)
            && !exclude.is_some_and(|e| conflict.contains(e))
        {
            return Err(ValidationError::IdCausesCriticalConflict {
                id_hex: id_to_hex(can_id),
            });
        }
    }
    Ok(())
}

/// A message without any transmitting copy is invalid.
pub fn check_message_has_tx(
    engine: &SyncEngine,
    reference: &MessageReference,
) -> Result<(), ValidationError> {
    let has_tx = engine
        .matching_references(reference)
        .iter()
        .any(|r| r.direction == Direction::Tx);
    if has_tx {
        Ok(())
    } else {
        Err(ValidationError::NoTxOwner)
    }
}

/// Rejects a direction change that would leave the group without any
/// transmitting copy.
pub fn check_direction_change(
    engine: &SyncEngine,
    reference: &MessageReference,
    new_direction: Direction,
) -> Result<(), ValidationError> {
    if new_direction == Direction::Tx || reference.direction == Direction::Rx {
        return Ok(());
    }
    let other_tx = engine
        .matching_references(reference)
        .iter()
        .any(|r| r.direction == Direction::Tx && r != reference);
    if other_tx {
        Ok(())
    } else {
        Err(ValidationError::LastTxOwner)
    }
}

/// Reports membership in the critical-conflict list.
pub fn check_critical_conflict<S: SystemStore>(
    engine: &SyncEngine,
    store: &S,
    reference: &MessageReference,
) -> Result<(), ValidationError> {
    if engine.is_critical(reference) {
        let id_hex = store
            .message(reference)
            .map(|m| id_to_hex(m.can_id))
            .unwrap_or_default();
        Err(ValidationError::CriticalConflict { id_hex })
    } else {
        Ok(())
    }
}

/// Validates the bit layout of one message's signal list against the
/// engine's protocol policy.
pub fn check_signal_placement<S: SystemStore>(
    engine: &SyncEngine,
    store: &S,
    reference: &MessageReference,
) -> Result<(), ValidationError> {
    let Some(record) = store.message(reference) else {
        return Ok(());
    };
    let signals = store.signals(reference).unwrap_or(&[]);
    check_signal_list(signals, record.dlc, engine.protocol())
}

/// Validates a signal list directly (used by commands before mutating).
pub fn check_signal_list(
    signals: &[SignalRecord],
    dlc: u16,
    protocol: Protocol,
) -> Result<(), ValidationError> {
    let policy = protocol.policy();

    if policy.signals_required && signals.is_empty() {
        return Err(ValidationError::SignalRequired {
            protocol: protocol.to_str(),
        });
    }
    let multiplexers = signals
        .iter()
        .filter(|s| s.mux == MuxRole::Multiplexer)
        .count();
    if multiplexers > 1 {
        return Err(ValidationError::MultipleMultiplexers);
    }
    if policy.byte_aligned
        && let Some(misaligned) = signals.iter().find(|s| {
            // Alignment is judged on the linear plane: a Motorola start bit
            // is the MSB, so its byte boundaries sit at bits 7, 15, 23, ...
            let first_cell = match s.byte_order {
                ByteOrder::Intel => s.start_bit,
                ByteOrder::Motorola => flip_in_byte(s.start_bit),
            };
            first_cell % 8 != 0 || s.bit_length % 8 != 0
        })
    {
        return Err(ValidationError::ByteAlignment {
            name: misaligned.name.clone(),
            start_bit: misaligned.start_bit,
            bit_length: misaligned.bit_length,
        });
    }

    // One grid pass per multiplexer case; plain messages get the base pass.
    let mut cases: Vec<Option<u32>> = BitGrid::mux_values(signals)
        .into_iter()
        .map(Some)
        .collect();
    if cases.is_empty() {
        cases.push(None);
    }

    let mut grid = BitGrid::new();
    for case in cases {
        let diag = grid.recompute(signals, dlc, policy, case);
        if let Some(&index) = diag.out_of_range.first() {
            // Re-derive the concrete reason for the diagnostic.
            if let Some(signal) = signals.get(index) {
                crate::layout::signal_fits(dlc, signal)?;
            }
        }
        if let Some(&cell) = diag.overlaps.first() {
            return Err(ValidationError::SignalOverlap { cell });
        }
        if let Some(&cell) = diag.gaps.first() {
            return Err(ValidationError::LayoutGap { cell });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::types::record::{ByteOrder, MessageRecord};
    use crate::types::reference::{Protocol, SyncScope};

    fn reference(node: usize, direction: Direction, index: usize, protocol: Protocol) -> MessageReference {
        MessageReference {
            node,
            interface: 0,
            datapool: 0,
            protocol,
            direction,
            index,
        }
    }

    fn record(name: &str, can_id: u32) -> MessageRecord {
        MessageRecord {
            name: name.to_string(),
            can_id,
            dlc: 8,
            ..Default::default()
        }
    }

    fn bus_setup(protocol: Protocol) -> (MemoryStore, SyncEngine) {
        let mut store = MemoryStore::new();
        let a = store.add_node("ECU_A");
        let b = store.add_node("ECU_B");
        store.connect(0, a, 0, 0, protocol);
        store.connect(0, b, 0, 0, protocol);
        (store, SyncEngine::new(SyncScope::Bus { bus: 0 }, protocol))
    }

    #[test]
    fn test_identifier_grammar() {
        assert!(is_valid_identifier("Motor_Status"));
        assert!(is_valid_identifier("_reserved"));
        assert!(is_valid_identifier("MSG3"));
        assert!(!is_valid_identifier(""));
        assert!(!is_valid_identifier("3MSG"));
        assert!(!is_valid_identifier("Motor Status"));
        assert!(!is_valid_identifier("Motor-Status"));
    }

    #[test]
    fn test_name_rules() {
        let (mut store, mut engine) = bus_setup(Protocol::Layer2);
        let tx = store.push_message(
            &reference(0, Direction::Tx, 0, Protocol::Layer2),
            record("Motor_Status", 0x100),
            Vec::new(),
        );
        engine.init(&store);

        assert_eq!(
            check_message_name(&engine, &store, "", None),
            Err(ValidationError::EmptyName)
        );
        assert!(matches!(
            check_message_name(&engine, &store, "Motor Status", None),
            Err(ValidationError::InvalidIdentifier { .. })
        ));
        assert!(matches!(
            check_message_name(&engine, &store, "motor_status", None),
            Err(ValidationError::DuplicateName { .. })
        ));
        // The message itself may keep its name while being edited.
        assert!(check_message_name(&engine, &store, "Motor_Status", Some(&tx)).is_ok());
        assert!(check_message_name(&engine, &store, "Brake_Status", None).is_ok());
        assert!(matches!(
            check_message_name(&engine, &store, &"x".repeat(32), None),
            Err(ValidationError::NameTooLong { .. })
        ));
    }

    #[test]
    fn test_id_rules() {
        let (mut store, mut engine) = bus_setup(Protocol::Layer2);
        store.push_message(
            &reference(0, Direction::Tx, 0, Protocol::Layer2),
            record("MSG_A", 0x100),
            Vec::new(),
        );
        let rx = store.push_message(
            &reference(1, Direction::Rx, 0, Protocol::Layer2),
            record("MSG_A", 0x100),
            Vec::new(),
        );
        engine.init(&store);

        // Range per format.
        assert!(matches!(
            check_message_id(&engine, 0x800, false, false, None, None),
            Err(ValidationError::IdOutOfRange { .. })
        ));
        assert!(check_message_id(&engine, 0x800, true, false, None, None).is_ok());

        // Duplicate against an existing transmitter.
        assert!(matches!(
            check_message_id(&engine, 0x100, false, false, None, None),
            Err(ValidationError::IdAlreadyUsed { .. })
        ));
        assert!(matches!(
            check_message_id(&engine, 0x100, false, true, None, None),
            Err(ValidationError::IdCausesCriticalConflict { .. })
        ));
        // A member of the group may keep its own id.
        assert!(check_message_id(&engine, 0x100, false, true, Some(0x100), Some(&rx)).is_ok());
    }

    #[test]
    fn test_fixed_mapping_ids_are_read_only() {
        let (mut store, mut engine) = bus_setup(Protocol::CanOpen);
        let pdo = store.push_message(
            &reference(0, Direction::Tx, 0, Protocol::CanOpen),
            record("PDO_1", 0x180),
            Vec::new(),
        );
        engine.init(&store);

        assert!(matches!(
            check_message_id(&engine, 0x181, false, true, Some(0x180), None),
            Err(ValidationError::IdReadOnly { .. })
        ));
        // Keeping the mapped id is fine.
        assert!(check_message_id(&engine, 0x180, false, true, Some(0x180), Some(&pdo)).is_ok());
    }

    #[test]
    fn test_has_tx_and_direction_rules() {
        let (mut store, mut engine) = bus_setup(Protocol::Layer2);
        let rx_a = store.push_message(
            &reference(0, Direction::Rx, 0, Protocol::Layer2),
            record("MSG_A", 0x100),
            Vec::new(),
        );
        let rx_b = store.push_message(
            &reference(1, Direction::Rx, 0, Protocol::Layer2),
            record("MSG_A", 0x100),
            Vec::new(),
        );
        engine.init(&store);

        // Scenario: no transmitter yet.
        assert_eq!(
            check_message_has_tx(&engine, &rx_a),
            Err(ValidationError::NoTxOwner)
        );
        assert_eq!(
            check_message_has_tx(&engine, &rx_b),
            Err(ValidationError::NoTxOwner)
        );

        // Scenario: transmitter added on node A.
        let tx = store.push_message(
            &reference(0, Direction::Tx, 0, Protocol::Layer2),
            record("MSG_A", 0x100),
            Vec::new(),
        );
        engine.update_indices_to_new_message(&tx);
        engine.register_if_necessary(&store, &tx);
        assert!(check_message_has_tx(&engine, &rx_a).is_ok());
        assert_eq!(engine.unique_messages().len(), 1);

        // The sole transmitter may not turn receiver.
        assert_eq!(
            check_direction_change(&engine, &tx, Direction::Rx),
            Err(ValidationError::LastTxOwner)
        );
        assert!(check_direction_change(&engine, &rx_b, Direction::Tx).is_ok());
    }

    #[test]
    fn test_byte_alignment_scenario() {
        // DLC 2 message under the byte-aligned protocol.
        let aligned = SignalRecord {
            name: "OK".to_string(),
            start_bit: 0,
            bit_length: 8,
            byte_order: ByteOrder::Intel,
            ..Default::default()
        };
        let misaligned = SignalRecord {
            name: "BAD".to_string(),
            start_bit: 3,
            bit_length: 4,
            byte_order: ByteOrder::Intel,
            ..Default::default()
        };

        assert!(check_signal_list(&[aligned.clone()], 2, Protocol::Safety).is_ok());
        assert!(matches!(
            check_signal_list(&[aligned, misaligned], 2, Protocol::Safety),
            Err(ValidationError::ByteAlignment { start_bit: 3, .. })
        ));
        // The safety protocol insists on at least one signal.
        assert!(matches!(
            check_signal_list(&[], 2, Protocol::Safety),
            Err(ValidationError::SignalRequired { .. })
        ));
    }

    #[test]
    fn test_motorola_alignment_on_linear_plane() {
        // Start bit 7 is the MSB of byte 0: the signal fills byte 0 exactly.
        let msb_byte0 = SignalRecord {
            name: "OK".to_string(),
            start_bit: 7,
            bit_length: 8,
            byte_order: ByteOrder::Motorola,
            ..Default::default()
        };
        assert!(check_signal_list(&[msb_byte0.clone()], 2, Protocol::Safety).is_ok());

        // Two full bytes from the same MSB are aligned as well.
        let two_bytes = SignalRecord {
            bit_length: 16,
            ..msb_byte0
        };
        assert!(check_signal_list(&[two_bytes], 2, Protocol::Safety).is_ok());

        // Start bit 0 is the LSB of byte 0; eight bits from there straddle
        // bytes 0 and 1 on the linear plane.
        let straddling = SignalRecord {
            name: "BAD".to_string(),
            start_bit: 0,
            bit_length: 8,
            byte_order: ByteOrder::Motorola,
            ..Default::default()
        };
        assert!(matches!(
            check_signal_list(&[straddling], 2, Protocol::Safety),
            Err(ValidationError::ByteAlignment { start_bit: 0, .. })
        ));
    }

    #[test]
    fn test_gapless_and_overlap_rules() {
        let low = SignalRecord {
            name: "LOW".to_string(),
            start_bit: 0,
            bit_length: 4,
            ..Default::default()
        };
        let high = SignalRecord {
            name: "HIGH".to_string(),
            start_bit: 8,
            bit_length: 4,
            ..Default::default()
        };
        let overlapping = SignalRecord {
            name: "OVER".to_string(),
            start_bit: 2,
            bit_length: 4,
            ..Default::default()
        };

        assert!(matches!(
            check_signal_list(&[low.clone(), high.clone()], 8, Protocol::CanOpen),
            Err(ValidationError::LayoutGap { cell: 4 })
        ));
        assert!(check_signal_list(&[low.clone(), high], 8, Protocol::Layer2).is_ok());
        assert!(matches!(
            check_signal_list(&[low, overlapping], 8, Protocol::Layer2),
            Err(ValidationError::SignalOverlap { cell: 2 })
        ));
    }

    #[test]
    fn test_multiplexed_signals_may_share_bits() {
        let switch = SignalRecord {
            name: "MUX".to_string(),
            start_bit: 0,
            bit_length: 8,
            mux: MuxRole::Multiplexer,
            ..Default::default()
        };
        let v1 = SignalRecord {
            name: "Case1".to_string(),
            start_bit: 8,
            bit_length: 8,
            mux: MuxRole::MultiplexedValue(1),
            ..Default::default()
        };
        let v2 = SignalRecord {
            name: "Case2".to_string(),
            start_bit: 8,
            bit_length: 8,
            mux: MuxRole::MultiplexedValue(2),
            ..Default::default()
        };
        let second_switch = SignalRecord {
            name: "MUX2".to_string(),
            start_bit: 16,
            bit_length: 8,
            mux: MuxRole::Multiplexer,
            ..Default::default()
        };

        assert!(check_signal_list(&[switch.clone(), v1.clone(), v2.clone()], 8, Protocol::Layer2).is_ok());
        assert_eq!(
            check_signal_list(&[switch, second_switch, v1, v2], 8, Protocol::Layer2),
            Err(ValidationError::MultipleMultiplexers)
        );
    }

    #[test]
    fn test_critical_conflict_check() {
        let (mut store, mut engine) = bus_setup(Protocol::Layer2);
        let tx_a = store.push_message(
            &reference(0, Direction::Tx, 0, Protocol::Layer2),
            record("MSG_A", 0x100),
            Vec::new(),
        );
        let tx_b = store.push_message(
            &reference(1, Direction::Tx, 0, Protocol::Layer2),
            record("MSG_B", 0x100),
            Vec::new(),
        );
        engine.init(&store);

        assert_eq!(
            check_critical_conflict(&engine, &store, &tx_a),
            Err(ValidationError::CriticalConflict {
                id_hex: "0x100".to_string()
            })
        );
        assert_eq!(
            check_critical_conflict(&engine, &store, &tx_b),
            Err(ValidationError::CriticalConflict {
                id_hex: "0x100".to_string()
            })
        );
    }
}
