use slotmap::new_key_type;

use crate::types::reference::{Direction, MessageReference, Protocol};

new_key_type! {
    /// Stable identifier of a synchronization group.
    ///
    /// Assigned at group creation and valid until the group is fully
    /// removed; the slot versioning guarantees that a key of a deleted
    /// group never aliases a later one.
    pub struct GroupKey;
}

/// The set of message references considered the same logical message.
///
/// All members share CAN-ID, ID format and protocol; at most one of them is
/// a Tx copy.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SyncGroup {
    pub can_id: u32,
    pub extended: bool,
    pub protocol: Protocol,
    pub refs: Vec<MessageReference>,
}

impl SyncGroup {
    /// Whether a message with this identity belongs to the group.
    pub fn matches(&self, can_id: u32, extended: bool) -> bool {
        self.can_id == can_id && self.extended == extended
    }

    /// The transmitting copy, if any.
    pub fn tx(&self) -> Option<&MessageReference> {
        self.refs.iter().find(|r| r.direction == Direction::Tx)
    }

    /// Number of transmitting copies (more than one means the group must be
    /// diverted to the conflict list).
    pub fn tx_count(&self) -> usize {
        self.refs
            .iter()
            .filter(|r| r.direction == Direction::Tx)
            .count()
    }

    /// One reference standing in for the whole group: the Tx copy when
    /// present, the first Rx copy otherwise.
    pub fn representative(&self) -> Option<&MessageReference> {
        self.tx().or_else(|| self.refs.first())
    }

    pub fn contains(&self, reference: &MessageReference) -> bool {
        self.refs.contains(reference)
    }
}

/// Message references with colliding identity but different transmitters.
///
/// A data-integrity error state: the members belong to no normal group until
/// the user resolves the collision by re-ID or deletion.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CriticalConflict {
    pub can_id: u32,
    pub extended: bool,
    pub protocol: Protocol,
    pub refs: Vec<MessageReference>,
}

impl CriticalConflict {
    pub fn matches(&self, can_id: u32, extended: bool) -> bool {
        self.can_id == can_id && self.extended == extended
    }

    pub fn contains(&self, reference: &MessageReference) -> bool {
        self.refs.contains(reference)
    }

    pub(crate) fn tx_count(&self) -> usize {
        self.refs
            .iter()
            .filter(|r| r.direction == Direction::Tx)
            .count()
    }
}
