//! Message and signal records as stored per node copy.
//!
//! These are the payload types handed across the store boundary and across
//! the clipboard; they carry no locator information (see
//! [`MessageReference`](crate::types::reference::MessageReference) for that).

use serde::{Deserialize, Serialize};

/// Byte order of a signal within the CAN payload.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ByteOrder {
    /// Little-endian: the start bit is the LSB, bits advance linearly.
    #[default]
    Intel,
    /// Big-endian: the start bit is the MSB, bits advance MSB-first and cross
    /// byte boundaries at bit 7 of the following byte.
    Motorola,
}

/// What role (if any) a signal plays in multiplexing.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MuxRole {
    /// Not multiplexed (always present).
    #[default]
    None,
    /// This signal is the multiplexer switch.
    Multiplexer,
    /// Present only when the multiplexer switch carries this value.
    MultiplexedValue(u32),
}

/// One per-node copy of a CAN message definition.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    /// Message name.
    pub name: String,
    /// Numeric CAN ID (11 or 29 bit depending on `extended`).
    pub can_id: u32,
    /// ID format: `false` = standard (11 bit), `true` = extended (29 bit).
    pub extended: bool,
    /// Payload length in bytes (1..=8).
    pub dlc: u16,
    /// Cycle time in milliseconds (0 if event driven).
    pub cycle_time_ms: u16,
    /// Associated comment.
    pub comment: String,
}

impl MessageRecord {
    /// Total payload bits implied by the DLC.
    #[inline]
    pub fn total_bits(&self) -> usize {
        usize::from(self.dlc) * 8
    }
}

/// Definition of a signal within a CAN message.
///
/// Describes position, bit length, byte order and multiplexing role. Scaling,
/// units and display colors live outside the consistency core.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalRecord {
    /// Signal name.
    pub name: String,
    /// Start bit in the payload (Intel: LSB, Motorola: MSB; bit 0 = LSB of
    /// the first byte).
    pub start_bit: u16,
    /// Length in bits (1..=64).
    pub bit_length: u16,
    /// Byte order.
    pub byte_order: ByteOrder,
    /// Multiplexing role (`MuxRole::None` when unused).
    pub mux: MuxRole,
    /// Associated comment.
    pub comment: String,
}

impl SignalRecord {
    /// Whether this signal takes part in the layout for the given multiplexer
    /// value selection.
    ///
    /// The multiplexer switch and plain signals are always visible; a
    /// multiplexed signal only when its configured value is the selected one.
    pub fn is_visible_for(&self, mux_value: Option<u32>) -> bool {
        match self.mux {
            MuxRole::None | MuxRole::Multiplexer => true,
            MuxRole::MultiplexedValue(v) => mux_value == Some(v),
        }
    }
}

/// Clipboard payload for one copied message, including the signals and the
/// name of the node that owned the Tx copy at copy time.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageClip {
    pub message: MessageRecord,
    pub signals: Vec<SignalRecord>,
    /// Owner node name recorded at copy time; re-attached by name on paste.
    pub owner_node_name: String,
}

/// Clipboard payload for copied signals.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalClip {
    pub signals: Vec<SignalRecord>,
}
