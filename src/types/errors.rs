use thiserror::Error;

use crate::sync::GroupKey;
use crate::types::reference::MessageReference;

/// Errors produced while verifying that a signal fits a CAN frame layout.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LayoutError {
    #[error("Signal bit length cannot be zero")]
    ZeroBitLength,
    #[error("Signal bit length {bit_length} exceeds the 64 bit payload plane")]
    LengthExceedsPlane { bit_length: u16 },
    #[error(
        "Out of bounds (Intel): signal end bit = {end}, message total bits = {total_bits} (bytes={dlc})"
    )]
    IntelOutOfBounds { end: usize, total_bits: usize, dlc: u16 },
    #[error(
        "Out of bounds (Motorola): signal linearized start = {start}, message total bits = {total_bits} (bytes={dlc})"
    )]
    MotorolaStartOutOfBounds {
        start: usize,
        total_bits: usize,
        dlc: u16,
    },
    #[error("Out of bounds (Motorola): signal linearized end = {end} exceeds total bits {total_bits} (bytes={dlc})")]
    MotorolaEndOutOfBounds {
        end: usize,
        total_bits: usize,
        dlc: u16,
    },
}

/// A violated consistency rule, reported by the validation checker before any
/// mutation takes place.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Message name cannot be empty")]
    EmptyName,
    #[error("Message name '{name}' is not a valid identifier")]
    InvalidIdentifier { name: String },
    #[error("Message name '{name}' exceeds {max} characters")]
    NameTooLong { name: String, max: usize },
    #[error("Message name '{name}' is already used within the scope")]
    DuplicateName { name: String },
    #[error("CAN ID {id_hex} is out of range for the {format} format")]
    IdOutOfRange { id_hex: String, format: String },
    #[error("DLC {dlc} is outside the 1..=8 byte payload range")]
    DlcOutOfRange { dlc: u16 },
    #[error("CAN ID {id_hex} is already used by another message")]
    IdAlreadyUsed { id_hex: String },
    #[error("CAN ID {id_hex} would collide with a message transmitted by a different node")]
    IdCausesCriticalConflict { id_hex: String },
    #[error("CAN IDs of the {protocol} protocol are device mapped and read-only")]
    IdReadOnly { protocol: String },
    #[error("Message has no transmitting node")]
    NoTxOwner,
    #[error("Direction change would leave the message without a transmitting node")]
    LastTxOwner,
    #[error("Message already has the requested direction")]
    DirectionUnchanged,
    #[error("Message {id_hex} is part of a critical conflict")]
    CriticalConflict { id_hex: String },
    #[error("Message defines more than one multiplexer signal")]
    MultipleMultiplexers,
    #[error("The {protocol} protocol requires at least one signal per message")]
    SignalRequired { protocol: String },
    #[error("Signal '{name}' is not byte aligned (start bit {start_bit}, length {bit_length})")]
    ByteAlignment {
        name: String,
        start_bit: u16,
        bit_length: u16,
    },
    #[error("Signals overlap in payload cell {cell}")]
    SignalOverlap { cell: u16 },
    #[error("Unoccupied payload cell {cell} below the highest used bit")]
    LayoutGap { cell: u16 },
    #[error("No valid paste target in the current scope")]
    NoPasteTarget,
    #[error(transparent)]
    Layout(#[from] LayoutError),
}

/// Errors returned by the synchronization engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SyncError {
    #[error("Group {group:?} no longer exists (stale reference)")]
    StaleGroup { group: GroupKey },
    #[error("Reference {reference:?} is not tracked by the engine")]
    UntrackedReference { reference: MessageReference },
    #[error("Synchronization state is inconsistent: {details}")]
    IndexInconsistency { details: &'static str },
}

/// Errors returned by the external data store.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("No message list for container of {reference:?}")]
    ContainerMissing { reference: MessageReference },
    #[error("Message not found for {reference:?}")]
    MessageMissing { reference: MessageReference },
    #[error("Signal index {index} out of range for {reference:?}")]
    SignalMissing {
        reference: MessageReference,
        index: usize,
    },
    #[error("Node index {node} does not exist")]
    NodeMissing { node: usize },
}

/// Errors returned by reversible compound operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// The operation was rejected before any mutation.
    #[error(transparent)]
    Rejected(#[from] ValidationError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error("Command has not been applied; nothing to revert")]
    NotApplied,
    #[error("Nothing to undo")]
    NothingToUndo,
    #[error("Nothing to redo")]
    NothingToRedo,
}
