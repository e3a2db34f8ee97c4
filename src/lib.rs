//! # can_sync
//!
//! Consistency core for editing **multi-node CAN** communication setups.
//!
//! ## Highlights
//! - **Synchronization engine**: partitions per-node message copies into
//!   groups by `(CAN-ID, extended)` identity with SlotMap-backed [`GroupKey`]s
//!   that stay valid across list reordering.
//! - **Index tracking**: deleting, inserting or re-directing a message patches
//!   every tracked reference of the affected container, so locators never go
//!   stale.
//! - **Critical conflicts**: two transmitters on one identity are diverted to
//!   a queryable conflict list instead of silently merged.
//! - **Bit-layout allocator**: Intel/Motorola payload grids, overlap and gap
//!   diagnostics, snapped drag/resize via [`SignalDrag`].
//! - **Validation checker**: name/ID/direction/placement rules per protocol
//!   ([`Protocol::Layer2`], [`Protocol::Safety`], [`Protocol::CanOpen`]).
//! - **Reversible commands**: every mutation is a [`Command`] with exact
//!   undo, collected by a caller-owned [`CommandHistory`].
//!
//! The crate owns no message data: hosts implement [`SystemStore`] (or use
//! the bundled [`MemoryStore`]) and route every edit through the command
//! engine.

pub mod check;
pub mod commands;
pub mod layout;
pub mod store;
pub mod sync;
pub mod types;

// Top-level re-exports (appear under Crate Items → Structs)
#[doc(inline)]
pub use crate::commands::{
    AddMessage, AddSignal, ChangeMessageDirection, Command, CommandHistory, DeleteMessage,
    DeleteSignal, InsertMessage, InsertSignal, MoveSignal, PasteMessages, PasteSignals,
    SetMessageProperties, SetSignalProperties, clip_message,
};
#[doc(inline)]
pub use crate::layout::{BitGrid, DragEdge, LayoutDiagnostics, SignalDrag};
#[doc(inline)]
pub use crate::store::{InterfaceSlot, MemoryStore, SystemStore};
#[doc(inline)]
pub use crate::sync::{CriticalConflict, GroupKey, SyncEngine, SyncGroup};
#[doc(inline)]
pub use crate::types::{
    errors::{CommandError, LayoutError, StoreError, SyncError, ValidationError},
    record::{ByteOrder, MessageClip, MessageRecord, MuxRole, SignalClip, SignalRecord},
    reference::{Direction, LayoutPolicy, MessageReference, Protocol, SyncScope},
};
