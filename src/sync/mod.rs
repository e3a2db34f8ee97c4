//! Synchronization engine.
//!
//! Maintains the [`SyncGroup`]s tying together the per-node copies of each
//! logical CAN message within one scope, the [`CriticalConflict`] list for
//! colliding transmitters, and the stable [`GroupKey`] mapping external
//! components use to survive edits.

mod engine;
mod group;

pub use engine::SyncEngine;
pub use group::{CriticalConflict, GroupKey, SyncGroup};
