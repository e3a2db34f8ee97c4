//! Bit-layout allocator.
//!
//! Pure functions over a message's signal list: where each signal's bits live
//! on the 64 bit payload plane ([`bit_position_of`]), whether the layout is
//! valid ([`BitGrid::recompute`]), and the interactive move/resize helpers
//! ([`checked_move`], [`SignalDrag`]).

mod drag;
mod grid;
mod position;

pub use drag::{DragEdge, SignalDrag, checked_move};
pub use grid::{BitGrid, GridCell, LayoutDiagnostics};
pub use position::{PAYLOAD_BITS, bit_position_of, occupied_cells, signal_fits};

pub(crate) use position::flip_in_byte;
