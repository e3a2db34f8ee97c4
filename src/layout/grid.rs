use crate::layout::position::{PAYLOAD_BITS, occupied_cells, signal_fits};
use crate::types::record::{MuxRole, SignalRecord};
use crate::types::reference::LayoutPolicy;

/// One payload bit position, owning the set of signals occupying it.
///
/// Occupants are indices into the signal list the grid was last recomputed
/// from. Normally a cell holds 0 or 1 occupants; more than one is an overlap
/// error.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GridCell {
    pub occupants: Vec<usize>,
}

/// Validity findings of one [`BitGrid::recompute`] pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LayoutDiagnostics {
    /// Cells occupied by more than one visible signal.
    pub overlaps: Vec<u16>,
    /// Empty cells below the highest occupied cell (gapless policies only).
    pub gaps: Vec<u16>,
    /// Indices of signals that do not fit the frame.
    pub out_of_range: Vec<usize>,
}

impl LayoutDiagnostics {
    pub fn is_valid(&self) -> bool {
        self.overlaps.is_empty() && self.gaps.is_empty() && self.out_of_range.is_empty()
    }
}

/// Occupancy of the 64 payload bit positions of one message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BitGrid {
    cells: Vec<GridCell>,
}

impl Default for BitGrid {
    fn default() -> Self {
        Self {
            cells: vec![GridCell::default(); PAYLOAD_BITS as usize],
        }
    }
}

impl BitGrid {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears and rebuilds the occupancy from the current signal list.
    ///
    /// Only the subset visible for `mux_value` takes part: the multiplexer
    /// switch, plain signals, and multiplexed signals whose configured value
    /// matches. Multiplexed signals of other values may therefore legally
    /// reuse the same cells.
    ///
    /// Signals that do not fit the `dlc` frame are reported in
    /// `out_of_range` and placed on no cell. The pass is idempotent: running
    /// it twice without an intervening mutation yields identical occupancy.
    pub fn recompute(
        &mut self,
        signals: &[SignalRecord],
        dlc: u16,
        policy: LayoutPolicy,
        mux_value: Option<u32>,
    ) -> LayoutDiagnostics {
        for cell in &mut self.cells {
            cell.occupants.clear();
        }
        let mut diag = LayoutDiagnostics::default();

        for (index, signal) in signals.iter().enumerate() {
            if !signal.is_visible_for(mux_value) {
                continue;
            }
            if signal_fits(dlc, signal).is_err() {
                diag.out_of_range.push(index);
                continue;
            }
            // signal_fits passed, so every cell is on the plane.
            if let Some(cells) = occupied_cells(signal) {
                for cell in cells {
                    self.cells[cell as usize].occupants.push(index);
                }
            }
        }

        for (cell, content) in self.cells.iter().enumerate() {
            if content.occupants.len() > 1 {
                diag.overlaps.push(cell as u16);
            }
        }

        if policy.gapless
            && let Some(highest) = self.highest_occupied()
        {
            for cell in 0..highest {
                if self.cells[cell as usize].occupants.is_empty() {
                    diag.gaps.push(cell);
                }
            }
        }

        diag
    }

    /// Occupants of one payload cell. Empty for cells outside the plane.
    pub fn occupants(&self, cell: u16) -> &[usize] {
        self.cells
            .get(cell as usize)
            .map_or(&[], |c| c.occupants.as_slice())
    }

    pub fn cell(&self, cell: u16) -> Option<&GridCell> {
        self.cells.get(cell as usize)
    }

    /// Highest cell with at least one occupant.
    pub fn highest_occupied(&self) -> Option<u16> {
        self.cells
            .iter()
            .rposition(|c| !c.occupants.is_empty())
            .map(|i| i as u16)
    }

    /// The distinct multiplexer values configured across a signal list.
    pub fn mux_values(signals: &[SignalRecord]) -> Vec<u32> {
        let mut values: Vec<u32> = signals
            .iter()
            .filter_map(|s| match s.mux {
                MuxRole::MultiplexedValue(v) => Some(v),
                _ => None,
            })
            .collect();
        values.sort_unstable();
        values.dedup();
        values
    }
}
