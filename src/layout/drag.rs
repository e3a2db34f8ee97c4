use crate::layout::position::{PAYLOAD_BITS, flip_in_byte, linear_range, signal_fits};
use crate::types::record::{ByteOrder, SignalRecord};
use crate::types::reference::LayoutPolicy;

/// Which edge of a signal a resize drag currently holds.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DragEdge {
    /// The edge at the signal's first linearized cell.
    Start,
    /// The edge at the signal's last linearized cell.
    End,
}

/// Shifts a signal's start bit by `delta` payload cells.
///
/// Byte-aligned policies snap the delta to the nearest multiple of 8. The
/// move is all-or-nothing: when the new position would leave the `dlc` frame
/// (or the snapped delta is zero), nothing changes and `false` is returned.
pub fn checked_move(
    signal: &mut SignalRecord,
    delta: i32,
    dlc: u16,
    policy: LayoutPolicy,
) -> bool {
    let delta = if policy.byte_aligned {
        snap_to_byte(delta)
    } else {
        delta
    };
    if delta == 0 {
        return false;
    }

    let new_start = signal.start_bit as i32 + delta;
    if new_start < 0 || new_start >= PAYLOAD_BITS as i32 {
        return false;
    }

    let mut moved = signal.clone();
    moved.start_bit = new_start as u16;
    if signal_fits(dlc, &moved).is_err() {
        return false;
    }

    signal.start_bit = moved.start_bit;
    true
}

/// Nearest multiple of 8, ties rounded away from zero.
fn snap_to_byte(delta: i32) -> i32 {
    let q = if delta >= 0 {
        (delta + 4) / 8
    } else {
        (delta - 4) / 8
    };
    q * 8
}

/// Interactive resize of one signal edge with the edge-swap policy.
///
/// Dragging an edge past the opposite one does not clamp: the drag continues
/// as if the user had grabbed that other edge, and [`SignalDrag::edge`]
/// reports the swap. The signal never shrinks below 1 bit and is never moved
/// off the frame; a drag that would do either leaves the signal unchanged.
#[derive(Clone, Debug)]
pub struct SignalDrag {
    edge: DragEdge,
}

impl SignalDrag {
    pub fn new(edge: DragEdge) -> Self {
        Self { edge }
    }

    /// The edge the drag currently holds (may have swapped).
    pub fn edge(&self) -> DragEdge {
        self.edge
    }

    /// Moves the held edge by `delta` linearized cells. Returns `true` when
    /// the signal changed.
    pub fn resize(
        &mut self,
        signal: &mut SignalRecord,
        delta: i32,
        dlc: u16,
        policy: LayoutPolicy,
    ) -> bool {
        if delta == 0 {
            return false;
        }
        let Some((first, last)) = linear_range(signal) else {
            return false;
        };
        let (mut first, mut last) = (first as i32, last as i32);

        let mut edge = self.edge;
        match edge {
            DragEdge::Start => first += delta,
            DragEdge::End => last += delta,
        }
        // Crossing the opposite edge continues the resize from that edge.
        if first > last {
            std::mem::swap(&mut first, &mut last);
            edge = match edge {
                DragEdge::Start => DragEdge::End,
                DragEdge::End => DragEdge::Start,
            };
        }
        if policy.byte_aligned {
            match edge {
                DragEdge::Start => first = (first / 8) * 8,
                DragEdge::End => last = ((last + 8) / 8) * 8 - 1,
            }
        }
        if first < 0 || last >= PAYLOAD_BITS as i32 {
            return false;
        }

        let mut resized = signal.clone();
        resized.bit_length = (last - first + 1) as u16;
        resized.start_bit = match signal.byte_order {
            ByteOrder::Intel => first as u16,
            ByteOrder::Motorola => flip_in_byte(first as u16),
        };
        if signal_fits(dlc, &resized).is_err() {
            return false;
        }

        *signal = resized;
        self.edge = edge;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig(start_bit: u16, bit_length: u16, byte_order: ByteOrder) -> SignalRecord {
        SignalRecord {
            start_bit,
            bit_length,
            byte_order,
            ..Default::default()
        }
    }

    #[test]
    fn test_move_within_frame() {
        let mut s = sig(8, 8, ByteOrder::Intel);
        assert!(checked_move(&mut s, 4, 8, LayoutPolicy::default()));
        assert_eq!(s.start_bit, 12);
        assert!(checked_move(&mut s, -12, 8, LayoutPolicy::default()));
        assert_eq!(s.start_bit, 0);
    }

    #[test]
    fn test_move_out_of_range_is_rejected_without_mutation() {
        let mut s = sig(8, 8, ByteOrder::Intel);
        assert!(!checked_move(&mut s, 52, 8, LayoutPolicy::default()));
        assert!(!checked_move(&mut s, -9, 8, LayoutPolicy::default()));
        assert_eq!(s, sig(8, 8, ByteOrder::Intel));

        // DLC bounds the frame, not the 64 bit plane.
        assert!(!checked_move(&mut s, 8, 2, LayoutPolicy::default()));
        assert_eq!(s.start_bit, 8);
    }

    #[test]
    fn test_byte_aligned_move_snaps_to_byte_boundaries() {
        let aligned = LayoutPolicy {
            byte_aligned: true,
            ..Default::default()
        };
        let mut s = sig(8, 8, ByteOrder::Intel);
        // 5 snaps to 8.
        assert!(checked_move(&mut s, 5, 8, aligned));
        assert_eq!(s.start_bit, 16);
        // 3 snaps to 0: nothing to do.
        assert!(!checked_move(&mut s, 3, 8, aligned));
        assert_eq!(s.start_bit, 16);
        // -5 snaps to -8.
        assert!(checked_move(&mut s, -5, 8, aligned));
        assert_eq!(s.start_bit, 8);
    }

    #[test]
    fn test_resize_end_edge() {
        let mut s = sig(8, 8, ByteOrder::Intel);
        let mut drag = SignalDrag::new(DragEdge::End);
        assert!(drag.resize(&mut s, 4, 8, LayoutPolicy::default()));
        assert_eq!((s.start_bit, s.bit_length), (8, 12));
        assert_eq!(drag.edge(), DragEdge::End);
    }

    #[test]
    fn test_resize_past_opposite_edge_swaps() {
        // [8, 15]; dragging the end edge 10 cells left lands at cell 5,
        // which is before the start edge: the drag continues as a start drag
        // over [5, 8].
        let mut s = sig(8, 8, ByteOrder::Intel);
        let mut drag = SignalDrag::new(DragEdge::End);
        assert!(drag.resize(&mut s, -10, 8, LayoutPolicy::default()));
        assert_eq!((s.start_bit, s.bit_length), (5, 4));
        assert_eq!(drag.edge(), DragEdge::Start);
    }

    #[test]
    fn test_resize_never_drops_below_one_bit() {
        // Start and end on the same cell; pulling the end edge one left
        // swaps and grows leftwards instead of reaching length 0.
        let mut s = sig(8, 1, ByteOrder::Intel);
        let mut drag = SignalDrag::new(DragEdge::End);
        assert!(drag.resize(&mut s, -1, 8, LayoutPolicy::default()));
        assert_eq!((s.start_bit, s.bit_length), (7, 2));
        assert_eq!(drag.edge(), DragEdge::Start);
    }

    #[test]
    fn test_resize_off_frame_is_rejected() {
        let mut s = sig(8, 8, ByteOrder::Intel);
        let mut drag = SignalDrag::new(DragEdge::Start);
        assert!(!drag.resize(&mut s, -9, 8, LayoutPolicy::default()));
        assert_eq!((s.start_bit, s.bit_length), (8, 8));
        assert_eq!(drag.edge(), DragEdge::Start);
    }

    #[test]
    fn test_resize_motorola_keeps_msb_start() {
        // Motorola start 7 (MSB of byte 0), 8 bits: linear [0, 7]. Extending
        // the end edge by 8 reaches linear [0, 15]; the start bit stays the
        // MSB of byte 0.
        let mut s = sig(7, 8, ByteOrder::Motorola);
        let mut drag = SignalDrag::new(DragEdge::End);
        assert!(drag.resize(&mut s, 8, 8, LayoutPolicy::default()));
        assert_eq!((s.start_bit, s.bit_length), (7, 16));
    }
}
