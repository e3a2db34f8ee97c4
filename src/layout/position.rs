use crate::types::errors::LayoutError;
use crate::types::record::{ByteOrder, SignalRecord};

/// Size of the payload bit plane (8 data bytes).
pub const PAYLOAD_BITS: u16 = 64;

/// Flips the bit-within-byte position, leaving the byte untouched.
///
/// Maps a Motorola (MSB-first) bit number to its linear LSB-first cell and
/// back: the function is its own inverse. E.g. 0 -> 7, 7 -> 0, 8 -> 15.
#[inline]
pub(crate) fn flip_in_byte(bit: u16) -> u16 {
    (bit & !7) + (7 - (bit & 7))
}

/// Absolute payload cell of a signal's `bit_index`-th bit.
///
/// Intel: a plain offset from the start bit. Motorola: the start bit is the
/// MSB; successive bits advance MSB-first and continue at bit 7 of the next
/// byte, so the walk happens on the linearized plane and is flipped back into
/// cell numbering. Returns `None` when the bit leaves the 64 bit plane.
pub fn bit_position_of(start_bit: u16, byte_order: ByteOrder, bit_index: u16) -> Option<u16> {
    match byte_order {
        ByteOrder::Intel => {
            let cell = start_bit.checked_add(bit_index)?;
            (cell < PAYLOAD_BITS).then_some(cell)
        }
        ByteOrder::Motorola => {
            if start_bit >= PAYLOAD_BITS {
                return None;
            }
            let lin = flip_in_byte(start_bit).checked_add(bit_index)?;
            (lin < PAYLOAD_BITS).then(|| flip_in_byte(lin))
        }
    }
}

/// Linearized `[first, last]` cell range of a signal on the payload plane.
///
/// For both byte orders the range is contiguous on the linearized plane;
/// only the cell numbering differs. Returns `None` when any bit falls
/// outside the plane.
pub(crate) fn linear_range(signal: &SignalRecord) -> Option<(u16, u16)> {
    if signal.bit_length == 0 {
        return None;
    }
    let first = match signal.byte_order {
        ByteOrder::Intel => signal.start_bit,
        ByteOrder::Motorola => {
            if signal.start_bit >= PAYLOAD_BITS {
                return None;
            }
            flip_in_byte(signal.start_bit)
        }
    };
    let last = first.checked_add(signal.bit_length - 1)?;
    (last < PAYLOAD_BITS).then_some((first, last))
}

/// All payload cells occupied by `signal`, in dataset bit order.
///
/// `None` when the signal does not fit the plane.
pub fn occupied_cells(signal: &SignalRecord) -> Option<Vec<u16>> {
    (0..signal.bit_length)
        .map(|i| bit_position_of(signal.start_bit, signal.byte_order, i))
        .collect()
}

/// Verifies that a signal fits within the frame defined by `dlc`.
///
/// Returns `Ok(())` when the signal fits; `Err(...)` with the reason
/// otherwise.
pub fn signal_fits(dlc: u16, signal: &SignalRecord) -> Result<(), LayoutError> {
    if signal.bit_length == 0 {
        return Err(LayoutError::ZeroBitLength);
    }
    if signal.bit_length > PAYLOAD_BITS {
        return Err(LayoutError::LengthExceedsPlane {
            bit_length: signal.bit_length,
        });
    }
    let total_bits = (dlc as usize) * 8;

    match signal.byte_order {
        ByteOrder::Intel => {
            let start = signal.start_bit as usize;
            let end = start + (signal.bit_length as usize) - 1;
            if end < total_bits {
                Ok(())
            } else {
                Err(LayoutError::IntelOutOfBounds {
                    end,
                    total_bits,
                    dlc,
                })
            }
        }
        ByteOrder::Motorola => {
            let s = signal.start_bit as usize;
            let linearized_start = (s & !7) + (7 - (s & 7));
            let linearized_end = linearized_start + (signal.bit_length as usize) - 1;

            if linearized_start >= total_bits {
                return Err(LayoutError::MotorolaStartOutOfBounds {
                    start: linearized_start,
                    total_bits,
                    dlc,
                });
            }
            if linearized_end >= total_bits {
                return Err(LayoutError::MotorolaEndOutOfBounds {
                    end: linearized_end,
                    total_bits,
                    dlc,
                });
            }
            Ok(())
        }
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
    fn test_intel_positions_are_offsets() {
        assert_eq!(bit_position_of(8, ByteOrder::Intel, 0), Some(8));
        assert_eq!(bit_position_of(8, ByteOrder::Intel, 7), Some(15));
        assert_eq!(bit_position_of(60, ByteOrder::Intel, 3), Some(63));
        assert_eq!(bit_position_of(60, ByteOrder::Intel, 4), None);
    }

    #[test]
    fn test_motorola_positions_flip_within_byte() {
        // Start bit 7 = MSB of byte 0; the signal walks down to the LSB.
        assert_eq!(bit_position_of(7, ByteOrder::Motorola, 0), Some(7));
        assert_eq!(bit_position_of(7, ByteOrder::Motorola, 1), Some(6));
        assert_eq!(bit_position_of(7, ByteOrder::Motorola, 7), Some(0));
        // Crossing the byte boundary continues at bit 7 of the next byte.
        assert_eq!(bit_position_of(7, ByteOrder::Motorola, 8), Some(15));
        // Start at bit 0 of byte 0: only one bit left in that byte.
        assert_eq!(bit_position_of(0, ByteOrder::Motorola, 0), Some(0));
        assert_eq!(bit_position_of(0, ByteOrder::Motorola, 1), Some(15));
    }

    #[test]
    fn test_motorola_is_not_a_naive_offset() {
        // A naive offset would yield 9 here; the flip demands 14.
        assert_eq!(bit_position_of(15, ByteOrder::Motorola, 1), Some(14));
    }

    #[test]
    fn test_occupied_cells_cover_exact_range() {
        assert_eq!(
            occupied_cells(&sig(4, 4, ByteOrder::Intel)).unwrap(),
            vec![4, 5, 6, 7]
        );
        assert_eq!(
            occupied_cells(&sig(3, 6, ByteOrder::Motorola)).unwrap(),
            vec![3, 2, 1, 0, 15, 14]
        );
        assert!(occupied_cells(&sig(62, 4, ByteOrder::Intel)).is_none());
    }

    #[test]
    fn test_signal_fits_intel_bounds() {
        assert!(signal_fits(8, &sig(56, 8, ByteOrder::Intel)).is_ok());
        assert!(matches!(
            signal_fits(8, &sig(57, 8, ByteOrder::Intel)),
            Err(LayoutError::IntelOutOfBounds { end: 64, .. })
        ));
        assert!(matches!(
            signal_fits(2, &sig(0, 0, ByteOrder::Intel)),
            Err(LayoutError::ZeroBitLength)
        ));
    }

    #[test]
    fn test_signal_fits_motorola_bounds() {
        // Start 7 linearizes to 0; 16 bits reach exactly the end of 2 bytes.
        assert!(signal_fits(2, &sig(7, 16, ByteOrder::Motorola)).is_ok());
        assert!(matches!(
            signal_fits(2, &sig(7, 17, ByteOrder::Motorola)),
            Err(LayoutError::MotorolaEndOutOfBounds { .. })
        ));
        assert!(matches!(
            signal_fits(2, &sig(16, 4, ByteOrder::Motorola)),
            Err(LayoutError::MotorolaStartOutOfBounds { .. })
        ));
    }

    #[test]
    fn test_flip_is_an_involution() {
        for bit in 0..PAYLOAD_BITS {
            assert_eq!(flip_in_byte(flip_in_byte(bit)), bit);
        }
    }
}
