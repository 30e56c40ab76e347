//! Per-piece ownership bitmap, consistent with the on-wire `BITFIELD`
//! message's bit order: most significant bit of byte 0 is piece 0.

use bitvec::prelude::{BitVec, Msb0};

use crate::error::{Error, Result};
use crate::PieceIndex;

/// A peer's piece availability bitmap.
pub type Bitfield = BitVec<Msb0, u8>;

/// Returns the number of bytes a bitfield for `piece_count` pieces must
/// occupy on the wire: `ceil(piece_count / 8)`.
pub fn bitfield_byte_len(piece_count: usize) -> usize {
    (piece_count + 7) / 8
}

/// Builds an all-zero bitfield sized for `piece_count` pieces.
pub fn empty(piece_count: usize) -> Bitfield {
    let mut bitfield = Bitfield::new();
    bitfield.resize(piece_count, false);
    bitfield
}

/// Replaces a bitfield's contents from a wire-format byte buffer.
///
/// The byte buffer's length must equal [`bitfield_byte_len`] for
/// `piece_count`, otherwise `Error::InvalidBitfieldLength` is returned. Any
/// padding bits past `piece_count` in the last byte must be zero, per
/// spec's tail-zero-bit invariant; a nonzero padding bit is also rejected as
/// a malformed bitfield.
pub fn from_bytes(bytes: &[u8], piece_count: usize) -> Result<Bitfield> {
    let expected = bitfield_byte_len(piece_count);
    if bytes.len() != expected {
        return Err(Error::InvalidBitfieldLength {
            expected,
            actual: bytes.len(),
        });
    }

    let mut bitfield = Bitfield::from_vec(bytes.to_vec());
    let padding_bits = bitfield.len() - piece_count;
    if padding_bits > 0 && bitfield[piece_count..].any() {
        return Err(Error::InvalidBitfieldLength {
            expected,
            actual: bytes.len(),
        });
    }
    bitfield.truncate(piece_count);
    Ok(bitfield)
}

/// Sets every bit in `bitfield`, marking a peer as a seeder (`HAVE_ALL`).
pub fn mark_all(bitfield: &mut Bitfield) {
    bitfield.set_all(true);
}

/// Clears every bit in `bitfield` (`HAVE_NONE`).
pub fn clear_all(bitfield: &mut Bitfield) {
    bitfield.set_all(false);
}

/// Returns `true` iff all of the first `piece_count` bits are set. Since
/// `bitfield` is always exactly `piece_count` bits long in this crate (see
/// [`empty`] and [`from_bytes`]), this is simply "all bits set", but the
/// explicit length check documents the invariant spec.md §4.4 calls out.
pub fn all_set(bitfield: &Bitfield, piece_count: usize) -> bool {
    bitfield.len() == piece_count && bitfield.all()
}

/// Validates a piece index against a bitfield's dimensions.
pub fn check_index(index: PieceIndex, piece_count: usize) -> Result<()> {
    if index >= piece_count {
        Err(Error::InvalidPieceIndex { index, piece_count })
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_len_rounds_up() {
        assert_eq!(bitfield_byte_len(0), 0);
        assert_eq!(bitfield_byte_len(1), 1);
        assert_eq!(bitfield_byte_len(8), 1);
        assert_eq!(bitfield_byte_len(9), 2);
        assert_eq!(bitfield_byte_len(16), 2);
    }

    #[test]
    fn from_bytes_round_trips_bit_values() {
        // 0b1010_0000 -> pieces 0 and 2 set, out of 5 total pieces
        let bf = from_bytes(&[0b1010_0000], 5).unwrap();
        assert_eq!(bf.len(), 5);
        assert!(bf[0]);
        assert!(!bf[1]);
        assert!(bf[2]);
        assert!(!bf[3]);
        assert!(!bf[4]);
    }

    #[test]
    fn from_bytes_rejects_wrong_length() {
        let err = from_bytes(&[0, 0], 5).unwrap_err();
        assert_eq!(
            err,
            Error::InvalidBitfieldLength {
                expected: 1,
                actual: 2
            }
        );
    }

    #[test]
    fn from_bytes_rejects_nonzero_padding_bits() {
        // 5 pieces needs 1 byte; bits 5..8 are padding and must be zero
        let err = from_bytes(&[0b0000_0001], 5).unwrap_err();
        assert!(matches!(err, Error::InvalidBitfieldLength { .. }));
    }

    #[test]
    fn all_set_detects_full_bitfield() {
        let mut bf = empty(3);
        assert!(!all_set(&bf, 3));
        mark_all(&mut bf);
        assert!(all_set(&bf, 3));
        clear_all(&mut bf);
        assert!(!all_set(&bf, 3));
    }
}
