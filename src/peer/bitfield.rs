//! A peer's advertisement of which piece indices it can serve.
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BitfieldError {
    #[error("bitfield of {bits} bits cannot cover {pieces} pieces")]
    TooShort { bits: usize, pieces: usize },
}

/// A bit array packed MSB-first: piece `i` lives at byte `i >> 3` under
/// mask `1 << (7 - (i & 7))`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitfield {
    bytes: Vec<u8>,
    nbits: usize,
}

impl Bitfield {
    /// An all-zero bitfield of `nbits` bits. Sessions start with one of
    /// these so HAVE messages arriving before any BITFIELD are applied to
    /// a well-defined state.
    pub fn empty(nbits: usize) -> Bitfield {
        Bitfield {
            bytes: vec![0; nbits.div_ceil(8)],
            nbits,
        }
    }

    /// Wraps a raw bitfield payload covering `nbits` pieces.
    ///
    /// A payload with fewer bits than pieces is a protocol error; spare
    /// trailing bits beyond `nbits` are simply never read.
    pub fn from_bytes(bytes: Vec<u8>, nbits: usize) -> Result<Bitfield, BitfieldError> {
        if bytes.len() * 8 < nbits {
            return Err(BitfieldError::TooShort {
                bits: bytes.len() * 8,
                pieces: nbits,
            });
        }
        Ok(Bitfield { bytes, nbits })
    }

    /// Whether bit `index` is set. Out-of-range indices read as unset.
    pub fn has(&self, index: usize) -> bool {
        index < self.nbits && self.bytes[index >> 3] & Self::mask(index) != 0
    }

    /// Sets bit `index`; out-of-range indices are ignored.
    pub fn set(&mut self, index: usize) {
        if index < self.nbits {
            self.bytes[index >> 3] |= Self::mask(index);
        }
    }

    /// Clears bit `index`; out-of-range indices are ignored.
    pub fn clear(&mut self, index: usize) {
        if index < self.nbits {
            self.bytes[index >> 3] &= !Self::mask(index);
        }
    }

    fn mask(index: usize) -> u8 {
        1 << (7 - (index & 7))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_msb_first() {
        // 0xA0 = 1010_0000: bits 0 and 2 set
        let field = Bitfield::from_bytes(vec![0xA0], 8).unwrap();
        assert!(field.has(0));
        assert!(!field.has(1));
        assert!(field.has(2));
        for i in 3..8 {
            assert!(!field.has(i));
        }
    }

    #[test]
    fn set_and_clear_leave_other_bits_alone() {
        let mut field = Bitfield::empty(16);
        field.set(9);
        field.set(10);

        field.set(3);
        assert!(field.has(3));
        assert!(field.has(9) && field.has(10));

        field.clear(3);
        assert!(!field.has(3));
        assert!(field.has(9) && field.has(10));
    }

    #[test]
    fn out_of_range_access_is_inert() {
        let mut field = Bitfield::empty(3);
        field.set(7);
        assert!(!field.has(7));
        assert!(!field.has(1000));
        assert!((0..3).all(|i| !field.has(i)));
    }

    #[test]
    fn spare_trailing_bits_are_never_read() {
        // 5 pieces in one byte: bits 5..8 are padding
        let field = Bitfield::from_bytes(vec![0xFF], 5).unwrap();
        assert!((0..5).all(|i| field.has(i)));
        assert!(!field.has(5));
        assert!(!field.has(7));
    }

    #[test]
    fn rejects_bitfield_shorter_than_piece_count() {
        let err = Bitfield::from_bytes(vec![0xFF], 9).unwrap_err();
        assert!(matches!(err, BitfieldError::TooShort { bits: 8, pieces: 9 }));
    }
}
