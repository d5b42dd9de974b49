//! Bit vectors that remember which of their bits are known
//!
//! Every value the emulator touches - evaluation-stack slots, heap chunks,
//! object fields - is stored as a [`BitVector`]: a little-endian byte buffer
//! paired with a mask in which a `1` bit means "this data bit is known".
//! Arithmetic defined in this module propagates the mask conservatively: a
//! result bit is only ever claimed as known when it provably is.
//!
//! Three views share one representation:
//!
//!   - [`BitVector`] owns its storage
//!   - [`BitVectorSpan`] is a mutable view (eg. a field inside a heap chunk);
//!     writing through it updates the underlying storage
//!   - [`BitSlice`] is a read-only view

mod arith;

pub use arith::Signedness;

use crate::util::Trilean;
use byteorder::{ByteOrder, LittleEndian};
use std::fmt;

/// Number of bytes needed to store `bit_len` bits
fn byte_len_for(bit_len: usize) -> usize {
    (bit_len + 7) / 8
}

/// Fixed-width byte buffer with a parallel known-bit mask
#[derive(Clone, PartialEq, Eq)]
pub struct BitVector {
    bits: Vec<u8>,
    mask: Vec<u8>,
    bit_len: usize,
}

impl BitVector {
    /// New vector of `bit_len` bits, all unknown
    pub fn unknown(bit_len: usize) -> BitVector {
        let bytes = byte_len_for(bit_len);
        BitVector {
            bits: vec![0; bytes],
            mask: vec![0; bytes],
            bit_len,
        }
    }

    /// New vector of `bit_len` bits, known to be all zero
    pub fn zeroed(bit_len: usize) -> BitVector {
        let mut vector = BitVector::unknown(bit_len);
        vector.as_span().mark_all_known();
        vector
    }

    /// Fully-known vector over a copy of the given bytes
    pub fn known_bytes(bytes: &[u8]) -> BitVector {
        BitVector {
            bits: bytes.to_vec(),
            mask: vec![0xff; bytes.len()],
            bit_len: bytes.len() * 8,
        }
    }

    /// Fully-known vector holding `value` truncated to `bit_len` bits,
    /// little-endian
    pub fn from_uint(value: u64, bit_len: usize) -> BitVector {
        let mut vector = BitVector::zeroed(bit_len);
        let bytes = vector.byte_len().min(8);
        let mut encoded = [0u8; 8];
        LittleEndian::write_u64(&mut encoded, value);
        vector.bits[..bytes].copy_from_slice(&encoded[..bytes]);
        vector
    }

    pub fn from_i32(value: i32) -> BitVector {
        BitVector::known_bytes(&value.to_le_bytes())
    }

    pub fn from_i64(value: i64) -> BitVector {
        BitVector::known_bytes(&value.to_le_bytes())
    }

    pub fn from_f32(value: f32) -> BitVector {
        BitVector::known_bytes(&value.to_bits().to_le_bytes())
    }

    pub fn from_f64(value: f64) -> BitVector {
        BitVector::known_bytes(&value.to_bits().to_le_bytes())
    }

    pub fn bit_len(&self) -> usize {
        self.bit_len
    }

    pub fn byte_len(&self) -> usize {
        self.bits.len()
    }

    /// Read-only view over the whole vector
    pub fn as_slice(&self) -> BitSlice<'_> {
        BitSlice {
            bits: &self.bits,
            mask: &self.mask,
            bit_len: self.bit_len,
        }
    }

    /// Mutable view over the whole vector
    pub fn as_span(&mut self) -> BitVectorSpan<'_> {
        BitVectorSpan {
            bits: &mut self.bits,
            mask: &mut self.mask,
            bit_len: self.bit_len,
        }
    }

    pub fn is_fully_known(&self) -> bool {
        self.as_slice().is_fully_known()
    }
}

/// Shared `Debug` body: hex bytes most-significant first, `??` for bytes with
/// no known bits and `**` for partially-known ones.
fn fmt_bits(bits: &[u8], mask: &[u8], f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "0x")?;
    for (index, byte) in bits.iter().enumerate().rev() {
        match mask[index] {
            0xff => write!(f, "{:02x}", byte)?,
            0x00 => write!(f, "??")?,
            _ => write!(f, "**")?,
        }
    }
    Ok(())
}

impl fmt::Debug for BitVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_bits(&self.bits, &self.mask, f)
    }
}

/// Read-only view into a [`BitVector`]
#[derive(Clone, Copy)]
pub struct BitSlice<'a> {
    bits: &'a [u8],
    mask: &'a [u8],
    bit_len: usize,
}

impl<'a> BitSlice<'a> {
    pub fn bit_len(&self) -> usize {
        self.bit_len
    }

    pub fn byte_len(&self) -> usize {
        self.bits.len()
    }

    /// Raw data bytes; bits whose mask bit is clear carry no meaning
    pub fn bytes(&self) -> &'a [u8] {
        self.bits
    }

    pub fn mask_bytes(&self) -> &'a [u8] {
        self.mask
    }

    /// Data bit at index `index` (little-endian bit order)
    pub fn bit(&self, index: usize) -> bool {
        self.bits[index / 8] & (1 << (index % 8)) != 0
    }

    /// Is the data bit at `index` known?
    pub fn bit_known(&self, index: usize) -> bool {
        self.mask[index / 8] & (1 << (index % 8)) != 0
    }

    pub fn is_fully_known(&self) -> bool {
        (0..self.bit_len).all(|index| self.bit_known(index))
    }

    pub fn is_fully_unknown(&self) -> bool {
        (0..self.bit_len).all(|index| !self.bit_known(index))
    }

    /// Three-valued "all bits are zero"
    ///
    /// A single known set bit decides the answer even when other bits are
    /// unknown.
    pub fn is_zero(&self) -> Trilean {
        let mut all_known = true;
        for index in 0..self.bit_len {
            if self.bit_known(index) {
                if self.bit(index) {
                    return Trilean::False;
                }
            } else {
                all_known = false;
            }
        }
        if all_known {
            Trilean::True
        } else {
            Trilean::Unknown
        }
    }

    /// Three-valued sign bit (the highest bit of the vector)
    pub fn sign_bit(&self) -> Trilean {
        if self.bit_len == 0 {
            return Trilean::False;
        }
        let top = self.bit_len - 1;
        if self.bit_known(top) {
            Trilean::from(self.bit(top))
        } else {
            Trilean::Unknown
        }
    }

    /// Value as an unsigned little-endian integer, if fully known and at most
    /// 128 bits wide
    pub fn le_uint(&self) -> Option<u128> {
        if self.bit_len > 128 || !self.is_fully_known() {
            return None;
        }
        let mut padded = [0u8; 16];
        padded[..self.bits.len()].copy_from_slice(self.bits);
        Some(LittleEndian::read_u128(&padded))
    }

    /// Value as a signed integer of this width, if fully known
    pub fn le_int(&self) -> Option<i128> {
        self.le_uint()
            .map(|value| arith::sign_extend(value, self.bit_len))
    }

    pub fn le_u32(&self) -> Option<u32> {
        self.le_uint().and_then(|value| u32::try_from(value).ok())
    }

    pub fn le_u64(&self) -> Option<u64> {
        self.le_uint().and_then(|value| u64::try_from(value).ok())
    }

    /// Owned copy of the viewed range
    pub fn to_vector(&self) -> BitVector {
        BitVector {
            bits: self.bits.to_vec(),
            mask: self.mask.to_vec(),
            bit_len: self.bit_len,
        }
    }

    /// Read-only sub-view of `byte_len` bytes starting at `byte_offset`
    pub fn slice(&self, byte_offset: usize, byte_len: usize) -> BitSlice<'a> {
        BitSlice {
            bits: &self.bits[byte_offset..byte_offset + byte_len],
            mask: &self.mask[byte_offset..byte_offset + byte_len],
            bit_len: byte_len * 8,
        }
    }
}

impl<'a> fmt::Debug for BitSlice<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_bits(self.bits, self.mask, f)
    }
}

/// Mutable view into a [`BitVector`]
///
/// Spans returned by the layout helpers alias heap-chunk storage, so writing
/// through a span is how object fields get updated.
pub struct BitVectorSpan<'a> {
    bits: &'a mut [u8],
    mask: &'a mut [u8],
    bit_len: usize,
}

impl<'a> BitVectorSpan<'a> {
    pub fn bit_len(&self) -> usize {
        self.bit_len
    }

    pub fn byte_len(&self) -> usize {
        self.bits.len()
    }

    pub fn as_slice(&self) -> BitSlice<'_> {
        BitSlice {
            bits: self.bits,
            mask: self.mask,
            bit_len: self.bit_len,
        }
    }

    /// Reborrow as a shorter-lived span
    pub fn reborrow(&mut self) -> BitVectorSpan<'_> {
        BitVectorSpan {
            bits: self.bits,
            mask: self.mask,
            bit_len: self.bit_len,
        }
    }

    /// Narrow this span to `byte_len` bytes starting at `byte_offset`
    pub fn slice(self, byte_offset: usize, byte_len: usize) -> BitVectorSpan<'a> {
        BitVectorSpan {
            bits: &mut self.bits[byte_offset..byte_offset + byte_len],
            mask: &mut self.mask[byte_offset..byte_offset + byte_len],
            bit_len: byte_len * 8,
        }
    }

    /// Mark every bit unknown (data bits are left in place but meaningless)
    pub fn clear_mask(&mut self) {
        self.mask.fill(0);
    }

    /// Mark every bit known
    pub fn mark_all_known(&mut self) {
        self.mask.fill(0xff);
        let spare = self.bits.len() * 8 - self.bit_len;
        if spare > 0 {
            if let Some(last) = self.mask.last_mut() {
                *last >>= spare;
            }
        }
    }

    /// Overwrite with fully-known bytes
    pub fn write_known_bytes(&mut self, bytes: &[u8]) {
        self.bits.copy_from_slice(bytes);
        self.mark_all_known();
    }

    /// Overwrite with a fully-known little-endian integer truncated to this
    /// span's width
    pub fn write_uint(&mut self, value: u64) {
        let mut encoded = [0u8; 8];
        LittleEndian::write_u64(&mut encoded, value);
        let bytes = self.bits.len().min(8);
        self.bits[..bytes].copy_from_slice(&encoded[..bytes]);
        for byte in &mut self.bits[bytes..] {
            *byte = 0;
        }
        self.mark_all_known();
    }

    /// Copy data and mask from a same-width source
    pub fn copy_from(&mut self, source: &BitSlice<'_>) -> Result<(), crate::Error> {
        if source.bit_len() != self.bit_len {
            return Err(crate::Error::InvalidOperation(
                "copy between bit vectors of different widths",
            ));
        }
        self.bits.copy_from_slice(source.bits);
        self.mask.copy_from_slice(source.mask);
        Ok(())
    }
}

impl<'a> fmt::Debug for BitVectorSpan<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_bits(self.bits, self.mask, f)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::util::Trilean;

    #[test]
    fn constructors_and_knownness() {
        assert!(BitVector::from_i32(7).is_fully_known());
        assert!(BitVector::unknown(32).as_slice().is_fully_unknown());
        assert!(BitVector::zeroed(32).is_fully_known());
        assert_eq!(BitVector::zeroed(32).as_slice().is_zero(), Trilean::True);
    }

    #[test]
    fn uint_round_trip() {
        let vector = BitVector::from_uint(0xdead_beef, 32);
        assert_eq!(vector.as_slice().le_u32(), Some(0xdead_beef));
        assert_eq!(vector.as_slice().le_u64(), Some(0xdead_beef));

        let wide = BitVector::from_uint(0x0123_4567_89ab_cdef, 64);
        assert_eq!(wide.as_slice().le_u64(), Some(0x0123_4567_89ab_cdef));
    }

    #[test]
    fn sign_extension() {
        let vector = BitVector::known_bytes(&[0xfe]);
        assert_eq!(vector.as_slice().le_int(), Some(-2));
        assert_eq!(vector.as_slice().sign_bit(), Trilean::True);
    }

    #[test]
    fn zero_predicate_on_partial_knowledge() {
        // Low byte known to hold a set bit, high bytes unknown
        let mut vector = BitVector::unknown(32);
        {
            let mut low = vector.as_span().slice(0, 1);
            low.write_known_bytes(&[0x01]);
        }
        assert_eq!(
            vector.as_slice().is_zero(),
            Trilean::False,
            "a single known set bit decides non-zero"
        );

        // All-unknown value decides nothing
        assert_eq!(BitVector::unknown(32).as_slice().is_zero(), Trilean::Unknown);
    }

    #[test]
    fn spans_alias_their_owner() {
        let mut vector = BitVector::unknown(64);
        vector.as_span().slice(4, 4).write_uint(0x1234);
        assert_eq!(vector.as_slice().slice(4, 4).le_u32(), Some(0x1234));
        assert!(vector.as_slice().slice(0, 4).is_fully_unknown());
    }
}
