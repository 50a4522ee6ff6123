//! Fixed-width bit-vector values carried on simulated wires.
//!
//! A [`BitVector`] stores its numeric value as little-endian bytes and
//! carries a separate `big_endian` flag. The flag does not change the
//! numeric value; it only selects the byte order used when the value is
//! converted to or from a byte image (see [`BitVector::to_bytes`] and
//! [`BitVector::from_bytes`]). This mirrors how a slave maps a data word
//! onto a byte-addressable memory.
//!
//! # Example
//!
//! ```
//! use axi_emu::sim::BitVector;
//!
//! let word = BitVector::from_u64(0x1122_3344, 32);
//! assert_eq!(word.to_bytes(), vec![0x44, 0x33, 0x22, 0x11]);
//!
//! let be = word.with_endianness(true);
//! assert_eq!(be.to_bytes(), vec![0x11, 0x22, 0x33, 0x44]);
//! assert_eq!(be.to_u64(), 0x1122_3344);
//! ```

use std::fmt;

use smallvec::SmallVec;

/// Byte storage for a bit-vector. Eight inline bytes cover every AXI4-Lite
/// data word without a heap allocation.
type Bytes = SmallVec<[u8; 8]>;

/// A fixed-width binary value with an endianness attribute.
#[derive(Debug, Clone)]
pub struct BitVector {
    /// Width in bits.
    width: u32,
    /// Numeric value, least significant byte first.
    bytes: Bytes,
    /// Byte order used by `to_bytes`/`from_bytes`.
    big_endian: bool,
}

impl BitVector {
    /// All-zero value of the given width.
    pub fn zero(width: u32) -> Self {
        let mut bytes = Bytes::new();
        bytes.resize(Self::byte_len(width), 0);
        Self { width, bytes, big_endian: false }
    }

    /// Value of the given width from an integer, truncated to `width` bits.
    pub fn from_u64(value: u64, width: u32) -> Self {
        let mut v = Self::zero(width);
        for (dst, src) in v.bytes.iter_mut().zip(value.to_le_bytes()) {
            *dst = src;
        }
        v.mask();
        v
    }

    /// Single-bit value.
    pub fn from_bool(value: bool) -> Self {
        Self::from_u64(value as u64, 1)
    }

    /// Value whose byte image is `bytes` in the given byte order.
    ///
    /// The width is `8 * bytes.len()`.
    pub fn from_bytes(bytes: &[u8], big_endian: bool) -> Self {
        let mut stored: Bytes = bytes.iter().copied().collect();
        if big_endian {
            stored.reverse();
        }
        Self {
            width: (bytes.len() * 8) as u32,
            bytes: stored,
            big_endian,
        }
    }

    /// Width in bits.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Number of bytes needed to hold `width` bits.
    #[inline]
    pub fn byte_len(width: u32) -> usize {
        width.div_ceil(8) as usize
    }

    /// Whether byte images are big-endian.
    pub fn is_big_endian(&self) -> bool {
        self.big_endian
    }

    /// Same value with a different byte-order attribute.
    pub fn with_endianness(mut self, big_endian: bool) -> Self {
        self.big_endian = big_endian;
        self
    }

    /// Lowest 64 bits of the value.
    pub fn to_u64(&self) -> u64 {
        let mut raw = [0u8; 8];
        for (dst, src) in raw.iter_mut().zip(self.bytes.iter()) {
            *dst = *src;
        }
        u64::from_le_bytes(raw)
    }

    /// Whether the value fits in a `u64` without losing set bits.
    pub fn fits_u64(&self) -> bool {
        self.bytes.iter().skip(8).all(|b| *b == 0)
    }

    /// Byte image of the value in its configured byte order.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = self.bytes.to_vec();
        if self.big_endian {
            out.reverse();
        }
        out
    }

    /// Bit `index` (0 = least significant). Bits past the width read as 0.
    pub fn bit(&self, index: u32) -> bool {
        if index >= self.width {
            return false;
        }
        let byte = self.bytes[(index / 8) as usize];
        (byte >> (index % 8)) & 1 == 1
    }

    /// True if any bit is set. Used for single-bit control wires.
    pub fn is_true(&self) -> bool {
        self.bytes.iter().any(|b| *b != 0)
    }

    /// Same value zero-extended or truncated to `width` bits.
    pub fn resized(&self, width: u32) -> Self {
        let mut bytes = self.bytes.clone();
        bytes.resize(Self::byte_len(width), 0);
        let mut v = Self { width, bytes, big_endian: self.big_endian };
        v.mask();
        v
    }

    /// Clear storage bits above `width`.
    fn mask(&mut self) {
        let rem = self.width % 8;
        if rem != 0 {
            if let Some(top) = self.bytes.last_mut() {
                *top &= (1u8 << rem) - 1;
            }
        }
    }
}

/// Equality compares width and numeric value only; the endianness flag is a
/// view attribute.
impl PartialEq for BitVector {
    fn eq(&self, other: &Self) -> bool {
        self.width == other.width && self.bytes == other.bytes
    }
}

impl Eq for BitVector {}

impl fmt::LowerHex for BitVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            write!(f, "0x")?;
        }
        let digits = self.width.div_ceil(4).max(1) as usize;
        let mut s = String::with_capacity(self.bytes.len() * 2);
        for b in self.bytes.iter().rev() {
            s.push_str(&format!("{:02x}", b));
        }
        // Drop leading nibbles past the width.
        let skip = s.len().saturating_sub(digits);
        write!(f, "{}", &s[skip..])
    }
}

impl fmt::Display for BitVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}'h{:x}", self.width, self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_u64_truncates() {
        let v = BitVector::from_u64(0x1FF, 8);
        assert_eq!(v.to_u64(), 0xFF);
        assert_eq!(v.width(), 8);

        let v = BitVector::from_u64(0b1111, 3);
        assert_eq!(v.to_u64(), 0b111);
    }

    #[test]
    fn test_byte_image_little_endian() {
        let v = BitVector::from_u64(0xAABB_CCDD, 32);
        assert_eq!(v.to_bytes(), vec![0xDD, 0xCC, 0xBB, 0xAA]);
    }

    #[test]
    fn test_byte_image_big_endian() {
        let v = BitVector::from_bytes(&[0x01, 0x02, 0x03, 0x04], true);
        assert_eq!(v.to_u64(), 0x0102_0304);
        assert_eq!(v.to_bytes(), vec![0x01, 0x02, 0x03, 0x04]);
        assert_eq!(v.with_endianness(false).to_bytes(), vec![0x04, 0x03, 0x02, 0x01]);
    }

    #[test]
    fn test_wide_value() {
        let bytes: Vec<u8> = (0..16).collect();
        let v = BitVector::from_bytes(&bytes, false);
        assert_eq!(v.width(), 128);
        assert!(!v.fits_u64());
        assert_eq!(v.to_u64(), u64::from_le_bytes([0, 1, 2, 3, 4, 5, 6, 7]));
        assert_eq!(v.to_bytes(), bytes);
    }

    #[test]
    fn test_bits_and_truth() {
        let v = BitVector::from_u64(0b0101, 4);
        assert!(v.bit(0));
        assert!(!v.bit(1));
        assert!(v.bit(2));
        assert!(!v.bit(7));
        assert!(v.is_true());
        assert!(!BitVector::zero(1).is_true());
        assert!(BitVector::from_bool(true).is_true());
    }

    #[test]
    fn test_resized() {
        let v = BitVector::from_u64(0xABCD, 16);
        assert_eq!(v.resized(8).to_u64(), 0xCD);
        assert_eq!(v.resized(32).to_u64(), 0xABCD);
        assert_eq!(v.resized(32).width(), 32);
    }

    #[test]
    fn test_equality_ignores_endianness() {
        let a = BitVector::from_u64(7, 8);
        let b = a.clone().with_endianness(true);
        assert_eq!(a, b);
        assert_ne!(a, BitVector::from_u64(7, 16));
    }

    #[test]
    fn test_formatting() {
        let v = BitVector::from_u64(0x2A, 12);
        assert_eq!(format!("{:x}", v), "02a");
        assert_eq!(format!("{}", v), "12'h02a");
        assert_eq!(format!("{:#x}", BitVector::from_bool(true)), "0x1");
    }
}
