//! Backing memory image for slave agents.
//!
//! A [`Memory`] is a flat, 0-indexed byte array of fixed capacity. Slaves
//! borrow byte ranges from it for each beat; the image is never copied as a
//! whole and never grows.
//!
//! # Usage
//!
//! ```
//! use axi_emu::memory::Memory;
//!
//! let mut mem = Memory::new(0x100);
//! mem.write(0x10, &[1, 2, 3, 4]).unwrap();
//!
//! // Only bytes 0 and 2 are committed
//! mem.write_masked(0x10, &[0xA0, 0xA1, 0xA2, 0xA3], 0b0101).unwrap();
//! assert_eq!(mem.peek(0x10, 4).unwrap(), &[0xA0, 2, 0xA2, 4]);
//!
//! assert_eq!(mem.read_u32(0x10, false).unwrap(), 0x04A2_02A0);
//! ```

use std::ops::Range;

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use thiserror::Error;

/// Error type for memory image accesses.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryError {
    /// The range `[address, address + len)` is not inside the image.
    #[error("Access of {len} bytes at 0x{address:08x} is outside the {capacity}-byte memory image")]
    OutOfRange { address: u64, len: usize, capacity: usize },
    /// Data and strobe describe a beat wider than the strobe can mask.
    #[error("Strobe cannot mask a {len}-byte beat (max 64)")]
    StrobeTooNarrow { len: usize },
}

/// Access statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryStats {
    /// Read operations.
    pub reads: u64,
    /// Write operations (masked or not).
    pub writes: u64,
    /// Bytes returned by reads.
    pub bytes_read: u64,
    /// Bytes actually modified by writes.
    pub bytes_written: u64,
    /// Bytes skipped because their strobe bit was clear.
    pub bytes_masked: u64,
}

/// Flat byte-addressable memory image.
#[derive(Debug, Clone)]
pub struct Memory {
    bytes: Vec<u8>,
    stats: MemoryStats,
}

impl Memory {
    /// Zero-filled image of `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        Self::from_bytes(vec![0u8; capacity])
    }

    /// Image initialized from existing contents.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            stats: MemoryStats::default(),
        }
    }

    /// Capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.bytes.len()
    }

    /// Whole image.
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    /// Access statistics.
    pub fn stats(&self) -> &MemoryStats {
        &self.stats
    }

    /// Validate `[address, address + len)` and convert it to an index range.
    fn range(&self, address: u64, len: usize) -> Result<Range<usize>, MemoryError> {
        let out_of_range = MemoryError::OutOfRange {
            address,
            len,
            capacity: self.bytes.len(),
        };
        let start = usize::try_from(address).map_err(|_| out_of_range.clone())?;
        let end = start.checked_add(len).ok_or_else(|| out_of_range.clone())?;
        if end > self.bytes.len() {
            return Err(out_of_range);
        }
        Ok(start..end)
    }

    /// Read a byte range, counted in the statistics.
    pub fn read(&mut self, address: u64, len: usize) -> Result<&[u8], MemoryError> {
        let range = self.range(address, len)?;
        self.stats.reads += 1;
        self.stats.bytes_read += len as u64;
        Ok(&self.bytes[range])
    }

    /// Read a byte range without touching the statistics.
    pub fn peek(&self, address: u64, len: usize) -> Result<&[u8], MemoryError> {
        let range = self.range(address, len)?;
        Ok(&self.bytes[range])
    }

    /// Write a byte range.
    pub fn write(&mut self, address: u64, data: &[u8]) -> Result<(), MemoryError> {
        let range = self.range(address, data.len())?;
        self.bytes[range].copy_from_slice(data);
        self.stats.writes += 1;
        self.stats.bytes_written += data.len() as u64;
        Ok(())
    }

    /// Write only the bytes whose strobe bit is set.
    ///
    /// Strobe bit `i` selects `data[i]`, stored at `address + i`. The whole
    /// range must be inside the image even if some bytes are masked.
    /// Returns the number of bytes modified.
    pub fn write_masked(&mut self, address: u64, data: &[u8], strobe: u64) -> Result<usize, MemoryError> {
        if data.len() > 64 {
            return Err(MemoryError::StrobeTooNarrow { len: data.len() });
        }
        let range = self.range(address, data.len())?;
        let mut written = 0;
        for (i, (dst, src)) in self.bytes[range].iter_mut().zip(data).enumerate() {
            if (strobe >> i) & 1 == 1 {
                *dst = *src;
                written += 1;
            }
        }
        self.stats.writes += 1;
        self.stats.bytes_written += written as u64;
        self.stats.bytes_masked += (data.len() - written) as u64;
        Ok(written)
    }

    /// Read a 32-bit word in the given byte order.
    pub fn read_u32(&mut self, address: u64, big_endian: bool) -> Result<u32, MemoryError> {
        let bytes = self.read(address, 4)?;
        Ok(if big_endian {
            BigEndian::read_u32(bytes)
        } else {
            LittleEndian::read_u32(bytes)
        })
    }

    /// Read a 64-bit word in the given byte order.
    pub fn read_u64(&mut self, address: u64, big_endian: bool) -> Result<u64, MemoryError> {
        let bytes = self.read(address, 8)?;
        Ok(if big_endian {
            BigEndian::read_u64(bytes)
        } else {
            LittleEndian::read_u64(bytes)
        })
    }

    /// Write a 32-bit word in the given byte order.
    pub fn write_u32(&mut self, address: u64, value: u32, big_endian: bool) -> Result<(), MemoryError> {
        let mut buf = [0u8; 4];
        if big_endian {
            BigEndian::write_u32(&mut buf, value);
        } else {
            LittleEndian::write_u32(&mut buf, value);
        }
        self.write(address, &buf)
    }

    /// Write a 64-bit word in the given byte order.
    pub fn write_u64(&mut self, address: u64, value: u64, big_endian: bool) -> Result<(), MemoryError> {
        let mut buf = [0u8; 8];
        if big_endian {
            BigEndian::write_u64(&mut buf, value);
        } else {
            LittleEndian::write_u64(&mut buf, value);
        }
        self.write(address, &buf)
    }

    /// Reset statistics.
    pub fn reset_stats(&mut self) {
        self.stats = MemoryStats::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_is_zeroed() {
        let mem = Memory::new(64);
        assert_eq!(mem.capacity(), 64);
        assert!(mem.as_slice().iter().all(|b| *b == 0));
    }

    #[test]
    fn test_read_write_range() {
        let mut mem = Memory::new(16);
        mem.write(4, &[1, 2, 3]).unwrap();
        assert_eq!(mem.read(4, 3).unwrap(), &[1, 2, 3]);
        assert_eq!(mem.stats().writes, 1);
        assert_eq!(mem.stats().reads, 1);
        assert_eq!(mem.stats().bytes_read, 3);
    }

    #[test]
    fn test_out_of_range() {
        let mut mem = Memory::new(16);
        let err = mem.write(14, &[0; 4]).unwrap_err();
        assert_eq!(err, MemoryError::OutOfRange { address: 14, len: 4, capacity: 16 });
        assert_eq!(
            err.to_string(),
            "Access of 4 bytes at 0x0000000e is outside the 16-byte memory image"
        );
        assert_eq!(
            MemoryError::StrobeTooNarrow { len: 128 }.to_string(),
            "Strobe cannot mask a 128-byte beat (max 64)"
        );
        assert!(mem.read(u64::MAX, 1).is_err());
        // Boundary access is fine
        assert!(mem.write(12, &[0; 4]).is_ok());
    }

    #[test]
    fn test_write_masked() {
        let mut mem = Memory::from_bytes(vec![0x11, 0x22, 0x33, 0x44]);
        let written = mem.write_masked(0, &[0xAA, 0xBB, 0xCC, 0xDD], 0b0101).unwrap();
        assert_eq!(written, 2);
        assert_eq!(mem.as_slice(), &[0xAA, 0x22, 0xCC, 0x44]);
        assert_eq!(mem.stats().bytes_masked, 2);
    }

    #[test]
    fn test_masked_range_checked_even_when_masked() {
        let mut mem = Memory::new(4);
        assert!(mem.write_masked(2, &[0; 4], 0b0001).is_err());
        assert_eq!(mem.as_slice(), &[0; 4]);
    }

    #[test]
    fn test_word_endianness() {
        let mut mem = Memory::new(16);
        mem.write_u32(0, 0x0102_0304, false).unwrap();
        assert_eq!(mem.peek(0, 4).unwrap(), &[4, 3, 2, 1]);
        mem.write_u32(4, 0x0102_0304, true).unwrap();
        assert_eq!(mem.peek(4, 4).unwrap(), &[1, 2, 3, 4]);
        assert_eq!(mem.read_u32(4, true).unwrap(), 0x0102_0304);

        mem.write_u64(8, 0x1122_3344_5566_7788, false).unwrap();
        assert_eq!(mem.read_u64(8, false).unwrap(), 0x1122_3344_5566_7788);
        assert_eq!(mem.read_u64(8, true).unwrap(), 0x8877_6655_4433_2211);
    }

    #[test]
    fn test_peek_does_not_count() {
        let mut mem = Memory::new(8);
        mem.peek(0, 8).unwrap();
        assert_eq!(mem.stats().reads, 0);
        mem.read(0, 8).unwrap();
        mem.reset_stats();
        assert_eq!(*mem.stats(), MemoryStats::default());
    }
}
