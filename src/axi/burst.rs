//! Burst geometry arithmetic.
//!
//! Pure functions for turning an address-phase request into per-beat byte
//! ranges, independent of any signal timing.
//!
//! # Incrementing Bursts
//!
//! For `AxADDR = 0x1000`, `AxLEN = 7`, `AxSIZE = 2`:
//! ```text
//! beats          = AxLEN + 1  = 8
//! bytes_per_beat = 2^AxSIZE   = 4
//!
//! beat 0: [0x1000, 0x1004)
//! beat 1: [0x1004, 0x1008)
//! ...
//! beat 7: [0x101C, 0x1020)
//! ```
//!
//! Only incrementing bursts are modeled. FIXED and WRAP requests are
//! accepted but walked as if they were INCR; see [`BurstGeometry::is_incrementing`].

use std::ops::Range;

use super::BurstType;
use crate::error::ConfigError;

/// Largest defined AxSIZE encoding (128 bytes per beat is encoding 7 and is
/// not supported).
pub const MAX_SIZE_ENCODING: u64 = 6;

/// Bytes per beat for an AxSIZE encoding.
pub fn bytes_in_beat(size: u64) -> Result<usize, ConfigError> {
    if size > MAX_SIZE_ENCODING {
        return Err(ConfigError::UndefinedBurstSize(size));
    }
    Ok(1usize << size)
}

/// Byte range touched by beat `beat` of an incrementing burst.
///
/// `None` if the beat runs past the end of the 64-bit address space.
#[inline]
pub fn beat_range(base: u64, beat: u64, bytes_per_beat: usize) -> Option<Range<u64>> {
    let bytes = bytes_per_beat as u64;
    let start = beat.checked_mul(bytes).and_then(|offset| base.checked_add(offset))?;
    let end = start.checked_add(bytes)?;
    Some(start..end)
}

/// Latched address-phase fields of one burst.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BurstGeometry {
    /// Start address (AxADDR).
    pub address: u64,
    /// Beats minus one (AxLEN).
    pub len: u64,
    /// Size encoding (AxSIZE).
    pub size: u64,
    /// Burst type (AxBURST).
    pub burst: BurstType,
    /// Protection bits (AxPROT), passed through.
    pub prot: u64,
    bytes_per_beat: usize,
}

impl BurstGeometry {
    /// Validate and latch a burst request.
    pub fn new(address: u64, len: u64, size: u64, burst: BurstType, prot: u64) -> Result<Self, ConfigError> {
        Ok(Self {
            address,
            len,
            size,
            burst,
            prot,
            bytes_per_beat: bytes_in_beat(size)?,
        })
    }

    /// Number of beats in the burst.
    pub fn beats(&self) -> u64 {
        self.len + 1
    }

    /// Bytes transferred per beat.
    pub fn bytes_per_beat(&self) -> usize {
        self.bytes_per_beat
    }

    /// Total bytes covered by the burst.
    pub fn total_bytes(&self) -> u64 {
        self.beats() * self.bytes_per_beat as u64
    }

    /// Byte range of one beat, `None` past the end of the address space.
    pub fn beat_range(&self, beat: u64) -> Option<Range<u64>> {
        beat_range(self.address, beat, self.bytes_per_beat)
    }

    /// Whether `beat` is the final beat.
    pub fn is_last(&self, beat: u64) -> bool {
        beat == self.len
    }

    /// Whether the burst type is the one the address walk implements.
    pub fn is_incrementing(&self) -> bool {
        self.burst == BurstType::Incr
    }

    /// Byte ranges of all beats, in order. Stops at the first beat that
    /// does not fit in the address space.
    pub fn ranges(&self) -> impl Iterator<Item = Range<u64>> + '_ {
        (0..self.beats()).map_while(move |beat| self.beat_range(beat))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_in_beat() {
        assert_eq!(bytes_in_beat(0).unwrap(), 1);
        assert_eq!(bytes_in_beat(2).unwrap(), 4);
        assert_eq!(bytes_in_beat(6).unwrap(), 64);
        assert_eq!(bytes_in_beat(7), Err(ConfigError::UndefinedBurstSize(7)));
    }

    #[test]
    fn test_beat_range() {
        assert_eq!(beat_range(0x1000, 0, 4), Some(0x1000..0x1004));
        assert_eq!(beat_range(0x1000, 7, 4), Some(0x101C..0x1020));
        assert_eq!(beat_range(0x10, 3, 8), Some(0x28..0x30));
    }

    #[test]
    fn test_beat_range_at_top_of_address_space() {
        assert_eq!(beat_range(u64::MAX - 4, 0, 4), Some(u64::MAX - 4..u64::MAX));
        assert_eq!(beat_range(u64::MAX - 1, 0, 4), None);
        assert_eq!(beat_range(u64::MAX - 7, 1, 4), None);
        assert_eq!(beat_range(0, u64::MAX, 2), None);

        let geom = BurstGeometry::new(u64::MAX - 7, 3, 2, BurstType::Incr, 0).unwrap();
        assert_eq!(geom.ranges().count(), 1);
    }

    #[test]
    fn test_eight_beat_burst_ranges() {
        let geom = BurstGeometry::new(0x1000, 7, 2, BurstType::Incr, 0).unwrap();
        assert_eq!(geom.beats(), 8);
        assert_eq!(geom.bytes_per_beat(), 4);
        assert_eq!(geom.total_bytes(), 32);

        let ranges: Vec<_> = geom.ranges().collect();
        assert_eq!(ranges.len(), 8);
        assert_eq!(ranges[0], 0x1000..0x1004);
        assert_eq!(ranges[7], 0x101C..0x1020);

        // Strictly increasing and non-overlapping
        for pair in ranges.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }

        assert!(geom.is_last(7));
        assert!(!geom.is_last(6));
    }

    #[test]
    fn test_single_beat() {
        let geom = BurstGeometry::new(0x40, 0, 3, BurstType::Incr, 0b010).unwrap();
        assert_eq!(geom.beats(), 1);
        assert!(geom.is_last(0));
        assert_eq!(geom.beat_range(0), Some(0x40..0x48));
    }

    #[test]
    fn test_undefined_size_rejected() {
        assert_eq!(
            BurstGeometry::new(0, 0, 7, BurstType::Incr, 0),
            Err(ConfigError::UndefinedBurstSize(7))
        );
    }

    #[test]
    fn test_non_incrementing_flagged() {
        let geom = BurstGeometry::new(0, 3, 2, BurstType::Wrap, 0).unwrap();
        assert!(!geom.is_incrementing());
        // Walked as INCR
        assert_eq!(geom.beat_range(3), Some(12..16));
    }
}
