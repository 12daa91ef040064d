//! Packed log positions.
//!
//! A `Position` is the 64-bit coordinate of a byte in the log buffer:
//! the high 32 bits hold the partition cycle id (incremented by one on
//! every rotation, forever) and the low 32 bits hold the byte offset
//! within that partition. Because the cycle occupies the high bits,
//! numeric ordering of the packed value equals lexicographic ordering
//! of `(cycle, offset)`, so positions are monotonically non-decreasing
//! as the log advances.

use std::fmt;

/// A packed `(cycle, offset)` coordinate in the log buffer.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct Position(u64);

impl Position {
    /// The position of the very first byte of a fresh buffer.
    pub const ZERO: Self = Self(0);

    /// Creates a position from a cycle id and a byte offset.
    #[inline]
    #[must_use]
    pub const fn new(cycle: u32, offset: u32) -> Self {
        Self(((cycle as u64) << 32) | offset as u64)
    }

    /// Reconstructs a position from its packed representation.
    #[inline]
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the packed representation.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Returns the partition cycle id.
    #[inline]
    #[must_use]
    pub const fn cycle(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Returns the byte offset within the partition.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)] // Low 32 bits by construction.
    pub const fn offset(self) -> u32 {
        self.0 as u32
    }

    /// Advances the position by a byte count, rolling past partition
    /// ends into subsequent cycles with the offset reset.
    ///
    /// An advance that lands exactly on a partition end normalizes to
    /// offset zero of the next cycle, so positions at partition
    /// boundaries have a single canonical form.
    ///
    /// # Panics
    /// Panics if `partition_size` is zero or the cycle id would
    /// overflow.
    #[must_use]
    pub fn add_bytes(self, bytes: u64, partition_size: u32) -> Self {
        assert!(partition_size > 0, "partition_size must be positive");

        let total = u64::from(self.offset()) + bytes;
        let carried = total / u64::from(partition_size);
        let offset = total % u64::from(partition_size);

        let cycle = u64::from(self.cycle()) + carried;
        assert!(cycle <= u64::from(u32::MAX), "cycle overflow");

        #[allow(clippy::cast_possible_truncation)] // Bounded by the asserts above.
        let position = Self::new(cycle as u32, offset as u32);
        position
    }
}

impl fmt::Debug for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pos({}:{})", self.cycle(), self.offset())
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.cycle(), self.offset())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_unpack() {
        let pos = Position::new(7, 4096);
        assert_eq!(pos.cycle(), 7);
        assert_eq!(pos.offset(), 4096);
        assert_eq!(Position::from_raw(pos.raw()), pos);
    }

    #[test]
    fn test_ordering_matches_cycle_then_offset() {
        let a = Position::new(1, 4000);
        let b = Position::new(2, 0);
        let c = Position::new(2, 8);
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn test_add_within_partition() {
        let pos = Position::new(3, 100).add_bytes(24, 1024);
        assert_eq!(pos, Position::new(3, 124));
    }

    #[test]
    fn test_add_exactly_to_partition_end_rolls() {
        let pos = Position::new(3, 1000).add_bytes(24, 1024);
        assert_eq!(pos, Position::new(4, 0));
    }

    #[test]
    fn test_add_across_multiple_partitions() {
        let pos = Position::new(0, 512).add_bytes(3 * 1024, 1024);
        assert_eq!(pos, Position::new(3, 512));
    }

    #[test]
    #[should_panic(expected = "cycle overflow")]
    fn test_add_cycle_overflow_panics() {
        let _ = Position::new(u32::MAX, 0).add_bytes(1024, 1024);
    }
}
