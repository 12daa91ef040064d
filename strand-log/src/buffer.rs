//! The partitioned log buffer.
//!
//! A `LogBuffer` owns a contiguous byte region of `3 * partition_size`
//! bytes plus three out-of-band partition metadata records. Exactly one
//! partition is ACTIVE at any instant; the id of its current cycle is
//! advertised through an atomic that producers read on every claim.

use std::sync::atomic::{AtomicU32, Ordering};

use crossbeam_utils::CachePadded;
use strand_core::{Error, Limits, Position, Result, PARTITION_COUNT};

use crate::atomic_buffer::AtomicBuffer;
use crate::partition::{PartitionState, PartitionStatus};

/// Outcome of a rotation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotateOutcome {
    /// This caller performed the rotation.
    Rotated,
    /// Another producer rotated first; the caller should reload the
    /// active cycle and retry its claim.
    AlreadyRotated,
    /// The next partition is still dirty: the slowest subscription has
    /// not drained it and the conductor has not reclaimed it.
    NextNotClean,
}

/// The fixed-capacity, three-partition fragment log.
#[derive(Debug)]
pub struct LogBuffer {
    data: AtomicBuffer,
    partitions: [CachePadded<PartitionState>; PARTITION_COUNT as usize],
    active_cycle: AtomicU32,
    partition_size: u32,
}

impl LogBuffer {
    /// Allocates a log buffer with three partitions of `partition_size`
    /// bytes each.
    ///
    /// # Errors
    /// Returns an error if the partition size is not a power of two or
    /// falls outside the configured limits.
    pub fn new(partition_size: u32, limits: &Limits) -> Result<Self> {
        limits.validate()?;

        if !partition_size.is_power_of_two() {
            return Err(Error::InvalidArgument {
                name: "partition_size",
                reason: "must be a power of two",
            });
        }
        if partition_size < limits.partition_size_bytes_min {
            return Err(Error::LimitExceeded {
                limit: "partition_size_bytes_min",
                max: u64::from(limits.partition_size_bytes_min),
                actual: u64::from(partition_size),
            });
        }
        if partition_size > limits.partition_size_bytes_max {
            return Err(Error::LimitExceeded {
                limit: "partition_size_bytes_max",
                max: u64::from(limits.partition_size_bytes_max),
                actual: u64::from(partition_size),
            });
        }

        Ok(Self {
            data: AtomicBuffer::new(partition_size as usize * PARTITION_COUNT as usize),
            partitions: [
                CachePadded::new(PartitionState::new(PartitionStatus::Active, 0)),
                CachePadded::new(PartitionState::new(PartitionStatus::Clean, 0)),
                CachePadded::new(PartitionState::new(PartitionStatus::Clean, 0)),
            ],
            active_cycle: AtomicU32::new(0),
            partition_size,
        })
    }

    /// Returns the size of one partition in bytes.
    #[must_use]
    pub const fn partition_size(&self) -> u32 {
        self.partition_size
    }

    /// Returns the total data capacity in bytes.
    #[must_use]
    pub const fn capacity(&self) -> u64 {
        self.partition_size as u64 * PARTITION_COUNT as u64
    }

    /// Returns the cycle id of the active partition.
    #[must_use]
    pub fn active_cycle(&self) -> u32 {
        self.active_cycle.load(Ordering::Acquire)
    }

    /// Returns the metadata of the partition used for `cycle`.
    #[must_use]
    pub fn partition(&self, cycle: u32) -> &PartitionState {
        &self.partitions[(cycle % PARTITION_COUNT) as usize]
    }

    /// Returns the byte offset of the partition used for `cycle` within
    /// the data region.
    #[must_use]
    pub fn partition_base(&self, cycle: u32) -> usize {
        (cycle % PARTITION_COUNT) as usize * self.partition_size as usize
    }

    /// Returns the shared data region.
    #[must_use]
    pub const fn data(&self) -> &AtomicBuffer {
        &self.data
    }

    /// Returns the position of the next claimable byte.
    ///
    /// The value may lag a concurrent claim but never overtakes one, so
    /// readers can use it as a safe visibility bound.
    #[must_use]
    pub fn append_position(&self) -> Position {
        let cycle = self.active_cycle();
        let tail = self.partition(cycle).tail().min(self.partition_size);
        Position::new(cycle, tail)
    }

    /// Attempts to rotate the active partition from `from_cycle` to the
    /// next one.
    ///
    /// Only succeeds if the next partition in rotation order is CLEAN.
    /// The winner stamps the new cycle, publishes it, and retires the
    /// old partition to DIRTY.
    ///
    /// # Panics
    /// Panics if the cycle id would overflow.
    pub fn try_rotate(&self, from_cycle: u32) -> RotateOutcome {
        assert!(from_cycle < u32::MAX, "cycle overflow");

        if self.active_cycle() != from_cycle {
            return RotateOutcome::AlreadyRotated;
        }

        let next_cycle = from_cycle + 1;
        let next = self.partition(next_cycle);
        match next.status() {
            PartitionStatus::Dirty => RotateOutcome::NextNotClean,
            PartitionStatus::Active => RotateOutcome::AlreadyRotated,
            PartitionStatus::Clean => {
                if next.try_activate(next_cycle) {
                    self.active_cycle.store(next_cycle, Ordering::Release);
                    self.partition(from_cycle).retire();
                    RotateOutcome::Rotated
                } else {
                    RotateOutcome::AlreadyRotated
                }
            }
        }
    }

    /// Reclaims every DIRTY partition fully drained at `min_position`.
    ///
    /// Called by the conductor only. A partition activated for cycle
    /// `c` is drained once every subscription position has reached
    /// `(c + 1, 0)`. Reclaiming wipes the partition's data region so
    /// readers of the next cycle find unwritten (zero) length words,
    /// then resets the tail and publishes CLEAN.
    ///
    /// Returns the number of partitions reclaimed.
    pub fn reclaim_drained(&self, min_position: Position) -> u32 {
        let mut reclaimed = 0;
        for partition in &self.partitions {
            if partition.status() != PartitionStatus::Dirty {
                continue;
            }
            let end = Position::new(partition.cycle() + 1, 0);
            if min_position >= end {
                let base = self.partition_base(partition.cycle());
                self.data.zero_region(base, self.partition_size as usize);
                partition.reclaim();
                reclaimed += 1;
            }
        }
        reclaimed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer() -> LogBuffer {
        LogBuffer::new(4096, &Limits::new()).unwrap()
    }

    #[test]
    fn test_construction_validates_size() {
        assert!(LogBuffer::new(4096, &Limits::new()).is_ok());
        assert!(LogBuffer::new(5000, &Limits::new()).is_err());
        assert!(LogBuffer::new(1024, &Limits::new()).is_err());
    }

    #[test]
    fn test_initial_layout() {
        let buf = buffer();
        assert_eq!(buf.capacity(), 3 * 4096);
        assert_eq!(buf.active_cycle(), 0);
        assert_eq!(buf.partition(0).status(), PartitionStatus::Active);
        assert_eq!(buf.partition(1).status(), PartitionStatus::Clean);
        assert_eq!(buf.partition(2).status(), PartitionStatus::Clean);
        assert_eq!(buf.append_position(), Position::ZERO);
    }

    #[test]
    fn test_partition_base_wraps() {
        let buf = buffer();
        assert_eq!(buf.partition_base(0), 0);
        assert_eq!(buf.partition_base(1), 4096);
        assert_eq!(buf.partition_base(2), 8192);
        assert_eq!(buf.partition_base(3), 0);
    }

    #[test]
    fn test_rotate_into_clean() {
        let buf = buffer();
        assert_eq!(buf.try_rotate(0), RotateOutcome::Rotated);
        assert_eq!(buf.active_cycle(), 1);
        assert_eq!(buf.partition(0).status(), PartitionStatus::Dirty);
        assert_eq!(buf.partition(1).status(), PartitionStatus::Active);
        assert_eq!(buf.partition(1).cycle(), 1);
    }

    #[test]
    fn test_rotate_stale_cycle_reports_already_rotated() {
        let buf = buffer();
        assert_eq!(buf.try_rotate(0), RotateOutcome::Rotated);
        assert_eq!(buf.try_rotate(0), RotateOutcome::AlreadyRotated);
    }

    #[test]
    fn test_rotate_blocked_by_dirty_partition() {
        let buf = buffer();
        assert_eq!(buf.try_rotate(0), RotateOutcome::Rotated);
        assert_eq!(buf.try_rotate(1), RotateOutcome::Rotated);
        // Partition 0 is dirty and nobody consumed it.
        assert_eq!(buf.try_rotate(2), RotateOutcome::NextNotClean);
    }

    #[test]
    fn test_reclaim_requires_drained_consumers() {
        let buf = buffer();
        buf.data().put_bytes(0, &[0xAB; 64]);
        assert_eq!(buf.try_rotate(0), RotateOutcome::Rotated);

        // Consumer still inside cycle 0: nothing reclaimed.
        assert_eq!(buf.reclaim_drained(Position::new(0, 128)), 0);
        assert_eq!(buf.partition(0).status(), PartitionStatus::Dirty);

        // Consumer crossed into cycle 1: partition 0 comes back clean
        // and wiped.
        assert_eq!(buf.reclaim_drained(Position::new(1, 0)), 1);
        assert_eq!(buf.partition(0).status(), PartitionStatus::Clean);
        let mut probe = [0xFFu8; 64];
        buf.data().get_bytes(0, &mut probe);
        assert_eq!(probe, [0u8; 64]);

        // And the buffer can rotate through it again.
        assert_eq!(buf.try_rotate(1), RotateOutcome::Rotated);
        assert_eq!(buf.try_rotate(2), RotateOutcome::Rotated);
        assert_eq!(buf.active_cycle(), 3);
        assert_eq!(buf.partition(3).cycle(), 3);
    }
}
