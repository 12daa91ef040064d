//! Partition metadata.
//!
//! Each of the three log partitions carries an out-of-band metadata
//! record: its lifecycle status, the cycle id it was last activated
//! for, and the tail counter pointing at the next writable byte. The
//! data region itself stays pure payload.
//!
//! Status transitions form a cycle:
//!
//! ```text
//! CLEAN --activate--> ACTIVE --retire--> DIRTY --reclaim--> CLEAN
//! ```
//!
//! Activation is claimed with a CAS by the producer performing the
//! rotation; reclamation is performed only by the conductor once every
//! subscription has drained the partition.

use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};

/// Lifecycle status of a partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PartitionStatus {
    /// Wiped and ready to be activated.
    Clean = 0,
    /// Currently receiving claims.
    Active = 1,
    /// Filled and retired; awaiting reclamation.
    Dirty = 2,
}

impl PartitionStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Clean,
            1 => Self::Active,
            2 => Self::Dirty,
            _ => unreachable!("invalid partition status {value}"),
        }
    }
}

/// Metadata for one log partition.
#[derive(Debug)]
pub struct PartitionState {
    status: AtomicU8,
    cycle: AtomicU32,
    tail: AtomicU32,
}

impl PartitionState {
    /// Creates partition metadata in the given initial status.
    #[must_use]
    pub fn new(status: PartitionStatus, cycle: u32) -> Self {
        Self {
            status: AtomicU8::new(status as u8),
            cycle: AtomicU32::new(cycle),
            tail: AtomicU32::new(0),
        }
    }

    /// Returns the current status.
    #[must_use]
    pub fn status(&self) -> PartitionStatus {
        PartitionStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    /// Returns the cycle id this partition was last activated for.
    #[must_use]
    pub fn cycle(&self) -> u32 {
        self.cycle.load(Ordering::Acquire)
    }

    /// Returns the next writable offset within the partition.
    #[must_use]
    pub fn tail(&self) -> u32 {
        self.tail.load(Ordering::Acquire)
    }

    /// Attempts to advance the tail from `current` to `new`.
    ///
    /// The winning producer owns the region `[current, new)`.
    #[must_use]
    pub fn try_advance_tail(&self, current: u32, new: u32) -> bool {
        self.tail
            .compare_exchange(current, new, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
    }

    /// Attempts the CLEAN -> ACTIVE transition for `cycle`.
    ///
    /// This is the serialization point of rotation: exactly one
    /// producer wins. The acquire on success pairs with the release in
    /// [`Self::reclaim`], so the winner observes the wiped region.
    #[must_use]
    pub fn try_activate(&self, cycle: u32) -> bool {
        let won = self
            .status
            .compare_exchange(
                PartitionStatus::Clean as u8,
                PartitionStatus::Active as u8,
                Ordering::AcqRel,
                Ordering::Relaxed,
            )
            .is_ok();
        if won {
            self.cycle.store(cycle, Ordering::Release);
        }
        won
    }

    /// Marks an ACTIVE partition DIRTY after rotation moved past it.
    pub fn retire(&self) {
        self.status
            .store(PartitionStatus::Dirty as u8, Ordering::Release);
    }

    /// Resets the tail and marks the partition CLEAN.
    ///
    /// The caller must have wiped the data region first; the release
    /// store here is what publishes the wipe to the next activator.
    pub fn reclaim(&self) {
        self.tail.store(0, Ordering::Relaxed);
        self.status
            .store(PartitionStatus::Clean as u8, Ordering::Release);
    }
}
