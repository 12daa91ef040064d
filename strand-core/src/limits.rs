//! System limits and configuration bounds.
//!
//! Following TigerStyle: put limits on everything. Every buffer and
//! registry in the dispatcher has an explicit maximum size, which keeps
//! capacity planning predictable and failure modes bounded.

/// System-wide limits for a dispatcher instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Minimum size of a single log partition in bytes.
    pub partition_size_bytes_min: u32,
    /// Maximum size of a single log partition in bytes.
    pub partition_size_bytes_max: u32,
    /// Maximum number of concurrently registered subscriptions.
    pub subscriptions_max: u32,
    /// Divisor applied to the partition size to derive the default
    /// maximum frame length.
    pub frame_max_length_divisor: u32,
}

impl Limits {
    /// Creates limits with safe defaults.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            // Partitions: 4 KiB floor keeps padding overhead negligible,
            // 1 GiB ceiling keeps offsets comfortably inside i32 frame
            // lengths.
            partition_size_bytes_min: 4 * 1024,
            partition_size_bytes_max: 1024 * 1024 * 1024,

            // Registry: 64 subscriptions, far beyond any observed use.
            subscriptions_max: 64,

            // Frames: a single fragment may occupy at most 1/16th of a
            // partition, so a partition always holds a useful number of
            // frames between rotations.
            frame_max_length_divisor: 16,
        }
    }

    /// Validates that all limits are internally consistent.
    ///
    /// # Errors
    /// Returns an error if any limits are invalid or inconsistent.
    pub fn validate(&self) -> crate::Result<()> {
        if self.partition_size_bytes_min == 0 {
            return Err(crate::Error::InvalidArgument {
                name: "partition_size_bytes_min",
                reason: "must be positive",
            });
        }

        if !self.partition_size_bytes_min.is_power_of_two() {
            return Err(crate::Error::InvalidArgument {
                name: "partition_size_bytes_min",
                reason: "must be a power of two",
            });
        }

        if self.partition_size_bytes_max < self.partition_size_bytes_min {
            return Err(crate::Error::InvalidArgument {
                name: "partition_size_bytes_max",
                reason: "must be >= partition_size_bytes_min",
            });
        }

        if self.subscriptions_max == 0 {
            return Err(crate::Error::InvalidArgument {
                name: "subscriptions_max",
                reason: "must be positive",
            });
        }

        if !self.frame_max_length_divisor.is_power_of_two() {
            return Err(crate::Error::InvalidArgument {
                name: "frame_max_length_divisor",
                reason: "must be a power of two",
            });
        }

        Ok(())
    }
}

impl Default for Limits {
    fn default() -> Self {
        Self::new()
    }
}
