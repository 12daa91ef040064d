//! Dispatcher configuration.

use strand_core::{ByteValue, Error, Limits, Result, PARTITION_COUNT};
use strand_log::frame;

/// How frames become visible to the registered subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchMode {
    /// Every subscription sees every frame, each at its own pace.
    #[default]
    Independent,
    /// Subscriptions form an ordered chain declared at construction; a
    /// frame becomes visible to subscription `k` only after
    /// subscription `k - 1` consumed it.
    Pipeline,
}

/// Configuration for a dispatcher instance.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Requested total buffer size; the derived capacity rounds each
    /// partition up to a power of two.
    pub buffer_size: ByteValue,
    /// Subscriptions registered at construction, in pipeline order.
    pub subscription_names: Vec<String>,
    /// Frame visibility mode.
    pub mode: DispatchMode,
    /// Maximum payload length of a single fragment. Defaults to
    /// `partition_size / frame_max_length_divisor`.
    pub frame_max_length: Option<usize>,
    /// Resource limits.
    pub limits: Limits,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            buffer_size: ByteValue::mebibytes(1),
            subscription_names: Vec::new(),
            mode: DispatchMode::default(),
            frame_max_length: None,
            limits: Limits::default(),
        }
    }
}

impl DispatcherConfig {
    /// Sets the requested buffer size.
    #[must_use]
    pub const fn with_buffer_size(mut self, size: ByteValue) -> Self {
        self.buffer_size = size;
        self
    }

    /// Adds a subscription registered at construction.
    #[must_use]
    pub fn with_subscription(mut self, name: impl Into<String>) -> Self {
        self.subscription_names.push(name.into());
        self
    }

    /// Sets the frame visibility mode.
    #[must_use]
    pub const fn with_mode(mut self, mode: DispatchMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets an explicit maximum fragment payload length.
    #[must_use]
    pub const fn with_frame_max_length(mut self, length: usize) -> Self {
        self.frame_max_length = Some(length);
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    /// Returns an error on inconsistent limits, duplicate subscription
    /// names, or a pipeline with no declared subscriptions.
    pub fn validate(&self) -> Result<()> {
        self.limits.validate()?;

        let mut names: Vec<&str> = self
            .subscription_names
            .iter()
            .map(String::as_str)
            .collect();
        names.sort_unstable();
        names.dedup();
        if names.len() != self.subscription_names.len() {
            return Err(Error::InvalidArgument {
                name: "subscription_names",
                reason: "must be unique",
            });
        }

        if self.subscription_names.len() > self.limits.subscriptions_max as usize {
            return Err(Error::LimitExceeded {
                limit: "subscriptions_max",
                max: u64::from(self.limits.subscriptions_max),
                actual: self.subscription_names.len() as u64,
            });
        }

        if self.mode == DispatchMode::Pipeline && self.subscription_names.is_empty() {
            return Err(Error::InvalidArgument {
                name: "subscription_names",
                reason: "pipeline mode requires at least one subscription",
            });
        }

        let _ = self.derive_partition_size()?;
        Ok(())
    }

    /// Derives the per-partition size from the requested buffer size.
    ///
    /// The requested size is split three ways and each partition is
    /// rounded up to the next power of two, so the effective capacity
    /// is at least the requested size.
    ///
    /// # Errors
    /// Returns an error if the derived size falls outside the limits.
    pub fn derive_partition_size(&self) -> Result<u32> {
        let requested = self.buffer_size.get();
        let min_total =
            u64::from(self.limits.partition_size_bytes_min) * u64::from(PARTITION_COUNT);
        if requested < min_total {
            return Err(Error::LimitExceeded {
                limit: "buffer_size minimum",
                max: min_total,
                actual: requested,
            });
        }

        let per_partition = requested.div_ceil(u64::from(PARTITION_COUNT));
        let rounded = per_partition.next_power_of_two();
        if rounded > u64::from(self.limits.partition_size_bytes_max) {
            return Err(Error::LimitExceeded {
                limit: "partition_size_bytes_max",
                max: u64::from(self.limits.partition_size_bytes_max),
                actual: rounded,
            });
        }

        #[allow(clippy::cast_possible_truncation)] // Bounded by the limit check.
        let partition_size = rounded as u32;
        Ok(partition_size)
    }

    /// Returns the effective maximum payload length for the given
    /// partition size.
    ///
    /// # Errors
    /// Returns an error if an explicit value leaves no room for the
    /// frame header or exceeds what a partition can hold.
    pub fn effective_frame_max_length(&self, partition_size: u32) -> Result<usize> {
        let default_max = partition_size as usize / self.limits.frame_max_length_divisor as usize;
        let max = self.frame_max_length.unwrap_or(default_max);

        if max == 0 {
            return Err(Error::InvalidArgument {
                name: "frame_max_length",
                reason: "must be positive",
            });
        }
        let aligned = frame::aligned_frame_length(frame::frame_length(max));
        if aligned > partition_size as usize {
            return Err(Error::LimitExceeded {
                limit: "frame_max_length",
                max: u64::from(partition_size),
                actual: aligned as u64,
            });
        }
        Ok(max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(DispatcherConfig::default().validate().is_ok());
    }

    #[test]
    fn test_duplicate_subscription_names_rejected() {
        let config = DispatcherConfig::default()
            .with_subscription("a")
            .with_subscription("a");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_pipeline_requires_subscriptions() {
        let config = DispatcherConfig::default().with_mode(DispatchMode::Pipeline);
        assert!(config.validate().is_err());

        let config = DispatcherConfig::default()
            .with_mode(DispatchMode::Pipeline)
            .with_subscription("stage-1");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partition_size_rounds_up_to_power_of_two() {
        let config = DispatcherConfig::default().with_buffer_size(ByteValue::mebibytes(10));
        // 10 MiB / 3 rounds up to 4 MiB per partition.
        assert_eq!(config.derive_partition_size().unwrap(), 4 * 1024 * 1024);
    }

    #[test]
    fn test_tiny_buffer_rejected() {
        let config = DispatcherConfig::default().with_buffer_size(ByteValue::bytes(1024));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_frame_max_is_a_partition_fraction() {
        let config = DispatcherConfig::default();
        let max = config.effective_frame_max_length(4096).unwrap();
        assert_eq!(max, 256);
    }

    #[test]
    fn test_oversized_frame_max_rejected() {
        let config = DispatcherConfig::default().with_frame_max_length(8192);
        assert!(config.effective_frame_max_length(4096).is_err());
        assert!(config.effective_frame_max_length(16384).is_ok());
    }
}
