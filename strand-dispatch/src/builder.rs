//! Dispatcher construction.

use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use strand_core::{ByteValue, Position, SubscriptionId};
use strand_log::{LogAppender, LogBuffer};
use strand_sched::SchedulerHandle;
use tokio::sync::mpsc;
use tracing::info;

use crate::conductor::Conductor;
use crate::config::{DispatchMode, DispatcherConfig};
use crate::dispatcher::{Dispatcher, DispatcherShared};
use crate::error::DispatchError;
use crate::subscription::Subscription;

/// Builds a [`Dispatcher`]: validates the configuration, allocates the
/// log buffer, pre-registers declared subscriptions, and spawns the
/// conductor on the scheduler.
#[derive(Debug)]
pub struct DispatcherBuilder {
    name: String,
    config: DispatcherConfig,
    scheduler: Option<SchedulerHandle>,
}

impl DispatcherBuilder {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: DispatcherConfig::default(),
            scheduler: None,
        }
    }

    /// Sets the scheduler the conductor runs on. Required.
    #[must_use]
    pub fn scheduler(mut self, handle: SchedulerHandle) -> Self {
        self.scheduler = Some(handle);
        self
    }

    /// Sets the requested buffer size.
    #[must_use]
    pub fn buffer_size(mut self, size: ByteValue) -> Self {
        self.config = self.config.with_buffer_size(size);
        self
    }

    /// Sets the frame visibility mode.
    #[must_use]
    pub fn mode(mut self, mode: DispatchMode) -> Self {
        self.config = self.config.with_mode(mode);
        self
    }

    /// Declares a subscription registered at construction. In pipeline
    /// mode the declaration order is the chain order.
    #[must_use]
    pub fn subscription(mut self, name: impl Into<String>) -> Self {
        self.config = self.config.with_subscription(name);
        self
    }

    /// Sets an explicit maximum fragment payload length.
    #[must_use]
    pub fn frame_max_length(mut self, length: usize) -> Self {
        self.config = self.config.with_frame_max_length(length);
        self
    }

    /// Replaces the whole configuration record.
    #[must_use]
    pub fn config(mut self, config: DispatcherConfig) -> Self {
        self.config = config;
        self
    }

    /// Validates the configuration and starts the dispatcher.
    ///
    /// # Errors
    /// Returns an error if no scheduler was provided or the
    /// configuration is invalid.
    pub fn build(self) -> Result<Arc<Dispatcher>, DispatchError> {
        let scheduler = self.scheduler.ok_or(DispatchError::MissingScheduler)?;
        self.config.validate()?;

        let partition_size = self.config.derive_partition_size()?;
        let frame_max_length = self.config.effective_frame_max_length(partition_size)?;

        let buffer = Arc::new(LogBuffer::new(partition_size, &self.config.limits)?);
        // Initial limit: the whole buffer, three partitions ahead of
        // the consumers starting at position zero.
        let publisher_limit = Arc::new(AtomicU64::new(Position::new(3, 0).raw()));
        let appender = LogAppender::new(
            Arc::clone(&buffer),
            Arc::clone(&publisher_limit),
            frame_max_length,
        );

        let shared = Arc::new(DispatcherShared::new(
            self.name.clone(),
            buffer,
            appender,
            publisher_limit,
            self.config.mode,
            self.config.limits,
        ));

        // Declared subscriptions start at the buffer head, chained in
        // declaration order when running as a pipeline.
        let pipeline = self.config.mode == DispatchMode::Pipeline;
        let mut next_id = SubscriptionId::new(0);
        let mut predecessor: Option<Arc<Subscription>> = None;
        for name in &self.config.subscription_names {
            let chained = if pipeline { predecessor.take() } else { None };
            let subscription = shared.register_subscription(
                next_id,
                name.clone(),
                Position::ZERO,
                chained,
                pipeline,
            );
            predecessor = Some(subscription);
            next_id = next_id.next();
        }

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        scheduler.submit(Conductor::new(
            Arc::clone(&shared),
            commands_rx,
            next_id,
            self.config.subscription_names.clone(),
        ));

        info!(
            dispatcher = %self.name,
            buffer_size = %self.config.buffer_size,
            partition_size,
            frame_max_length,
            mode = ?self.config.mode,
            "dispatcher started"
        );

        Ok(Arc::new(Dispatcher::new(shared, commands_tx)))
    }
}
