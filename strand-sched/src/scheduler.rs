//! The actor scheduler.
//!
//! A fixed-size worker pool that runs non-blocking actors in short
//! slices. Each submitted actor is driven on the pool: `on_start`, then
//! `run` until it reports [`Step::Done`] or its handle requests a stop,
//! then `on_close`. Continuation order within one actor is preserved;
//! a [`Step::Yield`] reschedules the actor after other runnable tasks
//! without blocking a worker thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Runtime;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::actor::{Actor, ActorContext, Step};
use crate::error::SchedError;

/// Configuration for the scheduler's worker pool.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Number of worker threads in the pool.
    pub worker_threads: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { worker_threads: 3 }
    }
}

impl SchedulerConfig {
    /// Creates a config with the given worker count.
    #[must_use]
    pub const fn new(worker_threads: usize) -> Self {
        Self { worker_threads }
    }

    /// Validates the configuration.
    ///
    /// # Errors
    /// Returns an error if the worker count is zero.
    pub const fn validate(&self) -> Result<(), SchedError> {
        if self.worker_threads == 0 {
            return Err(SchedError::InvalidConfig {
                reason: "worker_threads must be positive",
            });
        }
        Ok(())
    }
}

/// Owns the worker pool and drives submitted actors.
#[derive(Debug)]
pub struct ActorScheduler {
    runtime: Runtime,
}

impl ActorScheduler {
    /// Starts a scheduler with the given worker pool size.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid or the pool
    /// fails to start.
    pub fn new(config: SchedulerConfig) -> Result<Self, SchedError> {
        config.validate()?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(config.worker_threads)
            .thread_name("strand-sched")
            .enable_time()
            .build()
            .map_err(|e| SchedError::Runtime {
                message: e.to_string(),
            })?;

        Ok(Self { runtime })
    }

    /// Returns a cloneable handle for submitting actors.
    #[must_use]
    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            inner: self.runtime.handle().clone(),
        }
    }

    /// Submits an actor to the pool.
    pub fn submit<A: Actor>(&self, actor: A) -> TaskHandle {
        self.handle().submit(actor)
    }

    /// Shuts the pool down, giving in-flight actors a grace period.
    pub fn shutdown(self) {
        self.runtime.shutdown_timeout(Duration::from_secs(5));
    }
}

/// Cloneable submission handle to a running scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    inner: tokio::runtime::Handle,
}

impl SchedulerHandle {
    /// Submits an actor to the pool.
    pub fn submit<A: Actor>(&self, actor: A) -> TaskHandle {
        let stop = Arc::new(AtomicBool::new(false));
        let ctx = ActorContext::new(actor.name().to_string(), Arc::clone(&stop));
        let join = self.inner.spawn(drive(actor, ctx));
        TaskHandle { join, stop }
    }
}

/// Handle to one submitted actor.
#[derive(Debug)]
pub struct TaskHandle {
    join: JoinHandle<()>,
    stop: Arc<AtomicBool>,
}

impl TaskHandle {
    /// Requests a cooperative stop.
    ///
    /// Observed between `run` slices; an actor parked inside `run`
    /// finishes its current await first.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    /// Returns true once the actor has fully stopped.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

async fn drive<A: Actor>(mut actor: A, ctx: ActorContext) {
    debug!(actor = ctx.name(), "actor started");
    actor.on_start(&ctx).await;

    while !ctx.stop_requested() {
        match actor.run(&ctx).await {
            Step::Continue => {}
            Step::Yield => tokio::task::yield_now().await,
            Step::Done => break,
        }
    }

    actor.on_close(&ctx).await;
    debug!(actor = ctx.name(), "actor stopped");
}
