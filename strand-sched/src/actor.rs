//! The actor contract.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

/// Outcome of one `run` slice of an actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Run the next slice immediately.
    Continue,
    /// Reschedule after other runnable tasks; the cooperative yield.
    Yield,
    /// The actor is finished; `on_close` runs next.
    Done,
}

/// A cooperatively scheduled task with lifecycle hooks.
///
/// The scheduler drives `on_start`, then `run` repeatedly until it
/// returns [`Step::Done`] or a stop is requested, then `on_close`.
/// Each `run` invocation is one execution slice; an actor that needs to
/// wait does so by awaiting inside `run` (a signal, a future, a reply),
/// never by blocking a thread.
#[async_trait]
pub trait Actor: Send + 'static {
    /// Called once before the first `run` slice.
    async fn on_start(&mut self, ctx: &ActorContext) {
        let _ = ctx;
    }

    /// One execution slice of the actor.
    async fn run(&mut self, ctx: &ActorContext) -> Step;

    /// Called once after the final `run` slice.
    async fn on_close(&mut self, ctx: &ActorContext) {
        let _ = ctx;
    }

    /// Name used in log fields.
    fn name(&self) -> &str {
        "actor"
    }
}

/// Per-task context handed to every hook invocation.
#[derive(Debug)]
pub struct ActorContext {
    name: String,
    stop: Arc<AtomicBool>,
}

impl ActorContext {
    pub(crate) fn new(name: String, stop: Arc<AtomicBool>) -> Self {
        Self { name, stop }
    }

    /// Returns the actor's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns true once a stop was requested through the task handle.
    ///
    /// Checked by the scheduler between `run` slices; an actor in a
    /// long sub-protocol may also poll it to wind down early.
    #[must_use]
    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }
}
