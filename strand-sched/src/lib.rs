//! Strand Sched - the cooperative actor contract the dispatcher runs on.
//!
//! The dispatcher needs four things from its scheduler: task submission
//! with lifecycle hooks, a cooperative yield, completion-triggered
//! callbacks, and a coalesced consumer signal. This crate provides
//! exactly that surface over a small multi-threaded worker pool:
//!
//! - [`Actor`]: lifecycle hooks `on_start`/`on_close` around a
//!   re-entrant `run` continuation that reports a [`Step`] per slice.
//! - [`ActorScheduler`]: owns the worker pool and drives submitted
//!   actors until they finish.
//! - [`ActorFuture`]: a single-shot completable future; awaiting it
//!   inside an actor hook is the completion callback firing in the
//!   task's own execution context.
//! - [`DataSignal`]: an edge-triggered wake-up that coalesces to at
//!   most one pending permit.
//!
//! No operation blocks a worker thread. Long protocols are expressed as
//! actors that return [`Step::Continue`] or [`Step::Yield`] until the
//! sub-protocol completes.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod actor;
mod error;
mod future;
mod scheduler;
mod signal;

pub use actor::{Actor, ActorContext, Step};
pub use error::SchedError;
pub use future::{ActorFuture, FutureCompleter, FutureError};
pub use scheduler::{ActorScheduler, SchedulerConfig, SchedulerHandle, TaskHandle};
pub use signal::DataSignal;
