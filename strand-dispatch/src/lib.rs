//! Strand Dispatch - the multi-producer, multi-subscriber fragment
//! dispatcher.
//!
//! A dispatcher owns a fixed-capacity partitioned log buffer and
//! orchestrates the flow between producers and subscriptions:
//!
//! - Producers call [`Dispatcher::offer`] for fire-and-forget payloads
//!   or [`Dispatcher::claim`] to write payloads in place and commit.
//! - Subscriptions consume committed fragments via
//!   [`Subscription::poll`] (per-fragment callbacks) or
//!   [`Subscription::peek_block`] (bulk windows drained at the
//!   consumer's pace).
//! - A conductor actor serves the async lifecycle (open/close
//!   subscriptions, shutdown draining), recomputes the publisher limit
//!   as consumers advance, and reclaims drained partitions.
//!
//! Back-pressure is a bounded buffer: once producers are a full buffer
//! ahead of the slowest subscription, offers fail with
//! [`OfferError::Full`] until consumers catch up. State is volatile;
//! nothing survives the dispatcher.
//!
//! # Example
//!
//! ```ignore
//! use strand_core::ByteValue;
//! use strand_dispatch::{Dispatcher, FragmentOutcome};
//! use strand_sched::{ActorScheduler, SchedulerConfig};
//!
//! let scheduler = ActorScheduler::new(SchedulerConfig::default())?;
//! let dispatcher = Dispatcher::builder("default")
//!     .scheduler(scheduler.handle())
//!     .buffer_size(ByteValue::mebibytes(10))
//!     .build()?;
//!
//! let subscription = dispatcher.open_subscription_async("consumer").join()??;
//! dispatcher.offer(b"fragment")?;
//! subscription.poll(
//!     &mut |payload: &[u8], _stream, _failed| {
//!         println!("{} bytes", payload.len());
//!         FragmentOutcome::Consume
//!     },
//!     usize::MAX,
//! );
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod builder;
mod conductor;
mod config;
mod dispatcher;
mod error;
mod peek;
mod subscription;

pub use builder::DispatcherBuilder;
pub use config::{DispatchMode, DispatcherConfig};
pub use dispatcher::{ClaimedFragment, Dispatcher};
pub use error::{DispatchError, OfferError};
pub use peek::{BlockPeek, PeekedFragment};
pub use subscription::{FragmentHandler, FragmentOutcome, Subscription};
