//! Strand Log - the partitioned in-memory fragment log.
//!
//! This crate provides the data plane of the dispatcher: a fixed-size
//! byte region split into three equal partitions used in rotation,
//! framed fragments with an atomic claim/commit publication protocol,
//! and the appender that allocates space for concurrent producers.
//!
//! # Design
//!
//! The log is append-only within a partition. Producers claim an
//! aligned region with a CAS on the partition tail, fill it, and
//! publish it by flipping the frame's length word positive with a
//! release store. Subscribers observe frames with an acquire load of
//! the same word, so a positive length implies a fully visible payload.
//! When a partition fills up, the producer that first hits the end pads
//! the remainder and rotates to the next partition, provided every
//! subscriber has drained it and the conductor has wiped it clean.
//!
//! # `TigerStyle` Principles
//!
//! - Explicit limits on frame and partition sizes
//! - All shared state in plain atomics with documented orderings
//! - No unsafe code

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod appender;
mod atomic_buffer;
mod buffer;
mod error;
pub mod frame;
mod partition;

pub use appender::{Claim, LogAppender};
pub use atomic_buffer::AtomicBuffer;
pub use buffer::{LogBuffer, RotateOutcome};
pub use error::{AppendError, AppendResult};
pub use partition::{PartitionState, PartitionStatus};
