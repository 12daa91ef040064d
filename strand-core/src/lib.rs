//! Strand Core - Strongly-typed identifiers and byte accounting for Strand.
//!
//! This crate provides the types shared by every layer of the dispatcher:
//! stream and subscription identifiers, the packed log `Position`, byte
//! size parsing, and frame-alignment arithmetic. It has no dependencies
//! and no I/O.
//!
//! # Design Principles (TigerStyle)
//!
//! - **Strongly-typed IDs**: Prevent mixing up a StreamId with a SubscriptionId
//! - **Explicit limits**: Every resource has a bounded maximum
//! - **Explicit types**: Use u32/u64, not usize, for on-buffer quantities
//! - **No unsafe code**: Safety > Performance

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod byte_value;
mod error;
mod limits;
mod position;
mod types;

pub use byte_value::{align_up, is_aligned, ByteValue};
pub use error::{Error, Result};
pub use limits::Limits;
pub use position::Position;
pub use types::{StreamId, SubscriptionId};

/// Number of partitions a log buffer is divided into.
///
/// The value is structural: rotation, position arithmetic, and the
/// publisher limit all assume a three-way split.
pub const PARTITION_COUNT: u32 = 3;
