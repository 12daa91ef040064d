//! Strongly-typed identifiers for Strand entities.
//!
//! Following `TigerStyle`: explicit types prevent bugs from mixing up IDs.

use std::fmt;

/// Opaque routing key carried in every message frame.
///
/// A stream id is not interpreted by the dispatcher. Producers stamp it
/// on a fragment and subscribers receive it back verbatim, so cooperating
/// components can multiplex several logical streams over one buffer. It
/// is a 32-bit signed value to match the frame header field it occupies.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct StreamId(i32);

impl StreamId {
    /// The default stream used when a producer does not specify one.
    pub const DEFAULT: Self = Self(0);

    /// Creates a new stream id from a raw i32 value.
    #[inline]
    #[must_use]
    pub const fn new(value: i32) -> Self {
        Self(value)
    }

    /// Returns the raw i32 value.
    #[inline]
    #[must_use]
    pub const fn get(self) -> i32 {
        self.0
    }
}

impl fmt::Debug for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stream({})", self.0)
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stream-{}", self.0)
    }
}

impl From<i32> for StreamId {
    fn from(value: i32) -> Self {
        Self::new(value)
    }
}

impl From<StreamId> for i32 {
    fn from(id: StreamId) -> Self {
        id.get()
    }
}

/// Unique identifier for a subscription within a dispatcher.
///
/// Assigned in registration order and never reused for the lifetime of
/// the dispatcher.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Creates a new subscription id from a raw u64 value.
    #[inline]
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw u64 value.
    #[inline]
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Returns the next id in sequence.
    ///
    /// # Panics
    /// Panics if the id would overflow.
    #[inline]
    #[must_use]
    pub const fn next(self) -> Self {
        assert!(self.0 < u64::MAX, "ID overflow");
        Self(self.0 + 1)
    }
}

impl fmt::Debug for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub({})", self.0)
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

impl From<u64> for SubscriptionId {
    fn from(value: u64) -> Self {
        Self::new(value)
    }
}

impl From<SubscriptionId> for u64 {
    fn from(id: SubscriptionId) -> Self {
        id.get()
    }
}
