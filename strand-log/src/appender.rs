//! The log appender: space claims, commits, and partition rotation.
//!
//! Producers call [`LogAppender::claim`] to reserve an aligned region
//! of the active partition, fill it through the returned [`Claim`], and
//! publish it with [`Claim::commit`]. Concurrent claims serialize on a
//! CAS of the partition tail; losers reload and retry. The producer
//! that first finds the active partition too small for its claim pads
//! the remainder and rotates the log to the next partition, provided
//! that partition has been reclaimed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use strand_core::{Position, StreamId};

use crate::buffer::{LogBuffer, RotateOutcome};
use crate::error::{AppendError, AppendResult};
use crate::frame;

/// Allocates framed regions of the log buffer for producers.
#[derive(Debug)]
pub struct LogAppender {
    buffer: Arc<LogBuffer>,
    publisher_limit: Arc<AtomicU64>,
    frame_max_length: usize,
}

impl LogAppender {
    /// Creates an appender over `buffer`.
    ///
    /// `publisher_limit` holds the packed [`Position`] past which no
    /// claim may extend; the conductor refreshes it as subscriptions
    /// advance. `frame_max_length` bounds a single payload.
    ///
    /// # Panics
    /// Panics if a maximum-size frame would not fit a partition.
    #[must_use]
    pub fn new(
        buffer: Arc<LogBuffer>,
        publisher_limit: Arc<AtomicU64>,
        frame_max_length: usize,
    ) -> Self {
        let max_aligned = frame::aligned_frame_length(frame::frame_length(frame_max_length));
        assert!(
            max_aligned <= buffer.partition_size() as usize,
            "frame_max_length exceeds partition size"
        );
        Self {
            buffer,
            publisher_limit,
            frame_max_length,
        }
    }

    /// Returns the maximum payload length of a single claim.
    #[must_use]
    pub const fn frame_max_length(&self) -> usize {
        self.frame_max_length
    }

    /// Returns the position of the next claimable byte.
    #[must_use]
    pub fn position(&self) -> Position {
        self.buffer.append_position()
    }

    /// Returns the current publisher limit.
    #[must_use]
    pub fn publisher_limit(&self) -> Position {
        Position::from_raw(self.publisher_limit.load(Ordering::Acquire))
    }

    /// Claims an aligned region for a payload of `length` bytes.
    ///
    /// On success the region is reserved and hidden behind a negative
    /// length word until the claim is committed or aborted.
    ///
    /// # Errors
    /// - [`AppendError::InvalidLength`] if `length` is zero or exceeds
    ///   the maximum frame length.
    /// - [`AppendError::Full`] if the claim would overtake the slowest
    ///   subscription or the next partition is not yet reclaimed.
    pub fn claim(&self, length: usize, stream_id: StreamId) -> AppendResult<Claim> {
        if length == 0 || length > self.frame_max_length {
            return Err(AppendError::InvalidLength {
                length,
                max: self.frame_max_length,
            });
        }

        let frame_length = frame::frame_length(length);
        let aligned = frame::aligned_frame_length(frame_length);
        let aligned_u32 = u32::try_from(aligned).expect("aligned length fits u32");
        let partition_size = self.buffer.partition_size();

        loop {
            let cycle = self.buffer.active_cycle();
            let partition = self.buffer.partition(cycle);
            if partition.cycle() != cycle {
                // Stale snapshot: the ring rotated clean through this
                // slot between the two loads. Reload and retry.
                continue;
            }

            let tail = partition.tail();
            let remaining = partition_size - tail;

            if aligned_u32 <= remaining {
                let end =
                    Position::new(cycle, tail).add_bytes(u64::from(aligned_u32), partition_size);
                if end > self.publisher_limit() {
                    return Err(AppendError::Full);
                }
                if partition.try_advance_tail(tail, tail + aligned_u32) {
                    let frame_offset = self.buffer.partition_base(cycle) + tail as usize;
                    frame::write_claimed_header(
                        self.buffer.data(),
                        frame_offset,
                        frame_length,
                        stream_id,
                    );
                    return Ok(Claim {
                        buffer: Arc::clone(&self.buffer),
                        frame_offset,
                        frame_length,
                        payload_length: length,
                        position: end,
                        resolved: false,
                    });
                }
                continue;
            }

            // The claim does not fit the active partition. Whoever wins
            // the remainder pads it out; everyone then races to rotate.
            if remaining > 0 {
                if partition.try_advance_tail(tail, partition_size) {
                    let pad_offset = self.buffer.partition_base(cycle) + tail as usize;
                    frame::write_padding(self.buffer.data(), pad_offset, remaining as usize);
                }
                continue;
            }

            match self.buffer.try_rotate(cycle) {
                RotateOutcome::Rotated | RotateOutcome::AlreadyRotated => {}
                RotateOutcome::NextNotClean => return Err(AppendError::Full),
            }
        }
    }

    /// Claims, copies, and commits `payload` in one call.
    ///
    /// Returns the position a subscription must reach to have observed
    /// the fragment.
    ///
    /// # Errors
    /// Same conditions as [`Self::claim`].
    pub fn append(&self, payload: &[u8], stream_id: StreamId) -> AppendResult<Position> {
        let mut claim = self.claim(payload.len(), stream_id)?;
        claim.write_bytes(0, payload);
        Ok(claim.commit())
    }
}

/// An exclusive reservation of a framed region of the log.
///
/// The claim must be committed or aborted on every exit path; dropping
/// an unresolved claim aborts it, which publishes a FAILED frame of the
/// claimed size so subscribers can skip it without losing alignment.
#[derive(Debug)]
pub struct Claim {
    buffer: Arc<LogBuffer>,
    frame_offset: usize,
    frame_length: usize,
    payload_length: usize,
    position: Position,
    resolved: bool,
}

impl Claim {
    /// Returns the position a successful commit publishes.
    #[must_use]
    pub const fn position(&self) -> Position {
        self.position
    }

    /// Returns the claimed payload length in bytes.
    #[must_use]
    pub const fn payload_length(&self) -> usize {
        self.payload_length
    }

    /// Copies `src` into the claimed payload at `offset`.
    ///
    /// # Panics
    /// Panics if the write extends past the claimed payload.
    pub fn write_bytes(&mut self, offset: usize, src: &[u8]) {
        assert!(
            offset + src.len() <= self.payload_length,
            "write outside claimed payload"
        );
        self.buffer
            .data()
            .put_bytes(self.frame_offset + frame::HEADER_LENGTH + offset, src);
    }

    /// Writes a little-endian u32 into the claimed payload at `offset`.
    ///
    /// # Panics
    /// Panics if the write extends past the claimed payload.
    pub fn put_u32(&mut self, offset: usize, value: u32) {
        self.write_bytes(offset, &value.to_le_bytes());
    }

    /// Publishes the claimed frame.
    pub fn commit(mut self) -> Position {
        self.resolved = true;
        frame::commit_frame(self.buffer.data(), self.frame_offset, self.frame_length);
        self.position
    }

    /// Marks the frame FAILED and publishes it.
    ///
    /// Subscribers observe the frame with its FAILED flag set and can
    /// skip it; neighboring frames are unaffected.
    pub fn abort(mut self) -> Position {
        self.resolved = true;
        Self::publish_failed(&self.buffer, self.frame_offset, self.frame_length);
        self.position
    }

    fn publish_failed(buffer: &LogBuffer, frame_offset: usize, frame_length: usize) {
        frame::mark_frame_failed(buffer.data(), frame_offset);
        frame::commit_frame(buffer.data(), frame_offset, frame_length);
    }
}

impl Drop for Claim {
    fn drop(&mut self) {
        if !self.resolved {
            Self::publish_failed(&self.buffer, self.frame_offset, self.frame_length);
        }
    }
}
