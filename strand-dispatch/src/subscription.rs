//! Per-consumer subscriptions.
//!
//! A subscription owns an atomic cursor into the log buffer and two
//! consumption modes: [`Subscription::poll`] delivers committed frames
//! to a [`FragmentHandler`] one at a time, and
//! [`Subscription::peek_block`] arms a [`BlockPeek`] with a contiguous
//! committed window that the consumer drains at its own pace.
//!
//! The cursor only moves forward. In independent mode its visibility
//! bound is the appender's committed tail; in pipeline mode it is the
//! predecessor subscription's cursor, so a frame reaches stage `k` only
//! after stage `k - 1` consumed it.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use strand_core::{Position, StreamId, SubscriptionId};
use strand_log::{frame, LogBuffer};
use strand_sched::DataSignal;
use tracing::warn;

use crate::peek::{BlockPeek, PeekFrame, PeekTarget};

/// Verdict a handler returns for one delivered fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentOutcome {
    /// The fragment was consumed; advance past it.
    Consume,
    /// Stop polling immediately and leave the cursor on this fragment;
    /// it is redelivered on the next poll.
    Postpone,
    /// Processing failed. The cursor advances; in pipeline mode the
    /// frame is marked FAILED so downstream stages observe the failure.
    Fail,
}

/// Receives fragments from [`Subscription::poll`].
///
/// The payload slice is only valid for the duration of the call; a
/// handler must not retain it.
pub trait FragmentHandler {
    /// Handles one fragment.
    fn on_fragment(&mut self, payload: &[u8], stream_id: StreamId, is_failed: bool)
        -> FragmentOutcome;
}

impl<F> FragmentHandler for F
where
    F: FnMut(&[u8], StreamId, bool) -> FragmentOutcome,
{
    fn on_fragment(
        &mut self,
        payload: &[u8],
        stream_id: StreamId,
        is_failed: bool,
    ) -> FragmentOutcome {
        self(payload, stream_id, is_failed)
    }
}

/// A registered consumer's cursor into the log.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    name: String,
    position: Arc<AtomicU64>,
    buffer: Arc<LogBuffer>,
    signal: DataSignal,
    consumed: DataSignal,
    predecessor: Option<Arc<Subscription>>,
    propagate_failure: bool,
}

impl Subscription {
    pub(crate) fn new(
        id: SubscriptionId,
        name: String,
        start: Position,
        buffer: Arc<LogBuffer>,
        consumed: DataSignal,
        predecessor: Option<Arc<Subscription>>,
        propagate_failure: bool,
    ) -> Self {
        Self {
            id,
            name,
            position: Arc::new(AtomicU64::new(start.raw())),
            buffer,
            signal: DataSignal::new(),
            consumed,
            predecessor,
            propagate_failure,
        }
    }

    /// Returns the subscription's id.
    #[must_use]
    pub const fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Returns the subscription's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the current cursor position.
    #[must_use]
    pub fn position(&self) -> Position {
        Position::from_raw(self.position.load(Ordering::Acquire))
    }

    /// Returns the data signal raised on every commit.
    ///
    /// Consuming actors await [`DataSignal::ready`] between poll
    /// slices; the signal coalesces to a single pending wake-up.
    #[must_use]
    pub const fn signal(&self) -> &DataSignal {
        &self.signal
    }

    /// Returns how many bytes of committed data are ahead of the
    /// cursor, in the worst case spanning partition boundaries.
    #[must_use]
    pub fn lag_bytes(&self) -> u64 {
        let partition_size = u64::from(self.buffer.partition_size());
        let bound = self.visibility_limit();
        let pos = self.position();
        if bound <= pos {
            return 0;
        }
        let bound_linear = u64::from(bound.cycle()) * partition_size + u64::from(bound.offset());
        let pos_linear = u64::from(pos.cycle()) * partition_size + u64::from(pos.offset());
        bound_linear - pos_linear
    }

    /// Delivers up to `limit` committed fragments to `handler`.
    ///
    /// Returns the number of fragments handled (consumed or failed).
    /// Padding frames advance the cursor without being delivered. A
    /// panicking handler does not unwind into the caller: the fragment
    /// is marked FAILED and polling continues.
    pub fn poll<H: FragmentHandler>(&self, handler: &mut H, limit: usize) -> usize {
        let partition_size = self.buffer.partition_size();
        let data = self.buffer.data();
        let bound = self.visibility_limit();
        let start = self.position();

        let mut pos = start;
        let mut handled = 0usize;
        let mut scratch = Vec::new();

        while handled < limit && pos < bound {
            let frame_offset = self.buffer.partition_base(pos.cycle()) + pos.offset() as usize;
            let length = frame::frame_length_volatile(data, frame_offset);
            if length <= 0 {
                break;
            }
            #[allow(clippy::cast_sign_loss)] // Positive by the check above.
            let length = length as usize;
            let aligned = frame::aligned_frame_length(length);

            if frame::frame_type(data, frame_offset) == frame::TYPE_PADDING {
                pos = pos.add_bytes(aligned as u64, partition_size);
                continue;
            }

            let payload_length = frame::payload_length(length);
            scratch.resize(payload_length, 0);
            data.get_bytes(frame_offset + frame::HEADER_LENGTH, &mut scratch);
            let stream_id = frame::frame_stream_id(data, frame_offset);
            let is_failed = frame::frame_flags(data, frame_offset) & frame::FLAG_FAILED != 0;

            let outcome = catch_unwind(AssertUnwindSafe(|| {
                handler.on_fragment(&scratch, stream_id, is_failed)
            }))
            .unwrap_or_else(|_| {
                warn!(
                    subscription = %self.name,
                    position = %pos,
                    "fragment handler panicked; marking frame failed"
                );
                frame::mark_frame_failed(data, frame_offset);
                FragmentOutcome::Consume
            });

            match outcome {
                FragmentOutcome::Consume => {
                    pos = pos.add_bytes(aligned as u64, partition_size);
                    handled += 1;
                }
                FragmentOutcome::Postpone => break,
                FragmentOutcome::Fail => {
                    if self.propagate_failure {
                        frame::mark_frame_failed(data, frame_offset);
                    }
                    pos = pos.add_bytes(aligned as u64, partition_size);
                    handled += 1;
                }
            }
        }

        if pos > start {
            self.position.store(pos.raw(), Ordering::Release);
            self.consumed.raise();
        }
        handled
    }

    /// Arms `peek` with a contiguous committed window and returns its
    /// size in bytes.
    ///
    /// The window never crosses a partition boundary. Leading padding
    /// is consumed first (advancing the cursor to the next partition
    /// head) when `allow_rotation` is true; otherwise a window that
    /// would start on padding comes back empty. The cursor itself only
    /// advances when the consumer marks the peek completed or failed;
    /// an unmarked peek is repeatable.
    pub fn peek_block(
        &self,
        peek: &mut BlockPeek,
        max_bytes: usize,
        allow_rotation: bool,
    ) -> usize {
        let partition_size = self.buffer.partition_size();
        let data = self.buffer.data();
        let bound = self.visibility_limit();
        let mut pos = self.position();

        // Skip over padding at the cursor, rotating into the next
        // partition if the caller allows it.
        loop {
            if pos >= bound {
                peek.clear();
                return 0;
            }
            let frame_offset = self.buffer.partition_base(pos.cycle()) + pos.offset() as usize;
            let length = frame::frame_length_volatile(data, frame_offset);
            if length <= 0 {
                peek.clear();
                return 0;
            }
            #[allow(clippy::cast_sign_loss)]
            let aligned = frame::aligned_frame_length(length as usize);
            if frame::frame_type(data, frame_offset) == frame::TYPE_PADDING {
                if !allow_rotation {
                    peek.clear();
                    return 0;
                }
                pos = pos.add_bytes(aligned as u64, partition_size);
                self.position.store(pos.raw(), Ordering::Release);
                self.consumed.raise();
                continue;
            }
            break;
        }

        // Collect committed message frames within this partition.
        let start = pos;
        let base = self.buffer.partition_base(start.cycle());
        let mut end = pos;
        let mut frames = Vec::new();
        let mut frame_offsets = Vec::new();
        let mut window_bytes = 0usize;

        while end < bound && end.cycle() == start.cycle() {
            let frame_offset = base + end.offset() as usize;
            let length = frame::frame_length_volatile(data, frame_offset);
            if length <= 0 {
                break;
            }
            #[allow(clippy::cast_sign_loss)]
            let length = length as usize;
            if frame::frame_type(data, frame_offset) == frame::TYPE_PADDING {
                break;
            }
            let aligned = frame::aligned_frame_length(length);
            if window_bytes + aligned > max_bytes {
                break;
            }

            frames.push(PeekFrame {
                rel_offset: window_bytes,
                length,
                stream_id: frame::frame_stream_id(data, frame_offset),
                is_failed: frame::frame_flags(data, frame_offset) & frame::FLAG_FAILED != 0,
            });
            frame_offsets.push(frame_offset);
            window_bytes += aligned;
            end = end.add_bytes(aligned as u64, partition_size);
        }

        if window_bytes == 0 {
            peek.clear();
            return 0;
        }

        let window_start = base + start.offset() as usize;
        peek.arm(
            data,
            window_start,
            window_bytes,
            frames,
            frame_offsets,
            end,
            PeekTarget::new(
                Arc::clone(&self.position),
                self.consumed.clone(),
                Arc::clone(&self.buffer),
            ),
        );
        window_bytes
    }

    fn visibility_limit(&self) -> Position {
        self.predecessor
            .as_ref()
            .map_or_else(|| self.buffer.append_position(), |pred| pred.position())
    }
}
