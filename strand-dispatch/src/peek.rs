//! Block peeks: bulk consumption without per-fragment callbacks.
//!
//! A [`BlockPeek`] is armed by [`Subscription::peek_block`] with a
//! snapshot of a contiguous committed window from a single partition.
//! The consumer iterates the framed fragments at its own pace - across
//! as many scheduler slices as it needs - and then either marks the
//! block completed (cursor advances past the window) or failed (every
//! message frame in the window gets its FAILED flag first). An unmarked
//! peek leaves the cursor where it was, so peeking is repeatable.
//!
//! [`Subscription::peek_block`]: crate::subscription::Subscription::peek_block

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::BytesMut;
use strand_core::{Position, StreamId};
use strand_log::{frame, AtomicBuffer, LogBuffer};
use strand_sched::DataSignal;

/// Metadata of one frame inside an armed window.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PeekFrame {
    /// Offset of the frame within the snapshot.
    pub(crate) rel_offset: usize,
    /// Raw frame length (header plus payload).
    pub(crate) length: usize,
    /// Routing key of the fragment.
    pub(crate) stream_id: StreamId,
    /// Whether the FAILED flag was set when the window was armed.
    pub(crate) is_failed: bool,
}

/// Write-back target of an armed window.
#[derive(Debug)]
pub(crate) struct PeekTarget {
    position: Arc<AtomicU64>,
    consumed: DataSignal,
    buffer: Arc<LogBuffer>,
}

impl PeekTarget {
    pub(crate) const fn new(
        position: Arc<AtomicU64>,
        consumed: DataSignal,
        buffer: Arc<LogBuffer>,
    ) -> Self {
        Self {
            position,
            consumed,
            buffer,
        }
    }
}

/// A reusable handle onto one peeked window of the log.
#[derive(Debug, Default)]
pub struct BlockPeek {
    snapshot: BytesMut,
    frames: Vec<PeekFrame>,
    frame_offsets: Vec<usize>,
    end: Position,
    target: Option<PeekTarget>,
}

impl BlockPeek {
    /// Creates an empty, unarmed peek.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the armed window size in bytes, zero when unarmed.
    #[must_use]
    pub fn bytes_available(&self) -> usize {
        self.snapshot.len()
    }

    /// Returns the number of fragments in the armed window.
    #[must_use]
    pub fn fragment_count(&self) -> usize {
        self.frames.len()
    }

    /// Iterates the framed fragments of the armed window.
    ///
    /// The views borrow the snapshot taken when the window was armed;
    /// they stay valid until the peek is re-armed or cleared.
    pub fn iter(&self) -> impl Iterator<Item = PeekedFragment<'_>> {
        self.frames.iter().map(|meta| PeekedFragment {
            payload: &self.snapshot[meta.rel_offset + frame::HEADER_LENGTH
                ..meta.rel_offset + meta.length],
            stream_id: meta.stream_id,
            is_failed: meta.is_failed,
        })
    }

    /// Advances the subscription cursor past the window.
    ///
    /// # Panics
    /// Panics if no window is armed.
    pub fn mark_completed(&mut self) {
        let target = self.target.take().expect("no armed window to complete");
        target.position.store(self.end.raw(), Ordering::Release);
        target.consumed.raise();
        self.clear();
    }

    /// Marks every message frame in the window FAILED, then advances
    /// the subscription cursor past it.
    ///
    /// # Panics
    /// Panics if no window is armed.
    pub fn mark_failed(&mut self) {
        let target = self.target.take().expect("no armed window to fail");
        for &frame_offset in &self.frame_offsets {
            frame::mark_frame_failed(target.buffer.data(), frame_offset);
        }
        target.position.store(self.end.raw(), Ordering::Release);
        target.consumed.raise();
        self.clear();
    }

    pub(crate) fn clear(&mut self) {
        self.snapshot.clear();
        self.frames.clear();
        self.frame_offsets.clear();
        self.end = Position::ZERO;
        self.target = None;
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn arm(
        &mut self,
        data: &AtomicBuffer,
        window_start: usize,
        window_bytes: usize,
        frames: Vec<PeekFrame>,
        frame_offsets: Vec<usize>,
        end: Position,
        target: PeekTarget,
    ) {
        self.snapshot.resize(window_bytes, 0);
        data.get_bytes(window_start, &mut self.snapshot);
        self.frames = frames;
        self.frame_offsets = frame_offsets;
        self.end = end;
        self.target = Some(target);
    }
}

/// One framed fragment inside a peeked window.
#[derive(Debug, Clone, Copy)]
pub struct PeekedFragment<'a> {
    payload: &'a [u8],
    stream_id: StreamId,
    is_failed: bool,
}

impl<'a> PeekedFragment<'a> {
    /// Returns the fragment payload.
    #[must_use]
    pub const fn payload(&self) -> &'a [u8] {
        self.payload
    }

    /// Returns the fragment's routing key.
    #[must_use]
    pub const fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    /// Returns whether the fragment carries the FAILED flag.
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        self.is_failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strand_core::{Limits, SubscriptionId};
    use strand_log::LogAppender;

    use crate::subscription::{FragmentOutcome, Subscription};

    const PARTITION_SIZE: u32 = 4096;

    fn setup() -> (LogAppender, Subscription) {
        let buffer = Arc::new(LogBuffer::new(PARTITION_SIZE, &Limits::new()).unwrap());
        let limit = Arc::new(AtomicU64::new(Position::new(3, 0).raw()));
        let appender = LogAppender::new(Arc::clone(&buffer), limit, 256);
        let subscription = Subscription::new(
            SubscriptionId::new(0),
            "peeker".to_string(),
            Position::ZERO,
            buffer,
            DataSignal::new(),
            None,
            false,
        );
        (appender, subscription)
    }

    fn window_values(peek: &BlockPeek) -> Vec<u32> {
        peek.iter()
            .map(|fragment| {
                let mut bytes = [0u8; 4];
                bytes.copy_from_slice(&fragment.payload()[..4]);
                u32::from_le_bytes(bytes)
            })
            .collect()
    }

    #[test]
    fn test_peek_iterates_window_in_order() {
        let (appender, subscription) = setup();
        for value in 1u32..=4 {
            appender
                .append(&value.to_le_bytes(), StreamId::new(2))
                .unwrap();
        }

        let mut peek = BlockPeek::new();
        let bytes = subscription.peek_block(&mut peek, usize::MAX, true);
        assert_eq!(bytes, 4 * 24);
        assert_eq!(peek.fragment_count(), 4);
        assert_eq!(window_values(&peek), vec![1, 2, 3, 4]);
        assert!(peek.iter().all(|f| f.stream_id() == StreamId::new(2)));
    }

    #[test]
    fn test_unmarked_peek_is_repeatable() {
        let (appender, subscription) = setup();
        appender.append(&7u32.to_le_bytes(), StreamId::DEFAULT).unwrap();

        let mut peek = BlockPeek::new();
        let before = subscription.position();
        let first = subscription.peek_block(&mut peek, usize::MAX, true);
        assert_eq!(subscription.position(), before, "peek must not advance");

        let second = subscription.peek_block(&mut peek, usize::MAX, true);
        assert_eq!(first, second);
        assert_eq!(window_values(&peek), vec![7]);
    }

    #[test]
    fn test_mark_completed_advances_cursor() {
        let (appender, subscription) = setup();
        appender.append(&1u32.to_le_bytes(), StreamId::DEFAULT).unwrap();
        appender.append(&2u32.to_le_bytes(), StreamId::DEFAULT).unwrap();

        let mut peek = BlockPeek::new();
        subscription.peek_block(&mut peek, usize::MAX, true);
        peek.mark_completed();

        assert_eq!(subscription.position(), appender.position());
        assert_eq!(subscription.peek_block(&mut peek, usize::MAX, true), 0);
    }

    #[test]
    fn test_mark_failed_flags_every_frame() {
        let buffer = Arc::new(LogBuffer::new(PARTITION_SIZE, &Limits::new()).unwrap());
        let limit = Arc::new(AtomicU64::new(Position::new(3, 0).raw()));
        let appender = LogAppender::new(Arc::clone(&buffer), limit, 256);
        let peeker = Subscription::new(
            SubscriptionId::new(0),
            "peeker".to_string(),
            Position::ZERO,
            Arc::clone(&buffer),
            DataSignal::new(),
            None,
            false,
        );
        let inspector = Subscription::new(
            SubscriptionId::new(1),
            "inspector".to_string(),
            Position::ZERO,
            buffer,
            DataSignal::new(),
            None,
            false,
        );

        appender.append(&1u32.to_le_bytes(), StreamId::DEFAULT).unwrap();
        appender.append(&2u32.to_le_bytes(), StreamId::DEFAULT).unwrap();

        let mut peek = BlockPeek::new();
        peeker.peek_block(&mut peek, usize::MAX, true);
        peek.mark_failed();

        // An independent reader over the same log observes the flags.
        let mut failed = Vec::new();
        inspector.poll(
            &mut |_: &[u8], _: StreamId, is_failed: bool| {
                failed.push(is_failed);
                FragmentOutcome::Consume
            },
            10,
        );
        assert_eq!(failed, vec![true, true]);
    }

    #[test]
    fn test_peek_respects_max_bytes() {
        let (appender, subscription) = setup();
        for value in 1u32..=10 {
            appender
                .append(&value.to_le_bytes(), StreamId::DEFAULT)
                .unwrap();
        }

        let mut peek = BlockPeek::new();
        // Room for exactly two 24-byte frames.
        let bytes = subscription.peek_block(&mut peek, 50, true);
        assert_eq!(bytes, 48);
        assert_eq!(window_values(&peek), vec![1, 2]);
    }

    #[test]
    fn test_peek_never_crosses_partitions() {
        let (appender, subscription) = setup();
        // Fill past one partition so a rotation sits in the middle.
        let total = 25u32;
        for value in 1..=total {
            let mut payload = [0u8; 200];
            payload[..4].copy_from_slice(&value.to_le_bytes());
            appender.append(&payload, StreamId::DEFAULT).unwrap();
        }

        let mut peek = BlockPeek::new();
        let mut seen = Vec::new();
        while subscription.peek_block(&mut peek, usize::MAX, true) > 0 {
            let start_cycle = subscription.position().cycle();
            seen.extend(window_values(&peek));
            peek.mark_completed();
            assert!(
                subscription.position().cycle() <= start_cycle + 1,
                "one window spans at most one boundary crossing"
            );
        }
        assert_eq!(seen, (1..=total).collect::<Vec<_>>());
    }

    #[test]
    fn test_peek_without_rotation_stops_at_padding() {
        let (appender, subscription) = setup();
        let per_partition = 18u32; // 200-byte payloads, 216 aligned
        for value in 1..=per_partition + 1 {
            let mut payload = [0u8; 200];
            payload[..4].copy_from_slice(&value.to_le_bytes());
            appender.append(&payload, StreamId::DEFAULT).unwrap();
        }

        let mut peek = BlockPeek::new();
        // Drain the first partition.
        assert!(subscription.peek_block(&mut peek, usize::MAX, false) > 0);
        peek.mark_completed();

        // Cursor is on the padding frame now; without rotation the peek
        // comes back empty and the cursor stays put.
        let parked = subscription.position();
        assert_eq!(subscription.peek_block(&mut peek, usize::MAX, false), 0);
        assert_eq!(subscription.position(), parked);

        // Allowing rotation moves on to the next partition's data.
        assert!(subscription.peek_block(&mut peek, usize::MAX, true) > 0);
        assert_eq!(window_values(&peek), vec![19]);
    }

    #[test]
    #[should_panic(expected = "no armed window")]
    fn test_mark_completed_without_window_panics() {
        let mut peek = BlockPeek::new();
        peek.mark_completed();
    }
}
