//! Fragment frame format.
//!
//! Every fragment in the log is framed and aligned to 8 bytes:
//!
//! ```text
//! +----------+--------+-------+----------+------------+----------+---------+
//! |  Length  |  Type  | Flags | (unused) | Stream id  | (unused) | Payload |
//! | (4 bytes)|(2 byte)|(1 b)  |  (1 b)   | (4 bytes)  | (4 bytes)| (N b)   |
//! +----------+--------+-------+----------+------------+----------+---------+
//! ```
//!
//! - Length: header plus payload in bytes, not counting alignment
//!   fill; cursors advance by the aligned length. Zero while the
//!   region is unwritten, negative while claimed, positive once
//!   committed. The sign flip is the publication point.
//! - Type: `TYPE_MESSAGE` for producer fragments, `TYPE_PADDING` for
//!   the synthetic frame that fills the end of a partition.
//! - Flags: bit 0 marks a FAILED fragment (aborted claim, or a handler
//!   failure propagated down a pipeline).
//! - Stream id: opaque routing key, returned to subscribers verbatim.
//!
//! All words are stored little-endian. A padding frame whose remainder
//! is only 8 bytes is a bare stub of the length and type words; padding
//! never carries a stream id or payload, so the short form loses
//! nothing.

use strand_core::{align_up, StreamId};

use crate::atomic_buffer::AtomicBuffer;

/// Alignment of every frame in the log.
pub const FRAME_ALIGNMENT: usize = 8;

/// Size of the frame header in bytes.
pub const HEADER_LENGTH: usize = 16;

/// Byte offset of the length word within a frame.
pub const LENGTH_OFFSET: usize = 0;

/// Byte offset of the combined type/flags word within a frame.
pub const TYPE_AND_FLAGS_OFFSET: usize = 4;

/// Byte offset of the stream id word within a frame.
pub const STREAM_ID_OFFSET: usize = 8;

/// Frame type of a producer fragment.
pub const TYPE_MESSAGE: i16 = 0;

/// Frame type of the synthetic fill at the end of a partition.
pub const TYPE_PADDING: i16 = 1;

/// Flag bit marking a FAILED fragment.
pub const FLAG_FAILED: u8 = 0x01;

// The flags byte sits above the type half-word in the combined word.
const FLAGS_SHIFT: u32 = 16;

/// Returns the raw frame length for a payload of `payload_length`
/// bytes: header plus payload, no alignment fill.
#[inline]
#[must_use]
pub const fn frame_length(payload_length: usize) -> usize {
    HEADER_LENGTH + payload_length
}

/// Rounds a raw frame length up to the space the frame occupies in the
/// log.
#[inline]
#[must_use]
pub const fn aligned_frame_length(frame_length: usize) -> usize {
    align_up(frame_length, FRAME_ALIGNMENT)
}

/// Returns the payload length of a frame with the given raw length.
///
/// # Panics
/// Panics if `frame_length` is smaller than the header.
#[inline]
#[must_use]
pub const fn payload_length(frame_length: usize) -> usize {
    assert!(frame_length >= HEADER_LENGTH, "frame shorter than header");
    frame_length - HEADER_LENGTH
}

/// Packs a frame type and flags into the combined header word.
#[inline]
#[must_use]
#[allow(clippy::cast_sign_loss)]
pub const fn encode_type_and_flags(frame_type: i16, flags: u8) -> u32 {
    frame_type as u16 as u32 | (flags as u32) << FLAGS_SHIFT
}

/// Extracts the frame type from the combined header word.
#[inline]
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
pub const fn decode_frame_type(word: u32) -> i16 {
    word as u16 as i16
}

/// Extracts the flags from the combined header word.
#[inline]
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub const fn decode_flags(word: u32) -> u8 {
    (word >> FLAGS_SHIFT) as u8
}

/// Writes the header of a freshly claimed message frame.
///
/// The length word is stored negative, which keeps the region invisible
/// to subscribers until [`commit_frame`] flips the sign.
///
/// # Panics
/// Panics if `frame_length` does not fit an i32.
pub fn write_claimed_header(
    buf: &AtomicBuffer,
    frame_offset: usize,
    frame_length: usize,
    stream_id: StreamId,
) {
    let length = i32::try_from(frame_length).expect("frame length fits i32");
    buf.put_u32(
        frame_offset + TYPE_AND_FLAGS_OFFSET,
        encode_type_and_flags(TYPE_MESSAGE, 0),
    );
    buf.put_i32(frame_offset + STREAM_ID_OFFSET, stream_id.get());
    buf.put_i32(frame_offset + LENGTH_OFFSET, -length);
}

/// Writes a committed padding frame covering `remaining` bytes.
///
/// Padding is published immediately: its positive length is
/// release-stored so a subscriber that observes it also observes every
/// fragment committed before the partition filled.
///
/// # Panics
/// Panics if `remaining` is smaller than a padding stub or unaligned.
pub fn write_padding(buf: &AtomicBuffer, frame_offset: usize, remaining: usize) {
    assert!(remaining >= FRAME_ALIGNMENT, "padding smaller than a stub");
    assert!(remaining % FRAME_ALIGNMENT == 0, "padding must be aligned");

    let length = i32::try_from(remaining).expect("padding length fits i32");
    buf.put_u32(
        frame_offset + TYPE_AND_FLAGS_OFFSET,
        encode_type_and_flags(TYPE_PADDING, 0),
    );
    buf.put_i32_release(frame_offset + LENGTH_OFFSET, length);
}

/// Publishes a claimed frame by flipping its length word positive.
///
/// # Panics
/// Panics if `frame_length` does not fit an i32.
pub fn commit_frame(buf: &AtomicBuffer, frame_offset: usize, frame_length: usize) {
    let length = i32::try_from(frame_length).expect("frame length fits i32");
    buf.put_i32_release(frame_offset + LENGTH_OFFSET, length);
}

/// Acquire-loads the length word of the frame at `frame_offset`.
///
/// A positive result makes the frame's header and payload visible to
/// the caller.
#[inline]
#[must_use]
pub fn frame_length_volatile(buf: &AtomicBuffer, frame_offset: usize) -> i32 {
    buf.get_i32_acquire(frame_offset + LENGTH_OFFSET)
}

/// Reads the frame type of a visible frame.
#[inline]
#[must_use]
pub fn frame_type(buf: &AtomicBuffer, frame_offset: usize) -> i16 {
    decode_frame_type(buf.get_u32(frame_offset + TYPE_AND_FLAGS_OFFSET))
}

/// Reads the flags of a visible frame.
#[inline]
#[must_use]
pub fn frame_flags(buf: &AtomicBuffer, frame_offset: usize) -> u8 {
    decode_flags(buf.get_u32(frame_offset + TYPE_AND_FLAGS_OFFSET))
}

/// Reads the stream id of a visible message frame.
#[inline]
#[must_use]
pub fn frame_stream_id(buf: &AtomicBuffer, frame_offset: usize) -> StreamId {
    StreamId::new(buf.get_i32(frame_offset + STREAM_ID_OFFSET))
}

/// Sets the FAILED flag on a visible frame.
pub fn mark_frame_failed(buf: &AtomicBuffer, frame_offset: usize) {
    buf.fetch_or_u32(
        frame_offset + TYPE_AND_FLAGS_OFFSET,
        (u32::from(FLAG_FAILED)) << FLAGS_SHIFT,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_length_accounting() {
        assert_eq!(frame_length(0), 16);
        assert_eq!(frame_length(4534), 4550);
        assert_eq!(aligned_frame_length(frame_length(0)), 16);
        assert_eq!(aligned_frame_length(frame_length(1)), 24);
        assert_eq!(aligned_frame_length(frame_length(8)), 24);
        assert_eq!(aligned_frame_length(frame_length(4534)), 4552);
    }

    #[test]
    fn test_payload_length_inverse() {
        assert_eq!(payload_length(frame_length(8)), 8);
        assert_eq!(payload_length(frame_length(4534)), 4534);
    }

    #[test]
    fn test_type_and_flags_roundtrip() {
        let word = encode_type_and_flags(TYPE_PADDING, FLAG_FAILED);
        assert_eq!(decode_frame_type(word), TYPE_PADDING);
        assert_eq!(decode_flags(word), FLAG_FAILED);

        let word = encode_type_and_flags(TYPE_MESSAGE, 0);
        assert_eq!(decode_frame_type(word), TYPE_MESSAGE);
        assert_eq!(decode_flags(word), 0);
    }

    #[test]
    fn test_claimed_header_hidden_until_commit() {
        let buf = AtomicBuffer::new(64);
        let length = frame_length(5);
        write_claimed_header(&buf, 0, length, StreamId::new(9));

        assert_eq!(frame_length_volatile(&buf, 0), -21);
        assert_eq!(frame_stream_id(&buf, 0), StreamId::new(9));

        commit_frame(&buf, 0, length);
        assert_eq!(frame_length_volatile(&buf, 0), 21);
        assert_eq!(frame_type(&buf, 0), TYPE_MESSAGE);
    }

    #[test]
    fn test_padding_stub() {
        let buf = AtomicBuffer::new(64);
        write_padding(&buf, 56, 8);
        assert_eq!(frame_length_volatile(&buf, 56), 8);
        assert_eq!(frame_type(&buf, 56), TYPE_PADDING);
    }

    #[test]
    fn test_mark_failed_preserves_type() {
        let buf = AtomicBuffer::new(64);
        write_claimed_header(&buf, 0, 32, StreamId::DEFAULT);
        commit_frame(&buf, 0, 32);

        mark_frame_failed(&buf, 0);
        assert_eq!(frame_flags(&buf, 0) & FLAG_FAILED, FLAG_FAILED);
        assert_eq!(frame_type(&buf, 0), TYPE_MESSAGE);
        assert_eq!(frame_length_volatile(&buf, 0), 32);
    }
}
