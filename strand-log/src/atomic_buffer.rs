//! Word-atomic byte region.
//!
//! The log data region is a boxed slice of `AtomicU32` words addressed
//! by byte offset. Structured fields (frame headers) sit on 4-byte
//! boundaries; payload bytes may start and end anywhere inside a frame
//! and are assembled from whole words.
//!
//! The buffer itself provides no coordination. Safety of concurrent
//! access rests on the claim protocol layered above it:
//!
//! 1. A producer owns a claimed region exclusively until it commits,
//!    so its payload stores never race with another writer.
//! 2. Readers only touch a region after an acquire load of the frame's
//!    length word observes the positive value a committer published
//!    with a release store, which makes all prior relaxed payload
//!    stores visible.
//!
//! Word values are byte-oriented: a word holds the four bytes at its
//! offset in little-endian order, so byte-level access round-trips on
//! any host.

use std::sync::atomic::{AtomicU32, Ordering};

const WORD_SIZE: usize = 4;

/// A fixed-size byte region backed by atomic 32-bit words.
pub struct AtomicBuffer {
    words: Box<[AtomicU32]>,
}

impl AtomicBuffer {
    /// Allocates a zeroed buffer of `capacity` bytes.
    ///
    /// # Panics
    /// Panics if `capacity` is zero or not a multiple of the word size.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "capacity must be positive");
        assert!(
            capacity % WORD_SIZE == 0,
            "capacity must be a multiple of the word size"
        );

        let words = (0..capacity / WORD_SIZE)
            .map(|_| AtomicU32::new(0))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self { words }
    }

    /// Returns the capacity in bytes.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.words.len() * WORD_SIZE
    }

    #[inline]
    fn word(&self, offset: usize) -> &AtomicU32 {
        debug_assert!(offset % WORD_SIZE == 0, "offset must be word-aligned");
        &self.words[offset / WORD_SIZE]
    }

    /// Relaxed 32-bit load at a word-aligned byte offset.
    #[inline]
    #[must_use]
    pub fn get_u32(&self, offset: usize) -> u32 {
        self.word(offset).load(Ordering::Relaxed)
    }

    /// Relaxed 32-bit store at a word-aligned byte offset.
    #[inline]
    pub fn put_u32(&self, offset: usize, value: u32) {
        self.word(offset).store(value, Ordering::Relaxed);
    }

    /// Relaxed signed 32-bit load at a word-aligned byte offset.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub fn get_i32(&self, offset: usize) -> i32 {
        self.get_u32(offset) as i32
    }

    /// Acquire signed 32-bit load at a word-aligned byte offset.
    ///
    /// Pairs with [`Self::put_i32_release`] on the same word.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub fn get_i32_acquire(&self, offset: usize) -> i32 {
        self.word(offset).load(Ordering::Acquire) as i32
    }

    /// Relaxed signed 32-bit store at a word-aligned byte offset.
    #[inline]
    #[allow(clippy::cast_sign_loss)]
    pub fn put_i32(&self, offset: usize, value: i32) {
        self.put_u32(offset, value as u32);
    }

    /// Release signed 32-bit store at a word-aligned byte offset.
    ///
    /// Publishes every store sequenced before it to readers that
    /// acquire-load the same word.
    #[inline]
    #[allow(clippy::cast_sign_loss)]
    pub fn put_i32_release(&self, offset: usize, value: i32) {
        self.word(offset).store(value as u32, Ordering::Release);
    }

    /// Atomically ORs `mask` into the word at a word-aligned byte
    /// offset, with release ordering.
    #[inline]
    pub fn fetch_or_u32(&self, offset: usize, mask: u32) {
        self.word(offset).fetch_or(mask, Ordering::Release);
    }

    /// Copies `src` into the buffer starting at an arbitrary byte
    /// offset, with relaxed stores.
    ///
    /// Partial words at the edges are merged read-modify-write; the
    /// caller must hold exclusive write access to the covered region.
    ///
    /// # Panics
    /// Panics if the range exceeds the buffer capacity.
    pub fn put_bytes(&self, offset: usize, src: &[u8]) {
        assert!(
            offset + src.len() <= self.capacity(),
            "write past end of buffer"
        );

        let mut offset = offset;
        let mut src = src;

        // Leading partial word.
        let lead = offset % WORD_SIZE;
        if lead != 0 && !src.is_empty() {
            let take = (WORD_SIZE - lead).min(src.len());
            let word = self.word(offset - lead);
            let mut bytes = word.load(Ordering::Relaxed).to_le_bytes();
            bytes[lead..lead + take].copy_from_slice(&src[..take]);
            word.store(u32::from_le_bytes(bytes), Ordering::Relaxed);
            offset += take;
            src = &src[take..];
        }

        // Whole words.
        while src.len() >= WORD_SIZE {
            let mut bytes = [0u8; WORD_SIZE];
            bytes.copy_from_slice(&src[..WORD_SIZE]);
            self.word(offset)
                .store(u32::from_le_bytes(bytes), Ordering::Relaxed);
            offset += WORD_SIZE;
            src = &src[WORD_SIZE..];
        }

        // Trailing partial word.
        if !src.is_empty() {
            let word = self.word(offset);
            let mut bytes = word.load(Ordering::Relaxed).to_le_bytes();
            bytes[..src.len()].copy_from_slice(src);
            word.store(u32::from_le_bytes(bytes), Ordering::Relaxed);
        }
    }

    /// Copies bytes from an arbitrary byte offset into `dst`, with
    /// relaxed loads.
    ///
    /// # Panics
    /// Panics if the range exceeds the buffer capacity.
    pub fn get_bytes(&self, offset: usize, dst: &mut [u8]) {
        assert!(
            offset + dst.len() <= self.capacity(),
            "read past end of buffer"
        );

        let mut offset = offset;
        let mut dst = dst;

        let lead = offset % WORD_SIZE;
        if lead != 0 && !dst.is_empty() {
            let take = (WORD_SIZE - lead).min(dst.len());
            let bytes = self.word(offset - lead).load(Ordering::Relaxed).to_le_bytes();
            dst[..take].copy_from_slice(&bytes[lead..lead + take]);
            offset += take;
            dst = &mut dst[take..];
        }

        while dst.len() >= WORD_SIZE {
            let bytes = self.word(offset).load(Ordering::Relaxed).to_le_bytes();
            dst[..WORD_SIZE].copy_from_slice(&bytes);
            offset += WORD_SIZE;
            dst = &mut dst[WORD_SIZE..];
        }

        if !dst.is_empty() {
            let bytes = self.word(offset).load(Ordering::Relaxed).to_le_bytes();
            let take = dst.len();
            dst.copy_from_slice(&bytes[..take]);
        }
    }

    /// Zeroes a word-aligned region with relaxed stores.
    ///
    /// # Panics
    /// Panics if the range is not word-aligned or exceeds the capacity.
    pub fn zero_region(&self, offset: usize, length: usize) {
        assert!(offset % WORD_SIZE == 0, "offset must be word-aligned");
        assert!(length % WORD_SIZE == 0, "length must be word-aligned");
        assert!(offset + length <= self.capacity(), "zero past end of buffer");

        for word_offset in (offset..offset + length).step_by(WORD_SIZE) {
            self.word(word_offset).store(0, Ordering::Relaxed);
        }
    }
}

impl std::fmt::Debug for AtomicBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AtomicBuffer")
            .field("capacity", &self.capacity())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zeroed_at_construction() {
        let buf = AtomicBuffer::new(64);
        assert_eq!(buf.capacity(), 64);
        for offset in (0..64).step_by(4) {
            assert_eq!(buf.get_u32(offset), 0);
        }
    }

    #[test]
    #[should_panic(expected = "multiple of the word size")]
    fn test_unaligned_capacity_panics() {
        let _ = AtomicBuffer::new(63);
    }

    #[test]
    fn test_u32_roundtrip() {
        let buf = AtomicBuffer::new(32);
        buf.put_u32(8, 0xDEAD_BEEF);
        assert_eq!(buf.get_u32(8), 0xDEAD_BEEF);
    }

    #[test]
    fn test_i32_sign_roundtrip() {
        let buf = AtomicBuffer::new(32);
        buf.put_i32(4, -4534);
        assert_eq!(buf.get_i32(4), -4534);
        buf.put_i32_release(4, 4534);
        assert_eq!(buf.get_i32_acquire(4), 4534);
    }

    #[test]
    fn test_bytes_roundtrip_aligned() {
        let buf = AtomicBuffer::new(32);
        let src = [1u8, 2, 3, 4, 5, 6, 7, 8, 9];
        buf.put_bytes(8, &src);
        let mut dst = [0u8; 9];
        buf.get_bytes(8, &mut dst);
        assert_eq!(dst, src);
    }

    #[test]
    fn test_bytes_roundtrip_unaligned() {
        let buf = AtomicBuffer::new(32);
        let src = *b"hello, world";
        buf.put_bytes(5, &src);
        let mut dst = [0u8; 12];
        buf.get_bytes(5, &mut dst);
        assert_eq!(&dst, b"hello, world");
    }

    #[test]
    fn test_partial_word_write_preserves_neighbors() {
        let buf = AtomicBuffer::new(16);
        buf.put_u32(0, u32::MAX);
        buf.put_bytes(1, &[0, 0]);
        let mut dst = [0u8; 4];
        buf.get_bytes(0, &mut dst);
        assert_eq!(dst, [0xFF, 0, 0, 0xFF]);
    }

    #[test]
    fn test_fetch_or() {
        let buf = AtomicBuffer::new(16);
        buf.put_u32(4, 0x0000_0001);
        buf.fetch_or_u32(4, 0x0001_0000);
        assert_eq!(buf.get_u32(4), 0x0001_0001);
    }

    #[test]
    fn test_zero_region() {
        let buf = AtomicBuffer::new(32);
        buf.put_bytes(0, &[0xAB; 32]);
        buf.zero_region(8, 16);
        let mut dst = [0u8; 32];
        buf.get_bytes(0, &mut dst);
        assert_eq!(&dst[..8], &[0xAB; 8]);
        assert_eq!(&dst[8..24], &[0u8; 16]);
        assert_eq!(&dst[24..], &[0xAB; 8]);
    }

    #[test]
    #[should_panic(expected = "write past end")]
    fn test_write_past_end_panics() {
        let buf = AtomicBuffer::new(16);
        buf.put_bytes(12, &[0u8; 8]);
    }
}
