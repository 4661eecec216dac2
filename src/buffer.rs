//! # Growable Byte Buffer
//!
//! Append-only byte arena used as the backing store for result-set rows and
//! for the row serialization codec. Every row of every result set lives in
//! one of these buffers, so the growth policy matters:
//!
//! | Capacity | Growth on overflow |
//! |----------|--------------------|
//! | <= 1 MB  | `needed + 2 * capacity` (exponential) |
//! | > 1 MB   | `needed + capacity + 128 KB` (linear) |
//!
//! Exponential growth keeps small buffers cheap to fill; past the cap the
//! buffer switches to linear growth so that copying on reallocation stays
//! bounded for very large row sets.
//!
//! ## Addressing
//!
//! `alloc` and `append` return index ranges rather than pointers. Ranges stay
//! valid across growth, so a caller can allocate a row, keep its range, and
//! fill it in later even if other rows have been appended in between.

use std::fmt;
use std::ops::Range;

/// Initial capacity and the post-cap linear growth step.
pub const GROWTH_SIZE: usize = 1024;

/// Capacity beyond which growth switches from exponential to linear.
pub const EXP_GROWTH_CAP: usize = 1024 * 1024;

/// Extra slack added on each growth once past [`EXP_GROWTH_CAP`].
pub const GROWTH_SIZE_AFTER_CAP: usize = 128 * 1024;

/// Append-only byte arena with doubling growth.
#[derive(Debug, Default)]
pub struct ByteBuf {
    data: Vec<u8>,
}

impl ByteBuf {
    /// Opens a buffer with the initial capacity pre-allocated.
    pub fn open() -> Self {
        Self {
            data: Vec::with_capacity(GROWTH_SIZE),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }

    /// Reserves `needed` contiguous zeroed bytes and returns their range.
    pub fn alloc(&mut self, needed: usize) -> Range<usize> {
        let used = self.data.len();
        let avail = self.data.capacity() - used;

        if needed > avail {
            let capacity = self.data.capacity();
            let new_capacity = if capacity > EXP_GROWTH_CAP {
                needed + GROWTH_SIZE_AFTER_CAP + capacity
            } else {
                needed + 2 * capacity
            };
            let mut grown = Vec::with_capacity(new_capacity);
            grown.extend_from_slice(&self.data);
            self.data = grown;
        }

        self.data.resize(used + needed, 0);
        used..used + needed
    }

    /// Copies `bytes` into a fresh reservation and returns its range.
    pub fn append(&mut self, bytes: &[u8]) -> Range<usize> {
        let range = self.alloc(bytes.len());
        self.data[range.clone()].copy_from_slice(bytes);
        range
    }

    /// Appends formatted text with no trailing terminator.
    pub fn append_fmt(&mut self, args: fmt::Arguments<'_>) {
        use fmt::Write;
        // writing into a Vec<u8> through fmt::Write cannot fail
        let _ = self.write_fmt(args);
    }

    /// Appends a single zero byte, terminating prior `append_fmt` output
    /// when a terminated string is needed.
    pub fn append_null(&mut self) {
        self.append(&[0]);
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn slice(&self, range: Range<usize>) -> &[u8] {
        &self.data[range]
    }

    pub fn slice_mut(&mut self, range: Range<usize>) -> &mut [u8] {
        &mut self.data[range]
    }

    /// Harvests the accumulated bytes, leaving the buffer closed.
    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }

    /// Releases the backing memory.
    pub fn close(&mut self) {
        self.data = Vec::new();
    }
}

impl fmt::Write for ByteBuf {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.append(s.as_bytes());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_preallocates_initial_capacity() {
        let b = ByteBuf::open();
        assert_eq!(b.len(), 0);
        assert!(b.capacity() >= GROWTH_SIZE);
    }

    #[test]
    fn alloc_returns_zeroed_range() {
        let mut b = ByteBuf::open();
        let r = b.alloc(16);
        assert_eq!(r, 0..16);
        assert!(b.slice(r).iter().all(|&x| x == 0));
    }

    #[test]
    fn ranges_stay_valid_across_growth() {
        let mut b = ByteBuf::open();
        let first = b.append(b"hello");
        // force at least one reallocation
        for _ in 0..100 {
            b.append(&[0xAB; 64]);
        }
        assert_eq!(b.slice(first), b"hello");
    }

    #[test]
    fn growth_is_exponential_below_cap() {
        let mut b = ByteBuf::open();
        let before = b.capacity();
        b.alloc(before + 1);
        // needed + 2 * capacity
        assert_eq!(b.capacity(), before + 1 + 2 * before);
    }

    #[test]
    fn append_fmt_adds_no_terminator() {
        let mut b = ByteBuf::open();
        b.append_fmt(format_args!("x={}", 42));
        assert_eq!(b.as_slice(), b"x=42");
        b.append_null();
        assert_eq!(b.as_slice(), b"x=42\0");
    }

    #[test]
    fn close_releases_storage() {
        let mut b = ByteBuf::open();
        b.append(b"data");
        b.close();
        assert_eq!(b.len(), 0);
        assert_eq!(b.capacity(), 0);
    }
}
