//! Growable read window between the transport and the parser.
//!
//! The buffer keeps a read cursor into a `BytesMut`. Transport reads land
//! at the end; the parser looks at `readable()` and advances the cursor with
//! `consume()` once a whole value has been validated. Consumed bytes are
//! reclaimed lazily by `compact()`, triggered once the consumed prefix grows
//! past a slack threshold.
//!
//! ```text
//!  0          read            len          capacity
//!  |-consumed-|---readable----|----spare----|
//! ```

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Default initial capacity: 16KB.
pub const DEFAULT_BUFFER_CAPACITY: usize = 16 * 1024;

/// Default consumed prefix size that triggers compaction: 64KB.
pub const DEFAULT_COMPACT_THRESHOLD: usize = 64 * 1024;

/// Read buffer with a read cursor and amortized doubling growth.
#[derive(Debug)]
pub struct ReadBuffer {
    /// Stored bytes; `[..read]` is consumed, `[read..]` is readable.
    storage: BytesMut,
    /// Read cursor into `storage`.
    read: usize,
    /// Consumed prefix length that makes `maybe_compact` shift bytes down.
    compact_threshold: usize,
    /// Total bytes consumed over the buffer's lifetime.
    consumed: u64,
}

impl ReadBuffer {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUFFER_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            storage: BytesMut::with_capacity(capacity),
            read: 0,
            compact_threshold: DEFAULT_COMPACT_THRESHOLD,
            consumed: 0,
        }
    }

    /// Set the consumed prefix size at which `maybe_compact` kicks in.
    pub fn set_compact_threshold(&mut self, threshold: usize) {
        self.compact_threshold = threshold;
    }

    /// Append bytes at the write end, growing by doubling when needed.
    pub fn append(&mut self, data: &[u8]) {
        self.reserve(data.len());
        self.storage.extend_from_slice(data);
    }

    /// Unconsumed bytes, contiguous.
    #[inline]
    pub fn readable(&self) -> &[u8] {
        &self.storage[self.read..]
    }

    /// Mark `n` readable bytes as consumed.
    ///
    /// # Panics
    ///
    /// Panics if `n` exceeds the number of readable bytes.
    pub fn consume(&mut self, n: usize) {
        assert!(
            n <= self.len(),
            "consume({}) exceeds {} readable bytes",
            n,
            self.len()
        );
        self.read += n;
        self.consumed += n as u64;

        // Fully drained: rewinding is free.
        if self.read == self.storage.len() {
            self.storage.clear();
            self.read = 0;
        }
    }

    /// Shift readable bytes to the front, reclaiming the consumed prefix.
    pub fn compact(&mut self) {
        if self.read == 0 {
            return;
        }
        let end = self.storage.len();
        self.storage.copy_within(self.read..end, 0);
        self.storage.truncate(end - self.read);
        self.read = 0;
    }

    /// Compact if the consumed prefix exceeds the threshold.
    ///
    /// Returns `true` if bytes were moved.
    pub fn maybe_compact(&mut self) -> bool {
        if self.read >= self.compact_threshold {
            self.compact();
            true
        } else {
            false
        }
    }

    /// Number of readable bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.storage.len() - self.read
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.storage.capacity()
    }

    /// Consumed bytes still held at the front of the storage.
    #[inline]
    pub fn slack(&self) -> usize {
        self.read
    }

    /// Total bytes consumed since creation. Used as the stream offset.
    #[inline]
    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    /// Drop all readable bytes and rewind.
    pub fn clear(&mut self) {
        self.consumed += self.len() as u64;
        self.storage.clear();
        self.read = 0;
    }

    /// Read once from `reader` into the spare capacity, reserving at least
    /// `chunk` bytes first. Returns the number of bytes read; `0` means EOF.
    ///
    /// Cancel safe: if the future is dropped before completion no bytes are
    /// lost.
    pub async fn read_from<R>(&mut self, reader: &mut R, chunk: usize) -> std::io::Result<usize>
    where
        R: AsyncRead + Unpin,
    {
        self.reserve(chunk.max(1));
        reader.read_buf(&mut self.storage).await
    }

    /// Make room for `additional` bytes, doubling capacity until it fits.
    fn reserve(&mut self, additional: usize) {
        let len = self.storage.len();
        let needed = len + additional;
        let capacity = self.storage.capacity();
        if needed <= capacity {
            return;
        }
        // Reclaiming the consumed prefix may be enough on its own.
        if self.read > 0 && needed - self.read <= capacity {
            self.compact();
            return;
        }
        let mut target = capacity.max(64);
        while target < needed {
            target *= 2;
        }
        self.storage.reserve(target - len);
    }
}

impl Default for ReadBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_and_consume() {
        let mut buf = ReadBuffer::with_capacity(8);
        buf.append(b"hello");
        buf.append(b" world");
        assert_eq!(buf.readable(), b"hello world");

        buf.consume(6);
        assert_eq!(buf.readable(), b"world");
        assert_eq!(buf.consumed(), 6);
        assert_eq!(buf.len(), 5);
    }

    #[test]
    fn test_full_consume_rewinds() {
        let mut buf = ReadBuffer::new();
        buf.append(b"abc");
        buf.consume(3);
        assert!(buf.is_empty());
        assert_eq!(buf.slack(), 0);
        assert_eq!(buf.consumed(), 3);
    }

    #[test]
    #[should_panic(expected = "exceeds")]
    fn test_consume_past_end_panics() {
        let mut buf = ReadBuffer::new();
        buf.append(b"ab");
        buf.consume(3);
    }

    #[test]
    fn test_growth_doubles() {
        let mut buf = ReadBuffer::with_capacity(64);
        buf.append(&[1u8; 65]);
        assert!(buf.capacity() >= 128);
        assert_eq!(buf.len(), 65);
    }

    #[test]
    fn test_compact_preserves_readable() {
        let mut buf = ReadBuffer::new();
        buf.set_compact_threshold(4);
        buf.append(b"0123456789");
        buf.consume(2);
        assert!(!buf.maybe_compact());

        buf.consume(3);
        assert_eq!(buf.slack(), 5);
        assert!(buf.maybe_compact());
        assert_eq!(buf.slack(), 0);
        assert_eq!(buf.readable(), b"56789");
        assert_eq!(buf.consumed(), 5);
    }

    #[test]
    fn test_clear_counts_as_consumed() {
        let mut buf = ReadBuffer::new();
        buf.append(b"xyz");
        buf.consume(1);
        buf.clear();
        assert!(buf.is_empty());
        assert_eq!(buf.consumed(), 3);
    }

    #[tokio::test]
    async fn test_read_from_reader() {
        let mut buf = ReadBuffer::with_capacity(4);
        let mut reader: &[u8] = b"+PONG\r\n";
        let n = buf.read_from(&mut reader, 16).await.unwrap();
        assert_eq!(n, 7);
        assert_eq!(buf.readable(), b"+PONG\r\n");

        let n = buf.read_from(&mut reader, 16).await.unwrap();
        assert_eq!(n, 0);
    }
}
