//! Chunk-aggregating output buffer
//!
//! The tag factory emits one small text fragment per token; writing those
//! straight to the transport would produce thousands of tiny writes. The
//! [`StreamingBuffer`] sits between serialization and the network: fragments
//! queue up, get folded into a working string, and leave as encoded byte
//! chunks only once `min_chunk_size` is reached. `drain` flushes whatever is
//! left at end of document. The buffer never yields an empty chunk.
//!
//! Lifecycle is exactly one rewrite operation; buffers are never shared or
//! reused across requests.

use std::collections::VecDeque;

use tracing::trace;

/// Default minimum output chunk size in bytes
pub const DEFAULT_MIN_CHUNK_SIZE: usize = 16 * 1024;

/// Aggregates small text fragments into size-bounded byte chunks
#[derive(Debug)]
pub struct StreamingBuffer {
    pending: VecDeque<String>,
    accumulated: String,
    min_chunk_size: usize,
}

impl StreamingBuffer {
    /// Create a buffer that yields chunks of at least `min_chunk_size` bytes
    pub fn new(min_chunk_size: usize) -> Self {
        Self {
            pending: VecDeque::new(),
            accumulated: String::new(),
            min_chunk_size: min_chunk_size.max(1),
        }
    }

    /// Queue a fragment for output
    pub fn add(&mut self, fragment: impl Into<String>) {
        let fragment = fragment.into();
        if !fragment.is_empty() {
            self.pending.push_back(fragment);
        }
    }

    /// Pop queued fragments into the accumulator and yield an encoded chunk
    /// once it reaches the minimum size. Returns `None` when the queue is
    /// exhausted without filling a chunk; the remainder stays accumulated
    /// for the next call or for [`drain`](Self::drain).
    pub fn next_chunk(&mut self) -> Option<Vec<u8>> {
        while let Some(fragment) = self.pending.pop_front() {
            self.accumulated.push_str(&fragment);

            if self.accumulated.len() >= self.min_chunk_size {
                let chunk = std::mem::take(&mut self.accumulated).into_bytes();
                trace!(len = chunk.len(), "yielding output chunk");
                return Some(chunk);
            }
        }
        None
    }

    /// Exhaust the buffer: yield every full chunk, then the non-empty
    /// remainder once, unconditionally.
    pub fn drain(&mut self) -> Drain<'_> {
        Drain { buffer: self }
    }

    /// Bytes currently held (queued fragments plus the accumulator)
    pub fn len(&self) -> usize {
        self.accumulated.len() + self.pending.iter().map(String::len).sum::<usize>()
    }

    /// Whether the buffer holds no data at all
    pub fn is_empty(&self) -> bool {
        self.accumulated.is_empty() && self.pending.is_empty()
    }
}

/// Iterator returned by [`StreamingBuffer::drain`]
#[derive(Debug)]
pub struct Drain<'a> {
    buffer: &'a mut StreamingBuffer,
}

impl Iterator for Drain<'_> {
    type Item = Vec<u8>;

    fn next(&mut self) -> Option<Vec<u8>> {
        if let Some(chunk) = self.buffer.next_chunk() {
            return Some(chunk);
        }
        if self.buffer.accumulated.is_empty() {
            return None;
        }
        Some(std::mem::take(&mut self.buffer.accumulated).into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_chunk_below_minimum_until_drain() {
        let mut buffer = StreamingBuffer::new(10);
        buffer.add("abc");
        buffer.add("def");
        assert!(buffer.next_chunk().is_none());

        buffer.add("ghij");
        let chunk = buffer.next_chunk().unwrap();
        assert_eq!(chunk, b"abcdefghij");
        assert!(buffer.next_chunk().is_none());
    }

    #[test]
    fn test_chunk_bound_holds_for_all_but_final() {
        let mut buffer = StreamingBuffer::new(8);
        for _ in 0..50 {
            buffer.add("xy");
        }

        let mut chunks = Vec::new();
        while let Some(chunk) = buffer.next_chunk() {
            chunks.push(chunk);
        }
        chunks.extend(buffer.drain());

        let (last, full) = chunks.split_last().unwrap();
        for chunk in full {
            assert!(chunk.len() >= 8, "chunk below minimum: {}", chunk.len());
        }
        assert!(!last.is_empty());
        assert_eq!(
            chunks.iter().map(Vec::len).sum::<usize>(),
            100,
            "no bytes lost"
        );
    }

    #[test]
    fn test_drain_yields_remainder_once() {
        let mut buffer = StreamingBuffer::new(100);
        buffer.add("leftover");

        let chunks: Vec<_> = buffer.drain().collect();
        assert_eq!(chunks, vec![b"leftover".to_vec()]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_drain_never_yields_empty_chunk() {
        let mut buffer = StreamingBuffer::new(10);
        assert_eq!(buffer.drain().count(), 0);

        buffer.add("");
        assert_eq!(buffer.drain().count(), 0);
    }

    #[test]
    fn test_multibyte_fragments_stay_intact() {
        let mut buffer = StreamingBuffer::new(4);
        buffer.add("héllo");
        let chunks: Vec<_> = buffer.drain().collect();
        assert_eq!(chunks.len(), 1);
        assert_eq!(String::from_utf8(chunks[0].clone()).unwrap(), "héllo");
    }
}
