//! Re-slices a fallible stream of byte buffers into fixed size chunks.

use std::collections::VecDeque;

/// Adapts an iterator of arbitrarily sized byte buffers into an iterator of
/// buffers of exactly `chunk_size` bytes, splitting incoming buffers wherever
/// a chunk boundary falls inside one.
///
/// When flushing is enabled (the [`ChunkedIterator::new`] default) any bytes
/// left over after the inner iterator is exhausted are emitted as one final
/// chunk, shorter than `chunk_size` but never empty. With flushing disabled
/// the remainder is discarded, which callers use when a trailing partial
/// chunk is staged for a later pass. An error from the inner iterator is
/// forwarded once and ends iteration.
#[derive(Debug)]
pub struct ChunkedIterator<I> {
    inner: I,
    chunk_size: usize,
    pending: VecDeque<Vec<u8>>,
    pending_len: usize,
    flush: bool,
    exhausted: bool,
    failed: bool,
}

impl<I> ChunkedIterator<I>
where
    I: Iterator<Item = eyre::Result<Vec<u8>>>,
{
    pub fn new(inner: I, chunk_size: usize) -> Self {
        Self::with_flush(inner, chunk_size, true)
    }

    pub fn with_flush(inner: I, chunk_size: usize, flush: bool) -> Self {
        assert!(chunk_size > 0, "chunk_size must be greater than zero");
        Self {
            inner,
            chunk_size,
            pending: VecDeque::new(),
            pending_len: 0,
            flush,
            exhausted: false,
            failed: false,
        }
    }

    /// Takes `min(chunk_size, pending_len)` bytes off the front of the
    /// pending buffers, splitting the buffer the boundary lands in.
    fn take_chunk(&mut self) -> Vec<u8> {
        let take = self.chunk_size.min(self.pending_len);
        let mut chunk = Vec::with_capacity(take);
        while chunk.len() < take {
            let Some(mut segment) = self.pending.pop_front() else {
                break;
            };
            let needed = take - chunk.len();
            if segment.len() > needed {
                let rest = segment.split_off(needed);
                self.pending.push_front(rest);
            }
            self.pending_len -= segment.len();
            chunk.append(&mut segment);
        }
        chunk
    }
}

impl<I> Iterator for ChunkedIterator<I>
where
    I: Iterator<Item = eyre::Result<Vec<u8>>>,
{
    type Item = eyre::Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        while self.pending_len < self.chunk_size && !self.exhausted {
            match self.inner.next() {
                Some(Ok(segment)) => {
                    if !segment.is_empty() {
                        self.pending_len += segment.len();
                        self.pending.push_back(segment);
                    }
                }
                Some(Err(error)) => {
                    self.failed = true;
                    return Some(Err(error));
                }
                None => self.exhausted = true,
            }
        }
        if self.pending_len == 0 || (self.pending_len < self.chunk_size && !self.flush) {
            self.pending.clear();
            self.pending_len = 0;
            return None;
        }
        Some(Ok(self.take_chunk()))
    }
}
