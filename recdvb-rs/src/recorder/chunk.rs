//! Captured data in flight between the DVR reader and the output writer.

use std::collections::VecDeque;

use bytes::Bytes;
use parking_lot::Mutex;

/// One read's worth of transport stream bytes.
///
/// The content is fixed at creation; only the write offset moves.
#[derive(Debug, Clone)]
pub struct Chunk {
    data: Bytes,
    offset: usize,
}

impl Chunk {
    pub fn new(data: Bytes) -> Self {
        Self { data, offset: 0 }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Bytes not yet handed to the sink.
    pub fn unwritten(&self) -> &[u8] {
        &self.data[self.offset..]
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn advance(&mut self, written: usize) {
        self.offset = (self.offset + written).min(self.data.len());
    }

    pub fn is_written(&self) -> bool {
        self.offset >= self.data.len()
    }
}

/// FIFO of chunks shared by the reader and the writer.
///
/// Unbounded: a sink slower than the device makes it grow without limit.
/// The deepest point reached is tracked so it can be reported.
#[derive(Debug, Default)]
pub struct ChunkQueue {
    inner: Mutex<QueueState>,
}

#[derive(Debug, Default)]
struct QueueState {
    chunks: VecDeque<Chunk>,
    peak: usize,
}

impl ChunkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, chunk: Chunk) {
        let mut state = self.inner.lock();
        state.chunks.push_back(chunk);
        state.peak = state.peak.max(state.chunks.len());
    }

    /// Take the oldest chunk out for writing.
    pub fn pop(&self) -> Option<Chunk> {
        self.inner.lock().chunks.pop_front()
    }

    /// Put a partially written chunk back at the head.
    pub fn requeue(&self, chunk: Chunk) {
        self.inner.lock().chunks.push_front(chunk);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().chunks.is_empty()
    }

    pub fn peak_depth(&self) -> usize {
        self.inner.lock().peak
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_offset() {
        let mut chunk = Chunk::new(Bytes::from_static(b"0123456789"));
        assert_eq!(chunk.len(), 10);
        chunk.advance(4);
        assert_eq!(chunk.unwritten(), b"456789");
        assert_eq!(chunk.offset(), 4);
        assert!(!chunk.is_written());
        chunk.advance(100);
        assert!(chunk.is_written());
        assert!(chunk.unwritten().is_empty());
    }

    #[test]
    fn test_queue_order_and_peak() {
        let queue = ChunkQueue::new();
        queue.push(Chunk::new(Bytes::from_static(b"a")));
        queue.push(Chunk::new(Bytes::from_static(b"b")));
        queue.push(Chunk::new(Bytes::from_static(b"c")));

        let mut head = queue.pop().unwrap();
        assert_eq!(head.unwritten(), b"a");
        head.advance(0);
        queue.requeue(head);
        assert_eq!(queue.pop().unwrap().unwritten(), b"a");
        assert_eq!(queue.pop().unwrap().unwritten(), b"b");

        queue.push(Chunk::new(Bytes::from_static(b"d")));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.peak_depth(), 3);
        assert_eq!(queue.pop().unwrap().unwritten(), b"c");
        assert_eq!(queue.pop().unwrap().unwritten(), b"d");
        assert!(queue.is_empty());
    }
}
