//! Raw byte ring buffer
//!
//! Fixed-capacity FIFO used to copy samples between two layouts when the
//! format of one side is unknown: the producer serializes samples into the
//! queue, the consumer drains them into the destination descriptors.

/// Fixed-capacity FIFO of bytes
#[derive(Debug, Clone)]
pub struct ByteQueue {
    buf: Vec<u8>,
    head: usize,
    len: usize,
}

impl ByteQueue {
    /// Create a queue holding at most `capacity` bytes
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: vec![0; capacity],
            head: 0,
            len: 0,
        }
    }

    /// Maximum number of queued bytes
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Number of queued bytes
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether nothing is queued
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Free space in bytes
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.capacity() - self.len
    }

    /// Grow the queue so it can hold at least `capacity` bytes
    ///
    /// Queued bytes are preserved in order.
    pub fn reserve(&mut self, capacity: usize) {
        if capacity <= self.capacity() {
            return;
        }
        let mut buf = vec![0; capacity];
        let queued = self.len;
        self.pop_into(&mut buf[..queued]);
        self.buf = buf;
        self.head = 0;
        self.len = queued;
    }

    /// Append one byte; returns `false` when full
    pub fn push(&mut self, byte: u8) -> bool {
        if self.len == self.capacity() {
            return false;
        }
        let tail = (self.head + self.len) % self.capacity();
        self.buf[tail] = byte;
        self.len += 1;
        true
    }

    /// Append as many bytes of `src` as fit; returns the number written
    pub fn push_slice(&mut self, src: &[u8]) -> usize {
        let count = src.len().min(self.remaining());
        for &byte in &src[..count] {
            let tail = (self.head + self.len) % self.capacity();
            self.buf[tail] = byte;
            self.len += 1;
        }
        count
    }

    /// Remove the oldest byte
    pub fn pop(&mut self) -> Option<u8> {
        if self.len == 0 {
            return None;
        }
        let byte = self.buf[self.head];
        self.head = (self.head + 1) % self.capacity();
        self.len -= 1;
        Some(byte)
    }

    /// Fill `dst` from the front of the queue; returns the number copied
    pub fn pop_into(&mut self, dst: &mut [u8]) -> usize {
        let count = dst.len().min(self.len);
        for slot in &mut dst[..count] {
            *slot = self.buf[self.head];
            self.head = (self.head + 1) % self.capacity();
        }
        self.len -= count;
        count
    }

    /// Drop all queued bytes
    pub fn clear(&mut self) {
        self.head = 0;
        self.len = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let mut queue = ByteQueue::with_capacity(4);
        assert!(queue.push(1));
        assert!(queue.push(2));
        assert_eq!(queue.pop(), Some(1));
        assert!(queue.push(3));
        assert!(queue.push(4));
        assert!(queue.push(5));
        assert!(!queue.push(6));
        assert_eq!(queue.len(), 4);

        let mut out = [0u8; 4];
        assert_eq!(queue.pop_into(&mut out), 4);
        assert_eq!(out, [2, 3, 4, 5]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_push_slice_partial() {
        let mut queue = ByteQueue::with_capacity(3);
        assert_eq!(queue.push_slice(&[9, 8, 7, 6]), 3);
        assert_eq!(queue.remaining(), 0);
        assert_eq!(queue.pop(), Some(9));
    }

    #[test]
    fn test_reserve_keeps_order_across_wrap() {
        let mut queue = ByteQueue::with_capacity(3);
        queue.push_slice(&[1, 2, 3]);
        queue.pop();
        queue.push(4);
        queue.reserve(8);
        assert_eq!(queue.capacity(), 8);
        queue.push(5);

        let mut out = [0u8; 4];
        queue.pop_into(&mut out);
        assert_eq!(out, [2, 3, 4, 5]);
    }

    #[test]
    fn test_clear() {
        let mut queue = ByteQueue::with_capacity(2);
        queue.push(1);
        queue.clear();
        assert_eq!(queue.pop(), None);
    }
}
