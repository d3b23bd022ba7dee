//! Bounded circular byte buffer
//!
//! Decouples the cadence of raw USB reads from the cadence of protocol
//! parsing: the reader task appends whatever chunk the hardware produced,
//! the frame parser consumes exactly the bytes each message needs. Single
//! producer, single consumer; the index state is mutex-guarded and both
//! sides wake each other through condition variables instead of sleeping
//! blind.
//!
//! Overflow policy: `write` copies what fits and returns the count, so a
//! producer that outruns the consumer blocks (via [`RingBuffer::wait_writable`])
//! rather than dropping bytes.

use std::time::Duration;

use parking_lot::{Condvar, Mutex};

struct Inner {
    buf: Box<[u8]>,
    /// Read position
    head: usize,
    /// Number of buffered bytes; write position is `(head + len) % capacity`
    len: usize,
}

/// Bounded circular byte queue
pub struct RingBuffer {
    inner: Mutex<Inner>,
    readable: Condvar,
    writable: Condvar,
}

impl RingBuffer {
    /// Create a ring with the given capacity in bytes
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "ring capacity must be non-zero");
        Self {
            inner: Mutex::new(Inner {
                buf: vec![0u8; capacity].into_boxed_slice(),
                head: 0,
                len: 0,
            }),
            readable: Condvar::new(),
            writable: Condvar::new(),
        }
    }

    /// Total capacity in bytes
    pub fn capacity(&self) -> usize {
        self.inner.lock().buf.len()
    }

    /// Number of buffered bytes
    pub fn len(&self) -> usize {
        self.inner.lock().len
    }

    /// Whether the buffer holds no bytes
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append as many of `bytes` as fit, returning the count written
    ///
    /// Never blocks and never drops: a short count tells the producer to
    /// wait for space and offer the remainder again.
    pub fn write(&self, bytes: &[u8]) -> usize {
        let mut inner = self.inner.lock();
        let cap = inner.buf.len();
        let n = bytes.len().min(cap - inner.len);
        if n == 0 {
            return 0;
        }
        let write_pos = (inner.head + inner.len) % cap;
        let first = n.min(cap - write_pos);
        inner.buf[write_pos..write_pos + first].copy_from_slice(&bytes[..first]);
        inner.buf[..n - first].copy_from_slice(&bytes[first..n]);
        inner.len += n;
        drop(inner);
        self.readable.notify_one();
        n
    }

    /// Pop up to `out.len()` bytes, returning the count read
    pub fn read(&self, out: &mut [u8]) -> usize {
        let mut inner = self.inner.lock();
        let cap = inner.buf.len();
        let n = out.len().min(inner.len);
        if n == 0 {
            return 0;
        }
        let head = inner.head;
        let first = n.min(cap - head);
        out[..first].copy_from_slice(&inner.buf[head..head + first]);
        out[first..n].copy_from_slice(&inner.buf[..n - first]);
        inner.head = (head + n) % cap;
        inner.len -= n;
        drop(inner);
        self.writable.notify_one();
        n
    }

    /// Pop a single byte
    pub fn read_byte(&self) -> Option<u8> {
        let mut byte = [0u8; 1];
        if self.read(&mut byte) == 1 {
            Some(byte[0])
        } else {
            None
        }
    }

    /// Wait until at least `min` bytes are buffered, up to `timeout`
    ///
    /// Returns whether the condition holds on return. The wait is bounded so
    /// callers can re-check their shutdown flag.
    pub fn wait_readable(&self, min: usize, timeout: Duration) -> bool {
        let mut inner = self.inner.lock();
        if inner.len >= min {
            return true;
        }
        self.readable.wait_for(&mut inner, timeout);
        inner.len >= min
    }

    /// Wait until at least one byte of space is free, up to `timeout`
    pub fn wait_writable(&self, timeout: Duration) -> bool {
        let mut inner = self.inner.lock();
        if inner.len < inner.buf.len() {
            return true;
        }
        self.writable.wait_for(&mut inner, timeout);
        inner.len < inner.buf.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_write_then_read() {
        let ring = RingBuffer::with_capacity(16);
        assert_eq!(ring.write(&[1, 2, 3, 4]), 4);
        assert_eq!(ring.len(), 4);
        let mut out = [0u8; 4];
        assert_eq!(ring.read(&mut out), 4);
        assert_eq!(out, [1, 2, 3, 4]);
        assert!(ring.is_empty());
    }

    #[test]
    fn test_wrap_around() {
        let ring = RingBuffer::with_capacity(8);
        assert_eq!(ring.write(&[0; 6]), 6);
        let mut sink = [0u8; 6];
        assert_eq!(ring.read(&mut sink), 6);
        // Write spans the physical end of the buffer
        assert_eq!(ring.write(&[1, 2, 3, 4, 5]), 5);
        let mut out = [0u8; 5];
        assert_eq!(ring.read(&mut out), 5);
        assert_eq!(out, [1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_full_ring_reports_short_write() {
        let ring = RingBuffer::with_capacity(4);
        assert_eq!(ring.write(&[1, 2, 3, 4, 5, 6]), 4);
        assert_eq!(ring.write(&[7]), 0);
        let mut out = [0u8; 2];
        assert_eq!(ring.read(&mut out), 2);
        assert_eq!(out, [1, 2]);
        // Space freed by the read is usable again
        assert_eq!(ring.write(&[7, 8, 9]), 2);
    }

    #[test]
    fn test_read_byte() {
        let ring = RingBuffer::with_capacity(4);
        assert_eq!(ring.read_byte(), None);
        ring.write(&[0xAB]);
        assert_eq!(ring.read_byte(), Some(0xAB));
        assert_eq!(ring.read_byte(), None);
    }

    #[test]
    fn test_wait_readable_wakes_on_write() {
        let ring = Arc::new(RingBuffer::with_capacity(16));
        let producer = {
            let ring = Arc::clone(&ring);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(10));
                ring.write(&[1, 2, 3]);
            })
        };
        let mut ready = false;
        for _ in 0..200 {
            if ring.wait_readable(3, Duration::from_millis(5)) {
                ready = true;
                break;
            }
        }
        producer.join().unwrap();
        assert!(ready);
        assert_eq!(ring.len(), 3);
    }

    #[test]
    fn test_wait_writable_wakes_on_read() {
        let ring = Arc::new(RingBuffer::with_capacity(4));
        ring.write(&[0; 4]);
        assert!(!ring.wait_writable(Duration::from_millis(5)));
        let consumer = {
            let ring = Arc::clone(&ring);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(10));
                let mut out = [0u8; 2];
                ring.read(&mut out);
            })
        };
        let mut writable = false;
        for _ in 0..200 {
            if ring.wait_writable(Duration::from_millis(5)) {
                writable = true;
                break;
            }
        }
        consumer.join().unwrap();
        assert!(writable);
    }
}
