//! SPSC sample ring between the mixer thread and the device callback
//!
//! The producer side blocks: [`RingBuffer::put`] returns only once the whole
//! block is committed, which is the engine's one and only pacing mechanism —
//! the device callback's consumption rate is the schedule, no other clock
//! exists. The consumer side never blocks: [`RingBuffer::take`] hands out
//! whatever is buffered and zero-fills the rest, so an underflow is heard as
//! silence, never felt as a stall in the callback.
//!
//! Samples are interleaved stereo [L, R, L, R, ...]; writes and reads are
//! ordered, so consumed audio is always a prefix of produced audio.

use std::sync::{Condvar, Mutex};

struct Inner {
    buf: Box<[f32]>,
    read: usize,
    write: usize,
    count: usize,
}

impl Inner {
    fn free(&self) -> usize {
        self.buf.len() - self.count
    }
}

/// Bounded single-producer single-consumer f32 ring buffer.
///
/// Shared via `Arc` between the mixer thread (producer), the audio callback
/// (consumer) and the facade (which only ever calls [`clear`](Self::clear)
/// while shutting the producer down).
pub struct RingBuffer {
    inner: Mutex<Inner>,
    not_full: Condvar,
}

impl RingBuffer {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring buffer capacity must be non-zero");
        Self {
            inner: Mutex::new(Inner {
                buf: vec![0.0; capacity].into_boxed_slice(),
                read: 0,
                write: 0,
                count: 0,
            }),
            not_full: Condvar::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().unwrap().buf.len()
    }

    /// Number of samples currently buffered.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().count
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy all of `src` into the buffer, blocking until it fits.
    ///
    /// No partial writes: either the whole block is committed or the caller
    /// is still waiting. `src` must not exceed the capacity.
    pub fn put(&self, src: &[f32]) {
        let mut inner = self.inner.lock().unwrap();
        assert!(
            src.len() <= inner.buf.len(),
            "block of {} exceeds ring capacity {}",
            src.len(),
            inner.buf.len()
        );

        while inner.free() < src.len() {
            inner = self.not_full.wait(inner).unwrap();
        }

        let cap = inner.buf.len();
        let write = inner.write;
        let first = src.len().min(cap - write);
        inner.buf[write..write + first].copy_from_slice(&src[..first]);
        inner.buf[..src.len() - first].copy_from_slice(&src[first..]);
        inner.write = (write + src.len()) % cap;
        inner.count += src.len();
    }

    /// Fill `dst` without blocking: buffered samples first, zeros for the
    /// remainder. Runs on the audio callback thread; the critical section is
    /// a bounded memcpy.
    pub fn take(&self, dst: &mut [f32]) {
        let mut inner = self.inner.lock().unwrap();

        let n = dst.len().min(inner.count);
        let cap = inner.buf.len();
        let read = inner.read;
        let first = n.min(cap - read);
        dst[..first].copy_from_slice(&inner.buf[read..read + first]);
        dst[first..n].copy_from_slice(&inner.buf[..n - first]);
        inner.read = (read + n) % cap;
        inner.count -= n;

        dst[n..].fill(0.0);

        drop(inner);
        self.not_full.notify_one();
    }

    /// Drop all buffered samples and wake a blocked producer.
    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.read = 0;
        inner.write = 0;
        inner.count = 0;
        drop(inner);
        self.not_full.notify_all();
    }
}
