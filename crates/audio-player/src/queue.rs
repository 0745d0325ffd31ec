//! Bounded queue of interleaved `f32` samples between the decode thread and the output callback.
//!
//! The decode thread blocks when the queue is full; the output callback never blocks.
//! Seeking flushes the queue so stale audio is not heard after the jump.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard};

pub struct SharedAudio {
    channels: usize,
    max_buffered_samples: usize,
    inner: Mutex<SharedInner>,
    cv: Condvar,
}

struct SharedInner {
    queue: VecDeque<f32>,
    done: bool,
}

/// Queue capacity in samples for `buffer_seconds` of audio at `rate_hz`.
///
/// Non-finite or non-positive durations fall back to one second.
pub fn calc_max_buffered_samples(rate_hz: u32, channels: usize, buffer_seconds: f32) -> usize {
    let secs = if buffer_seconds.is_finite() && buffer_seconds > 0.0 {
        buffer_seconds
    } else {
        1.0
    };
    let frames = (rate_hz as f32 * secs).ceil() as usize;
    frames.saturating_mul(channels).max(channels)
}

impl SharedAudio {
    pub fn new(channels: usize, max_buffered_samples: usize) -> Self {
        let channels = channels.max(1);
        Self {
            channels,
            max_buffered_samples: max_buffered_samples.max(channels),
            inner: Mutex::new(SharedInner {
                queue: VecDeque::new(),
                done: false,
            }),
            cv: Condvar::new(),
        }
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    fn lock(&self) -> MutexGuard<'_, SharedInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn len_frames(&self) -> usize {
        self.lock().queue.len() / self.channels
    }

    /// Closed and fully played out.
    pub fn is_drained(&self) -> bool {
        let g = self.lock();
        g.done && g.queue.is_empty()
    }

    /// Mark the queue finished and wake a blocked producer. Idempotent.
    pub fn close(&self) {
        self.lock().done = true;
        self.cv.notify_all();
    }

    /// Drop everything buffered (used on seek).
    pub fn clear(&self) {
        self.lock().queue.clear();
        self.cv.notify_all();
    }

    /// Push samples, waiting for space while the queue is full.
    ///
    /// Returns `false` if the queue was closed before every sample was accepted.
    pub fn push_interleaved_blocking(&self, samples: &[f32]) -> bool {
        let mut offset = 0;
        while offset < samples.len() {
            let mut g = self.lock();
            while g.queue.len() >= self.max_buffered_samples && !g.done {
                g = self.cv.wait(g).unwrap_or_else(|e| e.into_inner());
            }
            if g.done {
                return false;
            }
            let room = self.max_buffered_samples - g.queue.len();
            let take = room.min(samples.len() - offset);
            g.queue.extend(&samples[offset..offset + take]);
            offset += take;
        }
        true
    }

    /// Take up to `max_frames` whole frames without waiting. `None` when nothing is buffered.
    pub fn pop_nonblocking(&self, max_frames: usize) -> Option<Vec<f32>> {
        let mut g = self.lock();
        let frames = (g.queue.len() / self.channels).min(max_frames);
        if frames == 0 {
            return None;
        }
        let out: Vec<f32> = g.queue.drain(..frames * self.channels).collect();
        drop(g);
        self.cv.notify_all();
        Some(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn calc_max_buffered_samples_fallbacks() {
        assert_eq!(calc_max_buffered_samples(48_000, 2, 2.0), 192_000);
        assert_eq!(calc_max_buffered_samples(48_000, 2, -1.0), 96_000);
        assert_eq!(calc_max_buffered_samples(48_000, 2, f32::NAN), 96_000);
    }

    #[test]
    fn pop_nonblocking_returns_whole_frames_only() {
        let q = SharedAudio::new(2, 64);
        assert!(q.push_interleaved_blocking(&[1.0, 2.0, 3.0, 4.0, 5.0]));
        let out = q.pop_nonblocking(8).unwrap();
        assert_eq!(out, vec![1.0, 2.0, 3.0, 4.0]);
        assert!(q.pop_nonblocking(8).is_none());
    }

    #[test]
    fn drained_requires_close_and_empty() {
        let q = SharedAudio::new(1, 8);
        q.push_interleaved_blocking(&[0.5]);
        q.close();
        assert!(!q.is_drained());
        q.pop_nonblocking(1);
        assert!(q.is_drained());
    }

    #[test]
    fn close_unblocks_full_producer() {
        let q = Arc::new(SharedAudio::new(1, 2));
        let producer = q.clone();
        let handle = thread::spawn(move || producer.push_interleaved_blocking(&[0.0; 8]));
        while q.len_frames() < 2 {
            thread::yield_now();
        }
        q.close();
        assert!(!handle.join().unwrap());
    }

    #[test]
    fn clear_makes_room_for_producer() {
        let q = Arc::new(SharedAudio::new(1, 2));
        let producer = q.clone();
        let handle = thread::spawn(move || producer.push_interleaved_blocking(&[1.0; 4]));
        while q.len_frames() < 2 {
            thread::yield_now();
        }
        q.clear();
        assert!(handle.join().unwrap());
        assert_eq!(q.len_frames(), 2);
    }
}
