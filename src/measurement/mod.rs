// src/measurement/mod.rs

//! Sample data model and the per-device sample buffer.

use parking_lot::Mutex;

pub mod sample;

pub use sample::{host_time_s, Sample, SampleKind};

/// Unbounded append-only sample queue shared between a transport's
/// notification context (producer) and the acquisition loop (consumer).
///
/// Uses a synchronous `parking_lot` mutex: the producer is a transport
/// callback that may run outside any async executor, and the lock is only
/// ever held for a single push or for swapping the vector out. Never hold it
/// across I/O or a sleep.
#[derive(Debug, Default)]
pub struct SampleBuffer {
    samples: Mutex<Vec<Sample>>,
}

impl SampleBuffer {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one sample.
    pub fn push(&self, sample: Sample) {
        self.samples.lock().push(sample);
    }

    /// Removes and returns everything accumulated since the last drain, in
    /// arrival order.
    pub fn drain(&self) -> Vec<Sample> {
        std::mem::take(&mut *self.samples.lock())
    }

    /// Number of samples currently buffered.
    pub fn len(&self) -> usize {
        self.samples.lock().len()
    }

    /// Returns true if nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn drain_empties_and_preserves_order() {
        let buffer = SampleBuffer::new();
        for i in 0..5 {
            buffer.push(Sample::gyro(f64::from(i), [0.0; 3]));
        }
        let drained = buffer.drain();
        assert_eq!(drained.len(), 5);
        assert!(drained
            .windows(2)
            .all(|w| w[0].timestamp_s < w[1].timestamp_s));
        assert!(buffer.is_empty());
        assert!(buffer.drain().is_empty());
    }

    #[test]
    fn concurrent_push_and_drain_lose_nothing() {
        const PRODUCERS: usize = 4;
        const PER_PRODUCER: usize = 5_000;

        let buffer = Arc::new(SampleBuffer::new());
        let producers: Vec<_> = (0..PRODUCERS)
            .map(|p| {
                let buffer = buffer.clone();
                std::thread::spawn(move || {
                    for i in 0..PER_PRODUCER {
                        let id = (p * PER_PRODUCER + i) as f64;
                        buffer.push(Sample::gyro(id, [0.0; 3]));
                    }
                })
            })
            .collect();

        let mut seen = Vec::new();
        while producers.iter().any(|h| !h.is_finished()) {
            seen.extend(buffer.drain());
        }
        for handle in producers {
            handle.join().unwrap();
        }
        seen.extend(buffer.drain());

        let mut ids: Vec<usize> = seen.iter().map(|s| s.timestamp_s as usize).collect();
        ids.sort_unstable();
        let expected: Vec<usize> = (0..PRODUCERS * PER_PRODUCER).collect();
        assert_eq!(ids, expected);
    }
}
