//! Oscilloscope waveform trace.

use std::collections::VecDeque;

/// Scaled oscilloscope samples of the current acquisition.
///
/// The trace is cleared whenever new metadata arrives and holds at most
/// `capacity` samples; when full the oldest samples are discarded.
#[derive(Debug, Clone, PartialEq)]
pub struct WaveformTrace {
    samples: VecDeque<f32>,
    capacity: usize,
    sample_interval_ms: f32,
}

impl WaveformTrace {
    /// Create an empty trace.
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity.min(8192)),
            capacity,
            sample_interval_ms: 0.0,
        }
    }

    /// Maximum number of samples held.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of samples held.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Check if the trace is empty.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Check if the trace is at capacity.
    pub fn is_full(&self) -> bool {
        self.samples.len() >= self.capacity
    }

    /// Time between consecutive samples in milliseconds.
    pub fn sample_interval_ms(&self) -> f32 {
        self.sample_interval_ms
    }

    /// Drop all samples and set the sample interval of the next acquisition.
    pub fn reset(&mut self, sample_interval_ms: f32) {
        self.samples.clear();
        self.sample_interval_ms = sample_interval_ms;
    }

    /// Append a block of scaled samples.
    pub fn extend(&mut self, block: &[f32]) {
        if self.capacity == 0 {
            return;
        }
        for &value in block {
            if self.samples.len() == self.capacity {
                self.samples.pop_front();
            }
            self.samples.push_back(value);
        }
    }

    /// The samples, oldest first.
    pub fn samples(&self) -> Vec<f32> {
        self.samples.iter().copied().collect()
    }

    /// `(time_ms, value)` points, starting at time zero.
    pub fn points(&self) -> Vec<(f32, f32)> {
        self.samples
            .iter()
            .enumerate()
            .map(|(i, &v)| (i as f32 * self.sample_interval_ms, v))
            .collect()
    }

    /// Smallest and largest sample.
    pub fn min_max(&self) -> Option<(f32, f32)> {
        self.samples.iter().fold(None, |acc, &v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
    }
}
