//! Rolling sample windows
//!
//! A [`SampleWindow`] keeps the newest `capacity` samples of one metric in
//! arrival order. Section timings and frame intervals both live in one.

use std::collections::VecDeque;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct SampleWindow<T> {
    samples: VecDeque<T>,
    capacity: usize,
}

impl<T: Copy> SampleWindow<T> {
    /// A window of at least one sample
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn record(&mut self, sample: T) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn latest(&self) -> Option<T> {
        self.samples.back().copied()
    }

    /// Oldest first
    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        self.samples.iter().copied()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl SampleWindow<Duration> {
    /// Zero when empty
    pub fn mean(&self) -> Duration {
        match self.samples.len() {
            0 => Duration::ZERO,
            n => self.iter().sum::<Duration>() / n as u32,
        }
    }

    /// (shortest, longest); zeros when empty
    pub fn range(&self) -> (Duration, Duration) {
        self.iter().fold(None, |acc, d| match acc {
            None => Some((d, d)),
            Some((lo, hi)) => Some((lo.min(d), hi.max(d))),
        })
        .unwrap_or_default()
    }
}

impl SampleWindow<f64> {
    pub fn mean(&self) -> f64 {
        match self.samples.len() {
            0 => 0.0,
            n => self.iter().sum::<f64>() / n as f64,
        }
    }
}
