//! # Rolling Baseline
//! Bounded history of recent per-location mention counts (default 12 samples).
//!
//! `observe` reports the median of the samples held *before* the new value is
//! taken in, so a burst is always compared against what came before it.
//! Zero counts are never stored: a quiet period must not drag the median
//! towards zero and make the next handful of mentions look like a spike.

use std::collections::VecDeque;

pub const DEFAULT_WINDOW: usize = 12;

#[derive(Debug, Clone)]
pub struct RollingBaseline {
    window: usize,
    /// Positive samples in arrival order, oldest at the front.
    samples: VecDeque<u32>,
}

impl Default for RollingBaseline {
    fn default() -> Self {
        Self::with_window(DEFAULT_WINDOW)
    }
}

impl RollingBaseline {
    pub fn with_window(window: usize) -> Self {
        Self {
            window,
            samples: VecDeque::with_capacity(window),
        }
    }

    /// Rebuild a baseline from persisted samples (oldest first). Extra samples
    /// beyond the window and non-positive values are dropped.
    pub fn from_samples(window: usize, samples: impl IntoIterator<Item = u32>) -> Self {
        let mut b = Self::with_window(window);
        for s in samples {
            b.push(s);
        }
        b
    }

    /// Return the median of prior samples, then record `value` if positive.
    pub fn observe(&mut self, value: u32) -> f64 {
        let baseline = self.median();
        self.push(value);
        baseline
    }

    pub fn median(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let mut data: Vec<u32> = self.samples.iter().copied().collect();
        data.sort_unstable();
        let mid = data.len() / 2;
        if data.len() % 2 == 1 {
            f64::from(data[mid])
        } else {
            (f64::from(data[mid - 1]) + f64::from(data[mid])) / 2.0
        }
    }

    pub fn samples(&self) -> Vec<u32> {
        self.samples.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    fn push(&mut self, value: u32) {
        if value == 0 || self.window == 0 {
            return;
        }
        if self.samples.len() == self.window {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
    }
}
