//! Execution-duration sample.
//!
//! Moments (count/min/max/sum/variance) are exact running aggregates over
//! every recorded sample; percentiles come from a sliding window of the most
//! recent [`SAMPLE_WINDOW`] samples, sorted on read.

use std::collections::VecDeque;
use std::time::Duration;

pub(crate) const SAMPLE_WINDOW: usize = 1028;

pub(crate) struct ExecutionSample {
    count: u64,
    sum_nanos: u64,
    min_nanos: u64,
    max_nanos: u64,
    // Welford accumulators over milliseconds.
    mean_ms: f64,
    m2_ms: f64,
    window: VecDeque<u64>,
}

impl ExecutionSample {
    pub(crate) fn new() -> Self {
        Self {
            count: 0,
            sum_nanos: 0,
            min_nanos: u64::MAX,
            max_nanos: 0,
            mean_ms: 0.0,
            m2_ms: 0.0,
            window: VecDeque::with_capacity(SAMPLE_WINDOW),
        }
    }

    pub(crate) fn update(&mut self, duration: Duration) {
        let nanos = duration.as_nanos() as u64;
        self.count += 1;
        self.sum_nanos = self.sum_nanos.saturating_add(nanos);
        self.min_nanos = self.min_nanos.min(nanos);
        self.max_nanos = self.max_nanos.max(nanos);

        let ms = nanos as f64 / 1_000_000.0;
        let delta = ms - self.mean_ms;
        self.mean_ms += delta / self.count as f64;
        self.m2_ms += delta * (ms - self.mean_ms);

        if self.window.len() >= SAMPLE_WINDOW {
            self.window.pop_front();
        }
        self.window.push_back(nanos);
    }

    pub(crate) fn count(&self) -> u64 {
        self.count
    }

    pub(crate) fn min(&self) -> Duration {
        if self.count == 0 {
            Duration::ZERO
        } else {
            Duration::from_nanos(self.min_nanos)
        }
    }

    pub(crate) fn max(&self) -> Duration {
        Duration::from_nanos(self.max_nanos)
    }

    pub(crate) fn sum(&self) -> Duration {
        Duration::from_nanos(self.sum_nanos)
    }

    /// Sample variance in milliseconds squared.
    pub(crate) fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2_ms / (self.count - 1) as f64
        }
    }

    /// Sample standard deviation in milliseconds.
    pub(crate) fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    /// `percentile` is a fraction in [0.0, 1.0]; caller validates range.
    pub(crate) fn percentile(&self, percentile: f64) -> Duration {
        if self.window.is_empty() {
            return Duration::ZERO;
        }
        let mut sorted: Vec<u64> = self.window.iter().copied().collect();
        sorted.sort_unstable();
        let idx = ((sorted.len() as f64 * percentile).ceil() as usize)
            .saturating_sub(1)
            .min(sorted.len() - 1);
        Duration::from_nanos(sorted[idx])
    }
}
