//! Exponentially-weighted throughput meter.
//!
//! Rates are exponential-decay approximations of the 1/5/15-minute windows
//! (codahale-style: a 5-second tick interval folded in lazily on access),
//! not exact sliding windows. O(1) per mark.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

const TICK_INTERVAL: Duration = Duration::from_secs(5);
const TICK_SECS: f64 = 5.0;

struct Ewma {
    alpha: f64,
    rate: f64,
    uncounted: u64,
    initialized: bool,
}

impl Ewma {
    fn new(minutes: f64) -> Self {
        Self {
            alpha: 1.0 - (-TICK_SECS / 60.0 / minutes).exp(),
            rate: 0.0,
            uncounted: 0,
            initialized: false,
        }
    }

    fn update(&mut self, n: u64) {
        self.uncounted += n;
    }

    fn tick(&mut self) {
        let instant_rate = self.uncounted as f64 / TICK_SECS;
        self.uncounted = 0;
        if self.initialized {
            self.rate += self.alpha * (instant_rate - self.rate);
        } else {
            self.rate = instant_rate;
            self.initialized = true;
        }
    }

    /// Events per second.
    fn rate(&self) -> f64 {
        self.rate
    }
}

struct MeterInner {
    count: u64,
    last_tick: Instant,
    m1: Ewma,
    m5: Ewma,
    m15: Ewma,
}

impl MeterInner {
    fn tick_if_necessary(&mut self) {
        let elapsed = self.last_tick.elapsed();
        let ticks = (elapsed.as_nanos() / TICK_INTERVAL.as_nanos()) as u32;
        if ticks == 0 {
            return;
        }
        self.last_tick += TICK_INTERVAL * ticks;
        for _ in 0..ticks {
            self.m1.tick();
            self.m5.tick();
            self.m15.tick();
        }
    }
}

pub(crate) struct Meter {
    inner: Mutex<MeterInner>,
}

impl Meter {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(MeterInner {
                count: 0,
                last_tick: Instant::now(),
                m1: Ewma::new(1.0),
                m5: Ewma::new(5.0),
                m15: Ewma::new(15.0),
            }),
        }
    }

    fn lock_inner(&self) -> MutexGuard<'_, MeterInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn mark(&self) {
        let mut inner = self.lock_inner();
        inner.tick_if_necessary();
        inner.count += 1;
        inner.m1.update(1);
        inner.m5.update(1);
        inner.m15.update(1);
    }

    pub(crate) fn count(&self) -> u64 {
        self.lock_inner().count
    }

    pub(crate) fn rate1(&self) -> f64 {
        let mut inner = self.lock_inner();
        inner.tick_if_necessary();
        inner.m1.rate()
    }

    pub(crate) fn rate5(&self) -> f64 {
        let mut inner = self.lock_inner();
        inner.tick_if_necessary();
        inner.m5.rate()
    }

    pub(crate) fn rate15(&self) -> f64 {
        let mut inner = self.lock_inner();
        inner.tick_if_necessary();
        inner.m15.rate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meter_counts_marks() {
        let meter = Meter::new();
        for _ in 0..5 {
            meter.mark();
        }
        assert_eq!(meter.count(), 5);
    }

    #[test]
    fn test_fresh_meter_reports_zero_rate() {
        let meter = Meter::new();
        assert_eq!(meter.rate1(), 0.0);
        assert_eq!(meter.rate5(), 0.0);
        assert_eq!(meter.rate15(), 0.0);
    }

    #[test]
    fn test_decay_constants_are_ordered() {
        // A single tick after a burst decays the shortest window hardest on
        // the next empty tick, so alpha must shrink with the window.
        let m1 = Ewma::new(1.0);
        let m5 = Ewma::new(5.0);
        let m15 = Ewma::new(15.0);
        assert!(m1.alpha > m5.alpha);
        assert!(m5.alpha > m15.alpha);
    }

    #[test]
    fn test_rate_reflects_burst_after_tick() {
        let meter = Meter::new();
        {
            let mut inner = meter.lock_inner();
            inner.count += 100;
            inner.m1.update(100);
            inner.m1.tick();
        }
        // 100 events over one 5s tick = 20/s for the first sample.
        assert!((meter.lock_inner().m1.rate() - 20.0).abs() < f64::EPSILON);
    }
}
