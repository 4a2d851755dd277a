//! Time-gated caching of controller metrics.
//!
//! Limits set by an orchestrator rarely change after container start, but may be
//! resized at runtime. Metrics are therefore re-read at most once per grace
//! interval instead of on every query.
//!
//! Values live in relaxed atomics. Concurrent callers may observe a stale value or
//! read the same file twice; neither needs a lock.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, Instant};

use super::UNKNOWN;

/// Source of monotonic time, in nanoseconds.
pub trait Clock: fmt::Debug + Send + Sync {
    fn now_nanos(&self) -> i64;
}

/// [`Clock`] backed by [`Instant`], counting from its creation.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Clock for MonotonicClock {
    fn now_nanos(&self) -> i64 {
        i64::try_from(self.origin.elapsed().as_nanos()).unwrap_or(i64::MAX)
    }
}

/// Clock that only moves when told to.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct ManualClock(AtomicI64);

#[cfg(test)]
impl ManualClock {
    pub(crate) fn advance(&self, by: Duration) {
        self.0.fetch_add(duration_nanos(by), Ordering::Relaxed);
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now_nanos(&self) -> i64 {
        self.0.load(Ordering::Relaxed)
    }
}

fn duration_nanos(duration: Duration) -> i64 {
    i64::try_from(duration.as_nanos()).unwrap_or(i64::MAX)
}

/// The last observed value of a metric and the time it has to be re-read.
#[derive(Debug)]
pub struct CachedMetric {
    value: AtomicI64,
    next_check: AtomicI64,
    clock: Arc<dyn Clock>,
}

impl CachedMetric {
    /// A metric with an [`UNKNOWN`] value that must be checked immediately.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            value: AtomicI64::new(UNKNOWN),
            next_check: AtomicI64::new(i64::MIN),
            clock,
        }
    }

    /// Returns true once the grace interval of the last [`set_value`](Self::set_value) elapsed.
    pub fn should_check(&self) -> bool {
        self.clock.now_nanos() > self.next_check.load(Ordering::Relaxed)
    }

    pub fn value(&self) -> i64 {
        self.value.load(Ordering::Relaxed)
    }

    /// Stores `value` and defers the next check by `timeout`.
    pub fn set_value(&self, value: i64, timeout: Duration) {
        self.value.store(value, Ordering::Relaxed);
        let deadline = self
            .clock
            .now_nanos()
            .saturating_add(duration_nanos(timeout));
        self.next_check.store(deadline, Ordering::Relaxed);
    }
}

/// A controller together with the cache of its headline metric.
#[derive(Debug)]
pub struct CachingController<T> {
    controller: T,
    metrics_cache: CachedMetric,
    timeout: Duration,
}

impl<T> CachingController<T> {
    pub fn new(controller: T, clock: Arc<dyn Clock>, timeout: Duration) -> Self {
        Self {
            controller,
            metrics_cache: CachedMetric::new(clock),
            timeout,
        }
    }

    pub fn controller(&self) -> &T {
        &self.controller
    }

    pub fn metrics_cache(&self) -> &CachedMetric {
        &self.metrics_cache
    }

    /// Returns the cached value, calling `read` first if the cache is due for a check.
    pub fn cached(&self, read: impl FnOnce(&T) -> i64) -> i64 {
        if !self.metrics_cache.should_check() {
            return self.metrics_cache.value();
        }

        let value = read(&self.controller);
        self.metrics_cache.set_value(value, self.timeout);
        value
    }
}
