//! The process-wide mutual exclusion gate.
//!
//! Both sync sessions hold an `Arc` to the same [`MutualExclusionGate`]. Every
//! crypto-boundary file operation runs while holding its single permit, so at
//! most one encrypt or decrypt is in flight across the whole process.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Mutex, MutexGuard};
use tracing::trace;

/// Counters describing how the gate has been used.
///
/// Thread-safe counters using atomic operations for lock-free updates.
#[derive(Debug, Default)]
pub struct GateMetrics {
    /// Total permits granted
    pub acquisitions: AtomicU64,

    /// Permits that had to wait for the other holder
    pub contended: AtomicU64,

    /// Total time spent waiting for the permit (nanoseconds)
    pub wait_time_ns: AtomicU64,

    /// Holders right now (0 or 1)
    pub current_holders: AtomicU64,

    /// Highest number of simultaneous holders ever observed
    pub max_holders: AtomicU64,
}

impl GateMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    fn record_acquired(&self, waited: Duration, contended: bool) {
        self.acquisitions.fetch_add(1, Ordering::Relaxed);
        if contended {
            self.contended.fetch_add(1, Ordering::Relaxed);
        }
        let nanos = u64::try_from(waited.as_nanos()).unwrap_or(u64::MAX);
        self.wait_time_ns.fetch_add(nanos, Ordering::Relaxed);

        let holders = self.current_holders.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_holders.fetch_max(holders, Ordering::SeqCst);
    }

    #[inline]
    fn record_released(&self) {
        self.current_holders.fetch_sub(1, Ordering::SeqCst);
    }

    /// Get current snapshot of metrics
    pub fn snapshot(&self) -> GateMetricsSnapshot {
        GateMetricsSnapshot {
            acquisitions: self.acquisitions.load(Ordering::Relaxed),
            contended: self.contended.load(Ordering::Relaxed),
            wait_time_ns: self.wait_time_ns.load(Ordering::Relaxed),
            current_holders: self.current_holders.load(Ordering::SeqCst),
            max_holders: self.max_holders.load(Ordering::SeqCst),
        }
    }
}

/// Point-in-time snapshot of gate metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateMetricsSnapshot {
    pub acquisitions: u64,
    pub contended: u64,
    pub wait_time_ns: u64,
    pub current_holders: u64,
    pub max_holders: u64,
}

impl GateMetricsSnapshot {
    /// Fraction of acquisitions that had to wait (0.0 to 1.0)
    pub fn contention_rate(&self) -> f64 {
        if self.acquisitions == 0 {
            0.0
        } else {
            self.contended as f64 / self.acquisitions as f64
        }
    }

    pub fn average_wait(&self) -> Duration {
        if self.acquisitions == 0 {
            Duration::ZERO
        } else {
            Duration::from_nanos(self.wait_time_ns / self.acquisitions)
        }
    }
}

/// Single-permit gate shared by both sessions.
///
/// Backed by a `parking_lot` mutex, whose eventual fairness keeps a waiting
/// session from starving while the other one keeps re-acquiring.
#[derive(Debug, Default)]
pub struct MutualExclusionGate {
    permit: Mutex<()>,
    metrics: GateMetrics,
}

/// Proof of holding the gate. The permit is returned when this is dropped,
/// including during unwinding.
#[must_use = "the gate is released as soon as the permit is dropped"]
pub struct GatePermit<'a> {
    _guard: MutexGuard<'a, ()>,
    metrics: &'a GateMetrics,
}

impl Drop for GatePermit<'_> {
    fn drop(&mut self) {
        // Runs before the guard field is dropped, so the holder count is back
        // to zero before anyone else can get in.
        self.metrics.record_released();
    }
}

impl MutualExclusionGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until the permit is free and take it.
    pub fn acquire(&self) -> GatePermit<'_> {
        let (guard, waited, contended) = match self.permit.try_lock() {
            Some(guard) => (guard, Duration::ZERO, false),
            None => {
                let start = Instant::now();
                let guard = self.permit.lock();
                (guard, start.elapsed(), true)
            }
        };
        self.metrics.record_acquired(waited, contended);
        trace!(contended, waited_us = waited.as_micros(), "Gate acquired");
        GatePermit {
            _guard: guard,
            metrics: &self.metrics,
        }
    }

    /// Take the permit without blocking, if it is free.
    pub fn try_acquire(&self) -> Option<GatePermit<'_>> {
        let guard = self.permit.try_lock()?;
        self.metrics.record_acquired(Duration::ZERO, false);
        Some(GatePermit {
            _guard: guard,
            metrics: &self.metrics,
        })
    }

    /// Run `f` while holding the permit.
    pub fn run_exclusive<T>(&self, f: impl FnOnce() -> T) -> T {
        let _permit = self.acquire();
        f()
    }

    pub fn metrics(&self) -> &GateMetrics {
        &self.metrics
    }
}
