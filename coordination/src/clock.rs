//! `Clock` and ID-generation abstractions (spec §6 external interfaces).
//!
//! The kernel never calls `Utc::now()`/`Instant::now()` or `Uuid::new_v4()`
//! directly outside this module — every timeout, timestamp, and identifier
//! goes through a `Clock`/`IdGenerator` so sessions are deterministically
//! replayable in tests. Mirrors the `TokenEstimator` trait pattern in the
//! teacher's `memory::budget` module: a small trait plus one production and
//! one test implementation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Abstracted wall-clock and monotonic-clock access.
pub trait Clock: Send + Sync {
    /// Current wall-clock time, used for timestamps placed on records.
    fn now_utc(&self) -> DateTime<Utc>;

    /// Current monotonic instant, used for timeout/elapsed-time arithmetic.
    fn now_monotonic(&self) -> Instant;
}

/// Production clock backed by the system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn now_monotonic(&self) -> Instant {
        Instant::now()
    }
}

/// Deterministic clock for tests: wall-clock time is fixed, monotonic time
/// advances only when [`FixedClock::advance`] is called.
#[derive(Debug)]
pub struct FixedClock {
    utc: std::sync::Mutex<DateTime<Utc>>,
    started: Instant,
    elapsed: std::sync::Mutex<Duration>,
}

impl FixedClock {
    pub fn new(utc: DateTime<Utc>) -> Self {
        Self {
            utc: std::sync::Mutex::new(utc),
            started: Instant::now(),
            elapsed: std::sync::Mutex::new(Duration::ZERO),
        }
    }

    /// Advance both the wall-clock and monotonic readings by `d`.
    pub fn advance(&self, d: Duration) {
        *self.utc.lock().unwrap() += chrono::Duration::from_std(d).unwrap_or_default();
        *self.elapsed.lock().unwrap() += d;
    }
}

impl Clock for FixedClock {
    fn now_utc(&self) -> DateTime<Utc> {
        *self.utc.lock().unwrap()
    }

    fn now_monotonic(&self) -> Instant {
        self.started + *self.elapsed.lock().unwrap()
    }
}

/// Abstracted ID generation (spec's `RandomUUID` collaborator).
pub trait IdGenerator: Send + Sync {
    fn new_id(&self) -> String;
}

/// Production generator: UUID v4.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn new_id(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

/// Deterministic generator for tests: monotonically increasing counter.
#[derive(Debug, Default)]
pub struct SequentialIdGenerator {
    next: AtomicU64,
}

impl IdGenerator for SequentialIdGenerator {
    fn new_id(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        format!("test-id-{n}")
    }
}
