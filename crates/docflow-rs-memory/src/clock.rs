//! Clocks used to stamp entries at store time.

use chrono::{DateTime, Duration, SubsecRound, TimeZone, Utc};
use parking_lot::Mutex;

/// Source of store timestamps.
///
/// Implementations return instants truncated to microseconds, the precision
/// every backend persists.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now().trunc_subsecs(6)
    }
}

/// Manually driven clock for deterministic timestamps.
#[derive(Debug)]
pub struct ManualClock {
    current: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Start the clock at `start`.
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            current: Mutex::new(start.trunc_subsecs(6)),
        }
    }

    /// Current reading without advancing.
    pub fn current(&self) -> DateTime<Utc> {
        *self.current.lock()
    }

    pub fn set(&self, instant: DateTime<Utc>) {
        *self.current.lock() = instant.trunc_subsecs(6);
    }

    /// Move the clock forward by `step`.
    pub fn advance(&self, step: Duration) {
        let mut current = self.current.lock();
        *current = (*current + step).trunc_subsecs(6);
    }
}

impl Default for ManualClock {
    /// Starts at 2024-01-01T00:00:00Z.
    fn default() -> Self {
        let start = Utc
            .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
            .single()
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        Self::new(start)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.current()
    }
}
