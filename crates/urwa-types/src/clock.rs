//! Millisecond clock abstraction.
//!
//! Time-driven state machines (circuit cooldowns, cost windows) read time
//! through this trait so tests can drive transitions deterministically.
//! Nothing persists these values, so the production clock is monotonic
//! and process-relative rather than wall time: cooldowns and sliding
//! windows only ever compare differences, and a monotonic source cannot
//! jump backwards under NTP adjustments.

use std::sync::OnceLock;
use std::time::Instant;

pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Milliseconds elapsed on this clock. Only differences are
    /// meaningful; the zero point is implementation-defined.
    fn now_ms(&self) -> u64;
}

fn process_epoch() -> Instant {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    *EPOCH.get_or_init(Instant::now)
}

/// Monotonic clock counting milliseconds since the process first read it.
#[derive(Debug, Default)]
pub struct RealClock;

impl Clock for RealClock {
    fn now_ms(&self) -> u64 {
        let elapsed = process_epoch().elapsed().as_millis();
        elapsed.min(u64::MAX as u128) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn real_clock_is_monotonic() {
        let clock = RealClock;
        let a = clock.now_ms();
        let b = clock.now_ms();
        assert!(b >= a);
    }

    #[test]
    fn real_clock_measures_elapsed_time() {
        let clock = RealClock;
        let before = clock.now_ms();
        std::thread::sleep(std::time::Duration::from_millis(15));
        let after = clock.now_ms();
        assert!(after - before >= 10);
    }
}
