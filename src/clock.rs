//! Clock sources used to timestamp probes.
//!
//! RTT is always `receive - send` on the client's own clock, so only a
//! monotonic source is needed; no wall-clock synchronisation with the
//! server is ever attempted.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Instant;

/// Monotonic timestamp source with microsecond resolution.
pub trait Clock {
    /// Microseconds elapsed since an arbitrary, fixed origin.
    fn now_micros(&self) -> u64;
}

/// Clock backed by [`Instant`].
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_micros(&self) -> u64 {
        self.origin.elapsed().as_micros() as u64
    }
}

/// Clock that replays a fixed list of timestamps.
///
/// Once the script is exhausted the last timestamp is repeated, so a
/// measurement loop never observes time going backwards.
#[derive(Debug)]
pub struct ScriptedClock {
    ticks: Mutex<VecDeque<u64>>,
    last: Mutex<u64>,
}

impl ScriptedClock {
    pub fn new(ticks: impl IntoIterator<Item = u64>) -> Self {
        Self {
            ticks: Mutex::new(ticks.into_iter().collect()),
            last: Mutex::new(0),
        }
    }

    /// Number of timestamps not yet consumed.
    pub fn remaining(&self) -> usize {
        self.ticks.lock().map(|t| t.len()).unwrap_or(0)
    }
}

impl Clock for ScriptedClock {
    fn now_micros(&self) -> u64 {
        let next = self.ticks.lock().ok().and_then(|mut t| t.pop_front());
        let mut last = match self.last.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(tick) = next {
            *last = tick.max(*last);
        }
        *last
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_monotonic_clock_advances() {
        let clock = MonotonicClock::new();
        let a = clock.now_micros();
        thread::sleep(Duration::from_millis(2));
        let b = clock.now_micros();
        assert!(b > a);
    }

    #[test]
    fn test_scripted_clock_replays_in_order() {
        let clock = ScriptedClock::new([10, 25, 40]);
        assert_eq!(clock.now_micros(), 10);
        assert_eq!(clock.now_micros(), 25);
        assert_eq!(clock.remaining(), 1);
        assert_eq!(clock.now_micros(), 40);
    }

    #[test]
    fn test_scripted_clock_holds_last_value_when_exhausted() {
        let clock = ScriptedClock::new([7]);
        assert_eq!(clock.now_micros(), 7);
        assert_eq!(clock.now_micros(), 7);
        assert_eq!(clock.now_micros(), 7);
    }

    #[test]
    fn test_scripted_clock_never_goes_backwards() {
        let clock = ScriptedClock::new([50, 20]);
        assert_eq!(clock.now_micros(), 50);
        assert_eq!(clock.now_micros(), 50);
    }
}
