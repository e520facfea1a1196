//! A small recurring-timer wheel, ticked by the send thread's loop
//! (spec.md §5: "each iteration ticks the timer wheel, flushes the send
//! queue, and sleeps 1 ms at the tail").
//!
//! Redesigned per spec.md §9 away from a process-wide singleton timer
//! thread: a [`TimerWheel`] is owned by the session and lives only as long
//! as it does. Timers are named so the keep-alive, frame-stats and
//! key-frame-recovery call sites can register, cancel and recognize their
//! own firings without a layer of integer handles.

use std::time::{Duration, Instant};

struct NamedTimer {
    name: &'static str,
    interval: Duration,
    next_fire: Instant,
}

/// A set of independent recurring timers, advanced by a single `tick` call.
pub struct TimerWheel {
    timers: Vec<NamedTimer>,
}

impl TimerWheel {
    /// An empty wheel with no registered timers.
    #[must_use]
    pub fn new() -> Self {
        Self { timers: Vec::new() }
    }

    /// Register a recurring timer under `name`, first firing one interval
    /// from `now`. Replaces any existing timer with the same name.
    pub fn register(&mut self, name: &'static str, interval: Duration, now: Instant) {
        self.timers.retain(|timer| timer.name != name);
        self.timers.push(NamedTimer { name, interval, next_fire: now + interval });
    }

    /// Stop and remove the named timer, if registered.
    pub fn cancel(&mut self, name: &str) {
        self.timers.retain(|timer| timer.name != name);
    }

    /// True if `name` is currently registered.
    #[must_use]
    pub fn is_registered(&self, name: &str) -> bool {
        self.timers.iter().any(|timer| timer.name == name)
    }

    /// Advance the wheel to `now`, returning the names of every timer that
    /// fired (possibly more than once if `now` skipped multiple intervals —
    /// only one firing is reported per call, matching a wall-clock tick
    /// loop rather than a catch-up scheduler) and rescheduling each for its
    /// next interval.
    pub fn tick(&mut self, now: Instant) -> Vec<&'static str> {
        let mut fired = Vec::new();
        for timer in &mut self.timers {
            if timer.next_fire <= now {
                fired.push(timer.name);
                timer.next_fire = now + timer.interval;
            }
        }
        fired
    }
}

impl Default for TimerWheel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timer_fires_once_interval_has_elapsed() {
        let mut wheel = TimerWheel::new();
        let start = Instant::now();
        wheel.register("keep_alive", Duration::from_millis(10), start);

        assert!(wheel.tick(start).is_empty());
        assert_eq!(wheel.tick(start + Duration::from_millis(10)), vec!["keep_alive"]);
    }

    #[test]
    fn cancel_stops_future_firings() {
        let mut wheel = TimerWheel::new();
        let start = Instant::now();
        wheel.register("stats", Duration::from_millis(5), start);
        wheel.cancel("stats");
        assert!(wheel.tick(start + Duration::from_millis(100)).is_empty());
    }

    #[test]
    fn re_registering_resets_the_schedule() {
        let mut wheel = TimerWheel::new();
        let start = Instant::now();
        wheel.register("x", Duration::from_millis(10), start);
        wheel.register("x", Duration::from_millis(10), start + Duration::from_millis(5));
        assert!(wheel.tick(start + Duration::from_millis(10)).is_empty());
        assert_eq!(wheel.tick(start + Duration::from_millis(15)), vec!["x"]);
    }
}
