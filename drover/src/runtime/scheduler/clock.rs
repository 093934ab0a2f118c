//! Simulation clock: frame counter, simulated time, pause flag and run target.
//!
//! Simulated time is kept in whole nanoseconds so a run of `n` periods lands
//! exactly on `n * period` and time deadlines compare without rounding drift.

use std::time::Duration;

/// A deadline at which the stepping loop re-pauses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunTarget {
    /// Simulated-time deadline in nanoseconds since start.
    Time { deadline_ns: u64 },
    /// Absolute frame number.
    Frames { until: u64 },
}

/// Clock state, created when the scheduler starts and dropped when it stops.
#[derive(Debug, Clone, Default)]
pub struct SimulationClock {
    frame: u64,
    sim_time_ns: u64,
    paused: bool,
    target: Option<RunTarget>,
    /// Id of the most recently issued run.
    run_id: u64,
    /// Highest run id known to have finished.
    completed_run: u64,
}

/// Outcome of one [`SimulationClock::advance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    /// Paused; nothing moved.
    Held,
    Stepped,
    /// Stepped and hit the run target; the clock is paused again.
    TargetReached,
}

impl SimulationClock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn frame(&self) -> u64 {
        self.frame
    }

    #[must_use]
    pub const fn sim_time(&self) -> Duration {
        Duration::from_nanos(self.sim_time_ns)
    }

    #[must_use]
    pub const fn is_paused(&self) -> bool {
        self.paused
    }

    #[must_use]
    pub const fn target(&self) -> Option<RunTarget> {
        self.target
    }

    /// Sets the pause flag.
    ///
    /// Pausing abandons any outstanding run target and counts it as finished,
    /// so a blocked caller is released instead of waiting on a paused clock.
    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
        if paused && self.target.take().is_some() {
            self.completed_run = self.run_id;
        }
    }

    /// Unpauses toward `target`, replacing any outstanding target. Returns
    /// the run id to wait on.
    pub fn begin_run(&mut self, target: RunTarget) -> u64 {
        self.run_id += 1;
        self.target = Some(target);
        self.paused = false;
        self.run_id
    }

    /// Target `seconds` of simulated time from now.
    pub fn begin_time_run(&mut self, seconds: f64) -> u64 {
        // Saturating float-to-int cast; negative and NaN become zero.
        let span = (seconds * 1e9).round() as u64;
        let deadline_ns = self.sim_time_ns.saturating_add(span);
        self.begin_run(RunTarget::Time { deadline_ns })
    }

    /// Target `frames` more ticks.
    pub fn begin_frame_run(&mut self, frames: u32) -> u64 {
        let until = self.frame + u64::from(frames);
        self.begin_run(RunTarget::Frames { until })
    }

    /// Whether run `id` (or a run that superseded it) has finished.
    #[must_use]
    pub const fn run_finished(&self, id: u64) -> bool {
        self.completed_run >= id
    }

    /// Advances one tick of `period` unless paused.
    pub fn advance(&mut self, period: Duration) -> Advance {
        if self.paused {
            return Advance::Held;
        }
        self.frame += 1;
        let period_ns = u64::try_from(period.as_nanos()).unwrap_or(u64::MAX);
        self.sim_time_ns = self.sim_time_ns.saturating_add(period_ns);

        let reached = match self.target {
            Some(RunTarget::Time { deadline_ns }) => self.sim_time_ns >= deadline_ns,
            Some(RunTarget::Frames { until }) => self.frame >= until,
            None => false,
        };
        if reached {
            self.target = None;
            self.paused = true;
            self.completed_run = self.run_id;
            Advance::TargetReached
        } else {
            Advance::Stepped
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PERIOD: Duration = Duration::from_millis(3);

    #[test]
    fn paused_clock_does_not_move() {
        let mut clock = SimulationClock::new();
        clock.set_paused(true);
        assert_eq!(clock.advance(PERIOD), Advance::Held);
        assert_eq!(clock.frame(), 0);
        assert_eq!(clock.sim_time(), Duration::ZERO);
    }

    #[test]
    fn frame_run_stops_exactly_on_target() {
        let mut clock = SimulationClock::new();
        for _ in 0..100 {
            clock.advance(PERIOD);
        }
        clock.set_paused(true);

        let id = clock.begin_frame_run(5);
        let mut ticks = 0;
        while clock.advance(PERIOD) != Advance::TargetReached {
            ticks += 1;
        }
        assert_eq!(ticks + 1, 5);
        assert_eq!(clock.frame(), 105);
        assert!(clock.is_paused());
        assert!(clock.run_finished(id));
        assert_eq!(clock.target(), None);
    }

    #[test]
    fn time_run_pauses_on_first_tick_past_deadline() {
        let mut clock = SimulationClock::new();
        clock.begin_time_run(0.010);
        let mut ticks = 0;
        while clock.advance(PERIOD) != Advance::TargetReached {
            ticks += 1;
        }
        // 10 ms at 3 ms per tick: the fourth tick lands on 12 ms.
        assert_eq!(ticks + 1, 4);
        assert_eq!(clock.sim_time(), Duration::from_millis(12));
    }

    #[test]
    fn exact_multiple_does_not_overshoot() {
        let mut clock = SimulationClock::new();
        clock.begin_time_run(0.009);
        while clock.advance(PERIOD) != Advance::TargetReached {}
        assert_eq!(clock.sim_time(), Duration::from_millis(9));
    }

    #[test]
    fn superseded_run_finishes_with_its_replacement() {
        let mut clock = SimulationClock::new();
        let first = clock.begin_frame_run(10);
        let second = clock.begin_frame_run(2);
        while clock.advance(PERIOD) != Advance::TargetReached {}
        assert!(clock.run_finished(first));
        assert!(clock.run_finished(second));
        assert_eq!(clock.frame(), 2);
    }

    #[test]
    fn pausing_abandons_the_target() {
        let mut clock = SimulationClock::new();
        let id = clock.begin_frame_run(10);
        clock.advance(PERIOD);
        clock.set_paused(true);
        assert!(clock.run_finished(id));
        assert_eq!(clock.target(), None);
    }
}
