//! Fixed-period stepping scheduler.
//!
//! # Threads and locks
//!
//! The scheduler owns one stepping thread. Two locks are involved and are
//! always taken in this order:
//!
//! 1. `world`: the [`WorldContext`] (vehicles, physics engine, report).
//! 2. `clock`: the [`SimulationClock`], present only while started.
//!
//! Nothing takes `world` while holding `clock`. A tick takes both, steps the
//! world, advances the clock and signals `clock_changed`. The world guard
//! never leaves this crate; callers read it through snapshots such as
//! [`vehicle_names`]. Callers of [`continue_for_time`] and
//! [`continue_for_frames`] block on that condition variable until their run
//! target is reached (or the scheduler stops), so they cannot do other work
//! meanwhile, but they do not spin.
//!
//! [`render_tick`] takes only the world lock, collects snapshots, releases
//! it, and then runs rendering hooks and telemetry without any lock held.
//!
//! [`continue_for_time`]: StepScheduler::continue_for_time
//! [`continue_for_frames`]: StepScheduler::continue_for_frames
//! [`render_tick`]: StepScheduler::render_tick
//! [`vehicle_names`]: StepScheduler::vehicle_names

pub mod clock;
pub mod world;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use minstant::Instant;
use parking_lot::{Condvar, Mutex};
use thiserror::Error;

use crate::runtime::topology::{CpuConfig, pin_to_core};
use crate::settings::{ConfigError, DEFAULT_PHYSICS_LOOP_PERIOD, Settings};
use crate::trace::{debug, error, info, warn};
use crate::vehicle::kinematics::{Kinematics, Vector3r};
use crate::vehicle::sim::{RenderHook, VehicleSim};

pub use clock::{Advance, RunTarget, SimulationClock};
pub use world::WorldContext;

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Tick period, in both wall-clock and simulated time.
    pub period: Duration,
    /// Placement of the stepping thread.
    pub cpu: CpuConfig,
    /// Aggregate a state report every tick.
    pub enable_state_report: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            period: DEFAULT_PHYSICS_LOOP_PERIOD,
            cpu: CpuConfig::Disabled,
            enable_state_report: false,
        }
    }
}

impl SchedulerConfig {
    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            period: settings.physics_loop_period(),
            cpu: settings.cpu_pinning.clone(),
            enable_state_report: settings.enable_state_report,
        }
    }
}

/// Scheduler lifecycle failure.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("scheduler already started")]
    AlreadyStarted,
    #[error("scheduler not started")]
    NotStarted,
    /// The scheduler stopped while the caller was waiting on a run target.
    #[error("scheduler stopped")]
    Stopped,
    #[error("stepping period must be non-zero")]
    InvalidPeriod,
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to spawn stepping thread: {0}")]
    Spawn(std::io::Error),
}

struct Shared {
    clock: Mutex<Option<SimulationClock>>,
    clock_changed: Condvar,
    world: Mutex<WorldContext>,
    shutdown: AtomicBool,
}

/// Owns the stepping thread and the deterministic run primitives.
pub struct StepScheduler {
    shared: Arc<Shared>,
    config: SchedulerConfig,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl StepScheduler {
    #[must_use]
    pub fn new(world: WorldContext, config: SchedulerConfig) -> Self {
        let mut world = world;
        world.set_report_enabled(config.enable_state_report);
        Self {
            shared: Arc::new(Shared {
                clock: Mutex::new(None),
                clock_changed: Condvar::new(),
                world: Mutex::new(world),
                shutdown: AtomicBool::new(false),
            }),
            config,
            handle: Mutex::new(None),
        }
    }

    #[must_use]
    pub const fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    #[must_use]
    pub fn is_started(&self) -> bool {
        self.handle.lock().is_some()
    }

    /// Spawns the stepping thread. The clock starts unpaused at frame 0.
    ///
    /// # Errors
    ///
    /// - [`SchedulerError::AlreadyStarted`] on a second start.
    /// - [`SchedulerError::Config`] if the world has no physics engine.
    /// - [`SchedulerError::InvalidPeriod`] for a zero period.
    /// - [`SchedulerError::Spawn`] if the thread cannot be created.
    pub fn start(&self) -> Result<(), SchedulerError> {
        let mut handle = self.handle.lock();
        if handle.is_some() {
            return Err(SchedulerError::AlreadyStarted);
        }
        if self.config.period.is_zero() {
            return Err(SchedulerError::InvalidPeriod);
        }
        if !self.shared.world.lock().has_engine() {
            error!("no physics engine; refusing to start stepping");
            return Err(ConfigError::EmptyPhysicsEngine.into());
        }

        self.shared.shutdown.store(false, Ordering::Release);
        *self.shared.clock.lock() = Some(SimulationClock::new());

        let shared = Arc::clone(&self.shared);
        let period = self.config.period;
        let placement = self.config.cpu.resolve();
        info!(
            period_us = period.as_micros() as u64,
            core = ?placement.stepping_core,
            strategy = %placement.strategy,
            "starting stepping thread"
        );

        let spawned = thread::Builder::new()
            .name("drover-step".into())
            .spawn(move || {
                if let Some(core) = placement.stepping_core
                    && !pin_to_core(core)
                {
                    warn!(core, "failed to pin stepping thread");
                }
                info!("stepping thread started");
                stepping_loop(&shared, period);
                info!("stepping thread exiting");
            });

        match spawned {
            Ok(h) => {
                *handle = Some(h);
                Ok(())
            }
            Err(e) => {
                *self.shared.clock.lock() = None;
                error!(error = %e, "failed to spawn stepping thread");
                Err(SchedulerError::Spawn(e))
            }
        }
    }

    /// Stops and joins the stepping thread. Safe to call when stopped.
    ///
    /// Any caller blocked in a `continue_for_*` call returns
    /// [`SchedulerError::Stopped`].
    pub fn stop(&self) {
        let Some(handle) = self.handle.lock().take() else {
            return;
        };
        info!("stopping stepping thread");
        self.shared.shutdown.store(true, Ordering::Release);
        {
            let mut clock = self.shared.clock.lock();
            *clock = None;
            self.shared.clock_changed.notify_all();
        }
        if handle.join().is_err() {
            error!("stepping thread panicked");
        }
        info!("stepping stopped");
    }

    /// Sets the pause flag; the stepping thread observes it at the next tick.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::NotStarted`] if the scheduler is stopped.
    pub fn pause(&self, paused: bool) -> Result<(), SchedulerError> {
        let mut guard = self.shared.clock.lock();
        let clock = guard.as_mut().ok_or(SchedulerError::NotStarted)?;
        clock.set_paused(paused);
        debug!(paused, frame = clock.frame(), "pause");
        self.shared.clock_changed.notify_all();
        Ok(())
    }

    /// # Errors
    ///
    /// [`SchedulerError::NotStarted`] if the scheduler is stopped.
    pub fn is_paused(&self) -> Result<bool, SchedulerError> {
        self.with_clock(SimulationClock::is_paused)
    }

    /// Frame counter: physics ticks since start.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::NotStarted`] if the scheduler is stopped.
    pub fn frame(&self) -> Result<u64, SchedulerError> {
        self.with_clock(SimulationClock::frame)
    }

    /// Simulated time since start.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::NotStarted`] if the scheduler is stopped.
    pub fn sim_time(&self) -> Result<Duration, SchedulerError> {
        self.with_clock(SimulationClock::sim_time)
    }

    fn with_clock<T>(&self, f: impl FnOnce(&SimulationClock) -> T) -> Result<T, SchedulerError> {
        self.shared
            .clock
            .lock()
            .as_ref()
            .map(f)
            .ok_or(SchedulerError::NotStarted)
    }

    /// Unpauses, runs `seconds` of simulated time, re-pauses, then returns.
    ///
    /// Blocks the caller until the stepping thread reaches the deadline. The
    /// re-pause lands on the first tick at or past the deadline.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::NotStarted`] if stopped on entry and
    /// [`SchedulerError::Stopped`] if stopped while waiting.
    pub fn continue_for_time(&self, seconds: f64) -> Result<(), SchedulerError> {
        self.run_until(|clock| clock.begin_time_run(seconds))
    }

    /// Unpauses, runs exactly `frames` ticks, re-pauses, then returns.
    ///
    /// `frames == 0` pauses and returns at once.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::NotStarted`] if stopped on entry and
    /// [`SchedulerError::Stopped`] if stopped while waiting.
    pub fn continue_for_frames(&self, frames: u32) -> Result<(), SchedulerError> {
        if frames == 0 {
            return self.pause(true);
        }
        self.run_until(|clock| clock.begin_frame_run(frames))
    }

    fn run_until(
        &self,
        begin: impl FnOnce(&mut SimulationClock) -> u64,
    ) -> Result<(), SchedulerError> {
        let mut guard = self.shared.clock.lock();
        let clock = guard.as_mut().ok_or(SchedulerError::NotStarted)?;
        let run = begin(clock);
        debug!(run, frame = clock.frame(), target = ?clock.target(), "continue");
        self.shared.clock_changed.notify_all();

        loop {
            let Some(clock) = guard.as_ref() else {
                return Err(SchedulerError::Stopped);
            };
            if clock.run_finished(run) {
                return Ok(());
            }
            self.shared.clock_changed.wait(&mut guard);
        }
    }

    /// Resets the physics engine and every core-managed vehicle under the
    /// world lock.
    pub fn reset(&self) {
        info!("resetting world");
        self.shared.world.lock().reset();
    }

    /// Last aggregated state report.
    #[must_use]
    pub fn debug_report(&self) -> String {
        self.shared.world.lock().debug_report().to_owned()
    }

    pub fn set_wind(&self, wind: Vector3r) {
        self.shared.world.lock().set_wind(wind);
    }

    pub fn set_ext_force(&self, force: Vector3r) {
        self.shared.world.lock().set_ext_force(force);
    }

    pub fn set_state_report_enabled(&self, enabled: bool) {
        self.shared.world.lock().set_report_enabled(enabled);
    }

    /// Adds a core-managed vehicle to the running world.
    pub fn add_vehicle(&self, vehicle: Box<dyn VehicleSim>) {
        info!(vehicle = vehicle.name(), "vehicle joined stepping world");
        self.shared.world.lock().add_vehicle(vehicle);
    }

    /// Names of the vehicles in the stepping world, in stepping order.
    #[must_use]
    pub fn vehicle_names(&self) -> Vec<String> {
        self.with_world(|world| world.vehicles().iter().map(|v| v.name().to_owned()).collect())
    }

    /// Current kinematics of a stepped vehicle.
    #[must_use]
    pub fn kinematics(&self, vehicle: &str) -> Option<Kinematics> {
        self.with_world(|world| {
            world
                .vehicles()
                .iter()
                .find(|v| v.name() == vehicle)
                .map(|v| v.kinematics())
        })
    }

    /// Runs `f` with the world locked.
    ///
    /// `f` may read the clock, but must not wait on a run target: the
    /// stepping thread needs the world lock to make progress.
    pub(crate) fn with_world<T>(&self, f: impl FnOnce(&mut WorldContext) -> T) -> T {
        f(&mut self.shared.world.lock())
    }

    /// One render-thread frame.
    ///
    /// Locked phase: refresh the state report and snapshot every vehicle.
    /// Unlocked phase: log status messages, run `hook` per vehicle and send
    /// telemetry. Telemetry failures are logged and skipped.
    pub fn render_tick(&self, dt: f32, hook: &mut dyn RenderHook) {
        let states = {
            let mut world = self.shared.world.lock();
            world.update_state_report();
            world.rendered_states(dt)
        };

        for state in &states {
            for message in &state.status_messages {
                info!(vehicle = %state.vehicle, "{message}");
            }
            hook.on_rendered(state);
            if let Err(e) = state.api.send_telemetry(dt) {
                error!(vehicle = %state.vehicle, error = %e, "telemetry send failed");
            }
        }
    }
}

impl Drop for StepScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

fn stepping_loop(shared: &Shared, period: Duration) {
    let dt = period.as_secs_f32();
    let mut next = Instant::now() + period;

    while !shared.shutdown.load(Ordering::Acquire) {
        {
            let mut world = shared.world.lock();
            let mut guard = shared.clock.lock();
            let Some(clock) = guard.as_mut() else {
                break;
            };
            if !clock.is_paused() {
                world.tick(dt);
                if clock.advance(period) == Advance::TargetReached {
                    debug!(frame = clock.frame(), sim_time = ?clock.sim_time(), "run target reached");
                }
                shared.clock_changed.notify_all();
            }
        }

        match next.checked_duration_since(Instant::now()) {
            Some(remaining) => thread::sleep(remaining),
            // Overran the period; do not try to catch up with a burst.
            None => next = Instant::now(),
        }
        next = next + period;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::FastPhysicsEngine;
    use crate::vehicle::class::Capabilities;
    use crate::vehicle::sim::SimVehicle;

    fn scheduler() -> StepScheduler {
        let vehicle = SimVehicle::new(
            "drone",
            Some("SimpleFlight".into()),
            Capabilities::multirotor(),
            Kinematics::default(),
        );
        let world = WorldContext::new(
            vec![Box::new(vehicle)],
            Some(Box::new(FastPhysicsEngine::new(true))),
        );
        StepScheduler::new(
            world,
            SchedulerConfig {
                period: Duration::from_millis(1),
                ..SchedulerConfig::default()
            },
        )
    }

    #[test]
    fn second_start_is_rejected() {
        let s = scheduler();
        s.start().unwrap();
        assert!(matches!(s.start(), Err(SchedulerError::AlreadyStarted)));
        s.stop();
    }

    #[test]
    fn stop_is_idempotent() {
        let s = scheduler();
        s.stop();
        s.start().unwrap();
        s.stop();
        s.stop();
        assert!(!s.is_started());
    }

    #[test]
    fn missing_engine_refuses_to_start() {
        let s = StepScheduler::new(WorldContext::new(Vec::new(), None), SchedulerConfig::default());
        assert!(matches!(
            s.start(),
            Err(SchedulerError::Config(ConfigError::EmptyPhysicsEngine))
        ));
        assert!(!s.is_started());
    }

    #[test]
    fn zero_period_is_rejected() {
        let s = StepScheduler::new(
            WorldContext::new(Vec::new(), Some(Box::new(FastPhysicsEngine::new(true)))),
            SchedulerConfig {
                period: Duration::ZERO,
                ..SchedulerConfig::default()
            },
        );
        assert!(matches!(s.start(), Err(SchedulerError::InvalidPeriod)));
    }

    #[test]
    fn calls_before_start_report_not_started() {
        let s = scheduler();
        assert!(matches!(s.pause(true), Err(SchedulerError::NotStarted)));
        assert!(matches!(s.frame(), Err(SchedulerError::NotStarted)));
        assert!(matches!(s.continue_for_frames(1), Err(SchedulerError::NotStarted)));
    }

    #[test]
    fn continue_for_frames_runs_exact_count() {
        let s = scheduler();
        s.start().unwrap();
        s.pause(true).unwrap();
        let before = s.frame().unwrap();
        s.continue_for_frames(7).unwrap();
        assert_eq!(s.frame().unwrap() - before, 7);
        assert!(s.is_paused().unwrap());
        s.stop();
    }

    #[test]
    fn continue_for_zero_frames_pauses_immediately() {
        let s = scheduler();
        s.start().unwrap();
        s.continue_for_frames(0).unwrap();
        assert!(s.is_paused().unwrap());
        let frame = s.frame().unwrap();
        thread::sleep(Duration::from_millis(10));
        assert_eq!(s.frame().unwrap(), frame);
        s.stop();
    }

    #[test]
    fn render_tick_runs_hook_per_vehicle() {
        let s = scheduler();
        let mut seen = Vec::new();
        s.render_tick(0.016, &mut |state: &crate::vehicle::sim::RenderedState| {
            seen.push(state.vehicle.clone());
        });
        assert_eq!(seen, vec!["drone".to_owned()]);
    }

    #[test]
    fn clock_reads_inside_with_world_do_not_stall_stepping() {
        let s = scheduler();
        s.start().unwrap();
        let start = s.frame().unwrap();

        for _ in 0..50 {
            let frame = s.with_world(|_| {
                thread::sleep(Duration::from_micros(300));
                s.frame().unwrap()
            });
            assert!(frame >= start);
            s.with_world(|_| s.is_paused().unwrap());
        }
        s.with_world(|_| s.pause(false).unwrap());
        thread::sleep(Duration::from_millis(10));

        assert!(s.frame().unwrap() > start);
        let before = s.frame().unwrap();
        s.pause(true).unwrap();
        s.continue_for_frames(5).unwrap();
        assert!(s.frame().unwrap() >= before + 5);
        s.stop();
    }

    #[test]
    fn continue_from_running_state_counts_from_the_current_frame() {
        let s = Arc::new(scheduler());
        s.start().unwrap();
        s.continue_for_frames(100).unwrap();

        // Holding the world lock parks the stepping thread between ticks.
        let world = s.shared.world.lock();
        s.pause(false).unwrap();
        let before = s.frame().unwrap();
        let waiter = {
            let s = Arc::clone(&s);
            thread::spawn(move || s.continue_for_frames(5))
        };
        while s.shared.clock.lock().as_ref().is_some_and(|c| c.target().is_none()) {
            thread::sleep(Duration::from_micros(100));
        }
        drop(world);

        waiter.join().expect("waiter panicked").unwrap();
        assert_eq!(s.frame().unwrap(), before + 5);
        assert!(s.is_paused().unwrap());
        s.stop();
    }

    #[test]
    fn snapshots_name_and_locate_vehicles() {
        let s = scheduler();
        assert_eq!(s.vehicle_names(), vec!["drone".to_owned()]);
        assert!(s.kinematics("drone").is_some());
        assert!(s.kinematics("ghost").is_none());
    }
}
