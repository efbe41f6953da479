//! Fixed-interval scheduler for Partyline's background sweeps.
//!
//! The server runs a handful of housekeeping jobs on a timer: purging
//! inactive rooms every few minutes, sampling CPU every couple of seconds.
//! This crate gives them a common clock.
//!
//! # Overruns
//!
//! If the runtime wakes a scheduler late (a busy executor, a suspended
//! laptop), missed ticks are *skipped*, never replayed in a burst. Running
//! a purge sweep five times back to back helps nobody.
//!
//! # Panic isolation
//!
//! [`spawn_periodic`] runs each iteration in its own task. A panic in one
//! sweep is logged and the next tick runs as usual.
//!
//! ```ignore
//! let handle = spawn_periodic(IntervalConfig::every("purge", Duration::from_secs(600)), move || {
//!     let registry = registry.clone();
//!     async move { registry.purge_inactive_rooms().await; }
//! });
//! ```

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, trace, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for an [`IntervalScheduler`].
#[derive(Debug, Clone)]
pub struct IntervalConfig {
    /// Used in log lines.
    pub name: &'static str,
    /// Time between ticks.
    pub period: Duration,
    /// Random delay (0..initial_jitter) added to the *first* tick so jobs
    /// started together don't stay in lockstep.
    pub initial_jitter: Duration,
}

impl IntervalConfig {
    /// Shortest period accepted; anything smaller would spin.
    pub const MIN_PERIOD: Duration = Duration::from_millis(1);

    /// A config with the given name and period and no jitter.
    pub fn every(name: &'static str, period: Duration) -> Self {
        Self {
            name,
            period,
            initial_jitter: Duration::ZERO,
        }
    }

    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.initial_jitter = jitter;
        self
    }

    /// Clamps the period to at least [`Self::MIN_PERIOD`].
    ///
    /// Called automatically by [`IntervalScheduler::new`].
    pub fn validated(mut self) -> Self {
        if self.period < Self::MIN_PERIOD {
            warn!(
                name = self.name,
                period_ms = self.period.as_secs_f64() * 1000.0,
                "interval period below minimum, clamping"
            );
            self.period = Self::MIN_PERIOD;
        }
        self
    }
}

// ---------------------------------------------------------------------------
// Tick info (returned to caller each tick)
// ---------------------------------------------------------------------------

/// Information about a tick, returned by [`IntervalScheduler::wait_for_tick`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickInfo {
    /// Monotonically increasing tick number (starts at 1).
    pub tick: u64,
    /// `true` if this tick fired noticeably late.
    pub overrun: bool,
    /// Whole periods that went by unobserved before this tick.
    pub ticks_skipped: u64,
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Fixed-interval scheduler.
pub struct IntervalScheduler {
    config: IntervalConfig,
    tick_count: u64,
    total_skipped: u64,
    /// When the next tick should fire.
    next_tick: Instant,
}

impl IntervalScheduler {
    /// Create a new scheduler. The first tick fires one period (plus
    /// jitter) from now.
    pub fn new(config: IntervalConfig) -> Self {
        let config = config.validated();

        let jitter = if config.initial_jitter.is_zero() {
            Duration::ZERO
        } else {
            let max_us = config.initial_jitter.as_micros() as u64;
            Duration::from_micros(rand::rng().random_range(0..max_us.max(1)))
        };

        debug!(
            name = config.name,
            period_ms = config.period.as_secs_f64() * 1000.0,
            jitter_ms = jitter.as_secs_f64() * 1000.0,
            "interval scheduler created"
        );

        Self {
            next_tick: Instant::now() + config.period + jitter,
            config,
            tick_count: 0,
            total_skipped: 0,
        }
    }

    /// Wait until the next tick is due.
    pub async fn wait_for_tick(&mut self) -> TickInfo {
        let period = self.config.period;
        let due = self.next_tick;
        time::sleep_until(due).await;

        let now = Instant::now();
        self.tick_count += 1;

        // More than 10% late counts as an overrun.
        let late_by = now.saturating_duration_since(due);
        let overrun = late_by > period / 10;
        let ticks_skipped = if overrun {
            (late_by.as_nanos() / period.as_nanos()) as u64
        } else {
            0
        };
        if ticks_skipped > 0 {
            warn!(
                name = self.config.name,
                tick = self.tick_count,
                skipped = ticks_skipped,
                late_ms = late_by.as_secs_f64() * 1000.0,
                "interval overrun, skipping ahead"
            );
        }
        self.total_skipped += ticks_skipped;

        // Schedule from now, not from the missed deadline.
        self.next_tick = now + period;

        trace!(name = self.config.name, tick = self.tick_count, overrun, "interval tick");

        TickInfo {
            tick: self.tick_count,
            overrun,
            ticks_skipped,
        }
    }

    /// Number of ticks fired so far.
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Total periods skipped over the scheduler's life.
    pub fn total_skipped(&self) -> u64 {
        self.total_skipped
    }

    pub fn period(&self) -> Duration {
        self.config.period
    }

    pub fn name(&self) -> &'static str {
        self.config.name
    }
}

// ---------------------------------------------------------------------------
// Periodic tasks
// ---------------------------------------------------------------------------

/// Runs `task` on every tick until the returned handle is aborted.
///
/// Each run is spawned as its own task and awaited before the next tick,
/// so runs never overlap and a panicking run doesn't take the loop down.
pub fn spawn_periodic<F, Fut>(config: IntervalConfig, mut task: F) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let mut scheduler = IntervalScheduler::new(config);
    tokio::spawn(async move {
        loop {
            let info = scheduler.wait_for_tick().await;
            if let Err(e) = tokio::spawn(task()).await {
                if e.is_panic() {
                    warn!(name = scheduler.name(), tick = info.tick, "periodic task panicked");
                } else {
                    debug!(name = scheduler.name(), tick = info.tick, "periodic task cancelled");
                }
            }
        }
    })
}
