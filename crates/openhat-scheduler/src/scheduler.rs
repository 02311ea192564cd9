//! The poll loop driving every port.
//!
//! # Tick
//!
//! 1. increment the frame counter
//! 2. run the per-tick work of every port ([`Runtime::do_work_all`])
//! 3. send the batched refreshes in one notification
//! 4. account the processing time; once per second report frame rate and
//!    load and rewrite the heartbeat file
//! 5. sleep for the rest of the frame budget
//!
//! A port error ends the tick with [`TickStatus::DeviceError`] but never the
//! loop. Only a shutdown request does.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use openhat_core::constants::DEFAULT_TARGET_FPS;
use openhat_core::{ConfigView, Error, Result};
use openhat_port::Runtime;
use tracing::{debug, info};

use crate::error_log::ErrorLog;
use crate::stats::{FrameStats, Heartbeat, StatsReport};

/// Scheduler settings from the `General` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub target_fps: u32,
    pub heartbeat_file: Option<PathBuf>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            target_fps: DEFAULT_TARGET_FPS,
            heartbeat_file: None,
        }
    }
}

impl SchedulerConfig {
    /// Read `TargetFPS` and `HeartbeatFile`.
    ///
    /// # Errors
    /// Fails if `TargetFPS` is not a positive number.
    pub fn from_config(general: &ConfigView) -> Result<Self> {
        let fps = general.get_int64("TargetFPS", i64::from(DEFAULT_TARGET_FPS), false)?;
        let target_fps = u32::try_from(fps)
            .ok()
            .filter(|fps| *fps > 0)
            .ok_or_else(|| Error::Config(format!("TargetFPS must be greater than 0: {fps}")))?;
        let heartbeat = general.get_string("HeartbeatFile", "", false)?;
        Ok(Self {
            target_fps,
            heartbeat_file: (!heartbeat.is_empty()).then(|| PathBuf::from(heartbeat)),
        })
    }

    /// Time budget of one tick.
    #[must_use]
    pub fn frame_budget(&self) -> Duration {
        Duration::from_secs(1) / self.target_fps.max(1)
    }
}

/// Outcome of a single tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickStatus {
    Ok,
    DeviceError,
}

pub struct Scheduler {
    rt: Arc<Runtime>,
    budget: Duration,
    heartbeat: Option<Heartbeat>,
    frame: u64,
    stats: FrameStats,
    errors: ErrorLog,
    last_tick: Option<Instant>,
    last_report: Option<StatsReport>,
}

impl Scheduler {
    pub fn new(rt: Arc<Runtime>, config: &SchedulerConfig) -> Self {
        Self {
            rt,
            budget: config.frame_budget(),
            heartbeat: config.heartbeat_file.clone().map(Heartbeat::new),
            frame: 0,
            stats: FrameStats::new(),
            errors: ErrorLog::new(),
            last_tick: None,
            last_report: None,
        }
    }

    pub fn runtime(&self) -> &Arc<Runtime> {
        &self.rt
    }

    /// Ticks executed so far.
    #[must_use]
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// The most recent statistics window, once one has completed.
    #[must_use]
    pub fn last_report(&self) -> Option<StatsReport> {
        self.last_report
    }

    /// Run one tick at `now`.
    pub fn tick(&mut self, now: Instant) -> TickStatus {
        self.frame += 1;
        let status = match self.rt.do_work_all(now) {
            Ok(()) => TickStatus::Ok,
            Err(err) => {
                self.errors
                    .log(&format!("Unhandled exception while housekeeping: {err}"));
                TickStatus::DeviceError
            }
        };
        self.rt.dispatch_refreshes();

        let processing = now.elapsed();
        let wall = self
            .last_tick
            .map_or(processing, |last| now.saturating_duration_since(last));
        self.last_tick = Some(now);
        if let Some(report) = self.stats.record(processing, wall) {
            if let Some(heartbeat) = &self.heartbeat {
                heartbeat.beat(&report);
            }
            self.last_report = Some(report);
        }
        status
    }

    /// Tick until shutdown is requested.
    pub fn run(&mut self) {
        self.run_until(None);
    }

    /// Tick until shutdown is requested or `deadline` has passed.
    pub fn run_until(&mut self, deadline: Option<Instant>) {
        info!(
            "Entering main loop at {} ticks per second",
            Duration::from_secs(1).as_nanos() / self.budget.as_nanos().max(1)
        );
        while !self.rt.is_shutdown_requested() {
            let start = Instant::now();
            if deadline.is_some_and(|deadline| start >= deadline) {
                debug!("Run time elapsed after {} ticks", self.frame);
                break;
            }
            self.tick(start);
            let remaining = self.budget.saturating_sub(start.elapsed());
            if !remaining.is_zero() {
                thread::sleep(remaining);
            }
        }
        info!("Main loop finished after {} ticks", self.frame);
    }

    /// Ask the controller to re-read every port.
    pub fn refresh_all(&self) {
        self.rt.refresh_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(&[], 20, None)]
    #[case(&[("TargetFPS", "50"), ("HeartbeatFile", "/tmp/hb")], 50, Some("/tmp/hb"))]
    fn test_config(
        #[case] pairs: &[(&str, &str)],
        #[case] fps: u32,
        #[case] heartbeat: Option<&str>,
    ) {
        let general = ConfigView::from_pairs("General", pairs.iter().copied());
        let config = SchedulerConfig::from_config(&general).unwrap();
        assert_eq!(config.target_fps, fps);
        assert_eq!(config.heartbeat_file, heartbeat.map(PathBuf::from));
    }

    #[rstest]
    #[case("0")]
    #[case("-5")]
    fn test_target_fps_must_be_positive(#[case] fps: &str) {
        let general = ConfigView::from_pairs("General", [("TargetFPS", fps)]);
        assert!(SchedulerConfig::from_config(&general).is_err());
    }

    #[test]
    fn test_default_budget_is_50ms() {
        assert_eq!(
            SchedulerConfig::default().frame_budget(),
            Duration::from_millis(50)
        );
    }

    #[test]
    fn test_tick_counts_frames() {
        let mut scheduler = Scheduler::new(Arc::new(Runtime::new()), &SchedulerConfig::default());
        assert_eq!(scheduler.tick(Instant::now()), TickStatus::Ok);
        assert_eq!(scheduler.tick(Instant::now()), TickStatus::Ok);
        assert_eq!(scheduler.frame(), 2);
    }

    #[test]
    fn test_run_until_deadline() {
        let rt = Arc::new(Runtime::new());
        let mut scheduler = Scheduler::new(
            Arc::clone(&rt),
            &SchedulerConfig {
                target_fps: 100,
                heartbeat_file: None,
            },
        );
        let start = Instant::now();
        scheduler.run_until(Some(start + Duration::from_millis(100)));
        assert!(scheduler.frame() >= 1);
        assert!(scheduler.frame() <= 11);
        assert!(!rt.is_shutdown_requested());
    }
}
