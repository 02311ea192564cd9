//! Frame statistics and the heartbeat file.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Local;
use openhat_core::constants::{HIGH_LOAD_PERCENT, STATS_WINDOW_US};
use tracing::{debug, trace, warn};

/// Figures of one completed statistics window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatsReport {
    /// Ticks per second.
    pub fps: f64,
    /// Share of wall time spent processing, in percent.
    pub load: f64,
    /// Average processing time per tick, in microseconds.
    pub avg_processing_us: f64,
    pub max_processing_us: u64,
    pub total_us: u64,
}

impl StatsReport {
    #[must_use]
    pub fn is_high_load(&self) -> bool {
        self.load > HIGH_LOAD_PERCENT
    }

    fn log(&self) {
        trace!("Elapsed processing time: {} us", self.total_us);
        trace!("Loop iterations per second: {:.2}", self.fps);
        trace!(
            "Processing time average per iteration: {:.1} us (max {} us)",
            self.avg_processing_us, self.max_processing_us
        );
        trace!("Processing load: {:.2}%", self.load);
        if self.is_high_load() {
            debug!(
                "Processing the doWork loop takes very long; load = {:.2}%",
                self.load
            );
        }
    }
}

/// Accumulates tick timings until a statistics window is full.
#[derive(Debug, Default)]
pub struct FrameStats {
    calls: u64,
    total_us: u64,
    processing_us: u64,
    max_processing_us: u64,
}

impl FrameStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one tick. `processing` is the time spent in the tick, `wall` the
    /// wall time since the previous tick started.
    ///
    /// Returns a report and resets the counters once a full second of wall
    /// time has been accumulated.
    pub fn record(&mut self, processing: Duration, wall: Duration) -> Option<StatsReport> {
        let processing_us = duration_us(processing);
        self.calls += 1;
        self.processing_us += processing_us;
        self.max_processing_us = self.max_processing_us.max(processing_us);
        self.total_us += duration_us(wall.max(processing));

        if self.total_us < STATS_WINDOW_US {
            return None;
        }
        let total = self.total_us as f64;
        let report = StatsReport {
            fps: self.calls as f64 * 1_000_000.0 / total,
            load: self.processing_us as f64 / total * 100.0,
            avg_processing_us: self.processing_us as f64 / self.calls as f64,
            max_processing_us: self.max_processing_us,
            total_us: self.total_us,
        };
        *self = Self::default();
        report.log();
        Some(report)
    }

    /// Ticks counted in the current window.
    #[must_use]
    pub fn calls(&self) -> u64 {
        self.calls
    }
}

fn duration_us(duration: Duration) -> u64 {
    u64::try_from(duration.as_micros()).unwrap_or(u64::MAX)
}

/// Liveness file rewritten once per statistics window.
#[derive(Debug, Clone)]
pub struct Heartbeat {
    path: PathBuf,
}

impl Heartbeat {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Heartbeat line: `<timestamp>: pid=<pid>; fps=<fps>; load=<load>%`.
    #[must_use]
    pub fn format(report: &StatsReport) -> String {
        format!(
            "{}: pid={}; fps={:.2}; load={:.2}%",
            Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            std::process::id(),
            report.fps,
            report.load
        )
    }

    /// Overwrite the heartbeat file.
    ///
    /// # Errors
    /// Returns the I/O error if the file cannot be written.
    pub fn write(&self, report: &StatsReport) -> io::Result<()> {
        trace!("Writing heartbeat file: {}", self.path.display());
        fs::write(&self.path, Self::format(report))
    }

    /// Write the file, logging failures instead of returning them.
    pub fn beat(&self, report: &StatsReport) {
        if let Err(err) = self.write(report) {
            warn!(
                "Unable to write heartbeat file {}: {}",
                self.path.display(),
                err
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const TICK: Duration = Duration::from_millis(50);

    #[test]
    fn test_report_after_one_second() {
        let mut stats = FrameStats::new();
        for _ in 0..19 {
            assert!(stats.record(Duration::from_millis(5), TICK).is_none());
        }
        let report = stats.record(Duration::from_millis(5), TICK).unwrap();
        assert!((report.fps - 20.0).abs() < 1e-9);
        assert!((report.load - 10.0).abs() < 1e-9);
        assert_eq!(report.max_processing_us, 5_000);
        assert!(!report.is_high_load());
        assert_eq!(stats.calls(), 0);
    }

    #[test]
    fn test_overrunning_ticks_are_high_load() {
        let mut stats = FrameStats::new();
        // a tick that overran its budget still counts its processing time
        let report = stats
            .record(Duration::from_millis(1_200), Duration::from_millis(1))
            .unwrap();
        assert!((report.load - 100.0).abs() < 1e-9);
        assert!(report.is_high_load());
    }

    #[test]
    fn test_heartbeat_file_content() {
        let dir = TempDir::new().unwrap();
        let heartbeat = Heartbeat::new(dir.path().join("openhat.heartbeat"));
        let report = StatsReport {
            fps: 19.5,
            load: 3.25,
            avg_processing_us: 1.0,
            max_processing_us: 1,
            total_us: 1_000_000,
        };
        heartbeat.write(&report).unwrap();
        heartbeat.write(&report).unwrap();

        let content = fs::read_to_string(heartbeat.path()).unwrap();
        assert_eq!(content.lines().count(), 1);
        assert!(content.contains(&format!("pid={}", std::process::id())));
        assert!(content.ends_with("; fps=19.50; load=3.25%"));
    }
}
