// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


//! Auto-mode run time bookkeeping.
//!
//! [`TimingTracker`] holds the operating mode, the instant the current Auto
//! run started and the seconds carried over from earlier runs. Everything it
//! reports is computed on demand from those plus the idle clock reading the
//! caller passes in; nothing is cached.

use std::time::Duration;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Seconds in one hour.
const SECONDS_PER_HOUR: u64 = 3600;

/// Workstation operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OperatingMode {
    /// Recipe editing; run time does not accrue.
    #[default]
    Edit,
    /// Automatic inspection; run time accrues.
    Auto,
}

impl OperatingMode {
    #[must_use]
    pub const fn from_auto(auto: bool) -> Self {
        if auto {
            Self::Auto
        } else {
            Self::Edit
        }
    }

    #[must_use]
    pub const fn is_auto(self) -> bool {
        matches!(self, Self::Auto)
    }
}

impl std::fmt::Display for OperatingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Edit => write!(f, "Edit"),
            Self::Auto => write!(f, "Auto"),
        }
    }
}

/// Render seconds as `HH:MM:SS`. Hours are not wrapped at 24.
#[must_use]
pub fn format_hms(seconds: u64) -> String {
    format!(
        "{:02}:{:02}:{:02}",
        seconds / SECONDS_PER_HOUR,
        (seconds % SECONDS_PER_HOUR) / 60,
        seconds % 60
    )
}

/// Mode, run start and carried-over Auto time.
#[derive(Debug, Clone, Default)]
pub struct TimingTracker {
    mode: OperatingMode,
    run_started_at: Option<DateTime<Local>>,
    accumulated_auto_seconds: u64,
}

impl TimingTracker {
    /// Create a tracker in Edit mode seeded with `accumulated_auto_seconds`.
    #[must_use]
    pub fn new(accumulated_auto_seconds: u64) -> Self {
        Self {
            accumulated_auto_seconds,
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn mode(&self) -> OperatingMode {
        self.mode
    }

    /// Switch mode. Does not touch the run start; entering Auto needs a
    /// separate [`set_start_time`](Self::set_start_time).
    ///
    /// Leaving Auto folds the finished run into the accumulated total so the
    /// Edit-mode figure stays where Auto left it, and clears the run start so
    /// the folded run cannot be counted again. Returns whether the mode
    /// changed.
    pub fn set_mode(&mut self, mode: OperatingMode, now: DateTime<Local>, idle: Duration) -> bool {
        if mode == self.mode {
            return false;
        }
        if self.mode.is_auto() {
            self.accumulated_auto_seconds = self.cumulative_auto_seconds(now, idle);
            self.run_started_at = None;
        }
        self.mode = mode;
        true
    }

    /// Mark the start of an Auto run at `at`.
    pub fn set_start_time(&mut self, at: DateTime<Local>) {
        self.run_started_at = Some(at);
    }

    #[must_use]
    pub const fn run_started_at(&self) -> Option<DateTime<Local>> {
        self.run_started_at
    }

    /// Overwrite the carried-over total.
    pub fn set_total_auto_time(&mut self, seconds: u64) {
        self.accumulated_auto_seconds = seconds;
    }

    #[must_use]
    pub const fn accumulated_auto_seconds(&self) -> u64 {
        self.accumulated_auto_seconds
    }

    /// Wall time since the run started minus the whole idle clock reading, in
    /// whole seconds. Zero outside Auto, before any start time was set, or
    /// when idle exceeds wall time.
    #[must_use]
    pub fn current_run_seconds(&self, now: DateTime<Local>, idle: Duration) -> u64 {
        if !self.mode.is_auto() {
            return 0;
        }
        let Some(started_at) = self.run_started_at else {
            return 0;
        };

        let wall_ms = (now - started_at).num_milliseconds();
        let idle_ms = i64::try_from(idle.as_millis()).unwrap_or(i64::MAX);
        u64::try_from(wall_ms.saturating_sub(idle_ms) / 1000).unwrap_or(0)
    }

    /// Carried-over total plus the current run while in Auto; the carried-over
    /// total alone otherwise.
    #[must_use]
    pub fn cumulative_auto_seconds(&self, now: DateTime<Local>, idle: Duration) -> u64 {
        self.accumulated_auto_seconds + self.current_run_seconds(now, idle)
    }

    /// Whole hours of [`cumulative_auto_seconds`](Self::cumulative_auto_seconds).
    #[must_use]
    pub fn total_hours(&self, now: DateTime<Local>, idle: Duration) -> u64 {
        self.cumulative_auto_seconds(now, idle) / SECONDS_PER_HOUR
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Local> {
        Local.with_ymd_and_hms(2025, 6, 2, 8, 0, 0).unwrap()
    }

    fn secs(s: i64) -> chrono::Duration {
        chrono::Duration::seconds(s)
    }

    #[test]
    fn test_format_hms() {
        assert_eq!(format_hms(0), "00:00:00");
        assert_eq!(format_hms(3661), "01:01:01");
        assert_eq!(format_hms(100 * 3600 + 59), "100:00:59");
    }

    #[test]
    fn test_edit_mode_reports_accumulated_only() {
        let tracker = TimingTracker::new(100);
        assert_eq!(tracker.mode(), OperatingMode::Edit);
        assert_eq!(tracker.current_run_seconds(t0(), Duration::ZERO), 0);
        assert_eq!(tracker.cumulative_auto_seconds(t0(), Duration::ZERO), 100);
    }

    #[test]
    fn test_auto_run_adds_to_accumulated() {
        let mut tracker = TimingTracker::new(100);
        tracker.set_mode(OperatingMode::Auto, t0(), Duration::ZERO);
        tracker.set_start_time(t0());

        let now = t0() + secs(30);
        assert_eq!(tracker.current_run_seconds(now, Duration::ZERO), 30);
        assert_eq!(tracker.cumulative_auto_seconds(now, Duration::ZERO), 130);
    }

    #[test]
    fn test_idle_time_is_subtracted() {
        let mut tracker = TimingTracker::new(0);
        tracker.set_mode(OperatingMode::Auto, t0(), Duration::ZERO);
        tracker.set_start_time(t0());

        let now = t0() + secs(120);
        assert_eq!(tracker.current_run_seconds(now, Duration::from_secs(20)), 100);
    }

    #[test]
    fn test_idle_before_run_start_is_still_subtracted() {
        let mut tracker = TimingTracker::new(100);
        tracker.set_mode(OperatingMode::Auto, t0(), Duration::ZERO);
        // The idle clock already reads 20s when the run starts.
        tracker.set_start_time(t0());

        let now = t0() + secs(30);
        let idle = Duration::from_secs(20);
        assert_eq!(tracker.current_run_seconds(now, idle), 10);
        assert_eq!(tracker.cumulative_auto_seconds(now, idle), 110);
    }

    #[test]
    fn test_reentering_auto_without_start_time_does_not_recount() {
        let mut tracker = TimingTracker::new(100);
        tracker.set_mode(OperatingMode::Auto, t0(), Duration::ZERO);
        tracker.set_start_time(t0());

        tracker.set_mode(OperatingMode::Edit, t0() + secs(30), Duration::ZERO);
        assert_eq!(tracker.accumulated_auto_seconds(), 130);
        assert_eq!(tracker.run_started_at(), None);

        tracker.set_mode(OperatingMode::Auto, t0() + secs(60), Duration::ZERO);
        let now = t0() + secs(90);
        assert_eq!(tracker.current_run_seconds(now, Duration::ZERO), 0);
        assert_eq!(tracker.cumulative_auto_seconds(now, Duration::ZERO), 130);

        tracker.set_start_time(t0() + secs(60));
        assert_eq!(tracker.cumulative_auto_seconds(now, Duration::ZERO), 160);
    }

    #[test]
    fn test_leaving_auto_freezes_cumulative() {
        let mut tracker = TimingTracker::new(100);
        tracker.set_mode(OperatingMode::Auto, t0(), Duration::ZERO);
        tracker.set_start_time(t0());

        assert!(tracker.set_mode(OperatingMode::Edit, t0() + secs(30), Duration::ZERO));
        assert_eq!(tracker.accumulated_auto_seconds(), 130);
        assert_eq!(tracker.cumulative_auto_seconds(t0() + secs(3600), Duration::ZERO), 130);
        assert_eq!(tracker.current_run_seconds(t0() + secs(3600), Duration::ZERO), 0);
    }

    #[test]
    fn test_set_mode_does_not_restart_run() {
        let mut tracker = TimingTracker::new(0);
        assert_eq!(tracker.current_run_seconds(t0(), Duration::ZERO), 0);

        // Auto without a start time has nothing to measure from.
        tracker.set_mode(OperatingMode::Auto, t0(), Duration::ZERO);
        assert_eq!(tracker.current_run_seconds(t0() + secs(10), Duration::ZERO), 0);

        tracker.set_start_time(t0());
        assert!(!tracker.set_mode(OperatingMode::Auto, t0() + secs(5), Duration::ZERO));
        assert_eq!(tracker.run_started_at(), Some(t0()));
        assert_eq!(tracker.current_run_seconds(t0() + secs(10), Duration::ZERO), 10);
    }

    #[test]
    fn test_idle_longer_than_run_clamps_to_zero() {
        let mut tracker = TimingTracker::new(5);
        tracker.set_mode(OperatingMode::Auto, t0(), Duration::ZERO);
        tracker.set_start_time(t0());

        let now = t0() + secs(10);
        assert_eq!(tracker.current_run_seconds(now, Duration::from_secs(30)), 0);
        assert_eq!(tracker.cumulative_auto_seconds(now, Duration::from_secs(30)), 5);
    }

    #[test]
    fn test_total_hours_and_overwrite() {
        let mut tracker = TimingTracker::new(0);
        tracker.set_total_auto_time(10_000 * 3600 + 1800);
        assert_eq!(tracker.total_hours(t0(), Duration::ZERO), 10_000);
        assert_eq!(
            format_hms(tracker.cumulative_auto_seconds(t0(), Duration::ZERO)),
            "10000:30:00"
        );

        tracker.set_total_auto_time(42);
        assert_eq!(tracker.accumulated_auto_seconds(), 42);
    }

    #[test]
    fn test_mode_labels() {
        assert_eq!(OperatingMode::Auto.to_string(), "Auto");
        assert_eq!(OperatingMode::from_auto(false), OperatingMode::Edit);
    }
}
