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


//! Workstation status session.
//!
//! A [`StationSession`] is built once at start-up and shared (as
//! [`SharedSession`]) with whatever needs it: the operator console, the
//! status display and the persistence layer. It owns the timing tracker, the
//! idle watcher and the parts counter, and publishes every change on a
//! broadcast channel.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};
use std::time::Duration;

use chrono::{DateTime, Local};
use log::{debug, info};
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;

use crate::cancel::CancelSignal;
use crate::event::{StatusEvent, StatusSnapshot};
use crate::idle::IdleWatcher;
use crate::timing::{format_hms, OperatingMode, TimingTracker};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Thread-safe handle to a session.
pub type SharedSession = Arc<StationSession>;

/// Mode timing, idle state and parts count for one workstation.
#[derive(Debug)]
pub struct StationSession {
    timing: RwLock<TimingTracker>,
    idle: IdleWatcher,
    total_parts: AtomicU64,
    events: broadcast::Sender<StatusEvent>,
    refresh: Mutex<Option<CancelSignal>>,
}

impl StationSession {
    /// Create a session in Edit mode, seeded with the Auto time carried over
    /// from earlier runs.
    #[must_use]
    pub fn new(accumulated_auto_seconds: u64) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            timing: RwLock::new(TimingTracker::new(accumulated_auto_seconds)),
            idle: IdleWatcher::new(events.clone()),
            total_parts: AtomicU64::new(0),
            events,
            refresh: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn shared(accumulated_auto_seconds: u64) -> SharedSession {
        Arc::new(Self::new(accumulated_auto_seconds))
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.events.subscribe()
    }

    // ===== Mode and run time =====

    /// Switch between Auto and Edit. Entering Auto does not restart the run;
    /// call [`set_start_time`](Self::set_start_time) as well. Returns whether
    /// the mode changed.
    pub fn set_mode(&self, auto: bool) -> bool {
        let mode = OperatingMode::from_auto(auto);
        let idle = self.idle.idle_elapsed();
        let changed = self.timing_mut().set_mode(mode, Local::now(), idle);
        if changed {
            info!("Mode changed to {}", mode);
            let _ = self.events.send(StatusEvent::ModeChanged(mode));
        }
        changed
    }

    #[must_use]
    pub fn mode(&self) -> OperatingMode {
        self.timing().mode()
    }

    /// Start the Auto run clock now.
    pub fn set_start_time(&self) {
        self.set_start_time_at(Local::now());
    }

    /// Start the Auto run clock at `at`.
    pub fn set_start_time_at(&self, at: DateTime<Local>) {
        self.timing_mut().set_start_time(at);
        debug!("Run start time set to {}", at.format("%Y-%m-%d %H:%M:%S"));
    }

    /// Overwrite the carried-over Auto time, e.g. with the persisted value.
    pub fn set_total_auto_time(&self, seconds: u64) {
        self.timing_mut().set_total_auto_time(seconds);
    }

    /// Current Auto run in whole seconds; zero outside Auto.
    #[must_use]
    pub fn auto_time_seconds(&self) -> u64 {
        self.timing()
            .current_run_seconds(Local::now(), self.idle.idle_elapsed())
    }

    /// Cumulative Auto time in whole seconds.
    #[must_use]
    pub fn total_auto_time_seconds(&self) -> u64 {
        self.timing()
            .cumulative_auto_seconds(Local::now(), self.idle.idle_elapsed())
    }

    #[must_use]
    pub fn auto_time(&self) -> String {
        format_hms(self.auto_time_seconds())
    }

    #[must_use]
    pub fn total_auto_time(&self) -> String {
        format_hms(self.total_auto_time_seconds())
    }

    /// Whole hours of cumulative Auto time.
    #[must_use]
    pub fn total_hours(&self) -> u64 {
        self.timing()
            .total_hours(Local::now(), self.idle.idle_elapsed())
    }

    // ===== Parts =====

    #[must_use]
    pub fn total_parts(&self) -> u64 {
        self.total_parts.load(Ordering::Acquire)
    }

    /// Overwrite the parts counter.
    pub fn set_total_parts(&self, parts: u64) {
        self.total_parts.store(parts, Ordering::Release);
        let _ = self.events.send(StatusEvent::PartsChanged(parts));
    }

    /// Count one more inspected part. Returns the new total.
    pub fn plus_total_parts(&self) -> u64 {
        let parts = self.total_parts.fetch_add(1, Ordering::AcqRel) + 1;
        let _ = self.events.send(StatusEvent::PartsChanged(parts));
        parts
    }

    // ===== Idle =====

    /// Arm the idle timer. Only the first call has any effect.
    pub fn set_idle_timer(&self, seconds: u64) -> bool {
        self.idle.set_idle_timer(Duration::from_secs(seconds))
    }

    /// Operator activity: clear the idle flag and restart the idle window.
    pub fn reset_idle_timer(&self) {
        self.idle.reset();
    }

    /// Start or resume the idle clock.
    pub fn start_idle_watch(&self) {
        self.idle.start_clock();
    }

    /// Stop the idle clock, keeping its value.
    pub fn stop_idle_watch(&self) {
        self.idle.stop_clock();
    }

    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.idle.is_idle()
    }

    /// Idle clock in whole seconds.
    #[must_use]
    pub fn idle_time(&self) -> u64 {
        self.idle.idle_time()
    }

    // ===== Snapshot and refresh =====

    #[must_use]
    pub fn snapshot(&self) -> StatusSnapshot {
        let now = Local::now();
        let idle = self.idle.idle_elapsed();
        let (mode, run, cumulative) = {
            let timing = self.timing();
            (
                timing.mode(),
                timing.current_run_seconds(now, idle),
                timing.cumulative_auto_seconds(now, idle),
            )
        };

        StatusSnapshot {
            system_time: now.format("%H:%M:%S").to_string(),
            system_date: now.format("%m/%d/%y").to_string(),
            mode,
            auto_time: format_hms(run),
            total_auto_time: format_hms(cumulative),
            total_hours: cumulative / 3600,
            total_parts: self.total_parts(),
            idle: self.idle.is_idle(),
            idle_time: idle.as_secs(),
        }
    }

    /// Publish a [`StatusEvent::Refresh`] every `interval`. No effect if
    /// refreshing is already enabled.
    pub fn enable_refresh(self: &Arc<Self>, interval: Duration) {
        let mut refresh = self.lock_refresh();
        if refresh.is_some() {
            return;
        }

        let cancel = CancelSignal::new();
        tokio::spawn(refresh_loop(Arc::downgrade(self), interval, cancel.clone()));
        *refresh = Some(cancel);
        debug!("Status refresh enabled every {:?}", interval);
    }

    /// Stop periodic refresh. No effect if it is not running.
    pub fn disable_refresh(&self) {
        if let Some(cancel) = self.lock_refresh().take() {
            cancel.request_cancel();
            debug!("Status refresh disabled");
        }
    }

    fn timing(&self) -> std::sync::RwLockReadGuard<'_, TimingTracker> {
        self.timing.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn timing_mut(&self) -> std::sync::RwLockWriteGuard<'_, TimingTracker> {
        self.timing.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_refresh(&self) -> MutexGuard<'_, Option<CancelSignal>> {
        self.refresh.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for StationSession {
    fn drop(&mut self) {
        self.disable_refresh();
    }
}

async fn refresh_loop(session: Weak<StationSession>, interval: Duration, cancel: CancelSignal) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }

        let Some(session) = session.upgrade() else {
            return;
        };
        let _ = session
            .events
            .send(StatusEvent::Refresh(session.snapshot()));
    }
}
