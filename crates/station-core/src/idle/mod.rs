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


//! Operator inactivity detection.
//!
//! [`IdleWatcher`] is a two-state machine. It starts *active*; when its
//! one-shot timer runs out without a [`reset`](IdleWatcher::reset) it turns
//! *idle*, starts (or resumes) the idle clock and publishes
//! [`StatusEvent::IdleChanged`]. Only `reset` brings it back to active: the
//! flag clears, the clock stops (keeping its value) and the timer is rearmed
//! for the full window counted from the reset.
//!
//! The window is fixed by the first [`set_idle_timer`](IdleWatcher::set_idle_timer)
//! call; later calls are ignored.

mod stopwatch;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use log::{debug, info};
use tokio::sync::{broadcast, Notify};
use tokio::time::{sleep_until, Instant};

use crate::cancel::CancelSignal;
use crate::event::StatusEvent;
pub use stopwatch::Stopwatch;

#[derive(Debug, Default)]
struct IdleState {
    idle: bool,
    clock: Option<Stopwatch>,
    /// When the armed timer fires; `None` while idle or unarmed.
    deadline: Option<Instant>,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<IdleState>,
    rearm: Notify,
    events: broadcast::Sender<StatusEvent>,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, IdleState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Timer expiry. Ignored if the deadline moved since the timer slept on it.
    ///
    /// Idle events are sent with the state lock held so they reach
    /// subscribers in the same order as the flag changes.
    fn expire(&self, deadline: Instant) {
        let mut state = self.state();
        if state.deadline != Some(deadline) {
            return;
        }
        state.deadline = None;
        state.clock.get_or_insert_with(Stopwatch::new).start();
        if !state.idle {
            state.idle = true;
            info!("Operator idle");
            let _ = self.events.send(StatusEvent::IdleChanged(true));
        }
    }
}

#[derive(Debug)]
struct ArmedTimer {
    window: Duration,
    cancel: CancelSignal,
}

/// One-shot inactivity timer with an idle flag and idle clock.
#[derive(Debug)]
pub struct IdleWatcher {
    shared: Arc<Shared>,
    timer: Mutex<Option<ArmedTimer>>,
}

impl IdleWatcher {
    /// Create an unarmed watcher publishing to `events`.
    #[must_use]
    pub fn new(events: broadcast::Sender<StatusEvent>) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(IdleState::default()),
                rearm: Notify::new(),
                events,
            }),
            timer: Mutex::new(None),
        }
    }

    /// Arm the timer with `window`. Must run inside a tokio runtime.
    ///
    /// Only the first call takes effect; the window cannot be changed
    /// afterwards. Returns whether this call armed the timer.
    pub fn set_idle_timer(&self, window: Duration) -> bool {
        let mut timer = self.lock_timer();
        if let Some(armed) = timer.as_ref() {
            debug!(
                "Idle timer already armed with {:?}, ignoring {:?}",
                armed.window, window
            );
            return false;
        }

        self.shared.state().deadline = Some(Instant::now() + window);
        let cancel = CancelSignal::new();
        tokio::spawn(run_timer(Arc::clone(&self.shared), cancel.clone()));
        *timer = Some(ArmedTimer { window, cancel });

        info!("Idle timer armed: {}s", window.as_secs());
        true
    }

    /// Record operator activity: leave the idle state and restart the window.
    pub fn reset(&self) {
        let timer = self.lock_timer();
        {
            let mut state = self.shared.state();
            if let Some(clock) = state.clock.as_mut() {
                clock.stop();
            }
            if let Some(armed) = timer.as_ref() {
                state.deadline = Some(Instant::now() + armed.window);
            }
            if state.idle {
                state.idle = false;
                info!("Operator active");
                let _ = self.shared.events.send(StatusEvent::IdleChanged(false));
            }
        }

        if timer.is_some() {
            self.shared.rearm.notify_one();
        }
    }

    /// Start or resume the idle clock without touching the flag.
    pub fn start_clock(&self) {
        self.shared
            .state()
            .clock
            .get_or_insert_with(Stopwatch::new)
            .start();
    }

    /// Stop the idle clock without touching the flag.
    pub fn stop_clock(&self) {
        if let Some(clock) = self.shared.state().clock.as_mut() {
            clock.stop();
        }
    }

    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.shared.state().idle
    }

    /// Idle clock value; zero if the clock never started.
    #[must_use]
    pub fn idle_elapsed(&self) -> Duration {
        self.shared
            .state()
            .clock
            .as_ref()
            .map_or(Duration::ZERO, Stopwatch::elapsed)
    }

    /// Idle clock value in whole seconds, rounded down.
    #[must_use]
    pub fn idle_time(&self) -> u64 {
        self.idle_elapsed().as_secs()
    }

    /// The window fixed by the first `set_idle_timer` call.
    #[must_use]
    pub fn window(&self) -> Option<Duration> {
        self.lock_timer().as_ref().map(|armed| armed.window)
    }

    fn lock_timer(&self) -> MutexGuard<'_, Option<ArmedTimer>> {
        self.timer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for IdleWatcher {
    fn drop(&mut self) {
        if let Some(armed) = self.lock_timer().take() {
            armed.cancel.request_cancel();
        }
    }
}

async fn run_timer(shared: Arc<Shared>, cancel: CancelSignal) {
    loop {
        let deadline = shared.state().deadline;
        let fired = match deadline {
            Some(deadline) => tokio::select! {
                biased;
                () = cancel.cancelled() => return,
                () = shared.rearm.notified() => None,
                () = sleep_until(deadline) => Some(deadline),
            },
            None => tokio::select! {
                biased;
                () = cancel.cancelled() => return,
                () = shared.rearm.notified() => None,
            },
        };

        if let Some(deadline) = fired {
            shared.expire(deadline);
        }
    }
}
