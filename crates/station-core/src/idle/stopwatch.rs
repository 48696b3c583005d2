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


//! Start/stop elapsed-time counter.

use std::time::Duration;

use tokio::time::Instant;

/// Accumulating stopwatch. Stopping keeps the elapsed value; starting again
/// resumes from it.
#[derive(Debug, Clone, Default)]
pub struct Stopwatch {
    accumulated: Duration,
    started_at: Option<Instant>,
}

impl Stopwatch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start or resume. No effect while already running.
    pub fn start(&mut self) {
        if self.started_at.is_none() {
            self.started_at = Some(Instant::now());
        }
    }

    /// Stop, keeping the elapsed value. No effect while stopped.
    pub fn stop(&mut self) {
        if let Some(started_at) = self.started_at.take() {
            self.accumulated += started_at.elapsed();
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.started_at.is_some()
    }

    /// Total time spent running, including the current stretch.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.accumulated
            + self
                .started_at
                .map_or(Duration::ZERO, |started_at| started_at.elapsed())
    }
}
