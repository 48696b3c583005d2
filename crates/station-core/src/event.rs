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


//! Observer-facing status types.

use serde::Serialize;

use crate::timing::OperatingMode;

/// Point-in-time view of the session, as shown on the status panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusSnapshot {
    /// Local wall clock, `HH:MM:SS`.
    pub system_time: String,
    /// Local date, `MM/DD/YY`.
    pub system_date: String,
    pub mode: OperatingMode,
    /// Current Auto run, `HH:MM:SS`; zero outside Auto.
    pub auto_time: String,
    /// Cumulative Auto time, `HH:MM:SS` with unbounded hours.
    pub total_auto_time: String,
    /// Whole hours of the cumulative Auto time.
    pub total_hours: u64,
    pub total_parts: u64,
    pub idle: bool,
    /// Idle clock in whole seconds.
    pub idle_time: u64,
}

/// Change notifications published by a
/// [`StationSession`](crate::session::StationSession).
#[derive(Debug, Clone)]
pub enum StatusEvent {
    /// The idle flag changed; carries the new value.
    IdleChanged(bool),
    /// The parts counter was incremented or set; carries the new value.
    PartsChanged(u64),
    /// The operating mode changed.
    ModeChanged(OperatingMode),
    /// Periodic refresh tick.
    Refresh(StatusSnapshot),
}
