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


//! Status board fed from the server and session event streams.
//!
//! Keeps what a status panel shows: where the heartbeat server listens, how
//! many connections are open, the latest session snapshot and a rolling list
//! of diagnostic messages.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Local};
use station_core::{CloseReason, ServerEvent, StatusEvent, StatusSnapshot};

const MAX_DIAGNOSTICS: usize = 50;

/// Diagnostic message with timestamp
#[derive(Debug, Clone)]
pub struct DiagnosticMessage {
    pub timestamp: DateTime<Local>,
    pub level: DiagnosticLevel,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticLevel {
    Info,
    Warning,
    Error,
}

/// Aggregated workstation status
#[derive(Debug)]
pub struct StatusBoard {
    // Heartbeat server
    pub listening_on: Option<SocketAddr>,
    pub open_connections: usize,
    pub total_connections: u64,
    pub idle_timeouts: u64,
    pub connection_errors: u64,

    // Session
    pub last_snapshot: Option<StatusSnapshot>,
    pub idle: bool,
    pub total_parts: u64,

    // Diagnostic messages (keep last 50)
    pub diagnostics: VecDeque<DiagnosticMessage>,
    max_diagnostics: usize,
}

impl Default for StatusBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusBoard {
    pub fn new() -> Self {
        Self {
            listening_on: None,
            open_connections: 0,
            total_connections: 0,
            idle_timeouts: 0,
            connection_errors: 0,
            last_snapshot: None,
            idle: false,
            total_parts: 0,
            diagnostics: VecDeque::with_capacity(MAX_DIAGNOSTICS),
            max_diagnostics: MAX_DIAGNOSTICS,
        }
    }

    /// Record a heartbeat server event
    pub fn apply_server_event(&mut self, event: &ServerEvent) {
        match event {
            ServerEvent::Listening(addr) => {
                self.listening_on = Some(*addr);
                self.add_diagnostic(DiagnosticLevel::Info, format!("Listening on {addr}"));
            }
            ServerEvent::ConnectionAccepted { id, peer } => {
                self.open_connections += 1;
                self.total_connections += 1;
                self.add_diagnostic(DiagnosticLevel::Info, format!("[{id}] Connected from {peer}"));
            }
            ServerEvent::ConnectionClosed { id, reason } => {
                self.open_connections = self.open_connections.saturating_sub(1);
                let level = match reason {
                    CloseReason::IdleTimeout => {
                        self.idle_timeouts += 1;
                        DiagnosticLevel::Warning
                    }
                    CloseReason::Failed(_) => {
                        self.connection_errors += 1;
                        DiagnosticLevel::Error
                    }
                    CloseReason::PeerClosed | CloseReason::Cancelled => DiagnosticLevel::Info,
                };
                self.add_diagnostic(level, format!("[{id}] Closed: {reason}"));
            }
            ServerEvent::Stopped(addr) => {
                self.listening_on = None;
                self.add_diagnostic(DiagnosticLevel::Warning, format!("Stopped listening on {addr}"));
            }
        }
    }

    /// Record a session event
    pub fn apply_status_event(&mut self, event: &StatusEvent) {
        match event {
            StatusEvent::IdleChanged(idle) => {
                self.idle = *idle;
                let message = if *idle { "Operator idle" } else { "Operator active" };
                self.add_diagnostic(DiagnosticLevel::Info, message.to_string());
            }
            StatusEvent::PartsChanged(parts) => {
                self.total_parts = *parts;
            }
            StatusEvent::ModeChanged(mode) => {
                self.add_diagnostic(DiagnosticLevel::Info, format!("Mode changed to {mode}"));
            }
            StatusEvent::Refresh(snapshot) => {
                self.idle = snapshot.idle;
                self.total_parts = snapshot.total_parts;
                self.last_snapshot = Some(snapshot.clone());
            }
        }
    }

    /// Add a diagnostic message
    pub fn add_diagnostic(&mut self, level: DiagnosticLevel, message: String) {
        self.diagnostics.push_back(DiagnosticMessage {
            timestamp: Local::now(),
            level,
            message,
        });

        // Keep only the last N messages
        while self.diagnostics.len() > self.max_diagnostics {
            self.diagnostics.pop_front();
        }
    }

    /// One-line summary for the console
    pub fn summary(&self) -> String {
        let server = self
            .listening_on
            .map_or_else(|| "stopped".to_string(), |addr| addr.to_string());

        match &self.last_snapshot {
            Some(s) => format!(
                "{} {} | {} run {} total {} ({}h) | parts {} | {} | server {} ({} open)",
                s.system_date,
                s.system_time,
                s.mode,
                s.auto_time,
                s.total_auto_time,
                s.total_hours,
                self.total_parts,
                if self.idle { format!("idle {}s", s.idle_time) } else { "active".to_string() },
                server,
                self.open_connections,
            ),
            None => format!(
                "parts {} | {} | server {} ({} open)",
                self.total_parts,
                if self.idle { "idle" } else { "active" },
                server,
                self.open_connections,
            ),
        }
    }
}

/// Thread-safe wrapper for StatusBoard
pub type SharedStatusBoard = Arc<Mutex<StatusBoard>>;
