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


//! Operator console.
//!
//! Reads commands from stdin and drives the session the way the workstation
//! UI would: mode switches, part counts and operator activity.

use std::str::FromStr;

use log::{info, warn};
use station_core::{CancelSignal, StationSession};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::status::SharedStatusBoard;

const HELP: &str = "commands: auto | edit | part | parts <n> | activity | status | help | quit";

/// A console command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Enter Auto mode and start a new run
    Auto,
    /// Return to Edit mode
    Edit,
    /// One part inspected
    Part,
    /// Overwrite the parts counter
    SetParts(u64),
    /// Operator activity without any other effect
    Activity,
    Status,
    Help,
    Quit,
}

impl FromStr for Command {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let command = words.next().unwrap_or_default().to_ascii_lowercase();
        let argument = words.next();

        match (command.as_str(), argument) {
            ("auto", None) => Ok(Self::Auto),
            ("edit", None) => Ok(Self::Edit),
            ("part", None) => Ok(Self::Part),
            ("parts", Some(n)) => n
                .parse()
                .map(Self::SetParts)
                .map_err(|e| format!("invalid part count '{n}': {e}")),
            ("activity", None) => Ok(Self::Activity),
            ("status", None) => Ok(Self::Status),
            ("help" | "?", None) => Ok(Self::Help),
            ("quit" | "exit", None) => Ok(Self::Quit),
            ("", _) => Err("empty command".to_string()),
            _ => Err(format!("unknown command '{}'", line.trim())),
        }
    }
}

/// Apply a command to the session. Returns text to show the operator.
pub fn execute(command: Command, session: &StationSession, board: &SharedStatusBoard) -> String {
    // Every command comes from the operator, so it counts as activity.
    session.reset_idle_timer();

    match command {
        Command::Auto => {
            // Already in Auto: keep the running session.
            if session.set_mode(true) {
                session.set_start_time();
            }
            format!("Auto mode, total {}", session.total_auto_time())
        }
        Command::Edit => {
            session.set_mode(false);
            format!("Edit mode, total {}", session.total_auto_time())
        }
        Command::Part => format!("parts: {}", session.plus_total_parts()),
        Command::SetParts(n) => {
            session.set_total_parts(n);
            format!("parts: {n}")
        }
        Command::Activity => "ok".to_string(),
        Command::Status => {
            let snapshot = session.snapshot();
            let board = board.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            format!(
                "{} | run {} | total {} ({}h) | parts {} | idle {}s\n{}",
                snapshot.mode,
                snapshot.auto_time,
                snapshot.total_auto_time,
                snapshot.total_hours,
                snapshot.total_parts,
                snapshot.idle_time,
                board.summary()
            )
        }
        Command::Help | Command::Quit => HELP.to_string(),
    }
}

/// Read commands from stdin until `quit`, end of input or shutdown.
pub async fn run(session: &StationSession, board: SharedStatusBoard, shutdown: CancelSignal) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("{HELP}");

    loop {
        let line = tokio::select! {
            () = shutdown.cancelled() => return,
            line = lines.next_line() => line,
        };

        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => {
                info!("Console input closed");
                return;
            }
            Err(e) => {
                warn!("Console read failed: {}", e);
                return;
            }
        };

        if line.trim().is_empty() {
            continue;
        }

        match line.parse::<Command>() {
            Ok(Command::Quit) => {
                shutdown.request_cancel();
                return;
            }
            Ok(command) => println!("{}", execute(command, session, &board)),
            Err(e) => println!("{e}\n{HELP}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::StatusBoard;
    use station_core::OperatingMode;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_parse_commands() {
        assert_eq!("auto".parse::<Command>(), Ok(Command::Auto));
        assert_eq!("  EDIT ".parse::<Command>(), Ok(Command::Edit));
        assert_eq!("parts 42".parse::<Command>(), Ok(Command::SetParts(42)));
        assert_eq!("exit".parse::<Command>(), Ok(Command::Quit));
        assert!("parts".parse::<Command>().is_err());
        assert!("parts many".parse::<Command>().is_err());
        assert!("launch".parse::<Command>().is_err());
        assert_eq!("".parse::<Command>(), Err("empty command".to_string()));
    }

    #[tokio::test]
    async fn test_execute_drives_session() {
        let session = StationSession::new(60);
        let board = Arc::new(Mutex::new(StatusBoard::new()));

        execute(Command::Auto, &session, &board);
        assert_eq!(session.mode(), OperatingMode::Auto);

        assert_eq!(execute(Command::Part, &session, &board), "parts: 1");
        execute(Command::SetParts(9), &session, &board);
        assert_eq!(session.total_parts(), 9);

        let reply = execute(Command::Edit, &session, &board);
        assert_eq!(session.mode(), OperatingMode::Edit);
        assert!(reply.starts_with("Edit mode, total 00:01:0"), "{reply}");

        let status = execute(Command::Status, &session, &board);
        assert!(status.starts_with("Edit | run 00:00:00"), "{status}");
    }

    #[tokio::test]
    async fn test_repeated_auto_keeps_running_session() {
        let session = StationSession::new(100);
        let board = Arc::new(Mutex::new(StatusBoard::new()));

        execute(Command::Auto, &session, &board);
        session.set_start_time_at(chrono::Local::now() - chrono::Duration::seconds(600));
        let before = session.total_auto_time_seconds();
        assert!((699..=701).contains(&before), "before {before}");

        execute(Command::Auto, &session, &board);
        let after = session.total_auto_time_seconds();
        assert!(after >= before, "before {before} after {after}");
        assert!((599..=601).contains(&session.auto_time_seconds()));
    }
}
