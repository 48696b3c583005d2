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


//! Status core for an inspection workstation.
//!
//! Two cooperating pieces live here:
//!
//! - **Heartbeat server** ([`tcp`]): a cancellable TCP server that answers
//!   every read with the local time (`HH:mm:ss.fff`) and drops connections
//!   that stay silent for the idle window.
//! - **Session** ([`session`]): operating-mode run time, operator idle
//!   detection and the inspected-parts counter, published to observers as
//!   [`StatusEvent`]s.
//!
//! # Quick Start
//!
//! ```no_run
//! use station_core::{ConnectionServer, ServerConfig, StationSession};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), station_core::ServerError> {
//!     let session = StationSession::shared(3600);
//!     session.set_idle_timer(300);
//!     session.enable_refresh(Duration::from_secs(1));
//!
//!     let server = ConnectionServer::new(ServerConfig::default());
//!     server.start()?;
//!
//!     session.set_mode(true);
//!     session.set_start_time();
//!
//!     tokio::time::sleep(Duration::from_secs(5)).await;
//!     println!("Auto time: {}", session.total_auto_time());
//!
//!     server.stop();
//!     Ok(())
//! }
//! ```
//!
//! # Using the Timing Tracker Alone
//!
//! ```
//! use station_core::timing::{format_hms, OperatingMode, TimingTracker};
//! use chrono::{Duration, Local};
//!
//! let start = Local::now();
//! let mut tracker = TimingTracker::new(100);
//! tracker.set_mode(OperatingMode::Auto, start, std::time::Duration::ZERO);
//! tracker.set_start_time(start);
//!
//! let later = start + Duration::seconds(30);
//! let total = tracker.cumulative_auto_seconds(later, std::time::Duration::ZERO);
//! assert_eq!(format_hms(total), "00:02:10");
//! ```

pub mod cancel;
pub mod error;
pub mod event;
pub mod idle;
pub mod session;
pub mod tcp;
pub mod timing;

pub use cancel::CancelSignal;
pub use error::{ServerError, ServerResult};
pub use event::{StatusEvent, StatusSnapshot};
pub use idle::IdleWatcher;
pub use session::{SharedSession, StationSession};
pub use tcp::{CloseReason, ConnectionServer, ServerConfig, ServerEvent};
pub use timing::{format_hms, OperatingMode, TimingTracker};
