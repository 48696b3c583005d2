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


//! Error types for the station core.

use std::net::SocketAddr;

use thiserror::Error;

/// Errors reported by [`ConnectionServer`](crate::tcp::ConnectionServer).
///
/// Only start-up failures surface here. Failures inside a single connection
/// are logged and end that connection; they never reach the caller.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listening socket could not be created, bound or put into listen mode.
    #[error("failed to listen on {addr}: {source}")]
    Bind {
        /// Address the server tried to listen on.
        addr: SocketAddr,
        /// Underlying socket error.
        #[source]
        source: std::io::Error,
    },

    /// `start()` was called while a previous run is still active.
    #[error("server is already running on {0}")]
    AlreadyRunning(SocketAddr),
}

/// Result alias for server operations.
pub type ServerResult<T> = Result<T, ServerError>;
