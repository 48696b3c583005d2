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


//! Per-connection "heartbeat echo" handler.
//!
//! Every read from the peer is answered with the server's local time as
//! `HH:mm:ss.fff`. The payload itself is only logged. A connection that stays
//! silent for the whole idle window is closed; the window restarts after each
//! successful read.

use std::net::Shutdown;
use std::time::Duration;

use chrono::{DateTime, Local};
use log::{debug, info, warn};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio::time::timeout;

use super::registry::{ConnectionGuard, ConnectionId};
use super::{CloseReason, ServerEvent};
use crate::cancel::CancelSignal;

/// Format used for heartbeat replies.
pub const HEARTBEAT_FORMAT: &str = "%H:%M:%S%.3f";

/// Render a heartbeat reply for the given instant.
#[must_use]
pub fn heartbeat_reply(now: DateTime<Local>) -> String {
    now.format(HEARTBEAT_FORMAT).to_string()
}

/// Limits applied to each connection.
#[derive(Debug, Clone, Copy)]
pub(crate) struct HeartbeatLimits {
    pub idle_timeout: Duration,
    pub read_buffer_size: usize,
}

/// Drive one accepted connection until it ends, then release it.
pub(crate) async fn serve(
    mut stream: TcpStream,
    guard: ConnectionGuard,
    limits: HeartbeatLimits,
    cancel: CancelSignal,
    events: broadcast::Sender<ServerEvent>,
) {
    let id = guard.id();
    info!("[{}] Connected from {}", id, guard.peer());

    let reason = exchange(&mut stream, id, limits, &cancel).await;
    match &reason {
        CloseReason::Failed(e) => warn!("[{}] Connection error: {}", id, e),
        other => info!("[{}] Closing connection ({})", id, other),
    }

    // Best effort: the peer may already be gone.
    match stream.into_std() {
        Ok(std_stream) => {
            if let Err(e) = std_stream.shutdown(Shutdown::Both) {
                debug!("[{}] Shutdown failed: {}", id, e);
            }
        }
        Err(e) => debug!("[{}] Could not detach socket for shutdown: {}", id, e),
    }

    drop(guard);
    let _ = events.send(ServerEvent::ConnectionClosed { id, reason });
}

/// Request/response loop. Returns why the connection should close.
pub(crate) async fn exchange<S>(
    stream: &mut S,
    id: ConnectionId,
    limits: HeartbeatLimits,
    cancel: &CancelSignal,
) -> CloseReason
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; limits.read_buffer_size];

    loop {
        let read = tokio::select! {
            biased;
            () = cancel.cancelled() => return CloseReason::Cancelled,
            read = timeout(limits.idle_timeout, stream.read(&mut buf)) => read,
        };

        let n = match read {
            Err(_) => return CloseReason::IdleTimeout,
            Ok(Ok(0)) => return CloseReason::PeerClosed,
            Ok(Ok(n)) => n,
            Ok(Err(e)) => return CloseReason::Failed(e.to_string()),
        };

        debug!("[{}] Received: {}", id, String::from_utf8_lossy(&buf[..n]));

        let reply = heartbeat_reply(Local::now());
        if let Err(e) = stream.write_all(reply.as_bytes()).await {
            return CloseReason::Failed(e.to_string());
        }
    }
}
