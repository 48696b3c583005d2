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


//! Heartbeat TCP server.
//!
//! [`ConnectionServer`] listens on a single port and hands every accepted
//! connection to its own task running the heartbeat echo protocol (see
//! [`heartbeat`]). Shutdown is cooperative: [`ConnectionServer::stop`] cancels
//! the run's [`CancelSignal`], the accept loop closes the listener and each
//! connection task closes its socket at its next wait.

pub mod heartbeat;
pub mod registry;

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use log::{error, info, warn};
use tokio::net::{TcpListener, TcpSocket};
use tokio::sync::broadcast;
use tokio::time::sleep;

use crate::cancel::CancelSignal;
use crate::error::{ServerError, ServerResult};
use heartbeat::HeartbeatLimits;
pub use heartbeat::{heartbeat_reply, HEARTBEAT_FORMAT};
pub use registry::{ConnectionGuard, ConnectionId, ConnectionInfo, ConnectionRegistry};

/// Default listening port.
pub const DEFAULT_PORT: u16 = 8016;
/// Default listen backlog.
pub const DEFAULT_BACKLOG: u32 = 5;
/// Default per-connection idle window.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(10);
/// Default maximum bytes taken per read.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 256;

/// Floor for a configured idle window; zero would close every connection.
const MIN_IDLE_TIMEOUT: Duration = Duration::from_millis(1);

/// Pause after a failed `accept()` before trying again.
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(250);
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Configuration for [`ConnectionServer`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind; the unspecified address listens on all interfaces.
    pub bind_address: IpAddr,
    /// Port to bind; 0 picks an ephemeral port.
    pub port: u16,
    /// Pending-connection backlog passed to `listen()`.
    pub backlog: u32,
    /// A connection silent for this long is closed.
    pub idle_timeout: Duration,
    /// Maximum bytes taken from the socket per read.
    pub read_buffer_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            backlog: DEFAULT_BACKLOG,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }
}

impl ServerConfig {
    /// Socket address the server binds to.
    #[must_use]
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }
}

/// Why a connection was closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Nothing was received within the idle window.
    IdleTimeout,
    /// The peer closed its side (zero-length read).
    PeerClosed,
    /// The server is shutting down.
    Cancelled,
    /// Reading or writing failed.
    Failed(String),
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IdleTimeout => write!(f, "idle timeout"),
            Self::PeerClosed => write!(f, "closed by peer"),
            Self::Cancelled => write!(f, "server shutdown"),
            Self::Failed(e) => write!(f, "I/O error: {e}"),
        }
    }
}

/// Lifecycle events published by the server.
#[derive(Debug, Clone)]
pub enum ServerEvent {
    /// The listener is bound and accepting.
    Listening(SocketAddr),
    /// A connection was accepted and registered.
    ConnectionAccepted { id: ConnectionId, peer: SocketAddr },
    /// A connection was closed and removed from the registry.
    ConnectionClosed { id: ConnectionId, reason: CloseReason },
    /// The accept loop exited and the listener was closed.
    Stopped(SocketAddr),
}

struct ActiveRun {
    cancel: CancelSignal,
    local_addr: SocketAddr,
}

/// Cancellable heartbeat server.
///
/// `start` and `stop` must be called from within a tokio runtime; neither
/// waits for the background tasks.
pub struct ConnectionServer {
    config: ServerConfig,
    registry: ConnectionRegistry,
    events: broadcast::Sender<ServerEvent>,
    run: Mutex<Option<ActiveRun>>,
}

impl std::fmt::Debug for ConnectionServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionServer")
            .field("config", &self.config)
            .field("connections", &self.registry.len())
            .finish_non_exhaustive()
    }
}

impl ConnectionServer {
    #[must_use]
    pub fn new(config: ServerConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            config,
            registry: ConnectionRegistry::new(),
            events,
            run: Mutex::new(None),
        }
    }

    /// Bind the listener and start accepting in the background.
    ///
    /// Returns the bound address. Bind and listen failures are returned
    /// here; everything after that is handled inside the server.
    pub fn start(&self) -> ServerResult<SocketAddr> {
        let mut run = self.lock_run();
        if let Some(active) = run.as_ref() {
            return Err(ServerError::AlreadyRunning(active.local_addr));
        }

        let listener = bind(&self.config)?;
        let local_addr = listener.local_addr().map_err(|source| ServerError::Bind {
            addr: self.config.socket_addr(),
            source,
        })?;

        let cancel = CancelSignal::new();
        let limits = HeartbeatLimits {
            idle_timeout: self.config.idle_timeout.max(MIN_IDLE_TIMEOUT),
            read_buffer_size: self.config.read_buffer_size.max(1),
        };

        info!("Heartbeat server listening on {}", local_addr);
        let _ = self.events.send(ServerEvent::Listening(local_addr));

        tokio::spawn(accept_loop(
            listener,
            local_addr,
            limits,
            self.registry.clone(),
            cancel.clone(),
            self.events.clone(),
        ));

        *run = Some(ActiveRun { cancel, local_addr });
        Ok(local_addr)
    }

    /// Request shutdown. Returns immediately; a no-op when not running.
    pub fn stop(&self) {
        if let Some(active) = self.lock_run().take() {
            info!("Stopping heartbeat server on {}", active.local_addr);
            active.cancel.request_cancel();
        }
    }

    /// Whether a run is active (started and not yet stopped).
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.lock_run().is_some()
    }

    /// Address of the active run's listener.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.lock_run().as_ref().map(|active| active.local_addr)
    }

    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Number of open connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }

    /// Open connections, oldest first.
    #[must_use]
    pub fn connections(&self) -> Vec<ConnectionInfo> {
        self.registry.snapshot()
    }

    /// Subscribe to server lifecycle events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.events.subscribe()
    }

    fn lock_run(&self) -> MutexGuard<'_, Option<ActiveRun>> {
        self.run.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for ConnectionServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn bind(config: &ServerConfig) -> ServerResult<TcpListener> {
    let addr = config.socket_addr();
    let bind_error = |source| ServerError::Bind { addr, source };

    let socket = match addr {
        SocketAddr::V4(_) => TcpSocket::new_v4(),
        SocketAddr::V6(_) => TcpSocket::new_v6(),
    }
    .map_err(bind_error)?;

    #[cfg(not(windows))]
    socket.set_reuseaddr(true).map_err(bind_error)?;

    socket.bind(addr).map_err(bind_error)?;
    socket.listen(config.backlog).map_err(bind_error)
}

async fn accept_loop(
    listener: TcpListener,
    local_addr: SocketAddr,
    limits: HeartbeatLimits,
    registry: ConnectionRegistry,
    cancel: CancelSignal,
    events: broadcast::Sender<ServerEvent>,
) {
    loop {
        let accepted = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, peer)) => {
                let guard = registry.register(peer);
                let _ = events.send(ServerEvent::ConnectionAccepted {
                    id: guard.id(),
                    peer,
                });
                tokio::spawn(heartbeat::serve(
                    stream,
                    guard,
                    limits,
                    cancel.clone(),
                    events.clone(),
                ));
            }
            Err(e) => {
                error!("Accept failed on {}: {}", local_addr, e);
                tokio::select! {
                    () = sleep(ACCEPT_RETRY_DELAY) => {}
                    () = cancel.cancelled() => break,
                }
            }
        }
    }

    drop(listener);
    if !registry.is_empty() {
        warn!("{} connection(s) still closing", registry.len());
    }
    info!("Heartbeat server on {} stopped", local_addr);
    let _ = events.send(ServerEvent::Stopped(local_addr));
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(5);

    fn loopback_config() -> ServerConfig {
        ServerConfig {
            bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 0,
            ..Default::default()
        }
    }

    async fn next_event(rx: &mut broadcast::Receiver<ServerEvent>) -> ServerEvent {
        timeout(WAIT, rx.recv())
            .await
            .expect("timed out waiting for server event")
            .expect("event channel closed")
    }

    async fn wait_closed(rx: &mut broadcast::Receiver<ServerEvent>) -> CloseReason {
        loop {
            if let ServerEvent::ConnectionClosed { reason, .. } = next_event(rx).await {
                return reason;
            }
        }
    }

    async fn wait_stopped(rx: &mut broadcast::Receiver<ServerEvent>) {
        while !matches!(next_event(rx).await, ServerEvent::Stopped(_)) {}
    }

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.socket_addr().to_string(), "0.0.0.0:8016");
        assert_eq!(config.backlog, 5);
        assert_eq!(config.idle_timeout, Duration::from_secs(10));
        assert_eq!(config.read_buffer_size, 256);
    }

    #[tokio::test]
    async fn test_ping_gets_timestamp_and_peer_close_unregisters() {
        let server = ConnectionServer::new(loopback_config());
        let mut events = server.subscribe();
        let addr = server.start().unwrap();

        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(b"ping").await.unwrap();
        let mut reply = [0u8; 12];
        timeout(WAIT, client.read_exact(&mut reply)).await.unwrap().unwrap();

        let text = std::str::from_utf8(&reply).unwrap();
        assert!(chrono::NaiveTime::parse_from_str(text, "%H:%M:%S%.3f").is_ok(), "{text}");
        assert_eq!(server.connection_count(), 1);
        assert_eq!(server.connections()[0].peer, client.local_addr().unwrap());

        drop(client);
        assert_eq!(wait_closed(&mut events).await, CloseReason::PeerClosed);
        assert_eq!(server.connection_count(), 0);

        server.stop();
    }

    #[tokio::test]
    async fn test_zero_read_buffer_still_serves_heartbeats() {
        let server = ConnectionServer::new(ServerConfig {
            read_buffer_size: 0,
            ..loopback_config()
        });
        let mut events = server.subscribe();
        let addr = server.start().unwrap();

        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(b"p").await.unwrap();
        let mut reply = [0u8; 12];
        timeout(WAIT, client.read_exact(&mut reply)).await.unwrap().unwrap();
        assert!(chrono::NaiveTime::parse_from_str(
            std::str::from_utf8(&reply).unwrap(),
            "%H:%M:%S%.3f"
        )
        .is_ok());
        assert_eq!(server.connection_count(), 1);

        drop(client);
        assert_eq!(wait_closed(&mut events).await, CloseReason::PeerClosed);
        server.stop();
    }

    #[tokio::test]
    async fn test_zero_idle_window_closes_as_timeout() {
        let server = ConnectionServer::new(ServerConfig {
            idle_timeout: Duration::ZERO,
            ..loopback_config()
        });
        let mut events = server.subscribe();
        let addr = server.start().unwrap();

        let _client = TcpStream::connect(addr).await.unwrap();
        assert_eq!(wait_closed(&mut events).await, CloseReason::IdleTimeout);
        server.stop();
    }

    #[tokio::test]
    async fn test_silent_connection_is_closed_by_server() {
        let server = ConnectionServer::new(ServerConfig {
            idle_timeout: Duration::from_millis(200),
            ..loopback_config()
        });
        let mut events = server.subscribe();
        let addr = server.start().unwrap();

        let mut client = TcpStream::connect(addr).await.unwrap();
        assert_eq!(wait_closed(&mut events).await, CloseReason::IdleTimeout);

        let mut buf = [0u8; 16];
        let n = timeout(WAIT, client.read(&mut buf)).await.unwrap().unwrap_or(0);
        assert_eq!(n, 0);
        assert_eq!(server.connection_count(), 0);

        server.stop();
    }

    #[tokio::test]
    async fn test_stop_is_idempotent_and_releases_listener() {
        let server = ConnectionServer::new(loopback_config());
        let mut events = server.subscribe();
        let addr = server.start().unwrap();

        let mut client = TcpStream::connect(addr).await.unwrap();
        assert!(matches!(
            next_event(&mut events).await,
            ServerEvent::Listening(_)
        ));
        assert!(matches!(
            next_event(&mut events).await,
            ServerEvent::ConnectionAccepted { .. }
        ));

        server.stop();
        server.stop();
        assert!(!server.is_running());
        assert!(server.local_addr().is_none());

        let mut closed = false;
        let mut stopped = false;
        while !(closed && stopped) {
            match next_event(&mut events).await {
                ServerEvent::ConnectionClosed { reason, .. } => {
                    assert_eq!(reason, CloseReason::Cancelled);
                    closed = true;
                }
                ServerEvent::Stopped(stopped_addr) => {
                    assert_eq!(stopped_addr, addr);
                    stopped = true;
                }
                _ => {}
            }
        }

        let mut buf = [0u8; 4];
        let n = timeout(WAIT, client.read(&mut buf)).await.unwrap().unwrap_or(0);
        assert_eq!(n, 0);
        assert!(TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn test_start_while_running_is_rejected() {
        let server = ConnectionServer::new(loopback_config());
        let addr = server.start().unwrap();

        match server.start() {
            Err(ServerError::AlreadyRunning(running)) => assert_eq!(running, addr),
            other => panic!("expected AlreadyRunning, got {other:?}"),
        }
        server.stop();
    }

    #[tokio::test]
    async fn test_restart_after_stop_uses_fresh_signal() {
        let server = ConnectionServer::new(loopback_config());
        let mut events = server.subscribe();
        server.start().unwrap();
        server.stop();
        wait_stopped(&mut events).await;

        let addr = server.start().unwrap();
        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(b"again").await.unwrap();
        let mut reply = [0u8; 12];
        timeout(WAIT, client.read_exact(&mut reply)).await.unwrap().unwrap();
        server.stop();
    }

    #[tokio::test]
    async fn test_bind_failure_is_reported() {
        let first = ConnectionServer::new(loopback_config());
        let addr = first.start().unwrap();

        let second = ConnectionServer::new(ServerConfig {
            port: addr.port(),
            ..loopback_config()
        });
        assert!(matches!(second.start(), Err(ServerError::Bind { .. })));
        assert!(!second.is_running());
        first.stop();
    }

    #[tokio::test]
    async fn test_connections_are_independent() {
        let server = ConnectionServer::new(loopback_config());
        let mut events = server.subscribe();
        let addr = server.start().unwrap();

        let mut a = TcpStream::connect(addr).await.unwrap();
        let b = TcpStream::connect(addr).await.unwrap();

        drop(b);
        assert_eq!(wait_closed(&mut events).await, CloseReason::PeerClosed);

        a.write_all(b"ping").await.unwrap();
        let mut reply = [0u8; 12];
        timeout(WAIT, a.read_exact(&mut reply)).await.unwrap().unwrap();
        assert_eq!(server.connection_count(), 1);

        server.stop();
    }
}
