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


//! Registry of open server-side connections.
//!
//! The accept loop inserts, each connection handler removes itself when it
//! ends. Removal goes through [`ConnectionGuard`] so a handle is dropped from
//! the registry exactly once, whatever path the handler takes out.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Local};

/// Identifier of an accepted connection, unique for the registry's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Raw numeric value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// What the registry knows about one open connection.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub id: ConnectionId,
    /// Remote peer address.
    pub peer: SocketAddr,
    /// When the connection was accepted.
    pub accepted_at: DateTime<Local>,
}

type Entries = HashMap<ConnectionId, ConnectionInfo>;

/// Thread-safe set of open connections.
///
/// Cloning is cheap and every clone refers to the same set.
#[derive(Debug, Clone, Default)]
pub struct ConnectionRegistry {
    entries: Arc<Mutex<Entries>>,
    next_id: Arc<AtomicU64>,
}

impl ConnectionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a newly accepted connection.
    ///
    /// The returned guard removes the entry when dropped.
    #[must_use]
    pub fn register(&self, peer: SocketAddr) -> ConnectionGuard {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let info = ConnectionInfo {
            id,
            peer,
            accepted_at: Local::now(),
        };
        lock(&self.entries).insert(id, info);

        ConnectionGuard {
            id,
            peer,
            entries: Arc::clone(&self.entries),
        }
    }

    /// Number of open connections.
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the given connection is still open.
    #[must_use]
    pub fn contains(&self, id: ConnectionId) -> bool {
        lock(&self.entries).contains_key(&id)
    }

    /// Snapshot of the open connections, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<ConnectionInfo> {
        let mut connections: Vec<ConnectionInfo> = lock(&self.entries).values().cloned().collect();
        connections.sort_by_key(|c| c.id);
        connections
    }
}

/// Ownership of one registry entry, held by the connection's handler.
#[derive(Debug)]
pub struct ConnectionGuard {
    id: ConnectionId,
    peer: SocketAddr,
    entries: Arc<Mutex<Entries>>,
}

impl ConnectionGuard {
    #[must_use]
    pub const fn id(&self) -> ConnectionId {
        self.id
    }

    #[must_use]
    pub const fn peer(&self) -> SocketAddr {
        self.peer
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        lock(&self.entries).remove(&self.id);
    }
}

fn lock(entries: &Mutex<Entries>) -> MutexGuard<'_, Entries> {
    entries.lock().unwrap_or_else(PoisonError::into_inner)
}
