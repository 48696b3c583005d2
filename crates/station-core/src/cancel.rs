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


//! Shared, one-way cancellation signal.

use log::debug;
use tokio_util::sync::CancellationToken;

/// Cancellation signal shared by the accept loop, every connection handler
/// and the idle timer.
///
/// Once cancelled a signal stays cancelled; restarting work requires a fresh
/// signal. Clones observe the same underlying flag.
#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
    token: CancellationToken,
}

impl CancelSignal {
    /// Create a new, un-cancelled signal.
    #[must_use]
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Request cancellation. Calling this more than once, or from several
    /// tasks at the same time, is a no-op after the first call.
    pub fn request_cancel(&self) {
        if !self.token.is_cancelled() {
            debug!("Cancellation requested");
        }
        self.token.cancel();
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Completes once cancellation has been requested.
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_is_idempotent() {
        let signal = CancelSignal::new();
        assert!(!signal.is_cancelled());

        signal.request_cancel();
        signal.request_cancel();
        assert!(signal.is_cancelled());
    }

    #[test]
    fn test_clones_share_state() {
        let signal = CancelSignal::new();
        let observer = signal.clone();
        signal.request_cancel();
        assert!(observer.is_cancelled());

        // A fresh signal starts over.
        assert!(!CancelSignal::new().is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_wakes_waiter() {
        let signal = CancelSignal::new();
        let waiter = {
            let signal = signal.clone();
            tokio::spawn(async move { signal.cancelled().await })
        };

        signal.request_cancel();
        tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();
    }
}
