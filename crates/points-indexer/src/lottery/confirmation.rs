// Copyright 2026 Boundless Foundation, Inc.
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

use std::{future::Future, time::Duration};

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Confirmed,
    /// The deadline passed without confirmation; the pending work is abandoned.
    TimedOut,
    Cancelled,
}

/// Repeats a check on a fixed interval until it succeeds, the deadline passes, or the
/// token is cancelled.
#[derive(Debug, Clone, Copy)]
pub struct ConfirmationPoll {
    pub interval: Duration,
    pub timeout: Duration,
}

impl ConfirmationPoll {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }

    pub async fn wait<F, Fut>(&self, cancel_token: &CancellationToken, mut check: F) -> PollOutcome
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = bool>,
    {
        let deadline = Instant::now() + self.timeout;
        loop {
            if cancel_token.is_cancelled() {
                return PollOutcome::Cancelled;
            }
            if check().await {
                return PollOutcome::Confirmed;
            }

            let now = Instant::now();
            if now >= deadline {
                return PollOutcome::TimedOut;
            }
            let pause = self.interval.min(deadline - now);
            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                _ = cancel_token.cancelled() => return PollOutcome::Cancelled,
            }
        }
    }
}
