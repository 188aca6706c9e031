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

use std::{future::Future, pin::Pin, sync::Arc, time::Duration};

use anyhow::{Error as AnyhowErr, Result as AnyhowRes};
use thiserror::Error;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

#[derive(Error, Debug)]
pub enum SupervisorErr {
    /// Restart / replace the task after failure
    #[error("Recoverable error: {0}")]
    Recover(AnyhowErr),
    /// Hard failure and exit the task set
    #[error("Hard failure: {0}")]
    Fault(AnyhowErr),
}

pub type RetryRes = Pin<Box<dyn Future<Output = Result<(), SupervisorErr>> + Send + 'static>>;

pub trait RetryTask {
    /// Defines how to spawn a task to be monitored for restarts
    fn spawn(&self, cancel_token: CancellationToken) -> RetryRes;
}

/// Configuration for retry behavior in the supervisor
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Initial delay between retry attempts
    pub delay: Duration,
    /// Multiplier applied to the delay after each retry
    pub backoff_multiplier: f64,
    /// Maximum delay between retries, regardless of backoff
    pub max_delay: Duration,
    /// Maximum number of consecutive retries before giving up (None for unlimited)
    pub max_retries: Option<usize>,
    /// Duration after which to reset the retry counter if a task runs successfully
    pub reset_after: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(500),
            backoff_multiplier: 1.5,
            max_delay: Duration::from_secs(60),
            max_retries: None,
            // Reset the backoff after 5 minutes of running without a failure.
            reset_after: Some(Duration::from_secs(60 * 5)),
        }
    }
}

/// Supervisor for a single long running task. Recoverable failures and panics respawn the
/// task with backoff, so one failing job never takes the process down with it.
pub struct Supervisor<T: RetryTask> {
    task: Arc<T>,
    retry_policy: RetryPolicy,
    cancel_token: CancellationToken,
}

impl<T> Supervisor<T>
where
    T: RetryTask + Send + Sync + 'static,
{
    pub fn new(task: Arc<T>, cancel_token: CancellationToken) -> Self {
        Self { task, retry_policy: RetryPolicy::default(), cancel_token }
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// Calculate the delay for a specific retry attempt
    fn calculate_retry_delay(&self, retry_count: usize) -> Duration {
        if retry_count == 0 {
            return self.retry_policy.delay;
        }

        let backoff = self.retry_policy.delay.as_millis() as f64
            * self.retry_policy.backoff_multiplier.powi(retry_count as i32);

        let backoff_ms = backoff.min(self.retry_policy.max_delay.as_millis() as f64) as u64;

        Duration::from_millis(backoff_ms)
    }

    fn respawn(&self, tasks: &mut JoinSet<Result<(), SupervisorErr>>, delay: Duration) {
        let cancel = self.cancel_token.clone();
        let t = self.task.spawn(cancel.clone());
        tasks.spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => t.await,
                _ = cancel.cancelled() => Ok(()),
            }
        });
    }

    /// Run the supervisor, monitoring the task and handling retries
    pub async fn spawn(self) -> AnyhowRes<()> {
        let mut tasks = JoinSet::new();
        let mut retry_count = 0;
        let mut last_spawn_time = std::time::Instant::now();

        tracing::debug!("Spawning task");
        tasks.spawn(self.task.spawn(self.cancel_token.clone()));

        while let Some(res) = tasks.join_next().await {
            let failure = match res {
                Ok(Ok(())) => {
                    tracing::debug!("Task exited cleanly");
                    None
                }
                Ok(Err(SupervisorErr::Recover(err))) => Some(err),
                Ok(Err(SupervisorErr::Fault(err))) => {
                    tracing::error!("FAULT: Hard failure detected: {err:?}");
                    anyhow::bail!("Hard failure in supervisor task");
                }
                Err(err) if err.is_cancelled() => {
                    tracing::warn!("Task was canceled, treating it like a clean exit");
                    None
                }
                Err(err) => Some(anyhow::anyhow!("task panicked: {err}")),
            };

            let Some(err) = failure else {
                continue;
            };
            if self.cancel_token.is_cancelled() {
                tracing::debug!("Shutdown requested, not respawning after failure: {err:?}");
                continue;
            }

            if let Some(reset_duration) = self.retry_policy.reset_after {
                let task_duration = last_spawn_time.elapsed();
                if task_duration >= reset_duration && retry_count > 0 {
                    tracing::info!(
                        "Task ran for {task_duration:?} before failing, resetting retry counter from {retry_count}"
                    );
                    retry_count = 0;
                }
            }

            if let Some(max) = self.retry_policy.max_retries {
                if retry_count >= max {
                    tracing::error!("Exceeded maximum retries ({max}) for task");
                    anyhow::bail!("Exceeded maximum retries for task");
                }
            }

            let delay = self.calculate_retry_delay(retry_count);
            tracing::warn!(
                "Recoverable failure detected: {err:?}, spawning replacement (retry {}/{})",
                retry_count + 1,
                self.retry_policy.max_retries.map_or("inf".to_string(), |m| m.to_string())
            );
            self.respawn(&mut tasks, delay);
            retry_count += 1;
            last_spawn_time = std::time::Instant::now() + delay;
        }

        Ok(())
    }
}
