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

//! Periodic jobs. Each job runs in its own supervised task, so a failing or panicking job
//! never stops the others.

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::{
    db::now_secs,
    ingestion::IngestionService,
    lottery::LotteryService,
    phase::PhaseTracker,
    task::{RetryRes, RetryTask, SupervisorErr},
    types::{Blockchain, Era},
};

#[async_trait]
pub trait PeriodicJob: Send + Sync {
    fn name(&self) -> String;

    fn interval(&self) -> Duration;

    async fn tick(&self, cancel_token: &CancellationToken) -> Result<()>;
}

/// Receives every job failure. The default implementation only logs.
pub trait ErrorReporter: Send + Sync {
    fn report(&self, job: &str, err: &anyhow::Error);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report(&self, job: &str, err: &anyhow::Error) {
        tracing::error!(job, "Job {job} failed: {err:?}");
    }
}

/// Runs a [PeriodicJob] on its interval until cancelled. Failed ticks are reported and
/// the next tick runs as scheduled.
pub struct JobRunner {
    job: Arc<dyn PeriodicJob>,
    reporter: Arc<dyn ErrorReporter>,
}

impl JobRunner {
    pub fn new(job: Arc<dyn PeriodicJob>, reporter: Arc<dyn ErrorReporter>) -> Self {
        Self { job, reporter }
    }
}

impl RetryTask for JobRunner {
    fn spawn(&self, cancel_token: CancellationToken) -> RetryRes {
        let job = self.job.clone();
        let reporter = self.reporter.clone();
        Box::pin(async move {
            let name = job.name();
            let period = job.interval();
            if period.is_zero() {
                return Err(SupervisorErr::Fault(anyhow::anyhow!("job {name} has a zero interval")));
            }
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            tracing::info!("Starting job {name} every {period:?}");
            loop {
                tokio::select! {
                    _ = interval.tick() => {}
                    _ = cancel_token.cancelled() => {
                        tracing::debug!("Job {name} cancelled");
                        return Ok(());
                    }
                }
                tracing::debug!("Running job {name}");
                if let Err(err) = job.tick(&cancel_token).await {
                    reporter.report(&name, &err);
                }
            }
        })
    }
}

pub struct IngestionJob {
    service: IngestionService,
    era: Era,
    blockchain: Blockchain,
    interval: Duration,
}

impl IngestionJob {
    pub fn new(service: IngestionService, era: Era, blockchain: Blockchain, interval: Duration) -> Self {
        Self { service, era, blockchain, interval }
    }
}

#[async_trait]
impl PeriodicJob for IngestionJob {
    fn name(&self) -> String {
        format!("ingestion-era{}-{}", self.era.number(), self.blockchain)
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn tick(&self, _cancel_token: &CancellationToken) -> Result<()> {
        self.service
            .run(self.era, self.blockchain)
            .await
            .with_context(|| format!("era {} ingestion on {}", self.era, self.blockchain))?;
        Ok(())
    }
}

pub struct PruneJob {
    lottery: Arc<LotteryService>,
    interval: Duration,
}

impl PruneJob {
    pub fn new(lottery: Arc<LotteryService>, interval: Duration) -> Self {
        Self { lottery, interval }
    }
}

#[async_trait]
impl PeriodicJob for PruneJob {
    fn name(&self) -> String {
        "lottery-prune".into()
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn tick(&self, _cancel_token: &CancellationToken) -> Result<()> {
        self.lottery.prune_all().await.context("global lottery prune")?;
        Ok(())
    }
}

pub struct TransferSyncJob {
    lottery: Arc<LotteryService>,
    interval: Duration,
}

impl TransferSyncJob {
    pub fn new(lottery: Arc<LotteryService>, interval: Duration) -> Self {
        Self { lottery, interval }
    }
}

#[async_trait]
impl PeriodicJob for TransferSyncJob {
    fn name(&self) -> String {
        "lottery-transfer-sync".into()
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn tick(&self, _cancel_token: &CancellationToken) -> Result<()> {
        self.lottery.sync_ownership_transfers(now_secs()).await.context("ownership transfer sync")?;
        Ok(())
    }
}

pub struct MissedResultsJob {
    lottery: Arc<LotteryService>,
    interval: Duration,
}

impl MissedResultsJob {
    pub fn new(lottery: Arc<LotteryService>, interval: Duration) -> Self {
        Self { lottery, interval }
    }
}

#[async_trait]
impl PeriodicJob for MissedResultsJob {
    fn name(&self) -> String {
        "lottery-missed-results".into()
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn tick(&self, _cancel_token: &CancellationToken) -> Result<()> {
        self.lottery.recover_missed_results().await.context("missed lottery results")?;
        Ok(())
    }
}

/// Full phase refresh, followed by scheduling the next journey transition.
pub struct PhaseRefreshJob {
    tracker: Arc<PhaseTracker>,
    interval: Duration,
}

impl PhaseRefreshJob {
    pub fn new(tracker: Arc<PhaseTracker>, interval: Duration) -> Self {
        Self { tracker, interval }
    }
}

#[async_trait]
impl PeriodicJob for PhaseRefreshJob {
    fn name(&self) -> String {
        "phase-refresh".into()
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn tick(&self, cancel_token: &CancellationToken) -> Result<()> {
        let state = self.tracker.refresh().await.context("phase refresh")?;
        self.tracker.schedule_transition_refresh(&state, now_secs(), cancel_token.clone());
        Ok(())
    }
}

pub struct PauseCheckJob {
    tracker: Arc<PhaseTracker>,
    interval: Duration,
}

impl PauseCheckJob {
    pub fn new(tracker: Arc<PhaseTracker>, interval: Duration) -> Self {
        Self { tracker, interval }
    }
}

#[async_trait]
impl PeriodicJob for PauseCheckJob {
    fn name(&self) -> String {
        "phase-pause-check".into()
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn tick(&self, _cancel_token: &CancellationToken) -> Result<()> {
        self.tracker.check_pause(now_secs()).await.context("pause check")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{task::Supervisor, test_utils::RecordingReporter};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FlakyJob {
        ticks: AtomicUsize,
        fail_on: usize,
    }

    #[async_trait]
    impl PeriodicJob for FlakyJob {
        fn name(&self) -> String {
            "flaky".into()
        }

        fn interval(&self) -> Duration {
            Duration::from_secs(10)
        }

        async fn tick(&self, _cancel_token: &CancellationToken) -> Result<()> {
            let tick = self.ticks.fetch_add(1, Ordering::SeqCst) + 1;
            if tick == self.fail_on {
                anyhow::bail!("tick {tick} failed");
            }
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn failed_tick_is_reported_and_job_continues() {
        let job = Arc::new(FlakyJob { ticks: AtomicUsize::new(0), fail_on: 2 });
        let reporter = Arc::new(RecordingReporter::default());
        let cancel = CancellationToken::new();
        let runner = Arc::new(JobRunner::new(job.clone(), reporter.clone()));
        let handle = tokio::spawn(Supervisor::new(runner, cancel.clone()).spawn());

        // Ticks at 0s, 10s, 20s and 30s.
        tokio::time::sleep(Duration::from_secs(35)).await;
        cancel.cancel();
        handle.await.unwrap().unwrap();

        assert_eq!(job.ticks.load(Ordering::SeqCst), 4);
        let reports = reporter.reports();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].0, "flaky");
        assert!(reports[0].1.contains("tick 2 failed"));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_before_first_tick() {
        let job = Arc::new(FlakyJob { ticks: AtomicUsize::new(0), fail_on: 0 });
        let cancel = CancellationToken::new();
        cancel.cancel();
        let runner = JobRunner::new(job.clone(), Arc::new(TracingReporter));
        runner.spawn(cancel).await.unwrap();
        assert!(job.ticks.load(Ordering::SeqCst) <= 1);
    }
}
