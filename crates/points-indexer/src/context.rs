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

//! Process wide wiring: every service is built once here and handed to the jobs and the
//! HTTP layer.

use std::{sync::Arc, time::Duration};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{
    config::{ConfigErr, ConfigLock},
    db::{repositories, PointsDb},
    ingestion::{EventSource, IngestionService},
    jobs::{
        ErrorReporter, IngestionJob, JobRunner, MissedResultsJob, PauseCheckJob, PeriodicJob,
        PhaseRefreshJob, PruneJob, TransferSyncJob,
    },
    leaderboard::LeaderboardService,
    lottery::{LotteryIndex, LotteryResultFetcher, LotteryService},
    phase::{PhaseSource, PhaseTracker},
    pricing::{PriceOracle, ValuationResolver},
    reports::ReportService,
    task::Supervisor,
    users::{TokenIdSource, UserService},
};

/// The upstream systems the services talk to.
#[derive(Clone)]
pub struct Collaborators {
    pub events: Arc<dyn EventSource>,
    pub prices: Arc<dyn PriceOracle>,
    pub phase: Arc<dyn PhaseSource>,
    pub lottery_index: Arc<dyn LotteryIndex>,
    pub results: Arc<dyn LotteryResultFetcher>,
    pub token_ids: Arc<dyn TokenIdSource>,
    pub reporter: Arc<dyn ErrorReporter>,
}

#[derive(Clone)]
pub struct AppContext {
    pub config: ConfigLock,
    pub db: Arc<PointsDb>,
    pub ingestion: IngestionService,
    pub leaderboard: LeaderboardService,
    pub lottery: Arc<LotteryService>,
    pub phase: Arc<PhaseTracker>,
    pub reports: ReportService,
    pub users: UserService,
    pub valuation: ValuationResolver,
    pub reporter: Arc<dyn ErrorReporter>,
}

impl AppContext {
    pub fn new(db: Arc<PointsDb>, config: ConfigLock, collaborators: Collaborators) -> Self {
        let (ledger_db, lottery_db, state_db) = repositories(db.clone());

        let valuation = ValuationResolver::new(collaborators.prices, config.clone());
        let ingestion = IngestionService::new(
            collaborators.events,
            ledger_db.clone(),
            state_db.clone(),
            valuation.clone(),
            config.clone(),
        );
        let leaderboard = LeaderboardService::new(ledger_db.clone(), config.clone());
        let lottery = Arc::new(LotteryService::new(
            lottery_db,
            state_db.clone(),
            collaborators.lottery_index,
            collaborators.results,
            config.clone(),
        ));
        let phase = Arc::new(PhaseTracker::new(collaborators.phase, state_db.clone(), config.clone()));
        let reports = ReportService::new(ledger_db, state_db.clone(), config.clone());
        let users = UserService::new(state_db, collaborators.token_ids, reports.clone());

        Self {
            config,
            db,
            ingestion,
            leaderboard,
            lottery,
            phase,
            reports,
            users,
            valuation,
            reporter: collaborators.reporter,
        }
    }

    /// Every periodic job, on the intervals from the `[jobs]` config section.
    pub fn jobs(&self) -> Result<Vec<Arc<dyn PeriodicJob>>, ConfigErr> {
        let jobs_config = self.config.lock_all()?.jobs.clone();
        let secs = Duration::from_secs;

        let mut jobs: Vec<Arc<dyn PeriodicJob>> = jobs_config
            .ingestion_targets
            .iter()
            .map(|target| {
                Arc::new(IngestionJob::new(
                    self.ingestion.clone(),
                    target.era,
                    target.blockchain,
                    secs(jobs_config.ingestion_interval_secs),
                )) as Arc<dyn PeriodicJob>
            })
            .collect();
        jobs.push(Arc::new(PruneJob::new(self.lottery.clone(), secs(jobs_config.prune_interval_secs))));
        jobs.push(Arc::new(TransferSyncJob::new(
            self.lottery.clone(),
            secs(jobs_config.transfer_sync_interval_secs),
        )));
        jobs.push(Arc::new(MissedResultsJob::new(
            self.lottery.clone(),
            secs(jobs_config.missed_results_interval_secs),
        )));
        jobs.push(Arc::new(PhaseRefreshJob::new(
            self.phase.clone(),
            secs(jobs_config.phase_refresh_interval_secs),
        )));
        jobs.push(Arc::new(PauseCheckJob::new(
            self.phase.clone(),
            secs(jobs_config.pause_check_interval_secs),
        )));
        Ok(jobs)
    }

    /// Starts each job under its own supervisor.
    pub fn spawn_jobs(
        &self,
        cancel_token: &CancellationToken,
    ) -> Result<Vec<JoinHandle<anyhow::Result<()>>>, ConfigErr> {
        Ok(self
            .jobs()?
            .into_iter()
            .map(|job| {
                let runner = Arc::new(JobRunner::new(job, self.reporter.clone()));
                tokio::spawn(Supervisor::new(runner, cancel_token.clone()).spawn())
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        config::{Config, IngestionTarget},
        test_utils::{test_context, TestDb},
        types::{Blockchain, Era},
    };

    #[tokio::test]
    async fn one_job_per_target_plus_maintenance() {
        let test_db = TestDb::new().await.unwrap();
        let mut config = Config::default();
        config.jobs.ingestion_targets =
            vec![IngestionTarget { era: Era::Wishwell, blockchain: Blockchain::Pulsechain }];
        let (ctx, _fakes) = test_context(&test_db, config);

        let names: Vec<String> = ctx.jobs().unwrap().iter().map(|job| job.name()).collect();
        assert_eq!(
            names,
            vec![
                "ingestion-era1-pulsechain",
                "lottery-prune",
                "lottery-transfer-sync",
                "lottery-missed-results",
                "phase-refresh",
                "phase-pause-check",
            ]
        );
    }
}
