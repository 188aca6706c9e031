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

//! One ingestion pass: fetch, normalize, deduplicate, value, score and persist.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::{
    config::{ConfigErr, ConfigLock},
    db::{DbError, LedgerDbObj, StateDbObj},
    dedup::DedupGate,
    errors::CodedError,
    impl_coded_debug,
    ledger::{LedgerError, LedgerOutcome, PointsLedger},
    normalizer::{normalize, NativeToken, RawEvent},
    pricing::ValuationResolver,
    sources::SourceError,
    types::{Blockchain, Era},
};

/// Fetches re-read this far behind the stored cursor; the dedup gate drops the overlap.
pub const CURSOR_OVERLAP_SECS: u64 = 60 * 60;

/// Raw contribution events for one era on one chain.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Events at or after `since` (unix seconds), or the full history when `None`.
    async fn fetch_events(
        &self,
        blockchain: Blockchain,
        era: Era,
        since: Option<u64>,
    ) -> Result<Vec<RawEvent>, SourceError>;
}

#[derive(Error)]
pub enum IngestionError {
    #[error("Database error: {0}")]
    Db(#[from] DbError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigErr),
}

impl_coded_debug!(IngestionError);

impl CodedError for IngestionError {
    fn code(&self) -> &str {
        match self {
            IngestionError::Db(_) => "[P-ING-001]",
            IngestionError::Ledger(_) => "[P-ING-002]",
            IngestionError::Config(_) => "[P-ING-003]",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestionReport {
    pub fetched: usize,
    pub normalized: usize,
    pub admitted: usize,
    pub contributions: usize,
    pub points_entries: usize,
    pub duplicates: usize,
    pub unscored: usize,
    pub failed: usize,
}

impl IngestionReport {
    fn with_outcome(mut self, outcome: LedgerOutcome) -> Self {
        self.contributions = outcome.contributions;
        self.points_entries = outcome.points_entries;
        self.duplicates = outcome.duplicates;
        self.unscored = outcome.unscored;
        self.failed = outcome.failed;
        self
    }
}

pub fn cursor_key(era: Era, blockchain: Blockchain) -> String {
    format!("ingest:{}:{blockchain}", era.number())
}

#[derive(Clone)]
pub struct IngestionService {
    sources: Arc<dyn EventSource>,
    ledger_db: LedgerDbObj,
    state_db: StateDbObj,
    ledger: PointsLedger,
    valuation: ValuationResolver,
    config: ConfigLock,
}

impl IngestionService {
    pub fn new(
        sources: Arc<dyn EventSource>,
        ledger_db: LedgerDbObj,
        state_db: StateDbObj,
        valuation: ValuationResolver,
        config: ConfigLock,
    ) -> Self {
        let ledger = PointsLedger::new(ledger_db.clone(), config.clone());
        Self { sources, ledger_db, state_db, ledger, valuation, config }
    }

    pub fn ledger(&self) -> &PointsLedger {
        &self.ledger
    }

    /// Runs one pass for the era on the chain. A failed fetch is logged and treated as
    /// an empty batch.
    pub async fn run(&self, era: Era, blockchain: Blockchain) -> Result<IngestionReport, IngestionError> {
        let key = cursor_key(era, blockchain);
        let cursor = self.state_db.get_cursor(&key).await?;
        let since = cursor.map(|c| c.saturating_sub(CURSOR_OVERLAP_SECS));

        let events = match self.sources.fetch_events(blockchain, era, since).await {
            Ok(events) => events,
            Err(err) => {
                tracing::warn!("Failed to fetch era {era} events on {blockchain}: {err:?}");
                return Ok(IngestionReport::default());
            }
        };
        let mut report = IngestionReport { fetched: events.len(), ..Default::default() };

        let native = NativeToken {
            wrapped: self.config.lock_all()?.pricing.wrapped_native.get(&blockchain).copied(),
        };
        let contributions = normalize(era, blockchain, events, native);
        report.normalized = contributions.len();

        let mut gate = DedupGate::new(self.ledger_db.transaction_hashes(era).await?);
        let mut fresh = gate.admit(contributions);
        report.admitted = fresh.len();
        if fresh.is_empty() {
            tracing::debug!("No new era {era} contributions on {blockchain}");
            return Ok(report);
        }

        if era == Era::Wishwell {
            self.valuation.value_contributions(&mut fresh).await;
        }

        let newest = fresh.iter().filter_map(|c| c.timestamp).max();
        let eligibility = self.ledger_db.eligibility().await?;
        let outcome = self.ledger.record(fresh, &eligibility).await?;
        report = report.with_outcome(outcome);

        if let Some(newest) = newest.filter(|ts| cursor.is_none_or(|c| *ts > c)) {
            self.state_db.set_cursor(&key, newest).await?;
        }

        tracing::info!("Era {era} ingestion on {blockchain}: {report:?}");
        Ok(report)
    }

    /// On-demand pass, run after the configured delay so upstream indexers can catch up.
    pub async fn sync(&self, era: Era, blockchain: Blockchain) -> Result<IngestionReport, IngestionError> {
        let delay = Duration::from_millis(self.config.lock_all()?.jobs.sync_delay_ms);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.run(era, blockchain).await
    }
}
