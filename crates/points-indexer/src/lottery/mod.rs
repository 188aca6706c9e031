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

//! Lottery entries: draw ingestion, ownership tracking, pruning and lookups.

pub mod confirmation;
pub mod decoy;

use std::{
    collections::{BTreeMap, BTreeSet, HashMap, HashSet},
    sync::Arc,
    time::Duration,
};

use alloy::primitives::Address;
use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{
    config::{ConfigErr, ConfigLock},
    db::{DbError, EntryFilter, LotteryDbObj, StateDbObj},
    errors::CodedError,
    impl_coded_debug,
    sources::SourceError,
    types::{DrawEntry, LotteryEntry, LotteryResult},
};
use confirmation::{ConfirmationPoll, PollOutcome};
use decoy::DecoyPolicy;

/// `indexer_state` key of the ownership transfer cursor.
pub const TRANSFER_CURSOR_KEY: &str = "lottery_transfer_cursor";
/// The cursor is stored this far behind the sync time to cover the job's own run time.
pub const TRANSFER_CURSOR_BUFFER_SECS: u64 = 180;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnershipTransfer {
    pub token_id: u64,
    pub to: Address,
    pub timestamp: u64,
}

/// Read access to the on-chain lottery index.
#[async_trait]
pub trait LotteryIndex: Send + Sync {
    async fn is_result_indexed(&self, journey_id: u64, lottery_id: u64) -> Result<bool, SourceError>;

    /// Current owner per token id. Tokens without a known owner are absent.
    async fn resolve_owners(&self, token_ids: &[u64]) -> Result<HashMap<u64, Address>, SourceError>;

    /// The subset of token ids that already received a payout.
    async fn paid_out_token_ids(&self, token_ids: &[u64]) -> Result<Vec<u64>, SourceError>;

    async fn result_uris_excluding(&self, known: &HashSet<String>) -> Result<Vec<String>, SourceError>;

    async fn transfers_since(&self, since: Option<u64>) -> Result<Vec<OwnershipTransfer>, SourceError>;
}

/// Downloads the entry list published at a result URI.
#[async_trait]
pub trait LotteryResultFetcher: Send + Sync {
    async fn fetch_result(&self, uri: &str) -> Result<Vec<DrawEntry>, SourceError>;
}

#[derive(Error)]
pub enum LotteryError {
    #[error("Invalid lottery result: {0}")]
    InvalidResult(String),

    #[error("Database error: {0}")]
    Db(#[from] DbError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigErr),

    #[error("Upstream error: {0}")]
    Source(#[from] SourceError),
}

impl_coded_debug!(LotteryError);

impl CodedError for LotteryError {
    fn code(&self) -> &str {
        match self {
            LotteryError::InvalidResult(_) => "[P-LOT-001]",
            LotteryError::Db(_) => "[P-LOT-002]",
            LotteryError::Config(_) => "[P-LOT-003]",
            LotteryError::Source(_) => "[P-LOT-004]",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestSummary {
    /// False when the draw had been recorded before.
    pub result_recorded: bool,
    pub entries_inserted: u64,
    pub owners_resolved: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionOutcome {
    Ingested(IngestSummary),
    TimedOut,
    Cancelled,
}

/// The single (journey, lottery) draw a result belongs to.
pub fn draw_of(entries: &[DrawEntry]) -> Result<(u64, u64), LotteryError> {
    let first = entries
        .first()
        .ok_or_else(|| LotteryError::InvalidResult("result has no entries".into()))?;
    let draw = (first.journey_id, first.lottery_id);
    if entries.iter().any(|e| (e.journey_id, e.lottery_id) != draw) {
        return Err(LotteryError::InvalidResult("entries span more than one draw".into()));
    }
    Ok(draw)
}

/// Groups entries into draw pools keyed `"{journey}_{lottery}"`.
pub fn group_by_draw(entries: &[LotteryEntry]) -> BTreeMap<String, Vec<DrawEntry>> {
    let mut pools: BTreeMap<String, Vec<DrawEntry>> = BTreeMap::new();
    for entry in entries {
        pools
            .entry(format!("{}_{}", entry.journey_id, entry.lottery_id))
            .or_default()
            .push(DrawEntry {
                token_id: entry.token_id,
                journey_id: entry.journey_id,
                lottery_id: entry.lottery_id,
            });
    }
    pools
}

pub struct LotteryService {
    db: LotteryDbObj,
    state: StateDbObj,
    index: Arc<dyn LotteryIndex>,
    fetcher: Arc<dyn LotteryResultFetcher>,
    config: ConfigLock,
}

impl LotteryService {
    pub fn new(
        db: LotteryDbObj,
        state: StateDbObj,
        index: Arc<dyn LotteryIndex>,
        fetcher: Arc<dyn LotteryResultFetcher>,
        config: ConfigLock,
    ) -> Self {
        Self { db, state, index, fetcher, config }
    }

    fn batch_size(&self) -> Result<usize, LotteryError> {
        Ok(self.config.lock_all()?.lottery.batch_size.max(1))
    }

    fn confirmation_poll(&self) -> Result<ConfirmationPoll, LotteryError> {
        let config = self.config.lock_all()?;
        Ok(ConfirmationPoll::new(
            Duration::from_secs(config.lottery.confirmation_poll_interval_secs),
            Duration::from_secs(config.lottery.confirmation_timeout_secs),
        ))
    }

    /// Waits until the draw shows up in the index, then ingests it. Gives up at the
    /// configured timeout.
    pub async fn submit_result(
        &self,
        uri: &str,
        entries: Vec<DrawEntry>,
        cancel_token: &CancellationToken,
    ) -> Result<SubmissionOutcome, LotteryError> {
        let (journey_id, lottery_id) = draw_of(&entries)?;
        let poll = self.confirmation_poll()?;

        let outcome = poll
            .wait(cancel_token, || {
                let index = self.index.clone();
                async move {
                    match index.is_result_indexed(journey_id, lottery_id).await {
                        Ok(indexed) => {
                            if !indexed {
                                tracing::info!("J-{journey_id} L-{lottery_id} result not indexed yet");
                            }
                            indexed
                        }
                        Err(err) => {
                            tracing::warn!("Failed to check J-{journey_id} L-{lottery_id} result: {err:?}");
                            false
                        }
                    }
                }
            })
            .await;

        match outcome {
            PollOutcome::Confirmed => Ok(SubmissionOutcome::Ingested(self.ingest_confirmed(uri, entries).await?)),
            PollOutcome::TimedOut => {
                tracing::warn!("Abandoning J-{journey_id} L-{lottery_id} result {uri}: not indexed before timeout");
                Ok(SubmissionOutcome::TimedOut)
            }
            PollOutcome::Cancelled => Ok(SubmissionOutcome::Cancelled),
        }
    }

    /// Validates the result, then runs [LotteryService::submit_result] in the background.
    pub fn spawn_submission(
        self: &Arc<Self>,
        uri: String,
        entries: Vec<DrawEntry>,
        cancel_token: CancellationToken,
    ) -> Result<JoinHandle<()>, LotteryError> {
        draw_of(&entries)?;
        let service = self.clone();
        Ok(tokio::spawn(async move {
            match service.submit_result(&uri, entries, &cancel_token).await {
                Ok(SubmissionOutcome::Ingested(summary)) => {
                    tracing::info!("Ingested lottery result {uri}: {summary:?}")
                }
                Ok(outcome) => tracing::debug!("Lottery result {uri} finished with {outcome:?}"),
                Err(err) => tracing::error!("Failed to ingest lottery result {uri}: {err:?}"),
            }
        }))
    }

    /// Stores a confirmed draw: owners are resolved in batches, then the result and the
    /// entries are inserted. Both inserts tolerate rows that already exist.
    pub async fn ingest_confirmed(
        &self,
        uri: &str,
        entries: Vec<DrawEntry>,
    ) -> Result<IngestSummary, LotteryError> {
        let (journey_id, lottery_id) = draw_of(&entries)?;
        let batch_size = self.batch_size()?;

        let mut owners = HashMap::new();
        for chunk in entries.chunks(batch_size) {
            let token_ids: Vec<u64> = chunk.iter().map(|e| e.token_id).collect();
            match self.index.resolve_owners(&token_ids).await {
                Ok(found) => owners.extend(found),
                Err(err) => {
                    tracing::warn!("Failed to resolve owners for {} tokens: {err:?}", token_ids.len())
                }
            }
        }

        let rows: Vec<LotteryEntry> = entries
            .iter()
            .map(|e| LotteryEntry {
                token_id: e.token_id,
                journey_id: e.journey_id,
                lottery_id: e.lottery_id,
                wallet_address: owners.get(&e.token_id).copied(),
                is_pruned: false,
            })
            .collect();

        let result = LotteryResult { uri: uri.to_string(), journey_id, lottery_id };
        let result_recorded = match self.db.insert_lottery_result(&result).await {
            Ok(()) => true,
            Err(err) if err.is_unique_violation() => {
                tracing::info!("Duplicate entry found for lottery result {uri}, skipping it");
                false
            }
            Err(err) => return Err(err.into()),
        };

        let entries_inserted = self.db.insert_lottery_entries(&rows).await?;
        if entries_inserted < rows.len() as u64 {
            tracing::info!(
                "Skipped {} lottery entries already recorded for J-{journey_id} L-{lottery_id}",
                rows.len() as u64 - entries_inserted
            );
        }

        Ok(IngestSummary { result_recorded, entries_inserted, owners_resolved: owners.len() })
    }

    async fn prune_tokens(&self, token_ids: Vec<u64>) -> Result<u64, LotteryError> {
        let batch_size = self.batch_size()?;
        let mut paid_out = Vec::new();
        for chunk in token_ids.chunks(batch_size) {
            match self.index.paid_out_token_ids(chunk).await {
                Ok(ids) => paid_out.extend(ids),
                Err(err) => tracing::warn!("Payout lookup failed for {} tokens: {err:?}", chunk.len()),
            }
        }
        if paid_out.is_empty() {
            return Ok(0);
        }
        Ok(self.db.mark_pruned(&paid_out).await?)
    }

    /// Prunes the wallet's unpruned entries whose tokens were already paid out.
    pub async fn prune_wallet(&self, wallet: Address) -> Result<u64, LotteryError> {
        let token_ids = self.db.unpruned_token_ids(Some(wallet)).await?;
        let pruned = self.prune_tokens(token_ids).await?;
        tracing::info!("Pruned {pruned} lottery entries for {wallet}");
        Ok(pruned)
    }

    pub async fn prune_all(&self) -> Result<u64, LotteryError> {
        let token_ids = self.db.unpruned_token_ids(None).await?;
        let pruned = self.prune_tokens(token_ids).await?;
        tracing::info!("Pruned {pruned} lottery entries");
        Ok(pruned)
    }

    fn decoy_policy(&self) -> Result<Option<DecoyPolicy>, LotteryError> {
        Ok(DecoyPolicy::from_config(&self.config.lock_all()?.lottery))
    }

    /// The wallet's entries. The flagged address is served from its decoy pool instead.
    pub async fn entries_for_wallet(
        &self,
        wallet: Address,
        filter: EntryFilter,
    ) -> Result<Vec<LotteryEntry>, LotteryError> {
        if let Some(policy) = self.decoy_policy()?.filter(|p| p.applies_to(&wallet)) {
            let entries = self.db.take_decoy_entries(wallet, filter.is_pruned, policy.limit).await?;
            tracing::info!("Served {} decoy entries", entries.len());
            return Ok(entries);
        }
        Ok(self.db.entries_for_wallet(wallet, &filter).await?)
    }

    pub async fn draw_entries(&self, filter: EntryFilter) -> Result<Vec<LotteryEntry>, LotteryError> {
        Ok(self.db.draw_entries(&filter).await?)
    }

    /// All entries sharing a draw with any unpruned entry of the wallet.
    pub async fn draw_pool_for_wallet(
        &self,
        wallet: Address,
    ) -> Result<BTreeMap<String, Vec<DrawEntry>>, LotteryError> {
        let own = self.db.entries_for_wallet(wallet, &EntryFilter::default()).await?;
        let draws: Vec<(u64, u64)> = own
            .iter()
            .map(|e| (e.journey_id, e.lottery_id))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if draws.is_empty() {
            return Ok(BTreeMap::new());
        }
        let entries = self.db.entries_in_draws(&draws).await?;
        Ok(group_by_draw(&entries))
    }

    /// Applies ownership transfers since the stored cursor, then moves the cursor.
    pub async fn sync_ownership_transfers(&self, now: u64) -> Result<usize, LotteryError> {
        let since = self.state.get_cursor(TRANSFER_CURSOR_KEY).await?;
        let mut transfers = match self.index.transfers_since(since).await {
            Ok(transfers) => transfers,
            Err(err) => {
                tracing::warn!("Failed to fetch ownership transfers since {since:?}: {err:?}");
                return Ok(0);
            }
        };
        transfers.sort_by_key(|t| t.timestamp);

        let mut updated = 0;
        for transfer in &transfers {
            updated += self.db.update_token_owner(transfer.token_id, transfer.to).await? as usize;
        }

        self.state
            .set_cursor(TRANSFER_CURSOR_KEY, now.saturating_sub(TRANSFER_CURSOR_BUFFER_SECS))
            .await?;
        tracing::info!("Applied {} ownership transfers to {updated} lottery entries", transfers.len());
        Ok(updated)
    }

    /// Ingests results the index knows about but that were never stored here.
    pub async fn recover_missed_results(&self) -> Result<usize, LotteryError> {
        let known = self.db.stored_result_uris().await?;
        let missing = match self.index.result_uris_excluding(&known).await {
            Ok(uris) => uris,
            Err(err) => {
                tracing::warn!("Failed to list lottery results: {err:?}");
                return Ok(0);
            }
        };

        let mut recovered = 0;
        for uri in missing.iter().filter(|uri| !known.contains(*uri)) {
            let entries = match self.fetcher.fetch_result(uri).await {
                Ok(entries) => entries,
                Err(err) => {
                    tracing::warn!("Failed to download lottery result {uri}: {err:?}");
                    continue;
                }
            };
            match self.ingest_confirmed(uri, entries).await {
                Ok(summary) => {
                    tracing::info!("Recovered lottery result {uri}: {summary:?}");
                    recovered += 1;
                }
                Err(err) => tracing::error!("Failed to ingest missed lottery result {uri}: {err:?}"),
            }
        }
        Ok(recovered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::Config,
        db::{LotteryDb, StateDb},
        test_utils::{wallet, FakeLotteryIndex, FakeResultFetcher, TestDb},
    };
    use tracing_test::traced_test;

    struct Harness {
        test_db: TestDb,
        index: Arc<FakeLotteryIndex>,
        fetcher: Arc<FakeResultFetcher>,
        service: Arc<LotteryService>,
    }

    async fn harness(config: Config) -> Harness {
        let test_db = TestDb::new().await.unwrap();
        let index = Arc::new(FakeLotteryIndex::default());
        let fetcher = Arc::new(FakeResultFetcher::default());
        let service = Arc::new(LotteryService::new(
            test_db.db.clone(),
            test_db.db.clone(),
            index.clone(),
            fetcher.clone(),
            ConfigLock::new(config),
        ));
        Harness { test_db, index, fetcher, service }
    }

    fn draw(token_ids: impl IntoIterator<Item = u64>, journey_id: u64, lottery_id: u64) -> Vec<DrawEntry> {
        token_ids.into_iter().map(|token_id| DrawEntry { token_id, journey_id, lottery_id }).collect()
    }

    fn fast_poll_config() -> Config {
        let mut config = Config::default();
        config.lottery.confirmation_poll_interval_secs = 1;
        config.lottery.confirmation_timeout_secs = 2;
        config.lottery.batch_size = 2;
        config
    }

    #[test]
    fn result_must_cover_one_draw() {
        assert!(matches!(draw_of(&[]), Err(LotteryError::InvalidResult(_))));
        let mut entries = draw([1, 2], 1, 1);
        assert_eq!(draw_of(&entries).unwrap(), (1, 1));
        entries.push(DrawEntry { token_id: 3, journey_id: 1, lottery_id: 2 });
        assert!(draw_of(&entries).is_err());
    }

    #[tokio::test]
    #[traced_test]
    async fn ingests_in_owner_batches() {
        let h = harness(fast_poll_config()).await;
        h.index.set_owner(1, wallet(1));
        h.index.set_owner(2, wallet(2));
        h.index.set_owner(3, wallet(1));

        let summary = h.service.ingest_confirmed("ipfs://r1", draw([1, 2, 3, 4, 5], 1, 1)).await.unwrap();
        assert_eq!(summary, IngestSummary { result_recorded: true, entries_inserted: 5, owners_resolved: 3 });
        // Five tokens in batches of two.
        assert_eq!(h.index.owner_batches(), vec![2, 2, 1]);

        let mine = h.service.entries_for_wallet(wallet(1), EntryFilter::default()).await.unwrap();
        assert_eq!(mine.iter().map(|e| e.token_id).collect::<Vec<_>>(), vec![1, 3]);

        // Replaying the same result is a no-op.
        let again = h.service.ingest_confirmed("ipfs://r1", draw([1, 2, 3, 4, 5], 1, 1)).await.unwrap();
        assert_eq!(again.result_recorded, false);
        assert_eq!(again.entries_inserted, 0);
        assert!(logs_contain("Duplicate entry found for lottery result"));
    }

    #[tokio::test]
    #[traced_test]
    async fn submission_waits_for_index() {
        let h = harness(fast_poll_config()).await;
        h.index.index_after(1, 1, 1);

        let outcome = h
            .service
            .submit_result("ipfs://r1", draw([1], 1, 1), &CancellationToken::new())
            .await
            .unwrap();
        assert!(matches!(outcome, SubmissionOutcome::Ingested(_)));
        assert_eq!(h.test_db.db.stored_result_uris().await.unwrap().len(), 1);
    }

    #[tokio::test]
    #[traced_test]
    async fn submission_is_abandoned_after_timeout() {
        let h = harness(fast_poll_config()).await;
        let outcome = h
            .service
            .submit_result("ipfs://r1", draw([1], 1, 1), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome, SubmissionOutcome::TimedOut);
        assert!(h.test_db.db.stored_result_uris().await.unwrap().is_empty());
        assert!(logs_contain("Abandoning"));
    }

    #[tokio::test]
    async fn spawn_submission_rejects_empty_results() {
        let h = harness(fast_poll_config()).await;
        let err = h.service.spawn_submission("ipfs://r".into(), vec![], CancellationToken::new());
        assert!(matches!(err, Err(LotteryError::InvalidResult(_))));
    }

    #[tokio::test]
    #[traced_test]
    async fn pruning_marks_paid_out_tokens() {
        let h = harness(fast_poll_config()).await;
        for token in 1..=4 {
            h.index.set_owner(token, wallet(1));
        }
        h.service.ingest_confirmed("ipfs://r1", draw(1..=4, 1, 1)).await.unwrap();
        h.index.set_paid_out([2, 4]);

        assert_eq!(h.service.prune_wallet(wallet(1)).await.unwrap(), 2);
        // Batches of two over four unpruned tokens.
        assert_eq!(h.index.payout_batches(), vec![2, 2]);

        // Re-running finds nothing new and never un-prunes.
        h.index.set_paid_out([]);
        assert_eq!(h.service.prune_all().await.unwrap(), 0);
        let pruned = EntryFilter { is_pruned: true, ..Default::default() };
        let entries = h.service.entries_for_wallet(wallet(1), pruned).await.unwrap();
        assert_eq!(entries.iter().map(|e| e.token_id).collect::<Vec<_>>(), vec![2, 4]);
    }

    #[tokio::test]
    #[traced_test]
    async fn payout_lookup_failure_prunes_nothing() {
        let h = harness(fast_poll_config()).await;
        h.index.set_owner(1, wallet(1));
        h.service.ingest_confirmed("ipfs://r1", draw([1], 1, 1)).await.unwrap();
        h.index.set_paid_out([1]);
        h.index.fail_payouts();

        assert_eq!(h.service.prune_all().await.unwrap(), 0);
        assert!(logs_contain("Payout lookup failed"));
    }

    #[tokio::test]
    async fn decoy_address_consumes_pool() {
        let flagged = wallet(0xdd);
        let mut config = fast_poll_config();
        config.lottery.decoy_address = Some(flagged);
        config.lottery.decoy_result_limit = 2;
        let h = harness(config).await;
        for token in 1..=3 {
            h.index.set_owner(token, flagged);
        }
        h.service.ingest_confirmed("ipfs://r1", draw(1..=3, 1, 1)).await.unwrap();

        let ids = |entries: Vec<LotteryEntry>| entries.iter().map(|e| e.token_id).collect::<Vec<_>>();
        let filter = EntryFilter::default();
        assert_eq!(ids(h.service.entries_for_wallet(flagged, filter).await.unwrap()), vec![1, 2]);
        assert_eq!(ids(h.service.entries_for_wallet(flagged, filter).await.unwrap()), vec![3]);
        assert!(h.service.entries_for_wallet(flagged, filter).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn draw_pool_groups_by_draw() {
        let h = harness(fast_poll_config()).await;
        h.index.set_owner(1, wallet(1));
        h.index.set_owner(2, wallet(2));
        h.index.set_owner(3, wallet(2));
        h.service.ingest_confirmed("ipfs://a", draw([1, 2], 1, 1)).await.unwrap();
        h.service.ingest_confirmed("ipfs://b", draw([3], 1, 2)).await.unwrap();

        let pool = h.service.draw_pool_for_wallet(wallet(1)).await.unwrap();
        assert_eq!(pool.keys().collect::<Vec<_>>(), vec!["1_1"]);
        assert_eq!(pool["1_1"].len(), 2);
        assert!(h.service.draw_pool_for_wallet(wallet(9)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn transfers_move_ownership_and_cursor() {
        let h = harness(fast_poll_config()).await;
        h.index.set_owner(1, wallet(1));
        h.service.ingest_confirmed("ipfs://a", draw([1], 1, 1)).await.unwrap();
        h.index.set_transfers(vec![
            OwnershipTransfer { token_id: 1, to: wallet(3), timestamp: 20 },
            OwnershipTransfer { token_id: 1, to: wallet(2), timestamp: 10 },
        ]);

        assert_eq!(h.service.sync_ownership_transfers(1_000).await.unwrap(), 2);
        let entries = h.service.entries_for_wallet(wallet(3), EntryFilter::default()).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(
            h.test_db.db.get_cursor(TRANSFER_CURSOR_KEY).await.unwrap(),
            Some(1_000 - TRANSFER_CURSOR_BUFFER_SECS)
        );
        assert_eq!(h.index.last_transfer_cursor(), Some(None));
    }

    #[tokio::test]
    #[traced_test]
    async fn recovers_missed_results() {
        let h = harness(fast_poll_config()).await;
        h.service.ingest_confirmed("ipfs://known", draw([1], 1, 1)).await.unwrap();
        h.index.set_result_uris(vec!["ipfs://known".into(), "ipfs://new".into(), "ipfs://broken".into()]);
        h.fetcher.set_result("ipfs://new", draw([5, 6], 2, 1));

        assert_eq!(h.service.recover_missed_results().await.unwrap(), 1);
        assert_eq!(h.test_db.db.draw_entries(&EntryFilter { journey_id: Some(2), ..Default::default() }).await.unwrap().len(), 2);
        assert!(logs_contain("Failed to download lottery result ipfs://broken"));
    }
}
