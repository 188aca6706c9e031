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

//! Test database and in-memory collaborators.

use std::{
    collections::{HashMap, HashSet},
    str::FromStr,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use alloy::primitives::Address;
use async_trait::async_trait;
use tempfile::NamedTempFile;

use crate::{
    config::{Config, ConfigLock},
    context::{AppContext, Collaborators},
    db::{DbError, PointsDb},
    ingestion::EventSource,
    jobs::ErrorReporter,
    lottery::{LotteryIndex, LotteryResultFetcher, OwnershipTransfer},
    normalizer::RawEvent,
    phase::{PauseStatus, PhaseSource},
    pricing::{Pool, PriceOracle, PriceSide},
    sources::SourceError,
    types::{
        Blockchain, Contribution, ContributionDetails, DrawEntry, Era, MiningDetails, PhaseState,
        WishwellDetails,
    },
    users::TokenIdSource,
};

pub struct TestDb {
    pub db: Arc<PointsDb>,
    pub db_url: String,
    pub _temp_file: Option<NamedTempFile>,
}

impl TestDb {
    pub async fn new() -> Result<Self, DbError> {
        // Setting POINTS_DATABASE_URL to a postgres url runs the db tests against postgres.
        // Only supported with --test-threads=1.
        if let Ok(db_url) = std::env::var("POINTS_DATABASE_URL") {
            if db_url.starts_with("postgres") {
                let db = Arc::new(PointsDb::new(&db_url).await?);
                let test_db = Self { db, db_url, _temp_file: None };
                test_db.cleanup().await?;
                tracing::info!("Testing with Postgres. Must only run with --test-threads=1");
                return Ok(test_db);
            }
        }

        let temp_file = NamedTempFile::new().map_err(|e| DbError::BadValue(e.to_string()))?;
        let db_url = format!("sqlite:{}", temp_file.path().display());
        let db = Arc::new(PointsDb::new(&db_url).await?);
        Ok(Self { db, db_url, _temp_file: Some(temp_file) })
    }

    pub async fn cleanup(&self) -> Result<(), DbError> {
        if self.db_url.starts_with("postgres") {
            for table in [
                "contributions",
                "points_entries",
                "lottery_results",
                "lottery_entries",
                "decoy_blocked_tokens",
                "phase_state",
                "users",
                "user_tokens",
                "indexer_state",
            ] {
                sqlx::query(&format!("TRUNCATE TABLE {table} CASCADE")).execute(self.db.pool()).await?;
            }
        }
        Ok(())
    }
}

pub fn wallet(n: u8) -> Address {
    Address::with_last_byte(n)
}

pub fn test_token() -> Address {
    Address::from_str("0x0000000000000000000000000000000000000abc").unwrap()
}

pub fn mining_contribution(wallet: Address, hash: &str, timestamp: u64, token_amount: f64) -> Contribution {
    Contribution {
        blockchain: Blockchain::Base,
        wallet_address: Some(wallet),
        transaction_hash: hash.to_lowercase(),
        timestamp: Some(timestamp),
        details: ContributionDetails::Mining(MiningDetails {
            token_address: Some(test_token()),
            raw_amount: Some("1000".into()),
            token_amount: Some(token_amount),
        }),
    }
}

pub fn wishwell_contribution(wallet: Address, hash: &str, timestamp: u64, usd_value: f64) -> Contribution {
    Contribution {
        blockchain: Blockchain::Pulsechain,
        wallet_address: Some(wallet),
        transaction_hash: hash.to_lowercase(),
        timestamp: Some(timestamp),
        details: ContributionDetails::Wishwell(WishwellDetails {
            token_address: Some(test_token()),
            token_name: Some("Test Token".into()),
            token_symbol: Some("TT".into()),
            token_amount: Some(usd_value),
            token_usd_price: Some(1.0),
            usd_value: Some(usd_value),
            pool_address: Some("0xpool".into()),
        }),
    }
}

fn fake_failure(what: &str) -> SourceError {
    SourceError::Decode(format!("fake {what} failure"))
}

#[derive(Default)]
pub struct FakeEventSource {
    events: Mutex<HashMap<(Era, Blockchain), Vec<RawEvent>>>,
    calls: AtomicUsize,
    last_since: Mutex<Option<Option<u64>>>,
    failing: AtomicBool,
}

impl FakeEventSource {
    pub fn push(&self, era: Era, blockchain: Blockchain, event: RawEvent) {
        self.events.lock().unwrap().entry((era, blockchain)).or_default().push(event);
    }

    pub fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// The `since` of the latest fetch, `None` before any fetch.
    pub fn last_since(&self) -> Option<Option<u64>> {
        *self.last_since.lock().unwrap()
    }
}

#[async_trait]
impl EventSource for FakeEventSource {
    async fn fetch_events(
        &self,
        blockchain: Blockchain,
        era: Era,
        since: Option<u64>,
    ) -> Result<Vec<RawEvent>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_since.lock().unwrap() = Some(since);
        if self.failing.load(Ordering::SeqCst) {
            return Err(fake_failure("event source"));
        }
        Ok(self.events.lock().unwrap().get(&(era, blockchain)).cloned().unwrap_or_default())
    }
}

#[derive(Default)]
pub struct FakePriceOracle {
    pools: Mutex<Vec<Pool>>,
    prices: Mutex<HashMap<String, Option<f64>>>,
    failing_prices: AtomicBool,
    search_calls: AtomicUsize,
    last_side: Mutex<Option<PriceSide>>,
}

impl FakePriceOracle {
    pub fn set_pools(&self, pools: Vec<Pool>) {
        *self.pools.lock().unwrap() = pools;
    }

    pub fn set_price(&self, pool: &str, price: Option<f64>) {
        self.prices.lock().unwrap().insert(pool.to_string(), price);
    }

    pub fn fail_prices(&self) {
        self.failing_prices.store(true, Ordering::SeqCst);
    }

    pub fn search_calls(&self) -> usize {
        self.search_calls.load(Ordering::SeqCst)
    }

    pub fn last_side(&self) -> Option<PriceSide> {
        *self.last_side.lock().unwrap()
    }
}

#[async_trait]
impl PriceOracle for FakePriceOracle {
    async fn search_pools(&self, _token: Address, _network: Blockchain) -> Result<Vec<Pool>, SourceError> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.pools.lock().unwrap().clone())
    }

    async fn pool_price(
        &self,
        pool_address: &str,
        _network: Blockchain,
        side: PriceSide,
        _as_of: u64,
    ) -> Result<Option<f64>, SourceError> {
        *self.last_side.lock().unwrap() = Some(side);
        if self.failing_prices.load(Ordering::SeqCst) {
            return Err(fake_failure("price"));
        }
        Ok(self.prices.lock().unwrap().get(pool_address).copied().flatten())
    }
}

#[derive(Default)]
pub struct FakePhaseSource {
    state: Mutex<Option<PhaseState>>,
    pause: Mutex<PauseStatus>,
    state_fetches: AtomicUsize,
}

impl FakePhaseSource {
    pub fn set_state(&self, state: PhaseState) {
        *self.state.lock().unwrap() = Some(state);
    }

    pub fn set_pause(&self, pause: PauseStatus) {
        *self.pause.lock().unwrap() = pause;
    }

    pub fn state_fetches(&self) -> usize {
        self.state_fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PhaseSource for FakePhaseSource {
    async fn fetch_phase_state(&self) -> Result<PhaseState, SourceError> {
        self.state_fetches.fetch_add(1, Ordering::SeqCst);
        (*self.state.lock().unwrap()).ok_or_else(|| fake_failure("phase state"))
    }

    async fn fetch_pause_status(&self) -> Result<PauseStatus, SourceError> {
        Ok(*self.pause.lock().unwrap())
    }
}

#[derive(Default)]
pub struct FakeLotteryIndex {
    owners: Mutex<HashMap<u64, Address>>,
    owner_batches: Mutex<Vec<usize>>,
    /// Remaining negative answers per draw before it reports indexed.
    indexed_after: Mutex<HashMap<(u64, u64), usize>>,
    paid_out: Mutex<HashSet<u64>>,
    payout_batches: Mutex<Vec<usize>>,
    failing_payouts: AtomicBool,
    result_uris: Mutex<Vec<String>>,
    transfers: Mutex<Vec<OwnershipTransfer>>,
    last_transfer_cursor: Mutex<Option<Option<u64>>>,
}

impl FakeLotteryIndex {
    pub fn set_owner(&self, token_id: u64, owner: Address) {
        self.owners.lock().unwrap().insert(token_id, owner);
    }

    pub fn owner_batches(&self) -> Vec<usize> {
        self.owner_batches.lock().unwrap().clone()
    }

    /// The draw reports indexed after `misses` negative checks.
    pub fn index_after(&self, journey_id: u64, lottery_id: u64, misses: usize) {
        self.indexed_after.lock().unwrap().insert((journey_id, lottery_id), misses);
    }

    pub fn set_paid_out(&self, token_ids: impl IntoIterator<Item = u64>) {
        *self.paid_out.lock().unwrap() = token_ids.into_iter().collect();
    }

    pub fn payout_batches(&self) -> Vec<usize> {
        self.payout_batches.lock().unwrap().clone()
    }

    pub fn fail_payouts(&self) {
        self.failing_payouts.store(true, Ordering::SeqCst);
    }

    pub fn set_result_uris(&self, uris: Vec<String>) {
        *self.result_uris.lock().unwrap() = uris;
    }

    pub fn set_transfers(&self, transfers: Vec<OwnershipTransfer>) {
        *self.transfers.lock().unwrap() = transfers;
    }

    pub fn last_transfer_cursor(&self) -> Option<Option<u64>> {
        *self.last_transfer_cursor.lock().unwrap()
    }
}

#[async_trait]
impl LotteryIndex for FakeLotteryIndex {
    async fn is_result_indexed(&self, journey_id: u64, lottery_id: u64) -> Result<bool, SourceError> {
        let mut indexed_after = self.indexed_after.lock().unwrap();
        match indexed_after.get_mut(&(journey_id, lottery_id)) {
            Some(0) => Ok(true),
            Some(misses) => {
                *misses -= 1;
                Ok(false)
            }
            None => Ok(false),
        }
    }

    async fn resolve_owners(&self, token_ids: &[u64]) -> Result<HashMap<u64, Address>, SourceError> {
        self.owner_batches.lock().unwrap().push(token_ids.len());
        let owners = self.owners.lock().unwrap();
        Ok(token_ids.iter().filter_map(|id| owners.get(id).map(|owner| (*id, *owner))).collect())
    }

    async fn paid_out_token_ids(&self, token_ids: &[u64]) -> Result<Vec<u64>, SourceError> {
        self.payout_batches.lock().unwrap().push(token_ids.len());
        if self.failing_payouts.load(Ordering::SeqCst) {
            return Err(fake_failure("payout"));
        }
        let paid_out = self.paid_out.lock().unwrap();
        Ok(token_ids.iter().copied().filter(|id| paid_out.contains(id)).collect())
    }

    async fn result_uris_excluding(&self, known: &HashSet<String>) -> Result<Vec<String>, SourceError> {
        Ok(self.result_uris.lock().unwrap().iter().filter(|uri| !known.contains(*uri)).cloned().collect())
    }

    async fn transfers_since(&self, since: Option<u64>) -> Result<Vec<OwnershipTransfer>, SourceError> {
        *self.last_transfer_cursor.lock().unwrap() = Some(since);
        Ok(self.transfers.lock().unwrap().clone())
    }
}

#[derive(Default)]
pub struct FakeResultFetcher {
    results: Mutex<HashMap<String, Vec<DrawEntry>>>,
}

impl FakeResultFetcher {
    pub fn set_result(&self, uri: &str, entries: Vec<DrawEntry>) {
        self.results.lock().unwrap().insert(uri.to_string(), entries);
    }
}

#[async_trait]
impl LotteryResultFetcher for FakeResultFetcher {
    async fn fetch_result(&self, uri: &str) -> Result<Vec<DrawEntry>, SourceError> {
        self.results.lock().unwrap().get(uri).cloned().ok_or_else(|| fake_failure("result download"))
    }
}

#[derive(Default)]
pub struct FakeTokenIds {
    tokens: Mutex<HashMap<(Address, Era, Blockchain), String>>,
    lookups: AtomicUsize,
    failing: AtomicBool,
}

impl FakeTokenIds {
    pub fn set(&self, wallet: Address, era: Era, blockchain: Blockchain, token_id: &str) {
        self.tokens.lock().unwrap().insert((wallet, era, blockchain), token_id.to_string());
    }

    pub fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenIdSource for FakeTokenIds {
    async fn token_id(
        &self,
        wallet: Address,
        era: Era,
        blockchain: Blockchain,
    ) -> Result<Option<String>, SourceError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(fake_failure("token id"));
        }
        Ok(self.tokens.lock().unwrap().get(&(wallet, era, blockchain)).cloned())
    }
}

#[derive(Default)]
pub struct RecordingReporter {
    reports: Mutex<Vec<(String, String)>>,
}

impl RecordingReporter {
    /// (job, rendered error) pairs in report order.
    pub fn reports(&self) -> Vec<(String, String)> {
        self.reports.lock().unwrap().clone()
    }
}

impl ErrorReporter for RecordingReporter {
    fn report(&self, job: &str, err: &anyhow::Error) {
        self.reports.lock().unwrap().push((job.to_string(), format!("{err:?}")));
    }
}

/// Handles to the fakes behind a [test_context].
#[derive(Clone)]
pub struct Fakes {
    pub events: Arc<FakeEventSource>,
    pub prices: Arc<FakePriceOracle>,
    pub phase: Arc<FakePhaseSource>,
    pub lottery_index: Arc<FakeLotteryIndex>,
    pub results: Arc<FakeResultFetcher>,
    pub token_ids: Arc<FakeTokenIds>,
    pub reporter: Arc<RecordingReporter>,
}

/// An [AppContext] over the test database with every collaborator faked.
pub fn test_context(test_db: &TestDb, config: Config) -> (AppContext, Fakes) {
    let fakes = Fakes {
        events: Arc::new(FakeEventSource::default()),
        prices: Arc::new(FakePriceOracle::default()),
        phase: Arc::new(FakePhaseSource::default()),
        lottery_index: Arc::new(FakeLotteryIndex::default()),
        results: Arc::new(FakeResultFetcher::default()),
        token_ids: Arc::new(FakeTokenIds::default()),
        reporter: Arc::new(RecordingReporter::default()),
    };
    let collaborators = Collaborators {
        events: fakes.events.clone(),
        prices: fakes.prices.clone(),
        phase: fakes.phase.clone(),
        lottery_index: fakes.lottery_index.clone(),
        results: fakes.results.clone(),
        token_ids: fakes.token_ids.clone(),
        reporter: fakes.reporter.clone(),
    };
    let ctx = AppContext::new(test_db.db.clone(), ConfigLock::new(config), collaborators);
    (ctx, fakes)
}
