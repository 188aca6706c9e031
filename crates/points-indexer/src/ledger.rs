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

//! Points ledger writer and admin grants.

use alloy::primitives::Address;
use serde::Deserialize;
use thiserror::Error;

use crate::{
    config::{ConfigErr, ConfigLock, MultiplierConfig},
    db::{DbError, EligibilitySnapshot, LedgerDbObj},
    errors::CodedError,
    impl_coded_debug,
    multiplier::{multipliers_for, points_for, PriorParticipation},
    types::{parse_wallet, Contribution, Era, NewPointsEntry},
};

#[derive(Error)]
pub enum LedgerError {
    #[error("{0}")]
    Validation(String),

    #[error("Unauthorized admin grant")]
    Unauthorized,

    #[error("Database error: {0}")]
    Db(#[from] DbError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigErr),
}

impl_coded_debug!(LedgerError);

impl CodedError for LedgerError {
    fn code(&self) -> &str {
        match self {
            LedgerError::Validation(_) => "[P-LED-001]",
            LedgerError::Unauthorized => "[P-LED-002]",
            LedgerError::Db(_) => "[P-LED-003]",
            LedgerError::Config(_) => "[P-LED-004]",
        }
    }
}

/// Decides whether an admin grant request may proceed.
pub trait GrantAuthorizer: Send + Sync {
    fn authorize(&self, credential: Option<&str>) -> bool;
}

/// Accepts requests carrying the configured shared secret. Without a secret, rejects all.
pub struct SharedSecretAuthorizer {
    secret: Option<String>,
}

impl SharedSecretAuthorizer {
    pub fn new(secret: Option<String>) -> Self {
        Self { secret: secret.filter(|s| !s.is_empty()) }
    }
}

impl GrantAuthorizer for SharedSecretAuthorizer {
    fn authorize(&self, credential: Option<&str>) -> bool {
        match (&self.secret, credential) {
            (Some(secret), Some(given)) => constant_time_eq(secret.as_bytes(), given.as_bytes()),
            _ => false,
        }
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Admin grant as submitted by a caller. Points may be a number or a numeric string.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminGrantRequest {
    pub wallet_address: String,
    pub points: serde_json::Value,
    #[serde(default)]
    pub era: Option<u8>,
    #[serde(default)]
    pub shared_secret: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AdminGrant {
    pub wallet_address: Address,
    pub points: f64,
    pub era: Era,
}

impl TryFrom<&AdminGrantRequest> for AdminGrant {
    type Error = LedgerError;

    fn try_from(req: &AdminGrantRequest) -> Result<Self, Self::Error> {
        let wallet_address = parse_wallet(&req.wallet_address)
            .map_err(|e| LedgerError::Validation(e.to_string()))?;
        let points = match &req.points {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
        .filter(|p| p.is_finite())
        .ok_or_else(|| LedgerError::Validation(format!("invalid points amount: {}", req.points)))?;
        let era = match req.era {
            Some(n) => {
                Era::from_number(n as u64).map_err(|e| LedgerError::Validation(e.to_string()))?
            }
            None => Era::Minting,
        };
        Ok(Self { wallet_address, points, era })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedgerOutcome {
    pub contributions: usize,
    pub points_entries: usize,
    pub duplicates: usize,
    /// Contributions persisted without points: no wallet, no base value or no timestamp.
    pub unscored: usize,
    /// Points entry inserts that failed after the contribution was stored.
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredPoints {
    pub multiplier: u32,
    pub reward_multiplier: f64,
    pub points: f64,
}

/// Points for one contribution, or None when it cannot be scored.
pub fn score(
    contribution: &Contribution,
    prior: PriorParticipation,
    config: &MultiplierConfig,
) -> Option<ScoredPoints> {
    let base = contribution.base_value()?;
    let multipliers = multipliers_for(contribution, prior, config)?;
    Some(ScoredPoints {
        multiplier: multipliers.phase,
        reward_multiplier: multipliers.reward,
        points: points_for(base, multipliers),
    })
}

/// Writes contributions and their points entries.
#[derive(Clone)]
pub struct PointsLedger {
    db: LedgerDbObj,
    config: ConfigLock,
}

impl PointsLedger {
    pub fn new(db: LedgerDbObj, config: ConfigLock) -> Self {
        Self { db, config }
    }

    /// Persists each contribution, then its points entry. A contribution that already
    /// exists is skipped. A failed points insert is logged and does not stop the batch.
    pub async fn record(
        &self,
        contributions: Vec<Contribution>,
        eligibility: &EligibilitySnapshot,
    ) -> Result<LedgerOutcome, LedgerError> {
        let config = self.config.lock_all()?.multipliers.clone();
        let mut outcome = LedgerOutcome::default();

        for contribution in contributions {
            let Some(contribution_id) = self.db.insert_contribution(&contribution).await? else {
                tracing::info!(
                    "Era {} contribution {} already recorded",
                    contribution.era(),
                    contribution.transaction_hash
                );
                outcome.duplicates += 1;
                continue;
            };
            outcome.contributions += 1;

            let Some(wallet) = contribution.wallet_address else {
                tracing::warn!(
                    "Contribution {} has no wallet, no points recorded",
                    contribution.transaction_hash
                );
                outcome.unscored += 1;
                continue;
            };
            let prior = eligibility.participation(&wallet);
            let Some(scored) = score(&contribution, prior, &config) else {
                tracing::warn!(
                    "Contribution {} lacks a value or timestamp, no points recorded",
                    contribution.transaction_hash
                );
                outcome.unscored += 1;
                continue;
            };

            let entry = NewPointsEntry {
                era: contribution.era(),
                wallet_address: wallet,
                contribution_id: Some(contribution_id),
                multiplier: Some(scored.multiplier),
                reward_multiplier: scored.reward_multiplier,
                points: scored.points,
                is_granted_by_admin: false,
            };
            match self.db.insert_points_entry(&entry).await {
                Ok(Some(_)) => outcome.points_entries += 1,
                Ok(None) => outcome.duplicates += 1,
                Err(err) => {
                    tracing::error!(
                        "Failed to record points for contribution {}: {err:?}",
                        contribution.transaction_hash
                    );
                    outcome.failed += 1;
                }
            }
        }

        Ok(outcome)
    }

    /// Records an admin grant after authorization and validation. Returns the entry id.
    pub async fn grant(
        &self,
        request: &AdminGrantRequest,
        authorizer: &dyn GrantAuthorizer,
    ) -> Result<String, LedgerError> {
        if !authorizer.authorize(request.shared_secret.as_deref()) {
            tracing::warn!("Rejected admin grant for {}", request.wallet_address.trim());
            return Err(LedgerError::Unauthorized);
        }
        let grant = AdminGrant::try_from(request)?;

        let entry = NewPointsEntry {
            era: grant.era,
            wallet_address: grant.wallet_address,
            contribution_id: None,
            multiplier: None,
            reward_multiplier: 1.0,
            points: grant.points,
            is_granted_by_admin: true,
        };
        let id = self
            .db
            .insert_points_entry(&entry)
            .await?
            .ok_or_else(|| LedgerError::Validation("grant was not recorded".into()))?;
        tracing::info!("Granted {} points to {} in era {}", grant.points, grant.wallet_address, grant.era);
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::Config,
        db::{Era2PointsRow, LedgerDb, PointsDb, WalletTotal},
        multiplier::PriorParticipation,
        test_utils::{mining_contribution, wallet, TestDb},
        types::{PointsEntry, StoredContribution},
    };
    use async_trait::async_trait;
    use std::{
        collections::HashSet,
        sync::{
            atomic::{AtomicBool, Ordering},
            Arc,
        },
    };
    use tracing_test::traced_test;

    /// Ledger store whose points inserts fail while `failing` is set.
    struct FlakyPointsDb {
        inner: Arc<PointsDb>,
        failing: AtomicBool,
    }

    #[async_trait]
    impl LedgerDb for FlakyPointsDb {
        async fn transaction_hashes(&self, era: Era) -> Result<HashSet<String>, DbError> {
            self.inner.transaction_hashes(era).await
        }

        async fn insert_contribution(&self, contribution: &Contribution) -> Result<Option<String>, DbError> {
            self.inner.insert_contribution(contribution).await
        }

        async fn get_contribution(
            &self,
            era: Era,
            transaction_hash: &str,
        ) -> Result<Option<StoredContribution>, DbError> {
            self.inner.get_contribution(era, transaction_hash).await
        }

        async fn contributions_for_wallet(
            &self,
            wallet: Address,
            era: Option<Era>,
        ) -> Result<Vec<StoredContribution>, DbError> {
            self.inner.contributions_for_wallet(wallet, era).await
        }

        async fn count_contributions(&self, era: Era) -> Result<u64, DbError> {
            self.inner.count_contributions(era).await
        }

        async fn insert_points_entry(&self, entry: &NewPointsEntry) -> Result<Option<String>, DbError> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(DbError::BadValue("points table unavailable".into()));
            }
            self.inner.insert_points_entry(entry).await
        }

        async fn points_entries_for_wallet(&self, wallet: Address) -> Result<Vec<PointsEntry>, DbError> {
            self.inner.points_entries_for_wallet(wallet).await
        }

        async fn count_points_entries(&self, era: Option<Era>) -> Result<u64, DbError> {
            self.inner.count_points_entries(era).await
        }

        async fn wallet_totals(&self, era: Option<Era>) -> Result<Vec<WalletTotal>, DbError> {
            self.inner.wallet_totals(era).await
        }

        async fn era_totals_for_wallet(&self, wallet: Address) -> Result<Vec<(Era, f64)>, DbError> {
            self.inner.era_totals_for_wallet(wallet).await
        }

        async fn eligibility(&self) -> Result<EligibilitySnapshot, DbError> {
            self.inner.eligibility().await
        }

        async fn prior_participation(&self, wallet: Address) -> Result<PriorParticipation, DbError> {
            self.inner.prior_participation(wallet).await
        }

        async fn era1_contributors(&self) -> Result<Vec<Address>, DbError> {
            self.inner.era1_contributors().await
        }

        async fn era2_points_report(&self) -> Result<Vec<Era2PointsRow>, DbError> {
            self.inner.era2_points_report().await
        }
    }

    fn ledger(test_db: &TestDb, config: Config) -> PointsLedger {
        PointsLedger::new(test_db.db.clone(), ConfigLock::new(config))
    }

    fn early_config() -> Config {
        let mut config = Config::default();
        config.multipliers.era2_phases.phase1_end = 1_000;
        config.multipliers.era2_phases.phase2_end = 2_000;
        config
    }

    fn grant_request(points: serde_json::Value, secret: Option<&str>) -> AdminGrantRequest {
        AdminGrantRequest {
            wallet_address: " 0x00000000000000000000000000000000000000AA ".into(),
            points,
            era: None,
            shared_secret: secret.map(str::to_string),
        }
    }

    #[tokio::test]
    #[traced_test]
    async fn records_contribution_and_points() {
        let test_db = TestDb::new().await.unwrap();
        let ledger = ledger(&test_db, early_config());
        let eligibility =
            EligibilitySnapshot { era1: HashSet::from([wallet(1)]), era2: HashSet::new() };

        let outcome = ledger
            .record(
                vec![
                    mining_contribution(wallet(1), "0x01", 500, 10.0),
                    mining_contribution(wallet(2), "0x02", 1_500, 10.0),
                ],
                &eligibility,
            )
            .await
            .unwrap();
        assert_eq!(outcome.contributions, 2);
        assert_eq!(outcome.points_entries, 2);

        let entries = test_db.db.points_entries_for_wallet(wallet(1)).await.unwrap();
        assert_eq!(entries[0].points, 660.0);
        assert_eq!(entries[0].multiplier, Some(33));
        assert_eq!(entries[0].reward_multiplier, 2.0);
        let entries = test_db.db.points_entries_for_wallet(wallet(2)).await.unwrap();
        assert_eq!(entries[0].points, 220.0);
    }

    #[tokio::test]
    #[traced_test]
    async fn replay_is_a_no_op() {
        let test_db = TestDb::new().await.unwrap();
        let ledger = ledger(&test_db, early_config());
        let batch = vec![mining_contribution(wallet(1), "0x01", 500, 10.0)];

        ledger.record(batch.clone(), &EligibilitySnapshot::default()).await.unwrap();
        let outcome = ledger.record(batch, &EligibilitySnapshot::default()).await.unwrap();
        assert_eq!(outcome, LedgerOutcome { duplicates: 1, ..Default::default() });
        assert_eq!(test_db.db.count_points_entries(None).await.unwrap(), 1);
        assert!(logs_contain("already recorded"));
    }

    #[tokio::test]
    #[traced_test]
    async fn failed_points_insert_keeps_the_contribution() {
        let test_db = TestDb::new().await.unwrap();
        let flaky = Arc::new(FlakyPointsDb { inner: test_db.db.clone(), failing: AtomicBool::new(true) });
        let ledger = PointsLedger::new(flaky.clone(), ConfigLock::new(early_config()));
        let batch = vec![
            mining_contribution(wallet(1), "0x01", 500, 10.0),
            mining_contribution(wallet(2), "0x02", 500, 10.0),
        ];

        let outcome = ledger.record(batch.clone(), &EligibilitySnapshot::default()).await.unwrap();
        assert_eq!(outcome.contributions, 2);
        assert_eq!(outcome.failed, 2);
        assert_eq!(outcome.points_entries, 0);
        assert!(logs_contain("Failed to record points"));
        assert!(test_db.db.get_contribution(Era::Mining, "0x01").await.unwrap().is_some());
        assert_eq!(test_db.db.count_points_entries(None).await.unwrap(), 0);

        // a retry sees the stored hashes and scores nothing twice
        flaky.failing.store(false, Ordering::SeqCst);
        let outcome = ledger.record(batch, &EligibilitySnapshot::default()).await.unwrap();
        assert_eq!(outcome, LedgerOutcome { duplicates: 2, ..Default::default() });
        assert_eq!(test_db.db.count_contributions(Era::Mining).await.unwrap(), 2);
        assert_eq!(test_db.db.count_points_entries(None).await.unwrap(), 0);
    }

    #[tokio::test]
    #[traced_test]
    async fn contribution_without_wallet_gets_no_points() {
        let test_db = TestDb::new().await.unwrap();
        let ledger = ledger(&test_db, early_config());
        let mut contribution = mining_contribution(wallet(1), "0x01", 500, 10.0);
        contribution.wallet_address = None;

        let outcome = ledger.record(vec![contribution], &EligibilitySnapshot::default()).await.unwrap();
        assert_eq!(outcome.contributions, 1);
        assert_eq!(outcome.unscored, 1);
        assert_eq!(test_db.db.count_points_entries(None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn grant_requires_secret() {
        let test_db = TestDb::new().await.unwrap();
        let ledger = ledger(&test_db, Config::default());
        let auth = SharedSecretAuthorizer::new(Some("hunter2".into()));

        let err = ledger.grant(&grant_request(serde_json::json!(5), Some("nope")), &auth).await;
        assert!(matches!(err, Err(LedgerError::Unauthorized)));
        let err = ledger.grant(&grant_request(serde_json::json!(5), None), &auth).await;
        assert!(matches!(err, Err(LedgerError::Unauthorized)));

        let no_secret = SharedSecretAuthorizer::new(None);
        let err = ledger.grant(&grant_request(serde_json::json!(5), Some("")), &no_secret).await;
        assert!(matches!(err, Err(LedgerError::Unauthorized)));
        assert_eq!(test_db.db.count_points_entries(None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn grant_records_literal_points() {
        let test_db = TestDb::new().await.unwrap();
        let ledger = ledger(&test_db, Config::default());
        let auth = SharedSecretAuthorizer::new(Some("hunter2".into()));

        ledger.grant(&grant_request(serde_json::json!("12.5"), Some("hunter2")), &auth).await.unwrap();
        let entries = test_db.db.points_entries_for_wallet(wallet(0xaa)).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].points, 12.5);
        assert_eq!(entries[0].era, Era::Minting);
        assert_eq!(entries[0].multiplier, None);
        assert!(entries[0].is_granted_by_admin);
        assert!(entries[0].contribution_id.is_none());
    }

    #[tokio::test]
    async fn grant_rejects_bad_input() {
        let test_db = TestDb::new().await.unwrap();
        let ledger = ledger(&test_db, Config::default());
        let auth = SharedSecretAuthorizer::new(Some("s".into()));

        let err = ledger.grant(&grant_request(serde_json::json!("lots"), Some("s")), &auth).await;
        assert!(matches!(err, Err(LedgerError::Validation(_))));

        let mut bad_wallet = grant_request(serde_json::json!(1), Some("s"));
        bad_wallet.wallet_address = "0x123".into();
        assert!(matches!(ledger.grant(&bad_wallet, &auth).await, Err(LedgerError::Validation(_))));

        let mut bad_era = grant_request(serde_json::json!(1), Some("s"));
        bad_era.era = Some(7);
        assert!(matches!(ledger.grant(&bad_era, &auth).await, Err(LedgerError::Validation(_))));
    }
}
