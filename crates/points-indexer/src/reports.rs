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

//! Per-wallet summaries and the era reports served to operators.

use alloy::primitives::Address;
use serde::Serialize;
use thiserror::Error;

use crate::{
    config::{ConfigErr, ConfigLock},
    db::{DbError, LedgerDbObj, StateDbObj},
    errors::CodedError,
    impl_coded_debug,
    leaderboard::badge_for_points,
    multiplier::{journey_multiplier, phase_multiplier, reward_multiplier},
    phase::PhaseView,
    types::{ContributionDetails, Era},
};

#[derive(Error)]
pub enum ReportError {
    #[error("{0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Db(#[from] DbError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigErr),
}

impl_coded_debug!(ReportError);

impl CodedError for ReportError {
    fn code(&self) -> &str {
        match self {
            ReportError::Validation(_) => "[P-RPT-001]",
            ReportError::Db(_) => "[P-RPT-002]",
            ReportError::Config(_) => "[P-RPT-003]",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletSummary {
    pub wallet_address: Address,
    pub wishwell_points: f64,
    pub mining_points: f64,
    pub minting_points: f64,
    pub total_points: f64,
    /// Total points per era 1 USD contributed, 0 without era 1 value.
    pub points_average: f64,
    pub badge: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Era2PointsReportRow {
    pub wallet_address: Address,
    /// Points over eras 1 and 2.
    pub total_points: f64,
    pub era2_points: f64,
    pub difference: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Era2Prediction {
    pub amount: f64,
    pub phase_multiplier: u32,
    pub reward_multiplier: f64,
    pub points: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletPhase {
    #[serde(flatten)]
    pub phase: PhaseView,
    pub journey_multiplier: u32,
    pub reward_multiplier: f64,
}

#[derive(Clone)]
pub struct ReportService {
    ledger: LedgerDbObj,
    state: StateDbObj,
    config: ConfigLock,
}

impl ReportService {
    pub fn new(ledger: LedgerDbObj, state: StateDbObj, config: ConfigLock) -> Self {
        Self { ledger, state, config }
    }

    pub async fn total_points(&self, wallet: Address) -> Result<f64, ReportError> {
        let totals = self.ledger.era_totals_for_wallet(wallet).await?;
        Ok(totals.iter().map(|(_, points)| points).sum())
    }

    pub async fn wallet_summary(&self, wallet: Address) -> Result<WalletSummary, ReportError> {
        let totals = self.ledger.era_totals_for_wallet(wallet).await?;
        let era_points =
            |era: Era| totals.iter().filter(|(e, _)| *e == era).map(|(_, p)| p).sum::<f64>();
        let total_points = totals.iter().map(|(_, points)| points).sum::<f64>();

        let usd_value: f64 = self
            .ledger
            .contributions_for_wallet(wallet, Some(Era::Wishwell))
            .await?
            .iter()
            .filter_map(|stored| match &stored.contribution.details {
                ContributionDetails::Wishwell(d) => d.usd_value,
                _ => None,
            })
            .sum();
        let points_average = if usd_value > 0.0 { total_points / usd_value } else { 0.0 };

        Ok(WalletSummary {
            wallet_address: wallet,
            wishwell_points: era_points(Era::Wishwell),
            mining_points: era_points(Era::Mining),
            minting_points: era_points(Era::Minting),
            total_points,
            points_average,
            badge: badge_for_points(total_points).to_string(),
        })
    }

    pub async fn era1_contributors(&self) -> Result<Vec<Address>, ReportError> {
        Ok(self.ledger.era1_contributors().await?)
    }

    pub async fn era2_points_report(&self) -> Result<Vec<Era2PointsReportRow>, ReportError> {
        let rows = self.ledger.era2_points_report().await?;
        Ok(rows
            .into_iter()
            .map(|row| Era2PointsReportRow {
                wallet_address: row.wallet_address,
                total_points: row.total_points,
                era2_points: row.era2_points,
                difference: row.total_points - row.era2_points,
            })
            .collect())
    }

    /// Points a mining deposit of `amount` would earn for the wallet at `now`.
    pub async fn predict_era2_points(
        &self,
        wallet: Address,
        amount: f64,
        now: u64,
    ) -> Result<Era2Prediction, ReportError> {
        if !amount.is_finite() || amount < 0.0 {
            return Err(ReportError::Validation(format!("invalid amount: {amount}")));
        }
        let config = self.config.lock_all()?.multipliers.clone();
        let prior = self.ledger.prior_participation(wallet).await?;

        let phase_multiplier = phase_multiplier(now, &config.era2_phases);
        let reward_multiplier = reward_multiplier(Era::Mining, prior, &config);
        Ok(Era2Prediction {
            amount,
            phase_multiplier,
            reward_multiplier,
            points: amount * phase_multiplier as f64 * reward_multiplier,
        })
    }

    /// The phase view with the multipliers a mint by the wallet would get now.
    pub async fn phase_for_wallet(&self, wallet: Address) -> Result<Option<WalletPhase>, ReportError> {
        let Some(state) = self.state.get_phase_state().await? else {
            return Ok(None);
        };
        let config = self.config.lock_all()?.multipliers.clone();
        let prior = self.ledger.prior_participation(wallet).await?;
        Ok(Some(WalletPhase {
            phase: PhaseView::from(&state),
            journey_multiplier: journey_multiplier(Some(state.current_journey)),
            reward_multiplier: reward_multiplier(Era::Minting, prior, &config),
        }))
    }
}
