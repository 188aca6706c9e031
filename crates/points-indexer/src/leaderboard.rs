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

//! Ranked leaderboard views over the points ledger.

use std::cmp::Ordering;

use alloy::primitives::Address;
use serde::Serialize;
use thiserror::Error;

use crate::{
    config::{ConfigErr, ConfigLock},
    db::{DbError, LedgerDbObj, WalletTotal},
    errors::CodedError,
    impl_coded_debug,
    types::Era,
};

pub const NO_BADGE: &str = "No Badge";

/// Lower bound of each badge band, ascending. A band ends where the next one starts.
const BADGES: [(f64, &str); 11] = [
    (0.0, "Informant"),
    (3_333.0, "Jr. Operator"),
    (6_666.0, "Sr. Operator"),
    (9_999.0, "Lead Operator"),
    (33_333.0, "Jr. Technician"),
    (66_666.0, "Sr. Technician"),
    (99_999.0, "Lead Technician"),
    (333_333.0, "Jr. Agent"),
    (666_666.0, "Sr. Agent"),
    (999_999.0, "Special Agent"),
    (3_333_333.0, "2nd Navigator"),
];

/// Upper bound of the last badge band.
const BADGE_CEILING: f64 = 33_333_333.0;

#[derive(Error)]
pub enum LeaderboardError {
    #[error("Database error: {0}")]
    Db(#[from] DbError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigErr),
}

impl_coded_debug!(LeaderboardError);

impl CodedError for LeaderboardError {
    fn code(&self) -> &str {
        match self {
            LeaderboardError::Db(_) => "[P-LDB-001]",
            LeaderboardError::Config(_) => "[P-LDB-002]",
        }
    }
}

pub fn badge_for_points(points: f64) -> &'static str {
    if !(0.0..=BADGE_CEILING).contains(&points) {
        return NO_BADGE;
    }
    BADGES.iter().rev().find(|(floor, _)| points >= *floor).map(|(_, name)| *name).unwrap_or(NO_BADGE)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum LeaderboardScope {
    AllTime,
    Era(Era),
}

impl LeaderboardScope {
    fn era(self) -> Option<Era> {
        match self {
            LeaderboardScope::AllTime => None,
            LeaderboardScope::Era(era) => Some(era),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Standing {
    pub rank: u64,
    pub wallet_address: Address,
    pub total_points: f64,
}

/// Total order: points descending, then wallet address ascending.
fn standing_order(a: &WalletTotal, b: &WalletTotal) -> Ordering {
    b.total_points
        .total_cmp(&a.total_points)
        .then_with(|| a.wallet_address.cmp(&b.wallet_address))
}

/// Sorts totals into 1-based ranks. Ties get distinct ranks by wallet address.
pub fn rank_standings(mut totals: Vec<WalletTotal>) -> Vec<Standing> {
    totals.sort_by(standing_order);
    totals
        .into_iter()
        .enumerate()
        .map(|(i, t)| Standing {
            rank: i as u64 + 1,
            wallet_address: t.wallet_address,
            total_points: t.total_points,
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardRow {
    pub rank: u64,
    pub wallet_address: Address,
    pub total_points: f64,
    pub badge: &'static str,
    /// Set on the row of the requesting wallet.
    pub special: bool,
}

impl LeaderboardRow {
    fn from_standing(standing: &Standing, wallet: Option<&Address>) -> Self {
        Self {
            rank: standing.rank,
            wallet_address: standing.wallet_address,
            total_points: standing.total_points,
            badge: badge_for_points(standing.total_points),
            special: wallet == Some(&standing.wallet_address),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Leaderboard {
    pub top: Vec<LeaderboardRow>,
    /// Previous, requesting and next wallet when the requesting wallet is outside the top.
    pub around_wallet: Vec<LeaderboardRow>,
}

impl Leaderboard {
    /// Flattened rendering: top rows, a `None` separator, then the neighborhood.
    pub fn rows(&self) -> Vec<Option<LeaderboardRow>> {
        self.top
            .iter()
            .cloned()
            .map(Some)
            .chain(std::iter::once(None))
            .chain(self.around_wallet.iter().cloned().map(Some))
            .collect()
    }
}

pub fn build_leaderboard(standings: &[Standing], top_n: usize, wallet: Option<Address>) -> Leaderboard {
    let top: Vec<_> = standings
        .iter()
        .take(top_n)
        .map(|s| LeaderboardRow::from_standing(s, wallet.as_ref()))
        .collect();

    let around_wallet = wallet
        .and_then(|wallet| standings.iter().position(|s| s.wallet_address == wallet))
        .filter(|&idx| idx >= top_n)
        .map(|idx| {
            let end = (idx + 2).min(standings.len());
            standings[idx.saturating_sub(1)..end]
                .iter()
                .map(|s| LeaderboardRow::from_standing(s, wallet.as_ref()))
                .collect()
        })
        .unwrap_or_default();

    Leaderboard { top, around_wallet }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AllLeaderboards {
    pub all_time: Leaderboard,
    pub era1: Leaderboard,
    pub era2: Leaderboard,
    pub era3: Leaderboard,
}

#[derive(Clone)]
pub struct LeaderboardService {
    db: LedgerDbObj,
    config: ConfigLock,
}

impl LeaderboardService {
    pub fn new(db: LedgerDbObj, config: ConfigLock) -> Self {
        Self { db, config }
    }

    pub async fn standings(&self, scope: LeaderboardScope) -> Result<Vec<Standing>, LeaderboardError> {
        let totals = self.db.wallet_totals(scope.era()).await?;
        Ok(rank_standings(totals))
    }

    pub async fn leaderboard(
        &self,
        scope: LeaderboardScope,
        wallet: Option<Address>,
    ) -> Result<Leaderboard, LeaderboardError> {
        let top_n = self.config.lock_all()?.leaderboard.top_n;
        let standings = self.standings(scope).await?;
        Ok(build_leaderboard(&standings, top_n, wallet))
    }

    pub async fn all(&self, wallet: Option<Address>) -> Result<AllLeaderboards, LeaderboardError> {
        Ok(AllLeaderboards {
            all_time: self.leaderboard(LeaderboardScope::AllTime, wallet).await?,
            era1: self.leaderboard(LeaderboardScope::Era(Era::Wishwell), wallet).await?,
            era2: self.leaderboard(LeaderboardScope::Era(Era::Mining), wallet).await?,
            era3: self.leaderboard(LeaderboardScope::Era(Era::Minting), wallet).await?,
        })
    }

    /// One page of the ranked table.
    pub async fn page(
        &self,
        scope: LeaderboardScope,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Standing>, LeaderboardError> {
        let standings = self.standings(scope).await?;
        Ok(standings.into_iter().skip(offset).take(limit).collect())
    }
}
