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

use points_indexer::{
    leaderboard::{AllLeaderboards, LeaderboardRow, Standing},
    types::{Blockchain, DrawEntry, Era},
};
use serde::{Deserialize, Serialize};

/// Query parameters for pagination
#[derive(Debug, Deserialize)]
pub struct PaginationParams {
    /// Number of results to return (default: 50, max: 100)
    #[serde(default = "default_limit")]
    pub limit: u64,

    /// Number of results to skip (default: 0)
    #[serde(default)]
    pub offset: u64,
}

fn default_limit() -> u64 {
    50
}

impl PaginationParams {
    pub fn validate(self) -> Self {
        Self { limit: self.limit.min(100), offset: self.offset }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct WalletQuery {
    #[serde(default)]
    pub wallet: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PaginationMetadata {
    pub count: usize,
    pub offset: u64,
    pub limit: u64,
}

#[derive(Debug, Serialize)]
pub struct LeaderboardPage {
    pub entries: Vec<Standing>,
    pub pagination: PaginationMetadata,
}

impl LeaderboardPage {
    pub fn new(entries: Vec<Standing>, offset: u64, limit: u64) -> Self {
        let count = entries.len();
        Self { entries, pagination: PaginationMetadata { count, offset, limit } }
    }
}

/// Leaderboards as rendered rows. A `null` row separates the top from the
/// requesting wallet's neighborhood.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardsResponse {
    pub all_time: Vec<Option<LeaderboardRow>>,
    pub era1: Vec<Option<LeaderboardRow>>,
    pub era2: Vec<Option<LeaderboardRow>>,
    pub era3: Vec<Option<LeaderboardRow>>,
}

impl From<AllLeaderboards> for LeaderboardsResponse {
    fn from(all: AllLeaderboards) -> Self {
        Self {
            all_time: all.all_time.rows(),
            era1: all.era1.rows(),
            era2: all.era2.rows(),
            era3: all.era3.rows(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictRequest {
    pub wallet_address: String,
    pub amount: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceRequest {
    pub token_address: String,
    pub network: Blockchain,
}

#[derive(Debug, Deserialize)]
pub struct SyncRequest {
    pub era: Era,
    pub blockchain: Blockchain,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRequest {
    pub wallet_address: String,
}

#[derive(Debug, Deserialize)]
pub struct LotteryResultRequest {
    pub uri: String,
    pub entries: Vec<DrawEntry>,
}

/// Filters for entry listings.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryQuery {
    #[serde(default)]
    pub journey_id: Option<u64>,
    #[serde(default)]
    pub lottery_id: Option<u64>,
    #[serde(default)]
    pub is_pruned: bool,
}

#[derive(Debug, Serialize)]
pub struct PruneResponse {
    pub pruned: u64,
}
