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

use std::{collections::HashSet, sync::Arc};

use alloy::primitives::Address;
use async_trait::async_trait;
use sqlx::{any::AnyRow, Row};

use super::{now_secs, parse_address, parse_optional_address, DbError, PointsDb};
use crate::{
    multiplier::PriorParticipation,
    types::{
        format_address, Blockchain, Contribution, ContributionDetails, Era, MiningDetails,
        MintingDetails, NewPointsEntry, PointsEntry, StoredContribution, WishwellDetails,
    },
};

#[derive(Debug, Clone, PartialEq)]
pub struct WalletTotal {
    pub wallet_address: Address,
    pub total_points: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Era2PointsRow {
    pub wallet_address: Address,
    pub total_points: f64,
    pub era2_points: f64,
}

/// Wallets that count as prior-era participants when scoring later eras.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EligibilitySnapshot {
    /// Wallets with a positive usd valued era 1 contribution.
    pub era1: HashSet<Address>,
    /// Wallets whose era 2 token amounts sum to a positive value.
    pub era2: HashSet<Address>,
}

impl EligibilitySnapshot {
    pub fn participation(&self, wallet: &Address) -> PriorParticipation {
        PriorParticipation { era1: self.era1.contains(wallet), era2: self.era2.contains(wallet) }
    }
}

#[async_trait]
pub trait LedgerDb {
    /// Every transaction hash already stored for the era.
    async fn transaction_hashes(&self, era: Era) -> Result<HashSet<String>, DbError>;

    /// Inserts the contribution and returns its id, or None when the (era, tx hash) exists.
    async fn insert_contribution(
        &self,
        contribution: &Contribution,
    ) -> Result<Option<String>, DbError>;

    async fn get_contribution(
        &self,
        era: Era,
        transaction_hash: &str,
    ) -> Result<Option<StoredContribution>, DbError>;

    async fn contributions_for_wallet(
        &self,
        wallet: Address,
        era: Option<Era>,
    ) -> Result<Vec<StoredContribution>, DbError>;

    async fn count_contributions(&self, era: Era) -> Result<u64, DbError>;

    /// Inserts the entry and returns its id, or None when its contribution already has one.
    async fn insert_points_entry(&self, entry: &NewPointsEntry) -> Result<Option<String>, DbError>;

    async fn points_entries_for_wallet(&self, wallet: Address)
        -> Result<Vec<PointsEntry>, DbError>;

    async fn count_points_entries(&self, era: Option<Era>) -> Result<u64, DbError>;

    /// Points summed per wallet, over one era or all of them. Unordered.
    async fn wallet_totals(&self, era: Option<Era>) -> Result<Vec<WalletTotal>, DbError>;

    /// Points per era for one wallet. Eras without entries are omitted.
    async fn era_totals_for_wallet(&self, wallet: Address) -> Result<Vec<(Era, f64)>, DbError>;

    async fn eligibility(&self) -> Result<EligibilitySnapshot, DbError>;

    async fn prior_participation(&self, wallet: Address) -> Result<PriorParticipation, DbError>;

    async fn era1_contributors(&self) -> Result<Vec<Address>, DbError>;

    /// Wallets holding era 2 points, with their era 1 and 2 total.
    async fn era2_points_report(&self) -> Result<Vec<Era2PointsRow>, DbError>;
}

pub type LedgerDbObj = Arc<dyn LedgerDb + Send + Sync>;

const CONTRIBUTION_COLUMNS: &str = "id, era, blockchain, wallet_address, transaction_hash, timestamp, token_address, token_name, token_symbol, token_amount, raw_amount, token_usd_price, usd_value, pool_address, fuel_cells, journey_id";

fn contribution_from_row(row: &AnyRow) -> Result<StoredContribution, DbError> {
    let era = Era::from_number(row.get::<i32, _>("era") as u64)
        .map_err(|e| DbError::BadValue(e.to_string()))?;
    let blockchain = row
        .get::<String, _>("blockchain")
        .parse::<Blockchain>()
        .map_err(|e| DbError::BadValue(e.to_string()))?;
    let token_address = parse_optional_address(row.get("token_address"))?;

    let details = match era {
        Era::Wishwell => ContributionDetails::Wishwell(WishwellDetails {
            token_address,
            token_name: row.get("token_name"),
            token_symbol: row.get("token_symbol"),
            token_amount: row.get("token_amount"),
            token_usd_price: row.get("token_usd_price"),
            usd_value: row.get("usd_value"),
            pool_address: row.get("pool_address"),
        }),
        Era::Mining => ContributionDetails::Mining(MiningDetails {
            token_address,
            raw_amount: row.get("raw_amount"),
            token_amount: row.get("token_amount"),
        }),
        Era::Minting => ContributionDetails::Minting(MintingDetails {
            fuel_cells: row.get::<Option<i64>, _>("fuel_cells").map(|v| v as u64),
            journey_id: row.get::<Option<i64>, _>("journey_id").map(|v| v as u64),
        }),
    };

    Ok(StoredContribution {
        id: row.get("id"),
        era,
        contribution: Contribution {
            blockchain,
            wallet_address: parse_optional_address(row.get("wallet_address"))?,
            transaction_hash: row.get("transaction_hash"),
            timestamp: row.get::<Option<i64>, _>("timestamp").map(|v| v as u64),
            details,
        },
    })
}

fn points_entry_from_row(row: &AnyRow) -> Result<PointsEntry, DbError> {
    Ok(PointsEntry {
        id: row.get("id"),
        era: Era::from_number(row.get::<i32, _>("era") as u64)
            .map_err(|e| DbError::BadValue(e.to_string()))?,
        wallet_address: parse_address(&row.get::<String, _>("wallet_address"))?,
        contribution_id: row.get("contribution_id"),
        multiplier: row.get::<Option<i32>, _>("multiplier").map(|v| v as u32),
        reward_multiplier: row.get("reward_multiplier"),
        points: row.get("points"),
        is_granted_by_admin: row.get::<i32, _>("is_granted_by_admin") != 0,
        created_at: row.get::<i64, _>("created_at") as u64,
    })
}

#[derive(Default)]
struct ContributionColumns {
    token_address: Option<String>,
    token_name: Option<String>,
    token_symbol: Option<String>,
    token_amount: Option<f64>,
    raw_amount: Option<String>,
    token_usd_price: Option<f64>,
    usd_value: Option<f64>,
    pool_address: Option<String>,
    fuel_cells: Option<i64>,
    journey_id: Option<i64>,
}

impl From<&ContributionDetails> for ContributionColumns {
    fn from(details: &ContributionDetails) -> Self {
        match details {
            ContributionDetails::Wishwell(d) => Self {
                token_address: d.token_address.as_ref().map(format_address),
                token_name: d.token_name.clone(),
                token_symbol: d.token_symbol.clone(),
                token_amount: d.token_amount,
                token_usd_price: d.token_usd_price,
                usd_value: d.usd_value,
                pool_address: d.pool_address.clone(),
                ..Default::default()
            },
            ContributionDetails::Mining(d) => Self {
                token_address: d.token_address.as_ref().map(format_address),
                raw_amount: d.raw_amount.clone(),
                token_amount: d.token_amount,
                ..Default::default()
            },
            ContributionDetails::Minting(d) => Self {
                fuel_cells: d.fuel_cells.map(|v| v as i64),
                journey_id: d.journey_id.map(|v| v as i64),
                ..Default::default()
            },
        }
    }
}

#[async_trait]
impl LedgerDb for PointsDb {
    async fn transaction_hashes(&self, era: Era) -> Result<HashSet<String>, DbError> {
        let rows = sqlx::query("SELECT transaction_hash FROM contributions WHERE era = $1")
            .bind(era.number() as i32)
            .fetch_all(self.pool())
            .await?;

        Ok(rows.iter().map(|row| row.get::<String, _>("transaction_hash")).collect())
    }

    async fn insert_contribution(
        &self,
        contribution: &Contribution,
    ) -> Result<Option<String>, DbError> {
        let id = uuid::Uuid::new_v4().to_string();
        let cols = ContributionColumns::from(&contribution.details);

        let query = r#"
            INSERT INTO contributions
            (id, era, blockchain, wallet_address, transaction_hash, timestamp, token_address, token_name, token_symbol,
             token_amount, raw_amount, token_usd_price, usd_value, pool_address, fuel_cells, journey_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            ON CONFLICT (era, transaction_hash) DO NOTHING
        "#;

        let result = sqlx::query(query)
            .bind(&id)
            .bind(contribution.era().number() as i32)
            .bind(contribution.blockchain.as_str())
            .bind(contribution.wallet_address.as_ref().map(format_address))
            .bind(contribution.transaction_hash.to_lowercase())
            .bind(contribution.timestamp.map(|t| t as i64))
            .bind(cols.token_address)
            .bind(cols.token_name)
            .bind(cols.token_symbol)
            .bind(cols.token_amount)
            .bind(cols.raw_amount)
            .bind(cols.token_usd_price)
            .bind(cols.usd_value)
            .bind(cols.pool_address)
            .bind(cols.fuel_cells)
            .bind(cols.journey_id)
            .bind(now_secs() as i64)
            .execute(self.pool())
            .await?;

        Ok((result.rows_affected() > 0).then_some(id))
    }

    async fn get_contribution(
        &self,
        era: Era,
        transaction_hash: &str,
    ) -> Result<Option<StoredContribution>, DbError> {
        let query = format!(
            "SELECT {CONTRIBUTION_COLUMNS} FROM contributions WHERE era = $1 AND transaction_hash = $2"
        );
        let row = sqlx::query(&query)
            .bind(era.number() as i32)
            .bind(transaction_hash.to_lowercase())
            .fetch_optional(self.pool())
            .await?;

        row.as_ref().map(contribution_from_row).transpose()
    }

    async fn contributions_for_wallet(
        &self,
        wallet: Address,
        era: Option<Era>,
    ) -> Result<Vec<StoredContribution>, DbError> {
        let rows = match era {
            Some(era) => {
                let query = format!(
                    "SELECT {CONTRIBUTION_COLUMNS} FROM contributions WHERE wallet_address = $1 AND era = $2 ORDER BY timestamp DESC, id"
                );
                sqlx::query(&query)
                    .bind(format_address(&wallet))
                    .bind(era.number() as i32)
                    .fetch_all(self.pool())
                    .await?
            }
            None => {
                let query = format!(
                    "SELECT {CONTRIBUTION_COLUMNS} FROM contributions WHERE wallet_address = $1 ORDER BY era, timestamp DESC, id"
                );
                sqlx::query(&query).bind(format_address(&wallet)).fetch_all(self.pool()).await?
            }
        };

        rows.iter().map(contribution_from_row).collect()
    }

    async fn count_contributions(&self, era: Era) -> Result<u64, DbError> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM contributions WHERE era = $1")
            .bind(era.number() as i32)
            .fetch_one(self.pool())
            .await?;
        Ok(row.get::<i64, _>("count") as u64)
    }

    async fn insert_points_entry(&self, entry: &NewPointsEntry) -> Result<Option<String>, DbError> {
        let id = uuid::Uuid::new_v4().to_string();
        let query = r#"
            INSERT INTO points_entries
            (id, era, wallet_address, contribution_id, multiplier, reward_multiplier, points, is_granted_by_admin, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (contribution_id) DO NOTHING
        "#;

        let result = sqlx::query(query)
            .bind(&id)
            .bind(entry.era.number() as i32)
            .bind(format_address(&entry.wallet_address))
            .bind(entry.contribution_id.clone())
            .bind(entry.multiplier.map(|m| m as i32))
            .bind(entry.reward_multiplier)
            .bind(entry.points)
            .bind(if entry.is_granted_by_admin { 1i32 } else { 0i32 })
            .bind(now_secs() as i64)
            .execute(self.pool())
            .await?;

        Ok((result.rows_affected() > 0).then_some(id))
    }

    async fn points_entries_for_wallet(
        &self,
        wallet: Address,
    ) -> Result<Vec<PointsEntry>, DbError> {
        let query = r#"
            SELECT id, era, wallet_address, contribution_id, multiplier, reward_multiplier, points, is_granted_by_admin, created_at
            FROM points_entries
            WHERE wallet_address = $1
            ORDER BY created_at DESC, id
        "#;
        let rows =
            sqlx::query(query).bind(format_address(&wallet)).fetch_all(self.pool()).await?;

        rows.iter().map(points_entry_from_row).collect()
    }

    async fn count_points_entries(&self, era: Option<Era>) -> Result<u64, DbError> {
        let row = match era {
            Some(era) => {
                sqlx::query("SELECT COUNT(*) AS count FROM points_entries WHERE era = $1")
                    .bind(era.number() as i32)
                    .fetch_one(self.pool())
                    .await?
            }
            None => {
                sqlx::query("SELECT COUNT(*) AS count FROM points_entries")
                    .fetch_one(self.pool())
                    .await?
            }
        };
        Ok(row.get::<i64, _>("count") as u64)
    }

    async fn wallet_totals(&self, era: Option<Era>) -> Result<Vec<WalletTotal>, DbError> {
        let rows = match era {
            Some(era) => {
                let query = r#"
                    SELECT wallet_address, SUM(points) AS total_points
                    FROM points_entries
                    WHERE era = $1
                    GROUP BY wallet_address
                "#;
                sqlx::query(query).bind(era.number() as i32).fetch_all(self.pool()).await?
            }
            None => {
                let query = r#"
                    SELECT wallet_address, SUM(points) AS total_points
                    FROM points_entries
                    GROUP BY wallet_address
                "#;
                sqlx::query(query).fetch_all(self.pool()).await?
            }
        };

        rows.iter()
            .map(|row| {
                Ok(WalletTotal {
                    wallet_address: parse_address(&row.get::<String, _>("wallet_address"))?,
                    total_points: row.get("total_points"),
                })
            })
            .collect()
    }

    async fn era_totals_for_wallet(&self, wallet: Address) -> Result<Vec<(Era, f64)>, DbError> {
        let query = r#"
            SELECT era, SUM(points) AS total_points
            FROM points_entries
            WHERE wallet_address = $1
            GROUP BY era
            ORDER BY era
        "#;
        let rows =
            sqlx::query(query).bind(format_address(&wallet)).fetch_all(self.pool()).await?;

        rows.iter()
            .map(|row| {
                let era = Era::from_number(row.get::<i32, _>("era") as u64)
                    .map_err(|e| DbError::BadValue(e.to_string()))?;
                Ok((era, row.get::<f64, _>("total_points")))
            })
            .collect()
    }

    async fn eligibility(&self) -> Result<EligibilitySnapshot, DbError> {
        let era1 = self.era1_contributors().await?.into_iter().collect();

        let query = r#"
            SELECT wallet_address
            FROM contributions
            WHERE era = 2 AND wallet_address IS NOT NULL
            GROUP BY wallet_address
            HAVING SUM(token_amount) > 0
        "#;
        let rows = sqlx::query(query).fetch_all(self.pool()).await?;
        let era2 = rows
            .iter()
            .map(|row| parse_address(&row.get::<String, _>("wallet_address")))
            .collect::<Result<HashSet<_>, _>>()?;

        Ok(EligibilitySnapshot { era1, era2 })
    }

    async fn prior_participation(&self, wallet: Address) -> Result<PriorParticipation, DbError> {
        let wallet = format_address(&wallet);
        let era1 = sqlx::query(
            "SELECT COUNT(*) AS count FROM contributions WHERE era = 1 AND wallet_address = $1 AND usd_value > 0",
        )
        .bind(&wallet)
        .fetch_one(self.pool())
        .await?
        .get::<i64, _>("count")
            > 0;

        let era2 = sqlx::query(
            "SELECT COUNT(*) AS count FROM contributions WHERE era = 2 AND wallet_address = $1 GROUP BY wallet_address HAVING SUM(token_amount) > 0",
        )
        .bind(&wallet)
        .fetch_optional(self.pool())
        .await?
        .is_some();

        Ok(PriorParticipation { era1, era2 })
    }

    async fn era1_contributors(&self) -> Result<Vec<Address>, DbError> {
        let query = r#"
            SELECT DISTINCT wallet_address
            FROM contributions
            WHERE era = 1 AND wallet_address IS NOT NULL AND usd_value > 0
            ORDER BY wallet_address
        "#;
        let rows = sqlx::query(query).fetch_all(self.pool()).await?;
        rows.iter().map(|row| parse_address(&row.get::<String, _>("wallet_address"))).collect()
    }

    async fn era2_points_report(&self) -> Result<Vec<Era2PointsRow>, DbError> {
        let query = r#"
            SELECT wallet_address,
                   SUM(CASE WHEN era IN (1, 2) THEN points ELSE 0.0 END) AS total_points,
                   SUM(CASE WHEN era = 2 THEN points ELSE 0.0 END) AS era2_points
            FROM points_entries
            GROUP BY wallet_address
            HAVING SUM(CASE WHEN era = 2 THEN points ELSE 0.0 END) > 0
            ORDER BY wallet_address
        "#;
        let rows = sqlx::query(query).fetch_all(self.pool()).await?;

        rows.iter()
            .map(|row| {
                Ok(Era2PointsRow {
                    wallet_address: parse_address(&row.get::<String, _>("wallet_address"))?,
                    total_points: row.get("total_points"),
                    era2_points: row.get("era2_points"),
                })
            })
            .collect()
    }
}
