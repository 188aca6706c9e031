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

use std::{
    collections::{BTreeSet, HashSet},
    sync::Arc,
};

use alloy::primitives::Address;
use async_trait::async_trait;
use sqlx::{any::AnyRow, Row};

use super::{now_secs, parse_optional_address, placeholders, DbError, PointsDb, MAX_IN_PARAMS};
use crate::types::{format_address, LotteryEntry, LotteryResult};

/// Optional narrowing of an entry lookup. `is_pruned` always applies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntryFilter {
    pub lottery_id: Option<u64>,
    pub journey_id: Option<u64>,
    pub is_pruned: bool,
}

impl EntryFilter {
    /// `AND ...` clauses starting at parameter `$next`, plus the values to bind in order.
    fn clauses(&self, mut next: usize) -> (String, Vec<i64>) {
        let mut sql = format!(" AND is_pruned = ${next}");
        let mut binds = vec![self.is_pruned as i64];
        next += 1;
        if let Some(lottery_id) = self.lottery_id {
            sql.push_str(&format!(" AND lottery_id = ${next}"));
            binds.push(lottery_id as i64);
            next += 1;
        }
        if let Some(journey_id) = self.journey_id {
            sql.push_str(&format!(" AND journey_id = ${next}"));
            binds.push(journey_id as i64);
        }
        (sql, binds)
    }
}

#[async_trait]
pub trait LotteryDb {
    /// Plain insert: a draw already recorded surfaces as a unique violation.
    async fn insert_lottery_result(&self, result: &LotteryResult) -> Result<(), DbError>;

    async fn stored_result_uris(&self) -> Result<HashSet<String>, DbError>;

    /// Inserts entries, skipping those already present. Returns the number inserted.
    async fn insert_lottery_entries(&self, entries: &[LotteryEntry]) -> Result<u64, DbError>;

    /// Distinct token ids of unpruned entries, for one wallet or for everyone.
    async fn unpruned_token_ids(&self, wallet: Option<Address>) -> Result<Vec<u64>, DbError>;

    /// Flags every entry of the given tokens as pruned. Never clears the flag.
    async fn mark_pruned(&self, token_ids: &[u64]) -> Result<u64, DbError>;

    async fn entries_for_wallet(
        &self,
        wallet: Address,
        filter: &EntryFilter,
    ) -> Result<Vec<LotteryEntry>, DbError>;

    async fn draw_entries(&self, filter: &EntryFilter) -> Result<Vec<LotteryEntry>, DbError>;

    /// Every entry in any of the (journey, lottery) draws.
    async fn entries_in_draws(&self, draws: &[(u64, u64)]) -> Result<Vec<LotteryEntry>, DbError>;

    async fn update_token_owner(&self, token_id: u64, wallet: Address) -> Result<u64, DbError>;

    /// Returns up to `limit` of the wallet's entries whose token was never handed out
    /// before, ordered by token id, and blocks those tokens in the same transaction.
    async fn take_decoy_entries(
        &self,
        wallet: Address,
        is_pruned: bool,
        limit: usize,
    ) -> Result<Vec<LotteryEntry>, DbError>;
}

pub type LotteryDbObj = Arc<dyn LotteryDb + Send + Sync>;

const ENTRY_COLUMNS: &str = "token_id, journey_id, lottery_id, wallet_address, is_pruned";

fn entry_from_row(row: &AnyRow) -> Result<LotteryEntry, DbError> {
    Ok(LotteryEntry {
        token_id: row.get::<i64, _>("token_id") as u64,
        journey_id: row.get::<i64, _>("journey_id") as u64,
        lottery_id: row.get::<i64, _>("lottery_id") as u64,
        wallet_address: parse_optional_address(row.get("wallet_address"))?,
        is_pruned: row.get::<i32, _>("is_pruned") != 0,
    })
}

#[async_trait]
impl LotteryDb for PointsDb {
    async fn insert_lottery_result(&self, result: &LotteryResult) -> Result<(), DbError> {
        sqlx::query(
            "INSERT INTO lottery_results (uri, journey_id, lottery_id, created_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(&result.uri)
        .bind(result.journey_id as i64)
        .bind(result.lottery_id as i64)
        .bind(now_secs() as i64)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn stored_result_uris(&self) -> Result<HashSet<String>, DbError> {
        let rows = sqlx::query("SELECT uri FROM lottery_results").fetch_all(self.pool()).await?;
        Ok(rows.iter().map(|row| row.get::<String, _>("uri")).collect())
    }

    async fn insert_lottery_entries(&self, entries: &[LotteryEntry]) -> Result<u64, DbError> {
        let mut tx = self.pool().begin().await?;
        let mut inserted = 0;

        for entry in entries {
            let query = r#"
                INSERT INTO lottery_entries (token_id, journey_id, lottery_id, wallet_address, is_pruned)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (token_id, journey_id, lottery_id) DO NOTHING
            "#;
            let result = sqlx::query(query)
                .bind(entry.token_id as i64)
                .bind(entry.journey_id as i64)
                .bind(entry.lottery_id as i64)
                .bind(entry.wallet_address.as_ref().map(format_address))
                .bind(if entry.is_pruned { 1i32 } else { 0i32 })
                .execute(&mut *tx)
                .await?;
            inserted += result.rows_affected();
        }

        tx.commit().await?;
        Ok(inserted)
    }

    async fn unpruned_token_ids(&self, wallet: Option<Address>) -> Result<Vec<u64>, DbError> {
        let rows = match wallet {
            Some(wallet) => {
                sqlx::query(
                    "SELECT DISTINCT token_id FROM lottery_entries WHERE wallet_address = $1 AND is_pruned = 0 ORDER BY token_id",
                )
                .bind(format_address(&wallet))
                .fetch_all(self.pool())
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT DISTINCT token_id FROM lottery_entries WHERE is_pruned = 0 ORDER BY token_id",
                )
                .fetch_all(self.pool())
                .await?
            }
        };
        Ok(rows.iter().map(|row| row.get::<i64, _>("token_id") as u64).collect())
    }

    async fn mark_pruned(&self, token_ids: &[u64]) -> Result<u64, DbError> {
        let mut updated = 0;
        for chunk in token_ids.chunks(MAX_IN_PARAMS) {
            let query = format!(
                "UPDATE lottery_entries SET is_pruned = 1 WHERE is_pruned = 0 AND token_id IN ({})",
                placeholders(1, chunk.len())
            );
            let mut q = sqlx::query(&query);
            for token_id in chunk {
                q = q.bind(*token_id as i64);
            }
            updated += q.execute(self.pool()).await?.rows_affected();
        }
        Ok(updated)
    }

    async fn entries_for_wallet(
        &self,
        wallet: Address,
        filter: &EntryFilter,
    ) -> Result<Vec<LotteryEntry>, DbError> {
        let (clauses, binds) = filter.clauses(2);
        let query = format!(
            "SELECT {ENTRY_COLUMNS} FROM lottery_entries WHERE wallet_address = $1{clauses} ORDER BY journey_id, lottery_id, token_id"
        );
        let mut q = sqlx::query(&query).bind(format_address(&wallet));
        for value in binds {
            q = q.bind(value);
        }
        let rows = q.fetch_all(self.pool()).await?;
        rows.iter().map(entry_from_row).collect()
    }

    async fn draw_entries(&self, filter: &EntryFilter) -> Result<Vec<LotteryEntry>, DbError> {
        let (clauses, binds) = filter.clauses(1);
        let query = format!(
            "SELECT {ENTRY_COLUMNS} FROM lottery_entries WHERE 1 = 1{clauses} ORDER BY journey_id, lottery_id, token_id"
        );
        let mut q = sqlx::query(&query);
        for value in binds {
            q = q.bind(value);
        }
        let rows = q.fetch_all(self.pool()).await?;
        rows.iter().map(entry_from_row).collect()
    }

    async fn entries_in_draws(&self, draws: &[(u64, u64)]) -> Result<Vec<LotteryEntry>, DbError> {
        let mut entries = Vec::new();
        for chunk in draws.chunks(MAX_IN_PARAMS / 2) {
            let predicate = (0..chunk.len())
                .map(|i| format!("(journey_id = ${} AND lottery_id = ${})", 2 * i + 1, 2 * i + 2))
                .collect::<Vec<_>>()
                .join(" OR ");
            let query = format!(
                "SELECT {ENTRY_COLUMNS} FROM lottery_entries WHERE {predicate} ORDER BY journey_id, lottery_id, token_id"
            );
            let mut q = sqlx::query(&query);
            for (journey_id, lottery_id) in chunk {
                q = q.bind(*journey_id as i64).bind(*lottery_id as i64);
            }
            for row in q.fetch_all(self.pool()).await? {
                entries.push(entry_from_row(&row)?);
            }
        }
        Ok(entries)
    }

    async fn update_token_owner(&self, token_id: u64, wallet: Address) -> Result<u64, DbError> {
        let result = sqlx::query("UPDATE lottery_entries SET wallet_address = $1 WHERE token_id = $2")
            .bind(format_address(&wallet))
            .bind(token_id as i64)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected())
    }

    async fn take_decoy_entries(
        &self,
        wallet: Address,
        is_pruned: bool,
        limit: usize,
    ) -> Result<Vec<LotteryEntry>, DbError> {
        let mut tx = self.pool().begin().await?;

        let query = format!(
            r#"
            SELECT {ENTRY_COLUMNS}
            FROM lottery_entries
            WHERE wallet_address = $1
              AND is_pruned = $2
              AND token_id NOT IN (SELECT token_id FROM decoy_blocked_tokens)
            ORDER BY token_id, journey_id, lottery_id
            LIMIT $3
            "#
        );
        let rows = sqlx::query(&query)
            .bind(format_address(&wallet))
            .bind(if is_pruned { 1i32 } else { 0i32 })
            .bind(limit as i64)
            .fetch_all(&mut *tx)
            .await?;
        let candidates = rows.iter().map(entry_from_row).collect::<Result<Vec<_>, _>>()?;

        // Only hand out tokens this call managed to block, so concurrent lookups never
        // serve the same token twice.
        let blocked_at = now_secs() as i64;
        let mut claimed = BTreeSet::new();
        for token_id in candidates.iter().map(|e| e.token_id).collect::<BTreeSet<_>>() {
            let result = sqlx::query(
                "INSERT INTO decoy_blocked_tokens (token_id, blocked_at) VALUES ($1, $2) ON CONFLICT (token_id) DO NOTHING",
            )
            .bind(token_id as i64)
            .bind(blocked_at)
            .execute(&mut *tx)
            .await?;
            if result.rows_affected() > 0 {
                claimed.insert(token_id);
            }
        }

        tx.commit().await?;
        Ok(candidates.into_iter().filter(|e| claimed.contains(&e.token_id)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{wallet, TestDb};

    fn entry(token_id: u64, journey_id: u64, lottery_id: u64, owner: u8) -> LotteryEntry {
        LotteryEntry {
            token_id,
            journey_id,
            lottery_id,
            wallet_address: Some(wallet(owner)),
            is_pruned: false,
        }
    }

    #[tokio::test]
    async fn duplicate_result_is_a_unique_violation() {
        let test_db = TestDb::new().await.unwrap();
        let db = test_db.db.clone();
        let result = LotteryResult { uri: "ipfs://a".into(), journey_id: 1, lottery_id: 2 };
        db.insert_lottery_result(&result).await.unwrap();

        let err = db.insert_lottery_result(&result).await.unwrap_err();
        assert!(err.is_unique_violation());

        let same_draw = LotteryResult { uri: "ipfs://b".into(), ..result };
        assert!(db.insert_lottery_result(&same_draw).await.unwrap_err().is_unique_violation());
        assert_eq!(db.stored_result_uris().await.unwrap(), HashSet::from(["ipfs://a".to_string()]));
    }

    #[tokio::test]
    async fn entry_inserts_skip_existing() {
        let test_db = TestDb::new().await.unwrap();
        let db = test_db.db.clone();
        let batch = vec![entry(1, 1, 1, 1), entry(2, 1, 1, 1)];
        assert_eq!(db.insert_lottery_entries(&batch).await.unwrap(), 2);
        assert_eq!(
            db.insert_lottery_entries(&[entry(2, 1, 1, 1), entry(3, 1, 1, 2)]).await.unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn pruning_is_monotone() {
        let test_db = TestDb::new().await.unwrap();
        let db = test_db.db.clone();
        db.insert_lottery_entries(&[entry(1, 1, 1, 1), entry(1, 1, 2, 1), entry(2, 1, 1, 1)])
            .await
            .unwrap();

        assert_eq!(db.mark_pruned(&[1]).await.unwrap(), 2);
        assert_eq!(db.mark_pruned(&[1]).await.unwrap(), 0);
        assert_eq!(db.unpruned_token_ids(Some(wallet(1))).await.unwrap(), vec![2]);

        // Re-inserting a pruned entry does not clear the flag.
        db.insert_lottery_entries(&[entry(1, 1, 1, 1)]).await.unwrap();
        let pruned = EntryFilter { is_pruned: true, ..Default::default() };
        assert_eq!(db.entries_for_wallet(wallet(1), &pruned).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn mark_pruned_chunks_large_inputs() {
        let test_db = TestDb::new().await.unwrap();
        let db = test_db.db.clone();
        let entries: Vec<_> = (0..1_000).map(|i| entry(i, 1, 1, 1)).collect();
        db.insert_lottery_entries(&entries).await.unwrap();
        let ids: Vec<u64> = (0..1_000).collect();
        assert_eq!(db.mark_pruned(&ids).await.unwrap(), 1_000);
        assert!(db.unpruned_token_ids(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn filters_and_draw_pools() {
        let test_db = TestDb::new().await.unwrap();
        let db = test_db.db.clone();
        db.insert_lottery_entries(&[
            entry(1, 1, 1, 1),
            entry(2, 1, 2, 1),
            entry(3, 2, 1, 1),
            entry(4, 1, 1, 2),
            entry(5, 3, 3, 2),
        ])
        .await
        .unwrap();

        let by_lottery = EntryFilter { lottery_id: Some(1), ..Default::default() };
        let tokens: Vec<_> = db
            .entries_for_wallet(wallet(1), &by_lottery)
            .await
            .unwrap()
            .iter()
            .map(|e| e.token_id)
            .collect();
        assert_eq!(tokens, vec![1, 3]);

        let both = EntryFilter { lottery_id: Some(1), journey_id: Some(1), is_pruned: false };
        assert_eq!(db.draw_entries(&both).await.unwrap().len(), 2);
        assert_eq!(db.draw_entries(&EntryFilter::default()).await.unwrap().len(), 5);

        let pool = db.entries_in_draws(&[(1, 1), (2, 1)]).await.unwrap();
        let tokens: Vec<_> = pool.iter().map(|e| e.token_id).collect();
        assert_eq!(tokens, vec![1, 4, 3]);
    }

    #[tokio::test]
    async fn owner_updates_apply_to_every_draw() {
        let test_db = TestDb::new().await.unwrap();
        let db = test_db.db.clone();
        db.insert_lottery_entries(&[entry(7, 1, 1, 1), entry(7, 1, 2, 1)]).await.unwrap();
        assert_eq!(db.update_token_owner(7, wallet(9)).await.unwrap(), 2);
        assert_eq!(db.entries_for_wallet(wallet(9), &EntryFilter::default()).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn decoy_pool_is_consumed() {
        let test_db = TestDb::new().await.unwrap();
        let db = test_db.db.clone();
        let entries: Vec<_> = (1..=5).map(|i| entry(i, 1, 1, 1)).collect();
        db.insert_lottery_entries(&entries).await.unwrap();

        let first = db.take_decoy_entries(wallet(1), false, 3).await.unwrap();
        assert_eq!(first.iter().map(|e| e.token_id).collect::<Vec<_>>(), vec![1, 2, 3]);
        let second = db.take_decoy_entries(wallet(1), false, 3).await.unwrap();
        assert_eq!(second.iter().map(|e| e.token_id).collect::<Vec<_>>(), vec![4, 5]);
        assert!(db.take_decoy_entries(wallet(1), false, 3).await.unwrap().is_empty());
    }
}
