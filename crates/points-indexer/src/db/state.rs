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

use std::sync::Arc;

use alloy::primitives::Address;
use async_trait::async_trait;
use sqlx::Row;

use super::{now_secs, DbError, PointsDb};
use crate::types::{format_address, Blockchain, Era, PhaseState, User, UserToken};

/// Row id of the phase state singleton.
const PHASE_STATE_ID: i32 = 1;

#[async_trait]
pub trait StateDb {
    async fn get_phase_state(&self) -> Result<Option<PhaseState>, DbError>;

    /// Replaces the singleton as a whole.
    async fn upsert_phase_state(&self, state: &PhaseState) -> Result<(), DbError>;

    async fn get_cursor(&self, key: &str) -> Result<Option<u64>, DbError>;

    async fn set_cursor(&self, key: &str, value: u64) -> Result<(), DbError>;

    /// Creates the user if missing and returns it with its known tokens.
    async fn upsert_user(&self, wallet: Address) -> Result<User, DbError>;

    async fn get_user(&self, wallet: Address) -> Result<Option<User>, DbError>;

    async fn set_user_token(
        &self,
        wallet: Address,
        era: Era,
        blockchain: Blockchain,
        token_id: &str,
    ) -> Result<(), DbError>;
}

pub type StateDbObj = Arc<dyn StateDb + Send + Sync>;

impl PointsDb {
    async fn user_tokens(&self, wallet: &str) -> Result<Vec<UserToken>, DbError> {
        let rows = sqlx::query(
            "SELECT era, blockchain, token_id FROM user_tokens WHERE wallet_address = $1 ORDER BY era, blockchain",
        )
        .bind(wallet)
        .fetch_all(self.pool())
        .await?;

        rows.iter()
            .map(|row| {
                Ok(UserToken {
                    era: Era::from_number(row.get::<i32, _>("era") as u64)
                        .map_err(|e| DbError::BadValue(e.to_string()))?,
                    blockchain: row
                        .get::<String, _>("blockchain")
                        .parse()
                        .map_err(|e: crate::types::TypeError| DbError::BadValue(e.to_string()))?,
                    token_id: row.get("token_id"),
                })
            })
            .collect()
    }
}

#[async_trait]
impl StateDb for PointsDb {
    async fn get_phase_state(&self) -> Result<Option<PhaseState>, DbError> {
        let query = r#"
            SELECT current_journey, current_phase, next_journey_timestamp, next_phase_timestamp, is_journey_paused
            FROM phase_state
            WHERE id = $1
        "#;
        let row = sqlx::query(query).bind(PHASE_STATE_ID).fetch_optional(self.pool()).await?;

        Ok(row.map(|row| PhaseState {
            current_journey: row.get::<i64, _>("current_journey") as u64,
            current_phase: row.get::<i64, _>("current_phase") as u64,
            next_journey_timestamp: row.get::<i64, _>("next_journey_timestamp") as u64,
            next_phase_timestamp: row.get::<i64, _>("next_phase_timestamp") as u64,
            is_journey_paused: row.get::<i32, _>("is_journey_paused") != 0,
        }))
    }

    async fn upsert_phase_state(&self, state: &PhaseState) -> Result<(), DbError> {
        let query = r#"
            INSERT INTO phase_state
            (id, current_journey, current_phase, next_journey_timestamp, next_phase_timestamp, is_journey_paused, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id)
            DO UPDATE SET
                current_journey = $2,
                current_phase = $3,
                next_journey_timestamp = $4,
                next_phase_timestamp = $5,
                is_journey_paused = $6,
                updated_at = $7
        "#;
        sqlx::query(query)
            .bind(PHASE_STATE_ID)
            .bind(state.current_journey as i64)
            .bind(state.current_phase as i64)
            .bind(state.next_journey_timestamp as i64)
            .bind(state.next_phase_timestamp as i64)
            .bind(if state.is_journey_paused { 1i32 } else { 0i32 })
            .bind(now_secs() as i64)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    async fn get_cursor(&self, key: &str) -> Result<Option<u64>, DbError> {
        let row = sqlx::query("SELECT value FROM indexer_state WHERE key = $1")
            .bind(key)
            .fetch_optional(self.pool())
            .await?;

        row.map(|row| {
            let value: String = row.get("value");
            value.parse::<u64>().map_err(|_| DbError::BadValue(value))
        })
        .transpose()
    }

    async fn set_cursor(&self, key: &str, value: u64) -> Result<(), DbError> {
        sqlx::query(
            "INSERT INTO indexer_state (key, value) VALUES ($1, $2) ON CONFLICT (key) DO UPDATE SET value = $2",
        )
        .bind(key)
        .bind(value.to_string())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn upsert_user(&self, wallet: Address) -> Result<User, DbError> {
        let wallet_str = format_address(&wallet);
        sqlx::query(
            "INSERT INTO users (wallet_address, created_at) VALUES ($1, $2) ON CONFLICT (wallet_address) DO NOTHING",
        )
        .bind(&wallet_str)
        .bind(now_secs() as i64)
        .execute(self.pool())
        .await?;

        Ok(User { wallet_address: wallet, token_ids: self.user_tokens(&wallet_str).await? })
    }

    async fn get_user(&self, wallet: Address) -> Result<Option<User>, DbError> {
        let wallet_str = format_address(&wallet);
        let exists = sqlx::query("SELECT wallet_address FROM users WHERE wallet_address = $1")
            .bind(&wallet_str)
            .fetch_optional(self.pool())
            .await?
            .is_some();
        if !exists {
            return Ok(None);
        }
        Ok(Some(User { wallet_address: wallet, token_ids: self.user_tokens(&wallet_str).await? }))
    }

    async fn set_user_token(
        &self,
        wallet: Address,
        era: Era,
        blockchain: Blockchain,
        token_id: &str,
    ) -> Result<(), DbError> {
        let query = r#"
            INSERT INTO user_tokens (wallet_address, era, blockchain, token_id)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (wallet_address, era, blockchain)
            DO UPDATE SET token_id = $4
        "#;
        sqlx::query(query)
            .bind(format_address(&wallet))
            .bind(era.number() as i32)
            .bind(blockchain.as_str())
            .bind(token_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{wallet, TestDb};

    #[tokio::test]
    async fn phase_state_singleton() {
        let test_db = TestDb::new().await.unwrap();
        let db = test_db.db.clone();
        assert!(db.get_phase_state().await.unwrap().is_none());

        let mut state = PhaseState {
            current_journey: 1,
            current_phase: 1,
            next_journey_timestamp: 100,
            next_phase_timestamp: 50,
            is_journey_paused: false,
        };
        db.upsert_phase_state(&state).await.unwrap();
        state.current_phase = 2;
        state.is_journey_paused = true;
        db.upsert_phase_state(&state).await.unwrap();

        assert_eq!(db.get_phase_state().await.unwrap(), Some(state));
        let count = sqlx::query("SELECT COUNT(*) AS count FROM phase_state")
            .fetch_one(db.pool())
            .await
            .unwrap()
            .get::<i64, _>("count");
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn cursors() {
        let test_db = TestDb::new().await.unwrap();
        let db = test_db.db.clone();
        assert_eq!(db.get_cursor("transfers").await.unwrap(), None);
        db.set_cursor("transfers", 10).await.unwrap();
        db.set_cursor("transfers", 20).await.unwrap();
        assert_eq!(db.get_cursor("transfers").await.unwrap(), Some(20));
    }

    #[tokio::test]
    async fn users_and_tokens() {
        let test_db = TestDb::new().await.unwrap();
        let db = test_db.db.clone();
        assert!(db.get_user(wallet(1)).await.unwrap().is_none());

        let user = db.upsert_user(wallet(1)).await.unwrap();
        assert!(user.token_ids.is_empty());

        db.set_user_token(wallet(1), Era::Mining, Blockchain::Base, "12").await.unwrap();
        let user = db.upsert_user(wallet(1)).await.unwrap();
        assert!(user.has_token(Era::Mining, Blockchain::Base));
        assert!(!user.has_token(Era::Mining, Blockchain::Pulsechain));
        assert_eq!(db.get_user(wallet(1)).await.unwrap(), Some(user));
    }
}
