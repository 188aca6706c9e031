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

pub mod ledger;
pub mod lottery;
pub mod state;

use std::{
    str::FromStr,
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use alloy::primitives::Address;
use sqlx::{
    any::{install_default_drivers, AnyConnectOptions, AnyPoolOptions},
    AnyPool,
};
use thiserror::Error;

use crate::{errors::CodedError, impl_coded_debug};

pub use ledger::{EligibilitySnapshot, Era2PointsRow, LedgerDb, LedgerDbObj, WalletTotal};
pub use lottery::{EntryFilter, LotteryDb, LotteryDbObj};
pub use state::{StateDb, StateDbObj};

/// Max bound parameters per `IN (...)` list, below the sqlite host parameter limit.
pub const MAX_IN_PARAMS: usize = 900;

#[derive(Error)]
pub enum DbError {
    #[error("SQL error {0:?}")]
    SqlErr(#[from] sqlx::Error),

    #[error("SQL Migration error {0:?}")]
    MigrateErr(#[from] sqlx::migrate::MigrateError),

    #[error("Invalid stored address: {0}")]
    BadAddress(String),

    #[error("Invalid stored value: {0}")]
    BadValue(String),
}

impl_coded_debug!(DbError);

impl CodedError for DbError {
    fn code(&self) -> &str {
        match self {
            DbError::SqlErr(_) => "[P-DB-001]",
            DbError::MigrateErr(_) => "[P-DB-002]",
            DbError::BadAddress(_) => "[P-DB-003]",
            DbError::BadValue(_) => "[P-DB-004]",
        }
    }
}

impl DbError {
    /// True when the failure is a unique key collision, i.e. the row already exists.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            DbError::SqlErr(sqlx::Error::Database(err)) => err.is_unique_violation(),
            _ => false,
        }
    }
}

/// Storage backend for every repository trait. Works against sqlite and postgres.
pub struct PointsDb {
    pool: AnyPool,
}

impl PointsDb {
    pub async fn new(database_url: &str) -> Result<Self, DbError> {
        install_default_drivers();
        let opts = AnyConnectOptions::from_str(database_url)?;

        let pool = AnyPoolOptions::new().max_connections(5).connect_with(opts).await?;

        sqlx::migrate!().run(&pool).await?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }
}

/// Builds the trait objects the services consume from one shared backend.
pub fn repositories(db: Arc<PointsDb>) -> (LedgerDbObj, LotteryDbObj, StateDbObj) {
    (db.clone(), db.clone(), db)
}

pub fn now_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or_default()
}

pub(crate) fn parse_address(value: &str) -> Result<Address, DbError> {
    Address::from_str(value).map_err(|_| DbError::BadAddress(value.to_string()))
}

pub(crate) fn parse_optional_address(value: Option<String>) -> Result<Option<Address>, DbError> {
    value.as_deref().map(parse_address).transpose()
}

/// `$start, $start+1, ...` placeholder list of `count` parameters.
pub(crate) fn placeholders(start: usize, count: usize) -> String {
    (start..start + count).map(|i| format!("${i}")).collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_lists() {
        assert_eq!(placeholders(1, 3), "$1, $2, $3");
        assert_eq!(placeholders(2, 1), "$2");
        assert_eq!(placeholders(1, 0), "");
    }
}
