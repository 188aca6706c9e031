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
use serde::Serialize;
use thiserror::Error;

use crate::{
    db::{DbError, StateDbObj},
    errors::CodedError,
    impl_coded_debug,
    reports::{ReportError, ReportService, WalletSummary},
    sources::SourceError,
    types::{Blockchain, Era, User},
};

/// Eras whose participation NFT ids are tracked per user.
const TOKEN_ERAS: [Era; 2] = [Era::Wishwell, Era::Mining];
const TOKEN_CHAINS: [Blockchain; 2] = [Blockchain::Base, Blockchain::Pulsechain];

/// Looks up the participation NFT a wallet holds for an era on a chain.
#[async_trait]
pub trait TokenIdSource: Send + Sync {
    async fn token_id(
        &self,
        wallet: Address,
        era: Era,
        blockchain: Blockchain,
    ) -> Result<Option<String>, SourceError>;
}

#[derive(Error)]
pub enum UserError {
    #[error("Database error: {0}")]
    Db(#[from] DbError),

    #[error("Report error: {0}")]
    Report(#[from] ReportError),
}

impl_coded_debug!(UserError);

impl CodedError for UserError {
    fn code(&self) -> &str {
        match self {
            UserError::Db(_) => "[P-USR-001]",
            UserError::Report(_) => "[P-USR-002]",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub user: User,
    pub summary: WalletSummary,
}

#[derive(Clone)]
pub struct UserService {
    db: StateDbObj,
    tokens: Arc<dyn TokenIdSource>,
    reports: ReportService,
}

impl UserService {
    pub fn new(db: StateDbObj, tokens: Arc<dyn TokenIdSource>, reports: ReportService) -> Self {
        Self { db, tokens, reports }
    }

    /// Creates the user on first sight and fills in token ids that are still unknown.
    pub async fn check_or_create(&self, wallet: Address) -> Result<UserProfile, UserError> {
        let mut user = self.db.upsert_user(wallet).await?;

        let mut found = 0;
        for era in TOKEN_ERAS {
            for blockchain in TOKEN_CHAINS {
                if user.has_token(era, blockchain) {
                    continue;
                }
                match self.tokens.token_id(wallet, era, blockchain).await {
                    Ok(Some(token_id)) => {
                        self.db.set_user_token(wallet, era, blockchain, &token_id).await?;
                        found += 1;
                    }
                    Ok(None) => {}
                    Err(err) => {
                        tracing::warn!("Token id lookup for {wallet} era {era} on {blockchain} failed: {err:?}")
                    }
                }
            }
        }
        if found > 0 {
            tracing::info!("Stored {found} new token ids for {wallet}");
            user = self.db.get_user(wallet).await?.unwrap_or(user);
        }

        let summary = self.reports.wallet_summary(wallet).await?;
        Ok(UserProfile { user, summary })
    }
}
