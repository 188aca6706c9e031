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

//! Usd valuation of era 1 contributions.

use std::{sync::Arc, time::Duration};

use alloy::primitives::Address;
use async_trait::async_trait;
use serde::Serialize;

use crate::{
    config::ConfigLock,
    sources::SourceError,
    types::{Blockchain, Contribution, ContributionDetails},
};

/// Pools whose name lists more tokens than this are skipped during selection.
const MAX_POOL_NAME_SYMBOLS: usize = 2;

#[derive(Debug, Clone, PartialEq)]
pub struct Pool {
    pub address: String,
    pub name: String,
    pub fdv_usd: Option<f64>,
}

/// Which side of a pool to price.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceSide {
    Token(Address),
    /// The pool's quote token, used for wrapped native coins.
    Quote,
}

#[async_trait]
pub trait PriceOracle: Send + Sync {
    async fn search_pools(
        &self,
        token: Address,
        network: Blockchain,
    ) -> Result<Vec<Pool>, SourceError>;

    /// Opening usd price of the last minute bar before `as_of`, if any.
    async fn pool_price(
        &self,
        pool_address: &str,
        network: Blockchain,
        side: PriceSide,
        as_of: u64,
    ) -> Result<Option<f64>, SourceError>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Valuation {
    pub price: f64,
    /// Empty when no pool was found.
    pub pool_address: String,
    /// True when the default price was substituted.
    pub degraded: bool,
}

/// Number of token symbols in a pool name such as `"PLSX / WPLS 0.3%"`.
pub fn pool_symbol_count(name: &str) -> usize {
    name.split('/').count()
}

/// The candidate with the largest fully diluted valuation among pools of at most two
/// tokens. The first pool wins a tie.
pub fn select_pool(pools: &[Pool]) -> Option<&Pool> {
    pools
        .iter()
        .filter(|pool| pool_symbol_count(&pool.name) <= MAX_POOL_NAME_SYMBOLS)
        .fold(None, |best: Option<&Pool>, pool| match best {
            Some(current)
                if current.fdv_usd.unwrap_or(f64::MIN) >= pool.fdv_usd.unwrap_or(f64::MIN) =>
            {
                Some(current)
            }
            _ => Some(pool),
        })
}

/// Resolves historical usd prices. Every failure degrades to the configured default price.
#[derive(Clone)]
pub struct ValuationResolver {
    oracle: Arc<dyn PriceOracle>,
    config: ConfigLock,
}

impl ValuationResolver {
    pub fn new(oracle: Arc<dyn PriceOracle>, config: ConfigLock) -> Self {
        Self { oracle, config }
    }

    fn settings(&self) -> (f64, Duration) {
        match self.config.lock_all() {
            Ok(config) => (
                config.pricing.default_price,
                Duration::from_millis(config.pricing.request_delay_ms),
            ),
            Err(err) => {
                tracing::error!("Failed to read pricing config: {err:?}");
                (0.0, Duration::from_millis(500))
            }
        }
    }

    /// Pool address for the token, from the static mapping first and the pool index
    /// second. Empty when neither yields a pool.
    pub async fn fetch_pool_address_for_token(&self, token: Address, network: Blockchain) -> String {
        let mapped = self
            .config
            .lock_all()
            .ok()
            .and_then(|config| config.pricing.mapped_pool(network, &token).map(str::to_string));
        if let Some(pool) = mapped {
            return pool;
        }

        match self.oracle.search_pools(token, network).await {
            Ok(pools) => select_pool(&pools).map(|pool| pool.address.clone()).unwrap_or_default(),
            Err(err) => {
                tracing::warn!("Pool search failed for {token} on {network}: {err:?}");
                String::new()
            }
        }
    }

    pub async fn resolve(&self, token: Option<Address>, network: Blockchain, as_of: u64) -> Valuation {
        let (default_price, _) = self.settings();
        let degraded = |pool_address: String| Valuation { price: default_price, pool_address, degraded: true };

        let Some(token) = token else {
            tracing::warn!("Contribution without a token on {network}, using default price");
            return degraded(String::new());
        };

        let pool_address = self.fetch_pool_address_for_token(token, network).await;
        if pool_address.is_empty() {
            tracing::warn!("No pool found for {token} on {network}, using default price");
            return degraded(pool_address);
        }

        let side = match self.config.lock_all() {
            Ok(config) if config.pricing.is_wrapped_native(network, &token) => PriceSide::Quote,
            _ => PriceSide::Token(token),
        };

        match self.oracle.pool_price(&pool_address, network, side, as_of).await {
            Ok(Some(price)) if price.is_finite() => Valuation { price, pool_address, degraded: false },
            Ok(_) => {
                tracing::warn!("No price bar for pool {pool_address} before {as_of}, using default price");
                degraded(pool_address)
            }
            Err(err) => {
                tracing::warn!("Price lookup failed for pool {pool_address}: {err:?}");
                degraded(pool_address)
            }
        }
    }

    /// Fills in price, usd value and pool on every era 1 contribution, pausing between
    /// lookups to respect the pool index rate limit.
    pub async fn value_contributions(&self, contributions: &mut [Contribution]) {
        let (_, delay) = self.settings();
        let mut first = true;
        for contribution in contributions.iter_mut() {
            let network = contribution.blockchain;
            let as_of = contribution.timestamp.unwrap_or_default();
            let ContributionDetails::Wishwell(details) = &mut contribution.details else {
                continue;
            };
            if !first && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            first = false;

            let valuation = self.resolve(details.token_address, network, as_of).await;
            details.token_usd_price = Some(valuation.price);
            details.usd_value = details.token_amount.map(|amount| amount * valuation.price);
            details.pool_address = Some(valuation.pool_address);
        }
    }
}
