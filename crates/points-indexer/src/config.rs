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
    collections::HashMap,
    path::Path,
    sync::{Arc, RwLock},
};

use alloy::primitives::Address;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    errors::CodedError,
    impl_coded_debug,
    types::{Blockchain, Era},
};

/// End of the 33x window as unix seconds, shared by eras 1 and 2 unless configured.
const DEFAULT_PHASE1_END: u64 = 1717961485;

#[derive(Error)]
pub enum ConfigErr {
    #[error("Failed to lock internal config structure")]
    LockFailed,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl_coded_debug!(ConfigErr);

impl CodedError for ConfigErr {
    fn code(&self) -> &str {
        match self {
            ConfigErr::LockFailed => "[P-CON-001]",
            ConfigErr::InvalidConfig(_) => "[P-CON-002]",
        }
    }
}

/// Timestamps separating the 33x, 22x and 11x windows of a phase-scored era.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseBoundaries {
    pub phase1_end: u64,
    pub phase2_end: u64,
}

impl Default for PhaseBoundaries {
    fn default() -> Self {
        Self { phase1_end: DEFAULT_PHASE1_END, phase2_end: DEFAULT_PHASE1_END }
    }
}

/// Multiplier tables
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MultiplierConfig {
    pub era1_phases: PhaseBoundaries,
    pub era2_phases: PhaseBoundaries,
    /// Era 2 reward multiplier for wallets that contributed value in era 1.
    pub era2_prior_era_bonus: f64,
    /// Era 3 reward multiplier for wallets active in both prior eras.
    pub era3_both_eras_bonus: f64,
    /// Era 3 reward multiplier for wallets active in exactly one prior era.
    pub era3_single_era_bonus: f64,
}

impl Default for MultiplierConfig {
    fn default() -> Self {
        Self {
            era1_phases: PhaseBoundaries::default(),
            era2_phases: PhaseBoundaries::default(),
            era2_prior_era_bonus: 2.0,
            era3_both_eras_bonus: 4.0,
            era3_single_era_bonus: 2.0,
        }
    }
}

/// Valuation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PricingConfig {
    /// Usd price applied when no pool or no price can be found.
    pub default_price: f64,
    /// Pause between consecutive pool index requests, in milliseconds.
    pub request_delay_ms: u64,
    /// Known pools per network, keyed by token address.
    pub pool_mappings: HashMap<Blockchain, HashMap<Address, String>>,
    /// Wrapped native token per network. Priced against the pool's quote side.
    pub wrapped_native: HashMap<Blockchain, Address>,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            default_price: 0.0,
            request_delay_ms: 500,
            pool_mappings: HashMap::new(),
            wrapped_native: HashMap::new(),
        }
    }
}

impl PricingConfig {
    pub fn mapped_pool(&self, network: Blockchain, token: &Address) -> Option<&str> {
        self.pool_mappings.get(&network).and_then(|pools| pools.get(token)).map(String::as_str)
    }

    pub fn is_wrapped_native(&self, network: Blockchain, token: &Address) -> bool {
        self.wrapped_native.get(&network) == Some(token)
    }
}

/// Lottery settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LotteryConfig {
    /// Max token ids per owner or payout lookup.
    pub batch_size: usize,
    pub confirmation_poll_interval_secs: u64,
    pub confirmation_timeout_secs: u64,
    /// Wallet whose entry lookups are served from the decoy pool.
    pub decoy_address: Option<Address>,
    pub decoy_result_limit: usize,
}

impl Default for LotteryConfig {
    fn default() -> Self {
        Self {
            batch_size: 900,
            confirmation_poll_interval_secs: 30,
            confirmation_timeout_secs: 30 * 60,
            decoy_address: None,
            decoy_result_limit: 10,
        }
    }
}

/// Phase tracker settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PhaseConfig {
    /// A pause newer than this many seconds triggers a refresh.
    pub pause_refresh_window_secs: u64,
}

impl Default for PhaseConfig {
    fn default() -> Self {
        Self { pause_refresh_window_secs: 180 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionTarget {
    pub era: Era,
    pub blockchain: Blockchain,
}

/// Schedules of the background jobs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    pub ingestion_interval_secs: u64,
    pub ingestion_targets: Vec<IngestionTarget>,
    pub prune_interval_secs: u64,
    pub transfer_sync_interval_secs: u64,
    pub missed_results_interval_secs: u64,
    pub phase_refresh_interval_secs: u64,
    pub pause_check_interval_secs: u64,
    /// Delay before an on-demand sync, giving upstream indexers time to catch up.
    pub sync_delay_ms: u64,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            ingestion_interval_secs: 120,
            ingestion_targets: vec![
                IngestionTarget { era: Era::Mining, blockchain: Blockchain::Base },
                IngestionTarget { era: Era::Mining, blockchain: Blockchain::Pulsechain },
                IngestionTarget { era: Era::Minting, blockchain: Blockchain::Pulsechain },
            ],
            prune_interval_secs: 120,
            transfer_sync_interval_secs: 120,
            missed_results_interval_secs: 120,
            phase_refresh_interval_secs: 6 * 60 * 60,
            pause_check_interval_secs: 120,
            sync_delay_ms: 3_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LeaderboardConfig {
    pub top_n: usize,
}

impl Default for LeaderboardConfig {
    fn default() -> Self {
        Self { top_n: 5 }
    }
}

/// Top level config
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub multipliers: MultiplierConfig,
    pub pricing: PricingConfig,
    pub lottery: LotteryConfig,
    pub phase: PhaseConfig,
    pub jobs: JobsConfig,
    pub leaderboard: LeaderboardConfig,
}

impl Config {
    /// Load the config from disk
    pub async fn load(path: &Path) -> Result<Self> {
        let data = tokio::fs::read_to_string(path)
            .await
            .context(format!("Failed to read config file from {path:?}"))?;
        let config: Self = toml::from_str(&data).context("Failed to parse toml file")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigErr> {
        for (era, phases) in
            [(1, &self.multipliers.era1_phases), (2, &self.multipliers.era2_phases)]
        {
            if phases.phase2_end < phases.phase1_end {
                return Err(ConfigErr::InvalidConfig(format!(
                    "era {era} phase2_end precedes phase1_end"
                )));
            }
        }
        if self.lottery.batch_size == 0 {
            return Err(ConfigErr::InvalidConfig("lottery.batch_size must be positive".into()));
        }
        if self.leaderboard.top_n == 0 {
            return Err(ConfigErr::InvalidConfig("leaderboard.top_n must be positive".into()));
        }
        Ok(())
    }
}

#[derive(Clone, Default, Debug)]
pub struct ConfigLock {
    config: Arc<RwLock<Config>>,
}

impl ConfigLock {
    pub fn new(config: Config) -> Self {
        Self { config: Arc::new(RwLock::new(config)) }
    }

    pub fn lock_all(&self) -> Result<std::sync::RwLockReadGuard<'_, Config>, ConfigErr> {
        self.config.read().map_err(|_| ConfigErr::LockFailed)
    }

    #[cfg(any(test, feature = "test-utils"))]
    pub fn load_write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Config>, ConfigErr> {
        self.config.write().map_err(|_| ConfigErr::LockFailed)
    }
}
