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

use alloy::primitives::Address;

use crate::config::LotteryConfig;

/// Lookup policy for the flagged address: it is served a small batch of entries per
/// query, and every token served is never served to it again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecoyPolicy {
    pub address: Address,
    pub limit: usize,
}

impl DecoyPolicy {
    pub fn from_config(config: &LotteryConfig) -> Option<Self> {
        config.decoy_address.map(|address| Self { address, limit: config.decoy_result_limit })
    }

    pub fn applies_to(&self, wallet: &Address) -> bool {
        &self.address == wallet
    }
}
