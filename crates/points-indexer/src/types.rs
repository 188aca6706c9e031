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

//! Domain types shared by the ingestion pipeline, the lottery subsystem and the API.

use std::{fmt, str::FromStr};

use alloy::primitives::Address;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TypeError {
    #[error("unknown era: {0}")]
    UnknownEra(u64),

    #[error("unknown blockchain: {0}")]
    UnknownBlockchain(String),

    #[error("invalid wallet address: {0}")]
    InvalidAddress(String),
}

/// A contribution period with its own event shape and scoring rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Era {
    /// Direct token and native-coin transfers to the wishwell contract.
    Wishwell = 1,
    /// Token deposits ("mines") that produce the era's own token.
    Mining = 2,
    /// Fuel cell mints grouped into journeys.
    Minting = 3,
}

impl Era {
    pub const ALL: [Era; 3] = [Era::Wishwell, Era::Mining, Era::Minting];

    pub fn number(self) -> u8 {
        self as u8
    }

    pub fn from_number(value: u64) -> Result<Self, TypeError> {
        match value {
            1 => Ok(Era::Wishwell),
            2 => Ok(Era::Mining),
            3 => Ok(Era::Minting),
            other => Err(TypeError::UnknownEra(other)),
        }
    }
}

impl fmt::Display for Era {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.number())
    }
}

impl Serialize for Era {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.number())
    }
}

impl<'de> Deserialize<'de> for Era {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_u64::deserialize(deserializer)?;
        Era::from_number(value).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Blockchain {
    Ethereum,
    Base,
    Pulsechain,
}

impl Blockchain {
    pub const ALL: [Blockchain; 3] = [Blockchain::Ethereum, Blockchain::Base, Blockchain::Pulsechain];

    /// Lowercase name, also used as the network identifier by the pool index.
    pub fn as_str(&self) -> &'static str {
        match self {
            Blockchain::Ethereum => "ethereum",
            Blockchain::Base => "base",
            Blockchain::Pulsechain => "pulsechain",
        }
    }
}

impl fmt::Display for Blockchain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Blockchain {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ethereum" => Ok(Blockchain::Ethereum),
            "base" => Ok(Blockchain::Base),
            "pulsechain" => Ok(Blockchain::Pulsechain),
            _ => Err(TypeError::UnknownBlockchain(s.to_string())),
        }
    }
}

/// Lowercase `0x` hex rendering used for storage and lookups.
pub fn format_address(address: &Address) -> String {
    format!("{address:#x}")
}

/// Parses a wallet address supplied by a caller, ignoring surrounding whitespace and case.
pub fn parse_wallet(input: &str) -> Result<Address, TypeError> {
    let trimmed = input.trim();
    Address::from_str(&trimmed.to_ascii_lowercase())
        .map_err(|_| TypeError::InvalidAddress(trimmed.to_string()))
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WishwellDetails {
    pub token_address: Option<Address>,
    pub token_name: Option<String>,
    pub token_symbol: Option<String>,
    pub token_amount: Option<f64>,
    pub token_usd_price: Option<f64>,
    pub usd_value: Option<f64>,
    pub pool_address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MiningDetails {
    /// Token that was deposited.
    pub token_address: Option<Address>,
    /// Deposited amount in the token's base units, as reported upstream.
    pub raw_amount: Option<String>,
    /// Amount of the era token produced, in whole tokens.
    pub token_amount: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MintingDetails {
    pub fuel_cells: Option<u64>,
    pub journey_id: Option<u64>,
}

/// Era-specific payload of a contribution. The variant determines the era, so the
/// fields of one era can never be attached to another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "era", content = "details")]
pub enum ContributionDetails {
    Wishwell(WishwellDetails),
    Mining(MiningDetails),
    Minting(MintingDetails),
}

/// A normalized contribution record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contribution {
    pub blockchain: Blockchain,
    pub wallet_address: Option<Address>,
    /// Lowercase transaction hash; with the era it identifies the event.
    pub transaction_hash: String,
    /// Unix seconds.
    pub timestamp: Option<u64>,
    pub details: ContributionDetails,
}

impl Contribution {
    pub fn era(&self) -> Era {
        match self.details {
            ContributionDetails::Wishwell(_) => Era::Wishwell,
            ContributionDetails::Mining(_) => Era::Mining,
            ContributionDetails::Minting(_) => Era::Minting,
        }
    }

    /// The quantity that is multiplied into points: usd value, era token amount or fuel cells.
    pub fn base_value(&self) -> Option<f64> {
        match &self.details {
            ContributionDetails::Wishwell(d) => d.usd_value,
            ContributionDetails::Mining(d) => d.token_amount,
            ContributionDetails::Minting(d) => d.fuel_cells.map(|cells| cells as f64),
        }
    }
}

/// A contribution as read back from storage.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredContribution {
    pub id: String,
    pub era: Era,
    #[serde(flatten)]
    pub contribution: Contribution,
}

/// One ledger line. Admin grants carry no contribution and no phase multiplier.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PointsEntry {
    pub id: String,
    pub era: Era,
    pub wallet_address: Address,
    pub contribution_id: Option<String>,
    pub multiplier: Option<u32>,
    pub reward_multiplier: f64,
    pub points: f64,
    pub is_granted_by_admin: bool,
    pub created_at: u64,
}

/// Ledger line prior to insertion.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPointsEntry {
    pub era: Era,
    pub wallet_address: Address,
    pub contribution_id: Option<String>,
    pub multiplier: Option<u32>,
    pub reward_multiplier: f64,
    pub points: f64,
    pub is_granted_by_admin: bool,
}

/// One token's entry into one draw of a journey.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LotteryEntry {
    pub token_id: u64,
    pub journey_id: u64,
    pub lottery_id: u64,
    pub wallet_address: Option<Address>,
    pub is_pruned: bool,
}

/// Entry as published in a lottery result document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrawEntry {
    #[serde(with = "serde_u64")]
    pub token_id: u64,
    #[serde(with = "serde_u64")]
    pub journey_id: u64,
    #[serde(with = "serde_u64")]
    pub lottery_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LotteryResult {
    pub uri: String,
    pub journey_id: u64,
    pub lottery_id: u64,
}

/// Snapshot of the on-chain journey schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseState {
    pub current_journey: u64,
    pub current_phase: u64,
    pub next_journey_timestamp: u64,
    pub next_phase_timestamp: u64,
    pub is_journey_paused: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserToken {
    pub era: Era,
    pub blockchain: Blockchain,
    pub token_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub wallet_address: Address,
    pub token_ids: Vec<UserToken>,
}

impl User {
    pub fn has_token(&self, era: Era, blockchain: Blockchain) -> bool {
        self.token_ids.iter().any(|t| t.era == era && t.blockchain == blockchain)
    }
}

/// Accepts integers given either as JSON numbers or as decimal strings.
pub mod serde_u64 {
    use serde::{de, Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Lenient {
        Int(u64),
        Float(f64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(*value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        match Lenient::deserialize(deserializer)? {
            Lenient::Int(v) => Ok(v),
            Lenient::Float(v) if v >= 0.0 && v.fract() == 0.0 => Ok(v as u64),
            Lenient::Float(v) => Err(de::Error::custom(format!("not an unsigned integer: {v}"))),
            Lenient::Text(s) => s
                .trim()
                .parse::<u64>()
                .map_err(|_| de::Error::custom(format!("not an unsigned integer: {s}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn era_from_number() {
        assert_eq!(Era::from_number(2).unwrap(), Era::Mining);
        assert_eq!(Era::from_number(4), Err(TypeError::UnknownEra(4)));
    }

    #[test]
    fn era_deserializes_from_string_or_number() {
        let era: Era = serde_json::from_str("3").unwrap();
        assert_eq!(era, Era::Minting);
        let era: Era = serde_json::from_str("\"1\"").unwrap();
        assert_eq!(era, Era::Wishwell);
    }

    #[test]
    fn blockchain_parse_is_case_insensitive() {
        assert_eq!("PulseChain".parse::<Blockchain>().unwrap(), Blockchain::Pulsechain);
        assert!("solana".parse::<Blockchain>().is_err());
    }

    #[test]
    fn parse_wallet_trims_and_lowercases() {
        let wallet = parse_wallet("  0xAbCdEf0000000000000000000000000000000001 ").unwrap();
        assert_eq!(format_address(&wallet), "0xabcdef0000000000000000000000000000000001");
        assert!(parse_wallet("not-a-wallet").is_err());
    }

    #[test]
    fn details_pin_the_era() {
        let contribution = Contribution {
            blockchain: Blockchain::Base,
            wallet_address: None,
            transaction_hash: "0x01".into(),
            timestamp: Some(1),
            details: ContributionDetails::Minting(MintingDetails {
                fuel_cells: Some(10),
                journey_id: Some(2),
            }),
        };
        assert_eq!(contribution.era(), Era::Minting);
        assert_eq!(contribution.base_value(), Some(10.0));
    }

    #[test]
    fn draw_entry_accepts_string_ids() {
        let entry: DrawEntry =
            serde_json::from_str(r#"{"tokenId":"17","journeyId":2,"lotteryId":"3"}"#).unwrap();
        assert_eq!(entry, DrawEntry { token_id: 17, journey_id: 2, lottery_id: 3 });
    }
}
