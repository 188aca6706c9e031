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

//! Raw upstream event shapes and their normalization into [Contribution]s.

use std::str::FromStr;

use alloy::primitives::Address;
use chrono::DateTime;
use serde::Deserialize;

use crate::types::{
    Blockchain, Contribution, ContributionDetails, Era, MiningDetails, MintingDetails,
    WishwellDetails,
};

/// Decimals of native coins and of the era 2 token.
pub const NATIVE_DECIMALS: u32 = 18;

/// A numeric field that upstream sources send either as a JSON number or as a string.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawNumber {
    Int(u64),
    Float(f64),
    Text(String),
}

impl RawNumber {
    pub fn to_f64(&self) -> Option<f64> {
        match self {
            RawNumber::Int(v) => Some(*v as f64),
            RawNumber::Float(v) => Some(*v),
            RawNumber::Text(s) => s.trim().parse::<f64>().ok(),
        }
        .filter(|v| v.is_finite())
    }

    pub fn to_u64(&self) -> Option<u64> {
        match self {
            RawNumber::Int(v) => Some(*v),
            RawNumber::Float(v) if *v >= 0.0 && v.is_finite() => Some(v.trunc() as u64),
            RawNumber::Float(_) => None,
            RawNumber::Text(s) => {
                let s = s.trim();
                s.parse::<u64>().ok().or_else(|| RawNumber::Float(s.parse().ok()?).to_u64())
            }
        }
    }

    pub fn to_text(&self) -> String {
        match self {
            RawNumber::Int(v) => v.to_string(),
            RawNumber::Float(v) => v.to_string(),
            RawNumber::Text(s) => s.trim().to_string(),
        }
    }
}

/// Timestamps arrive as unix seconds (number or string) or as RFC 3339 text.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawTimestamp {
    Seconds(u64),
    Float(f64),
    Text(String),
}

impl RawTimestamp {
    pub fn to_unix_seconds(&self) -> Option<u64> {
        match self {
            RawTimestamp::Seconds(v) => Some(*v),
            RawTimestamp::Float(v) if *v >= 0.0 && v.is_finite() => Some(v.trunc() as u64),
            RawTimestamp::Float(_) => None,
            RawTimestamp::Text(s) => {
                let s = s.trim();
                if let Ok(v) = s.parse::<u64>() {
                    return Some(v);
                }
                DateTime::parse_from_rfc3339(s)
                    .ok()
                    .and_then(|dt| u64::try_from(dt.timestamp()).ok())
            }
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawAccount {
    #[serde(default, alias = "address")]
    pub hash: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawToken {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default, alias = "address_hash")]
    pub address: Option<String>,
    #[serde(default)]
    pub decimals: Option<RawNumber>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawTotal {
    #[serde(default)]
    pub value: Option<RawNumber>,
    #[serde(default)]
    pub decimals: Option<RawNumber>,
}

/// ERC-20 transfer into the wishwell contract.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawTokenTransfer {
    #[serde(default)]
    pub from: Option<RawAccount>,
    #[serde(default, alias = "transaction_hash")]
    pub tx_hash: Option<String>,
    #[serde(default)]
    pub timestamp: Option<RawTimestamp>,
    #[serde(default)]
    pub token: Option<RawToken>,
    #[serde(default)]
    pub total: Option<RawTotal>,
}

/// Native coin transfer into the wishwell contract.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawNativeTransfer {
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub hash: Option<String>,
    #[serde(default, rename = "timeStamp")]
    pub time_stamp: Option<RawTimestamp>,
    #[serde(default)]
    pub value: Option<RawNumber>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawUser {
    #[serde(default)]
    pub address: Option<String>,
}

/// Era 2 deposit.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMine {
    /// Era token produced, in base units.
    #[serde(default)]
    pub amount: Option<RawNumber>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub token_invested: Option<RawNumber>,
    #[serde(default)]
    pub user: Option<RawUser>,
    #[serde(default)]
    pub timestamp: Option<RawTimestamp>,
    #[serde(default)]
    pub transaction_hash: Option<String>,
}

/// Era 3 fuel cell mint.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMint {
    #[serde(default)]
    pub amount: Option<RawNumber>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub timestamp: Option<RawTimestamp>,
    #[serde(default)]
    pub transaction_hash: Option<String>,
    #[serde(default)]
    pub journey_id: Option<RawNumber>,
    #[serde(default)]
    pub user: Option<RawUser>,
}

#[derive(Debug, Clone)]
pub enum RawEvent {
    TokenTransfer(RawTokenTransfer),
    NativeTransfer(RawNativeTransfer),
    Mine(RawMine),
    Mint(RawMint),
}

impl RawEvent {
    pub fn era(&self) -> Era {
        match self {
            RawEvent::TokenTransfer(_) | RawEvent::NativeTransfer(_) => Era::Wishwell,
            RawEvent::Mine(_) => Era::Mining,
            RawEvent::Mint(_) => Era::Minting,
        }
    }

    pub fn transaction_hash(&self) -> Option<&str> {
        match self {
            RawEvent::TokenTransfer(e) => e.tx_hash.as_deref(),
            RawEvent::NativeTransfer(e) => e.hash.as_deref(),
            RawEvent::Mine(e) => e.transaction_hash.as_deref(),
            RawEvent::Mint(e) => e.transaction_hash.as_deref(),
        }
    }

    pub fn timestamp(&self) -> Option<u64> {
        match self {
            RawEvent::TokenTransfer(e) => e.timestamp.as_ref(),
            RawEvent::NativeTransfer(e) => e.time_stamp.as_ref(),
            RawEvent::Mine(e) => e.timestamp.as_ref(),
            RawEvent::Mint(e) => e.timestamp.as_ref(),
        }
        .and_then(RawTimestamp::to_unix_seconds)
    }
}

/// Chain specific facts the normalizer needs for native coin transfers.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeToken {
    /// Wrapped form of the native coin, used to price it.
    pub wrapped: Option<Address>,
}

pub fn native_symbol(blockchain: Blockchain) -> &'static str {
    match blockchain {
        Blockchain::Ethereum | Blockchain::Base => "ETH",
        Blockchain::Pulsechain => "PLS",
    }
}

fn parse_address(raw: Option<&str>) -> Option<Address> {
    let raw = raw?.trim();
    match Address::from_str(raw) {
        Ok(address) => Some(address),
        Err(_) => {
            tracing::warn!("Ignoring malformed address {raw:?}");
            None
        }
    }
}

/// Scales a base unit amount down by `decimals`.
pub fn scale_amount(raw: &RawNumber, decimals: u32) -> Option<f64> {
    raw.to_f64().map(|v| v / 10f64.powi(decimals as i32))
}

/// Converts raw events of one era and chain into contributions. Events of another era and
/// events without a transaction hash are dropped with a warning; missing optional fields
/// become `None`.
pub fn normalize(
    era: Era,
    blockchain: Blockchain,
    events: Vec<RawEvent>,
    native: NativeToken,
) -> Vec<Contribution> {
    let mut contributions = Vec::with_capacity(events.len());
    for event in events {
        if event.era() != era {
            tracing::warn!("Dropping era {} event fetched for era {era}", event.era());
            continue;
        }
        let Some(hash) = event.transaction_hash().map(|h| h.trim().to_lowercase()) else {
            tracing::warn!("Dropping era {era} event on {blockchain} without a transaction hash");
            continue;
        };
        if hash.is_empty() {
            tracing::warn!("Dropping era {era} event on {blockchain} with an empty transaction hash");
            continue;
        }
        let timestamp = event.timestamp();

        let (wallet_address, details) = match event {
            RawEvent::TokenTransfer(e) => normalize_token_transfer(e),
            RawEvent::NativeTransfer(e) => normalize_native_transfer(e, blockchain, native),
            RawEvent::Mine(e) => normalize_mine(e),
            RawEvent::Mint(e) => normalize_mint(e),
        };

        contributions.push(Contribution {
            blockchain,
            wallet_address,
            transaction_hash: hash,
            timestamp,
            details,
        });
    }
    contributions
}

fn normalize_token_transfer(e: RawTokenTransfer) -> (Option<Address>, ContributionDetails) {
    let wallet = parse_address(e.from.as_ref().and_then(|f| f.hash.as_deref()));
    let token = e.token.unwrap_or_default();
    let total = e.total.unwrap_or_default();
    let decimals = total
        .decimals
        .as_ref()
        .or(token.decimals.as_ref())
        .and_then(RawNumber::to_u64)
        .unwrap_or(NATIVE_DECIMALS as u64) as u32;
    let token_amount = total.value.as_ref().and_then(|v| scale_amount(v, decimals));

    let details = WishwellDetails {
        token_address: parse_address(token.address.as_deref()),
        token_name: token.name,
        token_symbol: token.symbol,
        token_amount,
        ..Default::default()
    };
    (wallet, ContributionDetails::Wishwell(details))
}

fn normalize_native_transfer(
    e: RawNativeTransfer,
    blockchain: Blockchain,
    native: NativeToken,
) -> (Option<Address>, ContributionDetails) {
    let symbol = native_symbol(blockchain);
    let details = WishwellDetails {
        token_address: native.wrapped,
        token_name: Some(symbol.to_string()),
        token_symbol: Some(symbol.to_string()),
        token_amount: e.value.as_ref().and_then(|v| scale_amount(v, NATIVE_DECIMALS)),
        ..Default::default()
    };
    (parse_address(e.from.as_deref()), ContributionDetails::Wishwell(details))
}

fn normalize_mine(e: RawMine) -> (Option<Address>, ContributionDetails) {
    let details = MiningDetails {
        token_address: parse_address(e.token.as_deref()),
        raw_amount: e.token_invested.as_ref().map(RawNumber::to_text),
        token_amount: e.amount.as_ref().and_then(|v| scale_amount(v, NATIVE_DECIMALS)),
    };
    (parse_address(e.user.as_ref().and_then(|u| u.address.as_deref())), ContributionDetails::Mining(details))
}

fn normalize_mint(e: RawMint) -> (Option<Address>, ContributionDetails) {
    let details = MintingDetails {
        fuel_cells: e.amount.as_ref().and_then(RawNumber::to_u64),
        journey_id: e.journey_id.as_ref().and_then(RawNumber::to_u64),
    };
    (parse_address(e.user.as_ref().and_then(|u| u.address.as_deref())), ContributionDetails::Minting(details))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    fn mine_json() -> RawMine {
        serde_json::from_str(
            r#"{
                "amount": "10000000000000000000",
                "token": "0x0000000000000000000000000000000000000abc",
                "tokenInvested": "42000",
                "user": { "address": "0x00000000000000000000000000000000000000AA" },
                "timestamp": "1717961000",
                "transactionHash": "0xDEADBEEF"
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn timestamps() {
        assert_eq!(RawTimestamp::Seconds(5).to_unix_seconds(), Some(5));
        assert_eq!(RawTimestamp::Text("17".into()).to_unix_seconds(), Some(17));
        assert_eq!(
            RawTimestamp::Text("2024-06-09T19:31:25.000000Z".into()).to_unix_seconds(),
            Some(1717961485)
        );
        assert_eq!(RawTimestamp::Text("yesterday".into()).to_unix_seconds(), None);
    }

    #[test]
    fn numbers() {
        assert_eq!(RawNumber::Text("12".into()).to_u64(), Some(12));
        assert_eq!(RawNumber::Text("12.0".into()).to_u64(), Some(12));
        assert_eq!(RawNumber::Float(-1.0).to_u64(), None);
        assert_eq!(scale_amount(&RawNumber::Text("1500000".into()), 6), Some(1.5));
    }

    #[test]
    fn normalizes_mine() {
        let out =
            normalize(Era::Mining, Blockchain::Base, vec![RawEvent::Mine(mine_json())], NativeToken::default());
        assert_eq!(out.len(), 1);
        let c = &out[0];
        assert_eq!(c.era(), Era::Mining);
        assert_eq!(c.transaction_hash, "0xdeadbeef");
        assert_eq!(c.timestamp, Some(1717961000));
        assert_eq!(
            c.wallet_address,
            Some(Address::from_str("0x00000000000000000000000000000000000000aa").unwrap())
        );
        let ContributionDetails::Mining(d) = &c.details else { panic!("wrong era") };
        assert_eq!(d.token_amount, Some(10.0));
        assert_eq!(d.raw_amount.as_deref(), Some("42000"));
    }

    #[test]
    fn normalizes_token_transfer() {
        let raw: RawTokenTransfer = serde_json::from_str(
            r#"{
                "from": { "hash": "0x00000000000000000000000000000000000000bb" },
                "tx_hash": "0xabc",
                "timestamp": "2024-06-09T19:31:25.000000Z",
                "token": { "name": "Hex", "symbol": "HEX", "address": "0x2b591e99afe9f32eaa6214f7b7629768c40eeb39" },
                "total": { "value": "250000000", "decimals": "8" }
            }"#,
        )
        .unwrap();
        let out = normalize(
            Era::Wishwell,
            Blockchain::Pulsechain,
            vec![RawEvent::TokenTransfer(raw)],
            NativeToken::default(),
        );
        let ContributionDetails::Wishwell(d) = &out[0].details else { panic!("wrong era") };
        assert_eq!(d.token_amount, Some(2.5));
        assert_eq!(d.token_symbol.as_deref(), Some("HEX"));
        assert_eq!(d.usd_value, None);
    }

    #[test]
    fn native_transfer_uses_wrapped_token() {
        let wrapped = Address::from_str("0xa1077a294dde1b09bb078844df40758a5d0f9a27").unwrap();
        let raw: RawNativeTransfer = serde_json::from_str(
            r#"{ "from": "0x00000000000000000000000000000000000000cc", "hash": "0x01", "timeStamp": "100", "value": "2000000000000000000" }"#,
        )
        .unwrap();
        let out = normalize(
            Era::Wishwell,
            Blockchain::Pulsechain,
            vec![RawEvent::NativeTransfer(raw)],
            NativeToken { wrapped: Some(wrapped) },
        );
        let ContributionDetails::Wishwell(d) = &out[0].details else { panic!("wrong era") };
        assert_eq!(d.token_address, Some(wrapped));
        assert_eq!(d.token_symbol.as_deref(), Some("PLS"));
        assert_eq!(d.token_amount, Some(2.0));
        assert_eq!(out[0].timestamp, Some(100));
    }

    #[test]
    #[traced_test]
    fn drops_events_without_hash_or_of_another_era() {
        let mut no_hash = mine_json();
        no_hash.transaction_hash = None;
        let mint = RawMint { transaction_hash: Some("0x02".into()), ..Default::default() };

        let out = normalize(
            Era::Mining,
            Blockchain::Base,
            vec![RawEvent::Mine(no_hash), RawEvent::Mint(mint)],
            NativeToken::default(),
        );
        assert!(out.is_empty());
        assert!(logs_contain("without a transaction hash"));
        assert!(logs_contain("Dropping era 3 event"));
    }

    #[test]
    fn missing_fields_become_none() {
        let mint = RawMint { transaction_hash: Some("0x03".into()), ..Default::default() };
        let out = normalize(Era::Minting, Blockchain::Pulsechain, vec![RawEvent::Mint(mint)], NativeToken::default());
        assert_eq!(out[0].wallet_address, None);
        assert_eq!(out[0].timestamp, None);
        assert_eq!(out[0].base_value(), None);
    }
}
