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

//! Ponder style GraphQL client for the era 2 and era 3 subgraphs.

use std::collections::{HashMap, HashSet};

use alloy::primitives::Address;
use async_trait::async_trait;
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::json;
use url::Url;

use super::SourceError;
use crate::{
    ingestion::EventSource,
    lottery::{LotteryIndex, OwnershipTransfer},
    normalizer::{RawEvent, RawMine, RawMint, RawNumber},
    phase::PauseStatus,
    types::{parse_wallet, serde_u64, Blockchain, Era},
    users::TokenIdSource,
};

/// Largest page the subgraph serves.
const PAGE_LIMIT: usize = 1000;

const MINE_FIELDS: &str = "amount token tokenInvested user { address } timestamp transactionHash";
const MINT_FIELDS: &str = "amount id timestamp transactionHash journeyId user { address }";

#[derive(Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    has_next_page: bool,
    end_cursor: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Page<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
    #[serde(default)]
    page_info: Option<PageInfo>,
}

#[derive(Deserialize)]
struct AddressRef {
    address: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenRef {
    #[serde(with = "serde_u64")]
    token_id: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FuelCellItem {
    #[serde(with = "serde_u64")]
    token_id: u64,
    owner: Option<AddressRef>,
}

#[derive(Deserialize)]
struct UriItem {
    uri: String,
}

#[derive(Deserialize)]
struct TransferItem {
    #[serde(with = "serde_u64")]
    timestamp: u64,
    token: Option<TokenRef>,
    to: Option<AddressRef>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PhaseManagerItem {
    #[serde(default)]
    is_paused: bool,
    #[serde(default)]
    recent_pause_start_time: Option<RawNumber>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MintedToken {
    token_id: RawNumber,
}

#[derive(Deserialize)]
struct UserItem {
    #[serde(default)]
    wishwell: Option<MintedToken>,
    #[serde(default)]
    antigravity: Option<MintedToken>,
}

/// Quotes a value as a GraphQL string literal.
fn literal(value: impl ToString) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

fn literal_list<T: ToString>(values: impl IntoIterator<Item = T>) -> String {
    let quoted: Vec<String> = values.into_iter().map(literal).collect();
    format!("[{}]", quoted.join(", "))
}

fn page_query(field: &str, args: &[String], after: Option<&str>, selection: &str) -> String {
    let mut args = args.to_vec();
    if let Some(cursor) = after {
        args.push(format!("after: {}", literal(cursor)));
    }
    args.push(format!("limit: {PAGE_LIMIT}"));
    format!(
        "query {{ {field}({}) {{ items {{ {selection} }} pageInfo {{ hasNextPage endCursor }} }} }}",
        args.join(", ")
    )
}

#[derive(Clone)]
pub struct SubgraphClient {
    client: Client,
    url: Url,
}

impl SubgraphClient {
    pub fn new(client: Client, url: Url) -> Self {
        Self { client, url }
    }

    async fn query<T: DeserializeOwned>(&self, query: String) -> Result<T, SourceError> {
        tracing::trace!("Subgraph query to {}: {query}", self.url);
        let response: GraphQlResponse<T> = self
            .client
            .post(self.url.clone())
            .json(&json!({ "query": query }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        if !response.errors.is_empty() {
            let messages: Vec<String> = response.errors.into_iter().map(|e| e.message).collect();
            return Err(SourceError::GraphQl(messages.join("; ")));
        }
        response.data.ok_or_else(|| SourceError::Decode("response carries no data".into()))
    }

    /// Follows `pageInfo` cursors until the collection is exhausted.
    async fn collect<T: DeserializeOwned>(
        &self,
        field: &str,
        args: &[String],
        selection: &str,
    ) -> Result<Vec<T>, SourceError> {
        let mut items = Vec::new();
        let mut after: Option<String> = None;
        loop {
            let query = page_query(field, args, after.as_deref(), selection);
            let mut data: HashMap<String, Page<T>> = self.query(query).await?;
            let page = data
                .remove(field)
                .ok_or_else(|| SourceError::Decode(format!("missing `{field}` in response")))?;
            items.extend(page.items);
            match page.page_info {
                Some(PageInfo { has_next_page: true, end_cursor: Some(cursor) }) => after = Some(cursor),
                _ => return Ok(items),
            }
        }
    }

    fn since_filter(since: Option<u64>) -> Vec<String> {
        let mut args = vec![r#"orderBy: "timestamp""#.to_string(), r#"orderDirection: "asc""#.to_string()];
        if let Some(since) = since {
            args.push(format!("where: {{ timestamp_gte: {} }}", literal(since)));
        }
        args
    }

    /// Pause flag of the journey phase manager as indexed by the subgraph.
    pub async fn pause_status(&self) -> Result<PauseStatus, SourceError> {
        let managers: Vec<PhaseManagerItem> =
            self.collect("journeyPhaseManagers", &[], "isPaused recentPauseStartTime").await?;
        Ok(managers
            .into_iter()
            .next()
            .map(|manager| PauseStatus {
                is_paused: manager.is_paused,
                recent_pause_start: manager.recent_pause_start_time.as_ref().and_then(RawNumber::to_u64),
            })
            .unwrap_or_default())
    }
}

#[async_trait]
impl EventSource for SubgraphClient {
    async fn fetch_events(
        &self,
        blockchain: Blockchain,
        era: Era,
        since: Option<u64>,
    ) -> Result<Vec<RawEvent>, SourceError> {
        let args = Self::since_filter(since);
        match era {
            Era::Mining => {
                let mines: Vec<RawMine> = self.collect("mines", &args, MINE_FIELDS).await?;
                Ok(mines.into_iter().map(RawEvent::Mine).collect())
            }
            Era::Minting => {
                let mints: Vec<RawMint> = self.collect("mints", &args, MINT_FIELDS).await?;
                Ok(mints.into_iter().map(RawEvent::Mint).collect())
            }
            Era::Wishwell => Err(SourceError::Unconfigured { era, blockchain }),
        }
    }
}

#[async_trait]
impl LotteryIndex for SubgraphClient {
    async fn is_result_indexed(&self, journey_id: u64, lottery_id: u64) -> Result<bool, SourceError> {
        let args = [format!(
            "where: {{ lotteryId: {}, journeyId: {} }}",
            literal(lottery_id),
            literal(journey_id)
        )];
        let results: Vec<UriItem> = self.collect("lotteryResults", &args, "uri").await?;
        Ok(!results.is_empty())
    }

    async fn resolve_owners(&self, token_ids: &[u64]) -> Result<HashMap<u64, Address>, SourceError> {
        if token_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let args = [format!("where: {{ tokenId_in: {} }}", literal_list(token_ids))];
        let cells: Vec<FuelCellItem> =
            self.collect("fuelCells", &args, "tokenId owner { address }").await?;

        let mut owners = HashMap::with_capacity(cells.len());
        for cell in cells {
            let Some(owner) = cell.owner else { continue };
            match parse_wallet(&owner.address) {
                Ok(wallet) => {
                    owners.insert(cell.token_id, wallet);
                }
                Err(err) => tracing::warn!("Fuel cell {} has an unusable owner: {err}", cell.token_id),
            }
        }
        Ok(owners)
    }

    async fn paid_out_token_ids(&self, token_ids: &[u64]) -> Result<Vec<u64>, SourceError> {
        if token_ids.is_empty() {
            return Ok(Vec::new());
        }
        let args = [format!("where: {{ tokenId_in: {} }}", literal_list(token_ids))];
        let payouts: Vec<TokenRef> = self.collect("payouts", &args, "tokenId").await?;
        let paid: HashSet<u64> = payouts.into_iter().map(|p| p.token_id).collect();
        Ok(paid.into_iter().collect())
    }

    async fn result_uris_excluding(&self, known: &HashSet<String>) -> Result<Vec<String>, SourceError> {
        let args = if known.is_empty() {
            Vec::new()
        } else {
            vec![format!("where: {{ uri_not_in: {} }}", literal_list(known))]
        };
        let results: Vec<UriItem> = self.collect("lotteryResults", &args, "uri").await?;
        Ok(results.into_iter().map(|r| r.uri).collect())
    }

    async fn transfers_since(&self, since: Option<u64>) -> Result<Vec<OwnershipTransfer>, SourceError> {
        let args = Self::since_filter(since);
        let items: Vec<TransferItem> =
            self.collect("transfers", &args, "timestamp token { tokenId } to { address }").await?;

        let mut transfers = Vec::with_capacity(items.len());
        for item in items {
            let (Some(token), Some(to)) = (item.token, item.to) else { continue };
            match parse_wallet(&to.address) {
                Ok(to) => transfers.push(OwnershipTransfer {
                    token_id: token.token_id,
                    to,
                    timestamp: item.timestamp,
                }),
                Err(err) => tracing::warn!("Skipping transfer of token {}: {err}", token.token_id),
            }
        }
        Ok(transfers)
    }
}

/// Looks up the era 1 and era 2 NFT a wallet holds, per chain.
pub struct SubgraphTokenIds {
    by_chain: HashMap<Blockchain, SubgraphClient>,
}

impl SubgraphTokenIds {
    pub fn new(by_chain: HashMap<Blockchain, SubgraphClient>) -> Self {
        Self { by_chain }
    }
}

#[async_trait]
impl TokenIdSource for SubgraphTokenIds {
    async fn token_id(
        &self,
        wallet: Address,
        era: Era,
        blockchain: Blockchain,
    ) -> Result<Option<String>, SourceError> {
        let client = self
            .by_chain
            .get(&blockchain)
            .ok_or(SourceError::Unconfigured { era, blockchain })?;
        // The subgraph keys users by checksummed address.
        let args = [format!("where: {{ address: {} }}", literal(wallet.to_checksum(None)))];
        let users: Vec<UserItem> = client
            .collect("users", &args, "wishwell { tokenId } antigravity { tokenId }")
            .await?;

        let Some(user) = users.into_iter().next() else {
            return Ok(None);
        };
        let token = match era {
            Era::Wishwell => user.wishwell,
            Era::Mining => user.antigravity,
            Era::Minting => None,
        };
        Ok(token.map(|t| t.token_id.to_text()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::wallet;
    use httpmock::prelude::*;
    use serde_json::json;

    fn client(server: &MockServer) -> SubgraphClient {
        SubgraphClient::new(Client::new(), Url::parse(&server.url("/graphql")).unwrap())
    }

    #[tokio::test]
    async fn fetches_mines_since_cursor() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/graphql").body_contains("mines").body_contains("timestamp_gte");
            then.status(200).json_body(json!({
                "data": { "mines": {
                    "items": [{
                        "amount": "5000",
                        "token": "0x0000000000000000000000000000000000000abc",
                        "tokenInvested": "1000",
                        "user": { "address": "0x0000000000000000000000000000000000000001" },
                        "timestamp": "1700000000",
                        "transactionHash": "0xaa"
                    }],
                    "pageInfo": { "hasNextPage": false, "endCursor": null }
                }}
            }));
        });

        let events = client(&server).fetch_events(Blockchain::Base, Era::Mining, Some(1_699_990_000)).await.unwrap();
        mock.assert();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].era(), Era::Mining);
        assert_eq!(events[0].timestamp(), Some(1_700_000_000));
        assert_eq!(events[0].transaction_hash(), Some("0xaa"));
    }

    #[tokio::test]
    async fn graphql_errors_surface() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/graphql");
            then.status(200).json_body(json!({ "data": null, "errors": [{ "message": "bad field" }] }));
        });

        let err = client(&server).transfers_since(None).await.unwrap_err();
        assert!(matches!(err, SourceError::GraphQl(ref msg) if msg == "bad field"));
    }

    #[tokio::test]
    async fn resolves_owners_and_skips_orphans() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/graphql").body_contains("fuelCells");
            then.status(200).json_body(json!({
                "data": { "fuelCells": { "items": [
                    { "tokenId": "7", "owner": { "address": "0x0000000000000000000000000000000000000002" } },
                    { "tokenId": "8", "owner": null }
                ]}}
            }));
        });

        let owners = client(&server).resolve_owners(&[7, 8]).await.unwrap();
        assert_eq!(owners.len(), 1);
        assert_eq!(owners[&7], wallet(2));
    }

    #[tokio::test]
    async fn empty_token_list_skips_the_request() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/graphql");
            then.status(500);
        });

        assert!(client(&server).paid_out_token_ids(&[]).await.unwrap().is_empty());
        mock.assert_hits(0);
    }

    #[tokio::test]
    async fn pause_status_defaults_when_no_manager_is_indexed() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/graphql").body_contains("journeyPhaseManagers");
            then.status(200).json_body(json!({ "data": { "journeyPhaseManagers": { "items": [] } } }));
        });

        let status = client(&server).pause_status().await.unwrap();
        assert_eq!(status, PauseStatus::default());
    }

    #[tokio::test]
    async fn pause_status_reads_the_indexed_manager() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/graphql").body_contains("journeyPhaseManagers");
            then.status(200).json_body(json!({ "data": { "journeyPhaseManagers": { "items": [
                { "isPaused": true, "recentPauseStartTime": "1750000000" }
            ]}}}));
        });

        let status = client(&server).pause_status().await.unwrap();
        assert!(status.is_paused);
        assert_eq!(status.recent_pause_start, Some(1_750_000_000));
    }

    #[tokio::test]
    async fn missing_pause_start_stays_unset() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/graphql").body_contains("journeyPhaseManagers");
            then.status(200).json_body(json!({ "data": { "journeyPhaseManagers": { "items": [
                { "isPaused": true }
            ]}}}));
        });

        let status = client(&server).pause_status().await.unwrap();
        assert!(status.is_paused);
        assert_eq!(status.recent_pause_start, None);
    }

    #[tokio::test]
    async fn token_id_picks_the_era_nft() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/graphql").body_contains("users");
            then.status(200).json_body(json!({
                "data": { "users": { "items": [
                    { "wishwell": { "tokenId": 12 }, "antigravity": { "tokenId": "34" } }
                ]}}
            }));
        });

        let ids = SubgraphTokenIds::new(HashMap::from([(Blockchain::Base, client(&server))]));
        let era1 = ids.token_id(wallet(1), Era::Wishwell, Blockchain::Base).await.unwrap();
        let era2 = ids.token_id(wallet(1), Era::Mining, Blockchain::Base).await.unwrap();
        assert_eq!(era1.as_deref(), Some("12"));
        assert_eq!(era2.as_deref(), Some("34"));

        let err = ids.token_id(wallet(1), Era::Mining, Blockchain::Pulsechain).await.unwrap_err();
        assert!(matches!(err, SourceError::Unconfigured { .. }));
    }
}
