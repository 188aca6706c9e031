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

//! Blockscout client for the era 1 wishwell on PulseChain.

use alloy::primitives::Address;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Map, Value};
use url::Url;

use super::SourceError;
use crate::{
    ingestion::EventSource,
    normalizer::{RawEvent, RawNativeTransfer, RawTokenTransfer},
    types::{format_address, Blockchain, Era},
};

/// Default upper bound on followed pages per fetch. Hitting it fails the fetch so the
/// ingestion cursor never moves past transfers that were not read.
const MAX_PAGES: usize = 10_000;

#[derive(Deserialize)]
struct TokenTransferPage {
    #[serde(default)]
    items: Vec<RawTokenTransfer>,
    #[serde(default)]
    next_page_params: Option<Map<String, Value>>,
}

#[derive(Deserialize)]
struct TxListResponse {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    result: Value,
}

pub struct BlockscoutClient {
    client: Client,
    api_url: Url,
    wishwell: Address,
    max_pages: usize,
}

fn query_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn is_zero(transfer: &RawNativeTransfer) -> bool {
    transfer.value.as_ref().and_then(|v| v.to_f64()).is_none_or(|v| v == 0.0)
}

impl BlockscoutClient {
    pub fn new(client: Client, api_url: Url, wishwell: Address) -> Self {
        Self { client, api_url, wishwell, max_pages: MAX_PAGES }
    }

    pub fn with_max_pages(self, max_pages: usize) -> Self {
        Self { max_pages, ..self }
    }

    /// ERC-20 transfers into the wishwell, newest first. Pages are followed until the
    /// cursor or the end of history is reached.
    pub async fn token_transfers(&self, since: Option<u64>) -> Result<Vec<RawTokenTransfer>, SourceError> {
        let mut url = self.api_url.clone();
        url.set_path(&format!("/api/v2/addresses/{}/token-transfers", format_address(&self.wishwell)));

        let mut transfers = Vec::new();
        let mut next: Option<Map<String, Value>> = None;
        for _ in 0..self.max_pages {
            let mut page_url = url.clone();
            {
                let mut pairs = page_url.query_pairs_mut();
                pairs.append_pair("filter", "to");
                for (key, value) in next.iter().flatten() {
                    pairs.append_pair(key, &query_value(value));
                }
            }

            let page: TokenTransferPage =
                self.client.get(page_url).send().await?.error_for_status()?.json().await?;
            let mut reached_cursor = false;
            for transfer in page.items {
                let timestamp = transfer.timestamp.as_ref().and_then(|t| t.to_unix_seconds());
                match (since, timestamp) {
                    (Some(since), Some(ts)) if ts < since => reached_cursor = true,
                    _ => transfers.push(transfer),
                }
            }
            match page.next_page_params {
                Some(params) if !reached_cursor => next = Some(params),
                _ => return Ok(transfers),
            }
        }
        Err(SourceError::Truncated(format!(
            "token transfers still paging after {} pages",
            self.max_pages
        )))
    }

    /// Native coin transactions sent to the wishwell. Zero value calls are skipped.
    pub async fn native_transfers(&self, since: Option<u64>) -> Result<Vec<RawNativeTransfer>, SourceError> {
        let mut url = self.api_url.clone();
        url.set_path("/api");
        url.query_pairs_mut()
            .append_pair("module", "account")
            .append_pair("action", "txlist")
            .append_pair("address", &format_address(&self.wishwell));

        let response: TxListResponse =
            self.client.get(url).send().await?.error_for_status()?.json().await?;
        let transfers: Vec<RawNativeTransfer> = match response.result {
            Value::Array(_) => serde_json::from_value(response.result)
                .map_err(|err| SourceError::Decode(format!("txlist result: {err}")))?,
            Value::Null => Vec::new(),
            other => {
                return Err(SourceError::Decode(format!(
                    "txlist failed: {} ({other})",
                    response.message.unwrap_or_default()
                )))
            }
        };

        let wishwell = format_address(&self.wishwell);
        Ok(transfers
            .into_iter()
            .filter(|t| !is_zero(t))
            .filter(|t| {
                // txlist also returns transactions sent by the wishwell itself.
                t.from.as_deref().is_none_or(|from| !from.eq_ignore_ascii_case(&wishwell))
            })
            .filter(|t| {
                let timestamp = t.time_stamp.as_ref().and_then(|ts| ts.to_unix_seconds());
                match (since, timestamp) {
                    (Some(since), Some(ts)) => ts >= since,
                    _ => true,
                }
            })
            .collect())
    }
}

#[async_trait]
impl EventSource for BlockscoutClient {
    async fn fetch_events(
        &self,
        blockchain: Blockchain,
        era: Era,
        since: Option<u64>,
    ) -> Result<Vec<RawEvent>, SourceError> {
        if era != Era::Wishwell {
            return Err(SourceError::Unconfigured { era, blockchain });
        }
        let tokens = self.token_transfers(since).await?;
        let natives = self.native_transfers(since).await?;
        Ok(tokens
            .into_iter()
            .map(RawEvent::TokenTransfer)
            .chain(natives.into_iter().map(RawEvent::NativeTransfer))
            .collect())
    }
}
