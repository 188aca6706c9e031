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

//! Pool index client (CoinGecko on-chain / GeckoTerminal API).

use alloy::primitives::Address;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use url::Url;

use super::SourceError;
use crate::{
    pricing::{Pool, PriceOracle, PriceSide},
    types::{format_address, Blockchain},
};

#[derive(Deserialize)]
struct PoolAttributes {
    address: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    fdv_usd: Option<String>,
}

#[derive(Deserialize)]
struct PoolData {
    attributes: PoolAttributes,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<PoolData>,
}

#[derive(Deserialize)]
struct OhlcvAttributes {
    /// `[timestamp, open, high, low, close, volume]` bars, newest first.
    #[serde(default)]
    ohlcv_list: Vec<Vec<f64>>,
}

#[derive(Deserialize)]
struct OhlcvData {
    attributes: OhlcvAttributes,
}

#[derive(Deserialize)]
struct OhlcvResponse {
    data: OhlcvData,
}

pub struct GeckoTerminalClient {
    client: Client,
    api_url: Url,
    api_key: Option<(String, String)>,
}

impl GeckoTerminalClient {
    pub fn new(client: Client, api_url: Url) -> Self {
        Self { client, api_url, api_key: None }
    }

    /// Sends `key` in the `header` header on every request.
    pub fn with_api_key(mut self, header: String, key: String) -> Self {
        self.api_key = Some((header, key));
        self
    }

    async fn get<T: for<'de> Deserialize<'de>>(&self, url: Url) -> Result<T, SourceError> {
        let mut request = self.client.get(url);
        if let Some((header, key)) = &self.api_key {
            request = request.header(header.as_str(), key.as_str());
        }
        Ok(request.send().await?.error_for_status()?.json().await?)
    }
}

#[async_trait]
impl PriceOracle for GeckoTerminalClient {
    async fn search_pools(&self, token: Address, network: Blockchain) -> Result<Vec<Pool>, SourceError> {
        let mut url = self.api_url.clone();
        url.set_path("/api/v3/onchain/search/pools");
        url.query_pairs_mut()
            .append_pair("query", &format_address(&token))
            .append_pair("network", network.as_str());

        let response: SearchResponse = self.get(url).await?;
        Ok(response
            .data
            .into_iter()
            .map(|pool| Pool {
                address: pool.attributes.address,
                name: pool.attributes.name,
                fdv_usd: pool.attributes.fdv_usd.and_then(|v| v.parse().ok()),
            })
            .collect())
    }

    async fn pool_price(
        &self,
        pool_address: &str,
        network: Blockchain,
        side: PriceSide,
        as_of: u64,
    ) -> Result<Option<f64>, SourceError> {
        let mut url = self.api_url.clone();
        url.set_path(&format!("/api/v3/onchain/networks/{network}/pools/{pool_address}/ohlcv/minute"));
        let token = match side {
            PriceSide::Token(token) => format_address(&token),
            PriceSide::Quote => "quote".to_string(),
        };
        url.query_pairs_mut()
            .append_pair("before_timestamp", &as_of.to_string())
            .append_pair("token", &token);

        let response: OhlcvResponse = self.get(url).await?;
        Ok(response.data.attributes.ohlcv_list.first().and_then(|bar| bar.get(1)).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::test_token;
    use httpmock::prelude::*;

    fn client(server: &MockServer) -> GeckoTerminalClient {
        GeckoTerminalClient::new(Client::new(), server.base_url().parse().unwrap())
            .with_api_key("x-cg-pro-api-key".into(), "secret".into())
    }

    #[tokio::test]
    async fn searches_pools() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/api/v3/onchain/search/pools")
                .query_param("query", "0x0000000000000000000000000000000000000abc")
                .query_param("network", "pulsechain")
                .header("x-cg-pro-api-key", "secret");
            then.status(200).json_body(serde_json::json!({
                "data": [
                    { "attributes": { "address": "0xp1", "name": "TT / WPLS", "fdv_usd": "1200.5" } },
                    { "attributes": { "address": "0xp2", "name": "TT / A / B", "fdv_usd": null } }
                ]
            }));
        });

        let pools = client(&server).search_pools(test_token(), Blockchain::Pulsechain).await.unwrap();
        mock.assert();
        assert_eq!(pools.len(), 2);
        assert_eq!(pools[0], Pool { address: "0xp1".into(), name: "TT / WPLS".into(), fdv_usd: Some(1200.5) });
        assert_eq!(pools[1].fdv_usd, None);
    }

    #[tokio::test]
    async fn reads_open_of_latest_bar() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/api/v3/onchain/networks/pulsechain/pools/0xp1/ohlcv/minute")
                .query_param("before_timestamp", "1700000000")
                .query_param("token", "quote");
            then.status(200).json_body(serde_json::json!({
                "data": { "attributes": { "ohlcv_list": [[1699999940.0, 0.25, 0.3, 0.2, 0.27, 1000.0]] } }
            }));
        });

        let price = client(&server)
            .pool_price("0xp1", Blockchain::Pulsechain, PriceSide::Quote, 1_700_000_000)
            .await
            .unwrap();
        mock.assert();
        assert_eq!(price, Some(0.25));
    }

    #[tokio::test]
    async fn empty_bars_and_errors() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/api/v3/onchain/networks/base/pools/0xempty/ohlcv/minute");
            then.status(200).json_body(serde_json::json!({ "data": { "attributes": { "ohlcv_list": [] } } }));
        });
        server.mock(|when, then| {
            when.method(GET).path("/api/v3/onchain/networks/base/pools/0xdown/ohlcv/minute");
            then.status(429);
        });

        let client = client(&server);
        let side = PriceSide::Token(test_token());
        assert_eq!(client.pool_price("0xempty", Blockchain::Base, side, 1).await.unwrap(), None);
        assert!(matches!(
            client.pool_price("0xdown", Blockchain::Base, side, 1).await,
            Err(SourceError::Http(_))
        ));
    }
}
