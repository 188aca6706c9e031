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

use async_trait::async_trait;
use reqwest::Client;

use super::SourceError;
use crate::{lottery::LotteryResultFetcher, types::DrawEntry};

/// Downloads published lottery results over HTTP(S).
pub struct HttpResultFetcher {
    client: Client,
}

impl HttpResultFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl LotteryResultFetcher for HttpResultFetcher {
    async fn fetch_result(&self, uri: &str) -> Result<Vec<DrawEntry>, SourceError> {
        let url = url::Url::parse(uri).map_err(|err| SourceError::Decode(format!("result uri {uri}: {err}")))?;
        Ok(self.client.get(url).send().await?.error_for_status()?.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    #[tokio::test]
    async fn downloads_entries() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/results/2-1.json");
            then.status(200).json_body(json!([
                { "tokenId": "4", "journeyId": 2, "lotteryId": 1 },
                { "tokenId": 5, "journeyId": "2", "lotteryId": "1" }
            ]));
        });

        let fetcher = HttpResultFetcher::new(Client::new());
        let entries = fetcher.fetch_result(&server.url("/results/2-1.json")).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1], DrawEntry { token_id: 5, journey_id: 2, lottery_id: 1 });
    }

    #[tokio::test]
    async fn rejects_bad_uris() {
        let fetcher = HttpResultFetcher::new(Client::new());
        let err = fetcher.fetch_result("not a uri").await.unwrap_err();
        assert!(matches!(err, SourceError::Decode(_)));
    }
}
