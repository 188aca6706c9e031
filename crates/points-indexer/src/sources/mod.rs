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

//! HTTP, GraphQL and RPC clients for the upstream collaborators.

pub mod blockscout;
pub mod contract;
pub mod gecko;
pub mod result_fetcher;
pub mod subgraph;

use std::{collections::HashMap, sync::Arc};

use alloy::primitives::Address;
use async_trait::async_trait;
use thiserror::Error;
use url::Url;

use crate::{
    errors::CodedError,
    context::Collaborators,
    impl_coded_debug,
    ingestion::EventSource,
    jobs::ErrorReporter,
    normalizer::RawEvent,
    types::{Blockchain, Era},
};

pub use blockscout::BlockscoutClient;
pub use contract::ContractPhaseSource;
pub use gecko::GeckoTerminalClient;
pub use result_fetcher::HttpResultFetcher;
pub use subgraph::{SubgraphClient, SubgraphTokenIds};

#[derive(Error)]
pub enum SourceError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("GraphQL query failed: {0}")]
    GraphQl(String),

    #[error("Unexpected response: {0}")]
    Decode(String),

    #[error("RPC call failed: {0}")]
    Rpc(String),

    #[error("No source configured for era {era} on {blockchain}")]
    Unconfigured { era: Era, blockchain: Blockchain },

    #[error("Pagination stopped before the end of history: {0}")]
    Truncated(String),
}

impl_coded_debug!(SourceError);

impl CodedError for SourceError {
    fn code(&self) -> &str {
        match self {
            SourceError::Http(_) => "[P-SRC-001]",
            SourceError::GraphQl(_) => "[P-SRC-002]",
            SourceError::Decode(_) => "[P-SRC-003]",
            SourceError::Rpc(_) => "[P-SRC-004]",
            SourceError::Unconfigured { .. } => "[P-SRC-005]",
            SourceError::Truncated(_) => "[P-SRC-006]",
        }
    }
}

/// Shared HTTP client with a request timeout.
pub fn http_client() -> Result<reqwest::Client, SourceError> {
    Ok(reqwest::Client::builder().timeout(std::time::Duration::from_secs(30)).build()?)
}

/// Routes event fetches to the source registered for the (era, blockchain) pair.
#[derive(Default, Clone)]
pub struct ChainEventSources {
    sources: HashMap<(Era, Blockchain), Arc<dyn EventSource>>,
}

impl ChainEventSources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, era: Era, blockchain: Blockchain, source: Arc<dyn EventSource>) -> Self {
        self.sources.insert((era, blockchain), source);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

#[async_trait]
impl EventSource for ChainEventSources {
    async fn fetch_events(
        &self,
        blockchain: Blockchain,
        era: Era,
        since: Option<u64>,
    ) -> Result<Vec<RawEvent>, SourceError> {
        let source = self
            .sources
            .get(&(era, blockchain))
            .ok_or(SourceError::Unconfigured { era, blockchain })?;
        source.fetch_events(blockchain, era, since).await
    }
}

/// Process level settings for every upstream collaborator, shared by both binaries.
#[derive(clap::Args, Debug, Clone)]
pub struct SourceArgs {
    /// Era 3 (and lottery) subgraph GraphQL endpoint
    #[clap(long, env)]
    pub era3_subgraph_url: Url,

    /// Era 2 subgraph endpoint on Base
    #[clap(long, env)]
    pub era2_base_subgraph_url: Option<Url>,

    /// Era 2 subgraph endpoint on PulseChain
    #[clap(long, env)]
    pub era2_pulsechain_subgraph_url: Option<Url>,

    /// Blockscout instance indexing the era 1 wishwell on PulseChain
    #[clap(long, env)]
    pub era1_blockscout_url: Option<Url>,

    /// Wishwell contract receiving era 1 contributions
    #[clap(long, env)]
    pub era1_wishwell_address: Option<Address>,

    /// Pool index base URL
    #[clap(long, env, default_value = "https://pro-api.coingecko.com")]
    pub gecko_url: Url,

    /// Optional pool index API key
    #[clap(long, env)]
    pub gecko_api_key: Option<String>,

    /// Header carrying the pool index API key
    #[clap(long, env, default_value = "x-cg-pro-api-key")]
    pub gecko_api_key_header: String,

    /// RPC endpoint of the chain holding the journey phase manager
    #[clap(long, env)]
    pub rpc_url: Url,

    /// Journey phase manager contract address
    #[clap(long, env)]
    pub phase_manager_address: Address,
}

impl SourceArgs {
    pub fn event_sources(&self, client: &reqwest::Client) -> ChainEventSources {
        let mut sources = ChainEventSources::new().with(
            Era::Minting,
            Blockchain::Pulsechain,
            Arc::new(SubgraphClient::new(client.clone(), self.era3_subgraph_url.clone())),
        );
        for (chain, url) in [
            (Blockchain::Base, &self.era2_base_subgraph_url),
            (Blockchain::Pulsechain, &self.era2_pulsechain_subgraph_url),
        ] {
            if let Some(url) = url {
                sources = sources.with(
                    Era::Mining,
                    chain,
                    Arc::new(SubgraphClient::new(client.clone(), url.clone())),
                );
            }
        }
        if let (Some(url), Some(wishwell)) = (&self.era1_blockscout_url, self.era1_wishwell_address) {
            sources = sources.with(
                Era::Wishwell,
                Blockchain::Pulsechain,
                Arc::new(BlockscoutClient::new(client.clone(), url.clone(), wishwell)),
            );
        }
        sources
    }

    pub fn token_ids(&self, client: &reqwest::Client) -> SubgraphTokenIds {
        let mut by_chain = HashMap::new();
        if let Some(url) = &self.era2_base_subgraph_url {
            by_chain.insert(Blockchain::Base, SubgraphClient::new(client.clone(), url.clone()));
        }
        if let Some(url) = &self.era2_pulsechain_subgraph_url {
            by_chain.insert(Blockchain::Pulsechain, SubgraphClient::new(client.clone(), url.clone()));
        }
        SubgraphTokenIds::new(by_chain)
    }

    pub fn era3_subgraph(&self, client: &reqwest::Client) -> SubgraphClient {
        SubgraphClient::new(client.clone(), self.era3_subgraph_url.clone())
    }

    pub fn price_oracle(&self, client: &reqwest::Client) -> GeckoTerminalClient {
        let oracle = GeckoTerminalClient::new(client.clone(), self.gecko_url.clone());
        match &self.gecko_api_key {
            Some(key) => oracle.with_api_key(self.gecko_api_key_header.clone(), key.clone()),
            None => oracle,
        }
    }

    pub fn phase_source(&self, client: &reqwest::Client) -> Result<ContractPhaseSource, SourceError> {
        ContractPhaseSource::new(self.rpc_url.clone(), self.phase_manager_address, self.era3_subgraph(client))
    }

    /// Wires every live collaborator the services need.
    pub fn collaborators(
        &self,
        client: &reqwest::Client,
        reporter: Arc<dyn ErrorReporter>,
    ) -> Result<Collaborators, SourceError> {
        Ok(Collaborators {
            events: Arc::new(self.event_sources(client)),
            prices: Arc::new(self.price_oracle(client)),
            phase: Arc::new(self.phase_source(client)?),
            lottery_index: Arc::new(self.era3_subgraph(client)),
            results: Arc::new(HttpResultFetcher::new(client.clone())),
            token_ids: Arc::new(self.token_ids(client)),
            reporter,
        })
    }
}
