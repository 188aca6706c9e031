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

//! Journey phase manager reads over JSON-RPC.

use alloy::{
    primitives::{Address, U256},
    providers::{
        fillers::{ChainIdFiller, FillProvider, JoinFill},
        Identity, ProviderBuilder, RootProvider,
    },
    rpc::client::RpcClient,
    sol,
    transports::layers::RetryBackoffLayer,
};
use async_trait::async_trait;
use url::Url;

use super::{SourceError, SubgraphClient};
use crate::{
    phase::{PauseStatus, PhaseSource},
    types::PhaseState,
};

sol! {
    #[sol(rpc)]
    interface IJourneyPhaseManager {
        function currentJourney() external view returns (uint256);
        function currentPhase() external view returns (uint256);
        function getNextJourneyTimestamp() external view returns (uint256);
        function getNextPhaseTimestamp() external view returns (uint256);
        function paused() external view returns (bool);
    }
}

type ProviderType = FillProvider<JoinFill<Identity, ChainIdFiller>, RootProvider>;

fn rpc_err(call: &str) -> impl FnOnce(alloy::contract::Error) -> SourceError + '_ {
    move |err| SourceError::Rpc(format!("{call}: {err}"))
}

fn to_u64(call: &str, value: U256) -> Result<u64, SourceError> {
    u64::try_from(value).map_err(|_| SourceError::Decode(format!("{call} returned {value}")))
}

/// Reads the phase state from the contract and the pause details from the subgraph,
/// which records when the latest pause started.
pub struct ContractPhaseSource {
    provider: ProviderType,
    address: Address,
    subgraph: SubgraphClient,
}

impl ContractPhaseSource {
    pub fn new(rpc_url: Url, address: Address, subgraph: SubgraphClient) -> Result<Self, SourceError> {
        let provider = ProviderBuilder::new()
            .disable_recommended_fillers()
            .filler(ChainIdFiller::default())
            .connect_client(RpcClient::builder().layer(RetryBackoffLayer::new(3, 1000, 200)).http(rpc_url));
        Ok(Self { provider, address, subgraph })
    }
}

#[async_trait]
impl PhaseSource for ContractPhaseSource {
    async fn fetch_phase_state(&self) -> Result<PhaseState, SourceError> {
        let manager = IJourneyPhaseManager::new(self.address, &self.provider);

        let current_journey = manager.currentJourney().call().await.map_err(rpc_err("currentJourney"))?;
        let current_phase = manager.currentPhase().call().await.map_err(rpc_err("currentPhase"))?;
        let next_journey =
            manager.getNextJourneyTimestamp().call().await.map_err(rpc_err("getNextJourneyTimestamp"))?;
        let next_phase =
            manager.getNextPhaseTimestamp().call().await.map_err(rpc_err("getNextPhaseTimestamp"))?;
        let is_journey_paused = manager.paused().call().await.map_err(rpc_err("paused"))?;

        Ok(PhaseState {
            current_journey: to_u64("currentJourney", current_journey)?,
            current_phase: to_u64("currentPhase", current_phase)?,
            next_journey_timestamp: to_u64("getNextJourneyTimestamp", next_journey)?,
            next_phase_timestamp: to_u64("getNextPhaseTimestamp", next_phase)?,
            is_journey_paused,
        })
    }

    async fn fetch_pause_status(&self) -> Result<PauseStatus, SourceError> {
        self.subgraph.pause_status().await
    }
}
