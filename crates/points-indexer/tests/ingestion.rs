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

use std::sync::Arc;

use httpmock::prelude::*;
use points_indexer::{
    config::{Config, ConfigLock, PhaseBoundaries},
    db::{LedgerDb, StateDb},
    ingestion::{cursor_key, IngestionService},
    normalizer::{
        RawAccount, RawEvent, RawMine, RawMint, RawNativeTransfer, RawNumber, RawTimestamp, RawToken,
        RawTokenTransfer, RawTotal, RawUser,
    },
    pricing::{Pool, ValuationResolver},
    sources::blockscout::BlockscoutClient,
    test_utils::{
        mining_contribution, test_context, wallet, wishwell_contribution, FakePriceOracle, TestDb,
    },
    types::{format_address, Blockchain, ContributionDetails, Era},
};
use serde_json::json;
use tracing_test::traced_test;
use url::Url;

const WPLS: &str = "0x0000000000000000000000000000000000000d01";

fn user(n: u8) -> Option<RawUser> {
    Some(RawUser { address: Some(format_address(&wallet(n))) })
}

fn mint(n: u8, hash: &str, fuel_cells: u64, journey_id: u64) -> RawEvent {
    RawEvent::Mint(RawMint {
        amount: Some(RawNumber::Int(fuel_cells)),
        id: Some(hash.into()),
        timestamp: Some(RawTimestamp::Seconds(1_750_000_000)),
        transaction_hash: Some(hash.into()),
        journey_id: Some(RawNumber::Int(journey_id)),
        user: user(n),
    })
}

fn mine(n: u8, hash: &str, timestamp: u64) -> RawEvent {
    RawEvent::Mine(RawMine {
        amount: Some(RawNumber::Text("1000000000000000000".into())),
        token: Some("0x0000000000000000000000000000000000000abc".into()),
        token_invested: Some(RawNumber::Text("1".into())),
        user: user(n),
        timestamp: Some(RawTimestamp::Seconds(timestamp)),
        transaction_hash: Some(hash.into()),
    })
}

fn token_transfer(n: u8, hash: &str, timestamp: u64, amount: &str) -> RawEvent {
    RawEvent::TokenTransfer(RawTokenTransfer {
        from: Some(RawAccount { hash: Some(format_address(&wallet(n))) }),
        tx_hash: Some(hash.into()),
        timestamp: Some(RawTimestamp::Seconds(timestamp)),
        token: Some(RawToken {
            name: Some("PulseX".into()),
            symbol: Some("PLSX".into()),
            address: Some("0x0000000000000000000000000000000000000abc".into()),
            decimals: None,
        }),
        total: Some(RawTotal {
            value: Some(RawNumber::Text(amount.into())),
            decimals: Some(RawNumber::Int(18)),
        }),
    })
}

fn native_transfer(n: u8, hash: &str, timestamp: u64, value: &str) -> RawEvent {
    RawEvent::NativeTransfer(RawNativeTransfer {
        from: Some(format_address(&wallet(n))),
        hash: Some(hash.into()),
        time_stamp: Some(RawTimestamp::Seconds(timestamp)),
        value: Some(RawNumber::Text(value.into())),
    })
}

#[tokio::test]
#[traced_test]
async fn journey_one_mints_score_with_prior_era_bonus() {
    let test_db = TestDb::new().await.unwrap();
    let (ctx, fakes) = test_context(&test_db, Config::default());

    // wallet 1 took part in both earlier eras, wallet 2 in neither
    test_db.db.insert_contribution(&wishwell_contribution(wallet(1), "0xe1", 100, 50.0)).await.unwrap();
    test_db.db.insert_contribution(&mining_contribution(wallet(1), "0xe2", 200, 3.0)).await.unwrap();

    fakes.events.push(Era::Minting, Blockchain::Pulsechain, mint(1, "0xm1", 10, 1));
    fakes.events.push(Era::Minting, Blockchain::Pulsechain, mint(2, "0xm2", 10, 1));

    let report = ctx.ingestion.run(Era::Minting, Blockchain::Pulsechain).await.unwrap();
    assert_eq!(report.admitted, 2);
    assert_eq!(report.points_entries, 2);

    assert_eq!(ctx.reports.total_points(wallet(1)).await.unwrap(), 1320.0);
    assert_eq!(ctx.reports.total_points(wallet(2)).await.unwrap(), 330.0);
}

#[tokio::test]
#[traced_test]
async fn reingesting_never_double_counts() {
    let test_db = TestDb::new().await.unwrap();
    let (ctx, fakes) = test_context(&test_db, Config::default());

    fakes.events.push(Era::Minting, Blockchain::Pulsechain, mint(1, "0xAB", 2, 2));
    fakes.events.push(Era::Minting, Blockchain::Pulsechain, mint(1, "0xab", 2, 2));

    let first = ctx.ingestion.run(Era::Minting, Blockchain::Pulsechain).await.unwrap();
    assert_eq!(first.admitted, 1);
    let second = ctx.ingestion.run(Era::Minting, Blockchain::Pulsechain).await.unwrap();
    assert_eq!(second.fetched, 2);
    assert_eq!(second.admitted, 0);

    assert_eq!(test_db.db.count_contributions(Era::Minting).await.unwrap(), 1);
    assert_eq!(ctx.reports.total_points(wallet(1)).await.unwrap(), 44.0);
}

#[tokio::test]
#[traced_test]
async fn phase_boundary_belongs_to_the_later_phase() {
    let test_db = TestDb::new().await.unwrap();
    let mut config = Config::default();
    config.multipliers.era2_phases = PhaseBoundaries { phase1_end: 1_000, phase2_end: 2_000 };
    let (ctx, fakes) = test_context(&test_db, config);

    fakes.events.push(Era::Mining, Blockchain::Base, mine(3, "0x01", 999));
    fakes.events.push(Era::Mining, Blockchain::Base, mine(4, "0x02", 1_000));
    fakes.events.push(Era::Mining, Blockchain::Base, mine(5, "0x03", 2_000));

    let report = ctx.ingestion.run(Era::Mining, Blockchain::Base).await.unwrap();
    assert_eq!(report.points_entries, 3);

    assert_eq!(ctx.reports.total_points(wallet(3)).await.unwrap(), 33.0);
    assert_eq!(ctx.reports.total_points(wallet(4)).await.unwrap(), 22.0);
    assert_eq!(ctx.reports.total_points(wallet(5)).await.unwrap(), 11.0);
}

#[tokio::test]
#[traced_test]
async fn era_one_transfers_score_usd_value_by_phase() {
    let test_db = TestDb::new().await.unwrap();
    let mut config = Config::default();
    config.multipliers.era1_phases = PhaseBoundaries { phase1_end: 1_000, phase2_end: 2_000 };
    config.pricing.request_delay_ms = 0;
    config.pricing.wrapped_native.insert(Blockchain::Pulsechain, WPLS.parse().unwrap());
    let (ctx, fakes) = test_context(&test_db, config);

    fakes.prices.set_pools(vec![Pool {
        address: "0xpool".into(),
        name: "PLSX / WPLS".into(),
        fdv_usd: Some(1_000.0),
    }]);
    fakes.prices.set_price("0xpool", Some(2.0));

    fakes.events.push(Era::Wishwell, Blockchain::Pulsechain, token_transfer(6, "0xt1", 999, "5000000000000000000"));
    fakes.events.push(Era::Wishwell, Blockchain::Pulsechain, token_transfer(7, "0xt2", 1_000, "5000000000000000000"));
    fakes.events.push(Era::Wishwell, Blockchain::Pulsechain, native_transfer(8, "0xn1", 2_000, "1500000000000000000"));

    let report = ctx.ingestion.run(Era::Wishwell, Blockchain::Pulsechain).await.unwrap();
    assert_eq!(report.points_entries, 3);

    // 5 tokens at $2 in phase one, the same in phase two, 1.5 native coins at $2 in phase three
    assert_eq!(ctx.reports.total_points(wallet(6)).await.unwrap(), 330.0);
    assert_eq!(ctx.reports.total_points(wallet(7)).await.unwrap(), 220.0);
    assert_eq!(ctx.reports.total_points(wallet(8)).await.unwrap(), 33.0);

    let entries = test_db.db.points_entries_for_wallet(wallet(6)).await.unwrap();
    assert_eq!(entries[0].multiplier, Some(33));
    assert_eq!(entries[0].reward_multiplier, 1.0);

    let stored = test_db.db.get_contribution(Era::Wishwell, "0xn1").await.unwrap().unwrap();
    let ContributionDetails::Wishwell(details) = stored.contribution.details else {
        panic!("expected an era 1 contribution");
    };
    assert_eq!(details.usd_value, Some(3.0));
    assert_eq!(details.pool_address.as_deref(), Some("0xpool"));
}

#[tokio::test]
#[traced_test]
async fn truncated_transfer_history_leaves_the_cursor_alone() {
    let server = MockServer::start();
    let wishwell = "0x00000000000000000000000000000000000000ee";
    server.mock(|when, then| {
        when.method(GET).path(format!("/api/v2/addresses/{wishwell}/token-transfers"));
        then.status(200).json_body(json!({
            "items": [{
                "from": { "hash": format_address(&wallet(1)) },
                "tx_hash": "0x01",
                "timestamp": "2024-01-02T00:00:00Z",
                "total": { "value": "1000000000000000000", "decimals": "18" }
            }],
            "next_page_params": { "block_number": 10, "index": 3 }
        }));
    });

    let test_db = TestDb::new().await.unwrap();
    let mut config = Config::default();
    config.pricing.request_delay_ms = 0;
    let config = ConfigLock::new(config);
    let client = BlockscoutClient::new(
        reqwest::Client::new(),
        Url::parse(&server.base_url()).unwrap(),
        wishwell.parse().unwrap(),
    )
    .with_max_pages(3);
    let valuation = ValuationResolver::new(Arc::new(FakePriceOracle::default()), config.clone());
    let service =
        IngestionService::new(Arc::new(client), test_db.db.clone(), test_db.db.clone(), valuation, config);

    let report = service.run(Era::Wishwell, Blockchain::Pulsechain).await.unwrap();
    assert_eq!(report.admitted, 0);
    assert_eq!(
        test_db.db.get_cursor(&cursor_key(Era::Wishwell, Blockchain::Pulsechain)).await.unwrap(),
        None
    );
    assert_eq!(test_db.db.count_contributions(Era::Wishwell).await.unwrap(), 0);
}
