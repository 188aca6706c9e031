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

use std::{collections::BTreeMap, sync::Arc};

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use points_indexer::{
    db::EntryFilter,
    lottery::group_by_draw,
    types::{DrawEntry, LotteryEntry},
};
use serde_json::{json, Value};

use crate::{
    handler::{wallet_param, ApiError},
    models::{EntryQuery, LotteryResultRequest, PruneResponse},
    state::AppState,
};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/results", post(submit_result))
        .route("/entries/:wallet", get(get_wallet_entries))
        .route("/entries/:wallet/draw-pool", get(get_draw_pool))
        .route("/prune/:wallet", post(prune_wallet))
        .route("/draws", get(get_draws))
}

impl From<EntryQuery> for EntryFilter {
    fn from(query: EntryQuery) -> Self {
        EntryFilter {
            lottery_id: query.lottery_id,
            journey_id: query.journey_id,
            is_pruned: query.is_pruned,
        }
    }
}

/// POST /v1/lottery/results
/// Accepts a draw result. Ingestion waits for the result to be indexed in the background.
async fn submit_result(
    State(state): State<Arc<AppState>>,
    body: Result<Json<LotteryResultRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let Json(request) = body?;
    let count = request.entries.len();
    state.ctx.lottery.spawn_submission(
        request.uri.clone(),
        request.entries,
        state.cancel_token.child_token(),
    )?;
    tracing::info!("Accepted lottery result {} with {count} entries", request.uri);
    Ok((StatusCode::ACCEPTED, Json(json!({ "status": "accepted", "entries": count }))))
}

/// GET /v1/lottery/entries/:wallet
async fn get_wallet_entries(
    State(state): State<Arc<AppState>>,
    wallet: Result<Path<String>, PathRejection>,
    query: Result<Query<EntryQuery>, QueryRejection>,
) -> Result<Json<Vec<LotteryEntry>>, ApiError> {
    let Path(wallet) = wallet?;
    let Query(query) = query?;
    let wallet = wallet_param(&wallet)?;
    Ok(Json(state.ctx.lottery.entries_for_wallet(wallet, query.into()).await?))
}

/// GET /v1/lottery/entries/:wallet/draw-pool
/// Every entry of the draws the wallet takes part in, keyed `"{journey}_{lottery}"`.
async fn get_draw_pool(
    State(state): State<Arc<AppState>>,
    wallet: Result<Path<String>, PathRejection>,
) -> Result<Json<BTreeMap<String, Vec<DrawEntry>>>, ApiError> {
    let Path(wallet) = wallet?;
    let wallet = wallet_param(&wallet)?;
    Ok(Json(state.ctx.lottery.draw_pool_for_wallet(wallet).await?))
}

/// POST /v1/lottery/prune/:wallet
async fn prune_wallet(
    State(state): State<Arc<AppState>>,
    wallet: Result<Path<String>, PathRejection>,
) -> Result<Json<PruneResponse>, ApiError> {
    let Path(wallet) = wallet?;
    let wallet = wallet_param(&wallet)?;
    Ok(Json(PruneResponse { pruned: state.ctx.lottery.prune_wallet(wallet).await? }))
}

/// GET /v1/lottery/draws
/// Entries matching the filter, grouped by draw.
async fn get_draws(
    State(state): State<Arc<AppState>>,
    query: Result<Query<EntryQuery>, QueryRejection>,
) -> Result<Json<BTreeMap<String, Vec<DrawEntry>>>, ApiError> {
    let Query(query) = query?;
    let entries = state.ctx.lottery.draw_entries(query.into()).await?;
    Ok(Json(group_by_draw(&entries)))
}
