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

use axum::{
    extract::{
        rejection::{PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use points_indexer::{leaderboard::LeaderboardScope, types::Era};

use crate::{
    handler::{optional_wallet, ApiError},
    models::{LeaderboardPage, LeaderboardsResponse, PaginationParams, WalletQuery},
    state::AppState,
};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(get_leaderboards))
        .route("/all-time", get(get_all_time))
        .route("/eras/:era", get(get_era))
}

fn cached(body: impl IntoResponse) -> Response {
    let mut res = body.into_response();
    res.headers_mut().insert(header::CACHE_CONTROL, HeaderValue::from_static("public, max-age=60"));
    res
}

/// GET /v1/leaderboard
/// Top rows of every leaderboard, plus the neighborhood of `?wallet=` when it ranks below them.
async fn get_leaderboards(
    State(state): State<Arc<AppState>>,
    query: Result<Query<WalletQuery>, QueryRejection>,
) -> Result<Json<LeaderboardsResponse>, ApiError> {
    let Query(query) = query?;
    let wallet = optional_wallet(query.wallet.as_deref())?;
    tracing::debug!("Fetching leaderboards for {wallet:?}");

    let all = state.ctx.leaderboard.all(wallet).await?;
    Ok(Json(all.into()))
}

async fn page(
    state: &AppState,
    scope: LeaderboardScope,
    params: PaginationParams,
) -> Result<Response, ApiError> {
    let params = params.validate();
    let entries =
        state.ctx.leaderboard.page(scope, params.offset as usize, params.limit as usize).await?;
    Ok(cached(Json(LeaderboardPage::new(entries, params.offset, params.limit))))
}

/// GET /v1/leaderboard/all-time
async fn get_all_time(
    State(state): State<Arc<AppState>>,
    params: Result<Query<PaginationParams>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(params) = params?;
    page(&state, LeaderboardScope::AllTime, params).await
}

/// GET /v1/leaderboard/eras/:era
async fn get_era(
    State(state): State<Arc<AppState>>,
    era: Result<Path<Era>, PathRejection>,
    params: Result<Query<PaginationParams>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Path(era) = era?;
    let Query(params) = params?;
    page(&state, LeaderboardScope::Era(era), params).await
}
