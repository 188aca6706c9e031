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
    extract::{rejection::JsonRejection, State},
    routing::post,
    Json, Router,
};
use points_indexer::{db::now_secs, pricing::Valuation};

use crate::{
    handler::{wallet_param, ApiError},
    models::PriceRequest,
    state::AppState,
};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/", post(get_token_price))
}

/// POST /v1/prices
/// Current usd price of a token from its largest pool. Falls back to the configured
/// default price, flagged as degraded, when no pool or bar is found.
async fn get_token_price(
    State(state): State<Arc<AppState>>,
    body: Result<Json<PriceRequest>, JsonRejection>,
) -> Result<Json<Valuation>, ApiError> {
    let Json(request) = body?;
    let token = wallet_param(&request.token_address)?;
    Ok(Json(state.ctx.valuation.resolve(Some(token), request.network, now_secs()).await))
}
