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
    extract::{rejection::QueryRejection, Query, State},
    routing::get,
    Json, Router,
};
use serde_json::Value;

use crate::{
    handler::{optional_wallet, ApiError},
    models::WalletQuery,
    state::AppState,
};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/", get(get_phase))
}

/// GET /v1/phase
/// Current journey and phase, `null` until the first refresh. With `?wallet=` the
/// journey multiplier and the wallet's reward multiplier are included.
async fn get_phase(
    State(state): State<Arc<AppState>>,
    query: Result<Query<WalletQuery>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let Query(query) = query?;
    let body = match optional_wallet(query.wallet.as_deref())? {
        Some(wallet) => serde_json::to_value(state.ctx.reports.phase_for_wallet(wallet).await?),
        None => serde_json::to_value(state.ctx.phase.view().await?),
    }
    .map_err(|err| ApiError::Internal(err.into()))?;
    Ok(Json(body))
}
