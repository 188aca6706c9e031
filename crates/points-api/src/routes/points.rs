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
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use points_indexer::{
    db::now_secs,
    ledger::AdminGrantRequest,
    reports::{Era2Prediction, WalletSummary},
};
use serde_json::{json, Value};

use crate::{
    handler::{wallet_param, ApiError},
    models::PredictRequest,
    state::AppState,
};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/grant", post(grant_points))
        .route("/predict", post(predict_points))
        .route("/:wallet", get(get_wallet_points))
}

/// GET /v1/points/:wallet
/// Per-era points, total, points per USD and badge.
async fn get_wallet_points(
    State(state): State<Arc<AppState>>,
    wallet: Result<Path<String>, PathRejection>,
) -> Result<Json<WalletSummary>, ApiError> {
    let Path(wallet) = wallet?;
    let wallet = wallet_param(&wallet)?;
    Ok(Json(state.ctx.reports.wallet_summary(wallet).await?))
}

/// POST /v1/points/grant
/// Admin grant, authorized by the shared secret in the body.
async fn grant_points(
    State(state): State<Arc<AppState>>,
    body: Result<Json<AdminGrantRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let Json(request) = body?;
    let id = state.ctx.ingestion.ledger().grant(&request, state.authorizer.as_ref()).await?;
    tracing::info!("Granted {} points to {}", request.points, request.wallet_address.trim());
    Ok((StatusCode::CREATED, Json(json!({ "id": id }))))
}

/// POST /v1/points/predict
/// Era 2 points a deposit of `amount` would earn right now.
async fn predict_points(
    State(state): State<Arc<AppState>>,
    body: Result<Json<PredictRequest>, JsonRejection>,
) -> Result<Json<Era2Prediction>, ApiError> {
    let Json(request) = body?;
    let wallet = wallet_param(&request.wallet_address)?;
    Ok(Json(state.ctx.reports.predict_era2_points(wallet, request.amount, now_secs()).await?))
}
