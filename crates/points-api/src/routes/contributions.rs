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

use alloy::primitives::Address;
use axum::{
    extract::{rejection::JsonRejection, State},
    routing::{get, post},
    Json, Router,
};
use points_indexer::{ingestion::IngestionReport, reports::Era2PointsReportRow};

use crate::{handler::ApiError, models::SyncRequest, state::AppState};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/era-1/contributors", get(get_era1_contributors))
        .route("/era-2/points", get(get_era2_points))
        .route("/sync", post(sync_contributions))
}

/// GET /v1/contributions/era-1/contributors
async fn get_era1_contributors(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Address>>, ApiError> {
    Ok(Json(state.ctx.reports.era1_contributors().await?))
}

/// GET /v1/contributions/era-2/points
async fn get_era2_points(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Era2PointsReportRow>>, ApiError> {
    Ok(Json(state.ctx.reports.era2_points_report().await?))
}

/// POST /v1/contributions/sync
/// Runs one ingestion pass for the era and chain now.
async fn sync_contributions(
    State(state): State<Arc<AppState>>,
    body: Result<Json<SyncRequest>, JsonRejection>,
) -> Result<Json<IngestionReport>, ApiError> {
    let Json(request) = body?;
    tracing::info!("On-demand sync of era {} on {}", request.era, request.blockchain);
    Ok(Json(state.ctx.ingestion.sync(request.era, request.blockchain).await?))
}
