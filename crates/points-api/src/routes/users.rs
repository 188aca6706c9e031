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
use points_indexer::users::UserProfile;

use crate::{
    handler::{wallet_param, ApiError},
    models::UserRequest,
    state::AppState,
};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/", post(check_or_create_user))
}

/// POST /v1/users
/// Registers the wallet if needed, fills in missing NFT token ids and returns its summary.
async fn check_or_create_user(
    State(state): State<Arc<AppState>>,
    body: Result<Json<UserRequest>, JsonRejection>,
) -> Result<Json<UserProfile>, ApiError> {
    let Json(request) = body?;
    let wallet = wallet_param(&request.wallet_address)?;
    Ok(Json(state.ctx.users.check_or_create(wallet).await?))
}
