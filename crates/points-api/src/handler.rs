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
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use points_indexer::{
    ingestion::IngestionError,
    leaderboard::LeaderboardError,
    ledger::LedgerError,
    lottery::LotteryError,
    phase::PhaseError,
    reports::ReportError,
    types::{parse_wallet, TypeError},
    users::UserError,
};
use serde_json::json;
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};

use crate::{routes, state::AppState};

/// Creates the axum application with all routes
pub fn create_app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .nest("/v1", api_v1_routes(state))
        .layer(cors)
        .fallback(not_found)
}

fn api_v1_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/leaderboard", routes::leaderboard::routes())
        .nest("/points", routes::points::routes())
        .nest("/prices", routes::prices::routes())
        .nest("/contributions", routes::contributions::routes())
        .nest("/users", routes::users::routes())
        .nest("/phase", routes::phase::routes())
        .nest("/lottery", routes::lottery::routes())
        .with_state(state)
}

async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": "points-api"
    }))
}

async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": "Not Found",
            "message": "The requested endpoint does not exist"
        })),
    )
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Internal(anyhow::Error),
}

impl ApiError {
    fn internal(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Internal(anyhow::Error::new(err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match &self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "Bad Request"),
            ApiError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "Unauthorized"),
            ApiError::Internal(err) => {
                tracing::error!("Request failed: {err:?}");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
            }
        };
        (status, Json(json!({ "error": error, "message": self.to_string() }))).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<TypeError> for ApiError {
    fn from(err: TypeError) -> Self {
        Self::BadRequest(err.to_string())
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Validation(msg) => Self::BadRequest(msg),
            LedgerError::Unauthorized => Self::Unauthorized(err.to_string()),
            other => Self::internal(other),
        }
    }
}

impl From<ReportError> for ApiError {
    fn from(err: ReportError) -> Self {
        match err {
            ReportError::Validation(msg) => Self::BadRequest(msg),
            other => Self::internal(other),
        }
    }
}

impl From<LotteryError> for ApiError {
    fn from(err: LotteryError) -> Self {
        match err {
            LotteryError::InvalidResult(_) => Self::BadRequest(err.to_string()),
            other => Self::internal(other),
        }
    }
}

impl From<UserError> for ApiError {
    fn from(err: UserError) -> Self {
        match err {
            UserError::Report(err) => err.into(),
            other => Self::internal(other),
        }
    }
}

impl From<LeaderboardError> for ApiError {
    fn from(err: LeaderboardError) -> Self {
        Self::internal(err)
    }
}

impl From<PhaseError> for ApiError {
    fn from(err: PhaseError) -> Self {
        Self::internal(err)
    }
}

impl From<IngestionError> for ApiError {
    fn from(err: IngestionError) -> Self {
        Self::internal(err)
    }
}

/// Parses a wallet path or body field.
pub fn wallet_param(value: &str) -> Result<Address, ApiError> {
    Ok(parse_wallet(value)?)
}

/// Parses an optional `?wallet=` filter. Blank values count as absent.
pub fn optional_wallet(value: Option<&str>) -> Result<Option<Address>, ApiError> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(wallet_param).transpose()
}
