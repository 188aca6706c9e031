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

use points_indexer::{
    ledger::{GrantAuthorizer, SharedSecretAuthorizer},
    AppContext,
};
use tokio_util::sync::CancellationToken;

/// Shared state of every route.
pub struct AppState {
    pub ctx: AppContext,
    pub authorizer: Arc<dyn GrantAuthorizer>,
    /// Cancels background lottery submissions on shutdown.
    pub cancel_token: CancellationToken,
}

impl AppState {
    pub fn new(ctx: AppContext, admin_secret: Option<String>, cancel_token: CancellationToken) -> Self {
        Self { ctx, authorizer: Arc::new(SharedSecretAuthorizer::new(admin_secret)), cancel_token }
    }
}
