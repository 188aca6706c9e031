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

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::Parser;
use points_api::{create_app, AppState};
use points_indexer::{
    config::{Config, ConfigLock},
    jobs::TracingReporter,
    sources::{http_client, SourceArgs},
    AppContext, PointsDb,
};
use tokio_util::sync::CancellationToken;

/// Arguments of the points API server.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct MainArgs {
    /// Bind address for the REST api
    #[clap(long, env, default_value = "0.0.0.0:8080")]
    bind_addr: String,
    /// DB connection string.
    #[clap(long, env = "DATABASE_URL")]
    db: String,
    /// TOML config file. Defaults apply when omitted.
    #[clap(short, long, env)]
    config_file: Option<PathBuf>,
    /// Shared secret authorizing admin point grants. Grants are refused when unset.
    #[clap(long, env)]
    admin_secret: Option<String>,
    /// Whether to log in JSON format.
    #[clap(long, env, default_value_t = false)]
    log_json: bool,
    #[clap(flatten)]
    sources: SourceArgs,
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!("Failed to install SIGTERM handler: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = MainArgs::parse();

    if args.log_json {
        tracing_subscriber::fmt()
            .with_ansi(false)
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .init();
    }

    let config = match &args.config_file {
        Some(path) => Config::load(path).await?,
        None => Config::default(),
    };

    let db = Arc::new(PointsDb::new(&args.db).await.context("Failed to open the points database")?);
    let client = http_client()?;
    let collaborators = args.sources.collaborators(&client, Arc::new(TracingReporter))?;
    let ctx = AppContext::new(db, ConfigLock::new(config), collaborators);

    let cancel_token = CancellationToken::new();
    let state = Arc::new(AppState::new(ctx, args.admin_secret.clone(), cancel_token.clone()));

    let listener = tokio::net::TcpListener::bind(&args.bind_addr)
        .await
        .context("Failed to bind a TCP listener")?;
    tracing::info!("Points API listening on: {}", args.bind_addr);

    axum::serve(listener, create_app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Points API service failed")?;

    cancel_token.cancel();
    Ok(())
}
