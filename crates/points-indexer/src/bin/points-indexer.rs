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
use points_indexer::{
    config::{Config, ConfigLock},
    jobs::TracingReporter,
    sources::{http_client, SourceArgs},
    AppContext, PointsDb,
};
use tokio_util::sync::CancellationToken;

/// Arguments of the points indexer.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct MainArgs {
    /// DB connection string.
    #[clap(long, env = "DATABASE_URL")]
    db: String,
    /// TOML config file. Defaults apply when omitted.
    #[clap(short, long, env)]
    config_file: Option<PathBuf>,
    /// Whether to log in JSON format.
    #[clap(long, env, default_value_t = false)]
    log_json: bool,
    #[clap(flatten)]
    sources: SourceArgs,
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
    let handles = ctx.spawn_jobs(&cancel_token)?;
    tracing::info!("Points indexer started with {} jobs", handles.len());

    tokio::signal::ctrl_c().await.context("Failed to listen for ctrl-c")?;
    tracing::info!("Shutdown requested, stopping jobs");
    cancel_token.cancel();

    for handle in handles {
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => tracing::error!("Job exited with error: {err:?}"),
            Err(err) => tracing::error!("Job task panicked: {err}"),
        }
    }
    tracing::info!("Points indexer stopped");
    Ok(())
}
