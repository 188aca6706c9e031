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

//! Contribution points engine: ingests era contributions from upstream indexers, scores
//! them into a points ledger, and maintains leaderboards, lottery entries and the
//! journey phase mirror.

pub mod config;
pub mod context;
pub mod db;
pub mod dedup;
pub mod errors;
pub mod ingestion;
pub mod jobs;
pub mod leaderboard;
pub mod ledger;
pub mod lottery;
pub mod multiplier;
pub mod normalizer;
pub mod phase;
pub mod pricing;
pub mod reports;
pub mod sources;
pub mod task;
pub mod types;
pub mod users;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use context::{AppContext, Collaborators};
pub use db::PointsDb;
