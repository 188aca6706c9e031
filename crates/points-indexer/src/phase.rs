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

//! Mirror of the on-chain journey schedule.

use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::{
    config::{ConfigErr, ConfigLock},
    db::{now_secs, DbError, StateDbObj},
    errors::CodedError,
    impl_coded_debug,
    sources::SourceError,
    types::PhaseState,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PauseStatus {
    pub is_paused: bool,
    /// Start of the latest pause, in unix seconds.
    pub recent_pause_start: Option<u64>,
}

#[async_trait]
pub trait PhaseSource: Send + Sync {
    async fn fetch_phase_state(&self) -> Result<PhaseState, SourceError>;

    async fn fetch_pause_status(&self) -> Result<PauseStatus, SourceError>;
}

#[derive(Error)]
pub enum PhaseError {
    #[error("Database error: {0}")]
    Db(#[from] DbError),

    #[error("Phase source error: {0}")]
    Source(#[from] SourceError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigErr),
}

impl_coded_debug!(PhaseError);

impl CodedError for PhaseError {
    fn code(&self) -> &str {
        match self {
            PhaseError::Db(_) => "[P-PHS-001]",
            PhaseError::Source(_) => "[P-PHS-002]",
            PhaseError::Config(_) => "[P-PHS-003]",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseView {
    pub current_journey: u64,
    pub current_phase: u64,
    pub is_journey_paused: bool,
    pub next_journey_timestamp: u64,
    /// Only set while minting is open (phase 1).
    pub mint_end_timestamp: Option<u64>,
}

impl From<&PhaseState> for PhaseView {
    fn from(state: &PhaseState) -> Self {
        Self {
            current_journey: state.current_journey,
            current_phase: state.current_phase,
            is_journey_paused: state.is_journey_paused,
            next_journey_timestamp: state.next_journey_timestamp,
            mint_end_timestamp: (state.current_phase == 1).then_some(state.next_phase_timestamp),
        }
    }
}

/// True when the journey is paused and the pause started less than `window_secs` ago.
pub fn pause_needs_refresh(status: &PauseStatus, now: u64, window_secs: u64) -> bool {
    status.is_paused
        && status.recent_pause_start.is_some_and(|start| now.saturating_sub(start) < window_secs)
}

pub struct PhaseTracker {
    source: Arc<dyn PhaseSource>,
    db: StateDbObj,
    config: ConfigLock,
    scheduled: Mutex<HashSet<u64>>,
}

impl PhaseTracker {
    pub fn new(source: Arc<dyn PhaseSource>, db: StateDbObj, config: ConfigLock) -> Self {
        Self { source, db, config, scheduled: Mutex::new(HashSet::new()) }
    }

    /// Pulls the contract state and replaces the stored snapshot.
    pub async fn refresh(&self) -> Result<PhaseState, PhaseError> {
        let state = self.source.fetch_phase_state().await?;
        self.db.upsert_phase_state(&state).await?;
        tracing::info!(
            "Phase state refreshed: journey {} phase {} paused {}",
            state.current_journey,
            state.current_phase,
            state.is_journey_paused
        );
        Ok(state)
    }

    /// Refreshes out of cycle when a pause just began. Returns whether a refresh ran.
    pub async fn check_pause(&self, now: u64) -> Result<bool, PhaseError> {
        let window = self.config.lock_all()?.phase.pause_refresh_window_secs;
        let status = self.source.fetch_pause_status().await?;
        if !pause_needs_refresh(&status, now, window) {
            tracing::debug!("No recent pause: {status:?}");
            return Ok(false);
        }
        tracing::info!("Journey paused at {:?}, refreshing phase state", status.recent_pause_start);
        self.refresh().await?;
        Ok(true)
    }

    pub async fn view(&self) -> Result<Option<PhaseView>, PhaseError> {
        Ok(self.db.get_phase_state().await?.as_ref().map(PhaseView::from))
    }

    /// Schedules a single refresh at the next journey start. Each timestamp is scheduled
    /// at most once. Returns whether a new refresh was scheduled.
    pub fn schedule_transition_refresh(
        self: &Arc<Self>,
        state: &PhaseState,
        now: u64,
        cancel_token: CancellationToken,
    ) -> bool {
        let at = state.next_journey_timestamp;
        if at <= now {
            return false;
        }
        {
            let Ok(mut scheduled) = self.scheduled.lock() else {
                tracing::error!("Transition schedule lock poisoned");
                return false;
            };
            if !scheduled.insert(at) {
                return false;
            }
        }

        tracing::info!("Scheduling phase refresh for journey transition at {at}");
        let tracker = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(at - now)) => {}
                _ = cancel_token.cancelled() => {
                    tracing::debug!("Transition refresh at {at} cancelled");
                    return;
                }
            }
            match tracker.refresh().await {
                Ok(state) => {
                    tracker.schedule_transition_refresh(&state, now_secs(), cancel_token);
                }
                Err(err) => tracing::error!("Transition refresh at {at} failed: {err:?}"),
            }
        });
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::Config,
        db::StateDb,
        test_utils::{FakePhaseSource, TestDb},
    };

    fn state(phase: u64, next_journey_timestamp: u64) -> PhaseState {
        PhaseState {
            current_journey: 2,
            current_phase: phase,
            next_journey_timestamp,
            next_phase_timestamp: 5_000,
            is_journey_paused: false,
        }
    }

    async fn tracker(source: Arc<FakePhaseSource>) -> (TestDb, Arc<PhaseTracker>) {
        let test_db = TestDb::new().await.unwrap();
        let tracker = Arc::new(PhaseTracker::new(
            source,
            test_db.db.clone(),
            ConfigLock::new(Config::default()),
        ));
        (test_db, tracker)
    }

    #[test]
    fn mint_end_only_in_phase_one() {
        assert_eq!(PhaseView::from(&state(1, 9_000)).mint_end_timestamp, Some(5_000));
        assert_eq!(PhaseView::from(&state(2, 9_000)).mint_end_timestamp, None);
    }

    #[test]
    fn pause_window() {
        let paused = |start| PauseStatus { is_paused: true, recent_pause_start: Some(start) };
        assert!(pause_needs_refresh(&paused(1_000), 1_000, 180));
        assert!(pause_needs_refresh(&paused(1_000), 1_179, 180));
        assert!(!pause_needs_refresh(&paused(1_000), 1_180, 180));
        assert!(!pause_needs_refresh(&PauseStatus { is_paused: false, ..paused(1_000) }, 1_001, 180));
        assert!(!pause_needs_refresh(&PauseStatus { is_paused: true, recent_pause_start: None }, 1, 180));
    }

    #[tokio::test]
    async fn refresh_replaces_snapshot() {
        let source = Arc::new(FakePhaseSource::default());
        let (test_db, tracker) = tracker(source.clone()).await;
        assert_eq!(tracker.view().await.unwrap(), None);

        source.set_state(state(1, 9_000));
        tracker.refresh().await.unwrap();
        source.set_state(state(3, 9_500));
        tracker.refresh().await.unwrap();

        assert_eq!(test_db.db.get_phase_state().await.unwrap(), Some(state(3, 9_500)));
        assert_eq!(tracker.view().await.unwrap().unwrap().current_phase, 3);
    }

    #[tokio::test]
    async fn recent_pause_triggers_refresh() {
        let source = Arc::new(FakePhaseSource::default());
        let (_test_db, tracker) = tracker(source.clone()).await;
        source.set_state(state(2, 9_000));

        source.set_pause(PauseStatus { is_paused: true, recent_pause_start: Some(1_000) });
        assert!(tracker.check_pause(1_100).await.unwrap());
        assert!(!tracker.check_pause(2_000).await.unwrap());
        assert_eq!(source.state_fetches(), 1);
    }

    #[tokio::test]
    async fn transition_refresh_fires_once() {
        let source = Arc::new(FakePhaseSource::default());
        let (_test_db, tracker) = tracker(source.clone()).await;
        let next = state(2, now_secs() + 3_600);
        source.set_state(next);

        let cancel = CancellationToken::new();
        let now = next.next_journey_timestamp - 1;
        assert!(tracker.schedule_transition_refresh(&next, now, cancel.clone()));
        assert!(!tracker.schedule_transition_refresh(&next, now, cancel.clone()));
        assert!(!tracker.schedule_transition_refresh(&state(2, 50), 100, cancel.clone()));

        tokio::time::sleep(Duration::from_millis(1_500)).await;
        assert_eq!(source.state_fetches(), 1);
        cancel.cancel();
    }

    #[tokio::test]
    async fn cancelled_transition_never_refreshes() {
        let source = Arc::new(FakePhaseSource::default());
        let (_test_db, tracker) = tracker(source.clone()).await;
        let next = state(2, 10_000);

        let cancel = CancellationToken::new();
        assert!(tracker.schedule_transition_refresh(&next, 9_999, cancel.clone()));
        cancel.cancel();
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        assert_eq!(source.state_fetches(), 0);
    }
}
