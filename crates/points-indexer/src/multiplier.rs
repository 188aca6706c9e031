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

//! Phase, journey and reward multipliers.

use serde::Serialize;

use crate::{
    config::{MultiplierConfig, PhaseBoundaries},
    types::{Contribution, ContributionDetails, Era},
};

pub const EARLY_MULTIPLIER: u32 = 33;
pub const MIDDLE_MULTIPLIER: u32 = 22;
pub const LATE_MULTIPLIER: u32 = 11;
/// Applied to mints outside the first three journeys.
pub const FALLBACK_JOURNEY_MULTIPLIER: u32 = 1;

/// Whether a wallet took part in the eras before the one being scored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PriorParticipation {
    pub era1: bool,
    pub era2: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Multipliers {
    pub phase: u32,
    pub reward: f64,
}

/// Time based multiplier for eras 1 and 2. Boundaries are exclusive upper bounds.
pub fn phase_multiplier(timestamp: u64, phases: &PhaseBoundaries) -> u32 {
    if timestamp < phases.phase1_end {
        EARLY_MULTIPLIER
    } else if timestamp < phases.phase2_end {
        MIDDLE_MULTIPLIER
    } else {
        LATE_MULTIPLIER
    }
}

/// Journey based multiplier for era 3.
pub fn journey_multiplier(journey_id: Option<u64>) -> u32 {
    match journey_id {
        Some(1) => EARLY_MULTIPLIER,
        Some(2) => MIDDLE_MULTIPLIER,
        Some(3) => LATE_MULTIPLIER,
        _ => FALLBACK_JOURNEY_MULTIPLIER,
    }
}

pub fn reward_multiplier(era: Era, prior: PriorParticipation, config: &MultiplierConfig) -> f64 {
    match era {
        Era::Wishwell => 1.0,
        Era::Mining if prior.era1 => config.era2_prior_era_bonus,
        Era::Mining => 1.0,
        Era::Minting => match (prior.era1, prior.era2) {
            (true, true) => config.era3_both_eras_bonus,
            (true, false) | (false, true) => config.era3_single_era_bonus,
            (false, false) => 1.0,
        },
    }
}

/// Multipliers for one contribution. None when a phase-scored contribution has no timestamp.
pub fn multipliers_for(
    contribution: &Contribution,
    prior: PriorParticipation,
    config: &MultiplierConfig,
) -> Option<Multipliers> {
    let phase = match &contribution.details {
        ContributionDetails::Wishwell(_) => {
            phase_multiplier(contribution.timestamp?, &config.era1_phases)
        }
        ContributionDetails::Mining(_) => {
            phase_multiplier(contribution.timestamp?, &config.era2_phases)
        }
        ContributionDetails::Minting(d) => journey_multiplier(d.journey_id),
    };
    Some(Multipliers { phase, reward: reward_multiplier(contribution.era(), prior, config) })
}

/// Points for a base value under the given multipliers.
pub fn points_for(base_value: f64, multipliers: Multipliers) -> f64 {
    base_value * multipliers.phase as f64 * multipliers.reward
}
