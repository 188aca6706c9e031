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

use std::collections::HashSet;

use crate::types::Contribution;

/// Drops candidates whose transaction hash is already known. Hashes admitted by
/// [DedupGate::admit] become known, so duplicates inside one batch are dropped too.
#[derive(Debug, Default)]
pub struct DedupGate {
    seen: HashSet<String>,
}

impl DedupGate {
    pub fn new(existing: HashSet<String>) -> Self {
        let seen = existing.into_iter().map(|h| h.to_lowercase()).collect();
        Self { seen }
    }

    pub fn is_known(&self, transaction_hash: &str) -> bool {
        self.seen.contains(&transaction_hash.to_lowercase())
    }

    /// Returns the candidates not yet seen, preserving their order.
    pub fn admit(&mut self, candidates: Vec<Contribution>) -> Vec<Contribution> {
        let before = candidates.len();
        let fresh: Vec<_> = candidates
            .into_iter()
            .filter(|c| self.seen.insert(c.transaction_hash.to_lowercase()))
            .collect();
        tracing::debug!("Dedup admitted {} of {before} candidates", fresh.len());
        fresh
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Blockchain, ContributionDetails, MintingDetails};

    fn candidate(hash: &str) -> Contribution {
        Contribution {
            blockchain: Blockchain::Pulsechain,
            wallet_address: None,
            transaction_hash: hash.to_string(),
            timestamp: Some(1),
            details: ContributionDetails::Minting(MintingDetails::default()),
        }
    }

    #[test]
    fn filters_existing_hashes() {
        let mut gate = DedupGate::new(HashSet::from(["0xAA".to_string()]));
        assert!(gate.is_known("0xaa"));

        let fresh = gate.admit(vec![candidate("0xaa"), candidate("0xbb"), candidate("0xcc")]);
        let hashes: Vec<_> = fresh.iter().map(|c| c.transaction_hash.as_str()).collect();
        assert_eq!(hashes, vec!["0xbb", "0xcc"]);
    }

    #[test]
    fn drops_repeats_within_a_batch() {
        let mut gate = DedupGate::default();
        let fresh = gate.admit(vec![candidate("0x01"), candidate("0x01"), candidate("0x02")]);
        assert_eq!(fresh.len(), 2);

        // A second pass over the same batch admits nothing.
        assert!(gate.admit(vec![candidate("0x01"), candidate("0x02")]).is_empty());
    }
}
