// Copyright 2025 HEM Sp. z o.o.
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

//! Active source resolution.
//!
//! Sources are ranked tier by tier (playing/buffering, then paused/idle, then on). Inside a tier
//! the configured order decides: the earlier a source is listed, the higher it ranks. Sources
//! that do not exist, report an unrecognized state or sit outside every tier are skipped.

use std::collections::HashSet;

use crate::definitions::{PlayerStatus, PriorityTier};
use crate::source_state::{SourceId, SourceSnapshot};

/// Source picked by the resolver together with the snapshot it was picked from.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveSelection {
    pub source: SourceId,
    pub status: PlayerStatus,
    pub tier: PriorityTier,
    pub snapshot: SourceSnapshot,
}

fn classify(source: &str, lookup: &impl Fn(&str) -> Option<SourceSnapshot>) -> Option<ActiveSelection> {
    let snapshot = lookup(source)?;
    let status = snapshot.status()?;
    let tier = status.tier()?;
    Some(ActiveSelection { source: source.to_string(), status, tier, snapshot })
}

/// Returns the highest ranked active source, or `None` when no source is active.
pub fn resolve<F>(sources: &[SourceId], lookup: F) -> Option<ActiveSelection>
where
    F: Fn(&str) -> Option<SourceSnapshot>,
{
    // Each source is looked up once; tiers are then scanned over the classified list.
    let classified: Vec<ActiveSelection> = sources.iter().filter_map(|s| classify(s, &lookup)).collect();
    PriorityTier::ORDER
        .iter()
        .find_map(|tier| classified.iter().find(|c| c.tier == *tier))
        .cloned()
}

/// Every active source in rank order: tier-major, configured order inside a tier.
///
/// A source listed more than once is ranked at its first position only.
pub fn ranked_candidates<F>(sources: &[SourceId], lookup: F) -> Vec<ActiveSelection>
where
    F: Fn(&str) -> Option<SourceSnapshot>,
{
    let mut seen = HashSet::new();
    let mut classified: Vec<ActiveSelection> = sources
        .iter()
        .filter(|&s| seen.insert(s.as_str()))
        .filter_map(|s| classify(s, &lookup))
        .collect();
    // stable sort keeps configured order inside a tier
    classified.sort_by_key(|c| c.tier);
    classified
}
