// Copyright 2026 Quarry Contributors
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

//! Execution planner
//!
//! Every predicate node maintains two running statistics: `dt`, the
//! average cost per probe (bootstrapped per node family), and `dd`, the
//! average row distance between matches (the inverse of selectivity).
//! `cost = dt + dd`; the node with the lowest cost drives the scan.
//!
//! The statistics are hints, not correctness-critical state: rewriting
//! the order of AND siblings never changes the result set, only how the
//! work is scheduled.

use std::fmt;

/// Per-probe cost bootstraps, in relative units
///
/// An indexed lookup is free, a dense integer scan nearly so; string
/// scans pay for cell decoding, and negation/expressions pay a per-row
/// re-evaluation of a whole subtree.
pub(crate) mod boot {
    /// Search-index driven node
    pub const DT_INDEXED: f64 = 0.0;
    /// Dense scalar leaf scan (int, bool, timestamp)
    pub const DT_INT_SCAN: f64 = 0.25;
    /// Float leaf scan
    pub const DT_FLOAT_SCAN: f64 = 0.5;
    /// String, binary, link, size and generic leaf scans
    pub const DT_SCAN: f64 = 10.0;
    /// Column-against-column comparison
    pub const DT_TWO_COLUMNS: f64 = 25.0;
    /// Negation: each probe re-evaluates the negated subtree
    pub const DT_NOT: f64 = 50.0;
    /// User-supplied row expression
    pub const DT_EXPRESSION: f64 = 50.0;
    /// Initial average row distance between matches
    pub const DD_BOOTSTRAP: f64 = 100.0;
}

/// Mutable per-node planner statistics
///
/// Scoped to one execution and reset by `init`.
#[derive(Debug, Clone)]
pub struct NodeStats {
    /// Average row distance between matches
    pub dd: f64,
    /// Average cost per probe
    pub dt: f64,
    /// Rows probed so far
    pub probes: u64,
    /// Matches produced so far
    pub matches: u64,
    boot_dt: f64,
}

impl NodeStats {
    pub fn new(boot_dt: f64) -> Self {
        NodeStats {
            dd: boot::DD_BOOTSTRAP,
            dt: boot_dt,
            probes: 0,
            matches: 0,
            boot_dt,
        }
    }

    /// Score used by [`find_best_node`]
    pub fn cost(&self) -> f64 {
        self.dt + self.dd
    }

    /// Reset to the bootstrap values
    pub fn reset(&mut self) {
        self.dd = boot::DD_BOOTSTRAP;
        self.dt = self.boot_dt;
        self.probes = 0;
        self.matches = 0;
    }

    /// Override the per-probe cost (index binding, expression init)
    pub fn set_dt(&mut self, dt: f64) {
        self.dt = dt;
    }

    /// Refresh the match-distance estimate after a local batch that
    /// advanced `advanced` rows and produced `matches` matches
    pub fn update_dd(&mut self, advanced: usize, matches: usize) {
        if advanced > 0 {
            self.dd = advanced as f64 / (matches as f64 + 1.1);
        }
    }
}

/// Tuning constants of the interleaved aggregation loop
///
/// `find_locals` bounds how many local matches the driving node
/// produces per batch; `best_dist` bounds the probe window granted to a
/// non-driving sibling (so a slow sibling cannot dominate a batch), and
/// `probe_matches` bounds the matches inside such a window. A sibling
/// with `dt == 0` (index driven) runs to the range end instead.
#[derive(Debug, Clone, Copy)]
pub struct PlannerConfig {
    pub find_locals: usize,
    pub best_dist: usize,
    pub probe_matches: usize,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        PlannerConfig {
            find_locals: 1000,
            best_dist: 4000,
            probe_matches: 4,
        }
    }
}

impl fmt::Display for PlannerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "find_locals={} best_dist={} probe_matches={}",
            self.find_locals, self.best_dist, self.probe_matches
        )
    }
}

/// Stable argmin over node costs: ties keep the earliest child
pub(crate) fn best_index(costs: impl Iterator<Item = f64>) -> usize {
    let mut best = 0;
    let mut best_cost = f64::INFINITY;
    for (idx, cost) in costs.enumerate() {
        if cost < best_cost {
            best_cost = cost;
            best = idx;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn best_index_is_stable_on_ties() {
        assert_eq!(best_index([3.0, 1.0, 1.0, 2.0].into_iter()), 1);
        assert_eq!(best_index([5.0].into_iter()), 0);
        assert_eq!(best_index(std::iter::empty()), 0);
    }

    #[test]
    fn dd_refresh() {
        let mut stats = NodeStats::new(boot::DT_INT_SCAN);
        assert_eq!(stats.cost(), boot::DT_INT_SCAN + boot::DD_BOOTSTRAP);
        stats.update_dd(100, 50);
        assert!(stats.dd < 2.0);
        stats.update_dd(0, 0);
        assert!(stats.dd > 0.0, "empty batches leave the estimate alone");
        stats.reset();
        assert_eq!(stats.cost(), boot::DT_INT_SCAN + boot::DD_BOOTSTRAP);
    }
}
