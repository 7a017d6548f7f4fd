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

//! Disjunction and negation nodes
//!
//! [`OrNode`] holds a vector of AND-subroots and reports the earliest
//! match among them, memoizing each branch's last answer so adjacent
//! probe windows do not rescan.
//!
//! [`NotNode`] has to evaluate its subtree per row, which is expensive;
//! it therefore caches the one contiguous range it has already probed
//! (the *known range*) together with the first match inside it, and
//! merges every new probe window into that range along five cases:
//! cover, covered-by, overlap-low, overlap-high and disjoint.

use std::any::Any;

use crate::storage::cluster::ClusterRef;
use crate::storage::table::Table;

use super::super::conditions::Tri;
use super::super::describe::DescribeCx;
use super::super::planner::{boot, NodeStats};
use super::{AndNode, NodeBox, QueryNode};

/// Last answer of one OR branch
#[derive(Debug, Clone, Copy, Default)]
struct BranchMemo {
    start: usize,
    end: usize,
    result: Option<usize>,
    valid: bool,
}

/// Disjunction over AND-subroots
#[derive(Debug, Clone)]
pub struct OrNode {
    stats: NodeStats,
    conditions: Vec<AndNode>,
    memo: Vec<BranchMemo>,
}

impl OrNode {
    /// The reparented group root becomes the first branch
    pub fn new(first: Option<NodeBox>) -> Self {
        OrNode {
            stats: NodeStats::new(boot::DT_SCAN),
            conditions: first.into_iter().map(AndNode::single).collect(),
            memo: Vec::new(),
        }
    }

    /// Open a new branch
    pub fn add_branch(&mut self, node: NodeBox) {
        self.conditions.push(AndNode::single(node));
    }

    /// The branch currently receiving conditions
    pub fn last_branch_mut(&mut self) -> Option<&mut AndNode> {
        self.conditions.last_mut()
    }

    pub fn branches(&self) -> &[AndNode] {
        &self.conditions
    }
}

impl QueryNode for OrNode {
    fn stats(&self) -> &NodeStats {
        &self.stats
    }

    fn stats_mut(&mut self) -> &mut NodeStats {
        &mut self.stats
    }

    fn init(&mut self, table: &Table) {
        self.stats.reset();
        for branch in &mut self.conditions {
            branch.init(table);
        }
        self.memo = vec![BranchMemo::default(); self.conditions.len()];
    }

    fn set_cluster(&mut self, cluster: &ClusterRef) {
        for branch in &mut self.conditions {
            branch.set_cluster(cluster);
        }
        // Row indices are cluster-relative; stale answers are useless
        self.memo = vec![BranchMemo::default(); self.conditions.len()];
    }

    fn find_first_local(&mut self, start: usize, end: usize) -> Option<usize> {
        if self.memo.len() != self.conditions.len() {
            self.memo = vec![BranchMemo::default(); self.conditions.len()];
        }
        let mut best: Option<usize> = None;
        for idx in 0..self.conditions.len() {
            let memo = self.memo[idx];
            // A memoized answer covers this probe when its window began
            // at or before `start` and its result still lies ahead
            let reusable = memo.valid
                && memo.start <= start
                && match memo.result {
                    Some(m) => m >= start,
                    None => memo.end >= end,
                };
            let candidate = if reusable {
                memo.result.filter(|&m| m < end)
            } else {
                let result = self.conditions[idx].find_first(start, end);
                self.memo[idx] = BranchMemo {
                    start,
                    end,
                    result,
                    valid: true,
                };
                result
            };
            if let Some(m) = candidate {
                best = Some(best.map_or(m, |b| b.min(m)));
                if m == start {
                    break;
                }
            }
        }
        best
    }

    fn evaluate_at(&mut self, row: usize) -> Tri {
        let mut result = Tri::NoMatch;
        for branch in &mut self.conditions {
            match branch.evaluate_at(row) {
                Tri::Match => return Tri::Match,
                Tri::Unknown => result = Tri::Unknown,
                Tri::NoMatch => {}
            }
        }
        result
    }

    fn describe(&self, cx: &DescribeCx) -> String {
        let branches: Vec<String> = self.conditions.iter().map(|b| b.describe(cx)).collect();
        format!("({})", branches.join(" or "))
    }

    fn validate(&self) -> Option<String> {
        if self.conditions.is_empty() {
            return Some("missing left-hand side of OR".to_string());
        }
        if self.conditions.iter().any(|b| b.is_empty()) {
            return Some("missing argument of OR".to_string());
        }
        self.conditions.iter().find_map(|b| b.validate())
    }

    fn clone_node(&self) -> NodeBox {
        Box::new(self.clone())
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Negation of an AND-subroot
#[derive(Debug, Clone)]
pub struct NotNode {
    stats: NodeStats,
    condition: AndNode,
    known_start: usize,
    known_end: usize,
    first_in_known: Option<usize>,
}

impl NotNode {
    pub fn new(condition: NodeBox) -> Self {
        NotNode {
            stats: NodeStats::new(boot::DT_NOT),
            condition: AndNode::single(condition),
            known_start: 0,
            known_end: 0,
            first_in_known: None,
        }
    }

    fn reset_known(&mut self) {
        self.known_start = 0;
        self.known_end = 0;
        self.first_in_known = None;
    }

    fn update_known(&mut self, start: usize, end: usize, first: Option<usize>) {
        self.known_start = start;
        self.known_end = end;
        self.first_in_known = first;
    }

    /// Negation matches a row only when the condition definitely does
    /// not: an unknown (null-valued) condition stays unknown
    fn negation_matches(&mut self, row: usize) -> bool {
        self.condition.evaluate_at(row) == Tri::NoMatch
    }

    fn find_first_loop(&mut self, start: usize, end: usize) -> Option<usize> {
        (start..end).find(|&row| self.negation_matches(row))
    }

    // CASE: start-end covers the known range
    // [    ######    ]
    fn find_first_covers_known(&mut self, start: usize, end: usize) -> Option<usize> {
        debug_assert!(start <= self.known_start && end >= self.known_end);
        if let Some(result) = self.find_first_loop(start, self.known_start) {
            self.update_known(start, self.known_end, Some(result));
            return Some(result);
        }
        if let Some(first) = self.first_in_known {
            self.update_known(start, self.known_end, Some(first));
            return Some(first);
        }
        let result = self.find_first_loop(self.known_end, end);
        self.update_known(start, end, result);
        result
    }

    // CASE: the known range covers start-end
    // ###[#####]###
    fn find_first_covered_by_known(&mut self, start: usize, end: usize) -> Option<usize> {
        debug_assert!(start >= self.known_start && end <= self.known_end);
        if let Some(first) = self.first_in_known {
            if first >= end {
                return None;
            }
            if first >= start {
                return Some(first);
            }
        }
        // The first known match is before start, so the cache cannot
        // answer for this window
        self.find_first_loop(start, end)
    }

    // CASE: partial overlap, lower end
    // [   ###]#####
    fn find_first_overlap_lower(&mut self, start: usize, end: usize) -> Option<usize> {
        debug_assert!(start < self.known_start && end >= self.known_start && end <= self.known_end);
        let result = self
            .find_first_loop(start, self.known_start)
            .or(self.first_in_known);
        self.update_known(start, self.known_end, result);
        result.filter(|&r| r < end)
    }

    // CASE: partial overlap, upper end
    // ####[###    ]
    fn find_first_overlap_upper(&mut self, start: usize, end: usize) -> Option<usize> {
        debug_assert!(start <= self.known_end && start >= self.known_start && end > self.known_end);
        match self.first_in_known {
            Some(first) if first >= start => {
                self.update_known(self.known_start, end, Some(first));
                Some(first)
            }
            Some(first) => {
                let result = self.find_first_loop(start, end);
                self.update_known(self.known_start, end, Some(first));
                result
            }
            None => {
                let result = self.find_first_loop(self.known_end, end);
                self.update_known(self.known_start, end, result);
                result
            }
        }
    }

    // CASE: no overlap
    // ### [    ]   or    [    ] ####
    // A larger probe window replaces the cached range outright
    fn find_first_no_overlap(&mut self, start: usize, end: usize) -> Option<usize> {
        debug_assert!(end < self.known_start || start > self.known_end);
        let result = self.find_first_loop(start, end);
        if end - start > self.known_end - self.known_start {
            self.update_known(start, end, result);
        }
        result
    }

    #[cfg(test)]
    pub(crate) fn seed_known(&mut self, start: usize, end: usize, first: Option<usize>) {
        self.update_known(start, end, first);
    }

    #[cfg(test)]
    pub(crate) fn known(&self) -> (usize, usize, Option<usize>) {
        (self.known_start, self.known_end, self.first_in_known)
    }
}

impl QueryNode for NotNode {
    fn stats(&self) -> &NodeStats {
        &self.stats
    }

    fn stats_mut(&mut self) -> &mut NodeStats {
        &mut self.stats
    }

    fn init(&mut self, table: &Table) {
        self.stats.reset();
        self.condition.init(table);
        self.reset_known();
    }

    fn set_cluster(&mut self, cluster: &ClusterRef) {
        self.condition.set_cluster(cluster);
        // The cache is in cluster-relative rows
        self.reset_known();
    }

    fn find_first_local(&mut self, start: usize, end: usize) -> Option<usize> {
        if start <= self.known_start && end >= self.known_end {
            self.find_first_covers_known(start, end)
        } else if start >= self.known_start && end <= self.known_end {
            self.find_first_covered_by_known(start, end)
        } else if start < self.known_start && end >= self.known_start {
            self.find_first_overlap_lower(start, end)
        } else if start <= self.known_end && end > self.known_end {
            self.find_first_overlap_upper(start, end)
        } else {
            self.find_first_no_overlap(start, end)
        }
    }

    fn evaluate_at(&mut self, row: usize) -> Tri {
        self.condition.evaluate_at(row).negate()
    }

    fn describe(&self, cx: &DescribeCx) -> String {
        format!("!({})", self.condition.describe(cx))
    }

    fn validate(&self) -> Option<String> {
        if self.condition.is_empty() {
            return Some("missing argument of NOT".to_string());
        }
        self.condition.validate()
    }

    fn clone_node(&self) -> NodeBox {
        Box::new(self.clone())
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{CmpOp, ColKey, ColumnAttrs, DataType, ObjKey, Value};
    use crate::query::nodes::scalar::IntegerNode;
    use crate::storage::cluster::ClusterTree;

    // Rows 0..10 with value = row; the negated condition is v < 4, so
    // the negation matches rows 4..10
    fn not_node() -> NotNode {
        let col = ColKey::new(0, DataType::Int, ColumnAttrs::none());
        let mut tree = ClusterTree::default();
        for i in 0..10i64 {
            tree.append(ObjKey(i), vec![Value::Int(i)], &[col]);
        }
        let mut cluster = None;
        tree.traverse(|c| {
            cluster = Some(c.clone());
            true
        });
        let mut node = NotNode::new(Box::new(IntegerNode::new(col, CmpOp::Less, Some(4))));
        node.set_cluster(&cluster.unwrap());
        node
    }

    #[test]
    fn cold_cache_covers_case() {
        let mut node = not_node();
        assert_eq!(node.find_first_local(0, 10), Some(4));
        assert_eq!(node.known(), (0, 10, Some(4)));
    }

    #[test]
    fn covers_known_uses_cached_first() {
        let mut node = not_node();
        node.seed_known(4, 8, Some(6));
        // Nothing matches in [2, 4); the cached first match answers
        assert_eq!(node.find_first_local(2, 9), Some(6));
        assert_eq!(node.known(), (2, 8, Some(6)));
    }

    #[test]
    fn covers_known_extends_past_empty_cache() {
        let mut node = not_node();
        node.seed_known(1, 3, None);
        assert_eq!(node.find_first_local(0, 10), Some(4));
        assert_eq!(node.known(), (0, 10, Some(4)));
    }

    #[test]
    fn covered_by_known_answers_from_cache() {
        let mut node = not_node();
        node.seed_known(0, 10, Some(4));
        assert_eq!(node.find_first_local(5, 9), Some(5));
        assert_eq!(node.find_first_local(2, 4), None);
        // first >= end
        node.seed_known(0, 10, Some(9));
        assert_eq!(node.find_first_local(2, 6), None);
        // cached first sits inside the window
        node.seed_known(0, 10, Some(5));
        assert_eq!(node.find_first_local(4, 8), Some(5));
    }

    #[test]
    fn overlap_lower_merges_downward() {
        let mut node = not_node();
        node.seed_known(6, 9, Some(7));
        assert_eq!(node.find_first_local(3, 7), Some(4));
        assert_eq!(node.known(), (3, 9, Some(4)));
        // No match below the known range: fall back to its first
        let mut node = not_node();
        node.seed_known(2, 9, Some(5));
        assert_eq!(node.find_first_local(0, 4), None, "cached first is past the window");
        assert_eq!(node.known(), (0, 9, Some(5)));
    }

    #[test]
    fn overlap_upper_merges_upward() {
        let mut node = not_node();
        node.seed_known(3, 6, Some(5));
        assert_eq!(node.find_first_local(4, 9), Some(5));
        assert_eq!(node.known(), (3, 9, Some(5)));
        // Known range had no match: scan resumes at its end
        let mut node = not_node();
        node.seed_known(0, 4, None);
        assert_eq!(node.find_first_local(2, 8), Some(4));
        assert_eq!(node.known(), (0, 8, Some(4)));
    }

    #[test]
    fn disjoint_keeps_the_larger_range()  {
        let mut node = not_node();
        node.seed_known(0, 2, None);
        assert_eq!(node.find_first_local(5, 9), Some(5));
        assert_eq!(node.known(), (5, 9, Some(5)));
        // A smaller disjoint probe leaves the cache alone
        let mut node = not_node();
        node.seed_known(4, 9, Some(4));
        assert_eq!(node.find_first_local(0, 2), None);
        assert_eq!(node.known(), (4, 9, Some(4)));
    }
}
