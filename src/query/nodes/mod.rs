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

//! Predicate nodes
//!
//! A query compiles into a tree of [`QueryNode`] trait objects. Each
//! node pairs a column reference with a condition and carries the
//! planner statistics that drive node selection. The implicit AND chain
//! of a group is reified as [`AndNode`]; disjunction and negation wrap
//! whole chains ([`logical::OrNode`], [`logical::NotNode`]).
//!
//! Nodes bind the current cluster's leaf on `set_cluster` and stream
//! matches through `find_first_local`. `evaluate_at` is the
//! three-valued point query negation builds on.

pub mod logical;
pub mod relation;
pub mod scalar;
pub mod string;

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::core::ColKey;
use crate::storage::cluster::{ClusterRef, ColumnLeaf};
use crate::storage::table::{Obj, Table};

use super::conditions::Tri;
use super::describe::DescribeCx;
use super::planner::{self, boot, NodeStats};
use super::state::AggregateState;

/// Boxed predicate node
pub type NodeBox = Box<dyn QueryNode>;

/// One unit of the predicate tree
pub trait QueryNode: fmt::Debug + Send {
    fn stats(&self) -> &NodeStats;

    fn stats_mut(&mut self) -> &mut NodeStats;

    /// Reset statistics and bind execution-scoped state (search index
    /// postings, caches). Called once per execution before traversal.
    fn init(&mut self, table: &Table);

    /// Bind the leaf of the cluster about to be scanned; O(1)
    fn set_cluster(&mut self, cluster: &ClusterRef);

    /// Next row in [start, end) where this condition holds
    fn find_first_local(&mut self, start: usize, end: usize) -> Option<usize>;

    /// Three-valued point evaluation at one row
    fn evaluate_at(&mut self, row: usize) -> Tri {
        Tri::from_bool(self.find_first_local(row, row + 1) == Some(row))
    }

    /// Planner score; lower drives the scan
    fn cost(&self) -> f64 {
        self.stats().cost()
    }

    /// Whether this node is backed by a search index this execution
    fn has_search_index(&self) -> bool {
        false
    }

    /// Index fast path: feed matching objects, in key order, through
    /// `f` until it has accepted `limit` of them. Returns the number
    /// accepted. Only meaningful when `has_search_index()`.
    fn index_based_aggregate(
        &mut self,
        _limit: usize,
        _table: &Table,
        _f: &mut dyn FnMut(&Obj) -> bool,
    ) -> usize {
        0
    }

    /// Infix textual form of this condition
    fn describe(&self, cx: &DescribeCx) -> String;

    /// First structural error below this node, if any
    fn validate(&self) -> Option<String> {
        None
    }

    fn clone_node(&self) -> NodeBox;

    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// The column this condition reads, when there is exactly one
    fn condition_col(&self) -> Option<ColKey> {
        None
    }

    /// AND-chain flattening support: a chain container surrenders its
    /// children, any other node stays opaque
    fn take_children(&mut self) -> Option<Vec<NodeBox>> {
        None
    }

    /// Needle-set coalescing: the column of a consumable
    /// case-sensitive string-equal condition
    fn string_equal_col(&self) -> Option<ColKey> {
        None
    }

    /// Surrender this node's equality needle for coalescing
    fn take_equal_needle(&mut self) -> Option<Option<Arc<str>>> {
        None
    }

    /// Absorb another equal condition's needle into this node's set
    fn consume_needle(&mut self, _needle: Option<Arc<str>>) {}
}

impl Clone for NodeBox {
    fn clone(&self) -> Self {
        self.clone_node()
    }
}

/// The AND chain of one group
///
/// Children are siblings under implicit conjunction. The executor
/// drives the cheapest child and verifies its candidates against the
/// rest; `find_first` is the round-robin search used when the chain is
/// evaluated as a single condition (inside OR branches, negations and
/// point matches).
#[derive(Debug, Clone)]
pub struct AndNode {
    stats: NodeStats,
    children: Vec<NodeBox>,
}

impl Default for AndNode {
    fn default() -> Self {
        Self::new()
    }
}

impl AndNode {
    pub fn new() -> Self {
        AndNode {
            stats: NodeStats::new(boot::DT_SCAN),
            children: Vec::new(),
        }
    }

    pub fn single(node: NodeBox) -> Self {
        let mut and = Self::new();
        and.add_child(node);
        and
    }

    /// Append a condition; nested chains flatten into this one
    pub fn add_child(&mut self, mut node: NodeBox) {
        match node.take_children() {
            Some(children) => self.children.extend(children),
            None => self.children.push(node),
        }
    }

    pub fn children(&self) -> &[NodeBox] {
        &self.children
    }

    pub fn children_mut(&mut self) -> &mut [NodeBox] {
        &mut self.children
    }

    /// Detach a child (index fast path runs the driver outside the
    /// chain so the chain can verify its candidates)
    pub(crate) fn remove_child(&mut self, idx: usize) -> NodeBox {
        self.children.remove(idx)
    }

    pub(crate) fn insert_child(&mut self, idx: usize, node: NodeBox) {
        self.children.insert(idx, node);
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    /// Index of the cheapest child, ties keeping child order
    pub fn best_child(&self) -> usize {
        planner::best_index(self.children.iter().map(|c| c.cost()))
    }

    /// First row in [start, end) where every child matches
    ///
    /// Round-robin: each condition advances the candidate row; a row
    /// survives once every condition has confirmed it without moving.
    pub fn find_first(&mut self, mut start: usize, end: usize) -> Option<usize> {
        let sz = self.children.len();
        if sz == 0 {
            return (start < end).then_some(start);
        }
        let mut current = 0;
        let mut to_test = sz;
        while start < end {
            let m = self.children[current].find_first_local(start, end)?;
            if m != start {
                // The candidate advanced: every other condition has to
                // confirm the new row
                to_test = sz;
                start = m;
            }
            to_test -= 1;
            if to_test == 0 {
                return Some(m);
            }
            current += 1;
            if current == sz {
                current = 0;
            }
        }
        None
    }

    /// Run the driving child's tight loop over [start, end)
    ///
    /// Stays inside child `driver` until it has produced `local_limit`
    /// local matches or scanned to `end`. Each candidate is verified
    /// against the remaining siblings with single-row probes and, on
    /// full agreement, delivered to the state. Returns the resume row,
    /// or `None` when the state requested a stop.
    pub fn aggregate_local(
        &mut self,
        driver: usize,
        st: &mut dyn AggregateState,
        start: usize,
        end: usize,
        local_limit: usize,
        source: Option<&ColumnLeaf>,
    ) -> Option<usize> {
        let mut local_matches = 0usize;
        let mut r = start;
        loop {
            if local_matches == local_limit {
                let stats = self.children[driver].stats_mut();
                stats.update_dd(r - start, local_matches);
                stats.probes += (r - start) as u64;
                stats.matches += local_matches as u64;
                return Some(r);
            }

            let Some(m) = self.children[driver].find_first_local(r, end) else {
                let stats = self.children[driver].stats_mut();
                stats.update_dd(end - start, local_matches);
                stats.probes += (end - start) as u64;
                stats.matches += local_matches as u64;
                return Some(end);
            };
            r = m;
            local_matches += 1;

            // Verify the candidate against the remaining conditions,
            // short-circuiting on the first disagreement
            let mut agreed = true;
            for c in 0..self.children.len() {
                if c == driver {
                    continue;
                }
                if self.children[c].find_first_local(r, r + 1) != Some(r) {
                    agreed = false;
                    break;
                }
            }
            if agreed {
                let value = source.map(|leaf| leaf.value_at(r));
                if !st.match_row(r, value) {
                    let stats = self.children[driver].stats_mut();
                    stats.probes += (r + 1 - start) as u64;
                    stats.matches += local_matches as u64;
                    return None;
                }
            }
            r += 1;
        }
    }

    /// Consume adjacent case-sensitive string-equal conditions on the
    /// same unindexed column into the first one's needle set
    ///
    /// With a search index present the per-condition index lookups are
    /// faster than a combined scan, so indexed columns are left alone.
    fn coalesce_equal_strings(&mut self, table: &Table) {
        let mut first_for_col: Vec<(usize, usize)> = Vec::new();
        let mut i = 0;
        while i < self.children.len() {
            let Some(col) = self.children[i].string_equal_col() else {
                i += 1;
                continue;
            };
            if table.has_search_index(col) {
                i += 1;
                continue;
            }
            match first_for_col
                .iter()
                .find(|(leaf, _)| *leaf == col.leaf_index())
            {
                Some(&(_, target)) => {
                    if let Some(needle) = self.children[i].take_equal_needle() {
                        self.children.remove(i);
                        self.children[target].consume_needle(needle);
                        continue;
                    }
                    i += 1;
                }
                None => {
                    first_for_col.push((col.leaf_index(), i));
                    i += 1;
                }
            }
        }
    }
}

impl QueryNode for AndNode {
    fn stats(&self) -> &NodeStats {
        &self.stats
    }

    fn stats_mut(&mut self) -> &mut NodeStats {
        &mut self.stats
    }

    fn init(&mut self, table: &Table) {
        self.stats.reset();
        self.coalesce_equal_strings(table);
        for child in &mut self.children {
            child.init(table);
        }
    }

    fn set_cluster(&mut self, cluster: &ClusterRef) {
        for child in &mut self.children {
            child.set_cluster(cluster);
        }
    }

    fn find_first_local(&mut self, start: usize, end: usize) -> Option<usize> {
        self.find_first(start, end)
    }

    fn evaluate_at(&mut self, row: usize) -> Tri {
        let mut result = Tri::Match;
        for child in &mut self.children {
            match child.evaluate_at(row) {
                Tri::NoMatch => return Tri::NoMatch,
                Tri::Unknown => result = Tri::Unknown,
                Tri::Match => {}
            }
        }
        result
    }

    fn describe(&self, cx: &DescribeCx) -> String {
        self.children
            .iter()
            .map(|c| c.describe(cx))
            .collect::<Vec<_>>()
            .join(" and ")
    }

    fn validate(&self) -> Option<String> {
        self.children.iter().find_map(|c| c.validate())
    }

    fn clone_node(&self) -> NodeBox {
        Box::new(self.clone())
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn take_children(&mut self) -> Option<Vec<NodeBox>> {
        Some(std::mem::take(&mut self.children))
    }
}
