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

//! String predicate node
//!
//! One node covers all string operators. The case-sensitive equality
//! form has two extra gears:
//!
//! - **Search index cursor**: when the column carries a search index,
//!   `init` resolves the posting window once and `find_first_local`
//!   walks it alongside the cluster traversal, translating posting keys
//!   to cluster rows.
//! - **Needle-set coalescing**: AND-ing several equal conditions on the
//!   same unindexed column folds them into one node holding a needle
//!   set, turning O(N·M) scans into one O(N) scan. Small sets probe
//!   linearly, larger ones through a hash set.

use std::any::Any;
use std::sync::Arc;

use rustc_hash::FxHashSet;

use crate::core::{ColKey, ObjKey};
use crate::storage::cluster::{ClusterRef, ColumnLeaf};
use crate::storage::index::FindRes;
use crate::storage::leaf::StringLeaf;
use crate::storage::table::{Obj, Table};

use super::super::conditions::{StrNeedle, StrOp, Tri};
use super::super::describe::DescribeCx;
use super::super::planner::{boot, NodeStats};
use super::{NodeBox, QueryNode};

/// Below this needle count a linear probe beats hashing the cell
const NEEDLE_LINEAR_MAX: usize = 20;

/// Resolved index postings for one execution
#[derive(Debug, Clone)]
enum IndexMatches {
    Empty,
    Single(ObjKey),
    Column(Arc<Vec<ObjKey>>),
}

impl IndexMatches {
    fn get_key(&self, ndx: usize) -> ObjKey {
        match self {
            IndexMatches::Single(key) => *key,
            IndexMatches::Column(keys) => keys[ndx],
            IndexMatches::Empty => ObjKey(0),
        }
    }
}

/// Condition over one string column
#[derive(Debug, Clone)]
pub struct StringNode {
    stats: NodeStats,
    col: ColKey,
    needle: StrNeedle,
    /// Coalesced needle set (case-sensitive equality only)
    needles: FxHashSet<Arc<str>>,
    has_null_needle: bool,
    leaf: Option<Arc<StringLeaf>>,
    cluster: Option<ClusterRef>,
    // Search index cursor
    has_index: bool,
    index_matches: IndexMatches,
    results_start: usize,
    results_end: usize,
    results_ndx: usize,
    actual_key: ObjKey,
    last_start_key: Option<ObjKey>,
}

impl StringNode {
    pub fn new(col: ColKey, op: StrOp, value: Option<Arc<str>>, case_sensitive: bool) -> Self {
        StringNode {
            stats: NodeStats::new(boot::DT_SCAN),
            col,
            needle: StrNeedle::new(value, op, case_sensitive),
            needles: FxHashSet::default(),
            has_null_needle: false,
            leaf: None,
            cluster: None,
            has_index: false,
            index_matches: IndexMatches::Empty,
            results_start: 0,
            results_end: 0,
            results_ndx: 0,
            actual_key: ObjKey(0),
            last_start_key: None,
        }
    }

    fn is_plain_equal(&self) -> bool {
        self.needle.op() == StrOp::Equal && self.needle.case_sensitive()
    }

    fn has_needle_set(&self) -> bool {
        !self.needles.is_empty() || self.has_null_needle
    }

    /// Resolve the posting window for this node's needle
    fn search_index_init(&mut self, table: &Table) {
        self.last_start_key = None;
        self.results_start = 0;
        self.results_end = 0;
        let Some(index) = table.get_search_index(self.col) else {
            self.has_index = false;
            return;
        };
        match index.find_all_no_copy(self.needle.value().map(|s| s.as_ref())) {
            FindRes::NotFound => {
                self.index_matches = IndexMatches::Empty;
            }
            FindRes::Single(key) => {
                self.index_matches = IndexMatches::Single(key);
                self.actual_key = key;
                self.results_end = 1;
            }
            FindRes::Column {
                keys,
                start_ndx,
                end_ndx,
            } => {
                self.actual_key = keys[start_ndx];
                self.index_matches = IndexMatches::Column(keys);
                self.results_start = start_ndx;
                self.results_end = end_ndx;
            }
        }
        self.results_ndx = self.results_start;
    }

    /// Index-driven `find_first_local`: advance the posting cursor to
    /// the bound cluster's key window and translate back to a row
    fn find_first_indexed(&mut self, start: usize, end: usize) -> Option<usize> {
        let cluster = self.cluster.as_ref()?;
        if start >= end {
            return None;
        }
        let first_key = cluster.get_real_key(start);
        if self.last_start_key.map_or(false, |last| first_key < last) {
            // Not advancing through the clusters; start over
            self.results_ndx = self.results_start;
            if self.results_ndx < self.results_end {
                self.actual_key = self.index_matches.get_key(self.results_ndx);
            }
        }
        self.last_start_key = Some(first_key);

        if self.results_ndx >= self.results_end {
            return None;
        }
        while first_key > self.actual_key {
            self.results_ndx += 1;
            if self.results_ndx == self.results_end {
                return None;
            }
            self.actual_key = self.index_matches.get_key(self.results_ndx);
        }
        // If the posting key is past this range's last key it is not in
        // this window
        let last_key = cluster.get_real_key(end - 1);
        if self.actual_key > last_key {
            return None;
        }
        Some(cluster.lower_bound_key(self.actual_key.0 - cluster.get_offset()))
    }

    /// Needle-set scan: linear probe for small sets, hash probe beyond
    fn find_first_needles(&self, start: usize, end: usize) -> Option<usize> {
        let leaf = self.leaf.as_ref()?;
        let end = end.min(leaf.len());
        if self.needles.len() < NEEDLE_LINEAR_MAX {
            (start..end).find(|&row| match leaf.get(row) {
                Some(cell) => self.needles.iter().any(|n| n.as_ref() == cell),
                None => self.has_null_needle,
            })
        } else {
            (start..end).find(|&row| match leaf.get(row) {
                Some(cell) => self.needles.contains(cell),
                None => self.has_null_needle,
            })
        }
    }

    fn evaluate_cell(&self, row: usize) -> Tri {
        let Some(leaf) = &self.leaf else {
            return Tri::NoMatch;
        };
        if row >= leaf.len() {
            return Tri::NoMatch;
        }
        if self.has_needle_set() {
            return Tri::from_bool(match leaf.get(row) {
                Some(cell) => self.needles.iter().any(|n| n.as_ref() == cell),
                None => self.has_null_needle,
            });
        }
        self.needle.matches(leaf.get(row))
    }

    /// Needles in deterministic order for serialization
    fn sorted_needles(&self) -> Vec<Option<&str>> {
        let mut needles: Vec<Option<&str>> = self
            .needles
            .iter()
            .map(|n| Some(n.as_ref()))
            .collect();
        needles.sort_unstable();
        if self.has_null_needle {
            needles.insert(0, None);
        }
        needles
    }
}

impl QueryNode for StringNode {
    fn stats(&self) -> &NodeStats {
        &self.stats
    }

    fn stats_mut(&mut self) -> &mut NodeStats {
        &mut self.stats
    }

    fn init(&mut self, table: &Table) {
        self.stats.reset();
        self.has_index =
            self.is_plain_equal() && !self.has_needle_set() && table.has_search_index(self.col);
        if self.has_index {
            self.stats.set_dt(boot::DT_INDEXED);
            self.search_index_init(table);
        }
    }

    fn set_cluster(&mut self, cluster: &ClusterRef) {
        self.leaf = match cluster.init_leaf(self.col) {
            ColumnLeaf::String(leaf) => Some(leaf),
            _ => None,
        };
        self.cluster = Some(cluster.clone());
    }

    fn find_first_local(&mut self, start: usize, end: usize) -> Option<usize> {
        if self.has_index {
            return self.find_first_indexed(start, end);
        }
        if self.has_needle_set() {
            return self.find_first_needles(start, end);
        }
        let leaf = self.leaf.as_ref()?;
        let end = end.min(leaf.len());
        (start..end).find(|&row| self.needle.matches(leaf.get(row)).is_match())
    }

    fn evaluate_at(&mut self, row: usize) -> Tri {
        self.evaluate_cell(row)
    }

    fn has_search_index(&self) -> bool {
        self.has_index
    }

    fn index_based_aggregate(
        &mut self,
        limit: usize,
        table: &Table,
        f: &mut dyn FnMut(&Obj) -> bool,
    ) -> usize {
        let mut accepted = 0;
        let mut ndx = self.results_start;
        while ndx < self.results_end && accepted < limit {
            let key = self.index_matches.get_key(ndx);
            if let Ok(obj) = table.get_object(key) {
                if f(&obj) {
                    accepted += 1;
                }
            }
            ndx += 1;
        }
        accepted
    }

    fn describe(&self, cx: &DescribeCx) -> String {
        let col = cx.col_name(self.col);
        if !self.has_needle_set() {
            let value = match self.needle.value() {
                Some(s) => format!("\"{}\"", s.replace('"', "\\\"")),
                None => "NULL".to_string(),
            };
            let symbol = self.needle.op().symbol(self.needle.case_sensitive());
            return format!("{} {} {}", col, symbol, value);
        }
        // Alternation form for a coalesced needle set
        let alternatives: Vec<String> = self
            .sorted_needles()
            .into_iter()
            .map(|needle| match needle {
                Some(s) => format!("{} == \"{}\"", col, s.replace('"', "\\\"")),
                None => format!("{} == NULL", col),
            })
            .collect();
        format!("({})", alternatives.join(" or "))
    }

    fn clone_node(&self) -> NodeBox {
        Box::new(self.clone())
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn condition_col(&self) -> Option<ColKey> {
        Some(self.col)
    }

    fn string_equal_col(&self) -> Option<ColKey> {
        self.is_plain_equal().then_some(self.col)
    }

    fn take_equal_needle(&mut self) -> Option<Option<Arc<str>>> {
        if self.has_needle_set() {
            // Already a coalescing target; not consumable
            return None;
        }
        Some(self.needle.value().cloned())
    }

    fn consume_needle(&mut self, needle: Option<Arc<str>>) {
        if !self.has_needle_set() {
            // Move this node's own value into the set first
            match self.needle.value().cloned() {
                Some(own) => {
                    self.needles.insert(own);
                }
                None => self.has_null_needle = true,
            }
        }
        match needle {
            Some(s) => {
                self.needles.insert(s);
            }
            None => self.has_null_needle = true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ColumnAttrs, DataType, Value};
    use crate::storage::cluster::ClusterTree;

    fn string_cluster(values: &[Option<&str>]) -> (ColKey, ClusterRef) {
        let col = ColKey::new(0, DataType::String, ColumnAttrs::NULLABLE);
        let mut tree = ClusterTree::default();
        for (i, v) in values.iter().enumerate() {
            let cell = match v {
                Some(s) => Value::from(*s),
                None => Value::Null,
            };
            tree.append(ObjKey(i as i64), vec![cell], &[col]);
        }
        let mut out = None;
        tree.traverse(|c| {
            out = Some(c.clone());
            true
        });
        (col, out.unwrap())
    }

    #[test]
    fn plain_scan() {
        let (col, cluster) = string_cluster(&[Some("ann"), Some("Bob"), Some("anna"), None]);
        let mut node = StringNode::new(col, StrOp::BeginsWith, Some(Arc::from("an")), false);
        node.set_cluster(&cluster);
        assert_eq!(node.find_first_local(0, 4), Some(0));
        assert_eq!(node.find_first_local(1, 4), Some(2));
        assert_eq!(node.evaluate_at(3), Tri::Unknown);
    }

    #[test]
    fn needle_set_membership() {
        let (col, cluster) = string_cluster(&[Some("x"), Some("q"), Some("y"), None]);
        let mut node = StringNode::new(col, StrOp::Equal, Some(Arc::from("x")), true);
        node.consume_needle(Some(Arc::from("y")));
        node.set_cluster(&cluster);
        assert_eq!(node.find_first_local(0, 4), Some(0));
        assert_eq!(node.find_first_local(1, 4), Some(2));
        assert_eq!(node.find_first_local(3, 4), None);
        assert_eq!(node.evaluate_at(1), Tri::NoMatch);

        // Null needle folds in as a null test
        node.consume_needle(None);
        assert_eq!(node.find_first_local(3, 4), Some(3));
    }

    #[test]
    fn only_plain_equal_coalesces() {
        let col = ColKey::new(0, DataType::String, ColumnAttrs::none());
        let equal = StringNode::new(col, StrOp::Equal, Some(Arc::from("x")), true);
        assert_eq!(equal.string_equal_col(), Some(col));
        let insensitive = StringNode::new(col, StrOp::Equal, Some(Arc::from("x")), false);
        assert_eq!(insensitive.string_equal_col(), None);
        let begins = StringNode::new(col, StrOp::BeginsWith, Some(Arc::from("x")), true);
        assert_eq!(begins.string_equal_col(), None);
    }
}
