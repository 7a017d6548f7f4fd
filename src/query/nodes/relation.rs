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

//! Relational predicate nodes
//!
//! - [`TwoColumnsNode`] compares two columns of the same type per row
//! - [`LinksToNode`] tests a link column against a set of target keys
//! - [`SizeNode`] / [`SizeListNode`] compare string/binary byte length
//!   or list arity
//! - [`ExpressionNode`] adapts a user-supplied row predicate

use std::any::Any;
use std::fmt;

use smallvec::SmallVec;

use crate::core::{CmpOp, ColKey, ObjKey};
use crate::storage::cluster::{ClusterRef, ColumnLeaf};
use crate::storage::table::Table;

use super::super::conditions::Tri;
use super::super::describe::DescribeCx;
use super::super::planner::{boot, NodeStats};
use super::{NodeBox, QueryNode};

/// Column-against-column comparison
#[derive(Debug, Clone)]
pub struct TwoColumnsNode {
    stats: NodeStats,
    col1: ColKey,
    col2: ColKey,
    op: CmpOp,
    leaf1: Option<ColumnLeaf>,
    leaf2: Option<ColumnLeaf>,
}

impl TwoColumnsNode {
    pub fn new(col1: ColKey, col2: ColKey, op: CmpOp) -> Self {
        TwoColumnsNode {
            stats: NodeStats::new(boot::DT_TWO_COLUMNS),
            col1,
            col2,
            op,
            leaf1: None,
            leaf2: None,
        }
    }

    fn evaluate_row(&self, row: usize) -> Tri {
        let (Some(leaf1), Some(leaf2)) = (&self.leaf1, &self.leaf2) else {
            return Tri::NoMatch;
        };
        if row >= leaf1.len() || row >= leaf2.len() {
            return Tri::NoMatch;
        }
        let v1 = leaf1.value_at(row);
        let v2 = leaf2.value_at(row);
        if self.op.is_equality() {
            // Null-safe equality: two nulls are equal
            let eq = v1.total_eq(&v2);
            return Tri::from_bool(if self.op == CmpOp::Equal { eq } else { !eq });
        }
        if v1.is_null() || v2.is_null() {
            return Tri::Unknown;
        }
        Tri::from_bool(self.op.matches_partial(v1.partial_cmp_value(&v2)))
    }
}

impl QueryNode for TwoColumnsNode {
    fn stats(&self) -> &NodeStats {
        &self.stats
    }

    fn stats_mut(&mut self) -> &mut NodeStats {
        &mut self.stats
    }

    fn init(&mut self, _table: &Table) {
        self.stats.reset();
    }

    fn set_cluster(&mut self, cluster: &ClusterRef) {
        self.leaf1 = Some(cluster.init_leaf(self.col1));
        self.leaf2 = Some(cluster.init_leaf(self.col2));
    }

    fn find_first_local(&mut self, start: usize, end: usize) -> Option<usize> {
        let len = self.leaf1.as_ref().map(|l| l.len()).unwrap_or(0);
        let end = end.min(len);
        (start..end).find(|&row| self.evaluate_row(row).is_match())
    }

    fn evaluate_at(&mut self, row: usize) -> Tri {
        self.evaluate_row(row)
    }

    fn describe(&self, cx: &DescribeCx) -> String {
        format!(
            "{} {} {}",
            cx.col_name(self.col1),
            self.op.symbol(),
            cx.col_name(self.col2)
        )
    }

    fn clone_node(&self) -> NodeBox {
        Box::new(self.clone())
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Link-column membership test
#[derive(Debug, Clone)]
pub struct LinksToNode {
    stats: NodeStats,
    col: ColKey,
    targets: SmallVec<[ObjKey; 1]>,
    leaf: Option<ColumnLeaf>,
}

impl LinksToNode {
    pub fn new(col: ColKey, targets: impl IntoIterator<Item = ObjKey>) -> Self {
        LinksToNode {
            stats: NodeStats::new(boot::DT_SCAN),
            col,
            targets: targets.into_iter().collect(),
            leaf: None,
        }
    }

    fn links_at(&self, row: usize) -> bool {
        let Some(ColumnLeaf::Link(leaf)) = &self.leaf else {
            return false;
        };
        match leaf.get(row) {
            Some(target) => self.targets.contains(&target),
            None => false,
        }
    }
}

impl QueryNode for LinksToNode {
    fn stats(&self) -> &NodeStats {
        &self.stats
    }

    fn stats_mut(&mut self) -> &mut NodeStats {
        &mut self.stats
    }

    fn init(&mut self, _table: &Table) {
        self.stats.reset();
    }

    fn set_cluster(&mut self, cluster: &ClusterRef) {
        self.leaf = Some(cluster.init_leaf(self.col));
    }

    fn find_first_local(&mut self, start: usize, end: usize) -> Option<usize> {
        let len = self.leaf.as_ref().map(|l| l.len()).unwrap_or(0);
        let end = end.min(len);
        (start..end).find(|&row| self.links_at(row))
    }

    fn describe(&self, cx: &DescribeCx) -> String {
        let col = cx.col_name(self.col);
        match self.targets.as_slice() {
            [single] => format!("{} == {}", col, single),
            targets => {
                let alternatives: Vec<String> = targets
                    .iter()
                    .map(|key| format!("{} == {}", col, key))
                    .collect();
                format!("({})", alternatives.join(" or "))
            }
        }
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
}

/// Byte length of a string or binary cell
#[derive(Debug, Clone)]
pub struct SizeNode {
    stats: NodeStats,
    col: ColKey,
    op: CmpOp,
    size: i64,
    leaf: Option<ColumnLeaf>,
}

impl SizeNode {
    pub fn new(col: ColKey, op: CmpOp, size: i64) -> Self {
        SizeNode {
            stats: NodeStats::new(boot::DT_SCAN),
            col,
            op,
            size,
            leaf: None,
        }
    }

    fn cell_len(&self, row: usize) -> Option<i64> {
        match &self.leaf {
            Some(ColumnLeaf::String(leaf)) => leaf.get(row).map(|s| s.len() as i64),
            Some(ColumnLeaf::Binary(leaf)) => leaf.get(row).map(|b| b.len() as i64),
            _ => None,
        }
    }

    fn leaf_len(&self) -> usize {
        self.leaf.as_ref().map(|l| l.len()).unwrap_or(0)
    }

    fn evaluate_row(&self, row: usize) -> Tri {
        match self.cell_len(row) {
            Some(len) => Tri::from_bool(self.op.matches(&len, &self.size)),
            None => Tri::Unknown,
        }
    }
}

impl QueryNode for SizeNode {
    fn stats(&self) -> &NodeStats {
        &self.stats
    }

    fn stats_mut(&mut self) -> &mut NodeStats {
        &mut self.stats
    }

    fn init(&mut self, _table: &Table) {
        self.stats.reset();
    }

    fn set_cluster(&mut self, cluster: &ClusterRef) {
        self.leaf = Some(cluster.init_leaf(self.col));
    }

    fn find_first_local(&mut self, start: usize, end: usize) -> Option<usize> {
        let end = end.min(self.leaf_len());
        (start..end).find(|&row| self.evaluate_row(row).is_match())
    }

    fn evaluate_at(&mut self, row: usize) -> Tri {
        if row >= self.leaf_len() {
            return Tri::NoMatch;
        }
        self.evaluate_row(row)
    }

    fn describe(&self, cx: &DescribeCx) -> String {
        format!(
            "{}.@size {} {}",
            cx.col_name(self.col),
            self.op.symbol(),
            self.size
        )
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
}

/// Arity of a list cell
#[derive(Debug, Clone)]
pub struct SizeListNode {
    stats: NodeStats,
    col: ColKey,
    op: CmpOp,
    size: i64,
    leaf: Option<ColumnLeaf>,
}

impl SizeListNode {
    pub fn new(col: ColKey, op: CmpOp, size: i64) -> Self {
        SizeListNode {
            stats: NodeStats::new(boot::DT_SCAN),
            col,
            op,
            size,
            leaf: None,
        }
    }

    fn leaf_len(&self) -> usize {
        self.leaf.as_ref().map(|l| l.len()).unwrap_or(0)
    }

    fn evaluate_row(&self, row: usize) -> Tri {
        let Some(ColumnLeaf::List(leaf)) = &self.leaf else {
            return Tri::NoMatch;
        };
        match leaf.list_len(row) {
            Some(len) => Tri::from_bool(self.op.matches(&(len as i64), &self.size)),
            None => Tri::Unknown,
        }
    }
}

impl QueryNode for SizeListNode {
    fn stats(&self) -> &NodeStats {
        &self.stats
    }

    fn stats_mut(&mut self) -> &mut NodeStats {
        &mut self.stats
    }

    fn init(&mut self, _table: &Table) {
        self.stats.reset();
    }

    fn set_cluster(&mut self, cluster: &ClusterRef) {
        self.leaf = Some(cluster.init_leaf(self.col));
    }

    fn find_first_local(&mut self, start: usize, end: usize) -> Option<usize> {
        let end = end.min(self.leaf_len());
        (start..end).find(|&row| self.evaluate_row(row).is_match())
    }

    fn evaluate_at(&mut self, row: usize) -> Tri {
        if row >= self.leaf_len() {
            return Tri::NoMatch;
        }
        self.evaluate_row(row)
    }

    fn describe(&self, cx: &DescribeCx) -> String {
        format!(
            "{}.@size {} {}",
            cx.col_name(self.col),
            self.op.symbol(),
            self.size
        )
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
}

/// User-supplied row predicate compiled outside the engine
pub trait RowExpression: fmt::Debug + Send {
    /// Bind the base table; called once per execution. Returns the
    /// per-probe cost estimate for the planner.
    fn init(&mut self, _table: &Table) -> f64 {
        boot::DT_EXPRESSION
    }

    /// Bind the cluster about to be scanned
    fn set_cluster(&mut self, cluster: &ClusterRef);

    /// Next row in [start, end) accepted by the expression
    fn find_first(&mut self, start: usize, end: usize) -> Option<usize>;

    /// Textual form for query descriptions
    fn description(&self) -> String {
        "expression".to_string()
    }

    fn clone_expr(&self) -> Box<dyn RowExpression>;
}

/// Adapter giving a [`RowExpression`] a seat in the predicate tree
#[derive(Debug)]
pub struct ExpressionNode {
    stats: NodeStats,
    expression: Box<dyn RowExpression>,
}

impl ExpressionNode {
    pub fn new(expression: Box<dyn RowExpression>) -> Self {
        ExpressionNode {
            stats: NodeStats::new(boot::DT_EXPRESSION),
            expression,
        }
    }
}

impl Clone for ExpressionNode {
    fn clone(&self) -> Self {
        ExpressionNode {
            stats: self.stats.clone(),
            expression: self.expression.clone_expr(),
        }
    }
}

impl QueryNode for ExpressionNode {
    fn stats(&self) -> &NodeStats {
        &self.stats
    }

    fn stats_mut(&mut self) -> &mut NodeStats {
        &mut self.stats
    }

    fn init(&mut self, table: &Table) {
        self.stats.reset();
        let dt = self.expression.init(table);
        self.stats.set_dt(dt);
    }

    fn set_cluster(&mut self, cluster: &ClusterRef) {
        self.expression.set_cluster(cluster);
    }

    fn find_first_local(&mut self, start: usize, end: usize) -> Option<usize> {
        self.expression.find_first(start, end)
    }

    fn describe(&self, _cx: &DescribeCx) -> String {
        self.expression.description()
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
    use crate::core::{ColumnAttrs, DataType, Value};
    use crate::storage::cluster::ClusterTree;
    use std::sync::Arc;

    #[test]
    fn two_columns_null_rules() {
        let a = ColKey::new(0, DataType::Int, ColumnAttrs::NULLABLE);
        let b = ColKey::new(1, DataType::Int, ColumnAttrs::NULLABLE);
        let mut tree = ClusterTree::default();
        let rows: [(Option<i64>, Option<i64>); 4] =
            [(Some(1), Some(1)), (Some(2), Some(1)), (None, None), (None, Some(3))];
        for (i, (va, vb)) in rows.iter().enumerate() {
            tree.append(
                ObjKey(i as i64),
                vec![Value::from(*va), Value::from(*vb)],
                &[a, b],
            );
        }
        let mut cluster = None;
        tree.traverse(|c| {
            cluster = Some(c.clone());
            true
        });
        let cluster = cluster.unwrap();

        let mut eq = TwoColumnsNode::new(a, b, CmpOp::Equal);
        eq.set_cluster(&cluster);
        assert_eq!(eq.find_first_local(0, 4), Some(0));
        assert_eq!(eq.find_first_local(1, 4), Some(2), "two nulls are equal");

        let mut gt = TwoColumnsNode::new(a, b, CmpOp::Greater);
        gt.set_cluster(&cluster);
        assert_eq!(gt.find_first_local(0, 4), Some(1));
        assert_eq!(gt.evaluate_at(3), Tri::Unknown);
    }

    #[test]
    fn size_list_node() {
        let tags = ColKey::new(0, DataType::String, ColumnAttrs::LIST);
        let mut tree = ClusterTree::default();
        let lists: [&[&str]; 4] = [&["a"], &[], &["a", "b"], &["b", "c"]];
        for (i, items) in lists.iter().enumerate() {
            let list: Vec<Value> = items.iter().map(|&s| Value::from(s)).collect();
            tree.append(
                ObjKey(i as i64),
                vec![Value::List(Arc::new(list))],
                &[tags],
            );
        }
        let mut cluster = None;
        tree.traverse(|c| {
            cluster = Some(c.clone());
            true
        });
        let cluster = cluster.unwrap();

        let mut empty = SizeListNode::new(tags, CmpOp::Equal, 0);
        empty.set_cluster(&cluster);
        assert_eq!(empty.find_first_local(0, 4), Some(1));

        let mut wide = SizeListNode::new(tags, CmpOp::Greater, 1);
        wide.set_cluster(&cluster);
        assert_eq!(wide.find_first_local(0, 4), Some(2));
        assert_eq!(wide.find_first_local(3, 4), Some(3));
    }

    #[test]
    fn links_to_membership() {
        let link = ColKey::new(0, DataType::Link, ColumnAttrs::none());
        let mut tree = ClusterTree::default();
        let cells = [Some(ObjKey(10)), None, Some(ObjKey(20)), Some(ObjKey(30))];
        for (i, target) in cells.iter().enumerate() {
            let cell = match target {
                Some(key) => Value::Link(*key),
                None => Value::Null,
            };
            tree.append(ObjKey(i as i64), vec![cell], &[link]);
        }
        let mut cluster = None;
        tree.traverse(|c| {
            cluster = Some(c.clone());
            true
        });
        let cluster = cluster.unwrap();

        let mut node = LinksToNode::new(link, [ObjKey(20), ObjKey(30)]);
        node.set_cluster(&cluster);
        assert_eq!(node.find_first_local(0, 4), Some(2));
        assert_eq!(node.evaluate_at(1), Tri::NoMatch);
    }
}
