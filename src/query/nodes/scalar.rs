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

//! Scalar predicate nodes
//!
//! One generic node covers every scalar leaf type (integer, bool,
//! float, double, timestamp, decimal, object id); the binary node adds
//! lexicographic byte-string comparison. Each instance pairs a column
//! with a comparison operator and a target value.

use std::any::Any;
use std::sync::Arc;

use rust_decimal::Decimal;

use crate::core::{CmpOp, ColKey, DataType, ObjectId, Timestamp, Value};
use crate::storage::cluster::{ClusterRef, LeafAccess};
use crate::storage::leaf::{BinaryLeaf, ScalarElem, ScalarLeaf};
use crate::storage::table::Table;

use super::super::conditions::Tri;
use super::super::describe::DescribeCx;
use super::super::planner::{boot, NodeStats};
use super::{NodeBox, QueryNode};

/// Per-probe cost bootstrap for a scalar column scan
fn scan_dt(data_type: DataType) -> f64 {
    match data_type {
        DataType::Int | DataType::Bool | DataType::Timestamp => boot::DT_INT_SCAN,
        DataType::Float | DataType::Double => boot::DT_FLOAT_SCAN,
        _ => boot::DT_SCAN,
    }
}

/// Condition over one scalar column
#[derive(Debug, Clone)]
pub struct ScalarNode<T: LeafAccess> {
    stats: NodeStats,
    col: ColKey,
    op: CmpOp,
    target: Option<T>,
    leaf: Option<Arc<ScalarLeaf<T>>>,
}

pub type IntegerNode = ScalarNode<i64>;
pub type BoolNode = ScalarNode<bool>;
pub type FloatNode = ScalarNode<f32>;
pub type DoubleNode = ScalarNode<f64>;
pub type TimestampNode = ScalarNode<Timestamp>;
pub type DecimalNode = ScalarNode<Decimal>;
pub type ObjectIdNode = ScalarNode<ObjectId>;

impl<T: LeafAccess> ScalarNode<T> {
    /// `target == None` turns Equal into a null test and NotEqual into
    /// a non-null test
    pub fn new(col: ColKey, op: CmpOp, target: Option<T>) -> Self {
        ScalarNode {
            stats: NodeStats::new(scan_dt(col.data_type())),
            col,
            op,
            target,
            leaf: None,
        }
    }
}

impl<T: LeafAccess> QueryNode for ScalarNode<T> {
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
        self.leaf = T::scalar_leaf(&cluster.init_leaf(self.col));
    }

    fn find_first_local(&mut self, start: usize, end: usize) -> Option<usize> {
        self.leaf
            .as_ref()
            .and_then(|leaf| leaf.find_first(self.op, self.target.as_ref(), start, end))
    }

    fn evaluate_at(&mut self, row: usize) -> Tri {
        let Some(leaf) = &self.leaf else {
            return Tri::NoMatch;
        };
        if row >= leaf.len() {
            return Tri::NoMatch;
        }
        match (leaf.get(row), &self.target) {
            (cell, None) => match self.op {
                CmpOp::Equal => Tri::from_bool(cell.is_none()),
                CmpOp::NotEqual => Tri::from_bool(cell.is_some()),
                _ => Tri::NoMatch,
            },
            (None, Some(_)) => match self.op {
                CmpOp::Equal => Tri::NoMatch,
                CmpOp::NotEqual => Tri::Match,
                _ => Tri::Unknown,
            },
            (Some(cell), Some(target)) => Tri::from_bool(T::matches(self.op, cell, target)),
        }
    }

    fn describe(&self, cx: &DescribeCx) -> String {
        let value = match &self.target {
            Some(t) => t.clone().into_value().to_string(),
            None => "NULL".to_string(),
        };
        format!("{} {} {}", cx.col_name(self.col), self.op.symbol(), value)
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

/// Condition over a binary column; ordering is lexicographic on bytes
#[derive(Debug, Clone)]
pub struct BinaryNode {
    stats: NodeStats,
    col: ColKey,
    op: CmpOp,
    target: Option<Arc<[u8]>>,
    leaf: Option<Arc<BinaryLeaf>>,
}

impl BinaryNode {
    pub fn new(col: ColKey, op: CmpOp, target: Option<Arc<[u8]>>) -> Self {
        BinaryNode {
            stats: NodeStats::new(boot::DT_SCAN),
            col,
            op,
            target,
            leaf: None,
        }
    }

    fn matches_cell(&self, cell: Option<&[u8]>) -> Tri {
        match (cell, self.target.as_deref()) {
            (cell, None) => match self.op {
                CmpOp::Equal => Tri::from_bool(cell.is_none()),
                CmpOp::NotEqual => Tri::from_bool(cell.is_some()),
                _ => Tri::NoMatch,
            },
            (None, Some(_)) => match self.op {
                CmpOp::Equal => Tri::NoMatch,
                CmpOp::NotEqual => Tri::Match,
                _ => Tri::Unknown,
            },
            (Some(cell), Some(target)) => Tri::from_bool(self.op.matches(&cell, &target)),
        }
    }
}

impl QueryNode for BinaryNode {
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
        self.leaf = match cluster.init_leaf(self.col) {
            crate::storage::cluster::ColumnLeaf::Binary(leaf) => Some(leaf),
            _ => None,
        };
    }

    fn find_first_local(&mut self, start: usize, end: usize) -> Option<usize> {
        let leaf = self.leaf.as_ref()?;
        let end = end.min(leaf.len());
        (start..end).find(|&row| self.matches_cell(leaf.get(row)).is_match())
    }

    fn evaluate_at(&mut self, row: usize) -> Tri {
        let Some(leaf) = &self.leaf else {
            return Tri::NoMatch;
        };
        if row >= leaf.len() {
            return Tri::NoMatch;
        }
        self.matches_cell(leaf.get(row))
    }

    fn describe(&self, cx: &DescribeCx) -> String {
        let value = match &self.target {
            Some(bytes) => Value::Binary(bytes.clone()).to_string(),
            None => "NULL".to_string(),
        };
        format!("{} {} {}", cx.col_name(self.col), self.op.symbol(), value)
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ColumnAttrs, ObjKey};
    use crate::storage::cluster::ClusterTree;

    fn cluster_of(values: &[Option<i64>]) -> ClusterRef {
        let col = ColKey::new(0, DataType::Int, ColumnAttrs::NULLABLE);
        let mut tree = ClusterTree::default();
        for (i, v) in values.iter().enumerate() {
            tree.append(ObjKey(i as i64), vec![Value::from(*v)], &[col]);
        }
        let mut out = None;
        tree.traverse(|c| {
            out = Some(c.clone());
            true
        });
        out.unwrap()
    }

    #[test]
    fn scalar_node_scans_and_evaluates() {
        let col = ColKey::new(0, DataType::Int, ColumnAttrs::NULLABLE);
        let cluster = cluster_of(&[Some(30), Some(40), None, Some(40)]);
        let mut node = IntegerNode::new(col, CmpOp::Equal, Some(40));
        node.set_cluster(&cluster);
        assert_eq!(node.find_first_local(0, 4), Some(1));
        assert_eq!(node.find_first_local(2, 4), Some(3));
        assert_eq!(node.evaluate_at(0), Tri::NoMatch);
        assert_eq!(node.evaluate_at(2), Tri::NoMatch, "equality is definite on nulls");

        let mut gt = IntegerNode::new(col, CmpOp::Greater, Some(30));
        gt.set_cluster(&cluster);
        assert_eq!(gt.evaluate_at(2), Tri::Unknown, "order is undefined on nulls");
        assert_eq!(gt.find_first_local(0, 4), Some(1));

        let mut isnull = IntegerNode::new(col, CmpOp::Equal, None);
        isnull.set_cluster(&cluster);
        assert_eq!(isnull.find_first_local(0, 4), Some(2));
    }

    #[test]
    fn unused_cluster_returns_nothing() {
        let col = ColKey::new(0, DataType::Int, ColumnAttrs::none());
        let mut node = IntegerNode::new(col, CmpOp::Equal, Some(1));
        assert_eq!(node.find_first_local(0, 10), None);
        assert_eq!(node.evaluate_at(0), Tri::NoMatch);
    }
}
