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

//! Clusters and the cluster tree
//!
//! A [`Cluster`] is a contiguous block of rows of one table: a key array
//! plus one typed leaf per column. Row indices are dense 0..N-1 and the
//! object key of a row is `cluster offset + key_array[row]`. Cluster
//! sizes are bounded by [`CLUSTER_CAP`] to bound leaf-read cost.
//!
//! The [`ClusterTree`] keys its leaf clusters by object key and offers
//! the pre-order traversal the executor drives. Leaves and key arrays
//! sit behind `Arc` so a predicate node binds them in O(1) and mutation
//! after a query snapshot copies on write.

use std::sync::Arc;

use rust_decimal::Decimal;

use crate::core::{ColKey, DataType, ObjKey, ObjectId, Timestamp, Value};

use super::leaf::{
    BinaryLeaf, KeyArray, LinkLeaf, ListLeaf, ScalarElem, ScalarLeaf, StringLeaf,
};

/// Upper bound on rows per cluster
pub const CLUSTER_CAP: usize = 256;

/// A typed leaf slot, cheap to clone into a predicate node
#[derive(Debug, Clone)]
pub enum ColumnLeaf {
    Int(Arc<ScalarLeaf<i64>>),
    Bool(Arc<ScalarLeaf<bool>>),
    Float(Arc<ScalarLeaf<f32>>),
    Double(Arc<ScalarLeaf<f64>>),
    Timestamp(Arc<ScalarLeaf<Timestamp>>),
    Decimal(Arc<ScalarLeaf<Decimal>>),
    ObjectId(Arc<ScalarLeaf<ObjectId>>),
    String(Arc<StringLeaf>),
    Binary(Arc<BinaryLeaf>),
    Link(Arc<LinkLeaf>),
    List(Arc<ListLeaf>),
}

impl ColumnLeaf {
    /// Empty leaf for a column handle
    pub(crate) fn new_for(col: ColKey) -> Self {
        if col.is_list() {
            return ColumnLeaf::List(Arc::new(ListLeaf::default()));
        }
        let nullable = col.is_nullable();
        match col.data_type() {
            DataType::Int => ColumnLeaf::Int(Arc::new(ScalarLeaf::new(nullable))),
            DataType::Bool => ColumnLeaf::Bool(Arc::new(ScalarLeaf::new(nullable))),
            DataType::Float => ColumnLeaf::Float(Arc::new(ScalarLeaf::new(nullable))),
            DataType::Double => ColumnLeaf::Double(Arc::new(ScalarLeaf::new(nullable))),
            DataType::Timestamp => ColumnLeaf::Timestamp(Arc::new(ScalarLeaf::new(nullable))),
            DataType::Decimal => ColumnLeaf::Decimal(Arc::new(ScalarLeaf::new(nullable))),
            DataType::ObjectId => ColumnLeaf::ObjectId(Arc::new(ScalarLeaf::new(nullable))),
            DataType::String => ColumnLeaf::String(Arc::new(StringLeaf::default())),
            DataType::Binary => ColumnLeaf::Binary(Arc::new(BinaryLeaf::default())),
            DataType::Link => ColumnLeaf::Link(Arc::new(LinkLeaf::default())),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ColumnLeaf::Int(l) => l.len(),
            ColumnLeaf::Bool(l) => l.len(),
            ColumnLeaf::Float(l) => l.len(),
            ColumnLeaf::Double(l) => l.len(),
            ColumnLeaf::Timestamp(l) => l.len(),
            ColumnLeaf::Decimal(l) => l.len(),
            ColumnLeaf::ObjectId(l) => l.len(),
            ColumnLeaf::String(l) => l.len(),
            ColumnLeaf::Binary(l) => l.len(),
            ColumnLeaf::Link(l) => l.len(),
            ColumnLeaf::List(l) => l.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_null(&self, row: usize) -> bool {
        match self {
            ColumnLeaf::Int(l) => l.is_null(row),
            ColumnLeaf::Bool(l) => l.is_null(row),
            ColumnLeaf::Float(l) => l.is_null(row),
            ColumnLeaf::Double(l) => l.is_null(row),
            ColumnLeaf::Timestamp(l) => l.is_null(row),
            ColumnLeaf::Decimal(l) => l.is_null(row),
            ColumnLeaf::ObjectId(l) => l.is_null(row),
            ColumnLeaf::String(l) => l.is_null(row),
            ColumnLeaf::Binary(l) => l.is_null(row),
            ColumnLeaf::Link(l) => l.is_null(row),
            ColumnLeaf::List(l) => l.is_null(row),
        }
    }

    /// Cell as a runtime value
    pub fn value_at(&self, row: usize) -> Value {
        match self {
            ColumnLeaf::Int(l) => l.value_at(row),
            ColumnLeaf::Bool(l) => l.value_at(row),
            ColumnLeaf::Float(l) => l.value_at(row),
            ColumnLeaf::Double(l) => l.value_at(row),
            ColumnLeaf::Timestamp(l) => l.value_at(row),
            ColumnLeaf::Decimal(l) => l.value_at(row),
            ColumnLeaf::ObjectId(l) => l.value_at(row),
            ColumnLeaf::String(l) => l.value_at(row),
            ColumnLeaf::Binary(l) => l.value_at(row),
            ColumnLeaf::Link(l) => l.value_at(row),
            ColumnLeaf::List(l) => l.value_at(row),
        }
    }

    /// Append a cell; the caller has already type-checked `value`
    pub(crate) fn push_value(&mut self, value: Value) {
        match (self, value) {
            (ColumnLeaf::Int(l), Value::Int(v)) => Arc::make_mut(l).push(Some(v)),
            (ColumnLeaf::Int(l), Value::Null) => Arc::make_mut(l).push(None),
            (ColumnLeaf::Bool(l), Value::Bool(v)) => Arc::make_mut(l).push(Some(v)),
            (ColumnLeaf::Bool(l), Value::Null) => Arc::make_mut(l).push(None),
            (ColumnLeaf::Float(l), Value::Float(v)) => Arc::make_mut(l).push(Some(v)),
            (ColumnLeaf::Float(l), Value::Null) => Arc::make_mut(l).push(None),
            (ColumnLeaf::Double(l), Value::Double(v)) => Arc::make_mut(l).push(Some(v)),
            (ColumnLeaf::Double(l), Value::Null) => Arc::make_mut(l).push(None),
            (ColumnLeaf::Timestamp(l), Value::Timestamp(v)) => Arc::make_mut(l).push(Some(v)),
            (ColumnLeaf::Timestamp(l), Value::Null) => Arc::make_mut(l).push(None),
            (ColumnLeaf::Decimal(l), Value::Decimal(v)) => Arc::make_mut(l).push(Some(v)),
            (ColumnLeaf::Decimal(l), Value::Null) => Arc::make_mut(l).push(None),
            (ColumnLeaf::ObjectId(l), Value::ObjectId(v)) => Arc::make_mut(l).push(Some(v)),
            (ColumnLeaf::ObjectId(l), Value::Null) => Arc::make_mut(l).push(None),
            (ColumnLeaf::String(l), Value::String(v)) => Arc::make_mut(l).push(Some(v)),
            (ColumnLeaf::String(l), Value::Null) => Arc::make_mut(l).push(None),
            (ColumnLeaf::Binary(l), Value::Binary(v)) => Arc::make_mut(l).push(Some(v)),
            (ColumnLeaf::Binary(l), Value::Null) => Arc::make_mut(l).push(None),
            (ColumnLeaf::Link(l), Value::Link(v)) => Arc::make_mut(l).push(Some(v)),
            (ColumnLeaf::Link(l), Value::Null) => Arc::make_mut(l).push(None),
            (ColumnLeaf::List(l), Value::List(v)) => Arc::make_mut(l).push(Some(v)),
            (ColumnLeaf::List(l), Value::Null) => Arc::make_mut(l).push(None),
            (leaf, value) => {
                debug_assert!(false, "push of {:?} into {:?} leaf", value, leaf);
            }
        }
    }

    /// Overwrite a cell; the caller has already type-checked `value`
    pub(crate) fn set_value(&mut self, row: usize, value: Value) {
        match (self, value) {
            (ColumnLeaf::Int(l), Value::Int(v)) => Arc::make_mut(l).set(row, Some(v)),
            (ColumnLeaf::Int(l), Value::Null) => Arc::make_mut(l).set(row, None),
            (ColumnLeaf::Bool(l), Value::Bool(v)) => Arc::make_mut(l).set(row, Some(v)),
            (ColumnLeaf::Bool(l), Value::Null) => Arc::make_mut(l).set(row, None),
            (ColumnLeaf::Float(l), Value::Float(v)) => Arc::make_mut(l).set(row, Some(v)),
            (ColumnLeaf::Float(l), Value::Null) => Arc::make_mut(l).set(row, None),
            (ColumnLeaf::Double(l), Value::Double(v)) => Arc::make_mut(l).set(row, Some(v)),
            (ColumnLeaf::Double(l), Value::Null) => Arc::make_mut(l).set(row, None),
            (ColumnLeaf::Timestamp(l), Value::Timestamp(v)) => Arc::make_mut(l).set(row, Some(v)),
            (ColumnLeaf::Timestamp(l), Value::Null) => Arc::make_mut(l).set(row, None),
            (ColumnLeaf::Decimal(l), Value::Decimal(v)) => Arc::make_mut(l).set(row, Some(v)),
            (ColumnLeaf::Decimal(l), Value::Null) => Arc::make_mut(l).set(row, None),
            (ColumnLeaf::ObjectId(l), Value::ObjectId(v)) => Arc::make_mut(l).set(row, Some(v)),
            (ColumnLeaf::ObjectId(l), Value::Null) => Arc::make_mut(l).set(row, None),
            (ColumnLeaf::String(l), Value::String(v)) => Arc::make_mut(l).set(row, Some(v)),
            (ColumnLeaf::String(l), Value::Null) => Arc::make_mut(l).set(row, None),
            (ColumnLeaf::Binary(l), Value::Binary(v)) => Arc::make_mut(l).set(row, Some(v)),
            (ColumnLeaf::Binary(l), Value::Null) => Arc::make_mut(l).set(row, None),
            (ColumnLeaf::Link(l), Value::Link(v)) => Arc::make_mut(l).set(row, Some(v)),
            (ColumnLeaf::Link(l), Value::Null) => Arc::make_mut(l).set(row, None),
            (ColumnLeaf::List(l), Value::List(v)) => Arc::make_mut(l).set(row, Some(v)),
            (ColumnLeaf::List(l), Value::Null) => Arc::make_mut(l).set(row, None),
            (leaf, value) => {
                debug_assert!(false, "set of {:?} into {:?} leaf", value, leaf);
            }
        }
    }

    pub(crate) fn remove_row(&mut self, row: usize) {
        match self {
            ColumnLeaf::Int(l) => Arc::make_mut(l).remove(row),
            ColumnLeaf::Bool(l) => Arc::make_mut(l).remove(row),
            ColumnLeaf::Float(l) => Arc::make_mut(l).remove(row),
            ColumnLeaf::Double(l) => Arc::make_mut(l).remove(row),
            ColumnLeaf::Timestamp(l) => Arc::make_mut(l).remove(row),
            ColumnLeaf::Decimal(l) => Arc::make_mut(l).remove(row),
            ColumnLeaf::ObjectId(l) => Arc::make_mut(l).remove(row),
            ColumnLeaf::String(l) => Arc::make_mut(l).remove(row),
            ColumnLeaf::Binary(l) => Arc::make_mut(l).remove(row),
            ColumnLeaf::Link(l) => Arc::make_mut(l).remove(row),
            ColumnLeaf::List(l) => Arc::make_mut(l).remove(row),
        }
    }
}

/// Scalar element types that know their [`ColumnLeaf`] slot
///
/// Lets the generic scalar predicate node bind its typed leaf without a
/// per-type node implementation.
pub trait LeafAccess: ScalarElem + std::fmt::Debug + Send + Sync + 'static {
    fn scalar_leaf(leaf: &ColumnLeaf) -> Option<Arc<ScalarLeaf<Self>>>;
}

impl LeafAccess for i64 {
    fn scalar_leaf(leaf: &ColumnLeaf) -> Option<Arc<ScalarLeaf<Self>>> {
        match leaf {
            ColumnLeaf::Int(l) => Some(l.clone()),
            _ => None,
        }
    }
}

impl LeafAccess for bool {
    fn scalar_leaf(leaf: &ColumnLeaf) -> Option<Arc<ScalarLeaf<Self>>> {
        match leaf {
            ColumnLeaf::Bool(l) => Some(l.clone()),
            _ => None,
        }
    }
}

impl LeafAccess for f32 {
    fn scalar_leaf(leaf: &ColumnLeaf) -> Option<Arc<ScalarLeaf<Self>>> {
        match leaf {
            ColumnLeaf::Float(l) => Some(l.clone()),
            _ => None,
        }
    }
}

impl LeafAccess for f64 {
    fn scalar_leaf(leaf: &ColumnLeaf) -> Option<Arc<ScalarLeaf<Self>>> {
        match leaf {
            ColumnLeaf::Double(l) => Some(l.clone()),
            _ => None,
        }
    }
}

impl LeafAccess for Timestamp {
    fn scalar_leaf(leaf: &ColumnLeaf) -> Option<Arc<ScalarLeaf<Self>>> {
        match leaf {
            ColumnLeaf::Timestamp(l) => Some(l.clone()),
            _ => None,
        }
    }
}

impl LeafAccess for Decimal {
    fn scalar_leaf(leaf: &ColumnLeaf) -> Option<Arc<ScalarLeaf<Self>>> {
        match leaf {
            ColumnLeaf::Decimal(l) => Some(l.clone()),
            _ => None,
        }
    }
}

impl LeafAccess for ObjectId {
    fn scalar_leaf(leaf: &ColumnLeaf) -> Option<Arc<ScalarLeaf<Self>>> {
        match leaf {
            ColumnLeaf::ObjectId(l) => Some(l.clone()),
            _ => None,
        }
    }
}

/// A leaf node of the cluster tree: one contiguous run of rows
#[derive(Debug, Clone)]
pub struct Cluster {
    offset: i64,
    keys: Arc<KeyArray>,
    leaves: Vec<ColumnLeaf>,
}

/// Shared cluster handle passed to traversal visitors and bound by
/// predicate nodes for the duration of one cluster scan
pub type ClusterRef = Arc<Cluster>;

impl Cluster {
    pub(crate) fn new(offset: i64, columns: &[ColKey]) -> Self {
        Cluster {
            offset,
            keys: Arc::new(KeyArray::default()),
            leaves: columns.iter().map(|&col| ColumnLeaf::new_for(col)).collect(),
        }
    }

    /// Number of rows in this cluster
    pub fn node_size(&self) -> usize {
        self.keys.len()
    }

    /// Key offset of this cluster
    pub fn get_offset(&self) -> i64 {
        self.offset
    }

    /// The per-row key values, relative to the offset
    pub fn get_key_array(&self) -> Arc<KeyArray> {
        self.keys.clone()
    }

    /// Absolute object key of a row
    pub fn get_real_key(&self, row: usize) -> ObjKey {
        ObjKey(self.offset + self.keys.get(row))
    }

    /// Bind the leaf slot of a column; O(1)
    pub fn init_leaf(&self, col: ColKey) -> ColumnLeaf {
        self.leaves[col.leaf_index()].clone()
    }

    /// First row whose relative key is >= `key`
    pub fn lower_bound_key(&self, key: i64) -> usize {
        self.keys.lower_bound(key)
    }

    /// Row of the object with relative key `key`, if present
    pub(crate) fn find_row(&self, key: i64) -> Option<usize> {
        let row = self.keys.lower_bound(key);
        (row < self.keys.len() && self.keys.get(row) == key).then_some(row)
    }

    pub(crate) fn append_row(&mut self, relative_key: i64, cells: Vec<Value>) {
        debug_assert_eq!(cells.len(), self.leaves.len());
        Arc::make_mut(&mut self.keys).push(relative_key);
        for (leaf, cell) in self.leaves.iter_mut().zip(cells) {
            leaf.push_value(cell);
        }
    }

    pub(crate) fn set_cell(&mut self, row: usize, col: ColKey, value: Value) {
        self.leaves[col.leaf_index()].set_value(row, value);
    }

    pub(crate) fn remove_row(&mut self, row: usize) {
        Arc::make_mut(&mut self.keys).remove(row);
        for leaf in &mut self.leaves {
            leaf.remove_row(row);
        }
    }

    pub(crate) fn add_leaf_slot(&mut self, col: ColKey) {
        let mut leaf = ColumnLeaf::new_for(col);
        for _ in 0..self.node_size() {
            leaf.push_value(Value::Null);
        }
        self.leaves.push(leaf);
    }
}

/// The table's tree of clusters, keyed by object key
///
/// Leaves are kept in key order; traversal is therefore object-key
/// order, which is what gives `find_all` its result-order guarantee.
#[derive(Debug, Clone, Default)]
pub struct ClusterTree {
    clusters: Vec<ClusterRef>,
}

impl ClusterTree {
    /// Total number of rows across all clusters
    pub fn size(&self) -> usize {
        self.clusters.iter().map(|c| c.node_size()).sum()
    }

    /// Pre-order traversal; the visitor returns true to stop
    ///
    /// Returns true if the traversal was stopped early.
    pub fn traverse(&self, mut visitor: impl FnMut(&ClusterRef) -> bool) -> bool {
        for cluster in &self.clusters {
            if visitor(cluster) {
                return true;
            }
        }
        false
    }

    /// Locate the cluster and row holding `key`
    pub fn locate(&self, key: ObjKey) -> Option<(ClusterRef, usize)> {
        let idx = self.cluster_index(key)?;
        let cluster = &self.clusters[idx];
        let row = cluster.find_row(key.0 - cluster.get_offset())?;
        Some((cluster.clone(), row))
    }

    fn cluster_index(&self, key: ObjKey) -> Option<usize> {
        if key.is_unresolved() || self.clusters.is_empty() {
            return None;
        }
        // Last cluster whose offset is <= key
        let idx = self
            .clusters
            .partition_point(|c| c.get_offset() <= key.0);
        idx.checked_sub(1)
    }

    pub(crate) fn append(&mut self, key: ObjKey, cells: Vec<Value>, columns: &[ColKey]) {
        let needs_new = match self.clusters.last() {
            Some(last) => last.node_size() >= CLUSTER_CAP,
            None => true,
        };
        if needs_new {
            self.clusters.push(Arc::new(Cluster::new(key.0, columns)));
        }
        if let Some(cluster) = self.clusters.last_mut() {
            let offset = cluster.get_offset();
            Arc::make_mut(cluster).append_row(key.0 - offset, cells);
        }
    }

    pub(crate) fn set_cell(&mut self, key: ObjKey, col: ColKey, value: Value) -> bool {
        let Some(idx) = self.cluster_index(key) else {
            return false;
        };
        let cluster = &mut self.clusters[idx];
        let Some(row) = cluster.find_row(key.0 - cluster.get_offset()) else {
            return false;
        };
        Arc::make_mut(cluster).set_cell(row, col, value);
        true
    }

    pub(crate) fn remove(&mut self, key: ObjKey) -> bool {
        let Some(idx) = self.cluster_index(key) else {
            return false;
        };
        let cluster = &mut self.clusters[idx];
        let Some(row) = cluster.find_row(key.0 - cluster.get_offset()) else {
            return false;
        };
        Arc::make_mut(cluster).remove_row(row);
        if cluster.node_size() == 0 {
            self.clusters.remove(idx);
        }
        true
    }

    pub(crate) fn add_leaf_slot(&mut self, col: ColKey) {
        for cluster in &mut self.clusters {
            Arc::make_mut(cluster).add_leaf_slot(col);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ColumnAttrs;

    fn int_col() -> ColKey {
        ColKey::new(0, DataType::Int, ColumnAttrs::none())
    }

    #[test]
    fn append_splits_clusters() {
        let columns = [int_col()];
        let mut tree = ClusterTree::default();
        for key in 0..(CLUSTER_CAP as i64 + 10) {
            tree.append(ObjKey(key), vec![Value::Int(key * 2)], &columns);
        }
        let mut sizes = Vec::new();
        tree.traverse(|c| {
            sizes.push(c.node_size());
            false
        });
        assert_eq!(sizes, vec![CLUSTER_CAP, 10]);

        let (cluster, row) = tree.locate(ObjKey(CLUSTER_CAP as i64 + 3)).unwrap();
        assert_eq!(cluster.get_real_key(row), ObjKey(CLUSTER_CAP as i64 + 3));
        assert_eq!(
            cluster.init_leaf(columns[0]).value_at(row).total_eq(
                &Value::Int((CLUSTER_CAP as i64 + 3) * 2)
            ),
            true
        );
    }

    #[test]
    fn remove_keeps_keys_stable() {
        let columns = [int_col()];
        let mut tree = ClusterTree::default();
        for key in 0..5 {
            tree.append(ObjKey(key), vec![Value::Int(key)], &columns);
        }
        assert!(tree.remove(ObjKey(2)));
        assert!(tree.locate(ObjKey(2)).is_none());
        let (cluster, row) = tree.locate(ObjKey(3)).unwrap();
        assert_eq!(cluster.get_real_key(row), ObjKey(3));
        assert_eq!(tree.size(), 4);
        assert!(!tree.remove(ObjKey(2)));
    }
}
