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

//! In-memory table: the array provider consumed by the query engine
//!
//! A [`Table`] owns a cluster tree of columnar rows, the column schema
//! and any search indexes. It is a cheap-to-clone handle; the state
//! sits behind a `parking_lot::RwLock` and the cluster payloads behind
//! `Arc`, so a query executing against a traversal snapshot keeps
//! reading consistent data while later writes copy on write.
//!
//! Object keys are allocated monotonically and never reused; removing
//! an object keeps the remaining keys stable.

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::core::{ColKey, ColumnAttrs, DataType, Error, ObjKey, Result, Value};

use super::cluster::{ClusterRef, ClusterTree, ColumnLeaf};
use super::index::SearchIndex;

/// One column of the schema
#[derive(Debug, Clone)]
pub struct ColumnSpec {
    pub name: String,
    pub key: ColKey,
}

#[derive(Debug, Default)]
struct TableState {
    columns: Vec<ColumnSpec>,
    tree: ClusterTree,
    indexes: FxHashMap<usize, SearchIndex>,
    next_key: i64,
}

#[derive(Debug)]
pub(crate) struct TableInner {
    name: String,
    state: RwLock<TableState>,
    version: AtomicU64,
}

/// Shared handle to a table
#[derive(Debug, Clone)]
pub struct Table {
    inner: Arc<TableInner>,
}

/// Weak table handle held by queries; a dead handle surfaces as
/// [`Error::Detached`]
#[derive(Debug, Clone, Default)]
pub(crate) struct WeakTable {
    inner: Weak<TableInner>,
}

impl WeakTable {
    pub(crate) fn upgrade(&self) -> Result<Table> {
        self.inner
            .upgrade()
            .map(|inner| Table { inner })
            .ok_or(Error::Detached)
    }
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Table {
            inner: Arc::new(TableInner {
                name: name.into(),
                state: RwLock::new(TableState::default()),
                version: AtomicU64::new(0),
            }),
        }
    }

    pub fn name(&self) -> String {
        self.inner.name.clone()
    }

    /// Monotonic mutation stamp, used by views to detect staleness
    pub fn version(&self) -> u64 {
        self.inner.version.load(AtomicOrdering::Acquire)
    }

    fn bump_version(&self) {
        self.inner.version.fetch_add(1, AtomicOrdering::AcqRel);
    }

    pub(crate) fn downgrade(&self) -> WeakTable {
        WeakTable {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub(crate) fn same_table(&self, other: &Table) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // =========================================================================
    // Schema
    // =========================================================================

    /// Register a non-nullable column
    pub fn add_column(&self, name: impl Into<String>, data_type: DataType) -> Result<ColKey> {
        self.add_column_with_attrs(name, data_type, ColumnAttrs::none())
    }

    /// Register a nullable column
    pub fn add_column_nullable(
        &self,
        name: impl Into<String>,
        data_type: DataType,
    ) -> Result<ColKey> {
        self.add_column_with_attrs(name, data_type, ColumnAttrs::NULLABLE)
    }

    /// Register a list column with the given element type
    pub fn add_column_list(
        &self,
        name: impl Into<String>,
        element_type: DataType,
    ) -> Result<ColKey> {
        self.add_column_with_attrs(name, element_type, ColumnAttrs::LIST)
    }

    /// Register a column with an explicit attribute mask
    pub fn add_column_with_attrs(
        &self,
        name: impl Into<String>,
        data_type: DataType,
        attrs: ColumnAttrs,
    ) -> Result<ColKey> {
        let name = name.into();
        let mut state = self.inner.state.write();
        if state.columns.iter().any(|c| c.name == name) {
            return Err(Error::DuplicateColumn(name));
        }
        let key = ColKey::new(state.columns.len(), data_type, attrs);
        state.columns.push(ColumnSpec {
            name,
            key,
        });
        state.tree.add_leaf_slot(key);
        drop(state);
        self.bump_version();
        Ok(key)
    }

    /// Column handle by name
    pub fn col_by_name(&self, name: &str) -> Result<ColKey> {
        let state = self.inner.state.read();
        state
            .columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.key)
            .ok_or_else(|| Error::NoSuchColumn(name.to_string()))
    }

    /// Column name for a handle; used by query descriptions
    pub fn col_name(&self, col: ColKey) -> Result<String> {
        let state = self.inner.state.read();
        state
            .columns
            .get(col.leaf_index())
            .map(|c| c.name.clone())
            .ok_or_else(|| Error::NoSuchColumn(format!("#{}", col.leaf_index())))
    }

    /// Number of registered columns
    pub fn column_count(&self) -> usize {
        self.inner.state.read().columns.len()
    }

    // =========================================================================
    // Objects
    // =========================================================================

    /// Total number of objects
    pub fn size(&self) -> usize {
        self.inner.state.read().tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Create an object with default cell values
    pub fn create_object(&self) -> Result<Obj> {
        let mut state = self.inner.state.write();
        let key = ObjKey(state.next_key);
        state.next_key += 1;
        self.insert_locked(&mut state, key)?;
        drop(state);
        self.bump_version();
        Ok(Obj {
            table: self.clone(),
            key,
        })
    }

    /// Create an object under an explicit key
    ///
    /// The key must be above every key handed out so far; keys are never
    /// reused.
    pub fn create_object_with_key(&self, key: ObjKey) -> Result<Obj> {
        let mut state = self.inner.state.write();
        if key.0 < state.next_key {
            return Err(Error::KeyAlreadyUsed(key.0));
        }
        state.next_key = key.0 + 1;
        self.insert_locked(&mut state, key)?;
        drop(state);
        self.bump_version();
        Ok(Obj {
            table: self.clone(),
            key,
        })
    }

    fn insert_locked(&self, state: &mut TableState, key: ObjKey) -> Result<()> {
        let columns: Vec<ColKey> = state.columns.iter().map(|c| c.key).collect();
        let cells: Vec<Value> = columns.iter().map(|&col| default_cell(col)).collect();
        for (col, cell) in columns.iter().zip(cells.iter()) {
            if let Some(index) = state.indexes.get_mut(&col.leaf_index()) {
                match cell {
                    Value::String(s) => index.insert(Some(s), key),
                    _ => index.insert(None, key),
                }
            }
        }
        state.tree.append(key, cells, &columns);
        Ok(())
    }

    /// Remove the object with `key`
    pub fn remove_object(&self, key: ObjKey) -> Result<()> {
        let mut state = self.inner.state.write();
        if !state.indexes.is_empty() {
            if let Some((cluster, row)) = state.tree.locate(key) {
                let indexed: Vec<usize> = state.indexes.keys().copied().collect();
                for leaf_index in indexed {
                    let columns = &state.columns;
                    let Some(spec) = columns.get(leaf_index) else {
                        continue;
                    };
                    let old = cluster.init_leaf(spec.key).value_at(row);
                    if let Some(index) = state.indexes.get_mut(&leaf_index) {
                        match &old {
                            Value::String(s) => index.remove(Some(s), key),
                            _ => index.remove(None, key),
                        }
                    }
                }
            }
        }
        if !state.tree.remove(key) {
            return Err(Error::KeyNotFound(key.0));
        }
        drop(state);
        self.bump_version();
        Ok(())
    }

    /// Whether `key` resolves to a live object
    pub fn is_valid(&self, key: ObjKey) -> bool {
        self.inner.state.read().tree.locate(key).is_some()
    }

    /// Accessor handle for the object with `key`
    pub fn get_object(&self, key: ObjKey) -> Result<Obj> {
        if !self.is_valid(key) {
            return Err(Error::KeyNotFound(key.0));
        }
        Ok(Obj {
            table: self.clone(),
            key,
        })
    }

    /// Object at a table-wide row position (cluster traversal order)
    pub fn object_at(&self, position: usize) -> Option<Obj> {
        let mut remaining = position;
        let mut found = None;
        self.traverse_clusters(|cluster| {
            let size = cluster.node_size();
            if remaining < size {
                found = Some(cluster.get_real_key(remaining));
                true
            } else {
                remaining -= size;
                false
            }
        });
        found.map(|key| Obj {
            table: self.clone(),
            key,
        })
    }

    pub(crate) fn set_cell(&self, key: ObjKey, col: ColKey, value: Value) -> Result<()> {
        check_cell_type(self, col, &value)?;
        let mut state = self.inner.state.write();
        if state.indexes.contains_key(&col.leaf_index()) {
            // Re-point the posting from the old value to the new one
            let old = state
                .tree
                .locate(key)
                .map(|(cluster, row)| cluster.init_leaf(col).value_at(row));
            if let Some(index) = state.indexes.get_mut(&col.leaf_index()) {
                match old {
                    Some(Value::String(old)) => index.remove(Some(&old), key),
                    _ => index.remove(None, key),
                }
                match &value {
                    Value::String(s) => index.insert(Some(s), key),
                    _ => index.insert(None, key),
                }
            }
        }
        if !state.tree.set_cell(key, col, value) {
            return Err(Error::KeyNotFound(key.0));
        }
        drop(state);
        self.bump_version();
        Ok(())
    }

    pub(crate) fn get_cell(&self, key: ObjKey, col: ColKey) -> Result<Value> {
        let state = self.inner.state.read();
        let (cluster, row) = state
            .tree
            .locate(key)
            .ok_or(Error::KeyNotFound(key.0))?;
        Ok(cluster.init_leaf(col).value_at(row))
    }

    // =========================================================================
    // Traversal
    // =========================================================================

    /// Pre-order cluster traversal over a consistent snapshot; the
    /// visitor returns true to stop. Returns true if stopped early.
    pub fn traverse_clusters(&self, visitor: impl FnMut(&ClusterRef) -> bool) -> bool {
        let tree = self.inner.state.read().tree.clone();
        tree.traverse(visitor)
    }

    /// Locate the cluster and row holding `key`
    pub fn locate(&self, key: ObjKey) -> Option<(ClusterRef, usize)> {
        self.inner.state.read().tree.locate(key)
    }

    // =========================================================================
    // Search indexes
    // =========================================================================

    /// Build a search index over a string column
    pub fn add_search_index(&self, col: ColKey) -> Result<()> {
        if col.data_type() != DataType::String || col.is_list() {
            return Err(Error::TypeMismatch {
                column: self.col_name(col)?,
                expected: DataType::String,
                got: col.data_type(),
            });
        }
        let mut index = SearchIndex::default();
        self.traverse_clusters(|cluster| {
            let leaf = cluster.init_leaf(col);
            if let ColumnLeaf::String(leaf) = leaf {
                for row in 0..leaf.len() {
                    let key = cluster.get_real_key(row);
                    match leaf.value_at(row) {
                        Value::String(s) => index.insert(Some(&s), key),
                        _ => index.insert(None, key),
                    }
                }
            }
            false
        });
        self.inner
            .state
            .write()
            .indexes
            .insert(col.leaf_index(), index);
        self.bump_version();
        Ok(())
    }

    /// Drop the search index of a column
    pub fn remove_search_index(&self, col: ColKey) {
        self.inner.state.write().indexes.remove(&col.leaf_index());
        self.bump_version();
    }

    pub fn has_search_index(&self, col: ColKey) -> bool {
        self.inner
            .state
            .read()
            .indexes
            .contains_key(&col.leaf_index())
    }

    /// Snapshot of a column's search index
    pub fn get_search_index(&self, col: ColKey) -> Option<SearchIndex> {
        self.inner
            .state
            .read()
            .indexes
            .get(&col.leaf_index())
            .cloned()
    }
}

/// Accessor handle for one object
#[derive(Debug, Clone)]
pub struct Obj {
    table: Table,
    key: ObjKey,
}

impl Obj {
    pub fn key(&self) -> ObjKey {
        self.key
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn is_valid(&self) -> bool {
        self.table.is_valid(self.key)
    }

    /// Read a cell
    pub fn get(&self, col: ColKey) -> Result<Value> {
        self.table.get_cell(self.key, col)
    }

    /// Write a cell; the value must match the column type
    pub fn set(&self, col: ColKey, value: impl Into<Value>) -> Result<&Self> {
        self.table.set_cell(self.key, col, value.into())?;
        Ok(self)
    }
}

/// Default cell for a freshly created object
fn default_cell(col: ColKey) -> Value {
    if col.is_nullable() || col.is_list() {
        return match col.is_list() {
            true => Value::List(Arc::new(Vec::new())),
            false => Value::Null,
        };
    }
    match col.data_type() {
        DataType::Int => Value::Int(0),
        DataType::Bool => Value::Bool(false),
        DataType::Float => Value::Float(0.0),
        DataType::Double => Value::Double(0.0),
        DataType::Timestamp => Value::Timestamp(chrono::DateTime::UNIX_EPOCH),
        DataType::Decimal => Value::Decimal(rust_decimal::Decimal::ZERO),
        DataType::ObjectId => Value::ObjectId(crate::core::ObjectId::from_bytes([0; 12])),
        DataType::String => Value::String(Arc::from("")),
        DataType::Binary => Value::Binary(Arc::from(&[][..])),
        DataType::Link => Value::Null,
    }
}

/// Eager type check for cell writes
fn check_cell_type(table: &Table, col: ColKey, value: &Value) -> Result<()> {
    let mismatch = |got: DataType| -> Error {
        Error::TypeMismatch {
            column: table.col_name(col).unwrap_or_default(),
            expected: col.data_type(),
            got,
        }
    };
    if value.is_null() {
        // Links are always optional; everything else needs the attribute
        if col.is_nullable() || col.is_list() || col.data_type() == DataType::Link {
            return Ok(());
        }
        return Err(Error::NotNullable(table.col_name(col).unwrap_or_default()));
    }
    if col.is_list() {
        match value {
            Value::List(items) => {
                for item in items.iter() {
                    if let Some(got) = item.data_type() {
                        if got != col.data_type() {
                            return Err(mismatch(got));
                        }
                    }
                }
                Ok(())
            }
            other => Err(mismatch(other.data_type().unwrap_or(DataType::Int))),
        }
    } else {
        match value.data_type() {
            Some(got) if got == col.data_type() => Ok(()),
            Some(got) => Err(mismatch(got)),
            None => Err(mismatch(DataType::Int)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_and_objects() {
        let table = Table::new("people");
        let age = table.add_column_nullable("age", DataType::Int).unwrap();
        let name = table.add_column("name", DataType::String).unwrap();
        assert_eq!(table.col_by_name("age").unwrap(), age);
        assert!(matches!(
            table.col_by_name("ages"),
            Err(Error::NoSuchColumn(_))
        ));

        let obj = table.create_object().unwrap();
        obj.set(age, 30i64).unwrap().set(name, "ann").unwrap();
        assert!(obj.get(age).unwrap().total_eq(&Value::Int(30)));
        assert_eq!(table.size(), 1);

        // Strict typing
        assert!(matches!(
            obj.set(age, "x"),
            Err(Error::TypeMismatch { .. })
        ));
        assert!(matches!(obj.set(name, Value::Null), Err(Error::NotNullable(_))));
        obj.set(age, Value::Null).unwrap();
    }

    #[test]
    fn index_follows_mutations() {
        let table = Table::new("t");
        let name = table.add_column("name", DataType::String).unwrap();
        let a = table.create_object().unwrap();
        a.set(name, "ann").unwrap();
        let b = table.create_object().unwrap();
        b.set(name, "bob").unwrap();

        table.add_search_index(name).unwrap();
        let index = table.get_search_index(name).unwrap();
        assert_eq!(index.find_first(Some("ann")), Some(a.key()));

        b.set(name, "ann").unwrap();
        let index = table.get_search_index(name).unwrap();
        assert!(matches!(
            index.find_all_no_copy(Some("ann")),
            super::super::index::FindRes::Column { .. }
        ));
        assert!(matches!(
            index.find_all_no_copy(Some("bob")),
            super::super::index::FindRes::NotFound
        ));

        table.remove_object(a.key()).unwrap();
        let index = table.get_search_index(name).unwrap();
        assert_eq!(index.find_first(Some("ann")), Some(b.key()));
    }

    #[test]
    fn keys_survive_removal() {
        let table = Table::new("t");
        let v = table.add_column("v", DataType::Int).unwrap();
        let keys: Vec<ObjKey> = (0..10)
            .map(|i| {
                let obj = table.create_object().unwrap();
                obj.set(v, i as i64).unwrap();
                obj.key()
            })
            .collect();
        table.remove_object(keys[4]).unwrap();
        assert!(!table.is_valid(keys[4]));
        assert!(table.is_valid(keys[5]));
        assert!(table
            .get_object(keys[5])
            .unwrap()
            .get(v)
            .unwrap()
            .total_eq(&Value::Int(5)));
    }
}
