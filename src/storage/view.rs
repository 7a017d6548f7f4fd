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

//! Materialized views
//!
//! A [`View`] is the result of `find_all`: a sequence of object keys in
//! traversal order. A query can be constrained by a view, in which case
//! the executor iterates the view's keys instead of the cluster tree.

use crate::core::{ObjKey, Result};

use super::table::{Obj, Table};

/// A materialized sequence of object keys
#[derive(Debug, Clone)]
pub struct View {
    table: Table,
    keys: Vec<ObjKey>,
    version: u64,
}

impl View {
    pub(crate) fn new(table: Table, keys: Vec<ObjKey>) -> Self {
        let version = table.version();
        View {
            table,
            keys,
            version,
        }
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Key at view position `pos`
    pub fn get_key(&self, pos: usize) -> Option<ObjKey> {
        self.keys.get(pos).copied()
    }

    /// Object at view position `pos`
    pub fn get_object(&self, pos: usize) -> Result<Obj> {
        let key = self
            .get_key(pos)
            .ok_or(crate::core::Error::KeyNotFound(pos as i64))?;
        self.table.get_object(key)
    }

    pub fn keys(&self) -> &[ObjKey] {
        &self.keys
    }

    pub fn iter(&self) -> impl Iterator<Item = ObjKey> + '_ {
        self.keys.iter().copied()
    }

    /// Whether the table has changed since this view was materialized
    pub fn is_in_sync(&self) -> bool {
        self.version == self.table.version()
    }

    /// Drop keys whose objects no longer resolve and re-stamp the
    /// version; called before executing a view-constrained query
    pub fn sync_if_needed(&mut self) {
        if self.is_in_sync() {
            return;
        }
        let table = self.table.clone();
        self.keys.retain(|&key| table.is_valid(key));
        self.version = self.table.version();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DataType;

    #[test]
    fn sync_prunes_dead_keys() {
        let table = Table::new("t");
        let v = table.add_column("v", DataType::Int).unwrap();
        let keys: Vec<ObjKey> = (0..4)
            .map(|i| {
                let obj = table.create_object().unwrap();
                obj.set(v, i as i64).unwrap();
                obj.key()
            })
            .collect();

        let mut view = View::new(table.clone(), keys.clone());
        assert!(view.is_in_sync());

        table.remove_object(keys[1]).unwrap();
        assert!(!view.is_in_sync());
        view.sync_if_needed();
        assert_eq!(view.keys(), &[keys[0], keys[2], keys[3]]);
        assert!(view.is_in_sync());
    }
}
