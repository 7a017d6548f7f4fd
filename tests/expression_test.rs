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

//! User expression node tests
//!
//! A row predicate compiled outside the engine participates in the
//! predicate tree like any other condition.

use quarry::storage::{ClusterRef, ColumnLeaf};
use quarry::{ColKey, DataType, ObjKey, RowExpression, Table, Value};

/// Accepts rows whose integer cell is even
#[derive(Debug, Clone)]
struct EvenValue {
    col: ColKey,
    leaf: Option<ColumnLeaf>,
}

impl EvenValue {
    fn new(col: ColKey) -> Self {
        EvenValue { col, leaf: None }
    }
}

impl RowExpression for EvenValue {
    fn set_cluster(&mut self, cluster: &ClusterRef) {
        self.leaf = Some(cluster.init_leaf(self.col));
    }

    fn find_first(&mut self, start: usize, end: usize) -> Option<usize> {
        let leaf = self.leaf.as_ref()?;
        let end = end.min(leaf.len());
        (start..end).find(|&row| match leaf.value_at(row) {
            Value::Int(v) => v % 2 == 0,
            _ => false,
        })
    }

    fn description(&self) -> String {
        "value is even".to_string()
    }

    fn clone_expr(&self) -> Box<dyn RowExpression> {
        Box::new(self.clone())
    }
}

#[test]
fn expression_node_filters_rows() {
    let table = Table::new("t");
    let v = table.add_column("v", DataType::Int).unwrap();
    for i in 0..10i64 {
        table.create_object().unwrap().set(v, i).unwrap();
    }
    let view = table
        .query()
        .expression(Box::new(EvenValue::new(v)))
        .greater(v, 4i64)
        .find_all()
        .unwrap();
    assert_eq!(view.keys(), &[ObjKey(6), ObjKey(8)]);
}

#[test]
fn expression_node_describes_itself() {
    let table = Table::new("t");
    let v = table.add_column("v", DataType::Int).unwrap();
    let query = table.query().expression(Box::new(EvenValue::new(v)));
    assert_eq!(query.get_description().unwrap(), "value is even");
}

#[test]
fn expression_query_clones() {
    let table = Table::new("t");
    let v = table.add_column("v", DataType::Int).unwrap();
    for i in 0..6i64 {
        table.create_object().unwrap().set(v, i).unwrap();
    }
    let mut original = table.query().expression(Box::new(EvenValue::new(v)));
    let mut cloned = original.clone();
    assert_eq!(original.count().unwrap(), 3);
    assert_eq!(cloned.count().unwrap(), 3);
}
