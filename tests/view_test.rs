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

//! View-constrained query tests
//!
//! A query over a view iterates the materialized key sequence instead
//! of the cluster tree, and re-syncs the view before executing.

use quarry::{DataType, Error, ObjKey, Query, Table, Value};

fn setup() -> (Table, quarry::ColKey, quarry::ColKey) {
    let table = Table::new("t");
    let v = table.add_column("v", DataType::Int).unwrap();
    let tag = table.add_column("tag", DataType::String).unwrap();
    for i in 0..50i64 {
        let obj = table.create_object().unwrap();
        obj.set(v, i).unwrap();
        obj.set(tag, if i % 2 == 0 { "even" } else { "odd" }).unwrap();
    }
    (table, v, tag)
}

#[test]
fn query_over_view_filters_the_sequence() {
    let (table, v, tag) = setup();
    let evens = table.query().equal_string(tag, Some("even"), true).find_all().unwrap();
    assert_eq!(evens.len(), 25);

    let mut over_view = Query::on_view(&evens).greater(v, 40i64);
    let keys = over_view.find_all().unwrap();
    assert_eq!(keys.keys(), &[ObjKey(42), ObjKey(44), ObjKey(46), ObjKey(48)]);

    assert_eq!(Query::on_view(&evens).greater(v, 40i64).count().unwrap(), 4);
    assert_eq!(
        Query::on_view(&evens).greater(v, 40i64).find().unwrap(),
        Some(ObjKey(42))
    );
}

#[test]
fn view_query_syncs_before_running() {
    let (table, v, tag) = setup();
    let evens = table.query().equal_string(tag, Some("even"), true).find_all().unwrap();

    // Mutate after materializing: the stale key must not resurface
    table.remove_object(ObjKey(42)).unwrap();
    let mut over_view = Query::on_view(&evens).greater(v, 40i64);
    let keys = over_view.find_all().unwrap();
    assert_eq!(keys.keys(), &[ObjKey(44), ObjKey(46), ObjKey(48)]);
}

#[test]
fn view_aggregates() {
    let (table, v, tag) = setup();
    let odds = table.query().equal_string(tag, Some("odd"), true).find_all().unwrap();
    let sum = Query::on_view(&odds).sum_int(v).unwrap();
    assert_eq!(sum, (0..50i64).filter(|i| i % 2 == 1).sum::<i64>());

    let mut key = None;
    let max = Query::on_view(&odds)
        .less(v, 10i64)
        .maximum_int(v, Some(&mut key))
        .unwrap();
    assert_eq!(max, Some(9));
    assert_eq!(key, Some(ObjKey(9)));
}

#[test]
fn view_bound_query_does_not_serialize() {
    let (table, v, tag) = setup();
    let view = table.query().equal_string(tag, Some("even"), true).find_all().unwrap();
    let query = Query::on_view(&view).greater(v, 10i64);
    assert!(matches!(
        query.get_description(),
        Err(Error::SerialisationUnsupported)
    ));
}

#[test]
fn empty_view_query_matches_nothing() {
    let (table, v, tag) = setup();
    let none = table
        .query()
        .equal_string(tag, Some("missing"), true)
        .find_all()
        .unwrap();
    assert!(none.is_empty());
    assert_eq!(Query::on_view(&none).greater(v, 0i64).count().unwrap(), 0);
    assert_eq!(Query::on_view(&none).find().unwrap(), None);
}

#[test]
fn view_objects_resolve() {
    let (table, v, tag) = setup();
    let evens = table.query().equal_string(tag, Some("even"), true).find_all().unwrap();
    let obj = evens.get_object(1).unwrap();
    assert!(obj.get(v).unwrap().total_eq(&Value::Int(2)));
    assert!(evens.is_in_sync());
}
