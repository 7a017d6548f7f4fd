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

//! Size, link and column-pair condition tests

use std::sync::Arc;

use quarry::{DataType, ObjKey, Table, Value};

#[test]
fn list_size_conditions() {
    // tags: [["a"], [], ["a","b"], ["b","c"]]
    let table = Table::new("t");
    let tags = table.add_column_list("tags", DataType::String).unwrap();
    let lists: [&[&str]; 4] = [&["a"], &[], &["a", "b"], &["b", "c"]];
    for (key, items) in lists.iter().enumerate() {
        let obj = table.create_object_with_key(ObjKey(key as i64 + 1)).unwrap();
        let list: Vec<Value> = items.iter().map(|&s| Value::from(s)).collect();
        obj.set(tags, Value::List(Arc::new(list))).unwrap();
    }

    let empty = table.query().size_equal(tags, 0).find_all().unwrap();
    assert_eq!(empty.keys(), &[ObjKey(2)]);

    let wide = table.query().size_greater(tags, 1).find_all().unwrap();
    assert_eq!(wide.keys(), &[ObjKey(3), ObjKey(4)]);

    assert_eq!(table.query().size_between(tags, 1, 2).count().unwrap(), 3);
}

#[test]
fn string_and_binary_size_conditions() {
    let table = Table::new("t");
    let s = table.add_column("s", DataType::String).unwrap();
    let b = table.add_column("b", DataType::Binary).unwrap();
    for (text, bytes) in [("a", &[1u8, 2, 3][..]), ("abc", &[][..]), ("abcd", &[9][..])] {
        let obj = table.create_object().unwrap();
        obj.set(s, text).unwrap();
        obj.set(b, Value::from(bytes)).unwrap();
    }
    assert_eq!(
        table.query().size_greater_equal(s, 3).count().unwrap(),
        2
    );
    assert_eq!(
        table.query().size_equal(b, 0).find_all().unwrap().keys(),
        &[ObjKey(1)]
    );
    assert_eq!(table.query().size_less(s, 2).count().unwrap(), 1);
}

#[test]
fn links_to_selects_origin_rows() {
    let targets = Table::new("targets");
    let tname = targets.add_column("name", DataType::String).unwrap();
    let t0 = targets.create_object().unwrap();
    t0.set(tname, "zero").unwrap();
    let t1 = targets.create_object().unwrap();
    t1.set(tname, "one").unwrap();

    let origins = Table::new("origins");
    let link = origins.add_column("link", DataType::Link).unwrap();
    let cells = [Some(t0.key()), None, Some(t1.key()), Some(t0.key())];
    for target in cells {
        let obj = origins.create_object().unwrap();
        obj.set(link, Value::from(target.map(Value::Link))).unwrap();
    }

    let view = origins.query().links_to(link, t0.key()).find_all().unwrap();
    assert_eq!(view.keys(), &[ObjKey(0), ObjKey(3)]);

    let any = origins
        .query()
        .links_to_any(link, [t0.key(), t1.key()])
        .find_all()
        .unwrap();
    assert_eq!(any.keys(), &[ObjKey(0), ObjKey(2), ObjKey(3)]);
}

#[test]
fn two_column_comparisons() {
    let table = Table::new("t");
    let a = table.add_column_nullable("a", DataType::Int).unwrap();
    let b = table.add_column_nullable("b", DataType::Int).unwrap();
    let rows: [(Option<i64>, Option<i64>); 5] = [
        (Some(1), Some(1)),
        (Some(3), Some(2)),
        (Some(2), Some(3)),
        (None, None),
        (None, Some(5)),
    ];
    for (va, vb) in rows {
        let obj = table.create_object().unwrap();
        obj.set(a, Value::from(va)).unwrap();
        obj.set(b, Value::from(vb)).unwrap();
    }

    let equal = table.query().equal_columns(a, b).find_all().unwrap();
    assert_eq!(equal.keys(), &[ObjKey(0), ObjKey(3)], "nulls compare equal");

    let greater = table.query().greater_columns(a, b).find_all().unwrap();
    assert_eq!(greater.keys(), &[ObjKey(1)]);

    let not_equal = table.query().not_equal_columns(a, b).count().unwrap();
    assert_eq!(not_equal, 3);
}

#[test]
fn mismatched_column_pairs_fail() {
    let table = Table::new("t");
    let a = table.add_column("a", DataType::Int).unwrap();
    let s = table.add_column("s", DataType::String).unwrap();
    table.create_object().unwrap();
    let mut query = table.query().equal_columns(a, s);
    assert!(!query.validate().is_empty());
    assert!(query.count().is_err());
}
