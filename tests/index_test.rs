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

//! Search index tests
//!
//! The equality fast path must be invisible to consumers: toggling an
//! index changes the access path, never the result sequence.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use quarry::{DataType, ObjKey, Table};

fn words_table(rows: usize) -> (Table, quarry::ColKey, quarry::ColKey) {
    let table = Table::new("words");
    let word = table.add_column("word", DataType::String).unwrap();
    let n = table.add_column("n", DataType::Int).unwrap();
    let mut rng = StdRng::seed_from_u64(42);
    for i in 0..rows {
        let obj = table.create_object().unwrap();
        let letter = char::from(b'a' + rng.gen_range(0..8u8)).to_string();
        obj.set(word, letter).unwrap();
        obj.set(n, i as i64).unwrap();
    }
    (table, word, n)
}

#[test]
fn index_toggle_preserves_result_sequence() {
    let (table, word, _) = words_table(2000);

    let without = table.query().equal(word, "c").find_all().unwrap();
    table.add_search_index(word).unwrap();
    let with = table.query().equal(word, "c").find_all().unwrap();
    table.remove_search_index(word);
    let dropped = table.query().equal(word, "c").find_all().unwrap();

    assert_eq!(without.keys(), with.keys());
    assert_eq!(without.keys(), dropped.keys());
    assert!(!without.is_empty());
    assert!(without.keys().windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn index_fast_path_filters_through_siblings() {
    let (table, word, n) = words_table(2000);
    table.add_search_index(word).unwrap();

    let view = table
        .query()
        .equal(word, "c")
        .less(n, 500i64)
        .find_all()
        .unwrap();
    table.remove_search_index(word);
    let scan = table
        .query()
        .equal(word, "c")
        .less(n, 500i64)
        .find_all()
        .unwrap();
    assert_eq!(view.keys(), scan.keys());
    assert!(!view.is_empty());
}

#[test]
fn index_fast_path_respects_window_and_limit() {
    let (table, word, _) = words_table(2000);

    let full = table.query().equal(word, "d").find_all().unwrap();
    table.add_search_index(word).unwrap();

    let limited = table
        .query()
        .equal(word, "d")
        .find_all_with(0, None, 5)
        .unwrap();
    assert_eq!(limited.keys(), &full.keys()[..5]);

    // Row window [100, 1500) translates to key bounds
    let windowed = table
        .query()
        .equal(word, "d")
        .find_all_with(100, Some(1500), usize::MAX)
        .unwrap();
    let expected: Vec<ObjKey> = full
        .iter()
        .filter(|k| k.value() >= 100 && k.value() < 1500)
        .collect();
    assert_eq!(windowed.keys(), &expected[..]);
}

#[test]
fn count_uses_the_index_transparently() {
    let (table, word, _) = words_table(1000);
    let expected = table.query().equal(word, "a").count().unwrap();
    table.add_search_index(word).unwrap();
    assert_eq!(table.query().equal(word, "a").count().unwrap(), expected);
    assert_eq!(
        table
            .query()
            .equal(word, "a")
            .count_with_limit(3)
            .unwrap(),
        3.min(expected)
    );
}

#[test]
fn index_follows_later_writes() {
    let table = Table::new("t");
    let word = table.add_column("word", DataType::String).unwrap();
    table.add_search_index(word).unwrap();
    let a = table.create_object().unwrap();
    a.set(word, "left").unwrap();
    let b = table.create_object().unwrap();
    b.set(word, "right").unwrap();

    assert_eq!(
        table.query().equal(word, "left").find_all().unwrap().keys(),
        &[a.key()]
    );

    a.set(word, "right").unwrap();
    assert_eq!(
        table.query().equal(word, "right").find_all().unwrap().keys(),
        &[a.key(), b.key()]
    );
    assert_eq!(table.query().equal(word, "left").count().unwrap(), 0);

    table.remove_object(b.key()).unwrap();
    assert_eq!(
        table.query().equal(word, "right").find_all().unwrap().keys(),
        &[a.key()]
    );
}

// find() stays on the scan path; an indexed condition drives it
// through the posting cursor instead of a leaf scan
#[test]
fn find_scans_through_the_index_cursor() {
    let (table, word, _) = words_table(1200);
    let expected = table.query().equal(word, "e").find().unwrap();
    assert!(expected.is_some());
    table.add_search_index(word).unwrap();
    assert_eq!(table.query().equal(word, "e").find().unwrap(), expected);
}

#[test]
fn indexed_sum_matches_scan_sum() {
    let (table, word, n) = words_table(1500);
    let scan_sum = table.query().equal(word, "b").sum_int(n).unwrap();
    table.add_search_index(word).unwrap();
    let indexed_sum = table.query().equal(word, "b").sum_int(n).unwrap();
    assert_eq!(scan_sum, indexed_sum);
}
