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

//! Query description tests

use quarry::{DataType, Table, TRUE_PREDICATE};

fn people() -> (Table, quarry::ColKey, quarry::ColKey) {
    let table = Table::new("people");
    let age = table.add_column_nullable("age", DataType::Int).unwrap();
    let name = table.add_column("name", DataType::String).unwrap();
    (table, age, name)
}

#[test]
fn empty_query_is_truepredicate() {
    let (table, _, _) = people();
    assert_eq!(table.query().get_description().unwrap(), TRUE_PREDICATE);
}

#[test]
fn infix_and_chain() {
    let (table, age, name) = people();
    let query = table.query().equal(name, "x").greater(age, 10i64);
    assert_eq!(
        query.get_description().unwrap(),
        "name == \"x\" and age > 10"
    );
}

#[test]
fn or_groups_are_parenthesized() {
    let (table, age, name) = people();
    let query = table
        .query()
        .group()
        .equal(age, 30i64)
        .or()
        .equal(age, 40i64)
        .end_group()
        .begins_with(name, "an", false);
    assert_eq!(
        query.get_description().unwrap(),
        "(age == 30 or age == 40) and name BEGINSWITH[c] \"an\""
    );
}

#[test]
fn negation_prints_bang() {
    let (table, age, _) = people();
    let query = table.query().not().equal(age, 30i64);
    assert_eq!(query.get_description().unwrap(), "!(age == 30)");
}

#[test]
fn case_insensitive_operators_carry_a_marker() {
    let (table, _, name) = people();
    let query = table.query().equal_string(name, Some("bob"), false);
    assert_eq!(query.get_description().unwrap(), "name ==[c] \"bob\"");
    let query = table.query().contains(name, "ob", true);
    assert_eq!(query.get_description().unwrap(), "name CONTAINS \"ob\"");
}

#[test]
fn greater_equal_rewrites_on_integers() {
    let (table, age, _) = people();
    let query = table.query().greater_equal(age, 10i64);
    assert_eq!(query.get_description().unwrap(), "age > 9");
    let query = table.query().less_equal(age, 10i64);
    assert_eq!(query.get_description().unwrap(), "age < 11");
}

#[test]
fn null_conditions_print_null() {
    let (table, age, _) = people();
    let query = table.query().not_equal(age, quarry::Value::Null);
    assert_eq!(query.get_description().unwrap(), "age != NULL");
}

#[test]
fn coalesced_needles_print_an_alternation() {
    let (table, _, name) = people();
    for n in ["x", "q"] {
        table.create_object().unwrap().set(name, n).unwrap();
    }
    let mut query = table
        .query()
        .equal(name, "x")
        .equal(name, "y")
        .equal(name, "z");
    // Coalescing happens when the execution plan is built
    assert_eq!(query.count().unwrap(), 1);
    assert_eq!(
        query.get_description().unwrap(),
        "(name == \"x\" or name == \"y\" or name == \"z\")"
    );
}

#[test]
fn size_conditions_describe_the_size() {
    let table = Table::new("t");
    let tags = table.add_column_list("tags", DataType::String).unwrap();
    let query = table.query().size_equal(tags, 0);
    assert_eq!(query.get_description().unwrap(), "tags.@size == 0");
}

#[test]
fn between_describes_as_two_comparisons() {
    let (table, age, _) = people();
    let query = table.query().between(age, 10i64, 20i64);
    assert_eq!(query.get_description().unwrap(), "age > 9 and age < 21");
}
