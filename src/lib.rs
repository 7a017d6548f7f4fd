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

//! # Quarry - embedded column-oriented query engine
//!
//! Quarry evaluates declarative predicates against columnar object
//! storage: a composable predicate tree with grouping, disjunction and
//! negation; a cost-driven planner that picks, per row range, which
//! condition drives the scan; a cluster-tree traversal streaming leaf
//! arrays into the predicate nodes; an equality-over-indexed-string
//! fast path; and aggregate reducers (count, sum, min, max, average,
//! find, find-all).
//!
//! ## Quick start
//!
//! ```rust
//! use quarry::{DataType, Table};
//!
//! let table = Table::new("people");
//! let age = table.add_column_nullable("age", DataType::Int).unwrap();
//! let name = table.add_column("name", DataType::String).unwrap();
//!
//! for (a, n) in [(Some(30), "ann"), (Some(40), "bob"), (None, "cass")] {
//!     let obj = table.create_object().unwrap();
//!     obj.set(age, quarry::Value::from(a)).unwrap();
//!     obj.set(name, n).unwrap();
//! }
//!
//! // age == 40 and name begins with "b"
//! let mut query = table.query().equal(age, 40i64).begins_with(name, "b", true);
//! assert_eq!(query.count().unwrap(), 1);
//!
//! // Matches stream in object-key order
//! let view = table.query().not_equal(age, quarry::Value::Null).find_all().unwrap();
//! assert_eq!(view.len(), 2);
//! ```
//!
//! ## Modules
//!
//! - [`core`] - handles and values ([`ColKey`], [`ObjKey`], [`Value`], [`Error`])
//! - [`storage`] - columnar tables, clusters, leaves, search indexes, views
//! - [`query`] - the predicate tree, planner, executor and builder
//!
//! The engine is single-threaded per execution: a query exclusively
//! owns its predicate tree and borrows a consistent snapshot of the
//! table. Parallel queries across threads each need their own clone.

pub mod core;
pub mod query;
pub mod storage;

// Re-export the primary surface
pub use crate::core::{
    CmpOp, ColKey, ColumnAttrs, DataType, Error, ObjKey, ObjectId, Result, Timestamp, Value,
};
pub use crate::query::{PlannerConfig, Query, RowExpression, TRUE_PREDICATE};
pub use crate::storage::{FindRes, Obj, SearchIndex, Table, View, CLUSTER_CAP};
