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

//! Columnar object storage
//!
//! - [`Table`] - in-memory array provider with schema and search indexes
//! - [`Cluster`], [`ClusterTree`] - contiguous row blocks keyed by object key
//! - [`leaf`] - typed per-column leaf arrays
//! - [`SearchIndex`] - value -> posting-list index for the equality fast path
//! - [`View`] - materialized key sequences

pub mod cluster;
pub mod index;
pub mod leaf;
pub mod table;
pub mod view;

pub use cluster::{Cluster, ClusterRef, ClusterTree, ColumnLeaf, LeafAccess, CLUSTER_CAP};
pub use index::{FindRes, SearchIndex};
pub use leaf::{BinaryLeaf, KeyArray, LinkLeaf, ListLeaf, ScalarElem, ScalarLeaf, StringLeaf};
pub use table::{ColumnSpec, Obj, Table};
pub use view::View;
