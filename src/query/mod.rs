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

//! The query engine
//!
//! - [`Query`] - fluent builder plus terminal operations
//! - [`nodes`] - predicate node tree
//! - [`planner`] - cost statistics and tuning constants
//! - [`state`] - aggregate reducers
//! - [`conditions`] - string condition operators
//! - [`describe`] - textual serialization support

pub mod conditions;
pub mod describe;
pub mod nodes;
pub mod planner;
#[allow(clippy::module_inception)]
pub mod query;
pub mod state;

pub use conditions::{StrOp, Tri};
pub use describe::{DescribeCx, TRUE_PREDICATE};
pub use nodes::relation::RowExpression;
pub use planner::{NodeStats, PlannerConfig};
pub use query::Query;
