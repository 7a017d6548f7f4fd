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

//! Query description context
//!
//! Serializing a query walks the predicate tree and emits an infix
//! textual form; the context resolves column handles to names.

use crate::core::ColKey;
use crate::storage::Table;

/// Description of the query that matches every object
pub const TRUE_PREDICATE: &str = "TRUEPREDICATE";

/// Serialization context handed through `describe`
#[derive(Debug, Clone, Default)]
pub struct DescribeCx {
    table: Option<Table>,
}

impl DescribeCx {
    pub fn new(table: Option<Table>) -> Self {
        DescribeCx { table }
    }

    /// Column name, falling back to the leaf index when the table is
    /// not reachable
    pub fn col_name(&self, col: ColKey) -> String {
        self.table
            .as_ref()
            .and_then(|t| t.col_name(col).ok())
            .unwrap_or_else(|| format!("${}", col.leaf_index()))
    }
}
