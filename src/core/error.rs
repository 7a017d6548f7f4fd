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

//! Error types for Quarry
//!
//! This module defines all error types used throughout the query engine.

use thiserror::Error;

use super::types::DataType;

/// Result type alias for Quarry operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Quarry operations
///
/// Builder-time errors are recorded eagerly on the query and surfaced by
/// `validate()` or the first terminal operation. Evaluation-time errors
/// (detachment) are fatal to the execution.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    // =========================================================================
    // Builder errors
    // =========================================================================
    /// A condition value is incompatible with the target column type
    #[error("type mismatch on column '{column}': expected {expected}, got {got}")]
    TypeMismatch {
        column: String,
        expected: DataType,
        got: DataType,
    },

    /// Referenced column is absent in the base table
    #[error("column '{0}' not found")]
    NoSuchColumn(String),

    /// `end_group` without a matching `group`, or a group left open
    #[error("unbalanced group")]
    UnbalancedGroup,

    /// Negation applied to a query with no conditions
    #[error("negation of an empty query is not supported")]
    EmptyNegation,

    // =========================================================================
    // Execution errors
    // =========================================================================
    /// `get_description` on a query constrained by a view
    #[error("serialisation of a query constrained by a view is not supported")]
    SerialisationUnsupported,

    /// The base table is no longer attached to its group
    #[error("table is detached")]
    Detached,

    // =========================================================================
    // Table surface errors
    // =========================================================================
    /// Duplicate column name in the table schema
    #[error("column '{0}' already exists")]
    DuplicateColumn(String),

    /// Object key already present in the table
    #[error("object with key {0} already exists")]
    KeyAlreadyUsed(i64),

    /// Object key does not resolve to a live object
    #[error("object with key {0} not found")]
    KeyNotFound(i64),

    /// NULL stored in a column that is not nullable
    #[error("column '{0}' is not nullable")]
    NotNullable(String),
}
