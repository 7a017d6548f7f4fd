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

//! Aggregate states
//!
//! A state receives every verified match from the executor through
//! `match_row` and folds it into its accumulator. Returning `false`
//! requests an early stop (the limit mechanism). States are
//! stack-scoped to a single terminal operation and never shared.

use std::sync::Arc;

use rust_decimal::Decimal;

use crate::core::{ObjKey, Value};
use crate::storage::cluster::ClusterRef;
use crate::storage::leaf::KeyArray;

/// Common state: limit bookkeeping plus the key binding of the cluster
/// currently being scanned
#[derive(Debug, Clone)]
pub struct StateBase {
    pub limit: usize,
    pub match_count: usize,
    pub key_offset: i64,
    pub keys: Option<Arc<KeyArray>>,
}

impl StateBase {
    pub fn new(limit: usize) -> Self {
        StateBase {
            limit,
            match_count: 0,
            key_offset: 0,
            keys: None,
        }
    }

    /// Bind the key array of the cluster about to be scanned
    pub fn bind_cluster(&mut self, cluster: &ClusterRef) {
        self.key_offset = cluster.get_offset();
        self.keys = Some(cluster.get_key_array());
    }

    /// Object key of a row in the bound cluster
    pub fn key_at(&self, row: usize) -> ObjKey {
        match &self.keys {
            Some(keys) => ObjKey(self.key_offset + keys.get(row)),
            None => ObjKey(self.key_offset + row as i64),
        }
    }

    pub fn limit_reached(&self) -> bool {
        self.match_count >= self.limit
    }
}

/// Reducer fed by the executor
pub trait AggregateState {
    fn base(&self) -> &StateBase;

    fn base_mut(&mut self) -> &mut StateBase;

    /// Fold in a verified match by key; false requests an early stop
    fn match_key(&mut self, key: ObjKey, value: Option<Value>) -> bool;

    /// Fold in a verified match by row in the bound cluster
    fn match_row(&mut self, row: usize, value: Option<Value>) -> bool {
        let key = self.base().key_at(row);
        self.match_key(key, value)
    }
}

// =============================================================================
// Count
// =============================================================================

/// Counts matches, stopping at the limit
#[derive(Debug, Clone)]
pub struct CountState {
    base: StateBase,
}

impl CountState {
    pub fn new(limit: usize) -> Self {
        CountState {
            base: StateBase::new(limit),
        }
    }

    pub fn count(&self) -> usize {
        self.base.match_count
    }
}

impl AggregateState for CountState {
    fn base(&self) -> &StateBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut StateBase {
        &mut self.base
    }

    fn match_key(&mut self, _key: ObjKey, _value: Option<Value>) -> bool {
        self.base.match_count += 1;
        self.base.match_count < self.base.limit
    }
}

// =============================================================================
// Find
// =============================================================================

/// Records the first match and stops
#[derive(Debug, Clone)]
pub struct FindState {
    base: StateBase,
    found: Option<ObjKey>,
}

impl FindState {
    pub fn new() -> Self {
        FindState {
            base: StateBase::new(1),
            found: None,
        }
    }

    pub fn found(&self) -> Option<ObjKey> {
        self.found
    }
}

impl Default for FindState {
    fn default() -> Self {
        Self::new()
    }
}

impl AggregateState for FindState {
    fn base(&self) -> &StateBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut StateBase {
        &mut self.base
    }

    fn match_key(&mut self, key: ObjKey, _value: Option<Value>) -> bool {
        self.base.match_count += 1;
        self.found = Some(key);
        false
    }
}

// =============================================================================
// FindAll
// =============================================================================

/// Appends matching keys to an output column, stopping at the limit
#[derive(Debug, Clone)]
pub struct FindAllState {
    base: StateBase,
    keys_out: Vec<ObjKey>,
}

impl FindAllState {
    pub fn new(limit: usize) -> Self {
        FindAllState {
            base: StateBase::new(limit),
            keys_out: Vec::new(),
        }
    }

    pub fn into_keys(self) -> Vec<ObjKey> {
        self.keys_out
    }
}

impl AggregateState for FindAllState {
    fn base(&self) -> &StateBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut StateBase {
        &mut self.base
    }

    fn match_key(&mut self, key: ObjKey, _value: Option<Value>) -> bool {
        self.keys_out.push(key);
        self.base.match_count += 1;
        self.base.match_count < self.base.limit
    }
}

// =============================================================================
// Sum / Average
// =============================================================================

/// Widened sum accumulator
///
/// Integer sums fold into i64, float sums into f64, decimal sums into
/// decimal. Nulls are ignored and `match_count` counts only non-null
/// matches, which is what `average` divides by.
#[derive(Debug, Clone, Copy)]
pub enum SumAccum {
    Int(i64),
    Double(f64),
    Decimal(Decimal),
}

#[derive(Debug, Clone)]
pub struct SumState {
    base: StateBase,
    accum: SumAccum,
}

impl SumState {
    pub fn int() -> Self {
        Self::with_accum(SumAccum::Int(0))
    }

    pub fn double() -> Self {
        Self::with_accum(SumAccum::Double(0.0))
    }

    pub fn decimal() -> Self {
        Self::with_accum(SumAccum::Decimal(Decimal::ZERO))
    }

    fn with_accum(accum: SumAccum) -> Self {
        SumState {
            base: StateBase::new(usize::MAX),
            accum,
        }
    }

    pub fn sum_int(&self) -> i64 {
        match self.accum {
            SumAccum::Int(v) => v,
            _ => 0,
        }
    }

    pub fn sum_double(&self) -> f64 {
        match self.accum {
            SumAccum::Double(v) => v,
            _ => 0.0,
        }
    }

    pub fn sum_decimal(&self) -> Decimal {
        match self.accum {
            SumAccum::Decimal(v) => v,
            _ => Decimal::ZERO,
        }
    }

    /// Non-null matches folded so far
    pub fn count(&self) -> usize {
        self.base.match_count
    }

    /// Sum divided by the non-null count; `0 / 0` is zero
    pub fn average_double(&self) -> f64 {
        if self.base.match_count == 0 {
            return 0.0;
        }
        let sum = match self.accum {
            SumAccum::Int(v) => v as f64,
            SumAccum::Double(v) => v,
            SumAccum::Decimal(v) => {
                use rust_decimal::prelude::ToPrimitive;
                v.to_f64().unwrap_or(0.0)
            }
        };
        sum / self.base.match_count as f64
    }

    /// Decimal average; `0 / 0` is zero
    pub fn average_decimal(&self) -> Decimal {
        if self.base.match_count == 0 {
            return Decimal::ZERO;
        }
        self.sum_decimal() / Decimal::from(self.base.match_count as u64)
    }
}

impl AggregateState for SumState {
    fn base(&self) -> &StateBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut StateBase {
        &mut self.base
    }

    fn match_key(&mut self, _key: ObjKey, value: Option<Value>) -> bool {
        let Some(value) = value else {
            return true;
        };
        match (&mut self.accum, value) {
            (SumAccum::Int(acc), Value::Int(v)) => *acc = acc.wrapping_add(v),
            (SumAccum::Double(acc), Value::Float(v)) => *acc += v as f64,
            (SumAccum::Double(acc), Value::Double(v)) => *acc += v,
            (SumAccum::Decimal(acc), Value::Decimal(v)) => *acc += v,
            (_, Value::Null) => return true,
            _ => return true,
        }
        self.base.match_count += 1;
        true
    }
}

// =============================================================================
// Min / Max
// =============================================================================

/// Tracks the running extremum and the key of the row carrying it
///
/// Nulls are ignored; on ties the first matching key wins (traversal
/// order is object-key order).
#[derive(Debug, Clone)]
pub struct MinMaxState {
    base: StateBase,
    want_max: bool,
    best: Option<Value>,
    best_key: Option<ObjKey>,
}

impl MinMaxState {
    pub fn min() -> Self {
        Self::new(false)
    }

    pub fn max() -> Self {
        Self::new(true)
    }

    fn new(want_max: bool) -> Self {
        MinMaxState {
            base: StateBase::new(usize::MAX),
            want_max,
            best: None,
            best_key: None,
        }
    }

    pub fn best(&self) -> Option<&Value> {
        self.best.as_ref()
    }

    /// Key of the extremum, `None` when nothing matched
    pub fn best_key(&self) -> Option<ObjKey> {
        self.best_key
    }
}

impl AggregateState for MinMaxState {
    fn base(&self) -> &StateBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut StateBase {
        &mut self.base
    }

    fn match_key(&mut self, key: ObjKey, value: Option<Value>) -> bool {
        let Some(value) = value else {
            return true;
        };
        if value.is_null() {
            return true;
        }
        self.base.match_count += 1;
        let replace = match &self.best {
            None => true,
            Some(best) => match value.partial_cmp_value(best) {
                Some(std::cmp::Ordering::Greater) => self.want_max,
                Some(std::cmp::Ordering::Less) => !self.want_max,
                _ => false,
            },
        };
        if replace {
            self.best = Some(value);
            self.best_key = Some(key);
        }
        true
    }
}
