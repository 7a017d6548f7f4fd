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

//! Column leaf arrays
//!
//! A leaf is a typed array view over one column's payload within one
//! cluster. Predicate nodes bind a leaf in O(1) by cloning its `Arc`;
//! the leaf holds the column cells for the cluster's dense row range
//! 0..N-1.
//!
//! `find_first` is the inner loop of scanless predicates. For scalar
//! columns without a null mask it runs over the contiguous value slice,
//! which keeps the integer scan friendly to vectorization.

use std::sync::Arc;

use rust_decimal::Decimal;

use crate::core::{CmpOp, ObjKey, ObjectId, Timestamp, Value};

/// Element type stored in a [`ScalarLeaf`]
pub trait ScalarElem: Clone {
    /// Apply a comparison operator to two elements
    fn matches(op: CmpOp, lhs: &Self, rhs: &Self) -> bool;

    /// Convert into a runtime value
    fn into_value(self) -> Value;

    /// Padding stored under a null cell to keep the value run dense
    fn zero() -> Self;
}

impl ScalarElem for i64 {
    fn matches(op: CmpOp, lhs: &Self, rhs: &Self) -> bool {
        op.matches(lhs, rhs)
    }

    fn into_value(self) -> Value {
        Value::Int(self)
    }

    fn zero() -> Self {
        0
    }
}

impl ScalarElem for bool {
    fn matches(op: CmpOp, lhs: &Self, rhs: &Self) -> bool {
        op.matches(lhs, rhs)
    }

    fn into_value(self) -> Value {
        Value::Bool(self)
    }

    fn zero() -> Self {
        false
    }
}

impl ScalarElem for f32 {
    fn matches(op: CmpOp, lhs: &Self, rhs: &Self) -> bool {
        op.matches_f32(*lhs, *rhs)
    }

    fn into_value(self) -> Value {
        Value::Float(self)
    }

    fn zero() -> Self {
        0.0
    }
}

impl ScalarElem for f64 {
    fn matches(op: CmpOp, lhs: &Self, rhs: &Self) -> bool {
        op.matches_f64(*lhs, *rhs)
    }

    fn into_value(self) -> Value {
        Value::Double(self)
    }

    fn zero() -> Self {
        0.0
    }
}

impl ScalarElem for Timestamp {
    fn matches(op: CmpOp, lhs: &Self, rhs: &Self) -> bool {
        op.matches(lhs, rhs)
    }

    fn into_value(self) -> Value {
        Value::Timestamp(self)
    }

    fn zero() -> Self {
        Timestamp::UNIX_EPOCH
    }
}

impl ScalarElem for Decimal {
    fn matches(op: CmpOp, lhs: &Self, rhs: &Self) -> bool {
        op.matches(lhs, rhs)
    }

    fn into_value(self) -> Value {
        Value::Decimal(self)
    }

    fn zero() -> Self {
        Decimal::ZERO
    }
}

impl ScalarElem for ObjectId {
    fn matches(op: CmpOp, lhs: &Self, rhs: &Self) -> bool {
        op.matches(lhs, rhs)
    }

    fn into_value(self) -> Value {
        Value::ObjectId(self)
    }

    fn zero() -> Self {
        ObjectId::from_bytes([0; 12])
    }
}

/// Typed scalar column leaf: dense values plus an optional null mask
///
/// Cells of a non-nullable column live in `values` alone; a nullable
/// column additionally carries a parallel mask. Keeping the values dense
/// lets `find_first` scan a contiguous run.
#[derive(Debug, Clone)]
pub struct ScalarLeaf<T> {
    values: Vec<T>,
    nulls: Option<Vec<bool>>,
}

impl<T: ScalarElem> ScalarLeaf<T> {
    pub fn new(nullable: bool) -> Self {
        ScalarLeaf {
            values: Vec::new(),
            nulls: nullable.then(Vec::new),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn is_null(&self, row: usize) -> bool {
        self.nulls.as_ref().is_some_and(|mask| mask[row])
    }

    /// Cell accessor; `None` for a null cell
    pub fn get(&self, row: usize) -> Option<&T> {
        if self.is_null(row) {
            None
        } else {
            Some(&self.values[row])
        }
    }

    pub fn value_at(&self, row: usize) -> Value {
        match self.get(row) {
            Some(v) => v.clone().into_value(),
            None => Value::Null,
        }
    }

    pub(crate) fn push(&mut self, value: Option<T>) {
        match value {
            Some(v) => {
                if let Some(mask) = &mut self.nulls {
                    mask.push(false);
                }
                self.values.push(v);
            }
            None => {
                if let Some(mask) = &mut self.nulls {
                    mask.push(true);
                }
                self.values.push(T::zero());
            }
        }
    }

    pub(crate) fn set(&mut self, row: usize, value: Option<T>) {
        match value {
            Some(v) => {
                if let Some(mask) = &mut self.nulls {
                    mask[row] = false;
                }
                self.values[row] = v;
            }
            None => {
                if let Some(mask) = &mut self.nulls {
                    mask[row] = true;
                }
                self.values[row] = T::zero();
            }
        }
    }

    pub(crate) fn remove(&mut self, row: usize) {
        self.values.remove(row);
        if let Some(mask) = &mut self.nulls {
            mask.remove(row);
        }
    }

    /// First row in [start, end) matching `op` against `target`
    ///
    /// A `None` target turns Equal into a null test and NotEqual into a
    /// non-null test; ordered operators never match a null target. A
    /// null cell matches a non-null target only under NotEqual.
    pub fn find_first(
        &self,
        op: CmpOp,
        target: Option<&T>,
        start: usize,
        end: usize,
    ) -> Option<usize> {
        let end = end.min(self.values.len());
        if start >= end {
            return None;
        }
        let Some(target) = target else {
            return match op {
                CmpOp::Equal => (start..end).find(|&row| self.is_null(row)),
                CmpOp::NotEqual => (start..end).find(|&row| !self.is_null(row)),
                _ => None,
            };
        };
        match &self.nulls {
            Some(mask) => (start..end).find(|&row| {
                if mask[row] {
                    op == CmpOp::NotEqual
                } else {
                    T::matches(op, &self.values[row], target)
                }
            }),
            // Dense run: let the compiler vectorize the scan
            None => self.values[start..end]
                .iter()
                .position(|cell| T::matches(op, cell, target))
                .map(|pos| pos + start),
        }
    }
}

/// String column leaf
#[derive(Debug, Clone, Default)]
pub struct StringLeaf {
    values: Vec<Option<Arc<str>>>,
}

impl StringLeaf {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn is_null(&self, row: usize) -> bool {
        self.values[row].is_none()
    }

    pub fn get(&self, row: usize) -> Option<&str> {
        self.values[row].as_deref()
    }

    pub fn value_at(&self, row: usize) -> Value {
        match &self.values[row] {
            Some(s) => Value::String(s.clone()),
            None => Value::Null,
        }
    }

    pub(crate) fn push(&mut self, value: Option<Arc<str>>) {
        self.values.push(value);
    }

    pub(crate) fn set(&mut self, row: usize, value: Option<Arc<str>>) {
        self.values[row] = value;
    }

    pub(crate) fn remove(&mut self, row: usize) {
        self.values.remove(row);
    }
}

/// Binary column leaf
#[derive(Debug, Clone, Default)]
pub struct BinaryLeaf {
    values: Vec<Option<Arc<[u8]>>>,
}

impl BinaryLeaf {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn is_null(&self, row: usize) -> bool {
        self.values[row].is_none()
    }

    pub fn get(&self, row: usize) -> Option<&[u8]> {
        self.values[row].as_deref()
    }

    pub fn value_at(&self, row: usize) -> Value {
        match &self.values[row] {
            Some(b) => Value::Binary(b.clone()),
            None => Value::Null,
        }
    }

    pub(crate) fn push(&mut self, value: Option<Arc<[u8]>>) {
        self.values.push(value);
    }

    pub(crate) fn set(&mut self, row: usize, value: Option<Arc<[u8]>>) {
        self.values[row] = value;
    }

    pub(crate) fn remove(&mut self, row: usize) {
        self.values.remove(row);
    }
}

/// Link column leaf: each cell optionally points at a target object
#[derive(Debug, Clone, Default)]
pub struct LinkLeaf {
    targets: Vec<Option<ObjKey>>,
}

impl LinkLeaf {
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn is_null(&self, row: usize) -> bool {
        self.targets[row].is_none()
    }

    pub fn get(&self, row: usize) -> Option<ObjKey> {
        self.targets[row]
    }

    pub fn value_at(&self, row: usize) -> Value {
        match self.targets[row] {
            Some(key) => Value::Link(key),
            None => Value::Null,
        }
    }

    pub(crate) fn push(&mut self, value: Option<ObjKey>) {
        self.targets.push(value);
    }

    pub(crate) fn set(&mut self, row: usize, value: Option<ObjKey>) {
        self.targets[row] = value;
    }

    pub(crate) fn remove(&mut self, row: usize) {
        self.targets.remove(row);
    }
}

/// List column leaf: each cell is an optional list of element values
#[derive(Debug, Clone, Default)]
pub struct ListLeaf {
    items: Vec<Option<Arc<Vec<Value>>>>,
}

impl ListLeaf {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_null(&self, row: usize) -> bool {
        self.items[row].is_none()
    }

    pub fn get(&self, row: usize) -> Option<&[Value]> {
        self.items[row].as_ref().map(|list| list.as_slice())
    }

    /// List arity at `row`; `None` for a null cell
    pub fn list_len(&self, row: usize) -> Option<usize> {
        self.items[row].as_ref().map(|list| list.len())
    }

    pub fn value_at(&self, row: usize) -> Value {
        match &self.items[row] {
            Some(list) => Value::List(list.clone()),
            None => Value::Null,
        }
    }

    pub(crate) fn push(&mut self, value: Option<Arc<Vec<Value>>>) {
        self.items.push(value);
    }

    pub(crate) fn set(&mut self, row: usize, value: Option<Arc<Vec<Value>>>) {
        self.items[row] = value;
    }

    pub(crate) fn remove(&mut self, row: usize) {
        self.items.remove(row);
    }
}

/// Key array of a cluster: per-row key values relative to the cluster
/// offset, strictly increasing
#[derive(Debug, Clone, Default)]
pub struct KeyArray {
    keys: Vec<i64>,
}

impl KeyArray {
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn get(&self, row: usize) -> i64 {
        self.keys[row]
    }

    /// First row whose key value is >= `key`
    pub fn lower_bound(&self, key: i64) -> usize {
        self.keys.partition_point(|&k| k < key)
    }

    pub(crate) fn push(&mut self, key: i64) {
        debug_assert!(self.keys.last().map_or(true, |&last| last < key));
        self.keys.push(key);
    }

    pub(crate) fn remove(&mut self, row: usize) {
        self.keys.remove(row);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nullable_ints(cells: &[Option<i64>]) -> ScalarLeaf<i64> {
        let mut leaf = ScalarLeaf::new(true);
        for cell in cells {
            leaf.push(*cell);
        }
        leaf
    }

    #[test]
    fn find_first_dense_run() {
        let mut leaf = ScalarLeaf::<i64>::new(false);
        for v in [5, 7, 7, 9] {
            leaf.push(Some(v));
        }
        assert_eq!(leaf.find_first(CmpOp::Equal, Some(&7), 0, 4), Some(1));
        assert_eq!(leaf.find_first(CmpOp::Equal, Some(&7), 2, 4), Some(2));
        assert_eq!(leaf.find_first(CmpOp::Greater, Some(&7), 0, 4), Some(3));
        assert_eq!(leaf.find_first(CmpOp::Equal, Some(&8), 0, 4), None);
    }

    #[test]
    fn find_first_null_rules() {
        let leaf = nullable_ints(&[Some(30), Some(40), None, Some(40)]);
        // Null target: Equal is a null test, NotEqual the inverse
        assert_eq!(leaf.find_first(CmpOp::Equal, None, 0, 4), Some(2));
        assert_eq!(leaf.find_first(CmpOp::NotEqual, None, 2, 4), Some(3));
        assert_eq!(leaf.find_first(CmpOp::Greater, None, 0, 4), None);
        // Null cell matches a non-null target only under NotEqual
        assert_eq!(leaf.find_first(CmpOp::NotEqual, Some(&30), 1, 3), Some(1));
        assert_eq!(leaf.find_first(CmpOp::NotEqual, Some(&40), 2, 3), Some(2));
        assert_eq!(leaf.find_first(CmpOp::Greater, Some(&35), 2, 3), None);
    }

    #[test]
    fn key_array_lower_bound() {
        let mut keys = KeyArray::default();
        for k in [0, 2, 5, 9] {
            keys.push(k);
        }
        assert_eq!(keys.lower_bound(0), 0);
        assert_eq!(keys.lower_bound(3), 2);
        assert_eq!(keys.lower_bound(10), 4);
    }
}
