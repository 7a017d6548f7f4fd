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

//! Core type definitions for Quarry
//!
//! This module defines the fundamental handles: [`DataType`], [`ColKey`],
//! [`ObjKey`] and the scalar comparison operator [`CmpOp`].

use std::cmp::Ordering;
use std::fmt;

/// Column data types supported by the engine
///
/// List columns carry the element type here and the `LIST` attribute on
/// their [`ColKey`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DataType {
    /// 64-bit signed integer
    Int = 0,

    /// Boolean true/false
    Bool = 1,

    /// UTF-8 text string
    String = 2,

    /// Raw byte string
    Binary = 3,

    /// Timestamp (stored as UTC)
    Timestamp = 4,

    /// 32-bit floating point number
    Float = 5,

    /// 64-bit floating point number
    Double = 6,

    /// 128-bit decimal number
    Decimal = 7,

    /// 12-byte object identifier
    ObjectId = 8,

    /// Link to an object in a target table
    Link = 9,
}

impl DataType {
    /// Returns true if this type is numeric
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            DataType::Int | DataType::Float | DataType::Double | DataType::Decimal
        )
    }

    /// Returns the type tag as u8 for key packing
    pub fn as_u8(&self) -> u8 {
        *self as u8
    }

    /// Create DataType from its u8 tag
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(DataType::Int),
            1 => Some(DataType::Bool),
            2 => Some(DataType::String),
            3 => Some(DataType::Binary),
            4 => Some(DataType::Timestamp),
            5 => Some(DataType::Float),
            6 => Some(DataType::Double),
            7 => Some(DataType::Decimal),
            8 => Some(DataType::ObjectId),
            9 => Some(DataType::Link),
            _ => None,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Int => write!(f, "int"),
            DataType::Bool => write!(f, "bool"),
            DataType::String => write!(f, "string"),
            DataType::Binary => write!(f, "binary"),
            DataType::Timestamp => write!(f, "timestamp"),
            DataType::Float => write!(f, "float"),
            DataType::Double => write!(f, "double"),
            DataType::Decimal => write!(f, "decimal"),
            DataType::ObjectId => write!(f, "objectId"),
            DataType::Link => write!(f, "link"),
        }
    }
}

/// Column attribute bit mask carried in the upper bits of a [`ColKey`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ColumnAttrs(u8);

impl ColumnAttrs {
    pub const NULLABLE: ColumnAttrs = ColumnAttrs(1);
    pub const LIST: ColumnAttrs = ColumnAttrs(2);
    pub const INDEXED: ColumnAttrs = ColumnAttrs(4);

    /// Empty attribute set
    pub fn none() -> Self {
        ColumnAttrs(0)
    }

    /// Combine two attribute sets
    pub fn with(self, other: ColumnAttrs) -> Self {
        ColumnAttrs(self.0 | other.0)
    }

    /// Test whether all bits of `other` are set
    pub fn contains(self, other: ColumnAttrs) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn as_u8(self) -> u8 {
        self.0
    }

    pub fn from_u8(bits: u8) -> Self {
        ColumnAttrs(bits)
    }
}

/// 64-bit column handle
///
/// Packs the dense leaf index (low 24 bits), the [`DataType`] tag
/// (next 8 bits) and the [`ColumnAttrs`] mask (next 8 bits). The leaf
/// index addresses the per-cluster leaf slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColKey(u64);

const COL_INDEX_BITS: u32 = 24;
const COL_TYPE_SHIFT: u32 = COL_INDEX_BITS;
const COL_ATTR_SHIFT: u32 = COL_INDEX_BITS + 8;

impl ColKey {
    /// Pack a column handle from its parts
    pub fn new(leaf_index: usize, data_type: DataType, attrs: ColumnAttrs) -> Self {
        debug_assert!(leaf_index < (1 << COL_INDEX_BITS));
        ColKey(
            (leaf_index as u64)
                | ((data_type.as_u8() as u64) << COL_TYPE_SHIFT)
                | ((attrs.as_u8() as u64) << COL_ATTR_SHIFT),
        )
    }

    /// Dense leaf index used to address per-cluster leaf slots
    pub fn leaf_index(self) -> usize {
        (self.0 & ((1 << COL_INDEX_BITS) - 1)) as usize
    }

    /// The column's data type tag
    pub fn data_type(self) -> DataType {
        DataType::from_u8(((self.0 >> COL_TYPE_SHIFT) & 0xff) as u8)
            .expect("ColKey carries a valid type tag")
    }

    /// The column's attribute mask
    pub fn attrs(self) -> ColumnAttrs {
        ColumnAttrs::from_u8(((self.0 >> COL_ATTR_SHIFT) & 0xff) as u8)
    }

    pub fn is_nullable(self) -> bool {
        self.attrs().contains(ColumnAttrs::NULLABLE)
    }

    pub fn is_list(self) -> bool {
        self.attrs().contains(ColumnAttrs::LIST)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

/// 64-bit stable object identity
///
/// The high bit is reserved to mark unresolved (tombstone) keys. A key
/// resolves to `cluster offset + key_array[row]` during traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjKey(pub i64);

impl ObjKey {
    const UNRESOLVED_BIT: u64 = 1 << 63;

    pub fn value(self) -> i64 {
        self.0
    }

    /// Whether this key marks an unresolved object
    pub fn is_unresolved(self) -> bool {
        (self.0 as u64) & Self::UNRESOLVED_BIT != 0
    }
}

impl fmt::Display for ObjKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "O{}", self.0)
    }
}

/// Scalar comparison operator
///
/// Matchers implement the engine's null and NaN rules: equality is
/// null-safe and compares floats by bit pattern; ordered comparisons
/// follow IEEE-754 and never match a null operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CmpOp {
    Equal = 0,
    NotEqual = 1,
    Less = 2,
    LessEqual = 3,
    Greater = 4,
    GreaterEqual = 5,
}

impl CmpOp {
    /// Infix symbol used by query descriptions
    pub fn symbol(self) -> &'static str {
        match self {
            CmpOp::Equal => "==",
            CmpOp::NotEqual => "!=",
            CmpOp::Less => "<",
            CmpOp::LessEqual => "<=",
            CmpOp::Greater => ">",
            CmpOp::GreaterEqual => ">=",
        }
    }

    /// Whether this operator is an equality form
    pub fn is_equality(self) -> bool {
        matches!(self, CmpOp::Equal | CmpOp::NotEqual)
    }

    /// Apply to a total ordering
    pub fn matches_ordering(self, ord: Ordering) -> bool {
        match self {
            CmpOp::Equal => ord == Ordering::Equal,
            CmpOp::NotEqual => ord != Ordering::Equal,
            CmpOp::Less => ord == Ordering::Less,
            CmpOp::LessEqual => ord != Ordering::Greater,
            CmpOp::Greater => ord == Ordering::Greater,
            CmpOp::GreaterEqual => ord != Ordering::Less,
        }
    }

    /// Apply to values with a total order
    pub fn matches<T: Ord>(self, lhs: &T, rhs: &T) -> bool {
        self.matches_ordering(lhs.cmp(rhs))
    }

    /// Apply to a partial ordering; `None` (incomparable) never matches
    pub fn matches_partial(self, ord: Option<Ordering>) -> bool {
        match ord {
            Some(ord) => self.matches_ordering(ord),
            None => false,
        }
    }

    /// f64 comparison: bit patterns under equality, IEEE-754 order otherwise
    pub fn matches_f64(self, lhs: f64, rhs: f64) -> bool {
        match self {
            CmpOp::Equal => lhs.to_bits() == rhs.to_bits(),
            CmpOp::NotEqual => lhs.to_bits() != rhs.to_bits(),
            _ => self.matches_partial(lhs.partial_cmp(&rhs)),
        }
    }

    /// f32 comparison: bit patterns under equality, IEEE-754 order otherwise
    pub fn matches_f32(self, lhs: f32, rhs: f32) -> bool {
        match self {
            CmpOp::Equal => lhs.to_bits() == rhs.to_bits(),
            CmpOp::NotEqual => lhs.to_bits() != rhs.to_bits(),
            _ => self.matches_partial(lhs.partial_cmp(&rhs)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn col_key_round_trip() {
        let attrs = ColumnAttrs::NULLABLE.with(ColumnAttrs::LIST);
        let key = ColKey::new(42, DataType::String, attrs);
        assert_eq!(key.leaf_index(), 42);
        assert_eq!(key.data_type(), DataType::String);
        assert!(key.is_nullable());
        assert!(key.is_list());
        assert!(!key.attrs().contains(ColumnAttrs::INDEXED));
    }

    #[test]
    fn obj_key_unresolved_bit() {
        assert!(!ObjKey(17).is_unresolved());
        assert!(ObjKey(i64::MIN).is_unresolved());
    }

    #[test]
    fn nan_equality_uses_bit_patterns() {
        let nan = f64::NAN;
        assert!(CmpOp::Equal.matches_f64(nan, nan));
        assert!(!CmpOp::Less.matches_f64(nan, 1.0));
        assert!(!CmpOp::Greater.matches_f64(nan, 1.0));
        assert!(CmpOp::NotEqual.matches_f64(nan, -nan));
    }

    #[test]
    fn ordering_matchers() {
        assert!(CmpOp::LessEqual.matches(&3, &3));
        assert!(CmpOp::Greater.matches(&4, &3));
        assert!(!CmpOp::Less.matches(&4, &3));
    }
}
