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

//! Query building and execution
//!
//! [`Query`] owns the predicate tree and drives both sides of the
//! engine: the fluent builder (a per-group state machine handling
//! grouping, disjunction and negation) and the executor (cluster
//! traversal with cost-driven node selection, an index fast path, and
//! a view path).
//!
//! Builder errors are recorded eagerly and surfaced by [`Query::validate`]
//! or the first terminal operation; a query never panics on bad input.

use std::mem;
use std::ops::{BitAnd, BitOr, Not};
use std::sync::Arc;

use rust_decimal::Decimal;

use crate::core::{CmpOp, ColKey, DataType, Error, ObjKey, Result, Timestamp, Value};
use crate::storage::cluster::ColumnLeaf;
use crate::storage::table::{Table, WeakTable};
use crate::storage::view::View;

use super::conditions::StrOp;
use super::describe::{DescribeCx, TRUE_PREDICATE};
use super::nodes::logical::{NotNode, OrNode};
use super::nodes::relation::{
    ExpressionNode, LinksToNode, RowExpression, SizeListNode, SizeNode, TwoColumnsNode,
};
use super::nodes::scalar::{
    BinaryNode, BoolNode, DecimalNode, DoubleNode, FloatNode, IntegerNode, ObjectIdNode,
    TimestampNode,
};
use super::nodes::string::StringNode;
use super::nodes::{AndNode, NodeBox, QueryNode};
use super::planner::PlannerConfig;
use super::state::{
    AggregateState, CountState, FindAllState, FindState, MinMaxState, SumState,
};

/// Builder state of one group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum GroupState {
    #[default]
    Default,
    /// An OrNode was just installed; the next condition opens a branch
    OrCondition,
    /// Conditions extend the OrNode's last branch
    OrConditionChildren,
}

#[derive(Debug, Clone, Default)]
struct QueryGroup {
    root: Option<NodeBox>,
    state: GroupState,
    pending_not: bool,
}

/// A declarative query over one table
///
/// Built fluently, executed by the terminal operations. Cloning
/// produces an independent predicate tree sharing the table.
#[derive(Debug, Clone)]
pub struct Query {
    table: WeakTable,
    groups: Vec<QueryGroup>,
    error: Option<Error>,
    view: Option<View>,
    config: PlannerConfig,
}

impl Table {
    /// Start building a query against this table
    pub fn query(&self) -> Query {
        Query::new(self)
    }
}

impl Query {
    pub fn new(table: &Table) -> Self {
        Query {
            table: table.downgrade(),
            groups: vec![QueryGroup::default()],
            error: None,
            view: None,
            config: PlannerConfig::default(),
        }
    }

    /// Build a query constrained to a view's key sequence
    pub fn on_view(view: &View) -> Self {
        let mut query = Query::new(view.table());
        query.view = Some(view.clone());
        query
    }

    /// Override the executor's tuning constants
    pub fn with_planner_config(mut self, config: PlannerConfig) -> Self {
        self.config = config;
        self
    }

    /// Fresh query over the same table, carrying the same tuning
    fn like_self(&self) -> Query {
        Query {
            table: self.table.clone(),
            groups: vec![QueryGroup::default()],
            error: None,
            view: None,
            config: self.config,
        }
    }

    // =========================================================================
    // Group state machine
    // =========================================================================

    fn record_error(&mut self, error: Error) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    fn add_node(&mut self, node: NodeBox) {
        let Some(group) = self.groups.last_mut() else {
            return;
        };
        match group.state {
            GroupState::OrCondition => {
                match group
                    .root
                    .as_mut()
                    .and_then(|r| r.as_any_mut().downcast_mut::<OrNode>())
                {
                    Some(or) => {
                        or.add_branch(node);
                        group.state = GroupState::OrConditionChildren;
                    }
                    None => attach_and(group, node),
                }
            }
            GroupState::OrConditionChildren => {
                match group
                    .root
                    .as_mut()
                    .and_then(|r| r.as_any_mut().downcast_mut::<OrNode>())
                    .and_then(|or| or.last_branch_mut())
                {
                    Some(branch) => branch.add_child(node),
                    None => attach_and(group, node),
                }
            }
            GroupState::Default => attach_and(group, node),
        }
        self.handle_pending_not();
    }

    /// Close the implicit group a `not` opened, once its term arrived
    fn handle_pending_not(&mut self) {
        let pending = self.groups.len() > 1
            && self.groups.last().map_or(false, |g| g.pending_not);
        if !pending {
            return;
        }
        let root = match self.groups.last_mut() {
            Some(group) => {
                group.pending_not = false;
                group.root.take()
            }
            None => None,
        };
        if let Some(root) = root {
            let not_node: NodeBox = Box::new(NotNode::new(root));
            self.add_node(not_node);
        }
        self.end_group_impl();
    }

    /// Open a nested group; conditions added until `end_group` form one
    /// term of the enclosing group
    pub fn group(mut self) -> Self {
        self.groups.push(QueryGroup::default());
        self
    }

    /// Close the innermost group
    pub fn end_group(mut self) -> Self {
        self.end_group_impl();
        self
    }

    fn end_group_impl(&mut self) {
        if self.groups.len() < 2 {
            self.record_error(Error::UnbalancedGroup);
            return;
        }
        let frame = self.groups.pop();
        if let Some(root) = frame.and_then(|f| f.root) {
            self.add_node(root);
        }
        self.handle_pending_not();
    }

    /// Turn the current group into a disjunction; the next condition
    /// starts a new branch
    pub fn or(mut self) -> Self {
        let needs_reparent = self
            .groups
            .last()
            .map_or(false, |g| g.state != GroupState::OrConditionChildren);
        if needs_reparent {
            // Reparent the group's conditions under an OrNode
            let root = self.groups.last_mut().and_then(|g| g.root.take());
            let or_node: NodeBox = Box::new(OrNode::new(root));
            self.add_node(or_node);
        }
        if let Some(group) = self.groups.last_mut() {
            group.state = GroupState::OrCondition;
        }
        self
    }

    /// Negate the next term; opens an implicit group
    pub fn not(mut self) -> Self {
        self.groups.push(QueryGroup {
            pending_not: true,
            ..QueryGroup::default()
        });
        self
    }

    /// AND another query's predicate tree into this one
    pub fn and_query(mut self, other: Query) -> Self {
        if let Some(error) = other.error {
            self.record_error(error);
        }
        if let Some(root) = other.groups.into_iter().next().and_then(|g| g.root) {
            self.add_node(root);
        }
        self
    }

    // =========================================================================
    // Condition surface
    // =========================================================================

    pub fn equal(self, col: ColKey, value: impl Into<Value>) -> Self {
        self.add_cmp(col, CmpOp::Equal, value.into())
    }

    pub fn not_equal(self, col: ColKey, value: impl Into<Value>) -> Self {
        self.add_cmp(col, CmpOp::NotEqual, value.into())
    }

    pub fn less(self, col: ColKey, value: impl Into<Value>) -> Self {
        self.add_cmp(col, CmpOp::Less, value.into())
    }

    pub fn greater(self, col: ColKey, value: impl Into<Value>) -> Self {
        self.add_cmp(col, CmpOp::Greater, value.into())
    }

    /// `col >= value`; `>= i64::MIN` is a tautology and adds nothing
    pub fn greater_equal(self, col: ColKey, value: impl Into<Value>) -> Self {
        let value = value.into();
        if col.data_type() == DataType::Int {
            if let Value::Int(v) = value {
                if v > i64::MIN {
                    return self.add_cmp(col, CmpOp::Greater, Value::Int(v - 1));
                }
                return self;
            }
        }
        self.add_cmp(col, CmpOp::GreaterEqual, value)
    }

    /// `col <= value`; `<= i64::MAX` is a tautology and adds nothing
    pub fn less_equal(self, col: ColKey, value: impl Into<Value>) -> Self {
        let value = value.into();
        if col.data_type() == DataType::Int {
            if let Value::Int(v) = value {
                if v < i64::MAX {
                    return self.add_cmp(col, CmpOp::Less, Value::Int(v + 1));
                }
                return self;
            }
        }
        self.add_cmp(col, CmpOp::LessEqual, value)
    }

    /// `lo <= col <= hi`, grouped; empty when `lo > hi`
    pub fn between(self, col: ColKey, lo: impl Into<Value>, hi: impl Into<Value>) -> Self {
        self.group()
            .greater_equal(col, lo)
            .less_equal(col, hi)
            .end_group()
    }

    pub fn equal_string(
        self,
        col: ColKey,
        value: Option<&str>,
        case_sensitive: bool,
    ) -> Self {
        self.add_string(col, StrOp::Equal, value, case_sensitive)
    }

    pub fn not_equal_string(
        self,
        col: ColKey,
        value: Option<&str>,
        case_sensitive: bool,
    ) -> Self {
        self.add_string(col, StrOp::NotEqual, value, case_sensitive)
    }

    pub fn begins_with(self, col: ColKey, value: &str, case_sensitive: bool) -> Self {
        self.add_string(col, StrOp::BeginsWith, Some(value), case_sensitive)
    }

    pub fn ends_with(self, col: ColKey, value: &str, case_sensitive: bool) -> Self {
        self.add_string(col, StrOp::EndsWith, Some(value), case_sensitive)
    }

    pub fn contains(self, col: ColKey, value: &str, case_sensitive: bool) -> Self {
        self.add_string(col, StrOp::Contains, Some(value), case_sensitive)
    }

    pub fn like(self, col: ColKey, pattern: &str, case_sensitive: bool) -> Self {
        self.add_string(col, StrOp::Like, Some(pattern), case_sensitive)
    }

    pub fn size_equal(self, col: ColKey, size: i64) -> Self {
        self.add_size(col, CmpOp::Equal, size)
    }

    pub fn size_not_equal(self, col: ColKey, size: i64) -> Self {
        self.add_size(col, CmpOp::NotEqual, size)
    }

    pub fn size_greater(self, col: ColKey, size: i64) -> Self {
        self.add_size(col, CmpOp::Greater, size)
    }

    pub fn size_greater_equal(self, col: ColKey, size: i64) -> Self {
        self.add_size(col, CmpOp::GreaterEqual, size)
    }

    pub fn size_less(self, col: ColKey, size: i64) -> Self {
        self.add_size(col, CmpOp::Less, size)
    }

    pub fn size_less_equal(self, col: ColKey, size: i64) -> Self {
        self.add_size(col, CmpOp::LessEqual, size)
    }

    pub fn size_between(self, col: ColKey, lo: i64, hi: i64) -> Self {
        self.group()
            .add_size(col, CmpOp::GreaterEqual, lo)
            .add_size(col, CmpOp::LessEqual, hi)
            .end_group()
    }

    /// The link column points at `target`
    pub fn links_to(self, col: ColKey, target: ObjKey) -> Self {
        self.links_to_any(col, [target])
    }

    /// The link column points at any of `targets`
    pub fn links_to_any(
        mut self,
        col: ColKey,
        targets: impl IntoIterator<Item = ObjKey>,
    ) -> Self {
        if !self.check_col(col, DataType::Link) {
            return self;
        }
        self.add_node(Box::new(LinksToNode::new(col, targets)));
        self
    }

    pub fn equal_columns(self, col1: ColKey, col2: ColKey) -> Self {
        self.add_two_columns(col1, col2, CmpOp::Equal)
    }

    pub fn not_equal_columns(self, col1: ColKey, col2: ColKey) -> Self {
        self.add_two_columns(col1, col2, CmpOp::NotEqual)
    }

    pub fn less_columns(self, col1: ColKey, col2: ColKey) -> Self {
        self.add_two_columns(col1, col2, CmpOp::Less)
    }

    pub fn less_equal_columns(self, col1: ColKey, col2: ColKey) -> Self {
        self.add_two_columns(col1, col2, CmpOp::LessEqual)
    }

    pub fn greater_columns(self, col1: ColKey, col2: ColKey) -> Self {
        self.add_two_columns(col1, col2, CmpOp::Greater)
    }

    pub fn greater_equal_columns(self, col1: ColKey, col2: ColKey) -> Self {
        self.add_two_columns(col1, col2, CmpOp::GreaterEqual)
    }

    /// Attach a user-supplied row predicate
    pub fn expression(mut self, expression: Box<dyn RowExpression>) -> Self {
        self.add_node(Box::new(ExpressionNode::new(expression)));
        self
    }

    // =========================================================================
    // Condition plumbing
    // =========================================================================

    /// Check that `col` exists on the base table; records the error and
    /// returns false otherwise
    fn check_col_exists(&mut self, col: ColKey) -> bool {
        match self.table.upgrade() {
            Ok(table) => {
                if col.leaf_index() < table.column_count() {
                    true
                } else {
                    self.record_error(Error::NoSuchColumn(format!("#{}", col.leaf_index())));
                    false
                }
            }
            Err(error) => {
                self.record_error(error);
                false
            }
        }
    }

    fn check_col(&mut self, col: ColKey, expected: DataType) -> bool {
        if !self.check_col_exists(col) {
            return false;
        }
        if col.is_list() || col.data_type() != expected {
            self.record_type_mismatch(col, expected);
            return false;
        }
        true
    }

    fn record_type_mismatch(&mut self, col: ColKey, got: DataType) {
        let column = self
            .table
            .upgrade()
            .ok()
            .and_then(|t| t.col_name(col).ok())
            .unwrap_or_else(|| format!("#{}", col.leaf_index()));
        self.record_error(Error::TypeMismatch {
            column,
            expected: col.data_type(),
            got,
        });
    }

    fn add_cmp(mut self, col: ColKey, op: CmpOp, value: Value) -> Self {
        if !self.check_col_exists(col) {
            return self;
        }
        if col.is_list() {
            self.record_type_mismatch(col, value.data_type().unwrap_or(DataType::Int));
            return self;
        }
        let node = self.make_scalar_node(col, op, value);
        if let Some(node) = node {
            self.add_node(node);
        }
        self
    }

    /// Build the typed node for `col op value`; records a type error
    /// and returns `None` when the value does not fit the column
    fn make_scalar_node(&mut self, col: ColKey, op: CmpOp, value: Value) -> Option<NodeBox> {
        let got = value_type_of(&value);
        let node: Option<NodeBox> = match col.data_type() {
            DataType::Int => match value {
                Value::Int(v) => Some(Box::new(IntegerNode::new(col, op, Some(v)))),
                Value::Null => Some(Box::new(IntegerNode::new(col, op, None))),
                _ => None,
            },
            DataType::Bool => match (op.is_equality(), value) {
                (true, Value::Bool(v)) => Some(Box::new(BoolNode::new(col, op, Some(v)))),
                (true, Value::Null) => Some(Box::new(BoolNode::new(col, op, None))),
                _ => None,
            },
            DataType::Float => match value {
                Value::Float(v) => Some(Box::new(FloatNode::new(col, op, Some(v)))),
                Value::Null => Some(Box::new(FloatNode::new(col, op, None))),
                _ => None,
            },
            DataType::Double => match value {
                Value::Double(v) => Some(Box::new(DoubleNode::new(col, op, Some(v)))),
                Value::Null => Some(Box::new(DoubleNode::new(col, op, None))),
                _ => None,
            },
            DataType::Timestamp => match value {
                Value::Timestamp(v) => Some(Box::new(TimestampNode::new(col, op, Some(v)))),
                Value::Null => Some(Box::new(TimestampNode::new(col, op, None))),
                _ => None,
            },
            DataType::Decimal => match value {
                Value::Decimal(v) => Some(Box::new(DecimalNode::new(col, op, Some(v)))),
                Value::Null => Some(Box::new(DecimalNode::new(col, op, None))),
                _ => None,
            },
            DataType::ObjectId => match value {
                Value::ObjectId(v) => Some(Box::new(ObjectIdNode::new(col, op, Some(v)))),
                Value::Null => Some(Box::new(ObjectIdNode::new(col, op, None))),
                _ => None,
            },
            DataType::Binary => match value {
                Value::Binary(v) => Some(Box::new(BinaryNode::new(col, op, Some(v)))),
                Value::Null => Some(Box::new(BinaryNode::new(col, op, None))),
                _ => None,
            },
            DataType::String => {
                let str_op = match op {
                    CmpOp::Equal => Some(StrOp::Equal),
                    CmpOp::NotEqual => Some(StrOp::NotEqual),
                    _ => None,
                };
                match (str_op, value) {
                    (Some(str_op), Value::String(s)) => {
                        Some(Box::new(StringNode::new(col, str_op, Some(s), true)))
                    }
                    (Some(str_op), Value::Null) => {
                        Some(Box::new(StringNode::new(col, str_op, None, true)))
                    }
                    _ => None,
                }
            }
            DataType::Link => match (op, value) {
                (CmpOp::Equal, Value::Link(key)) => {
                    Some(Box::new(LinksToNode::new(col, [key])))
                }
                _ => None,
            },
        };
        if node.is_none() {
            self.record_type_mismatch(col, got);
        }
        node
    }

    fn add_string(
        mut self,
        col: ColKey,
        op: StrOp,
        value: Option<&str>,
        case_sensitive: bool,
    ) -> Self {
        if !self.check_col(col, DataType::String) {
            return self;
        }
        let value: Option<Arc<str>> = value.map(Arc::from);
        self.add_node(Box::new(StringNode::new(col, op, value, case_sensitive)));
        self
    }

    fn add_size(mut self, col: ColKey, op: CmpOp, size: i64) -> Self {
        if !self.check_col_exists(col) {
            return self;
        }
        if col.is_list() {
            self.add_node(Box::new(SizeListNode::new(col, op, size)));
            return self;
        }
        match col.data_type() {
            DataType::String | DataType::Binary => {
                self.add_node(Box::new(SizeNode::new(col, op, size)));
            }
            other => self.record_type_mismatch(col, other),
        }
        self
    }

    fn add_two_columns(mut self, col1: ColKey, col2: ColKey, op: CmpOp) -> Self {
        if !self.check_col_exists(col1) || !self.check_col_exists(col2) {
            return self;
        }
        if col1.is_list() || col2.is_list() || col1.data_type() != col2.data_type() {
            self.record_type_mismatch(col2, col1.data_type());
            return self;
        }
        self.add_node(Box::new(TwoColumnsNode::new(col1, col2, op)));
        self
    }

    // =========================================================================
    // Execution plumbing
    // =========================================================================

    fn root_node(&self) -> Option<&NodeBox> {
        self.groups.first().and_then(|g| g.root.as_ref())
    }

    /// Whether the user added any condition
    pub fn has_conditions(&self) -> bool {
        self.root_node().is_some()
    }

    /// Surface the first recorded error; empty when well formed
    pub fn validate(&self) -> String {
        if let Some(error) = &self.error {
            return error.to_string();
        }
        if self.groups.len() > 1 {
            return Error::UnbalancedGroup.to_string();
        }
        self.root_node()
            .and_then(|root| root.validate())
            .unwrap_or_default()
    }

    /// Infix textual form of the predicate tree
    ///
    /// The empty query serializes to `TRUEPREDICATE`; a view-bound
    /// query cannot be serialized.
    pub fn get_description(&self) -> Result<String> {
        if self.view.is_some() {
            return Err(Error::SerialisationUnsupported);
        }
        let cx = DescribeCx::new(self.table.upgrade().ok());
        match self.root_node() {
            Some(root) => Ok(root.describe(&cx)),
            None => Ok(TRUE_PREDICATE.to_string()),
        }
    }

    /// Check the query, bind the table and reset per-execution state
    fn prepare(&mut self) -> Result<Table> {
        if let Some(error) = &self.error {
            return Err(error.clone());
        }
        if self.groups.len() != 1 {
            return Err(Error::UnbalancedGroup);
        }
        let table = self.table.upgrade()?;
        if let Some(view) = &mut self.view {
            view.sync_if_needed();
        }
        if let Some(root) = self.groups[0].root.as_mut() {
            ensure_and(root);
            root.init(&table);
        }
        Ok(table)
    }

    fn root_and_mut(&mut self) -> Option<&mut AndNode> {
        self.groups
            .first_mut()
            .and_then(|g| g.root.as_mut())
            .and_then(|r| r.as_any_mut().downcast_mut::<AndNode>())
    }

    // =========================================================================
    // Terminal operations
    // =========================================================================

    /// Key of the first matching object
    pub fn find(&mut self) -> Result<Option<ObjKey>> {
        let table = self.prepare()?;
        if !self.has_conditions() {
            if let Some(view) = &self.view {
                return Ok(view.get_key(0));
            }
            return Ok(table.object_at(0).map(|obj| obj.key()));
        }
        if let Some(view) = self.view.clone() {
            let Some(root) = self.root_and_mut() else {
                return Ok(None);
            };
            for key in view.iter() {
                if eval_key(root, &table, key) {
                    return Ok(Some(key));
                }
            }
            return Ok(None);
        }
        let config = self.config;
        let Some(root) = self.root_and_mut() else {
            return Ok(None);
        };
        let mut st = FindState::new();
        table.traverse_clusters(|cluster| {
            root.set_cluster(cluster);
            st.base_mut().bind_cluster(cluster);
            aggregate_internal(root, &mut st, 0, cluster.node_size(), None, &config);
            st.found().is_some()
        });
        Ok(st.found())
    }

    /// All matching keys, in object-key order
    pub fn find_all(&mut self) -> Result<View> {
        self.find_all_with(0, None, usize::MAX)
    }

    /// Matching keys within the table row window [begin, end), capped
    /// at `limit`
    pub fn find_all_with(
        &mut self,
        begin: usize,
        end: Option<usize>,
        limit: usize,
    ) -> Result<View> {
        let table = self.prepare()?;
        let mut keys: Vec<ObjKey> = Vec::new();
        if limit == 0 {
            return Ok(View::new(table, keys));
        }

        if let Some(view) = self.view.clone() {
            let upper = end.unwrap_or(view.len()).min(view.len());
            let mut root = self.root_and_mut();
            for pos in begin..upper {
                if keys.len() >= limit {
                    break;
                }
                let Some(key) = view.get_key(pos) else {
                    break;
                };
                let matched = match root.as_mut() {
                    Some(root) => eval_key(root, &table, key),
                    None => true,
                };
                if matched {
                    keys.push(key);
                }
            }
            return Ok(View::new(table, keys));
        }

        let total = table.size();
        let end = end.unwrap_or(total);

        if !self.has_conditions() {
            let mut begin = begin;
            let mut end_rem = end;
            let mut remaining = limit;
            table.traverse_clusters(|cluster| {
                let size = cluster.node_size();
                if begin < size {
                    let upper = size.min(end_rem);
                    for row in begin..upper {
                        if remaining == 0 {
                            break;
                        }
                        keys.push(cluster.get_real_key(row));
                        remaining -= 1;
                    }
                    begin = 0;
                } else {
                    begin -= size;
                }
                end_rem = end_rem.saturating_sub(size);
                end_rem == 0 || remaining == 0
            });
            return Ok(View::new(table, keys));
        }

        let config = self.config;
        let Some(root) = self.root_and_mut() else {
            return Ok(View::new(table, keys));
        };

        let best = root.best_child();
        if root.children()[best].has_search_index() {
            // Translate the row window into key bounds:
            // inclusive-lower, exclusive-upper
            let begin_key = (begin < total)
                .then(|| table.object_at(begin).map(|obj| obj.key()))
                .flatten();
            let end_key = (end < total)
                .then(|| table.object_at(end).map(|obj| obj.key()))
                .flatten();
            let mut driver = root.remove_child(best);
            driver.index_based_aggregate(limit, &table, &mut |obj| {
                let key = obj.key();
                if begin_key.map_or(false, |lower| key < lower) {
                    return false;
                }
                if end_key.map_or(false, |upper| key >= upper) {
                    return false;
                }
                if eval_key(root, &table, key) {
                    keys.push(key);
                    true
                } else {
                    false
                }
            });
            root.insert_child(best, driver);
            return Ok(View::new(table, keys));
        }

        let mut st = FindAllState::new(limit);
        let mut begin = begin;
        let mut end_rem = end;
        table.traverse_clusters(|cluster| {
            let size = cluster.node_size();
            if begin < size {
                let upper = size.min(end_rem);
                root.set_cluster(cluster);
                st.base_mut().bind_cluster(cluster);
                aggregate_internal(root, &mut st, begin, upper, None, &config);
                begin = 0;
            } else {
                begin -= size;
            }
            end_rem = end_rem.saturating_sub(size);
            end_rem == 0 || st.base().limit_reached()
        });
        keys = st.into_keys();
        Ok(View::new(table, keys))
    }

    /// Number of matching objects
    pub fn count(&mut self) -> Result<usize> {
        self.count_with_limit(usize::MAX)
    }

    /// Number of matching objects, stopping at `limit`
    pub fn count_with_limit(&mut self, limit: usize) -> Result<usize> {
        if limit == 0 {
            return Ok(0);
        }
        let table = self.prepare()?;
        if !self.has_conditions() {
            if let Some(view) = &self.view {
                return Ok(view.len().min(limit));
            }
            return Ok(table.size().min(limit));
        }
        if let Some(view) = self.view.clone() {
            let Some(root) = self.root_and_mut() else {
                return Ok(0);
            };
            let mut count = 0;
            for key in view.iter() {
                if count >= limit {
                    break;
                }
                if eval_key(root, &table, key) {
                    count += 1;
                }
            }
            return Ok(count);
        }
        let config = self.config;
        let Some(root) = self.root_and_mut() else {
            return Ok(0);
        };
        let best = root.best_child();
        if root.children()[best].has_search_index() {
            let mut count = 0;
            let mut driver = root.remove_child(best);
            driver.index_based_aggregate(limit, &table, &mut |obj| {
                if eval_key(root, &table, obj.key()) {
                    count += 1;
                    true
                } else {
                    false
                }
            });
            root.insert_child(best, driver);
            return Ok(count);
        }
        let mut st = CountState::new(limit);
        table.traverse_clusters(|cluster| {
            root.set_cluster(cluster);
            st.base_mut().bind_cluster(cluster);
            aggregate_internal(root, &mut st, 0, cluster.node_size(), None, &config);
            st.base().limit_reached()
        });
        Ok(st.count())
    }

    /// Remove every matching object; returns how many
    pub fn remove(&mut self) -> Result<usize> {
        let view = self.find_all()?;
        let table = self.table.upgrade()?;
        for key in view.iter() {
            table.remove_object(key)?;
        }
        Ok(view.len())
    }

    // =========================================================================
    // Aggregates
    // =========================================================================

    fn run_aggregate(&mut self, st: &mut dyn AggregateState, col: ColKey) -> Result<()> {
        let table = self.prepare()?;

        if let Some(view) = self.view.clone() {
            let mut root = self.root_and_mut();
            for key in view.iter() {
                let matched = match root.as_mut() {
                    Some(root) => eval_key(root, &table, key),
                    None => true,
                };
                if matched {
                    let value = table.get_cell(key, col)?;
                    if !st.match_key(key, Some(value)) {
                        break;
                    }
                }
            }
            return Ok(());
        }

        if !self.has_conditions() {
            table.traverse_clusters(|cluster| {
                st.base_mut().bind_cluster(cluster);
                let source = cluster.init_leaf(col);
                for row in 0..cluster.node_size() {
                    if !st.match_row(row, Some(source.value_at(row))) {
                        return true;
                    }
                }
                false
            });
            return Ok(());
        }

        let config = self.config;
        let Some(root) = self.root_and_mut() else {
            return Ok(());
        };
        let best = root.best_child();
        if root.children()[best].has_search_index() {
            let mut driver = root.remove_child(best);
            let mut stopped = false;
            driver.index_based_aggregate(usize::MAX, &table, &mut |obj| {
                if stopped || !eval_key(root, &table, obj.key()) {
                    return false;
                }
                let value = obj.get(col).unwrap_or(Value::Null);
                if !st.match_key(obj.key(), Some(value)) {
                    stopped = true;
                }
                true
            });
            root.insert_child(best, driver);
            return Ok(());
        }
        table.traverse_clusters(|cluster| {
            root.set_cluster(cluster);
            st.base_mut().bind_cluster(cluster);
            let source = cluster.init_leaf(col);
            aggregate_internal(root, st, 0, cluster.node_size(), Some(&source), &config);
            st.base().limit_reached()
        });
        Ok(())
    }

    /// Check an aggregate column's type before running
    fn expect_col(&self, col: ColKey, expected: DataType) -> Result<()> {
        let table = self.table.upgrade()?;
        if col.leaf_index() >= table.column_count() {
            return Err(Error::NoSuchColumn(format!("#{}", col.leaf_index())));
        }
        if col.is_list() || col.data_type() != expected {
            return Err(Error::TypeMismatch {
                column: table.col_name(col).unwrap_or_default(),
                expected,
                got: col.data_type(),
            });
        }
        Ok(())
    }

    pub fn sum_int(&mut self, col: ColKey) -> Result<i64> {
        self.expect_col(col, DataType::Int)?;
        let mut st = SumState::int();
        self.run_aggregate(&mut st, col)?;
        Ok(st.sum_int())
    }

    pub fn sum_float(&mut self, col: ColKey) -> Result<f64> {
        self.expect_col(col, DataType::Float)?;
        let mut st = SumState::double();
        self.run_aggregate(&mut st, col)?;
        Ok(st.sum_double())
    }

    pub fn sum_double(&mut self, col: ColKey) -> Result<f64> {
        self.expect_col(col, DataType::Double)?;
        let mut st = SumState::double();
        self.run_aggregate(&mut st, col)?;
        Ok(st.sum_double())
    }

    pub fn sum_decimal(&mut self, col: ColKey) -> Result<Decimal> {
        self.expect_col(col, DataType::Decimal)?;
        let mut st = SumState::decimal();
        self.run_aggregate(&mut st, col)?;
        Ok(st.sum_decimal())
    }

    pub fn average_int(
        &mut self,
        col: ColKey,
        result_count: Option<&mut usize>,
    ) -> Result<f64> {
        self.expect_col(col, DataType::Int)?;
        let mut st = SumState::int();
        self.run_aggregate(&mut st, col)?;
        if let Some(result_count) = result_count {
            *result_count = st.count();
        }
        Ok(st.average_double())
    }

    pub fn average_float(
        &mut self,
        col: ColKey,
        result_count: Option<&mut usize>,
    ) -> Result<f64> {
        self.expect_col(col, DataType::Float)?;
        let mut st = SumState::double();
        self.run_aggregate(&mut st, col)?;
        if let Some(result_count) = result_count {
            *result_count = st.count();
        }
        Ok(st.average_double())
    }

    pub fn average_double(
        &mut self,
        col: ColKey,
        result_count: Option<&mut usize>,
    ) -> Result<f64> {
        self.expect_col(col, DataType::Double)?;
        let mut st = SumState::double();
        self.run_aggregate(&mut st, col)?;
        if let Some(result_count) = result_count {
            *result_count = st.count();
        }
        Ok(st.average_double())
    }

    pub fn average_decimal(
        &mut self,
        col: ColKey,
        result_count: Option<&mut usize>,
    ) -> Result<Decimal> {
        self.expect_col(col, DataType::Decimal)?;
        let mut st = SumState::decimal();
        self.run_aggregate(&mut st, col)?;
        if let Some(result_count) = result_count {
            *result_count = st.count();
        }
        Ok(st.average_decimal())
    }

    fn run_minmax(
        &mut self,
        col: ColKey,
        expected: DataType,
        want_max: bool,
        return_key: Option<&mut Option<ObjKey>>,
    ) -> Result<Option<Value>> {
        self.expect_col(col, expected)?;
        let mut st = if want_max {
            MinMaxState::max()
        } else {
            MinMaxState::min()
        };
        self.run_aggregate(&mut st, col)?;
        if let Some(return_key) = return_key {
            *return_key = st.best_key();
        }
        Ok(st.best().cloned())
    }

    pub fn minimum_int(
        &mut self,
        col: ColKey,
        return_key: Option<&mut Option<ObjKey>>,
    ) -> Result<Option<i64>> {
        Ok(self
            .run_minmax(col, DataType::Int, false, return_key)?
            .and_then(as_int))
    }

    pub fn maximum_int(
        &mut self,
        col: ColKey,
        return_key: Option<&mut Option<ObjKey>>,
    ) -> Result<Option<i64>> {
        Ok(self
            .run_minmax(col, DataType::Int, true, return_key)?
            .and_then(as_int))
    }

    pub fn minimum_float(
        &mut self,
        col: ColKey,
        return_key: Option<&mut Option<ObjKey>>,
    ) -> Result<Option<f32>> {
        Ok(self
            .run_minmax(col, DataType::Float, false, return_key)?
            .and_then(as_float))
    }

    pub fn maximum_float(
        &mut self,
        col: ColKey,
        return_key: Option<&mut Option<ObjKey>>,
    ) -> Result<Option<f32>> {
        Ok(self
            .run_minmax(col, DataType::Float, true, return_key)?
            .and_then(as_float))
    }

    pub fn minimum_double(
        &mut self,
        col: ColKey,
        return_key: Option<&mut Option<ObjKey>>,
    ) -> Result<Option<f64>> {
        Ok(self
            .run_minmax(col, DataType::Double, false, return_key)?
            .and_then(as_double))
    }

    pub fn maximum_double(
        &mut self,
        col: ColKey,
        return_key: Option<&mut Option<ObjKey>>,
    ) -> Result<Option<f64>> {
        Ok(self
            .run_minmax(col, DataType::Double, true, return_key)?
            .and_then(as_double))
    }

    pub fn minimum_decimal(
        &mut self,
        col: ColKey,
        return_key: Option<&mut Option<ObjKey>>,
    ) -> Result<Option<Decimal>> {
        Ok(self
            .run_minmax(col, DataType::Decimal, false, return_key)?
            .and_then(as_decimal))
    }

    pub fn maximum_decimal(
        &mut self,
        col: ColKey,
        return_key: Option<&mut Option<ObjKey>>,
    ) -> Result<Option<Decimal>> {
        Ok(self
            .run_minmax(col, DataType::Decimal, true, return_key)?
            .and_then(as_decimal))
    }

    pub fn minimum_timestamp(
        &mut self,
        col: ColKey,
        return_key: Option<&mut Option<ObjKey>>,
    ) -> Result<Option<Timestamp>> {
        Ok(self
            .run_minmax(col, DataType::Timestamp, false, return_key)?
            .and_then(as_timestamp))
    }

    pub fn maximum_timestamp(
        &mut self,
        col: ColKey,
        return_key: Option<&mut Option<ObjKey>>,
    ) -> Result<Option<Timestamp>> {
        Ok(self
            .run_minmax(col, DataType::Timestamp, true, return_key)?
            .and_then(as_timestamp))
    }
}

// =============================================================================
// Operators
// =============================================================================

impl BitAnd for Query {
    type Output = Query;

    fn bitand(self, rhs: Query) -> Query {
        if !self.has_conditions() {
            return rhs;
        }
        if !rhs.has_conditions() {
            return self;
        }
        let combined = self.like_self();
        combined.and_query(self).and_query(rhs)
    }
}

impl BitOr for Query {
    type Output = Query;

    fn bitor(self, rhs: Query) -> Query {
        let combined = self.like_self();
        combined.and_query(self).or().and_query(rhs)
    }
}

impl Not for Query {
    type Output = Query;

    fn not(self) -> Query {
        let mut negated = self.like_self();
        if !self.has_conditions() {
            negated.record_error(Error::EmptyNegation);
            return negated;
        }
        negated.not().and_query(self)
    }
}

// =============================================================================
// Executor internals
// =============================================================================

/// Append a node to a group's implicit AND chain
fn attach_and(group: &mut QueryGroup, node: NodeBox) {
    match &mut group.root {
        None => group.root = Some(node),
        Some(root) => {
            ensure_and(root);
            if let Some(and) = root.as_any_mut().downcast_mut::<AndNode>() {
                and.add_child(node);
            }
        }
    }
}

/// Rewrap a non-chain root into an AND chain so the executor always
/// schedules over children
fn ensure_and(root: &mut NodeBox) {
    if root.as_any_mut().downcast_mut::<AndNode>().is_some() {
        return;
    }
    let old = mem::replace(root, Box::new(AndNode::new()));
    if let Some(and) = root.as_any_mut().downcast_mut::<AndNode>() {
        and.add_child(old);
    }
}

/// Point-match one object against a chain: bind its cluster, then ask
/// every condition to confirm the single row
fn eval_key(root: &mut AndNode, table: &Table, key: ObjKey) -> bool {
    match table.locate(key) {
        Some((cluster, row)) => {
            root.set_cluster(&cluster);
            root.find_first(row, row + 1).is_some()
        }
        None => false,
    }
}

/// Schedule `aggregate_local` batches over [start, end)
///
/// The cheapest child drives; after each batch the remaining siblings
/// get bounded probe windows to refresh their statistics, unbounded for
/// an index-driven sibling. Stops early when the state refuses a match.
fn aggregate_internal(
    and: &mut AndNode,
    st: &mut dyn AggregateState,
    mut start: usize,
    end: usize,
    source: Option<&ColumnLeaf>,
    config: &PlannerConfig,
) {
    let find_locals = config.find_locals.max(1);
    let probe_matches = config.probe_matches.max(1);
    while start < end {
        let best = and.best_child();
        match and.aggregate_local(best, st, start, end, find_locals, source) {
            Some(next) => start = next,
            None => return,
        }

        // Give the other conditions probe turns so their dd refreshes,
        // but only when their per-probe cost cannot already rule them out
        for c in 0..and.len() {
            if start >= end {
                break;
            }
            if c == best {
                continue;
            }
            let cost = and.children()[c].cost();
            let dt = and.children()[c].stats().dt;
            if dt < cost {
                // Cap the window so a slow sibling cannot dominate;
                // an index-driven sibling runs to the range end
                let window_end = if dt == 0.0 {
                    end
                } else {
                    (start + config.best_dist).min(end)
                };
                match and.aggregate_local(c, st, start, window_end, probe_matches, source) {
                    Some(next) => start = next,
                    None => return,
                }
            }
        }
    }
}

fn value_type_of(value: &Value) -> DataType {
    value.data_type().unwrap_or(DataType::Int)
}

fn as_int(value: Value) -> Option<i64> {
    match value {
        Value::Int(v) => Some(v),
        _ => None,
    }
}

fn as_float(value: Value) -> Option<f32> {
    match value {
        Value::Float(v) => Some(v),
        _ => None,
    }
}

fn as_double(value: Value) -> Option<f64> {
    match value {
        Value::Double(v) => Some(v),
        _ => None,
    }
}

fn as_decimal(value: Value) -> Option<Decimal> {
    match value {
        Value::Decimal(v) => Some(v),
        _ => None,
    }
}

fn as_timestamp(value: Value) -> Option<Timestamp> {
    match value {
        Value::Timestamp(v) => Some(v),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn people() -> (Table, ColKey, ColKey) {
        let table = Table::new("people");
        let age = table.add_column_nullable("age", DataType::Int).unwrap();
        let name = table.add_column("name", DataType::String).unwrap();
        for (key, (age_v, name_v)) in [
            (Some(30), "ann"),
            (Some(40), "bob"),
            (Some(40), "cass"),
            (None, "dunn"),
        ]
        .iter()
        .enumerate()
        {
            let obj = table.create_object().unwrap();
            assert_eq!(obj.key(), ObjKey(key as i64));
            obj.set(age, Value::from(*age_v)).unwrap();
            obj.set(name, *name_v).unwrap();
        }
        (table, age, name)
    }

    #[test]
    fn group_state_machine_builds_or_tree() {
        let (table, age, name) = people();
        let query = table
            .query()
            .group()
            .equal(age, 30i64)
            .or()
            .equal(age, 40i64)
            .end_group()
            .equal(name, "bob");
        assert_eq!(query.validate(), "");
        let description = query.get_description().unwrap();
        assert_eq!(description, "(age == 30 or age == 40) and name == \"bob\"");
    }

    #[test]
    fn unbalanced_group_is_reported() {
        let (table, age, _) = people();
        let query = table.query().equal(age, 30i64).end_group();
        assert_eq!(query.validate(), Error::UnbalancedGroup.to_string());
        let mut query = table.query().group().equal(age, 30i64);
        assert!(matches!(query.find(), Err(Error::UnbalancedGroup)));
    }

    #[test]
    fn type_mismatch_fails_eagerly() {
        let (table, age, _) = people();
        let mut query = table.query().equal(age, "thirty");
        assert!(!query.validate().is_empty());
        assert!(matches!(query.count(), Err(Error::TypeMismatch { .. })));
    }

    #[test]
    fn negating_an_empty_query_is_an_error() {
        let (table, _, _) = people();
        let mut negated = !table.query();
        assert!(matches!(negated.count(), Err(Error::EmptyNegation)));
    }

    #[test]
    fn detached_table_surfaces() {
        let (table, age, _) = people();
        let mut query = table.query().equal(age, 30i64);
        drop(table);
        assert!(matches!(query.count(), Err(Error::Detached)));
    }

    #[test]
    fn tautologies_add_no_condition() {
        let (table, age, _) = people();
        let query = table
            .query()
            .greater_equal(age, i64::MIN)
            .less_equal(age, i64::MAX);
        assert!(!query.has_conditions());
        assert_eq!(query.get_description().unwrap(), TRUE_PREDICATE);
    }

    #[test]
    fn pending_not_wraps_the_next_term() {
        let (table, age, _) = people();
        let query = table.query().not().greater(age, 30i64);
        assert_eq!(query.get_description().unwrap(), "!(age > 30)");
        assert_eq!(query.validate(), "");
    }

    // AND of equal conditions on one unindexed string column folds
    // into a single needle-set node scanning each row once
    #[test]
    fn coalesced_equals_scan_single_pass() {
        let table = Table::new("letters");
        let k = table.add_column("k", DataType::String).unwrap();
        let rows = 10_000usize;
        for i in 0..rows {
            let letter = char::from(b'a' + (i * 7 % 26) as u8).to_string();
            table.create_object().unwrap().set(k, letter).unwrap();
        }
        let mut query = table
            .query()
            .equal(k, "x")
            .equal(k, "y")
            .equal(k, "z");
        let count = query.count().unwrap();

        let expected = (0..rows)
            .filter(|i| matches!(b'a' + (i * 7 % 26) as u8, b'x' | b'y' | b'z'))
            .count();
        assert_eq!(count, expected);

        let root = query
            .groups[0]
            .root
            .as_mut()
            .and_then(|r| r.as_any_mut().downcast_mut::<AndNode>())
            .expect("root is normalized after execution");
        assert_eq!(root.len(), 1, "equal conditions coalesced into one node");
        let probes = root.children()[0].stats().probes;
        assert!(
            probes as f64 <= 1.1 * rows as f64,
            "single-pass scan expected, probed {} rows",
            probes
        );
    }
}
