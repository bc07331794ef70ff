//! Grouped and ungrouped aggregation.
//!
//! The operator drains its child at `open()`, folds every row into an
//! [`Aggregator`], and then serves the per-group results. Grouped output
//! rows are `[group value, aggregate]`; ungrouped output is a single
//! `[aggregate]` row. Group order is unspecified.

use std::fmt;

use ahash::RandomState;
use hashbrown::HashMap;

use crate::{ExecutionContext, Executor};
use common::{Column, DbError, DbResult, Row, Schema};
use types::{FieldType, Value};

type Map<K, V> = HashMap<K, V, RandomState>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AggregateOp {
    Min,
    Max,
    Sum,
    Avg,
    Count,
}

impl fmt::Display for AggregateOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AggregateOp::Min => "min",
            AggregateOp::Max => "max",
            AggregateOp::Sum => "sum",
            AggregateOp::Avg => "avg",
            AggregateOp::Count => "count",
        })
    }
}

/// Folds rows into per-group running state and materializes result rows.
pub trait Aggregator {
    fn merge(&mut self, row: &Row) -> DbResult<()>;
    /// One result row per group seen so far.
    fn rows(&self) -> Vec<Row>;
    /// Forget all groups, as if no row had been merged.
    fn reset(&mut self);
}

#[derive(Clone, Copy)]
struct GroupState {
    acc: i32,
    count: i32,
}

/// Aggregation over an integer field. Supports all operators; the average
/// is integer division of the running sum by the row count.
pub struct IntAggregator {
    group_by: Option<usize>,
    field: usize,
    op: AggregateOp,
    groups: Map<Option<Value>, GroupState>,
}

impl IntAggregator {
    pub fn new(group_by: Option<usize>, field: usize, op: AggregateOp) -> Self {
        Self {
            group_by,
            field,
            op,
            groups: Map::default(),
        }
    }

    fn seed(op: AggregateOp) -> GroupState {
        let acc = match op {
            AggregateOp::Min => i32::MAX,
            AggregateOp::Max => i32::MIN,
            AggregateOp::Sum | AggregateOp::Avg | AggregateOp::Count => 0,
        };
        GroupState { acc, count: 0 }
    }
}

fn group_key(group_by: Option<usize>, row: &Row) -> DbResult<Option<Value>> {
    match group_by {
        None => Ok(None),
        Some(idx) => row.values.get(idx).cloned().map(Some).ok_or_else(|| {
            DbError::OutOfRange(format!(
                "group column {idx} out of range for a {}-column row",
                row.values.len()
            ))
        }),
    }
}

impl Aggregator for IntAggregator {
    fn merge(&mut self, row: &Row) -> DbResult<()> {
        let key = group_key(self.group_by, row)?;
        let value = row.values.get(self.field).ok_or_else(|| {
            DbError::OutOfRange(format!(
                "aggregate column {} out of range for a {}-column row",
                self.field,
                row.values.len()
            ))
        })?;
        let v = value.as_int().ok_or_else(|| {
            DbError::TypeMismatch(format!("integer aggregate over {value:?}"))
        })?;

        let op = self.op;
        let state = self.groups.entry(key).or_insert_with(|| Self::seed(op));
        match op {
            AggregateOp::Min => state.acc = state.acc.min(v),
            AggregateOp::Max => state.acc = state.acc.max(v),
            AggregateOp::Sum | AggregateOp::Avg => state.acc = state.acc.wrapping_add(v),
            AggregateOp::Count => {}
        }
        state.count += 1;
        Ok(())
    }

    fn rows(&self) -> Vec<Row> {
        self.groups
            .iter()
            .map(|(key, state)| {
                let result = match self.op {
                    AggregateOp::Min | AggregateOp::Max | AggregateOp::Sum => state.acc,
                    AggregateOp::Count => state.count,
                    AggregateOp::Avg => state.acc / state.count,
                };
                match key {
                    Some(group) => Row::new(vec![group.clone(), Value::Int(result)]),
                    None => Row::new(vec![Value::Int(result)]),
                }
            })
            .collect()
    }

    fn reset(&mut self) {
        self.groups.clear();
    }
}

/// Aggregation over a text field. Only counting is meaningful; anything
/// else is rejected at construction.
pub struct StringAggregator {
    group_by: Option<usize>,
    field: usize,
    groups: Map<Option<Value>, i32>,
}

impl StringAggregator {
    pub fn new(group_by: Option<usize>, field: usize, op: AggregateOp) -> DbResult<Self> {
        if op != AggregateOp::Count {
            return Err(DbError::UnsupportedOperator(format!(
                "{op} over a text field"
            )));
        }
        Ok(Self {
            group_by,
            field,
            groups: Map::default(),
        })
    }
}

impl Aggregator for StringAggregator {
    fn merge(&mut self, row: &Row) -> DbResult<()> {
        let key = group_key(self.group_by, row)?;
        if row.values.get(self.field).is_none() {
            return Err(DbError::OutOfRange(format!(
                "aggregate column {} out of range for a {}-column row",
                self.field,
                row.values.len()
            )));
        }
        *self.groups.entry(key).or_insert(0) += 1;
        Ok(())
    }

    fn rows(&self) -> Vec<Row> {
        self.groups
            .iter()
            .map(|(key, count)| match key {
                Some(group) => Row::new(vec![group.clone(), Value::Int(*count)]),
                None => Row::new(vec![Value::Int(*count)]),
            })
            .collect()
    }

    fn reset(&mut self) {
        self.groups.clear();
    }
}

/// Blocking aggregation operator. The aggregator implementation is chosen
/// from the aggregated field's type.
pub struct AggregateExec {
    child: Box<dyn Executor>,
    aggregator: Box<dyn Aggregator>,
    schema: Schema,
    results: Vec<Row>,
    pos: usize,
    open: bool,
}

impl AggregateExec {
    pub fn new(
        child: Box<dyn Executor>,
        group_by: Option<usize>,
        field: usize,
        op: AggregateOp,
    ) -> DbResult<Self> {
        let child_schema = child.schema();

        let mut columns = Vec::new();
        if let Some(idx) = group_by {
            let group_type = child_schema.field_type(idx).ok_or_else(|| {
                DbError::OutOfRange(format!("group column {idx} not in input schema"))
            })?;
            let name = child_schema.column_name(idx).unwrap_or("group");
            columns.push(Column::new(name, group_type));
        }
        let field_type = child_schema.field_type(field).ok_or_else(|| {
            DbError::OutOfRange(format!("aggregate column {field} not in input schema"))
        })?;
        let field_name = child_schema.column_name(field).unwrap_or("value");
        columns.push(Column::new(format!("{op}({field_name})"), FieldType::Int));

        let aggregator: Box<dyn Aggregator> = match field_type {
            FieldType::Int => Box::new(IntAggregator::new(group_by, field, op)),
            FieldType::Text => Box::new(StringAggregator::new(group_by, field, op)?),
        };

        Ok(Self {
            child,
            aggregator,
            schema: Schema::new(columns),
            results: Vec::new(),
            pos: 0,
            open: false,
        })
    }

    fn require_open(&self, op: &str) -> DbResult<()> {
        if self.open {
            Ok(())
        } else {
            Err(DbError::IllegalState(format!(
                "{op} on an aggregation that is not open"
            )))
        }
    }
}

impl Executor for AggregateExec {
    fn open(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        self.aggregator.reset();
        self.child.open(ctx)?;
        while let Some(row) = self.child.next(ctx)? {
            self.aggregator.merge(&row)?;
        }
        self.results = self.aggregator.rows();
        self.pos = 0;
        self.open = true;
        Ok(())
    }

    fn next(&mut self, _ctx: &mut ExecutionContext) -> DbResult<Option<Row>> {
        self.require_open("next")?;
        let row = self.results.get(self.pos).cloned();
        if row.is_some() {
            self.pos += 1;
        }
        Ok(row)
    }

    fn rewind(&mut self, _ctx: &mut ExecutionContext) -> DbResult<()> {
        self.require_open("rewind")?;
        self.pos = 0;
        Ok(())
    }

    fn close(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        self.open = false;
        self.results.clear();
        self.child.close(ctx)
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }
}
