//! Filter operator: keeps rows matching a column-against-constant predicate.

use crate::{ExecutionContext, Executor};
use common::{DbError, DbResult, Row, Schema};
use types::{CmpOp, Value};

/// `row[field] op operand`, evaluated per row.
#[derive(Clone, Debug)]
pub struct Predicate {
    pub field: usize,
    pub op: CmpOp,
    pub operand: Value,
}

impl Predicate {
    pub fn new(field: usize, op: CmpOp, operand: Value) -> Self {
        Self { field, op, operand }
    }

    /// Evaluate against one row. Comparing across types is an error, not a
    /// non-match.
    pub fn eval(&self, row: &Row) -> DbResult<bool> {
        let value = row.values.get(self.field).ok_or_else(|| {
            DbError::OutOfRange(format!(
                "predicate field {} out of range for a {}-column row",
                self.field,
                row.values.len()
            ))
        })?;
        value.compare(self.op, &self.operand).ok_or_else(|| {
            DbError::TypeMismatch(format!(
                "cannot compare {value:?} with {:?}",
                self.operand
            ))
        })
    }
}

/// Pulls from its child and yields only the rows the predicate accepts.
pub struct FilterExec {
    child: Box<dyn Executor>,
    predicate: Predicate,
}

impl FilterExec {
    pub fn new(child: Box<dyn Executor>, predicate: Predicate) -> Self {
        Self { child, predicate }
    }
}

impl Executor for FilterExec {
    fn open(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        self.child.open(ctx)
    }

    fn next(&mut self, ctx: &mut ExecutionContext) -> DbResult<Option<Row>> {
        while let Some(row) = self.child.next(ctx)? {
            if self.predicate.eval(&row)? {
                return Ok(Some(row));
            }
        }
        Ok(None)
    }

    fn rewind(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        self.child.rewind(ctx)
    }

    fn close(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        self.child.close(ctx)
    }

    fn schema(&self) -> &Schema {
        self.child.schema()
    }
}
