//! Mutation operators. Each one drains its source on the first `next()`
//! call and reports the affected-row count as a single-column row.

use crate::{ExecutionContext, Executor};
use common::{Column, DbError, DbResult, Row, Schema};
use tracing::debug;
use types::{FieldType, Value};

/// Deletes every row its child produces, using the storage location each
/// scanned row carries.
pub struct DeleteExec {
    child: Box<dyn Executor>,
    schema: Schema,
    done: bool,
}

impl DeleteExec {
    pub fn new(child: Box<dyn Executor>) -> Self {
        Self {
            child,
            schema: Schema::new(vec![Column::new("deleted", FieldType::Int)]),
            done: false,
        }
    }
}

impl Executor for DeleteExec {
    fn open(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        self.done = false;
        self.child.open(ctx)
    }

    fn next(&mut self, ctx: &mut ExecutionContext) -> DbResult<Option<Row>> {
        if self.done {
            return Ok(None);
        }

        let mut count: i32 = 0;
        while let Some(row) = self.child.next(ctx)? {
            let rid = row.rid().ok_or_else(|| {
                DbError::Executor("cannot delete a row with no storage location".into())
            })?;
            ctx.pool.delete_row(ctx.tid, rid)?;
            count += 1;
        }

        debug!(tid = ctx.tid.0, count, "delete finished");
        self.done = true;
        Ok(Some(Row::new(vec![Value::Int(count)])))
    }

    fn rewind(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        self.done = false;
        self.child.rewind(ctx)
    }

    fn close(&mut self, ctx: &mut ExecutionContext) -> DbResult<()> {
        self.child.close(ctx)
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }
}
