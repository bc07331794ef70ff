//! Test helpers and utilities for executor tests.

use std::sync::Arc;

use crate::{ExecutionContext, Executor};
use buffer::BufferPool;
use catalog::Catalog;
use common::{Column, DbError, DbResult, Row, Schema, TableId};
use storage::PageStore;
use tempfile::TempDir;
use types::{FieldType, Value};

pub fn users_schema() -> Schema {
    Schema::new(vec![
        Column::new("id", FieldType::Int),
        Column::new("name", FieldType::Text),
    ])
}

pub fn row(id: i32, name: &str) -> Row {
    Row::new(vec![Value::Int(id), Value::Text(name.into())])
}

pub struct TestDb {
    pub dir: TempDir,
    pub ctx: ExecutionContext,
    pub table: TableId,
}

/// Fresh database in a temp directory with one `users(id, name)` table and
/// a small buffer pool.
pub fn setup() -> TestDb {
    let dir = tempfile::tempdir().unwrap();
    let mut catalog = Catalog::open(dir.path()).unwrap();
    let table = catalog
        .create_table(
            "users",
            vec![
                Column::new("id", FieldType::Int),
                Column::new("name", FieldType::Text),
            ],
        )
        .unwrap();

    let catalog = Arc::new(catalog);
    let pool = Arc::new(BufferPool::new(
        Arc::clone(&catalog) as Arc<dyn PageStore>,
        8,
    ));

    TestDb {
        dir,
        ctx: ExecutionContext::new(catalog, pool),
        table,
    }
}

pub fn insert_rows(ctx: &ExecutionContext, table: TableId, rows: Vec<Row>) {
    for row in rows {
        ctx.pool.insert_row(ctx.tid, table, row).unwrap();
    }
}

/// Scripted executor yielding a fixed row list. Rows carry no storage
/// location, which also makes it a source of undeletable rows.
pub struct MockExecutor {
    schema: Schema,
    rows: Vec<Row>,
    pos: usize,
    open: bool,
}

impl MockExecutor {
    pub fn new(schema: Schema, rows: Vec<Row>) -> Self {
        Self {
            schema,
            rows,
            pos: 0,
            open: false,
        }
    }
}

impl Executor for MockExecutor {
    fn open(&mut self, _ctx: &mut ExecutionContext) -> DbResult<()> {
        self.pos = 0;
        self.open = true;
        Ok(())
    }

    fn next(&mut self, _ctx: &mut ExecutionContext) -> DbResult<Option<Row>> {
        if !self.open {
            return Err(DbError::IllegalState("next on an unopened mock".into()));
        }
        let row = self.rows.get(self.pos).cloned();
        if row.is_some() {
            self.pos += 1;
        }
        Ok(row)
    }

    fn rewind(&mut self, _ctx: &mut ExecutionContext) -> DbResult<()> {
        if !self.open {
            return Err(DbError::IllegalState("rewind on an unopened mock".into()));
        }
        self.pos = 0;
        Ok(())
    }

    fn close(&mut self, _ctx: &mut ExecutionContext) -> DbResult<()> {
        self.open = false;
        Ok(())
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }
}
