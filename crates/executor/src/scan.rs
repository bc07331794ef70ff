//! Sequential scan over a table's heap pages.

use crate::{ExecutionContext, Executor};
use common::{AccessMode, DbError, DbResult, PageId, PageKey, Row, Schema, TableId};
use storage::PageStore;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    Created,
    Open,
    Closed,
}

/// Reads every record of a table in page order, slot order within a page.
///
/// Pages are fetched through the buffer pool one at a time; the scan holds
/// no page across `next()` calls, so a table larger than the pool streams
/// through it without pinning.
pub struct SeqScanExec {
    table: TableId,
    schema: Schema,
    state: State,
    page: u64,
    slot: usize,
}

impl SeqScanExec {
    pub fn new(table: TableId, schema: Schema) -> Self {
        Self {
            table,
            schema,
            state: State::Created,
            page: 0,
            slot: 0,
        }
    }

    /// Resolve a table by name and scan it.
    pub fn for_table(ctx: &ExecutionContext, name: &str) -> DbResult<Self> {
        let meta = ctx.catalog.table(name)?;
        Ok(Self::new(meta.id, meta.schema.clone()))
    }

    fn require_open(&self, op: &str) -> DbResult<()> {
        match self.state {
            State::Open => Ok(()),
            _ => Err(DbError::IllegalState(format!(
                "{op} on a scan that is not open"
            ))),
        }
    }
}

impl Executor for SeqScanExec {
    fn open(&mut self, _ctx: &mut ExecutionContext) -> DbResult<()> {
        self.state = State::Open;
        self.page = 0;
        self.slot = 0;
        Ok(())
    }

    fn next(&mut self, ctx: &mut ExecutionContext) -> DbResult<Option<Row>> {
        self.require_open("next")?;

        loop {
            if self.page >= ctx.catalog.page_count(self.table)? {
                return Ok(None);
            }

            let key = PageKey::new(self.table, PageId(self.page));
            let page = ctx.pool.fetch(ctx.tid, key, AccessMode::ReadOnly)?;
            let page = page.read();
            while self.slot < page.entry_count() {
                let slot = self.slot as u16;
                self.slot += 1;
                if let Some(row) = page.record(slot)? {
                    return Ok(Some(row));
                }
            }

            self.page += 1;
            self.slot = 0;
        }
    }

    fn rewind(&mut self, _ctx: &mut ExecutionContext) -> DbResult<()> {
        self.require_open("rewind")?;
        self.page = 0;
        self.slot = 0;
        Ok(())
    }

    fn close(&mut self, _ctx: &mut ExecutionContext) -> DbResult<()> {
        self.state = State::Closed;
        Ok(())
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execute_query;
    use crate::tests::helpers::{insert_rows, row, setup, users_schema};
    use storage::HeapPage;
    use types::Value;

    #[test]
    fn scan_of_empty_table_is_exhausted_immediately() {
        let db = setup();
        let mut ctx = db.ctx;
        let mut scan = SeqScanExec::new(db.table, users_schema());
        assert!(execute_query(&mut scan, &mut ctx).unwrap().is_empty());
    }

    #[test]
    fn scan_returns_rows_tagged_with_their_location() {
        let db = setup();
        let mut ctx = db.ctx;
        insert_rows(&ctx, db.table, vec![row(1, "a"), row(2, "b")]);

        let mut scan = SeqScanExec::new(db.table, users_schema());
        let rows = execute_query(&mut scan, &mut ctx).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].values[0], Value::Int(1));
        assert!(rows.iter().all(|r| r.rid().is_some()));
    }

    #[test]
    fn scan_crosses_page_boundaries() {
        let db = setup();
        let mut ctx = db.ctx;

        let per_page = HeapPage::capacity_for(&users_schema());
        let total = per_page + 3;
        insert_rows(
            &ctx,
            db.table,
            (0..total).map(|i| row(i as i32, "r")).collect(),
        );

        let mut scan = SeqScanExec::new(db.table, users_schema());
        let rows = execute_query(&mut scan, &mut ctx).unwrap();
        assert_eq!(rows.len(), total);
        assert_eq!(ctx.catalog.page_count(db.table).unwrap(), 2);
    }

    #[test]
    fn rewind_replays_the_stream() {
        let db = setup();
        let mut ctx = db.ctx;
        insert_rows(&ctx, db.table, vec![row(1, "a"), row(2, "b")]);

        let mut scan = SeqScanExec::new(db.table, users_schema());
        scan.open(&mut ctx).unwrap();
        let first = scan.next(&mut ctx).unwrap().unwrap();
        scan.next(&mut ctx).unwrap().unwrap();
        assert!(scan.next(&mut ctx).unwrap().is_none());

        scan.rewind(&mut ctx).unwrap();
        let replay = scan.next(&mut ctx).unwrap().unwrap();
        assert_eq!(replay.values, first.values);
        scan.close(&mut ctx).unwrap();
    }

    #[test]
    fn use_before_open_and_after_close_is_rejected() {
        let db = setup();
        let mut ctx = db.ctx;
        let mut scan = SeqScanExec::new(db.table, users_schema());

        assert!(matches!(
            scan.next(&mut ctx),
            Err(DbError::IllegalState(_))
        ));

        scan.open(&mut ctx).unwrap();
        scan.close(&mut ctx).unwrap();
        assert!(matches!(
            scan.rewind(&mut ctx),
            Err(DbError::IllegalState(_))
        ));
    }
}
