//! Buffer pool manager for page-level caching and I/O.
//!
//! The pool sits between the storage layer and the executor. Every page
//! access goes through [`BufferPool::fetch`]: hits come straight from the
//! cache, misses load through the backing [`PageStore`] and may evict the
//! least recently used resident page, flushing it first if it is dirty.
//!
//! Callers share pages as [`PageRef`]s, so a page has one in-memory identity
//! no matter how many operators hold it. Row-level mutation goes through
//! [`BufferPool::insert_row`] and [`BufferPool::delete_row`], which keep the
//! dirty bookkeeping in one place.


use std::num::NonZeroUsize;
use std::sync::Arc;

use common::{
    AccessMode, DbError, DbResult, PageId, PageKey, RecordId, Row, TableId, TransactionId,
};
use lru::LruCache;
use parking_lot::{Mutex, RwLock};
use storage::{HeapPage, PageStore};
use tracing::{debug, warn};

/// Shared handle to a cached page. Clones refer to the same in-memory image.
pub type PageRef = Arc<RwLock<HeapPage>>;

/// A bounded page cache with LRU replacement.
///
/// The cache map is guarded by one mutex so a miss's load-and-insert is
/// atomic: two threads fetching the same absent page observe a single load.
/// Page contents are guarded per-page, so row access does not hold the
/// cache lock.
pub struct BufferPool {
    store: Arc<dyn PageStore>,
    pages: Mutex<LruCache<PageKey, PageRef>>,
}

impl BufferPool {
    /// Create a pool that keeps at most `capacity` pages resident. A zero
    /// capacity is bumped to one.
    pub fn new(store: Arc<dyn PageStore>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            store,
            pages: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.pages.lock().cap().get()
    }

    /// Number of pages currently resident.
    pub fn resident(&self) -> usize {
        self.pages.lock().len()
    }

    /// Get the page at `key`, loading it on a miss and evicting if the pool
    /// is full. The returned handle stays valid after the page is evicted;
    /// eviction only drops the cache's reference.
    pub fn fetch(&self, tid: TransactionId, key: PageKey, mode: AccessMode) -> DbResult<PageRef> {
        let mut pages = self.pages.lock();
        if let Some(page) = pages.get(&key) {
            return Ok(Arc::clone(page));
        }

        debug!(
            tid = tid.0,
            table = key.table.0,
            page = key.page.0,
            ?mode,
            "page miss, loading from store"
        );
        let loaded = Arc::new(RwLock::new(self.store.read_page(key)?));
        if pages.len() >= pages.cap().get() {
            self.evict_one(&mut pages)?;
        }
        pages.put(key, Arc::clone(&loaded));
        Ok(loaded)
    }

    /// Drop the least recently used page, flushing it first if dirty. The
    /// victim stays cached if its flush fails.
    fn evict_one(&self, pages: &mut LruCache<PageKey, PageRef>) -> DbResult<()> {
        let (key, victim) = pages
            .peek_lru()
            .map(|(k, v)| (*k, Arc::clone(v)))
            .ok_or_else(|| DbError::CacheFull("no page available to evict".into()))?;

        {
            let mut page = victim.write();
            if page.is_dirty() {
                self.store.write_page(&page)?;
                page.clear_dirty();
            }
        }
        pages.pop(&key);
        debug!(table = key.table.0, page = key.page.0, "evicted page");
        Ok(())
    }

    /// Flag a resident page as modified by `tid`.
    pub fn mark_dirty(&self, key: PageKey, tid: TransactionId) -> DbResult<()> {
        let page = self
            .pages
            .lock()
            .peek(&key)
            .map(Arc::clone)
            .ok_or_else(|| {
                DbError::IllegalState(format!(
                    "cannot dirty non-resident page {} of table {}",
                    key.page.0, key.table.0
                ))
            })?;
        page.write().mark_dirty(tid);
        Ok(())
    }

    /// Write one page back if it is resident and dirty. A clean or absent
    /// page is a no-op.
    pub fn flush_page(&self, key: PageKey) -> DbResult<()> {
        let Some(page) = self.pages.lock().peek(&key).map(Arc::clone) else {
            return Ok(());
        };
        let mut page = page.write();
        if page.is_dirty() {
            self.store.write_page(&page)?;
            page.clear_dirty();
        }
        Ok(())
    }

    /// Write back every dirty resident page. A failed flush does not stop
    /// the sweep; the first error is returned once all pages have been
    /// attempted, and later errors are logged.
    pub fn flush_all(&self) -> DbResult<()> {
        let resident: Vec<PageRef> = self.pages.lock().iter().map(|(_, p)| Arc::clone(p)).collect();

        let mut first_err = None;
        for page in resident {
            let mut page = page.write();
            if !page.is_dirty() {
                continue;
            }
            match self.store.write_page(&page) {
                Ok(()) => page.clear_dirty(),
                Err(e) => {
                    let key = page.key();
                    if first_err.is_none() {
                        first_err = Some(e);
                    } else {
                        warn!(
                            table = key.table.0,
                            page = key.page.0,
                            error = %e,
                            "flush failed"
                        );
                    }
                }
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Drop a page from the cache without writing it back, abandoning any
    /// unflushed modifications. Used to discard pages dirtied by an aborted
    /// transaction.
    pub fn discard(&self, key: PageKey) {
        self.pages.lock().pop(&key);
    }

    /// Add `row` to `table`, scanning its pages for a free slot and
    /// appending a fresh page when every existing one is full.
    pub fn insert_row(&self, tid: TransactionId, table: TableId, row: Row) -> DbResult<RecordId> {
        for n in 0..self.store.page_count(table)? {
            let key = PageKey::new(table, PageId(n));
            let page = self.fetch(tid, key, AccessMode::ReadWrite)?;
            let mut page = page.write();
            match page.insert(&row) {
                Ok(slot) => {
                    page.mark_dirty(tid);
                    return Ok(RecordId { page: key, slot });
                }
                Err(DbError::PageFull) => continue,
                Err(e) => return Err(e),
            }
        }

        let key = PageKey::new(table, self.store.allocate_page(table)?);
        let page = self.fetch(tid, key, AccessMode::ReadWrite)?;
        let mut page = page.write();
        let slot = page.insert(&row)?;
        page.mark_dirty(tid);
        Ok(RecordId { page: key, slot })
    }

    /// Vacate the slot `rid` points at.
    pub fn delete_row(&self, tid: TransactionId, rid: RecordId) -> DbResult<()> {
        let page = self.fetch(tid, rid.page, AccessMode::ReadWrite)?;
        let mut page = page.write();
        page.remove(rid.slot)?;
        page.mark_dirty(tid);
        Ok(())
    }
}
