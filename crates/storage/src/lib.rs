use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use common::{DbError, DbResult, PageId, PageKey, RecordId, Row, Schema, TableId, TransactionId};

pub const PAGE_SIZE: usize = 4096;

const COUNT_BYTES: usize = 4;
const SLOT_ENTRY_BYTES: usize = 4;
/// Slot table value marking a vacant slot.
const EMPTY_SLOT: i32 = -1;

fn read_i32(data: &[u8], at: usize) -> i32 {
    i32::from_be_bytes(data[at..at + 4].try_into().expect("4-byte slice"))
}

fn write_i32(data: &mut [u8], at: usize, value: i32) {
    data[at..at + 4].copy_from_slice(&value.to_be_bytes());
}

/// A slotted page of fixed-width records for one schema.
///
/// The raw 4096-byte image is authoritative: bytes 0..4 hold the big-endian
/// entry count, followed by one 4-byte offset per entry (or the empty
/// sentinel), with record payloads packed from the page tail growing
/// downward. Mutations edit the image in place, so encoding is a plain copy
/// and an unmodified page re-encodes byte-identically.
#[derive(Debug, Clone)]
pub struct HeapPage {
    key: PageKey,
    schema: Schema,
    data: Vec<u8>,
    /// Snapshot of the image at construction, kept for the recovery layer.
    before_image: Vec<u8>,
    dirty: Option<TransactionId>,
}

impl HeapPage {
    /// Largest slot count `c` with `4 + 4c + c * row_bytes <= PAGE_SIZE`.
    pub fn capacity_for(schema: &Schema) -> usize {
        (PAGE_SIZE - COUNT_BYTES) / (schema.row_bytes() + SLOT_ENTRY_BYTES)
    }

    /// Create an empty page (zeroed image, zero entries).
    pub fn empty(key: PageKey, schema: Schema) -> Self {
        let data = vec![0u8; PAGE_SIZE];
        Self {
            key,
            schema,
            before_image: data.clone(),
            data,
            dirty: None,
        }
    }

    /// Decode a page image read from disk, validating its structure.
    pub fn decode(key: PageKey, schema: Schema, data: Vec<u8>) -> DbResult<Self> {
        if data.len() != PAGE_SIZE {
            return Err(DbError::CorruptPage(format!(
                "page image is {} bytes, expected {PAGE_SIZE}",
                data.len()
            )));
        }

        let capacity = Self::capacity_for(&schema);
        let count = read_i32(&data, 0);
        if count < 0 || count as usize > capacity {
            return Err(DbError::CorruptPage(format!(
                "entry count {count} exceeds capacity {capacity}"
            )));
        }

        let row_bytes = schema.row_bytes();
        let header_bytes = COUNT_BYTES + SLOT_ENTRY_BYTES * count as usize;
        let mut occupied = Vec::new();
        for slot in 0..count as usize {
            let offset = read_i32(&data, COUNT_BYTES + SLOT_ENTRY_BYTES * slot);
            if offset == EMPTY_SLOT {
                continue;
            }
            if offset < 0
                || (offset as usize) < header_bytes
                || offset as usize + row_bytes > PAGE_SIZE
            {
                return Err(DbError::CorruptPage(format!(
                    "slot {slot} offset {offset} out of bounds"
                )));
            }
            occupied.push(offset as usize);
        }

        // Occupied payloads must not overlap.
        if row_bytes > 0 {
            occupied.sort_unstable();
            for pair in occupied.windows(2) {
                if pair[1] - pair[0] < row_bytes {
                    return Err(DbError::CorruptPage(format!(
                        "records at offsets {} and {} overlap",
                        pair[0], pair[1]
                    )));
                }
            }
        }

        Ok(Self {
            key,
            schema,
            before_image: data.clone(),
            data,
            dirty: None,
        })
    }

    /// Serialize the page. Always exactly `PAGE_SIZE` bytes; unused bytes
    /// are zero.
    pub fn encode(&self) -> Vec<u8> {
        self.data.clone()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn key(&self) -> PageKey {
        self.key
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn capacity(&self) -> usize {
        Self::capacity_for(&self.schema)
    }

    /// Number of slot-table entries (occupied slots plus interior holes).
    pub fn entry_count(&self) -> usize {
        read_i32(&self.data, 0).max(0) as usize
    }

    /// Number of slots currently holding a record.
    pub fn occupied(&self) -> usize {
        (0..self.entry_count())
            .filter(|&s| self.slot_offset(s).is_some())
            .count()
    }

    fn raw_slot(&self, slot: usize) -> i32 {
        read_i32(&self.data, COUNT_BYTES + SLOT_ENTRY_BYTES * slot)
    }

    fn set_raw_slot(&mut self, slot: usize, value: i32) {
        write_i32(&mut self.data, COUNT_BYTES + SLOT_ENTRY_BYTES * slot, value);
    }

    fn set_entry_count(&mut self, count: usize) {
        write_i32(&mut self.data, 0, count as i32);
    }

    /// Byte offset of the record in `slot`, or `None` if the slot is vacant
    /// or out of range.
    pub fn slot_offset(&self, slot: usize) -> Option<usize> {
        if slot >= self.entry_count() {
            return None;
        }
        match self.raw_slot(slot) {
            EMPTY_SLOT => None,
            offset => Some(offset as usize),
        }
    }

    /// Fixed payload position for a slot: records pack from the page tail.
    fn payload_offset(&self, slot: usize) -> usize {
        PAGE_SIZE - (slot + 1) * self.schema.row_bytes()
    }

    /// Add a record, reusing the lowest vacant slot. Fails with `PageFull`
    /// when all `capacity` slots are occupied and with `TypeMismatch` when
    /// the row does not fit the page's schema.
    pub fn insert(&mut self, row: &Row) -> DbResult<u16> {
        if !row.matches_schema(&self.schema) {
            return Err(DbError::TypeMismatch(
                "row does not match page schema".into(),
            ));
        }

        let count = self.entry_count();
        let capacity = self.capacity();
        let slot = (0..capacity)
            .find(|&s| s >= count || self.raw_slot(s) == EMPTY_SLOT)
            .ok_or(DbError::PageFull)?;

        let row_bytes = self.schema.row_bytes();
        let offset = self.payload_offset(slot);
        let mut payload = &mut self.data[offset..offset + row_bytes];
        for value in &row.values {
            value.encode(&mut payload);
        }

        self.set_raw_slot(slot, offset as i32);
        if slot >= count {
            self.set_entry_count(slot + 1);
        }
        Ok(slot as u16)
    }

    /// Vacate a slot. The entry count shrinks only while trailing slots are
    /// empty, so surviving slot indices are stable.
    pub fn remove(&mut self, slot: u16) -> DbResult<()> {
        let slot = slot as usize;
        if slot >= self.entry_count() || self.raw_slot(slot) == EMPTY_SLOT {
            return Err(DbError::EmptySlot(slot as u16));
        }

        let row_bytes = self.schema.row_bytes();
        let offset = self.raw_slot(slot) as usize;
        self.data[offset..offset + row_bytes].fill(0);
        self.set_raw_slot(slot, EMPTY_SLOT);

        let mut count = self.entry_count();
        while count > 0 && self.raw_slot(count - 1) == EMPTY_SLOT {
            self.set_raw_slot(count - 1, 0);
            count -= 1;
        }
        self.set_entry_count(count);
        Ok(())
    }

    /// Decode the record in `slot`, tagged with its location. `None` for a
    /// vacant or out-of-range slot.
    pub fn record(&self, slot: u16) -> DbResult<Option<Row>> {
        let Some(offset) = self.slot_offset(slot as usize) else {
            return Ok(None);
        };

        let mut payload = &self.data[offset..offset + self.schema.row_bytes()];
        let mut values = Vec::with_capacity(self.schema.len());
        for column in self.schema.columns() {
            let value = column.field_type.decode(&mut payload).ok_or_else(|| {
                DbError::CorruptPage(format!("undecodable record in slot {slot}"))
            })?;
            values.push(value);
        }

        Ok(Some(Row::new(values).with_rid(RecordId {
            page: self.key,
            slot,
        })))
    }

    /// Lazy iterator over `(slot, record)` in ascending slot order, skipping
    /// vacant slots. Restart by calling `records()` again.
    pub fn records(&self) -> PageRecords<'_> {
        PageRecords {
            page: self,
            next_slot: 0,
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.is_some()
    }

    /// Transaction that last dirtied this page, if any.
    pub fn dirtied_by(&self) -> Option<TransactionId> {
        self.dirty
    }

    pub fn mark_dirty(&mut self, tid: TransactionId) {
        self.dirty = Some(tid);
    }

    pub fn clear_dirty(&mut self) {
        self.dirty = None;
    }

    /// Re-snapshot the current image as the rollback baseline.
    pub fn set_before_image(&mut self) {
        self.before_image = self.data.clone();
    }

    /// The page as it looked at the last snapshot, for recovery undo.
    pub fn before_image(&self) -> DbResult<HeapPage> {
        HeapPage::decode(self.key, self.schema.clone(), self.before_image.clone())
    }
}

pub struct PageRecords<'a> {
    page: &'a HeapPage,
    next_slot: usize,
}

impl Iterator for PageRecords<'_> {
    type Item = DbResult<(u16, Row)>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.next_slot < self.page.entry_count() {
            let slot = self.next_slot as u16;
            self.next_slot += 1;
            match self.page.record(slot) {
                Ok(Some(row)) => return Some(Ok((slot, row))),
                Ok(None) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
        None
    }
}

/// A flat file of fixed-size pages: page `n` occupies bytes
/// `n * PAGE_SIZE .. (n + 1) * PAGE_SIZE`, with no file-level header.
#[derive(Debug)]
pub struct HeapFile {
    file: File,
    table: TableId,
    schema: Schema,
}

impl HeapFile {
    pub fn open(path: &Path, table: TableId, schema: Schema) -> DbResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        Ok(Self {
            file,
            table,
            schema,
        })
    }

    pub fn table(&self) -> TableId {
        self.table
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    fn file_len(&self) -> DbResult<u64> {
        Ok(self.file.metadata()?.len())
    }

    /// Derived from file length on every call so concurrent external growth
    /// is observed.
    pub fn page_count(&self) -> DbResult<u64> {
        Ok(self.file_len()? / PAGE_SIZE as u64)
    }

    pub fn read_page(&mut self, page: PageId) -> DbResult<HeapPage> {
        let end = (page.0 + 1) * PAGE_SIZE as u64;
        if end > self.file_len()? {
            return Err(DbError::OutOfRange(format!(
                "page {} beyond end of file for table {}",
                page.0, self.table.0
            )));
        }

        self.file.seek(SeekFrom::Start(page.0 * PAGE_SIZE as u64))?;
        let mut buf = vec![0u8; PAGE_SIZE];
        self.file.read_exact(&mut buf)?;
        HeapPage::decode(PageKey::new(self.table, page), self.schema.clone(), buf)
    }

    /// Write a page image in place. Writing the first page past the current
    /// end extends the file (append semantics for freshly allocated pages);
    /// anything further out would leave a gap and is rejected.
    pub fn write_page(&mut self, page: &HeapPage) -> DbResult<()> {
        let start = page.key().page.0 * PAGE_SIZE as u64;
        if start > self.file_len()? {
            return Err(DbError::OutOfRange(format!(
                "write of page {} would leave a gap in table {}",
                page.key().page.0,
                self.table.0
            )));
        }

        self.file.seek(SeekFrom::Start(start))?;
        self.file.write_all(page.as_bytes())?;
        self.file.flush()?;
        Ok(())
    }

    /// Append a zeroed page and return it.
    pub fn allocate_page(&mut self) -> DbResult<HeapPage> {
        let page_no = PageId(self.page_count()?);
        let page = HeapPage::empty(PageKey::new(self.table, page_no), self.schema.clone());
        self.write_page(&page)?;
        Ok(page)
    }
}

/// The seam between the buffer pool and persistent storage: resolves a
/// table's schema and moves page images to and from its backing file.
///
/// The catalog implements this for real tables; tests substitute counting
/// stubs.
pub trait PageStore: Send + Sync {
    fn schema_of(&self, table: TableId) -> DbResult<Schema>;
    fn read_page(&self, key: PageKey) -> DbResult<HeapPage>;
    fn write_page(&self, page: &HeapPage) -> DbResult<()>;
    fn page_count(&self, table: TableId) -> DbResult<u64>;
    /// Append a fresh page to the table's file, returning its number.
    fn allocate_page(&self, table: TableId) -> DbResult<PageId>;
}

#[cfg(test)]
mod tests;
