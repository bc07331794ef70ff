use super::*;
use common::Column;
use proptest::prelude::*;
use tempfile::tempdir;
use types::{FieldType, Value};

fn test_schema() -> Schema {
    Schema::new(vec![
        Column::new("id", FieldType::Int),
        Column::new("name", FieldType::Text),
    ])
}

fn test_key() -> PageKey {
    PageKey::new(TableId(1), PageId(0))
}

fn test_row(id: i32, name: &str) -> Row {
    Row::new(vec![Value::Int(id), Value::Text(name.into())])
}

#[test]
fn capacity_matches_formula() {
    let schema = test_schema();
    let capacity = HeapPage::capacity_for(&schema);
    assert_eq!(capacity, (PAGE_SIZE - 4) / (schema.row_bytes() + 4));
    // id (4) + name (132) = 136 byte rows, 140 per slot with the entry.
    assert_eq!(capacity, 29);
}

#[test]
fn insert_and_get_round_trip() {
    let mut page = HeapPage::empty(test_key(), test_schema());

    let row = test_row(1, "Will");
    let slot = page.insert(&row).unwrap();

    let fetched = page.record(slot).unwrap().unwrap();
    assert_eq!(fetched.values, row.values);
    assert_eq!(
        fetched.rid(),
        Some(RecordId {
            page: test_key(),
            slot,
        })
    );
}

#[test]
fn empty_page_encodes_to_zeroes() {
    let page = HeapPage::empty(test_key(), test_schema());
    assert!(page.encode().iter().all(|&b| b == 0));
}

#[test]
fn decode_encode_is_byte_identical() {
    let mut page = HeapPage::empty(test_key(), test_schema());
    page.insert(&test_row(1, "a")).unwrap();
    page.insert(&test_row(2, "b")).unwrap();
    page.insert(&test_row(3, "c")).unwrap();
    page.remove(1).unwrap();

    let bytes = page.encode();
    let decoded = HeapPage::decode(test_key(), test_schema(), bytes.clone()).unwrap();
    assert_eq!(decoded.encode(), bytes);
    assert_eq!(decoded.occupied(), 2);
}

#[test]
fn insert_into_full_page_fails() {
    let schema = test_schema();
    let mut page = HeapPage::empty(test_key(), schema.clone());
    for i in 0..HeapPage::capacity_for(&schema) {
        page.insert(&test_row(i as i32, "r")).unwrap();
    }

    let err = page.insert(&test_row(99, "z")).unwrap_err();
    assert!(matches!(err, DbError::PageFull));
}

#[test]
fn insert_rejects_mismatched_row() {
    let mut page = HeapPage::empty(test_key(), test_schema());
    let err = page.insert(&Row::new(vec![Value::Int(1)])).unwrap_err();
    assert!(matches!(err, DbError::TypeMismatch(_)));
}

#[test]
fn remove_leaves_interior_hole_with_stable_slots() {
    let mut page = HeapPage::empty(test_key(), test_schema());
    page.insert(&test_row(1, "a")).unwrap();
    page.insert(&test_row(2, "b")).unwrap();
    page.insert(&test_row(3, "c")).unwrap();

    page.remove(1).unwrap();

    // Interior hole: count unchanged, neighbours untouched.
    assert_eq!(page.entry_count(), 3);
    assert!(page.record(1).unwrap().is_none());
    assert_eq!(page.record(0).unwrap().unwrap().values[0], Value::Int(1));
    assert_eq!(page.record(2).unwrap().unwrap().values[0], Value::Int(3));
}

#[test]
fn remove_tail_shrinks_entry_count_past_holes() {
    let mut page = HeapPage::empty(test_key(), test_schema());
    page.insert(&test_row(1, "a")).unwrap();
    page.insert(&test_row(2, "b")).unwrap();
    page.insert(&test_row(3, "c")).unwrap();

    page.remove(1).unwrap();
    page.remove(2).unwrap();

    // Removing the highest occupied slot also drops the trailing hole.
    assert_eq!(page.entry_count(), 1);
    assert_eq!(page.occupied(), 1);
}

#[test]
fn remove_reuses_vacated_slot() {
    let mut page = HeapPage::empty(test_key(), test_schema());
    page.insert(&test_row(1, "a")).unwrap();
    page.insert(&test_row(2, "b")).unwrap();
    page.insert(&test_row(3, "c")).unwrap();

    page.remove(1).unwrap();
    let slot = page.insert(&test_row(4, "d")).unwrap();
    assert_eq!(slot, 1);
}

#[test]
fn remove_empty_slot_fails() {
    let mut page = HeapPage::empty(test_key(), test_schema());
    page.insert(&test_row(1, "a")).unwrap();

    assert!(matches!(page.remove(5), Err(DbError::EmptySlot(5))));

    page.remove(0).unwrap();
    assert!(matches!(page.remove(0), Err(DbError::EmptySlot(0))));
}

#[test]
fn record_out_of_range_is_none() {
    let page = HeapPage::empty(test_key(), test_schema());
    assert!(page.record(0).unwrap().is_none());
    assert!(page.record(1000).unwrap().is_none());
}

#[test]
fn records_iterator_skips_holes_and_restarts() {
    let mut page = HeapPage::empty(test_key(), test_schema());
    page.insert(&test_row(1, "a")).unwrap();
    page.insert(&test_row(2, "b")).unwrap();
    page.insert(&test_row(3, "c")).unwrap();
    page.remove(1).unwrap();

    let slots: Vec<u16> = page
        .records()
        .map(|r| r.unwrap().0)
        .collect();
    assert_eq!(slots, vec![0, 2]);

    // A fresh iterator restarts from the first slot.
    let again: Vec<u16> = page.records().map(|r| r.unwrap().0).collect();
    assert_eq!(again, slots);
}

#[test]
fn decode_rejects_oversized_entry_count() {
    let schema = test_schema();
    let mut data = vec![0u8; PAGE_SIZE];
    let bogus = (HeapPage::capacity_for(&schema) + 1) as i32;
    data[..4].copy_from_slice(&bogus.to_be_bytes());

    let err = HeapPage::decode(test_key(), schema, data).unwrap_err();
    assert!(matches!(err, DbError::CorruptPage(_)));
}

#[test]
fn decode_rejects_out_of_bounds_offset() {
    let schema = test_schema();
    let mut data = vec![0u8; PAGE_SIZE];
    data[..4].copy_from_slice(&1i32.to_be_bytes());
    data[4..8].copy_from_slice(&(PAGE_SIZE as i32).to_be_bytes());

    let err = HeapPage::decode(test_key(), schema, data).unwrap_err();
    assert!(matches!(err, DbError::CorruptPage(_)));
}

#[test]
fn decode_rejects_overlapping_records() {
    let schema = test_schema();
    let offset = (PAGE_SIZE - schema.row_bytes()) as i32;
    let mut data = vec![0u8; PAGE_SIZE];
    data[..4].copy_from_slice(&2i32.to_be_bytes());
    data[4..8].copy_from_slice(&offset.to_be_bytes());
    data[8..12].copy_from_slice(&(offset - 1).to_be_bytes());

    let err = HeapPage::decode(test_key(), schema, data).unwrap_err();
    assert!(matches!(err, DbError::CorruptPage(_)));
}

#[test]
fn dirty_flag_records_transaction() {
    let mut page = HeapPage::empty(test_key(), test_schema());
    assert!(!page.is_dirty());

    let tid = TransactionId::new();
    page.mark_dirty(tid);
    assert_eq!(page.dirtied_by(), Some(tid));

    page.clear_dirty();
    assert!(!page.is_dirty());
}

#[test]
fn before_image_is_pre_modification_snapshot() {
    let mut page = HeapPage::empty(test_key(), test_schema());
    page.insert(&test_row(7, "x")).unwrap();

    let before = page.before_image().unwrap();
    assert_eq!(before.occupied(), 0);

    page.set_before_image();
    let after = page.before_image().unwrap();
    assert_eq!(after.occupied(), 1);
}

#[test]
fn heap_file_write_then_read_round_trip() {
    let dir = tempdir().unwrap();
    let mut file = HeapFile::open(&dir.path().join("t.tbl"), TableId(1), test_schema()).unwrap();

    let mut page = file.allocate_page().unwrap();
    page.insert(&test_row(1, "Will")).unwrap();
    file.write_page(&page).unwrap();

    let read = file.read_page(PageId(0)).unwrap();
    assert_eq!(read.encode(), page.encode());
    assert_eq!(read.record(0).unwrap().unwrap().values[0], Value::Int(1));
}

#[test]
fn read_past_end_of_file_fails() {
    let dir = tempdir().unwrap();
    let mut file = HeapFile::open(&dir.path().join("t.tbl"), TableId(1), test_schema()).unwrap();

    let err = file.read_page(PageId(0)).unwrap_err();
    assert!(matches!(err, DbError::OutOfRange(_)));
}

#[test]
fn page_count_tracks_file_length() {
    let dir = tempdir().unwrap();
    let mut file = HeapFile::open(&dir.path().join("t.tbl"), TableId(1), test_schema()).unwrap();

    assert_eq!(file.page_count().unwrap(), 0);
    file.allocate_page().unwrap();
    file.allocate_page().unwrap();
    assert_eq!(file.page_count().unwrap(), 2);
}

#[test]
fn write_page_rejects_gaps() {
    let dir = tempdir().unwrap();
    let mut file = HeapFile::open(&dir.path().join("t.tbl"), TableId(1), test_schema()).unwrap();

    let stray = HeapPage::empty(PageKey::new(TableId(1), PageId(4)), test_schema());
    let err = file.write_page(&stray).unwrap_err();
    assert!(matches!(err, DbError::OutOfRange(_)));
}

proptest! {
    #[test]
    fn page_round_trip_any_rows(rows in proptest::collection::vec((any::<i32>(), "[a-z]{0,16}"), 0..29)) {
        let mut page = HeapPage::empty(test_key(), test_schema());
        for (id, name) in &rows {
            page.insert(&test_row(*id, name)).unwrap();
        }

        let decoded = HeapPage::decode(test_key(), test_schema(), page.encode()).unwrap();
        prop_assert_eq!(decoded.encode(), page.encode());
        prop_assert_eq!(decoded.occupied(), rows.len());
        for (slot, (id, name)) in rows.iter().enumerate() {
            let row = decoded.record(slot as u16).unwrap().unwrap();
            prop_assert_eq!(&row.values, &test_row(*id, name).values);
        }
    }
}
