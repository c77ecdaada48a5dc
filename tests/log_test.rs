use anyhow::Result;

use quarrydb::storage::page::{max_length, Page, INT_SIZE};
use quarrydb::Database;

mod common;
use common::{create_test_db, TEST_BLOCK_SIZE};

/// A log record holding "record{n}" followed by the int n + 100, encoded
/// the same way the engine's own log records are.
fn make_record(n: i32) -> Vec<u8> {
    let s = format!("record{}", n);
    let int_pos = max_length(s.encode_utf16().count());
    let mut page = Page::new(int_pos + INT_SIZE);
    page.set_string(0, &s);
    page.set_int(int_pos, n + 100);
    page.into_bytes()
}

fn decode_record(bytes: &[u8]) -> (String, i32) {
    let page = Page::from_bytes(bytes.to_vec());
    let s = page.get_string(0);
    let n = page.get_int(max_length(s.encode_utf16().count()));
    (s, n)
}

fn append_records(db: &Database, from: i32, to: i32) -> Result<()> {
    let log = db.log_manager();
    for i in from..=to {
        let lsn = log.append(&make_record(i))?;
        assert!(lsn > 0);
    }
    Ok(())
}

fn collect_log(db: &Database) -> Result<Vec<(String, i32)>> {
    let mut out = Vec::new();
    for rec in db.log_manager().iterator()? {
        out.push(decode_record(&rec?));
    }
    Ok(out)
}

#[test]
fn test_iteration_is_exact_reverse_of_append_order() -> Result<()> {
    let (db, _dir) = create_test_db(TEST_BLOCK_SIZE, 8)?;

    append_records(&db, 1, 35)?;
    let seen = collect_log(&db)?;
    // The engine's own startup state contributes nothing: only our records.
    assert_eq!(seen.len(), 35);
    for (pos, (s, n)) in seen.iter().enumerate() {
        let expect = 35 - pos as i32;
        assert_eq!(s, &format!("record{}", expect));
        assert_eq!(*n, expect + 100);
    }

    // Push the log across a block boundary and re-check the whole order.
    append_records(&db, 36, 70)?;
    let seen = collect_log(&db)?;
    assert_eq!(seen.len(), 70);
    for (pos, (s, n)) in seen.iter().enumerate() {
        let expect = 70 - pos as i32;
        assert_eq!(s, &format!("record{}", expect));
        assert_eq!(*n, expect + 100);
    }
    Ok(())
}

#[test]
fn test_log_spans_multiple_blocks() -> Result<()> {
    let (db, _dir) = create_test_db(TEST_BLOCK_SIZE, 8)?;

    append_records(&db, 1, 70)?;
    db.log_manager().flush(i32::MAX)?;

    // 70 records of ~22 bytes each cannot fit in one 400-byte block.
    assert!(db.disk_manager().length(quarrydb::LOG_FILE)? > 1);
    Ok(())
}

#[test]
fn test_iterator_reflects_unflushed_appends() -> Result<()> {
    let (db, _dir) = create_test_db(TEST_BLOCK_SIZE, 8)?;
    let log = db.log_manager();

    log.append(&make_record(1))?;
    // iterator() forces a flush, so the record must be visible.
    let seen = collect_log(&db)?;
    assert_eq!(seen, vec![("record1".to_string(), 101)]);
    Ok(())
}

#[test]
fn test_log_survives_reopen() -> Result<()> {
    let dir = tempfile::TempDir::new()?;
    {
        let db = Database::new(dir.path(), TEST_BLOCK_SIZE, 8)?;
        append_records(&db, 1, 10)?;
        db.log_manager().flush(i32::MAX)?;
    }

    let db = Database::new(dir.path(), TEST_BLOCK_SIZE, 8)?;
    let seen = collect_log(&db)?;
    assert_eq!(seen.len(), 10);
    assert_eq!(seen[0], ("record10".to_string(), 110));
    assert_eq!(seen[9], ("record1".to_string(), 101));
    Ok(())
}
