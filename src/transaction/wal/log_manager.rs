use std::sync::Arc;

use log::trace;
use parking_lot::Mutex;
use thiserror::Error;

use crate::common::types::{BlockId, Lsn};
use crate::storage::disk::{DiskManager, DiskManagerError};
use crate::storage::page::{Page, INT_SIZE};

#[derive(Error, Debug)]
pub enum LogError {
    #[error("disk error: {0}")]
    Disk(#[from] DiskManagerError),

    #[error("log record of {size} bytes cannot fit in a {max}-byte log block")]
    RecordTooLarge { size: usize, max: usize },
}

/// Mutable log state: the page holding the current (highest) log block and
/// the LSN bookkeeping. Guarded by the manager's mutex as one unit.
struct LogInner {
    page: Page,
    current_blk: BlockId,
    latest_lsn: Lsn,
    last_saved_lsn: Lsn,
}

/// Append-only write-ahead log over the disk manager.
///
/// Each log block stores records from the right edge leftward. The first
/// i32 of a block is the *boundary*: the offset of the most recently
/// appended record. A record is a length-prefixed byte slice, so scanning
/// from the boundary to the end of the block yields records newest-first,
/// and walking blocks from the highest index down extends that order over
/// the whole file.
///
/// LSNs are monotonic within a process lifetime and are not persisted; a
/// restart begins again from 1. An appended record is not durable until a
/// `flush` at or above its LSN.
pub struct LogManager {
    disk: Arc<DiskManager>,
    log_file: String,
    inner: Mutex<LogInner>,
}

impl LogManager {
    /// Open the log, creating its first block if the file is empty,
    /// otherwise staging the last existing block for further appends.
    pub fn new(disk: Arc<DiskManager>, log_file: impl Into<String>) -> Result<Self, LogError> {
        let log_file = log_file.into();
        let mut page = Page::new(disk.block_size());

        let log_size = disk.length(&log_file)?;
        let current_blk = if log_size == 0 {
            Self::extend_log(&disk, &log_file, &mut page)?
        } else {
            let blk = BlockId::new(log_file.clone(), log_size - 1);
            disk.read_block(&blk, &mut page)?;
            blk
        };

        Ok(Self {
            disk,
            log_file,
            inner: Mutex::new(LogInner {
                page,
                current_blk,
                latest_lsn: 0,
                last_saved_lsn: 0,
            }),
        })
    }

    /// Append a zero block to the log file and reset the page to an empty
    /// block image whose boundary sits at the block size.
    fn extend_log(
        disk: &DiskManager,
        log_file: &str,
        page: &mut Page,
    ) -> Result<BlockId, LogError> {
        let blk = disk.extend(log_file)?;
        page.set_int(0, disk.block_size() as i32);
        disk.write_block(&blk, page)?;
        Ok(blk)
    }

    /// Append a record and return its LSN. The record is staged in the log
    /// page only; call `flush` to make it durable.
    pub fn append(&self, rec: &[u8]) -> Result<Lsn, LogError> {
        let block_size = self.disk.block_size();
        let bytes_needed = rec.len() + INT_SIZE;
        if bytes_needed + INT_SIZE > block_size {
            return Err(LogError::RecordTooLarge {
                size: rec.len(),
                max: block_size - 2 * INT_SIZE,
            });
        }

        let mut inner = self.inner.lock();

        let mut boundary = inner.page.get_int(0) as usize;
        if boundary < bytes_needed + INT_SIZE {
            // The record does not fit in front of the boundary int32, so
            // persist this block and start a fresh one.
            trace!("log block {} full, rolling over", inner.current_blk);
            self.save_page(&mut inner)?;
            let new_blk = Self::extend_log(&self.disk, &self.log_file, &mut inner.page)?;
            inner.current_blk = new_blk;
            boundary = inner.page.get_int(0) as usize;
        }

        let rec_pos = boundary - bytes_needed;
        inner.page.set_bytes(rec_pos, rec);
        inner.page.set_int(0, rec_pos as i32);

        inner.latest_lsn += 1;
        Ok(inner.latest_lsn)
    }

    /// Ensure the record with the given LSN (and everything before it) is
    /// on disk. A no-op when an earlier flush already covered it.
    pub fn flush(&self, lsn: Lsn) -> Result<(), LogError> {
        let mut inner = self.inner.lock();
        if lsn >= inner.last_saved_lsn {
            self.save_page(&mut inner)?;
        }
        Ok(())
    }

    /// Flush, then iterate the whole log newest-first.
    pub fn iterator(&self) -> Result<LogIterator, LogError> {
        let current_blk = {
            let mut inner = self.inner.lock();
            self.save_page(&mut inner)?;
            inner.current_blk.clone()
        };
        LogIterator::new(Arc::clone(&self.disk), current_blk)
    }

    fn save_page(&self, inner: &mut LogInner) -> Result<(), LogError> {
        self.disk.write_block(&inner.current_blk, &inner.page)?;
        inner.last_saved_lsn = inner.latest_lsn;
        Ok(())
    }
}

/// Yields log records newest-first, walking each block from its boundary
/// rightward and the blocks themselves from the highest index down to 0.
/// The sequence is the exact reverse of append order.
pub struct LogIterator {
    disk: Arc<DiskManager>,
    blk: BlockId,
    page: Page,
    current_pos: usize,
}

impl LogIterator {
    fn new(disk: Arc<DiskManager>, blk: BlockId) -> Result<Self, LogError> {
        let page = Page::new(disk.block_size());
        let mut it = Self {
            disk,
            blk: blk.clone(),
            page,
            current_pos: 0,
        };
        it.move_to_block(blk)?;
        Ok(it)
    }

    fn move_to_block(&mut self, blk: BlockId) -> Result<(), LogError> {
        self.disk.read_block(&blk, &mut self.page)?;
        self.current_pos = self.page.get_int(0) as usize;
        self.blk = blk;
        Ok(())
    }

    fn has_next(&self) -> bool {
        self.current_pos < self.disk.block_size() || self.blk.index() > 0
    }
}

impl Iterator for LogIterator {
    type Item = Result<Vec<u8>, LogError>;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.has_next() {
            return None;
        }

        if self.current_pos == self.disk.block_size() {
            let prev = BlockId::new(self.blk.filename().to_string(), self.blk.index() - 1);
            if let Err(e) = self.move_to_block(prev) {
                return Some(Err(e));
            }
        }

        let rec = self.page.get_bytes(self.current_pos).to_vec();
        self.current_pos += INT_SIZE + rec.len();
        Some(Ok(rec))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_log() -> (LogManager, TempDir) {
        let dir = TempDir::new().unwrap();
        let disk = Arc::new(DiskManager::new(dir.path(), 96).unwrap());
        (LogManager::new(disk, "wal_test.log").unwrap(), dir)
    }

    #[test]
    fn test_lsns_are_sequential() {
        let (log, _dir) = test_log();
        assert_eq!(log.append(b"first").unwrap(), 1);
        assert_eq!(log.append(b"second").unwrap(), 2);
        assert_eq!(log.append(b"third").unwrap(), 3);
    }

    #[test]
    fn test_iterator_yields_newest_first() {
        let (log, _dir) = test_log();
        log.append(b"one").unwrap();
        log.append(b"two").unwrap();
        log.append(b"three").unwrap();

        let recs: Vec<Vec<u8>> = log.iterator().unwrap().map(|r| r.unwrap()).collect();
        assert_eq!(recs, vec![b"three".to_vec(), b"two".to_vec(), b"one".to_vec()]);
    }

    #[test]
    fn test_record_larger_than_block_is_rejected() {
        let (log, _dir) = test_log();
        let huge = vec![0u8; 200];
        assert!(matches!(
            log.append(&huge),
            Err(LogError::RecordTooLarge { .. })
        ));
    }
}
