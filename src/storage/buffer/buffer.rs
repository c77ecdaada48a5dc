use std::sync::Arc;

use log::trace;

use crate::common::types::{BlockId, Lsn, TxnId};
use crate::storage::buffer::error::BufferPoolError;
use crate::storage::disk::DiskManager;
use crate::storage::page::Page;
use crate::transaction::wal::LogManager;

/// One frame of the buffer pool: a page image, the block it currently
/// holds, its pin count, and — when dirty — the transaction that modified
/// it together with the LSN of the log record describing the change.
///
/// Invariants: a pinned frame is never reassigned, and a dirty page is
/// written back (log first) before its frame takes on a different block.
pub struct Buffer {
    disk: Arc<DiskManager>,
    log: Arc<LogManager>,
    contents: Page,
    block: Option<BlockId>,
    pins: i32,
    txn: Option<TxnId>,
    lsn: Lsn,
}

impl Buffer {
    pub(crate) fn new(disk: Arc<DiskManager>, log: Arc<LogManager>) -> Self {
        let contents = Page::new(disk.block_size());
        Self {
            disk,
            log,
            contents,
            block: None,
            pins: 0,
            txn: None,
            lsn: -1,
        }
    }

    pub fn contents(&self) -> &Page {
        &self.contents
    }

    pub fn contents_mut(&mut self) -> &mut Page {
        &mut self.contents
    }

    pub fn block(&self) -> Option<&BlockId> {
        self.block.as_ref()
    }

    pub fn is_pinned(&self) -> bool {
        self.pins > 0
    }

    /// The transaction the page is dirty on behalf of, if any.
    pub fn modifying_txn(&self) -> Option<TxnId> {
        self.txn
    }

    /// Record that `txn` modified the page. A non-negative `lsn` is the log
    /// record describing the change; undo writes pass -1 and leave the
    /// frame's LSN untouched.
    pub fn set_modified(&mut self, txn: TxnId, lsn: Lsn) {
        self.txn = Some(txn);
        if lsn >= 0 {
            self.lsn = lsn;
        }
    }

    pub(crate) fn pin(&mut self) {
        self.pins += 1;
    }

    pub(crate) fn unpin(&mut self) {
        debug_assert!(self.pins > 0, "unpinning a frame with no pins");
        self.pins -= 1;
    }

    /// Write the page back and load `blk` into this frame.
    pub(crate) fn assign_to_block(&mut self, blk: BlockId) -> Result<(), BufferPoolError> {
        self.flush()?;
        self.disk.read_block(&blk, &mut self.contents)?;
        self.block = Some(blk);
        self.pins = 0;
        Ok(())
    }

    /// If dirty, write the page to disk and mark the frame clean. The log
    /// is flushed through the frame's LSN first, preserving the
    /// write-ahead rule on every path that writes a page.
    pub(crate) fn flush(&mut self) -> Result<(), BufferPoolError> {
        if self.txn.is_none() {
            return Ok(());
        }
        let blk = self
            .block
            .as_ref()
            .expect("dirty frame with no assigned block");

        self.log.flush(self.lsn)?;
        self.disk.write_block(blk, &self.contents)?;
        trace!("flushed {} for txn {:?}", blk, self.txn);
        self.txn = None;
        Ok(())
    }
}
