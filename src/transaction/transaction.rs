use std::sync::Arc;

use log::debug;
use parking_lot::RwLock;

use crate::common::types::{BlockId, TxnId};
use crate::storage::buffer::{Buffer, BufferManager};
use crate::storage::disk::DiskManager;
use crate::transaction::buffer_list::BufferList;
use crate::transaction::concurrency::{ConcurrencyManager, LockTable};
use crate::transaction::recovery::{RecoveryManager, Transactor};
use crate::transaction::wal::LogManager;
use crate::transaction::TransactionError;

/// A single client transaction: typed reads and writes on pinned blocks,
/// with strict two-phase block locking, undo logging, and write-through
/// commit.
///
/// One transaction belongs to one thread. Reads take shared locks, writes
/// take exclusive locks, and every lock is held until `commit` or
/// `rollback`.
pub struct Transaction {
    txn: TxnId,
    disk_mgr: Arc<DiskManager>,
    buffer_mgr: Arc<BufferManager>,
    recovery_mgr: RecoveryManager,
    concur_mgr: ConcurrencyManager,
    bufs: BufferList,
}

impl Transaction {
    /// Begin a transaction with the given number. Logs its START record.
    pub(crate) fn new(
        disk_mgr: Arc<DiskManager>,
        log_mgr: Arc<LogManager>,
        buffer_mgr: Arc<BufferManager>,
        lock_table: Arc<LockTable>,
        txn: TxnId,
    ) -> Result<Self, TransactionError> {
        let recovery_mgr = RecoveryManager::new(log_mgr, Arc::clone(&buffer_mgr), txn)?;
        Ok(Self {
            txn,
            disk_mgr,
            bufs: BufferList::new(Arc::clone(&buffer_mgr)),
            buffer_mgr,
            recovery_mgr,
            concur_mgr: ConcurrencyManager::new(lock_table),
        })
    }

    pub fn id(&self) -> TxnId {
        self.txn
    }

    /// Flush this transaction's writes, force COMMIT to the log, release
    /// all locks, and unpin all buffers.
    pub fn commit(&mut self) -> Result<(), TransactionError> {
        self.recovery_mgr.commit()?;
        debug!("transaction {} committed", self.txn);
        self.concur_mgr.release();
        self.bufs.unpin_all();
        Ok(())
    }

    /// Undo this transaction's writes, force ROLLBACK to the log, release
    /// all locks, and unpin all buffers.
    pub fn rollback(&mut self) -> Result<(), TransactionError> {
        let recovery_mgr = self.recovery_mgr.clone();
        recovery_mgr.rollback(self)?;
        debug!("transaction {} rolled back", self.txn);
        self.concur_mgr.release();
        self.bufs.unpin_all();
        Ok(())
    }

    /// Run crash recovery. Called once at startup, before any user data is
    /// pinned: undoes every unfinished transaction in the log and bounds
    /// future sweeps with a CHECKPOINT record.
    pub fn recover(&mut self) -> Result<(), TransactionError> {
        self.buffer_mgr.flush_all(self.txn)?;
        let recovery_mgr = self.recovery_mgr.clone();
        recovery_mgr.recover(self)?;
        self.concur_mgr.release();
        self.bufs.unpin_all();
        Ok(())
    }

    pub fn pin(&mut self, blk: &BlockId) -> Result<(), TransactionError> {
        self.bufs.pin(blk)?;
        Ok(())
    }

    pub fn unpin(&mut self, blk: &BlockId) {
        self.bufs.unpin(blk);
    }

    /// Read the i32 at `offset` of the pinned block, under a shared lock.
    pub fn get_int(&mut self, blk: &BlockId, offset: usize) -> Result<i32, TransactionError> {
        self.concur_mgr.s_lock(blk)?;
        let buf = self.pinned_buffer(blk);
        let val = buf.read().contents().get_int(offset);
        Ok(val)
    }

    /// Write `val` at `offset` of the pinned block, under an exclusive
    /// lock. When `ok_to_log` is set, the overwritten value is first logged
    /// so the write can be undone.
    pub fn set_int(
        &mut self,
        blk: &BlockId,
        offset: usize,
        val: i32,
        ok_to_log: bool,
    ) -> Result<(), TransactionError> {
        self.concur_mgr.x_lock(blk)?;
        let buf = self.pinned_buffer(blk);
        let lsn = if ok_to_log {
            self.recovery_mgr.log_set_int(&buf.read(), offset)?
        } else {
            -1
        };

        let mut frame = buf.write();
        frame.contents_mut().set_int(offset, val);
        frame.set_modified(self.txn, lsn);
        Ok(())
    }

    /// Read the string at `offset` of the pinned block, under a shared lock.
    pub fn get_string(
        &mut self,
        blk: &BlockId,
        offset: usize,
    ) -> Result<String, TransactionError> {
        self.concur_mgr.s_lock(blk)?;
        let buf = self.pinned_buffer(blk);
        let val = buf.read().contents().get_string(offset);
        Ok(val)
    }

    /// String counterpart of `set_int`.
    pub fn set_string(
        &mut self,
        blk: &BlockId,
        offset: usize,
        val: &str,
        ok_to_log: bool,
    ) -> Result<(), TransactionError> {
        self.concur_mgr.x_lock(blk)?;
        let buf = self.pinned_buffer(blk);
        let lsn = if ok_to_log {
            self.recovery_mgr.log_set_string(&buf.read(), offset)?
        } else {
            -1
        };

        let mut frame = buf.write();
        frame.contents_mut().set_string(offset, val);
        frame.set_modified(self.txn, lsn);
        Ok(())
    }

    /// Number of blocks in `filename`, under a shared lock on the file's
    /// end-of-file sentinel block.
    pub fn size(&mut self, filename: &str) -> Result<i32, TransactionError> {
        self.concur_mgr.s_lock(&BlockId::end_of_file(filename))?;
        Ok(self.disk_mgr.length(filename)?)
    }

    /// Append a zero block to `filename`, under an exclusive lock on the
    /// file's end-of-file sentinel block.
    pub fn append(&mut self, filename: &str) -> Result<BlockId, TransactionError> {
        self.concur_mgr.x_lock(&BlockId::end_of_file(filename))?;
        Ok(self.disk_mgr.extend(filename)?)
    }

    pub fn block_size(&self) -> usize {
        self.disk_mgr.block_size()
    }

    pub fn available_buffers(&self) -> usize {
        self.buffer_mgr.available()
    }

    /// The frame this transaction has pinned for `blk`. Reading or writing
    /// a block that was never pinned is a programmer error.
    fn pinned_buffer(&self, blk: &BlockId) -> Arc<RwLock<Buffer>> {
        self.bufs.get(blk).unwrap_or_else(|| {
            panic!("block {} is not pinned by transaction {}", blk, self.txn)
        })
    }
}

impl Transactor for Transaction {
    fn pin(&mut self, blk: &BlockId) -> Result<(), TransactionError> {
        Transaction::pin(self, blk)
    }

    fn unpin(&mut self, blk: &BlockId) {
        Transaction::unpin(self, blk);
    }

    fn set_int_unlogged(
        &mut self,
        blk: &BlockId,
        offset: usize,
        val: i32,
    ) -> Result<(), TransactionError> {
        self.set_int(blk, offset, val, false)
    }

    fn set_string_unlogged(
        &mut self,
        blk: &BlockId,
        offset: usize,
        val: &str,
    ) -> Result<(), TransactionError> {
        self.set_string(blk, offset, val, false)
    }
}
