use std::collections::HashSet;
use std::sync::Arc;

use log::debug;

use crate::common::types::{Lsn, TxnId};
use crate::storage::buffer::{Buffer, BufferManager};
use crate::transaction::recovery::log_record::LogRecord;
use crate::transaction::recovery::Transactor;
use crate::transaction::wal::LogManager;
use crate::transaction::TransactionError;

/// Per-transaction undo-only recovery manager.
///
/// Constructing one logs the transaction's START record. Commit is
/// write-through: the transaction's dirty pages are flushed before the
/// COMMIT record is forced to disk, so no redo pass is ever needed; a
/// crash-recovery sweep only undoes updates of unfinished transactions.
///
/// Undo work is applied through the [`Transactor`] capability rather than
/// a back-reference to the transaction, so the recovery manager can live
/// inside the transaction that owns it.
#[derive(Clone)]
pub struct RecoveryManager {
    log_mgr: Arc<LogManager>,
    buffer_mgr: Arc<BufferManager>,
    txn: TxnId,
}

impl RecoveryManager {
    pub fn new(
        log_mgr: Arc<LogManager>,
        buffer_mgr: Arc<BufferManager>,
        txn: TxnId,
    ) -> Result<Self, TransactionError> {
        LogRecord::Start { txn }.write_to_log(&log_mgr)?;
        Ok(Self {
            log_mgr,
            buffer_mgr,
            txn,
        })
    }

    /// Flush this transaction's buffers, then force a COMMIT record to disk.
    pub fn commit(&self) -> Result<(), TransactionError> {
        self.buffer_mgr.flush_all(self.txn)?;
        let lsn = LogRecord::Commit { txn: self.txn }.write_to_log(&self.log_mgr)?;
        self.log_mgr.flush(lsn)?;
        Ok(())
    }

    /// Undo this transaction's updates newest-first back to its START
    /// record, then flush its buffers and force a ROLLBACK record.
    pub fn rollback(&self, tx: &mut dyn Transactor) -> Result<(), TransactionError> {
        self.undo_own_updates(tx)?;
        self.buffer_mgr.flush_all(self.txn)?;
        let lsn = LogRecord::Rollback { txn: self.txn }.write_to_log(&self.log_mgr)?;
        self.log_mgr.flush(lsn)?;
        Ok(())
    }

    /// Crash recovery: one newest-first sweep of the whole log, undoing
    /// every update of a transaction with no COMMIT or ROLLBACK on record,
    /// bounded by the most recent CHECKPOINT. A fresh CHECKPOINT is then
    /// forced so later sweeps stop here.
    pub fn recover(&self, tx: &mut dyn Transactor) -> Result<(), TransactionError> {
        self.undo_unfinished(tx)?;
        self.buffer_mgr.flush_all(self.txn)?;
        let lsn = LogRecord::Checkpoint.write_to_log(&self.log_mgr)?;
        self.log_mgr.flush(lsn)?;
        Ok(())
    }

    /// Log the value about to be overwritten by an int write to `buf` at
    /// `offset`, returning the record's LSN.
    pub fn log_set_int(&self, buf: &Buffer, offset: usize) -> Result<Lsn, TransactionError> {
        let old_val = buf.contents().get_int(offset);
        let blk = buf
            .block()
            .expect("logging a write to an unassigned buffer")
            .clone();
        let lsn = LogRecord::SetInt {
            txn: self.txn,
            blk,
            offset,
            old_val,
        }
        .write_to_log(&self.log_mgr)?;
        Ok(lsn)
    }

    /// String counterpart of `log_set_int`.
    pub fn log_set_string(&self, buf: &Buffer, offset: usize) -> Result<Lsn, TransactionError> {
        let old_val = buf.contents().get_string(offset);
        let blk = buf
            .block()
            .expect("logging a write to an unassigned buffer")
            .clone();
        let lsn = LogRecord::SetString {
            txn: self.txn,
            blk,
            offset,
            old_val,
        }
        .write_to_log(&self.log_mgr)?;
        Ok(lsn)
    }

    fn undo_own_updates(&self, tx: &mut dyn Transactor) -> Result<(), TransactionError> {
        for bytes in self.log_mgr.iterator()? {
            let rec = LogRecord::from_bytes(&bytes?)?;
            if rec.txn() != Some(self.txn) {
                continue;
            }
            if matches!(rec, LogRecord::Start { .. }) {
                return Ok(());
            }
            debug!("rollback of txn {}: undoing {}", self.txn, rec);
            rec.undo(tx)?;
        }
        Ok(())
    }

    fn undo_unfinished(&self, tx: &mut dyn Transactor) -> Result<(), TransactionError> {
        let mut finished: HashSet<TxnId> = HashSet::new();
        for bytes in self.log_mgr.iterator()? {
            let rec = LogRecord::from_bytes(&bytes?)?;
            match rec {
                LogRecord::Checkpoint => return Ok(()),
                LogRecord::Commit { txn } | LogRecord::Rollback { txn } => {
                    finished.insert(txn);
                }
                ref other => {
                    if let Some(txn) = other.txn() {
                        if !finished.contains(&txn) {
                            debug!("recovery: undoing {}", other);
                            other.undo(tx)?;
                        }
                    }
                }
            }
        }
        Ok(())
    }
}
