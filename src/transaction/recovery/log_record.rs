use std::fmt;

use thiserror::Error;

use crate::common::types::{BlockId, Lsn, TxnId};
use crate::storage::page::{max_length, Page, INT_SIZE};
use crate::transaction::recovery::Transactor;
use crate::transaction::wal::{LogError, LogManager};
use crate::transaction::TransactionError;

/// On-disk record type tags. The values are part of the log format.
const TAG_CHECKPOINT: i32 = 1;
const TAG_START: i32 = 2;
const TAG_COMMIT: i32 = 3;
const TAG_ROLLBACK: i32 = 4;
const TAG_SET_INT: i32 = 5;
const TAG_SET_STRING: i32 = 6;

#[derive(Error, Debug)]
pub enum LogRecordError {
    /// An unrecognized type tag; the log is corrupt and the sweep reading
    /// it must stop.
    #[error("unknown log record type tag {0}")]
    UnknownKind(i32),
}

/// A typed write-ahead log record.
///
/// Update records store the value the block held *before* the change, so
/// undoing one overwrites the page with that prior value.
#[derive(Debug, Clone, PartialEq)]
pub enum LogRecord {
    Start {
        txn: TxnId,
    },
    Commit {
        txn: TxnId,
    },
    Rollback {
        txn: TxnId,
    },
    Checkpoint,
    SetInt {
        txn: TxnId,
        blk: BlockId,
        offset: usize,
        old_val: i32,
    },
    SetString {
        txn: TxnId,
        blk: BlockId,
        offset: usize,
        old_val: String,
    },
}

impl LogRecord {
    /// The transaction the record belongs to; checkpoints belong to none.
    pub fn txn(&self) -> Option<TxnId> {
        match self {
            LogRecord::Start { txn }
            | LogRecord::Commit { txn }
            | LogRecord::Rollback { txn }
            | LogRecord::SetInt { txn, .. }
            | LogRecord::SetString { txn, .. } => Some(*txn),
            LogRecord::Checkpoint => None,
        }
    }

    /// Decode a record from its byte image.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, LogRecordError> {
        let page = Page::from_bytes(bytes.to_vec());
        let tag = page.get_int(0);
        let rec = match tag {
            TAG_CHECKPOINT => LogRecord::Checkpoint,
            TAG_START => LogRecord::Start {
                txn: page.get_int(INT_SIZE),
            },
            TAG_COMMIT => LogRecord::Commit {
                txn: page.get_int(INT_SIZE),
            },
            TAG_ROLLBACK => LogRecord::Rollback {
                txn: page.get_int(INT_SIZE),
            },
            TAG_SET_INT => {
                let (txn, blk, offset, val_pos) = Self::decode_update_header(&page);
                LogRecord::SetInt {
                    txn,
                    blk,
                    offset,
                    old_val: page.get_int(val_pos),
                }
            }
            TAG_SET_STRING => {
                let (txn, blk, offset, val_pos) = Self::decode_update_header(&page);
                LogRecord::SetString {
                    txn,
                    blk,
                    offset,
                    old_val: page.get_string(val_pos),
                }
            }
            other => return Err(LogRecordError::UnknownKind(other)),
        };
        Ok(rec)
    }

    /// Encode and append this record, returning its LSN. The record is not
    /// durable until the log is flushed through that LSN.
    pub fn write_to_log(&self, log: &LogManager) -> Result<Lsn, LogError> {
        log.append(&self.to_bytes())
    }

    /// Reverse this record's effect through the transaction that is rolling
    /// back (or the recovery transaction). Only update records carry work;
    /// the undo write is deliberately unlogged.
    pub fn undo(&self, tx: &mut dyn Transactor) -> Result<(), TransactionError> {
        match self {
            LogRecord::SetInt {
                blk,
                offset,
                old_val,
                ..
            } => {
                tx.pin(blk)?;
                tx.set_int_unlogged(blk, *offset, *old_val)?;
                tx.unpin(blk);
            }
            LogRecord::SetString {
                blk,
                offset,
                old_val,
                ..
            } => {
                tx.pin(blk)?;
                tx.set_string_unlogged(blk, *offset, old_val)?;
                tx.unpin(blk);
            }
            _ => {}
        }
        Ok(())
    }

    fn to_bytes(&self) -> Vec<u8> {
        match self {
            LogRecord::Checkpoint => {
                let mut page = Page::new(INT_SIZE);
                page.set_int(0, TAG_CHECKPOINT);
                page.into_bytes()
            }
            LogRecord::Start { txn } => Self::encode_txn_only(TAG_START, *txn),
            LogRecord::Commit { txn } => Self::encode_txn_only(TAG_COMMIT, *txn),
            LogRecord::Rollback { txn } => Self::encode_txn_only(TAG_ROLLBACK, *txn),
            LogRecord::SetInt {
                txn,
                blk,
                offset,
                old_val,
            } => {
                let (mut page, val_pos) = Self::encode_update_header(
                    TAG_SET_INT,
                    *txn,
                    blk,
                    *offset,
                    INT_SIZE,
                );
                page.set_int(val_pos, *old_val);
                page.into_bytes()
            }
            LogRecord::SetString {
                txn,
                blk,
                offset,
                old_val,
            } => {
                let val_size = max_length(old_val.encode_utf16().count());
                let (mut page, val_pos) =
                    Self::encode_update_header(TAG_SET_STRING, *txn, blk, *offset, val_size);
                page.set_string(val_pos, old_val);
                page.into_bytes()
            }
        }
    }

    fn encode_txn_only(tag: i32, txn: TxnId) -> Vec<u8> {
        let mut page = Page::new(2 * INT_SIZE);
        page.set_int(0, tag);
        page.set_int(INT_SIZE, txn);
        page.into_bytes()
    }

    /// Lay out `[tag, txn, filename, block index, offset]` and return the
    /// page (sized to also hold a value of `val_size` bytes) along with the
    /// offset where the value goes.
    fn encode_update_header(
        tag: i32,
        txn: TxnId,
        blk: &BlockId,
        offset: usize,
        val_size: usize,
    ) -> (Page, usize) {
        let txn_pos = INT_SIZE;
        let file_pos = txn_pos + INT_SIZE;
        let blk_pos = file_pos + max_length(blk.filename().encode_utf16().count());
        let offset_pos = blk_pos + INT_SIZE;
        let val_pos = offset_pos + INT_SIZE;

        let mut page = Page::new(val_pos + val_size);
        page.set_int(0, tag);
        page.set_int(txn_pos, txn);
        page.set_string(file_pos, blk.filename());
        page.set_int(blk_pos, blk.index());
        page.set_int(offset_pos, offset as i32);
        (page, val_pos)
    }

    fn decode_update_header(page: &Page) -> (TxnId, BlockId, usize, usize) {
        let txn_pos = INT_SIZE;
        let txn = page.get_int(txn_pos);

        let file_pos = txn_pos + INT_SIZE;
        let filename = page.get_string(file_pos);
        let blk_pos = file_pos + max_length(filename.encode_utf16().count());
        let blk = BlockId::new(filename, page.get_int(blk_pos));

        let offset_pos = blk_pos + INT_SIZE;
        let offset = page.get_int(offset_pos) as usize;

        (txn, blk, offset, offset_pos + INT_SIZE)
    }
}

impl fmt::Display for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogRecord::Start { txn } => write!(f, "<START {}>", txn),
            LogRecord::Commit { txn } => write!(f, "<COMMIT {}>", txn),
            LogRecord::Rollback { txn } => write!(f, "<ROLLBACK {}>", txn),
            LogRecord::Checkpoint => write!(f, "<CHECKPOINT>"),
            LogRecord::SetInt {
                txn,
                blk,
                offset,
                old_val,
            } => write!(f, "<SETINT {} {} {} {}>", txn, blk, offset, old_val),
            LogRecord::SetString {
                txn,
                blk,
                offset,
                old_val,
            } => write!(f, "<SETSTRING {} {} {} {}>", txn, blk, offset, old_val),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(rec: LogRecord) -> LogRecord {
        LogRecord::from_bytes(&rec.to_bytes()).unwrap()
    }

    #[test]
    fn test_txn_marker_records_round_trip() {
        assert_eq!(round_trip(LogRecord::Start { txn: 7 }), LogRecord::Start { txn: 7 });
        assert_eq!(
            round_trip(LogRecord::Commit { txn: 8 }),
            LogRecord::Commit { txn: 8 }
        );
        assert_eq!(
            round_trip(LogRecord::Rollback { txn: 9 }),
            LogRecord::Rollback { txn: 9 }
        );
        assert_eq!(round_trip(LogRecord::Checkpoint), LogRecord::Checkpoint);
    }

    #[test]
    fn test_set_int_round_trip() {
        let rec = LogRecord::SetInt {
            txn: 3,
            blk: BlockId::new("accounts", 12),
            offset: 80,
            old_val: -500,
        };
        assert_eq!(round_trip(rec.clone()), rec);
    }

    #[test]
    fn test_set_string_keeps_its_own_tag() {
        // The record must decode back as SETSTRING, not as SETINT.
        let rec = LogRecord::SetString {
            txn: 4,
            blk: BlockId::new("accounts", 2),
            offset: 40,
            old_val: "before".to_string(),
        };
        let decoded = round_trip(rec.clone());
        assert_eq!(decoded, rec);
        assert!(matches!(decoded, LogRecord::SetString { .. }));
    }

    #[test]
    fn test_unknown_tag_is_rejected() {
        let mut page = Page::new(INT_SIZE);
        page.set_int(0, 99);
        assert!(matches!(
            LogRecord::from_bytes(page.as_bytes()),
            Err(LogRecordError::UnknownKind(99))
        ));
    }

    #[test]
    fn test_display_formats() {
        let rec = LogRecord::SetInt {
            txn: 1,
            blk: BlockId::new("data", 0),
            offset: 16,
            old_val: 42,
        };
        assert_eq!(rec.to_string(), "<SETINT 1 [file data, block 0] 16 42>");
        assert_eq!(LogRecord::Checkpoint.to_string(), "<CHECKPOINT>");
    }
}
