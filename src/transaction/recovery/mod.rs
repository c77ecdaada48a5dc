mod log_record;
mod manager;

pub use log_record::{LogRecord, LogRecordError};
pub use manager::RecoveryManager;

use crate::common::types::BlockId;
use crate::transaction::TransactionError;

/// The slice of transaction capability that undo needs: pinning and
/// unlogged writes. `Transaction` implements this; recovery receives it as
/// an argument instead of holding a reference back into the transaction,
/// which would otherwise form an ownership cycle.
pub trait Transactor {
    fn pin(&mut self, blk: &BlockId) -> Result<(), TransactionError>;

    fn unpin(&mut self, blk: &BlockId);

    /// Write `val` at the offset without producing a log record.
    fn set_int_unlogged(
        &mut self,
        blk: &BlockId,
        offset: usize,
        val: i32,
    ) -> Result<(), TransactionError>;

    /// Write `val` at the offset without producing a log record.
    fn set_string_unlogged(
        &mut self,
        blk: &BlockId,
        offset: usize,
        val: &str,
    ) -> Result<(), TransactionError>;
}
