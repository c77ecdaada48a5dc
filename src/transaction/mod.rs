mod buffer_list;
pub mod concurrency;
pub mod recovery;
mod transaction;
pub mod wal;

pub use concurrency::{LockError, LockTable};
pub use recovery::{LogRecord, LogRecordError, RecoveryManager, Transactor};
pub use transaction::Transaction;
pub use wal::{LogError, LogManager};

use thiserror::Error;

use crate::storage::buffer::BufferPoolError;
use crate::storage::disk::DiskManagerError;

/// Anything that can abort a transaction operation.
///
/// `Lock` timeouts and `Buffer` aborts are expected contention outcomes:
/// the caller rolls back and may retry. I/O and log-corruption errors
/// surface unchanged.
#[derive(Error, Debug)]
pub enum TransactionError {
    #[error("lock acquisition failed: {0}")]
    Lock(#[from] LockError),

    #[error("buffer pool: {0}")]
    Buffer(#[from] BufferPoolError),

    #[error("log: {0}")]
    Log(#[from] LogError),

    #[error("malformed log record: {0}")]
    LogRecord(#[from] LogRecordError),

    #[error("disk: {0}")]
    Disk(#[from] DiskManagerError),
}
