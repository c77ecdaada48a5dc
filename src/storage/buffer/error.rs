use thiserror::Error;

use crate::storage::disk::DiskManagerError;
use crate::transaction::wal::LogError;

#[derive(Error, Debug)]
pub enum BufferPoolError {
    /// No unpinned frame became available within the wait budget. The
    /// transaction holding the pin request must roll back.
    #[error("no unpinned buffer available")]
    BufferAbort,

    #[error("disk error: {0}")]
    Disk(#[from] DiskManagerError),

    #[error("log error: {0}")]
    Log(#[from] LogError),
}
