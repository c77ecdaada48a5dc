// Export public modules
pub mod common;
pub mod database;
pub mod storage;
pub mod transaction;

// Re-export key items for convenient access
pub use common::types::{BlockId, Lsn, TxnId};
pub use database::{Database, DatabaseError, LOG_FILE};
pub use storage::buffer::{BufferManager, BufferPoolError};
pub use storage::disk::{DiskManager, DiskManagerError};
pub use storage::page::{max_length, Page};
pub use transaction::{Transaction, TransactionError};
