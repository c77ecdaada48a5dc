use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::info;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::storage::buffer::BufferManager;
use crate::storage::disk::{DiskManager, DiskManagerError};
use crate::transaction::concurrency::LockTable;
use crate::transaction::wal::{LogError, LogManager};
use crate::transaction::{Transaction, TransactionError};

/// Reserved name of the write-ahead log file inside the database directory.
pub const LOG_FILE: &str = "simpledb.log";

/// Manifest file recording the parameters the directory was created with.
const MANIFEST_FILE: &str = "quarry.meta";

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("disk manager: {0}")]
    Disk(#[from] DiskManagerError),

    #[error("log manager: {0}")]
    Log(#[from] LogError),

    #[error("transaction: {0}")]
    Transaction(#[from] TransactionError),

    #[error("{MANIFEST_FILE} is not a quarrydb manifest or has an unsupported version")]
    InvalidManifest,

    #[error("database was created with block size {on_disk}, reopened with {requested}")]
    BlockSizeMismatch { on_disk: u32, requested: u32 },

    #[error("manifest encoding failed: {0}")]
    ManifestEncoding(String),
}

/// On-disk manifest. The block size must be identical across restarts —
/// block offsets are multiples of it — so it is recorded on first open and
/// validated on every later one.
#[derive(Debug, Serialize, Deserialize)]
struct Manifest {
    magic: u32,
    version: u32,
    block_size: u32,
}

impl Manifest {
    /// "QRRY" in ASCII.
    const MAGIC: u32 = 0x5152_5259;

    const VERSION: u32 = 1;

    fn new(block_size: u32) -> Self {
        Self {
            magic: Self::MAGIC,
            version: Self::VERSION,
            block_size,
        }
    }

    fn validate(&self) -> bool {
        self.magic == Self::MAGIC && self.version == Self::VERSION
    }
}

/// The assembled engine: disk manager, write-ahead log, buffer pool, lock
/// table, and the transaction counter, wired over one database directory.
///
/// Both the lock table and the counter are owned here rather than being
/// process-wide, so multiple engines can coexist in one process (each over
/// its own directory).
pub struct Database {
    disk_mgr: Arc<DiskManager>,
    log_mgr: Arc<LogManager>,
    buffer_mgr: Arc<BufferManager>,
    lock_table: Arc<LockTable>,
    next_txn: AtomicI32,
}

impl Database {
    /// Open (or create) the database directory with the default 10-second
    /// wait budgets for locks and buffer pins.
    pub fn new(
        db_dir: impl AsRef<Path>,
        block_size: usize,
        pool_size: usize,
    ) -> Result<Self, DatabaseError> {
        Self::with_wait_budget(
            db_dir,
            block_size,
            pool_size,
            crate::transaction::concurrency::MAX_LOCK_WAIT,
        )
    }

    /// Like `new`, with an explicit budget applied to both bounded waits
    /// (lock acquisition and buffer pinning).
    pub fn with_wait_budget(
        db_dir: impl AsRef<Path>,
        block_size: usize,
        pool_size: usize,
        wait_budget: Duration,
    ) -> Result<Self, DatabaseError> {
        let disk_mgr = Arc::new(DiskManager::new(db_dir, block_size)?);
        Self::check_manifest(&disk_mgr, block_size as u32)?;

        let log_mgr = Arc::new(LogManager::new(Arc::clone(&disk_mgr), LOG_FILE)?);
        let buffer_mgr = Arc::new(BufferManager::with_max_wait(
            Arc::clone(&disk_mgr),
            Arc::clone(&log_mgr),
            pool_size,
            wait_budget,
        ));

        info!(
            "opened database at {} (block size {}, {} buffers)",
            disk_mgr.db_dir().display(),
            block_size,
            pool_size
        );

        Ok(Self {
            disk_mgr,
            log_mgr,
            buffer_mgr,
            lock_table: Arc::new(LockTable::with_timeout(wait_budget)),
            next_txn: AtomicI32::new(1),
        })
    }

    /// Begin a new transaction with a fresh transaction number.
    pub fn begin_transaction(&self) -> Result<Transaction, TransactionError> {
        let txn = self.next_txn.fetch_add(1, Ordering::SeqCst);
        Transaction::new(
            Arc::clone(&self.disk_mgr),
            Arc::clone(&self.log_mgr),
            Arc::clone(&self.buffer_mgr),
            Arc::clone(&self.lock_table),
            txn,
        )
    }

    /// Restore the store to a state holding all committed work and none of
    /// the uncommitted work. Run once at startup, before user transactions.
    pub fn recover(&self) -> Result<(), TransactionError> {
        let mut tx = self.begin_transaction()?;
        tx.recover()
    }

    pub fn disk_manager(&self) -> Arc<DiskManager> {
        Arc::clone(&self.disk_mgr)
    }

    pub fn log_manager(&self) -> Arc<LogManager> {
        Arc::clone(&self.log_mgr)
    }

    pub fn buffer_manager(&self) -> Arc<BufferManager> {
        Arc::clone(&self.buffer_mgr)
    }

    /// Validate the directory's manifest against the requested block size,
    /// writing a fresh manifest on first open.
    fn check_manifest(disk_mgr: &DiskManager, block_size: u32) -> Result<(), DatabaseError> {
        let path = disk_mgr.db_dir().join(MANIFEST_FILE);

        if path.exists() {
            let bytes = fs::read(&path)?;
            let manifest: Manifest =
                bincode::deserialize(&bytes).map_err(|_| DatabaseError::InvalidManifest)?;
            if !manifest.validate() {
                return Err(DatabaseError::InvalidManifest);
            }
            if manifest.block_size != block_size {
                return Err(DatabaseError::BlockSizeMismatch {
                    on_disk: manifest.block_size,
                    requested: block_size,
                });
            }
            return Ok(());
        }

        let manifest = Manifest::new(block_size);
        let bytes = bincode::serialize(&manifest)
            .map_err(|e| DatabaseError::ManifestEncoding(e.to_string()))?;
        fs::write(&path, bytes)?;
        Ok(())
    }
}
