use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;

use crate::common::types::BlockId;
use crate::storage::page::Page;

#[derive(Error, Debug)]
pub enum DiskManagerError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// DiskManager owns the database directory and performs all block I/O.
///
/// Every file lives directly in the directory and is opened at most once;
/// the handle is cached and shared. A single cursor is used for seek + read
/// and seek + write, so all I/O on one file is serialized through that
/// file's mutex. `extend` computes the new block index and writes the zero
/// block under the same critical section, so concurrent extends of one file
/// cannot produce the same index.
pub struct DiskManager {
    db_dir: PathBuf,
    block_size: usize,
    files: Mutex<HashMap<String, Arc<Mutex<File>>>>,
}

impl DiskManager {
    /// Open the database directory, creating it (mode 0700) if absent, and
    /// remove leftover `temp*` files from earlier runs.
    pub fn new(db_dir: impl AsRef<Path>, block_size: usize) -> Result<Self, DiskManagerError> {
        let db_dir = db_dir.as_ref().to_path_buf();

        if !db_dir.exists() {
            let mut builder = fs::DirBuilder::new();
            builder.recursive(true);
            #[cfg(unix)]
            {
                use std::os::unix::fs::DirBuilderExt;
                builder.mode(0o700);
            }
            builder.create(&db_dir)?;
        }

        for entry in fs::read_dir(&db_dir)? {
            let entry = entry?;
            if entry.file_name().to_string_lossy().starts_with("temp") {
                fs::remove_file(entry.path())?;
            }
        }

        Ok(Self {
            db_dir,
            block_size,
            files: Mutex::new(HashMap::new()),
        })
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn db_dir(&self) -> &Path {
        &self.db_dir
    }

    /// Read the block into `page`. A short read at end-of-file is not an
    /// error; the tail of the page is left unchanged.
    pub fn read_block(&self, blk: &BlockId, page: &mut Page) -> Result<(), DiskManagerError> {
        let handle = self.handle(blk.filename())?;
        let mut file = handle.lock();

        file.seek(SeekFrom::Start(self.offset_of(blk)))?;

        let buf = page.as_bytes_mut();
        let mut filled = 0;
        while filled < buf.len() {
            let n = file.read(&mut buf[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        Ok(())
    }

    /// Write the full page at the block's offset, growing the file if
    /// needed, and sync the data to disk.
    pub fn write_block(&self, blk: &BlockId, page: &Page) -> Result<(), DiskManagerError> {
        let handle = self.handle(blk.filename())?;
        let mut file = handle.lock();

        file.seek(SeekFrom::Start(self.offset_of(blk)))?;
        file.write_all(page.as_bytes())?;
        file.sync_data()?;
        Ok(())
    }

    /// Append a zero-filled block to the file and return its id.
    pub fn extend(&self, filename: &str) -> Result<BlockId, DiskManagerError> {
        let handle = self.handle(filename)?;
        let mut file = handle.lock();

        let new_index = (file.metadata()?.len() / self.block_size as u64) as i32;
        file.seek(SeekFrom::Start(new_index as u64 * self.block_size as u64))?;
        file.write_all(&vec![0u8; self.block_size])?;
        file.sync_data()?;

        Ok(BlockId::new(filename, new_index))
    }

    /// Number of blocks in the file.
    pub fn length(&self, filename: &str) -> Result<i32, DiskManagerError> {
        let handle = self.handle(filename)?;
        let len = handle.lock().metadata()?.len();
        Ok((len / self.block_size as u64) as i32)
    }

    fn offset_of(&self, blk: &BlockId) -> u64 {
        debug_assert!(blk.index() >= 0, "I/O on sentinel block {}", blk);
        blk.index() as u64 * self.block_size as u64
    }

    fn handle(&self, filename: &str) -> Result<Arc<Mutex<File>>, DiskManagerError> {
        let mut files = self.files.lock();
        if let Some(handle) = files.get(filename) {
            return Ok(Arc::clone(handle));
        }

        let mut opts = OpenOptions::new();
        opts.read(true).write(true).create(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            opts.mode(0o600);
        }
        let file = opts.open(self.db_dir.join(filename))?;

        let handle = Arc::new(Mutex::new(file));
        files.insert(filename.to_string(), Arc::clone(&handle));
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_extend_then_length() {
        let dir = TempDir::new().unwrap();
        let disk = DiskManager::new(dir.path(), 128).unwrap();

        assert_eq!(disk.length("data").unwrap(), 0);

        let b0 = disk.extend("data").unwrap();
        let b1 = disk.extend("data").unwrap();

        assert_eq!(b0.index(), 0);
        assert_eq!(b1.index(), 1);
        assert_eq!(disk.length("data").unwrap(), 2);
    }

    #[test]
    fn test_read_past_end_of_file_is_silent() {
        let dir = TempDir::new().unwrap();
        let disk = DiskManager::new(dir.path(), 128).unwrap();

        let mut page = Page::new(128);
        page.set_int(0, 99);
        disk.read_block(&BlockId::new("data", 5), &mut page).unwrap();

        // Nothing on disk, so the page contents are untouched.
        assert_eq!(page.get_int(0), 99);
    }

    #[test]
    fn test_temp_files_removed_on_startup() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("tempscratch"), b"x").unwrap();
        std::fs::write(dir.path().join("data"), b"x").unwrap();

        let _disk = DiskManager::new(dir.path(), 128).unwrap();

        assert!(!dir.path().join("tempscratch").exists());
        assert!(dir.path().join("data").exists());
    }
}
