//! File-based regions with buffered writes.

use crate::backend::{check_bounds, Region, StorageBackend};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Backend that preallocates a plain file per region.
///
/// `sync_region` calls `File::sync_data`, which persists the whole file;
/// that is a superset of the requested range.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileBackend;

impl StorageBackend for FileBackend {
    fn map_region(&self, path: &Path, capacity: u64) -> io::Result<Arc<dyn Region>> {
        Ok(Arc::new(FileRegion::create(path, capacity)?))
    }
}

/// A preallocated file region.
#[derive(Debug)]
pub struct FileRegion {
    path: PathBuf,
    capacity: u64,
    file: Mutex<File>,
}

impl FileRegion {
    /// Creates the file and extends it to `capacity` bytes.
    pub fn create(path: &Path, capacity: u64) -> io::Result<Self> {
        let file = OpenOptions::new()
            .create_new(true)
            .read(true)
            .write(true)
            .open(path)?;

        if let Err(e) = file.set_len(capacity) {
            drop(file);
            let _ = std::fs::remove_file(path);
            return Err(e);
        }

        Ok(Self {
            path: path.to_path_buf(),
            capacity,
            file: Mutex::new(file),
        })
    }
}

impl Region for FileRegion {
    fn path(&self) -> &Path {
        &self.path
    }

    fn capacity(&self) -> u64 {
        self.capacity
    }

    fn write_at(&self, offset: u64, data: &[u8]) -> io::Result<()> {
        check_bounds(offset, data.len() as u64, self.capacity)?;
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)
    }

    fn read_at(&self, offset: u64, len: usize) -> io::Result<Vec<u8>> {
        check_bounds(offset, len as u64, self.capacity)?;
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; len];
        file.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn sync_region(&self, start: u64, len: u64) -> io::Result<()> {
        check_bounds(start, len, self.capacity)?;
        let mut file = self.file.lock();
        file.flush()?;
        file.sync_data()
    }

    fn close_region(&self) -> io::Result<()> {
        let mut file = self.file.lock();
        file.flush()?;
        file.sync_all()
    }
}
