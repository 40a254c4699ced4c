//! Memory-mapped file regions.

use crate::backend::{check_bounds, Region, StorageBackend};
use memmap2::MmapMut;
use parking_lot::RwLock;
use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Backend that preallocates a file and maps it into memory.
///
/// `sync_region` flushes exactly the requested range of the mapping.
#[derive(Debug, Default, Clone, Copy)]
pub struct MmapBackend;

impl StorageBackend for MmapBackend {
    fn map_region(&self, path: &Path, capacity: u64) -> io::Result<Arc<dyn Region>> {
        Ok(Arc::new(MmapRegion::create(path, capacity)?))
    }
}

/// A preallocated, memory-mapped file region.
pub struct MmapRegion {
    path: PathBuf,
    capacity: u64,
    map: RwLock<MmapMut>,
}

impl MmapRegion {
    /// Creates the file, extends it to `capacity` bytes, and maps it.
    pub fn create(path: &Path, capacity: u64) -> io::Result<Self> {
        if capacity == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "cannot map an empty region",
            ));
        }

        let file = OpenOptions::new()
            .create_new(true)
            .read(true)
            .write(true)
            .open(path)?;

        let mapped = file.set_len(capacity).and_then(|_| {
            // SAFETY: the file was just created with `create_new` and is owned
            // exclusively by this region; nothing truncates it while mapped.
            unsafe { MmapMut::map_mut(&file) }
        });

        match mapped {
            Ok(map) => Ok(Self {
                path: path.to_path_buf(),
                capacity,
                map: RwLock::new(map),
            }),
            Err(e) => {
                drop(file);
                let _ = std::fs::remove_file(path);
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for MmapRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MmapRegion")
            .field("path", &self.path)
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl Region for MmapRegion {
    fn path(&self) -> &Path {
        &self.path
    }

    fn capacity(&self) -> u64 {
        self.capacity
    }

    fn write_at(&self, offset: u64, data: &[u8]) -> io::Result<()> {
        check_bounds(offset, data.len() as u64, self.capacity)?;
        let start = offset as usize;
        self.map.write()[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn read_at(&self, offset: u64, len: usize) -> io::Result<Vec<u8>> {
        check_bounds(offset, len as u64, self.capacity)?;
        let start = offset as usize;
        Ok(self.map.read()[start..start + len].to_vec())
    }

    fn sync_region(&self, start: u64, len: u64) -> io::Result<()> {
        check_bounds(start, len, self.capacity)?;
        if len == 0 {
            return Ok(());
        }
        self.map.read().flush_range(start as usize, len as usize)
    }

    fn close_region(&self) -> io::Result<()> {
        self.map.read().flush()
    }
}
