//! In-memory regions for testing.

use crate::backend::{check_bounds, Region, StorageBackend};
use crate::error::out_of_space;
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// In-memory backend with fault injection.
///
/// Suitable for unit tests and ephemeral collections. Cloning shares the
/// same allocation table and fault switches, so a test can keep a clone to
/// flip faults on regions a journal set already holds.
///
/// ```rust
/// use strata_segment::{MemoryBackend, StorageBackend};
/// use std::path::Path;
///
/// let backend = MemoryBackend::new();
/// let region = backend.map_region(Path::new("journal-a.db"), 64).unwrap();
/// region.write_at(0, b"abc").unwrap();
///
/// backend.fail_syncs(true);
/// assert!(region.sync_region(0, 3).is_err());
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    shared: Arc<Shared>,
}

#[derive(Debug, Default)]
struct Shared {
    paths: Mutex<HashSet<PathBuf>>,
    /// Total bytes the backend may hand out (`None` = unlimited).
    limit: Option<u64>,
    allocated: AtomicU64,
    fail_syncs: AtomicBool,
    fail_allocations: AtomicBool,
    syncs: AtomicU64,
    synced_bytes: AtomicU64,
}

impl MemoryBackend {
    /// Creates a backend with unlimited space.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend that reports a full device once `limit` bytes
    /// have been allocated.
    pub fn with_limit(limit: u64) -> Self {
        Self {
            shared: Arc::new(Shared {
                limit: Some(limit),
                ..Shared::default()
            }),
        }
    }

    /// Makes every subsequent `sync_region` call fail.
    pub fn fail_syncs(&self, fail: bool) {
        self.shared.fail_syncs.store(fail, Ordering::SeqCst);
    }

    /// Makes every subsequent `map_region` call fail with a permission error.
    pub fn fail_allocations(&self, fail: bool) {
        self.shared.fail_allocations.store(fail, Ordering::SeqCst);
    }

    /// Number of successful `sync_region` calls that persisted at least one byte.
    pub fn syncs(&self) -> u64 {
        self.shared.syncs.load(Ordering::SeqCst)
    }

    /// Total bytes persisted by successful `sync_region` calls.
    pub fn synced_bytes(&self) -> u64 {
        self.shared.synced_bytes.load(Ordering::SeqCst)
    }

    /// Number of regions handed out so far.
    pub fn regions(&self) -> usize {
        self.shared.paths.lock().len()
    }
}

impl StorageBackend for MemoryBackend {
    fn map_region(&self, path: &Path, capacity: u64) -> io::Result<Arc<dyn Region>> {
        if self.shared.fail_allocations.load(Ordering::SeqCst) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "allocation refused",
            ));
        }

        let mut paths = self.shared.paths.lock();
        if paths.contains(path) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("region {} already exists", path.display()),
            ));
        }

        let allocated = self.shared.allocated.load(Ordering::SeqCst);
        if let Some(limit) = self.shared.limit {
            if allocated.saturating_add(capacity) > limit {
                return Err(out_of_space());
            }
        }

        self.shared
            .allocated
            .store(allocated + capacity, Ordering::SeqCst);
        paths.insert(path.to_path_buf());

        Ok(Arc::new(MemoryRegion {
            path: path.to_path_buf(),
            capacity,
            data: RwLock::new(vec![0u8; capacity as usize]),
            durable: RwLock::new(vec![0u8; capacity as usize]),
            shared: self.shared.clone(),
        }))
    }
}

/// An in-memory region.
///
/// Keeps a second copy of the bytes that stands for what is durable, so
/// tests can tell written bytes from synced bytes.
#[derive(Debug)]
pub struct MemoryRegion {
    path: PathBuf,
    capacity: u64,
    data: RwLock<Vec<u8>>,
    durable: RwLock<Vec<u8>>,
    shared: Arc<Shared>,
}

impl MemoryRegion {
    /// Returns the bytes in `[offset, offset + len)` as last persisted.
    pub fn durable_at(&self, offset: u64, len: usize) -> io::Result<Vec<u8>> {
        check_bounds(offset, len as u64, self.capacity)?;
        let start = offset as usize;
        Ok(self.durable.read()[start..start + len].to_vec())
    }
}

impl Region for MemoryRegion {
    fn path(&self) -> &Path {
        &self.path
    }

    fn capacity(&self) -> u64 {
        self.capacity
    }

    fn write_at(&self, offset: u64, data: &[u8]) -> io::Result<()> {
        check_bounds(offset, data.len() as u64, self.capacity)?;
        let start = offset as usize;
        self.data.write()[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn read_at(&self, offset: u64, len: usize) -> io::Result<Vec<u8>> {
        check_bounds(offset, len as u64, self.capacity)?;
        let start = offset as usize;
        Ok(self.data.read()[start..start + len].to_vec())
    }

    fn sync_region(&self, start: u64, len: u64) -> io::Result<()> {
        check_bounds(start, len, self.capacity)?;
        if self.shared.fail_syncs.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::Other, "injected sync failure"));
        }
        if len == 0 {
            return Ok(());
        }

        let (from, to) = (start as usize, (start + len) as usize);
        self.durable.write()[from..to].copy_from_slice(&self.data.read()[from..to]);
        self.shared.syncs.fetch_add(1, Ordering::SeqCst);
        self.shared.synced_bytes.fetch_add(len, Ordering::SeqCst);
        Ok(())
    }

    fn close_region(&self) -> io::Result<()> {
        self.sync_region(0, self.capacity)
    }
}
