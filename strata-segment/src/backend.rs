//! Storage backend primitives.
//!
//! A backend hands out fixed-capacity [`Region`]s. Regions are opaque byte
//! ranges: they know nothing about cursors, segment states, or the records
//! written into them. All cursor bookkeeping lives in [`crate::Segment`].
//!
//! Available backends:
//! - [`FileBackend`](crate::FileBackend) - preallocated file with buffered writes
//! - [`MmapBackend`](crate::MmapBackend) - preallocated, memory-mapped file
//! - [`MemoryBackend`](crate::MemoryBackend) - in-memory, with fault injection for tests

use std::fmt;
use std::io;
use std::path::Path;
use std::sync::Arc;

/// Allocates segment regions.
pub trait StorageBackend: Send + Sync + fmt::Debug {
    /// Creates a new region of exactly `capacity` bytes at `path`.
    ///
    /// Fails if the path already exists or the backing store cannot
    /// provide the space.
    fn map_region(&self, path: &Path, capacity: u64) -> io::Result<Arc<dyn Region>>;
}

/// A fixed-capacity byte region handed out by a [`StorageBackend`].
///
/// # Invariants
///
/// - `write_at` and `read_at` never touch bytes beyond `capacity`
/// - after `sync_region(start, len)` returns `Ok`, bytes in
///   `[start, start + len)` survive process termination
/// - implementations take `&self` so the flusher can sync a range while
///   the single writer appends further along
pub trait Region: Send + Sync + fmt::Debug {
    /// Returns the region's location.
    fn path(&self) -> &Path;

    /// Returns the fixed size of the region in bytes.
    fn capacity(&self) -> u64;

    /// Copies `data` into the region at `offset`.
    fn write_at(&self, offset: u64, data: &[u8]) -> io::Result<()>;

    /// Reads `len` bytes starting at `offset`.
    fn read_at(&self, offset: u64, len: usize) -> io::Result<Vec<u8>>;

    /// Durably persists the bytes in `[start, start + len)`.
    fn sync_region(&self, start: u64, len: u64) -> io::Result<()>;

    /// Persists everything and releases write access to the region.
    fn close_region(&self) -> io::Result<()>;
}

/// Checks that `[offset, offset + len)` lies inside a region of `capacity` bytes.
pub(crate) fn check_bounds(offset: u64, len: u64, capacity: u64) -> io::Result<()> {
    match offset.checked_add(len) {
        Some(end) if end <= capacity => Ok(()),
        _ => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!(
                "range {}+{} is outside region of {} bytes",
                offset, len, capacity
            ),
        )),
    }
}
