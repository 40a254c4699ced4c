//! # strata-segment
//!
//! Journal segments for strata.
//!
//! This crate provides:
//! - Fixed-capacity, append-only segments with write and sync cursors
//! - An explicit segment state machine (open, full, sealed, failed)
//! - Storage backends: preallocated files, memory maps, and memory
//! - Segment file naming and directory scanning

pub mod backend;
pub mod error;
pub mod file;
pub mod memory;
pub mod mmap;
pub mod segment;
pub mod state;

pub use backend::{Region, StorageBackend};
pub use error::{is_out_of_space, SegmentError};
pub use file::{FileBackend, FileRegion};
pub use memory::{MemoryBackend, MemoryRegion};
pub use mmap::{MmapBackend, MmapRegion};
pub use segment::{Cursors, Segment, SegmentId, SegmentScanner, SyncRange};
pub use state::{SegmentEvent, SegmentState};

/// Default journal segment capacity (32 MiB).
pub const DEFAULT_JOURNAL_SIZE: u64 = 32 * 1024 * 1024;
