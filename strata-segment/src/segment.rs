//! Journal segment management.
//!
//! A segment is a fixed-capacity, append-only region with two cursors:
//! - the write cursor: bytes appended so far
//! - the sync cursor: bytes known to be durable
//!
//! `0 <= sync_cursor <= write_cursor <= capacity` holds after every
//! operation. Both cursors only move forward.

use crate::backend::{Region, StorageBackend};
use crate::error::SegmentError;
use crate::state::{SegmentEvent, SegmentState};
use chrono::{DateTime, Utc};
use std::io;
use std::path::Path;
use std::sync::Arc;

/// Segment identifier (monotonically increasing per collection).
pub type SegmentId = u64;

/// Segment file name format: journal-NNNNNNNNNNNNNNNN.db (16 hex digits)
pub fn segment_filename(id: SegmentId) -> String {
    format!("journal-{:016x}.db", id)
}

/// Parse segment ID from filename.
pub fn parse_segment_filename(name: &str) -> Option<SegmentId> {
    let hex = name.strip_prefix("journal-")?.strip_suffix(".db")?;
    if hex.len() != 16 {
        return None;
    }
    u64::from_str_radix(hex, 16).ok()
}

/// Point-in-time copy of a segment's cursors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursors {
    pub write: u64,
    pub sync: u64,
    pub capacity: u64,
}

impl Cursors {
    /// Bytes written but not yet durable.
    pub fn pending(&self) -> u64 {
        self.write - self.sync
    }

    /// Bytes that can still be appended.
    pub fn remaining(&self) -> u64 {
        self.capacity - self.write
    }

    /// Returns whether `sync <= write <= capacity`.
    pub fn is_consistent(&self) -> bool {
        self.sync <= self.write && self.write <= self.capacity
    }
}

/// A byte range that must be persisted to advance a segment's sync cursor.
///
/// Holds its own region handle so the I/O can run without the segment
/// (or any lock guarding it) being borrowed.
#[derive(Debug, Clone)]
pub struct SyncRange {
    pub segment: SegmentId,
    pub start: u64,
    pub end: u64,
    region: Arc<dyn Region>,
}

impl SyncRange {
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Persists the range.
    pub fn sync(&self) -> io::Result<()> {
        self.region.sync_region(self.start, self.len())
    }
}

/// A single journal segment.
#[derive(Debug)]
pub struct Segment {
    id: SegmentId,
    region: Arc<dyn Region>,
    capacity: u64,
    write_cursor: u64,
    sync_cursor: u64,
    state: SegmentState,
    last_sync: Option<DateTime<Utc>>,
}

impl Segment {
    /// Allocates a new segment region of exactly `capacity` bytes in `dir`.
    pub fn create(
        backend: &dyn StorageBackend,
        dir: &Path,
        id: SegmentId,
        capacity: u64,
    ) -> Result<Self, SegmentError> {
        let path = dir.join(segment_filename(id));

        if capacity == 0 {
            return Err(SegmentError::Allocation {
                path,
                source: io::Error::new(io::ErrorKind::InvalidInput, "zero capacity"),
            });
        }

        let region = backend
            .map_region(&path, capacity)
            .map_err(|source| SegmentError::Allocation {
                path: path.clone(),
                source,
            })?;

        Ok(Self::from_region(id, region))
    }

    /// Wraps an already allocated region as a fresh, empty segment.
    pub fn from_region(id: SegmentId, region: Arc<dyn Region>) -> Self {
        Self {
            id,
            capacity: region.capacity(),
            region,
            write_cursor: 0,
            sync_cursor: 0,
            state: SegmentState::Open,
            last_sync: None,
        }
    }

    /// Returns the segment ID.
    pub fn id(&self) -> SegmentId {
        self.id
    }

    /// Returns the segment's backing path.
    pub fn path(&self) -> &Path {
        self.region.path()
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn write_cursor(&self) -> u64 {
        self.write_cursor
    }

    pub fn sync_cursor(&self) -> u64 {
        self.sync_cursor
    }

    pub fn state(&self) -> SegmentState {
        self.state
    }

    /// Time of the last successful flush, if any.
    pub fn last_sync(&self) -> Option<DateTime<Utc>> {
        self.last_sync
    }

    pub fn cursors(&self) -> Cursors {
        Cursors {
            write: self.write_cursor,
            sync: self.sync_cursor,
            capacity: self.capacity,
        }
    }

    /// Returns the region handle, for readers.
    pub fn region(&self) -> &Arc<dyn Region> {
        &self.region
    }

    /// Returns whether the segment can take `len` more bytes.
    pub fn can_fit(&self, len: u64) -> bool {
        self.state.is_writable() && len <= self.capacity - self.write_cursor
    }

    /// Advances the write cursor by `n` bytes.
    ///
    /// Only the single writer of this segment may call this. Reaching
    /// capacity exactly marks the segment full. A request that would pass
    /// capacity also marks it full and fails without moving the cursor.
    pub fn advance_write(&mut self, n: u64) -> Result<(), SegmentError> {
        self.check_writable("advance")?;

        let available = self.capacity - self.write_cursor;
        if n > available {
            self.apply(SegmentEvent::Fill);
            return Err(SegmentError::CapacityExceeded {
                segment: self.id,
                requested: n,
                available,
            });
        }

        self.write_cursor += n;
        if self.write_cursor == self.capacity {
            self.apply(SegmentEvent::Fill);
        }
        self.check_invariant();
        Ok(())
    }

    /// Copies `data` into the region at the write cursor and advances it.
    ///
    /// Returns the offset the data was written at.
    pub fn append(&mut self, data: &[u8]) -> Result<u64, SegmentError> {
        self.check_writable("append to")?;

        let len = data.len() as u64;
        let available = self.capacity - self.write_cursor;
        if len > available {
            self.apply(SegmentEvent::Fill);
            return Err(SegmentError::CapacityExceeded {
                segment: self.id,
                requested: len,
                available,
            });
        }

        let offset = self.write_cursor;
        self.region.write_at(offset, data)?;
        self.advance_write(len)?;
        Ok(offset)
    }

    /// Marks an open segment full so rotation will seal it.
    pub fn mark_full(&mut self) -> Result<(), SegmentError> {
        match self.state.transition(SegmentEvent::Fill) {
            Some(next) => {
                self.state = next;
                Ok(())
            }
            None => Err(self.state_error("fill")),
        }
    }

    /// Returns the range that a flush would persist, if any.
    ///
    /// Failed segments never report pending bytes.
    pub fn pending_sync(&self) -> Option<SyncRange> {
        if self.state.is_terminal() || self.sync_cursor == self.write_cursor {
            return None;
        }
        Some(SyncRange {
            segment: self.id,
            start: self.sync_cursor,
            end: self.write_cursor,
            region: self.region.clone(),
        })
    }

    /// Persists `[sync_cursor, write_cursor)`.
    ///
    /// Returns the number of bytes made durable (0 if nothing was pending).
    /// On failure the segment becomes failed and the sync cursor stays put.
    pub fn flush(&mut self) -> Result<u64, SegmentError> {
        if self.state.is_terminal() {
            return Err(SegmentError::Failed(self.id));
        }

        let Some(range) = self.pending_sync() else {
            return Ok(0);
        };

        match range.sync() {
            Ok(()) => {
                self.complete_sync(range.end, Utc::now());
                Ok(range.len())
            }
            Err(source) => {
                self.fail();
                Err(SegmentError::Flush {
                    segment: self.id,
                    source,
                })
            }
        }
    }

    /// Records that everything below `up_to` is durable.
    ///
    /// A stale `up_to` behind the current sync cursor is ignored.
    ///
    /// # Panics
    ///
    /// Panics if `up_to` is past the write cursor: that would claim bytes
    /// durable that were never written.
    pub fn complete_sync(&mut self, up_to: u64, at: DateTime<Utc>) {
        assert!(
            up_to <= self.write_cursor,
            "segment {}: sync cursor {} past write cursor {}",
            self.id,
            up_to,
            self.write_cursor
        );
        if self.state.is_terminal() {
            return;
        }
        if up_to > self.sync_cursor {
            self.sync_cursor = up_to;
        }
        self.last_sync = Some(at);
        self.check_invariant();
    }

    /// Moves an open or full segment to the terminal failed state.
    ///
    /// Sealed segments have no failed transition and are left as they are.
    /// Returns whether the state changed.
    pub fn fail(&mut self) -> bool {
        let Some(next) = self.state.transition(SegmentEvent::FlushFailed) else {
            return false;
        };
        tracing::warn!(
            "Journal segment {} failed at sync={} write={}",
            self.id,
            self.sync_cursor,
            self.write_cursor
        );
        self.state = next;
        true
    }

    /// Closes the segment for writes.
    ///
    /// Outstanding bytes are flushed first; if that fails the segment
    /// becomes failed instead of sealed. Sealing twice is a no-op.
    pub fn seal(&mut self) -> Result<(), SegmentError> {
        match self.state {
            SegmentState::Failed => return Err(SegmentError::Failed(self.id)),
            SegmentState::Sealed => return Ok(()),
            SegmentState::Open | SegmentState::Full => {}
        }

        self.flush()?;
        if let Err(source) = self.region.close_region() {
            self.fail();
            return Err(SegmentError::Flush {
                segment: self.id,
                source,
            });
        }

        self.apply(SegmentEvent::Seal);
        Ok(())
    }

    fn apply(&mut self, event: SegmentEvent) {
        if let Some(next) = self.state.transition(event) {
            self.state = next;
        }
    }

    fn check_writable(&self, operation: &'static str) -> Result<(), SegmentError> {
        match self.state {
            SegmentState::Open => Ok(()),
            SegmentState::Failed => Err(SegmentError::Failed(self.id)),
            _ => Err(self.state_error(operation)),
        }
    }

    fn state_error(&self, operation: &'static str) -> SegmentError {
        if self.state.is_terminal() {
            return SegmentError::Failed(self.id);
        }
        SegmentError::InvalidState {
            segment: self.id,
            state: self.state,
            operation,
        }
    }

    fn check_invariant(&self) {
        debug_assert!(
            self.cursors().is_consistent(),
            "segment {} cursors out of order: {:?}",
            self.id,
            self.cursors()
        );
    }
}

/// Segment directory scanner.
pub struct SegmentScanner;

impl SegmentScanner {
    /// Lists all segment IDs in a directory, sorted ascending.
    ///
    /// A missing directory has no segments.
    pub fn list_segments(dir: &Path) -> Result<Vec<SegmentId>, SegmentError> {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut segments = Vec::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            if let Some(id) = parse_segment_filename(&name.to_string_lossy()) {
                segments.push(id);
            }
        }

        segments.sort_unstable();
        Ok(segments)
    }

    /// Returns the latest segment ID, or None if no segments exist.
    pub fn latest_segment(dir: &Path) -> Result<Option<SegmentId>, SegmentError> {
        let segments = Self::list_segments(dir)?;
        Ok(segments.last().copied())
    }
}
