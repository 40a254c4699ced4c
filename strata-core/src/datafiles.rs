//! Read-only registry of sealed segments.
//!
//! Once rotation seals a journal segment it leaves the writable set and is
//! handed here. Nothing in this crate deletes datafiles.

use crate::error::CoreError;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use strata_segment::{Region, Segment, SegmentId, SegmentState};

/// A sealed, immutable segment.
#[derive(Debug, Clone)]
pub struct SealedSegment {
    id: SegmentId,
    path: PathBuf,
    /// Bytes written before sealing; everything below is durable.
    length: u64,
    sealed_at: DateTime<Utc>,
    region: Arc<dyn Region>,
}

impl SealedSegment {
    /// Captures a sealed segment for readers.
    ///
    /// # Panics
    ///
    /// Panics if the segment is not sealed.
    pub fn from_segment(segment: &Segment) -> Self {
        assert_eq!(
            segment.state(),
            SegmentState::Sealed,
            "segment {} handed to datafiles while {}",
            segment.id(),
            segment.state()
        );
        Self {
            id: segment.id(),
            path: segment.path().to_path_buf(),
            length: segment.write_cursor(),
            sealed_at: Utc::now(),
            region: segment.region().clone(),
        }
    }

    pub fn id(&self) -> SegmentId {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> u64 {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn sealed_at(&self) -> DateTime<Utc> {
        self.sealed_at
    }

    /// Reads `len` bytes at `offset`, bounded by the sealed length.
    pub fn read_at(&self, offset: u64, len: usize) -> Result<Vec<u8>, CoreError> {
        let in_bounds = offset
            .checked_add(len as u64)
            .is_some_and(|end| end <= self.length);
        if !in_bounds {
            return Err(CoreError::ReadOutOfBounds {
                segment: self.id,
                offset,
                len,
                length: self.length,
            });
        }
        Ok(self.region.read_at(offset, len)?)
    }
}

/// Sealed segments of one collection, ordered by ID.
#[derive(Debug, Default)]
pub struct Datafiles {
    segments: RwLock<BTreeMap<SegmentId, SealedSegment>>,
}

impl Datafiles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a sealed segment.
    pub fn insert(&self, segment: SealedSegment) {
        self.segments.write().insert(segment.id(), segment);
    }

    pub fn get(&self, id: SegmentId) -> Option<SealedSegment> {
        self.segments.read().get(&id).cloned()
    }

    /// Returns the datafile IDs in ascending order.
    pub fn ids(&self) -> Vec<SegmentId> {
        self.segments.read().keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.segments.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.read().is_empty()
    }

    /// Total sealed bytes across all datafiles.
    pub fn total_bytes(&self) -> u64 {
        self.segments.read().values().map(SealedSegment::len).sum()
    }

    /// Reads from a datafile.
    pub fn read_at(&self, id: SegmentId, offset: u64, len: usize) -> Result<Vec<u8>, CoreError> {
        let segment = self
            .get(id)
            .ok_or(CoreError::DatafileNotFound { segment: id })?;
        segment.read_at(offset, len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_segment::MemoryBackend;

    fn sealed(id: SegmentId, data: &[u8]) -> SealedSegment {
        let backend = MemoryBackend::new();
        let mut segment = Segment::create(&backend, Path::new("mem"), id, 64).unwrap();
        segment.append(data).unwrap();
        segment.seal().unwrap();
        SealedSegment::from_segment(&segment)
    }

    #[test]
    fn test_datafiles_ordered_by_id() {
        let datafiles = Datafiles::new();
        datafiles.insert(sealed(5, b"five"));
        datafiles.insert(sealed(2, b"two"));

        assert_eq!(datafiles.ids(), vec![2, 5]);
        assert_eq!(datafiles.len(), 2);
        assert_eq!(datafiles.total_bytes(), 7);
    }

    #[test]
    fn test_datafile_reads_bounded_by_sealed_length() {
        let datafiles = Datafiles::new();
        datafiles.insert(sealed(1, b"sealed data"));

        assert_eq!(datafiles.read_at(1, 7, 4).unwrap(), b"data");
        assert!(matches!(
            datafiles.read_at(1, 7, 5),
            Err(CoreError::ReadOutOfBounds { length: 11, .. })
        ));
        assert!(matches!(
            datafiles.read_at(9, 0, 1),
            Err(CoreError::DatafileNotFound { segment: 9 })
        ));
    }

    #[test]
    #[should_panic(expected = "handed to datafiles")]
    fn test_unsealed_segment_rejected() {
        let backend = MemoryBackend::new();
        let segment = Segment::create(&backend, Path::new("mem"), 1, 64).unwrap();
        SealedSegment::from_segment(&segment);
    }
}
