//! Core error types.

use strata_segment::{SegmentError, SegmentId};
use std::time::Duration;
use thiserror::Error;

/// Errors from collection journals.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("segment error: {0}")]
    Segment(#[from] SegmentError),

    #[error("journal of collection '{collection}' is unusable after a write error")]
    JournalUnusable { collection: String },

    #[error("no writable segment for collection '{collection}' after {waited:?}")]
    NoWritableSegment { collection: String, waited: Duration },

    #[error("record of {size} bytes can never fit a journal of {capacity} bytes")]
    RecordTooLarge { size: u64, capacity: u64 },

    #[error("collection already loaded: {name}")]
    CollectionExists { name: String },

    #[error("collection not found: {name}")]
    CollectionNotFound { name: String },

    #[error("segment {segment} is not writable in collection '{collection}'")]
    SegmentNotFound {
        collection: String,
        segment: SegmentId,
    },

    #[error("datafile not found: {segment}")]
    DatafileNotFound { segment: SegmentId },

    #[error("read of {len} bytes at offset {offset} is outside datafile {segment} ({length} bytes)")]
    ReadOutOfBounds {
        segment: SegmentId,
        offset: u64,
        len: usize,
        length: u64,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    /// Returns whether this error indicates the operation can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            CoreError::Segment(e) => e.is_retryable(),
            CoreError::NoWritableSegment { .. } | CoreError::Io(_) => true,
            _ => false,
        }
    }

    /// Returns a stable error code for logs and callers.
    pub fn error_code(&self) -> &'static str {
        match self {
            CoreError::Segment(SegmentError::Allocation { .. }) => "ALLOCATION_FAILED",
            CoreError::Segment(SegmentError::Flush { .. }) => "FLUSH_FAILED",
            CoreError::Segment(SegmentError::CapacityExceeded { .. }) => "CAPACITY_EXCEEDED",
            CoreError::Segment(_) => "SEGMENT_ERROR",
            CoreError::JournalUnusable { .. } => "JOURNAL_UNUSABLE",
            CoreError::NoWritableSegment { .. } => "NO_WRITABLE_SEGMENT",
            CoreError::RecordTooLarge { .. } => "RECORD_TOO_LARGE",
            CoreError::CollectionExists { .. } => "COLLECTION_EXISTS",
            CoreError::CollectionNotFound { .. } => "COLLECTION_NOT_FOUND",
            CoreError::SegmentNotFound { .. } => "SEGMENT_NOT_FOUND",
            CoreError::DatafileNotFound { .. } => "DATAFILE_NOT_FOUND",
            CoreError::ReadOutOfBounds { .. } => "BAD_REQUEST",
            CoreError::Io(_) => "IO_ERROR",
        }
    }
}
