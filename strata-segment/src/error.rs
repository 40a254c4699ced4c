//! Segment error types.

use crate::segment::SegmentId;
use crate::state::SegmentState;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// OS error code reported when the backing store has no space left.
#[cfg(not(windows))]
const ENOSPC: i32 = 28;
/// `ERROR_DISK_FULL`.
#[cfg(windows)]
const ENOSPC: i32 = 112;

/// Errors that can occur during segment operations.
#[derive(Debug, Error)]
pub enum SegmentError {
    #[error("cannot allocate segment region {path:?}: {source}")]
    Allocation {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("flush of segment {segment} failed: {source}")]
    Flush {
        segment: SegmentId,
        #[source]
        source: io::Error,
    },

    #[error("segment {segment} capacity exceeded: requested {requested} bytes, {available} available")]
    CapacityExceeded {
        segment: SegmentId,
        requested: u64,
        available: u64,
    },

    #[error("cannot {operation} segment {segment} in state {state}")]
    InvalidState {
        segment: SegmentId,
        state: SegmentState,
        operation: &'static str,
    },

    #[error("segment {0} is in failed state")]
    Failed(SegmentId),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl SegmentError {
    /// Returns whether a later attempt may succeed.
    ///
    /// Flush failures are sticky and never retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SegmentError::Allocation { .. } | SegmentError::Io(_))
    }

    /// Returns whether the error was caused by an exhausted backing store.
    pub fn is_out_of_space(&self) -> bool {
        let source = match self {
            SegmentError::Allocation { source, .. } => source,
            SegmentError::Flush { source, .. } => source,
            SegmentError::Io(source) => source,
            _ => return false,
        };
        is_out_of_space(source)
    }
}

/// Returns whether an I/O error reports a full device.
pub fn is_out_of_space(err: &io::Error) -> bool {
    err.raw_os_error() == Some(ENOSPC)
}

/// Builds the error a backend reports when it cannot allocate more space.
pub(crate) fn out_of_space() -> io::Error {
    io::Error::from_raw_os_error(ENOSPC)
}
