//! Journal rotation.
//!
//! Runs after the flush pass: full segments are sealed first, then a
//! replacement is created if no open segment remains. A collection thus
//! has at most one open segment, and at most one tick without one.

use crate::journal::{EnsureOutcome, JournalSet};
use strata_segment::SegmentId;

/// Outcome of one rotation pass over a journal set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RotationReport {
    /// Segments sealed and handed to the datafiles.
    pub sealed: usize,
    /// Segment created by this pass.
    pub created: Option<SegmentId>,
    /// Creating a replacement segment failed.
    pub creation_failed: bool,
    /// The journal holds a failed segment and gets no replacement.
    pub unusable: bool,
}

/// Seals full segments and makes sure an open segment exists.
///
/// Errors are logged where they occur and reported as flags; nothing here
/// fails the caller.
pub fn rotate_journals(journals: &JournalSet) -> RotationReport {
    let mut report = RotationReport {
        sealed: journals.close_full_segments(),
        ..RotationReport::default()
    };

    match journals.ensure_open_segment() {
        Ok(EnsureOutcome::AlreadyOpen(_)) => {}
        Ok(EnsureOutcome::Created(id)) => report.created = Some(id),
        Ok(EnsureOutcome::Unusable) => report.unusable = true,
        Err(_) => report.creation_failed = true,
    }

    report
}
