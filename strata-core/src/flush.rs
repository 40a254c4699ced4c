//! Flush scheduling.
//!
//! Invoked once per collection per collector tick. Pending ranges are
//! copied out under the journal lock, synced without it, and the outcome
//! is fed back. There are no retries within a tick, and failed segments
//! never report pending bytes again.

use crate::journal::{FlushOutcome, JournalSet};
use chrono::Utc;

/// Outcome of one flush pass over a journal set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Segments whose sync cursor advanced.
    pub flushed: usize,
    /// Bytes made durable.
    pub bytes: u64,
    /// Segments that failed during this pass.
    pub failed: usize,
    /// Results dropped because the segment changed concurrently.
    pub dropped: usize,
}

impl FlushReport {
    /// Adds another report's counts into this one.
    pub fn merge(&mut self, other: &FlushReport) {
        self.flushed += other.flushed;
        self.bytes += other.bytes;
        self.failed += other.failed;
        self.dropped += other.dropped;
    }
}

/// Flushes every segment of `journals` with unsynced bytes.
pub fn flush_journals(journals: &JournalSet) -> FlushReport {
    let mut report = FlushReport::default();

    for snapshot in journals.snapshot_segments() {
        let Some(range) = snapshot.pending else {
            continue;
        };

        let outcome = match range.sync() {
            Ok(()) => FlushOutcome::Synced,
            Err(e) => {
                tracing::error!(
                    "Flush of journal {} of '{}' failed at [{}, {}): {}",
                    range.segment,
                    journals.collection(),
                    range.start,
                    range.end,
                    e
                );
                FlushOutcome::Failed
            }
        };

        let applied = journals.apply_flush_result(range.segment, range.end, Utc::now(), outcome);
        match (applied, outcome) {
            (false, _) => report.dropped += 1,
            (true, FlushOutcome::Synced) => {
                tracing::info!(
                    "Flushed journal {} of '{}' up to {} ({} bytes)",
                    range.segment,
                    journals.collection(),
                    range.end,
                    range.len()
                );
                report.flushed += 1;
                report.bytes += range.len();
            }
            (true, FlushOutcome::Failed) => report.failed += 1,
        }
    }

    report
}
