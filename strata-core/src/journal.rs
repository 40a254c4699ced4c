//! Per-collection journal sets.
//!
//! A [`JournalSet`] owns the writable segments of one collection. A single
//! mutex guards the segment list and every segment's state and cursors; a
//! condition variable paired with it wakes writers whenever a segment is
//! created, sealed, or fails.
//!
//! The background flusher never holds the lock across I/O: it copies the
//! pending ranges out with [`JournalSet::snapshot_segments`], syncs them,
//! then re-acquires the lock to apply the result with
//! [`JournalSet::apply_flush_result`].

use crate::datafiles::{Datafiles, SealedSegment};
use crate::error::CoreError;
use chrono::{DateTime, Utc};
use parking_lot::{Condvar, Mutex};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use strata_segment::{
    Cursors, Segment, SegmentId, SegmentScanner, SegmentState, StorageBackend, SyncRange,
    DEFAULT_JOURNAL_SIZE,
};

/// Journal configuration for one collection.
#[derive(Debug, Clone)]
pub struct JournalConfig {
    /// Directory holding the collection's segment files.
    pub dir: PathBuf,
    /// Capacity of every new segment in bytes.
    pub capacity: u64,
}

impl JournalConfig {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            capacity: DEFAULT_JOURNAL_SIZE,
        }
    }

    pub fn with_capacity(mut self, capacity: u64) -> Self {
        self.capacity = capacity;
        self
    }
}

/// Point-in-time copy of one segment, taken under the journal lock.
#[derive(Debug, Clone)]
pub struct SegmentSnapshot {
    pub id: SegmentId,
    pub cursors: Cursors,
    pub state: SegmentState,
    /// Range a flush would persist, if any bytes are pending.
    pub pending: Option<SyncRange>,
}

/// Result of a flush performed outside the journal lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    Synced,
    Failed,
}

/// What [`JournalSet::ensure_open_segment`] found or did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsureOutcome {
    /// An open segment already existed.
    AlreadyOpen(SegmentId),
    /// A new segment was created.
    Created(SegmentId),
    /// A failed segment makes the journal unusable; nothing was created.
    Unusable,
}

struct JournalInner {
    segments: Vec<Segment>,
    next_id: SegmentId,
}

impl JournalInner {
    fn find_mut(&mut self, id: SegmentId) -> Option<&mut Segment> {
        self.segments.iter_mut().find(|s| s.id() == id)
    }

    fn open_mut(&mut self) -> Option<&mut Segment> {
        self.segments
            .iter_mut()
            .find(|s| s.state() == SegmentState::Open)
    }

    fn has_failed(&self) -> bool {
        self.segments
            .iter()
            .any(|s| s.state() == SegmentState::Failed)
    }
}

/// The writable segments of one collection.
pub struct JournalSet {
    collection: String,
    config: JournalConfig,
    backend: Arc<dyn StorageBackend>,
    datafiles: Arc<Datafiles>,
    inner: Mutex<JournalInner>,
    changed: Condvar,
}

impl JournalSet {
    /// Creates an empty journal set.
    ///
    /// Segment IDs continue after the highest journal file already present
    /// in the configured directory, so new segments never collide with old
    /// ones.
    pub fn new(
        collection: impl Into<String>,
        config: JournalConfig,
        backend: Arc<dyn StorageBackend>,
        datafiles: Arc<Datafiles>,
    ) -> Result<Self, CoreError> {
        let next_id = SegmentScanner::latest_segment(&config.dir)?
            .map(|id| id + 1)
            .unwrap_or(1);

        Ok(Self {
            collection: collection.into(),
            config,
            backend,
            datafiles,
            inner: Mutex::new(JournalInner {
                segments: Vec::new(),
                next_id,
            }),
            changed: Condvar::new(),
        })
    }

    /// Returns the owning collection's name.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn config(&self) -> &JournalConfig {
        &self.config
    }

    /// Returns the registry sealed segments are handed to.
    pub fn datafiles(&self) -> &Arc<Datafiles> {
        &self.datafiles
    }

    /// Copies the cursors and state of every segment, in creation order.
    pub fn snapshot_segments(&self) -> Vec<SegmentSnapshot> {
        let inner = self.inner.lock();
        inner
            .segments
            .iter()
            .map(|segment| {
                let cursors = segment.cursors();
                debug_assert!(
                    cursors.is_consistent(),
                    "collection '{}' segment {}: inconsistent cursors {:?}",
                    self.collection,
                    segment.id(),
                    cursors
                );
                SegmentSnapshot {
                    id: segment.id(),
                    cursors,
                    state: segment.state(),
                    pending: segment.pending_sync(),
                }
            })
            .collect()
    }

    /// Applies the outcome of a flush taken from a snapshot.
    ///
    /// The result is dropped if the segment is gone or already failed.
    /// A failure marks the segment failed and wakes every waiter.
    /// Returns whether the result was applied.
    pub fn apply_flush_result(
        &self,
        segment_id: SegmentId,
        new_sync_cursor: u64,
        timestamp: DateTime<Utc>,
        outcome: FlushOutcome,
    ) -> bool {
        let mut inner = self.inner.lock();
        let Some(segment) = inner.find_mut(segment_id) else {
            tracing::debug!(
                "Dropping flush result for segment {} of '{}': segment no longer present",
                segment_id,
                self.collection
            );
            return false;
        };

        if segment.state().is_terminal() {
            return false;
        }

        match outcome {
            FlushOutcome::Synced => {
                segment.complete_sync(new_sync_cursor, timestamp);
            }
            FlushOutcome::Failed => {
                segment.fail();
                drop(inner);
                self.changed.notify_all();
            }
        }
        true
    }

    /// Seals every full segment and hands it to the datafile registry.
    ///
    /// A segment whose final flush fails during sealing becomes failed and
    /// stays in the set. Returns the number of segments sealed.
    pub fn close_full_segments(&self) -> usize {
        let mut inner = self.inner.lock();
        let mut closed = 0;
        let mut changed = false;
        let mut i = 0;

        while i < inner.segments.len() {
            if inner.segments[i].state() != SegmentState::Full {
                i += 1;
                continue;
            }

            changed = true;
            match inner.segments[i].seal() {
                Ok(()) => {
                    let segment = inner.segments.remove(i);
                    tracing::info!(
                        "Sealed journal {} of '{}' ({} bytes)",
                        segment.id(),
                        self.collection,
                        segment.write_cursor()
                    );
                    self.datafiles.insert(SealedSegment::from_segment(&segment));
                    closed += 1;
                }
                Err(e) => {
                    tracing::error!(
                        "Failed to seal journal {} of '{}': {}",
                        inner.segments[i].id(),
                        self.collection,
                        e
                    );
                    i += 1;
                }
            }
        }

        drop(inner);
        if changed {
            self.changed.notify_all();
        }
        closed
    }

    /// Makes sure the collection has an open segment, creating one if needed.
    ///
    /// Waiters are woken whatever the outcome, so a writer blocked for space
    /// can observe both success and failure.
    pub fn ensure_open_segment(&self) -> Result<EnsureOutcome, CoreError> {
        let mut inner = self.inner.lock();

        if let Some(open) = inner.open_mut() {
            return Ok(EnsureOutcome::AlreadyOpen(open.id()));
        }

        if inner.has_failed() {
            drop(inner);
            self.changed.notify_all();
            return Ok(EnsureOutcome::Unusable);
        }

        let id = inner.next_id;
        inner.next_id += 1;

        let result = Segment::create(
            self.backend.as_ref(),
            &self.config.dir,
            id,
            self.config.capacity,
        );

        let outcome = match result {
            Ok(segment) => {
                tracing::info!(
                    "Created journal {} for '{}' ({} bytes) at {}",
                    id,
                    self.collection,
                    self.config.capacity,
                    segment.path().display()
                );
                inner.segments.push(segment);
                Ok(EnsureOutcome::Created(id))
            }
            Err(e) => {
                if e.is_out_of_space() {
                    tracing::error!(
                        "Cannot create journal for '{}': backing store is exhausted",
                        self.collection
                    );
                }
                tracing::error!(
                    "Failed to create journal {} for '{}': {}",
                    id,
                    self.collection,
                    e
                );
                Err(e.into())
            }
        };

        drop(inner);
        self.changed.notify_all();
        outcome
    }

    /// Appends a record to the open segment.
    ///
    /// If the open segment cannot take the record it is marked full and the
    /// caller waits, up to `timeout`, for rotation to provide a new one.
    /// Returns the segment the record landed in and its offset.
    pub fn append(
        &self,
        data: &[u8],
        timeout: Duration,
    ) -> Result<(SegmentId, u64), CoreError> {
        let len = data.len() as u64;
        if len > self.config.capacity {
            return Err(CoreError::RecordTooLarge {
                size: len,
                capacity: self.config.capacity,
            });
        }

        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();

        loop {
            if inner.has_failed() {
                return Err(CoreError::JournalUnusable {
                    collection: self.collection.clone(),
                });
            }

            if let Some(segment) = inner.open_mut() {
                if segment.can_fit(len) {
                    let offset = segment.append(data)?;
                    return Ok((segment.id(), offset));
                }
                segment.mark_full()?;
                self.changed.notify_all();
            }

            if self.changed.wait_until(&mut inner, deadline).timed_out() {
                tracing::warn!(
                    "Writer for '{}' gave up waiting for a journal after {:?}",
                    self.collection,
                    timeout
                );
                return Err(CoreError::NoWritableSegment {
                    collection: self.collection.clone(),
                    waited: timeout,
                });
            }
        }
    }

    /// Requests that the open segment be sealed at the next rotation.
    ///
    /// Returns the ID of the segment marked full, if one was open.
    pub fn request_seal(&self) -> Result<Option<SegmentId>, CoreError> {
        let mut inner = self.inner.lock();
        let Some(segment) = inner.open_mut() else {
            return Ok(None);
        };
        segment.mark_full()?;
        Ok(Some(segment.id()))
    }

    /// Flushes every segment while holding the lock.
    ///
    /// Meant for shutdown, when no flusher runs concurrently. Failed
    /// segments are skipped; the first new flush error is returned after
    /// all segments were attempted.
    pub fn flush_all(&self) -> Result<u64, CoreError> {
        let mut inner = self.inner.lock();
        let mut bytes = 0;
        let mut first_error = None;

        for segment in inner
            .segments
            .iter_mut()
            .filter(|s| !s.state().is_terminal())
        {
            match segment.flush() {
                Ok(n) => bytes += n,
                Err(e) => {
                    tracing::error!(
                        "Failed to flush journal {} of '{}': {}",
                        segment.id(),
                        self.collection,
                        e
                    );
                    first_error.get_or_insert(e);
                }
            }
        }

        if let Some(e) = first_error {
            drop(inner);
            self.changed.notify_all();
            return Err(e.into());
        }
        Ok(bytes)
    }

    /// Blocks until an open segment exists, the journal becomes unusable, or
    /// `timeout` passes. Returns the open segment's ID.
    pub fn wait_for_open_segment(&self, timeout: Duration) -> Option<SegmentId> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();
        loop {
            if let Some(open) = inner.open_mut() {
                return Some(open.id());
            }
            if inner.has_failed() || self.changed.wait_until(&mut inner, deadline).timed_out() {
                return None;
            }
        }
    }

    /// Returns the ID and state of every segment, in creation order.
    pub fn states(&self) -> Vec<(SegmentId, SegmentState)> {
        self.inner
            .lock()
            .segments
            .iter()
            .map(|s| (s.id(), s.state()))
            .collect()
    }

    /// Returns the open segment's ID, if any.
    pub fn open_segment(&self) -> Option<SegmentId> {
        self.inner.lock().open_mut().map(|s| s.id())
    }

    pub fn segment_count(&self) -> usize {
        self.inner.lock().segments.len()
    }

    /// Returns whether a failed segment has made the journal unusable.
    pub fn is_unusable(&self) -> bool {
        self.inner.lock().has_failed()
    }

    /// Advances the write cursor of segment `id` by `n` bytes.
    ///
    /// Write-path hook for callers that place bytes in the region
    /// themselves. The cursor moves under the journal lock, so it is
    /// serialized with snapshots and flush results. Waiters are woken when
    /// the segment fills up.
    pub fn advance_write(&self, id: SegmentId, n: u64) -> Result<(), CoreError> {
        let mut inner = self.inner.lock();
        let segment = inner
            .find_mut(id)
            .ok_or_else(|| CoreError::SegmentNotFound {
                collection: self.collection.clone(),
                segment: id,
            })?;

        let result = segment.advance_write(n);
        let filled = segment.state() == SegmentState::Full;
        drop(inner);

        if filled {
            self.changed.notify_all();
        }
        result.map_err(CoreError::from)
    }
}

impl std::fmt::Debug for JournalSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JournalSet")
            .field("collection", &self.collection)
            .field("config", &self.config)
            .field("segments", &self.states())
            .finish()
    }
}
