//! Background journal garbage collector.
//!
//! One dedicated thread walks the loaded collections on a fixed poll
//! interval. Each tick flushes and then rotates the journals of every
//! document collection. Failures stay inside the collection they hit.

use crate::error::ServerError;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use strata_core::{
    flush_journals, rotate_journals, CollectionHandle, CollectionRegistry, FlushReport,
};

/// Counters accumulated across collector ticks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcStats {
    /// Completed ticks.
    pub ticks: u64,
    /// Document collections processed.
    pub collections_visited: u64,
    /// Segments whose sync cursor advanced.
    pub segments_flushed: u64,
    /// Bytes made durable.
    pub bytes_flushed: u64,
    /// Segments failed by a flush.
    pub flush_failures: u64,
    /// Segments sealed by rotation.
    pub segments_sealed: u64,
    /// Segments created by rotation.
    pub segments_created: u64,
    /// Segment creations that failed.
    pub creation_failures: u64,
}

/// Shared counters, updated by the collector thread.
#[derive(Debug, Default)]
pub struct GcCounters {
    ticks: AtomicU64,
    collections_visited: AtomicU64,
    segments_flushed: AtomicU64,
    bytes_flushed: AtomicU64,
    flush_failures: AtomicU64,
    segments_sealed: AtomicU64,
    segments_created: AtomicU64,
    creation_failures: AtomicU64,
}

impl GcCounters {
    fn record(&self, tick: &TickReport) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
        self.collections_visited
            .fetch_add(tick.collections as u64, Ordering::Relaxed);
        self.segments_flushed
            .fetch_add(tick.flush.flushed as u64, Ordering::Relaxed);
        self.bytes_flushed
            .fetch_add(tick.flush.bytes, Ordering::Relaxed);
        self.flush_failures
            .fetch_add(tick.flush.failed as u64, Ordering::Relaxed);
        self.segments_sealed
            .fetch_add(tick.sealed as u64, Ordering::Relaxed);
        self.segments_created
            .fetch_add(tick.created as u64, Ordering::Relaxed);
        self.creation_failures
            .fetch_add(tick.creation_failures as u64, Ordering::Relaxed);
    }

    /// Returns the current counter values.
    pub fn snapshot(&self) -> GcStats {
        GcStats {
            ticks: self.ticks.load(Ordering::Relaxed),
            collections_visited: self.collections_visited.load(Ordering::Relaxed),
            segments_flushed: self.segments_flushed.load(Ordering::Relaxed),
            bytes_flushed: self.bytes_flushed.load(Ordering::Relaxed),
            flush_failures: self.flush_failures.load(Ordering::Relaxed),
            segments_sealed: self.segments_sealed.load(Ordering::Relaxed),
            segments_created: self.segments_created.load(Ordering::Relaxed),
            creation_failures: self.creation_failures.load(Ordering::Relaxed),
        }
    }
}

/// Result of one collector tick over all loaded collections.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Document collections processed, in visit order.
    pub visited: Vec<String>,
    /// Number of document collections processed.
    pub collections: usize,
    /// Collections skipped because they are not document collections.
    pub skipped: usize,
    /// Flush results summed over all collections.
    pub flush: FlushReport,
    pub sealed: usize,
    pub created: usize,
    pub creation_failures: usize,
    /// Collections whose journal holds a failed segment.
    pub unusable: usize,
}

/// Runs one collector tick.
///
/// The collection list is copied before iterating, so collections loaded
/// or unloaded meanwhile do not disturb the tick.
pub fn run_tick<R>(registry: &R) -> TickReport
where
    R: CollectionRegistry + ?Sized,
{
    let mut report = TickReport::default();

    for collection in registry.list_loaded_collections() {
        if !collection.is_document_collection() {
            report.skipped += 1;
            continue;
        }

        let journals = collection.journal_set();
        let flushed = flush_journals(journals);
        let rotated = rotate_journals(journals);

        report.flush.merge(&flushed);
        report.sealed += rotated.sealed;
        report.created += usize::from(rotated.created.is_some());
        report.creation_failures += usize::from(rotated.creation_failed);
        report.unusable += usize::from(rotated.unusable);
        report.collections += 1;
        report.visited.push(collection.name().to_string());
    }

    report
}

/// Handle to a running garbage collector.
#[derive(Debug)]
pub struct GcHandle {
    active: Arc<AtomicBool>,
    counters: Arc<GcCounters>,
    poll_interval: Duration,
    thread: JoinHandle<()>,
}

impl GcHandle {
    /// Asks the loop to stop after its current sleep.
    pub fn stop(&self) {
        if self.active.swap(false, Ordering::AcqRel) {
            tracing::info!("Stopping garbage collector");
        }
    }

    /// Waits for the loop thread to exit.
    ///
    /// Call [`GcHandle::stop`] first, or this blocks forever.
    pub fn join(self) -> Result<GcStats, ServerError> {
        self.thread
            .join()
            .map_err(|_| ServerError::CollectorPanicked)?;
        Ok(self.counters.snapshot())
    }

    /// Returns whether the loop has been asked to keep running.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Returns whether the loop thread has exited.
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Returns the collector's counters.
    pub fn stats(&self) -> GcStats {
        self.counters.snapshot()
    }
}

/// Spawns the collector loop on a dedicated thread.
pub fn start_garbage_collector<R>(
    registry: Arc<R>,
    poll_interval: Duration,
) -> Result<GcHandle, ServerError>
where
    R: CollectionRegistry + ?Sized + 'static,
{
    let active = Arc::new(AtomicBool::new(true));
    let counters = Arc::new(GcCounters::default());

    let thread = {
        let active = active.clone();
        let counters = counters.clone();
        thread::Builder::new()
            .name("strata-gc".to_string())
            .spawn(move || run_loop(registry.as_ref(), &active, &counters, poll_interval))?
    };

    tracing::info!(
        "Garbage collector started (poll_interval={:?})",
        poll_interval
    );

    Ok(GcHandle {
        active,
        counters,
        poll_interval,
        thread,
    })
}

/// Clears the collector's active flag. Join the handle afterwards.
pub fn stop_garbage_collector(handle: &GcHandle) {
    handle.stop();
}

fn run_loop<R>(registry: &R, active: &AtomicBool, counters: &GcCounters, poll_interval: Duration)
where
    R: CollectionRegistry + ?Sized,
{
    while active.load(Ordering::Acquire) {
        let report = run_tick(registry);
        counters.record(&report);
        if report.flush.failed > 0 || report.creation_failures > 0 {
            tracing::debug!("Collector tick finished with errors: {:?}", report);
        }
        thread::sleep(poll_interval);
    }

    let stats = counters.snapshot();
    tracing::info!(
        "Garbage collector stopped after {} ticks ({} bytes flushed, {} segments sealed)",
        stats.ticks,
        stats.bytes_flushed,
        stats.segments_sealed
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;
    use strata_core::{Collection, CollectionKind, Collections, JournalConfig};
    use strata_segment::{MemoryBackend, MmapBackend, SegmentState};
    use tempfile::TempDir;

    fn load(
        collections: &Collections,
        backend: &MemoryBackend,
        name: &str,
        kind: CollectionKind,
    ) -> Arc<Collection> {
        let collection = Collection::new(
            name,
            kind,
            JournalConfig::new(format!("mem/{}", name)).with_capacity(1024),
            Arc::new(backend.clone()),
        )
        .unwrap();
        collections.load(collection).unwrap()
    }

    #[test]
    fn test_tick_skips_non_document_collections() {
        let backend = MemoryBackend::new();
        let collections = Collections::new();
        let docs = load(&collections, &backend, "users", CollectionKind::Document);
        let shapes = load(&collections, &backend, "_shapes", CollectionKind::Shape);

        let report = run_tick(&collections);
        assert_eq!(report.visited, vec!["users".to_string()]);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.created, 1);

        assert_eq!(docs.journals().segment_count(), 1);
        assert_eq!(shapes.journals().segment_count(), 0);
        assert_eq!(backend.regions(), 1);
    }

    #[test]
    fn test_tick_flushes_then_rotates() {
        let backend = MemoryBackend::new();
        let collections = Collections::new();
        let docs = load(&collections, &backend, "users", CollectionKind::Document);
        run_tick(&collections);

        docs.journals()
            .append(&[7u8; 1024], Duration::ZERO)
            .unwrap();
        let report = run_tick(&collections);
        assert_eq!(report.flush.bytes, 1024);
        assert_eq!(report.sealed, 1);
        assert_eq!(report.created, 1);
        assert_eq!(docs.journals().states(), vec![(2, SegmentState::Open)]);
        assert_eq!(docs.datafiles().ids(), vec![1]);
    }

    #[test]
    fn test_failure_is_isolated_per_collection() {
        let failing = MemoryBackend::new();
        let healthy = MemoryBackend::new();
        let collections = Collections::new();
        let bad = load(&collections, &failing, "a", CollectionKind::Document);
        let good = load(&collections, &healthy, "b", CollectionKind::Document);
        run_tick(&collections);

        bad.journals().append(&[1u8; 100], Duration::ZERO).unwrap();
        good.journals().append(&[2u8; 100], Duration::ZERO).unwrap();
        failing.fail_syncs(true);

        let report = run_tick(&collections);
        assert_eq!(report.collections, 2);
        assert_eq!(report.flush.failed, 1);
        assert_eq!(report.flush.flushed, 1);
        assert_eq!(report.unusable, 1);

        assert!(bad.journals().is_unusable());
        assert_eq!(good.journals().snapshot_segments()[0].cursors.sync, 100);
    }

    #[test]
    fn test_loop_flushes_in_background() {
        let backend = MemoryBackend::new();
        let collections = Arc::new(Collections::new());
        let docs = load(&collections, &backend, "users", CollectionKind::Document);

        let handle = start_garbage_collector(collections.clone(), Duration::from_millis(1)).unwrap();
        let segment = docs
            .journals()
            .wait_for_open_segment(Duration::from_secs(5))
            .unwrap();
        docs.journals().append(b"durable", Duration::from_secs(5)).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while backend.synced_bytes() < 7 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }

        stop_garbage_collector(&handle);
        let stats = handle.join().unwrap();
        assert_eq!(segment, 1);
        assert!(stats.ticks > 0);
        assert_eq!(stats.bytes_flushed, 7);
        assert_eq!(stats.segments_created, 1);
    }

    #[test]
    fn test_stop_mid_sleep_returns_within_interval() {
        let collections = Arc::new(Collections::new());
        let poll_interval = Duration::from_millis(200);
        let handle = start_garbage_collector(collections, poll_interval).unwrap();

        // Wait for the first tick so the loop is sleeping.
        let deadline = Instant::now() + Duration::from_secs(5);
        while handle.stats().ticks == 0 {
            assert!(Instant::now() < deadline, "collector never ticked");
            thread::sleep(Duration::from_millis(1));
        }

        let stopped_at = Instant::now();
        stop_garbage_collector(&handle);
        let ticks_at_stop = handle.stats().ticks;
        assert!(!handle.is_active());

        let stats = handle.join().unwrap();
        assert!(stopped_at.elapsed() <= poll_interval);
        // The sleeping loop wakes, sees the flag, and runs no further tick.
        assert_eq!(stats.ticks, ticks_at_stop);
    }

    #[test]
    fn test_collections_added_while_running() {
        let dir = TempDir::new().unwrap();
        let collections = Arc::new(Collections::new());
        let handle = start_garbage_collector(collections.clone(), Duration::from_millis(1)).unwrap();

        let users = collections
            .load(
                Collection::new(
                    "users",
                    CollectionKind::Document,
                    JournalConfig::new(dir.path()).with_capacity(4096),
                    Arc::new(MmapBackend),
                )
                .unwrap(),
            )
            .unwrap();
        assert_eq!(
            users.journals().wait_for_open_segment(Duration::from_secs(5)),
            Some(1)
        );
        assert!(dir.path().join("journal-0000000000000001.db").exists());

        collections.unload("users").unwrap();
        handle.stop();
        handle.join().unwrap();
    }
}
