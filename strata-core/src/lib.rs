//! # strata-core
//!
//! Collection journals for strata.
//!
//! This crate provides:
//! - Per-collection journal sets guarded by one lock and condition
//! - Flush scheduling that syncs outside the lock
//! - Rotation of full journals into sealed datafiles
//! - The collection registry the background collector walks

pub mod collection;
pub mod datafiles;
pub mod error;
pub mod flush;
pub mod journal;
pub mod rotation;

pub use collection::{
    Collection, CollectionHandle, CollectionKind, CollectionRegistry, Collections,
};
pub use datafiles::{Datafiles, SealedSegment};
pub use error::CoreError;
pub use flush::{flush_journals, FlushReport};
pub use journal::{EnsureOutcome, FlushOutcome, JournalConfig, JournalSet, SegmentSnapshot};
pub use rotation::{rotate_journals, RotationReport};
