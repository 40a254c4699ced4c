//! Collections and the registry of loaded collections.

use crate::datafiles::Datafiles;
use crate::error::CoreError;
use crate::journal::{JournalConfig, JournalSet};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use strata_segment::StorageBackend;

/// Collection type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionKind {
    /// Document collection, journaled and maintained by the collector.
    #[default]
    Document,
    /// Shape collection. Its storage is managed elsewhere.
    Shape,
}

/// Handle to a loaded collection, as seen by the collector.
pub trait CollectionHandle: Send + Sync {
    fn name(&self) -> &str;

    fn is_document_collection(&self) -> bool;

    fn journal_set(&self) -> &JournalSet;
}

/// Source of the currently loaded collections.
///
/// `list_loaded_collections` must return a consistent snapshot even while
/// collections are loaded or unloaded concurrently.
pub trait CollectionRegistry: Send + Sync {
    type Handle: CollectionHandle;

    fn list_loaded_collections(&self) -> Vec<Self::Handle>;
}

impl<T: CollectionHandle + ?Sized> CollectionHandle for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn is_document_collection(&self) -> bool {
        (**self).is_document_collection()
    }

    fn journal_set(&self) -> &JournalSet {
        (**self).journal_set()
    }
}

impl<R: CollectionRegistry + ?Sized> CollectionRegistry for Arc<R> {
    type Handle = R::Handle;

    fn list_loaded_collections(&self) -> Vec<Self::Handle> {
        (**self).list_loaded_collections()
    }
}

/// A loaded collection: its journals and its sealed datafiles.
#[derive(Debug)]
pub struct Collection {
    name: String,
    kind: CollectionKind,
    journals: JournalSet,
}

impl Collection {
    /// Creates a collection with an empty journal set.
    pub fn new(
        name: impl Into<String>,
        kind: CollectionKind,
        config: JournalConfig,
        backend: Arc<dyn StorageBackend>,
    ) -> Result<Self, CoreError> {
        let name = name.into();
        let journals = JournalSet::new(name.clone(), config, backend, Arc::new(Datafiles::new()))?;
        Ok(Self {
            name,
            kind,
            journals,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> CollectionKind {
        self.kind
    }

    pub fn journals(&self) -> &JournalSet {
        &self.journals
    }

    /// Sealed segments, readable while the collection stays loaded.
    pub fn datafiles(&self) -> &Arc<Datafiles> {
        self.journals.datafiles()
    }
}

impl CollectionHandle for Collection {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_document_collection(&self) -> bool {
        self.kind == CollectionKind::Document
    }

    fn journal_set(&self) -> &JournalSet {
        &self.journals
    }
}

/// Registry of loaded collections, indexed by name.
#[derive(Debug, Default)]
pub struct Collections {
    collections: DashMap<String, Arc<Collection>>,
}

impl Collections {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a collection.
    pub fn load(&self, collection: Collection) -> Result<Arc<Collection>, CoreError> {
        match self.collections.entry(collection.name().to_string()) {
            Entry::Occupied(entry) => Err(CoreError::CollectionExists {
                name: entry.key().clone(),
            }),
            Entry::Vacant(entry) => {
                let collection = Arc::new(collection);
                entry.insert(collection.clone());
                tracing::info!(
                    "Loaded {:?} collection '{}'",
                    collection.kind(),
                    collection.name()
                );
                Ok(collection)
            }
        }
    }

    /// Removes a collection. Handles already handed out stay valid.
    pub fn unload(&self, name: &str) -> Result<Arc<Collection>, CoreError> {
        let (_, collection) =
            self.collections
                .remove(name)
                .ok_or_else(|| CoreError::CollectionNotFound {
                    name: name.to_string(),
                })?;
        tracing::info!("Unloaded collection '{}'", name);
        Ok(collection)
    }

    pub fn get(&self, name: &str) -> Option<Arc<Collection>> {
        self.collections.get(name).map(|c| c.value().clone())
    }

    pub fn len(&self) -> usize {
        self.collections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }

    /// Flushes the journals of every loaded collection.
    ///
    /// All collections are attempted; the first error is returned.
    pub fn flush_all(&self) -> Result<u64, CoreError> {
        let mut bytes = 0;
        let mut first_error = None;

        for collection in self.list_loaded_collections() {
            match collection.journals().flush_all() {
                Ok(n) => bytes += n,
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(bytes),
        }
    }
}

impl CollectionRegistry for Collections {
    type Handle = Arc<Collection>;

    /// Returns the loaded collections ordered by name.
    fn list_loaded_collections(&self) -> Vec<Arc<Collection>> {
        let mut loaded: Vec<_> = self
            .collections
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        loaded.sort_by(|a, b| a.name().cmp(b.name()));
        loaded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use strata_segment::MemoryBackend;

    fn collection(name: &str, kind: CollectionKind) -> Collection {
        Collection::new(
            name,
            kind,
            JournalConfig::new(format!("mem/{}", name)).with_capacity(256),
            Arc::new(MemoryBackend::new()),
        )
        .unwrap()
    }

    #[test]
    fn test_load_and_list_sorted() {
        let collections = Collections::new();
        collections
            .load(collection("users", CollectionKind::Document))
            .unwrap();
        collections
            .load(collection("_shapes", CollectionKind::Shape))
            .unwrap();

        let names: Vec<_> = collections
            .list_loaded_collections()
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        assert_eq!(names, vec!["_shapes", "users"]);
    }

    #[test]
    fn test_duplicate_load_rejected() {
        let collections = Collections::new();
        collections
            .load(collection("users", CollectionKind::Document))
            .unwrap();
        let err = collections
            .load(collection("users", CollectionKind::Document))
            .unwrap_err();
        assert!(matches!(err, CoreError::CollectionExists { .. }));
    }

    #[test]
    fn test_snapshot_outlives_unload() {
        let collections = Collections::new();
        collections
            .load(collection("users", CollectionKind::Document))
            .unwrap();

        let snapshot = collections.list_loaded_collections();
        collections.unload("users").unwrap();
        assert!(collections.is_empty());

        // The snapshot still holds a usable handle.
        assert!(snapshot[0].journal_set().ensure_open_segment().is_ok());
        assert!(matches!(
            collections.unload("users"),
            Err(CoreError::CollectionNotFound { .. })
        ));
    }

    #[test]
    fn test_document_kind() {
        assert!(collection("a", CollectionKind::Document).is_document_collection());
        assert!(!collection("b", CollectionKind::Shape).is_document_collection());
    }

    #[test]
    fn test_flush_all() {
        let collections = Collections::new();
        let users = collections
            .load(collection("users", CollectionKind::Document))
            .unwrap();
        users.journals().ensure_open_segment().unwrap();
        users.journals().append(b"hello", Duration::ZERO).unwrap();

        assert_eq!(collections.flush_all().unwrap(), 5);
        assert_eq!(collections.flush_all().unwrap(), 0);
        assert_eq!(collections.get("users").unwrap().datafiles().len(), 0);
    }
}
