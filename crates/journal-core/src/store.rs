//! Object store backend.
//!
//! The object store is a separate daemon reached over a session bus. Its
//! transport is not modelled here: callers hand the journal an
//! [`ObjectStore`] implementation and this module drives it. All filtering,
//! sorting and paging happen on the store's side.

use crate::backend::{Page, QueryBackend, ScanStatus};
use crate::error::{JournalError, Result};
use crate::query::{Query, SortKey};
use crate::types::{Entry, Value, MOUNTPOINT, OBJECT_STORE_MOUNT_POINT, PROPERTIES};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Interface to the object store daemon.
///
/// Implementations own the connection and should forward the daemon's
/// created/updated/deleted signals to a
/// [`ChangeNotifier`](crate::backend::ChangeNotifier).
pub trait ObjectStore: Send + Sync {
    /// Run a query, returning the requested page and the total match count
    fn find(&self, query: &Query, properties: &[&str]) -> anyhow::Result<(Vec<Entry>, usize)>;

    /// All properties of one object
    fn get_properties(&self, object_id: &str) -> anyhow::Result<Entry>;

    /// A temporary copy of the object's file, if it has one
    fn get_filename(&self, object_id: &str) -> anyhow::Result<Option<PathBuf>>;

    /// Create an object, returning its id
    fn create(
        &self,
        metadata: &Entry,
        file_path: Option<&Path>,
        transfer_ownership: bool,
    ) -> anyhow::Result<String>;

    /// Replace an object's metadata (and file, if given)
    fn update(
        &self,
        object_id: &str,
        metadata: &Entry,
        file_path: Option<&Path>,
        transfer_ownership: bool,
    ) -> anyhow::Result<String>;

    fn delete(&self, object_id: &str) -> anyhow::Result<()>;

    /// Distinct values a property has taken across all objects
    fn get_unique_values(&self, property: &str) -> anyhow::Result<Vec<Value>>;
}

/// Result set backend over the object store.
pub struct ObjectStoreBackend {
    store: Arc<dyn ObjectStore>,
    query: Query,
}

impl ObjectStoreBackend {
    /// Create a backend for `query`, rewriting its free text for the
    /// store's native search. Queries without a sort get newest first.
    pub fn new(store: Arc<dyn ObjectStore>, mut query: Query) -> Self {
        query.text = query.store_text();
        query.mountpoints = None;
        if query.order_by.is_empty() {
            query.order_by.push(SortKey::default());
        }
        ObjectStoreBackend { store, query }
    }

    /// The query as it is sent to the store, minus paging
    pub fn query(&self) -> &Query {
        &self.query
    }
}

impl QueryBackend for ObjectStoreBackend {
    fn setup(&mut self) -> Result<ScanStatus> {
        Ok(ScanStatus::Ready)
    }

    fn poll(&mut self) -> ScanStatus {
        ScanStatus::Ready
    }

    fn stop(&mut self) {}

    #[instrument(skip(self))]
    fn find(&self, offset: usize, limit: usize) -> Result<Page> {
        let mut query = self.query.clone();
        query.offset = Some(offset);
        query.limit = Some(limit);

        let (mut entries, total) = self
            .store
            .find(&query, PROPERTIES)
            .map_err(|e| JournalError::object_store("find", e))?;

        for entry in &mut entries {
            entry.set(MOUNTPOINT, OBJECT_STORE_MOUNT_POINT);
        }

        debug!(returned = entries.len(), total, "Object store query finished");
        Ok(Page::new(entries, total))
    }

    fn mount_point(&self) -> &str {
        OBJECT_STORE_MOUNT_POINT
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MemoryObjectStore;
    use crate::types::{TIMESTAMP, TITLE};

    fn store_with(count: i64) -> Arc<MemoryObjectStore> {
        let store = MemoryObjectStore::new();
        for i in 0..count {
            store.insert(
                Entry::new()
                    .with(TITLE, format!("entry {}", i))
                    .with(TIMESTAMP, i),
            );
        }
        Arc::new(store)
    }

    #[test]
    fn test_find_tags_mount_point() {
        let backend = ObjectStoreBackend::new(store_with(5), Query::new());
        let page = backend.find(0, 3).unwrap();

        assert_eq!(page.total, 5);
        assert_eq!(page.entries.len(), 3);
        assert!(page.entries.iter().all(|e| e.mount_point() == Some("/")));
    }

    #[test]
    fn test_query_is_translated() {
        let query = Query::new()
            .mount_point("/")
            .text("moon cat")
            .order_by(SortKey::descending(TIMESTAMP));
        let backend = ObjectStoreBackend::new(store_with(0), query);

        assert_eq!(backend.query().text.as_deref(), Some("moon* cat*"));
        assert!(backend.query().mountpoints.is_none());
        assert_eq!(backend.query().order_by, vec![SortKey::descending(TIMESTAMP)]);
    }

    #[test]
    fn test_default_sort_is_newest_first() {
        let backend = ObjectStoreBackend::new(store_with(3), Query::new());
        assert_eq!(backend.query().order_by, vec![SortKey::descending(TIMESTAMP)]);

        let page = backend.find(0, 3).unwrap();
        assert_eq!(page.entries[0].timestamp(), Some(2));
    }

    #[test]
    fn test_store_failure_propagates() {
        let store = MemoryObjectStore::new();
        store.fail_with("bus disconnected");
        let backend = ObjectStoreBackend::new(Arc::new(store), Query::new());

        let err = backend.find(0, 10).unwrap_err();
        assert!(matches!(err, JournalError::ObjectStore { .. }));
    }
}
