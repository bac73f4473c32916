//! An in-memory [`Driver`] implementation. Grounded on the teacher's
//! `tests/it/support/test_database.rs` fixture (a disposable store handed
//! to integration tests) — generalized into a genuine backend, since the
//! core is storage-agnostic and needs at least one concrete driver to run
//! against.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use uuid::Uuid;

use crate::value::{document_to_json, Document, Value};

use super::{CollectionSpec, CollectionStats, Driver, DriverError, Filter, Query, TxDriver};

#[derive(Clone, Default)]
struct Store {
    collections: HashMap<String, Vec<(String, Document)>>,
}

fn matches_filter(doc: &Document, filter: &Filter) -> bool {
    match &filter.0 {
        Value::Null => true,
        Value::Mapping(criteria) => criteria.iter().all(|(k, v)| doc.get(k) == Some(v)),
        _ => false,
    }
}

fn do_collection_exists(store: &RwLock<Store>, name: &str) -> bool {
    store.read().collections.contains_key(name)
}

fn do_create_collection(store: &RwLock<Store>, spec: &CollectionSpec) -> Result<(), DriverError> {
    let mut store = store.write();
    if store.collections.contains_key(&spec.physical) {
        return Err(DriverError::Conflict(spec.logical.clone()));
    }
    store.collections.insert(spec.physical.clone(), Vec::new());
    Ok(())
}

fn do_drop_collection(store: &RwLock<Store>, name: &str) -> Result<(), DriverError> {
    store
        .write()
        .collections
        .remove(name)
        .map(|_| ())
        .ok_or_else(|| DriverError::NotFound(name.to_string()))
}

fn do_insert(store: &RwLock<Store>, collection: &str, doc: Document) -> Result<Vec<String>, DriverError> {
    let mut store = store.write();
    let rows = store
        .collections
        .get_mut(collection)
        .ok_or_else(|| DriverError::NotFound(collection.to_string()))?;
    let id = Uuid::new_v4().to_string();
    rows.push((id.clone(), doc));
    Ok(vec![id])
}

fn do_find(store: &RwLock<Store>, collection: &str, query: &Query) -> Result<Vec<Document>, DriverError> {
    let store = store.read();
    let rows = store
        .collections
        .get(collection)
        .ok_or_else(|| DriverError::NotFound(collection.to_string()))?;

    let mut matched: Vec<Document> = rows
        .iter()
        .filter(|(_, doc)| matches_filter(doc, &query.filters))
        .map(|(_, doc)| doc.clone())
        .collect();

    if let Some(sort) = &query.sort {
        if let Some(first) = sort.first() {
            matched.sort_by(|a, b| {
                let ord = a.get(&first.field).map(|v| v.render()).cmp(&b.get(&first.field).map(|v| v.render()));
                if first.descending {
                    ord.reverse()
                } else {
                    ord
                }
            });
        }
    }

    if let Some(pagination) = &query.pagination {
        let offset = pagination.offset.unwrap_or(0) as usize;
        matched = matched.into_iter().skip(offset).collect();
        if let Some(limit) = pagination.limit {
            matched.truncate(limit as usize);
        }
    }
    Ok(matched)
}

fn do_update_where(
    store: &RwLock<Store>,
    collection: &str,
    filter: &Filter,
    patch: &Document,
) -> Result<u64, DriverError> {
    let mut store = store.write();
    let rows = store
        .collections
        .get_mut(collection)
        .ok_or_else(|| DriverError::NotFound(collection.to_string()))?;
    let mut count = 0u64;
    for (_, doc) in rows.iter_mut() {
        if matches_filter(doc, filter) {
            for (k, v) in patch {
                doc.insert(k.clone(), v.clone());
            }
            count += 1;
        }
    }
    Ok(count)
}

fn do_delete_where(
    store: &RwLock<Store>,
    collection: &str,
    filter: &Filter,
) -> Result<u64, DriverError> {
    let mut store = store.write();
    let rows = store
        .collections
        .get_mut(collection)
        .ok_or_else(|| DriverError::NotFound(collection.to_string()))?;
    let before = rows.len();
    rows.retain(|(_, doc)| !matches_filter(doc, filter));
    Ok((before - rows.len()) as u64)
}

fn do_stats(store: &RwLock<Store>, collection: &str) -> Option<CollectionStats> {
    store.read().collections.get(collection).map(|rows| CollectionStats {
        document_count: rows.len() as u64,
        storage_bytes: rows
            .iter()
            .map(|(_, doc)| document_to_json(doc).to_string().len() as u64)
            .sum(),
    })
}

/// A full-fidelity, process-local backend usable both in tests and by
/// embedders that don't need durability.
#[derive(Clone, Default)]
pub struct MemoryDriver {
    store: Arc<RwLock<Store>>,
}

impl MemoryDriver {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Driver for MemoryDriver {
    async fn collection_exists(&self, name: &str) -> Result<bool, DriverError> {
        Ok(do_collection_exists(&self.store, name))
    }

    async fn create_collection(&self, spec: &CollectionSpec) -> Result<(), DriverError> {
        do_create_collection(&self.store, spec)
    }

    async fn drop_collection(&self, name: &str) -> Result<(), DriverError> {
        do_drop_collection(&self.store, name)
    }

    async fn insert(&self, collection: &str, doc: Document) -> Result<Vec<String>, DriverError> {
        do_insert(&self.store, collection, doc)
    }

    async fn find(&self, collection: &str, query: &Query) -> Result<Vec<Document>, DriverError> {
        do_find(&self.store, collection, query)
    }

    async fn update_where(&self, collection: &str, filter: &Filter, patch: &Document) -> Result<u64, DriverError> {
        do_update_where(&self.store, collection, filter, patch)
    }

    async fn delete_where(&self, collection: &str, filter: &Filter, allow_unsafe: bool) -> Result<u64, DriverError> {
        let _ = allow_unsafe; // the collection layer (component F) enforces this, not the driver
        do_delete_where(&self.store, collection, filter)
    }

    async fn collection_stats(&self, collection: &str) -> Result<Option<CollectionStats>, DriverError> {
        Ok(do_stats(&self.store, collection))
    }

    async fn start_transaction(&self) -> Result<Box<dyn TxDriver>, DriverError> {
        Ok(Box::new(MemoryTxDriver {
            shared: self.store.clone(),
            local: RwLock::new(self.store.read().clone()),
        }))
    }
}

/// A snapshot-isolated transaction: writes land in a private copy of the
/// store and are only merged into the shared store on `commit`.
struct MemoryTxDriver {
    shared: Arc<RwLock<Store>>,
    local: RwLock<Store>,
}

#[async_trait]
impl Driver for MemoryTxDriver {
    async fn collection_exists(&self, name: &str) -> Result<bool, DriverError> {
        Ok(do_collection_exists(&self.local, name))
    }

    async fn create_collection(&self, spec: &CollectionSpec) -> Result<(), DriverError> {
        do_create_collection(&self.local, spec)
    }

    async fn drop_collection(&self, name: &str) -> Result<(), DriverError> {
        do_drop_collection(&self.local, name)
    }

    async fn insert(&self, collection: &str, doc: Document) -> Result<Vec<String>, DriverError> {
        do_insert(&self.local, collection, doc)
    }

    async fn find(&self, collection: &str, query: &Query) -> Result<Vec<Document>, DriverError> {
        do_find(&self.local, collection, query)
    }

    async fn update_where(&self, collection: &str, filter: &Filter, patch: &Document) -> Result<u64, DriverError> {
        do_update_where(&self.local, collection, filter, patch)
    }

    async fn delete_where(&self, collection: &str, filter: &Filter, allow_unsafe: bool) -> Result<u64, DriverError> {
        let _ = allow_unsafe;
        do_delete_where(&self.local, collection, filter)
    }

    async fn collection_stats(&self, collection: &str) -> Result<Option<CollectionStats>, DriverError> {
        Ok(do_stats(&self.local, collection))
    }

    async fn start_transaction(&self) -> Result<Box<dyn TxDriver>, DriverError> {
        Err(DriverError::Backend("nested transactions are not supported".into()))
    }
}

#[async_trait]
impl TxDriver for MemoryTxDriver {
    async fn commit(self: Box<Self>) -> Result<(), DriverError> {
        let mut shared = self.shared.write();
        *shared = self.local.into_inner();
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), DriverError> {
        // The private `local` copy is simply dropped; `shared` was never
        // touched.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::CollectionSpec;

    #[tokio::test]
    async fn insert_find_roundtrip() {
        let driver = MemoryDriver::new();
        let spec = CollectionSpec {
            physical: "p1".into(),
            logical: "posts".into(),
        };
        driver.create_collection(&spec).await.unwrap();
        let mut doc = Document::new();
        doc.insert("title".into(), Value::String("hello".into()));
        driver.insert("p1", doc).await.unwrap();

        let found = driver.find("p1", &Query::default()).await.unwrap();
        assert_eq!(found.len(), 1);
    }

    #[tokio::test]
    async fn transaction_rollback_discards_writes() {
        let driver = MemoryDriver::new();
        let spec = CollectionSpec {
            physical: "p1".into(),
            logical: "posts".into(),
        };
        driver.create_collection(&spec).await.unwrap();

        let tx = driver.start_transaction().await.unwrap();
        let mut doc = Document::new();
        doc.insert("title".into(), Value::String("hello".into()));
        tx.insert("p1", doc).await.unwrap();
        tx.rollback().await.unwrap();

        let found = driver.find("p1", &Query::default()).await.unwrap();
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn transaction_commit_applies_writes() {
        let driver = MemoryDriver::new();
        let spec = CollectionSpec {
            physical: "p1".into(),
            logical: "posts".into(),
        };
        driver.create_collection(&spec).await.unwrap();

        let tx = driver.start_transaction().await.unwrap();
        let mut doc = Document::new();
        doc.insert("title".into(), Value::String("hello".into()));
        tx.insert("p1", doc).await.unwrap();
        tx.commit().await.unwrap();

        let found = driver.find("p1", &Query::default()).await.unwrap();
        assert_eq!(found.len(), 1);
    }
}
