//! The abstract storage back-end contract (component C). Concrete drivers
//! (SQL/KV/document store adapters) are external collaborators; the core
//! only depends on this trait.

pub mod memory;
pub mod query;

use async_trait::async_trait;

pub use query::{Filter, Pagination, Query, SortField};

use crate::value::Document;

#[derive(Clone, Debug, thiserror::Error)]
pub enum DriverError {
    #[error("collection `{0}` not found")]
    NotFound(String),
    #[error("collection `{0}` already exists")]
    Conflict(String),
    #[error("operation was cancelled")]
    Cancelled,
    #[error("back-end error: {0}")]
    Backend(String),
}

/// What the executor needs to hand a driver to create a back-end
/// collection: the physical identifier it should be created under.
#[derive(Clone, Debug)]
pub struct CollectionSpec {
    pub physical: String,
    pub logical: String,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct CollectionStats {
    pub document_count: u64,
    pub storage_bytes: u64,
}

/// The CRUD + lifecycle contract consumed by the executor (component D).
/// Every operation may block on I/O (spec §5) and must be cancellation-
/// aware in real back-ends; the `DriverError::Cancelled` variant is the
/// escape hatch a driver uses when it observes a cancelled deadline.
#[async_trait]
pub trait Driver: Send + Sync {
    async fn collection_exists(&self, name: &str) -> Result<bool, DriverError>;
    async fn create_collection(&self, spec: &CollectionSpec) -> Result<(), DriverError>;
    async fn drop_collection(&self, name: &str) -> Result<(), DriverError>;

    async fn insert(&self, collection: &str, doc: Document) -> Result<Vec<String>, DriverError>;
    async fn find(&self, collection: &str, query: &Query) -> Result<Vec<Document>, DriverError>;
    async fn update_where(
        &self,
        collection: &str,
        filter: &Filter,
        patch: &Document,
    ) -> Result<u64, DriverError>;
    async fn delete_where(
        &self,
        collection: &str,
        filter: &Filter,
        allow_unsafe: bool,
    ) -> Result<u64, DriverError>;

    /// Best-effort; drivers that can't cheaply report usage return `None`
    /// rather than an error (used by `Persistence::metadata`).
    async fn collection_stats(&self, _collection: &str) -> Result<Option<CollectionStats>, DriverError> {
        Ok(None)
    }

    async fn start_transaction(&self) -> Result<Box<dyn TxDriver>, DriverError>;
}

/// A driver bound to an open transaction. Consumes `self` on commit/rollback
/// so a transaction can't be reused afterward.
#[async_trait]
pub trait TxDriver: Driver {
    async fn commit(self: Box<Self>) -> Result<(), DriverError>;
    async fn rollback(self: Box<Self>) -> Result<(), DriverError>;
}
