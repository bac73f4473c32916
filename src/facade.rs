//! The top-level persistence facade (component G). Grounded on
//! `control/src/context.rs` (an `AppContext` bundling shared handles, here
//! the driver/bus/registry/name-map) and `control/src/startup.rs`
//! (construction/bootstrap sequencing, here the meta-collection bootstrap).

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::RwLock;
use uuid::Uuid;

use crate::bus::{EventBus, EventCallback, EventType, PersistenceEvent, SubscriptionInfo, SubscriptionRegistry};
use crate::collection::{document_to_record, record_to_document, Collection, MetaHandle};
use crate::driver::{CollectionSpec, CollectionStats, Driver, DriverError, Filter, Query, TxDriver};
use crate::error::PersistenceError;
use crate::executor::Executor;
use crate::schema::{meta_schema, CollectionName, FunctionMap, SchemaDefinition, SchemaHistoryEntry, SchemaRecord, META_COLLECTION_LOGICAL};
use crate::validator::Validator;
use crate::value::{Document, Value};

/// The meta-collection's physical identifier is fixed and embedded rather
/// than a minted UUID (spec §6 "bit-exact", §9 "embedded at build time") —
/// unlike user collections, it isn't something `Create` ever mints a fresh
/// identifier for.
const META_COLLECTION_PHYSICAL: &str = META_COLLECTION_LOGICAL;

#[derive(Clone, Debug, Default)]
pub struct SchemaFilter {
    /// Matches against either the logical or physical collection identifier.
    pub id: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct SubscriptionFilter {
    pub event: Option<EventType>,
    pub label: Option<String>,
}

/// `{subscriptions?: {event?, label?}, schemas?: {id?}}` (spec §6); a `None`
/// sub-filter means "include all".
#[derive(Clone, Debug, Default)]
pub struct MetadataFilter {
    pub subscriptions: Option<SubscriptionFilter>,
    pub schemas: Option<SchemaFilter>,
}

#[derive(Clone, Debug)]
pub struct CollectionMetadata {
    pub logical: String,
    pub physical: String,
    pub document_count: Option<u64>,
    pub storage_bytes: Option<u64>,
}

#[derive(Clone, Debug)]
pub struct MetadataSnapshot {
    pub collection_count: usize,
    pub storage_bytes: u64,
    pub collections: Vec<CollectionMetadata>,
    pub schemas: Vec<SchemaDefinition>,
    pub subscriptions: Vec<SubscriptionInfo>,
}

/// Component G: manages the schemas-of-schemas meta-collection, collection
/// lifecycle, transactions, and the subscription registry.
#[derive(Clone)]
pub struct Persistence {
    driver: Arc<dyn Driver>,
    functions: FunctionMap,
    bus: Arc<EventBus>,
    subscriptions: Arc<SubscriptionRegistry>,
    names: Arc<RwLock<HashMap<String, String>>>,
    meta_executor: Executor,
    transaction_id: Option<Uuid>,
}

impl Persistence {
    /// Constructs a facade against `driver`, bootstrapping the
    /// meta-collection if this is the first time this driver has seen one
    /// (spec §4.3).
    pub async fn new(driver: Arc<dyn Driver>, functions: FunctionMap) -> Result<Self, PersistenceError> {
        Self::from_driver(driver, functions, None).await
    }

    async fn from_driver(
        driver: Arc<dyn Driver>,
        functions: FunctionMap,
        transaction_id: Option<Uuid>,
    ) -> Result<Self, PersistenceError> {
        let bus = EventBus::new();
        let subscriptions = Arc::new(SubscriptionRegistry::new(Arc::clone(&bus)));

        if !driver
            .collection_exists(META_COLLECTION_PHYSICAL)
            .await
            .map_err(PersistenceError::Driver)?
        {
            let tx = driver.start_transaction().await.map_err(PersistenceError::Driver)?;
            let spec = CollectionSpec {
                physical: META_COLLECTION_PHYSICAL.to_string(),
                logical: META_COLLECTION_LOGICAL.to_string(),
            };
            match tx.create_collection(&spec).await {
                Ok(()) => tx.commit().await.map_err(PersistenceError::Driver)?,
                Err(err) => {
                    let _ = tx.rollback().await;
                    return Err(PersistenceError::Driver(err));
                }
            }
        }

        let meta_executor = Executor::new(Arc::clone(&driver), META_COLLECTION_PHYSICAL);
        let facade = Self {
            driver,
            functions,
            bus,
            subscriptions,
            names: Arc::new(RwLock::new(HashMap::new())),
            meta_executor,
            transaction_id,
        };
        facade.reload_names().await?;
        Ok(facade)
    }

    pub fn functions(&self) -> &FunctionMap {
        &self.functions
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn transaction_id(&self) -> Option<Uuid> {
        self.transaction_id
    }

    /// Every logical collection name currently registered (spec S5
    /// `Collections()`).
    pub fn collections(&self) -> Vec<String> {
        self.names.read().keys().cloned().collect()
    }

    async fn fetch_all_records(&self) -> Result<Vec<SchemaRecord>, PersistenceError> {
        let docs = self
            .meta_executor
            .find(&Query::default(), None)
            .await
            .map_err(PersistenceError::Driver)?;
        docs.iter().map(document_to_record).collect()
    }

    async fn reload_names(&self) -> Result<(), PersistenceError> {
        let records = self.fetch_all_records().await?;
        let map = records
            .into_iter()
            .map(|record| (record.name.logical, record.name.physical))
            .collect();
        *self.names.write() = map;
        Ok(())
    }

    async fn fetch_record(&self, logical: &str, physical: &str) -> Result<SchemaRecord, PersistenceError> {
        let filter = record_filter(&CollectionName {
            logical: logical.to_string(),
            physical: physical.to_string(),
        });
        let docs = self
            .meta_executor
            .find(&Query::matching(filter), None)
            .await
            .map_err(PersistenceError::Driver)?;
        let doc = docs.first().ok_or_else(|| PersistenceError::NotFound(logical.to_string()))?;
        document_to_record(doc)
    }

    /// `Collection(name)` (spec §4.3): resolves `name` against the
    /// logical→physical map and constructs a [`Collection`] handle.
    pub async fn collection(&self, name: &str) -> Result<Collection, PersistenceError> {
        let physical = self
            .names
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| PersistenceError::NotFound(name.to_string()))?;
        let record = self.fetch_record(name, &physical).await?;
        let executor = Executor::new(Arc::clone(&self.driver), physical);
        let meta: Arc<dyn MetaHandle> = Arc::new(FacadeMetaHandle {
            meta_executor: self.meta_executor.clone(),
            names: Arc::clone(&self.names),
        });
        Ok(Collection::new(
            name,
            record.schema,
            self.functions.clone(),
            executor,
            Arc::clone(&self.bus),
            self.transaction_id,
            Some(meta),
        ))
    }

    /// `Create(schema)` (spec §4.3): mints a physical UUID and writes the
    /// schema record + back-end collection within a single transaction.
    pub async fn create(&self, schema: SchemaDefinition) -> Result<Collection, PersistenceError> {
        let logical = schema.name.clone();
        if self.names.read().contains_key(&logical) {
            return Err(PersistenceError::Conflict(logical));
        }

        self.bus.publish(
            &PersistenceEvent::new(EventType::CollectionCreateStart, "create_collection")
                .with_collection(logical.clone())
                .with_transaction_id(self.transaction_id),
        );

        let physical = Uuid::new_v4().to_string();
        match self.create_inner(&logical, &physical, schema).await {
            Ok(()) => {
                self.names.write().insert(logical.clone(), physical);
                self.bus.publish(
                    &PersistenceEvent::new(EventType::CollectionCreateSuccess, "create_collection")
                        .with_collection(logical.clone())
                        .with_transaction_id(self.transaction_id),
                );
                self.collection(&logical).await
            }
            Err(err) => {
                self.bus.publish(
                    &PersistenceEvent::new(EventType::CollectionCreateFailed, "create_collection")
                        .with_collection(logical)
                        .with_error(err.to_string())
                        .with_transaction_id(self.transaction_id),
                );
                Err(err)
            }
        }
    }

    async fn create_inner(
        &self,
        logical: &str,
        physical: &str,
        schema: SchemaDefinition,
    ) -> Result<(), PersistenceError> {
        let record = SchemaRecord {
            name: CollectionName {
                logical: logical.to_string(),
                physical: physical.to_string(),
            },
            description: schema.description.clone(),
            version: schema.version.clone(),
            schema,
            history: Vec::new(),
        };
        let record_doc = record_to_document(&record)?;
        let (ok, issues) = Validator::new(&meta_schema(), &FunctionMap::default()).validate(&record_doc, false);
        if !ok {
            return Err(PersistenceError::Validation(issues));
        }

        let tx = self.driver.start_transaction().await.map_err(PersistenceError::Driver)?;
        let spec = CollectionSpec {
            physical: physical.to_string(),
            logical: logical.to_string(),
        };

        let outcome: Result<(), DriverError> = async {
            tx.create_collection(&spec).await?;
            tx.insert(META_COLLECTION_PHYSICAL, record_doc).await?;
            Ok(())
        }
        .await;

        match outcome {
            Ok(()) => tx.commit().await.map_err(PersistenceError::Driver),
            Err(err) => {
                let _ = tx.rollback().await;
                Err(PersistenceError::Driver(err))
            }
        }
    }

    /// `Delete(name)` (spec §4.3): drops the schema record and the back-end
    /// collection within a single transaction.
    pub async fn delete(&self, name: &str) -> Result<(), PersistenceError> {
        let physical = self
            .names
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| PersistenceError::NotFound(name.to_string()))?;

        self.bus.publish(
            &PersistenceEvent::new(EventType::CollectionDeleteStart, "delete_collection")
                .with_collection(name.to_string())
                .with_transaction_id(self.transaction_id),
        );

        match self.delete_inner(name, &physical).await {
            Ok(()) => {
                self.names.write().remove(name);
                self.bus.publish(
                    &PersistenceEvent::new(EventType::CollectionDeleteSuccess, "delete_collection")
                        .with_collection(name.to_string())
                        .with_transaction_id(self.transaction_id),
                );
                Ok(())
            }
            Err(err) => {
                self.bus.publish(
                    &PersistenceEvent::new(EventType::CollectionDeleteFailed, "delete_collection")
                        .with_collection(name.to_string())
                        .with_error(err.to_string())
                        .with_transaction_id(self.transaction_id),
                );
                Err(err)
            }
        }
    }

    async fn delete_inner(&self, name: &str, physical: &str) -> Result<(), PersistenceError> {
        let filter = record_filter(&CollectionName {
            logical: name.to_string(),
            physical: physical.to_string(),
        });

        let tx = self.driver.start_transaction().await.map_err(PersistenceError::Driver)?;
        let outcome: Result<(), DriverError> = async {
            tx.delete_where(META_COLLECTION_PHYSICAL, &filter, true).await?;
            tx.drop_collection(physical).await?;
            Ok(())
        }
        .await;

        match outcome {
            Ok(()) => tx.commit().await.map_err(PersistenceError::Driver),
            Err(err) => {
                let _ = tx.rollback().await;
                Err(PersistenceError::Driver(err))
            }
        }
    }

    /// `Transact(cb)` (spec §4.3): runs `cb` against a child facade bound to
    /// a transactional driver snapshot, committing on success and rolling
    /// back on error or panic.
    pub async fn transact<F, Fut, T>(&self, cb: F) -> Result<T, PersistenceError>
    where
        F: FnOnce(Persistence) -> Fut,
        Fut: Future<Output = Result<T, PersistenceError>>,
    {
        let tx = self.driver.start_transaction().await.map_err(PersistenceError::Driver)?;
        let handle = Arc::new(TransactionHandle::new(tx));
        let tx_driver: Arc<dyn Driver> = Arc::clone(&handle) as Arc<dyn Driver>;
        let transaction_id = Uuid::new_v4();

        let child = Persistence::from_driver(tx_driver, self.functions.clone(), Some(transaction_id)).await?;

        self.bus.publish(
            &PersistenceEvent::new(EventType::TransactionStart, "transact")
                .with_transaction_id(Some(transaction_id)),
        );

        let outcome = std::panic::AssertUnwindSafe(cb(child)).catch_unwind().await;

        match outcome {
            Ok(Ok(value)) => match handle.commit().await {
                Ok(()) => {
                    // The committed transaction may have created/deleted collections
                    // directly against the shared driver store, bypassing this
                    // facade's own `create`/`delete` (which is what normally keeps
                    // `names` current) — resync before the caller can observe it.
                    self.reload_names().await?;
                    self.bus.publish(
                        &PersistenceEvent::new(EventType::TransactionSuccess, "transact")
                            .with_transaction_id(Some(transaction_id)),
                    );
                    Ok(value)
                }
                Err(err) => {
                    self.bus.publish(
                        &PersistenceEvent::new(EventType::TransactionFailed, "transact")
                            .with_transaction_id(Some(transaction_id))
                            .with_error(err.to_string()),
                    );
                    Err(PersistenceError::Driver(err))
                }
            },
            Ok(Err(err)) => {
                let _ = handle.rollback().await;
                self.bus.publish(
                    &PersistenceEvent::new(EventType::TransactionFailed, "transact")
                        .with_transaction_id(Some(transaction_id))
                        .with_error(err.to_string()),
                );
                Err(PersistenceError::Transaction(err.to_string()))
            }
            Err(_panic) => {
                let _ = handle.rollback().await;
                self.bus.publish(
                    &PersistenceEvent::new(EventType::TransactionFailed, "transact")
                        .with_transaction_id(Some(transaction_id))
                        .with_error("callback panicked".to_string()),
                );
                Err(PersistenceError::Transaction("callback panicked".to_string()))
            }
        }
    }

    /// `Metadata(filter)` (spec §4.3). `force_refresh` reloads the name map
    /// from the driver before aggregating (spec §4.3 "may cache and expose
    /// forceRefresh").
    pub async fn metadata(
        &self,
        filter: MetadataFilter,
        force_refresh: bool,
    ) -> Result<MetadataSnapshot, PersistenceError> {
        if force_refresh {
            self.reload_names().await?;
        }

        self.bus.publish(
            &PersistenceEvent::new(EventType::MetadataCalled, "metadata").with_transaction_id(self.transaction_id),
        );

        let records = self.fetch_all_records().await?;
        let mut collections = Vec::with_capacity(records.len());
        let mut storage_bytes = 0u64;

        for record in &records {
            let executor = Executor::new(Arc::clone(&self.driver), record.name.physical.clone());
            let stats: Option<CollectionStats> = executor.stats().await.ok().flatten();
            if let Some(stats) = &stats {
                storage_bytes += stats.storage_bytes;
            }
            collections.push(CollectionMetadata {
                logical: record.name.logical.clone(),
                physical: record.name.physical.clone(),
                document_count: stats.map(|s| s.document_count),
                storage_bytes: stats.map(|s| s.storage_bytes),
            });
        }

        let schema_id_filter = filter.schemas.as_ref().and_then(|s| s.id.as_ref());
        let schemas: Vec<SchemaDefinition> = records
            .iter()
            .filter(|r| match schema_id_filter {
                None => true,
                Some(id) => &r.name.logical == id || &r.name.physical == id,
            })
            .map(|r| r.schema.clone())
            .collect();

        let subscription_filter = filter.subscriptions.clone();
        let subscriptions: Vec<SubscriptionInfo> = self
            .subscriptions
            .snapshot()
            .into_iter()
            .filter(|s| match &subscription_filter {
                None => true,
                Some(sf) => {
                    sf.event.map(|e| e == s.event).unwrap_or(true)
                        && sf
                            .label
                            .as_ref()
                            .map(|l| s.label.as_deref() == Some(l.as_str()))
                            .unwrap_or(true)
                }
            })
            .collect();

        Ok(MetadataSnapshot {
            collection_count: records.len(),
            storage_bytes,
            collections,
            schemas,
            subscriptions,
        })
    }

    pub fn register_subscription(
        &self,
        event: EventType,
        label: Option<String>,
        description: Option<String>,
        callback: EventCallback,
    ) -> Uuid {
        self.subscriptions.register(event, label, description, callback)
    }

    pub fn unregister_subscription(&self, id: Uuid) -> bool {
        self.subscriptions.unregister(id)
    }

    pub fn subscriptions(&self) -> Vec<SubscriptionInfo> {
        self.subscriptions.snapshot()
    }
}

/// Exact-match filter on the record's structured `name` field — the only
/// stable key the meta-collection's own record carries (spec §6 bit-exact
/// schema; the driver contract has no notion of a primary key beyond what
/// `Insert` returns, which the facade doesn't retain).
fn record_filter(name: &CollectionName) -> Filter {
    let mut criteria = Document::new();
    criteria.insert(
        "name".to_string(),
        Value::Mapping(
            [
                ("logical".to_string(), Value::String(name.logical.clone())),
                ("physical".to_string(), Value::String(name.physical.clone())),
            ]
            .into_iter()
            .collect(),
        ),
    );
    Filter(Value::Mapping(criteria))
}

/// Wraps a `Box<dyn TxDriver>` so it can be shared (via `Arc`) as a plain
/// `Driver` across every `Collection`/`Executor` a transactional child
/// facade constructs, while still exposing `commit`/`rollback` to the one
/// caller (`Persistence::transact`) that owns the transaction's lifecycle.
struct TransactionHandle {
    inner: tokio::sync::Mutex<Option<Box<dyn TxDriver>>>,
}

impl TransactionHandle {
    fn new(tx: Box<dyn TxDriver>) -> Self {
        Self {
            inner: tokio::sync::Mutex::new(Some(tx)),
        }
    }

    fn finished() -> DriverError {
        DriverError::Backend("transaction already committed or rolled back".to_string())
    }

    async fn commit(&self) -> Result<(), DriverError> {
        let tx = self.inner.lock().await.take().ok_or_else(Self::finished)?;
        tx.commit().await
    }

    async fn rollback(&self) -> Result<(), DriverError> {
        let tx = self.inner.lock().await.take().ok_or_else(Self::finished)?;
        tx.rollback().await
    }
}

#[async_trait]
impl Driver for TransactionHandle {
    async fn collection_exists(&self, name: &str) -> Result<bool, DriverError> {
        let guard = self.inner.lock().await;
        guard.as_ref().ok_or_else(Self::finished)?.collection_exists(name).await
    }

    async fn create_collection(&self, spec: &CollectionSpec) -> Result<(), DriverError> {
        let guard = self.inner.lock().await;
        guard.as_ref().ok_or_else(Self::finished)?.create_collection(spec).await
    }

    async fn drop_collection(&self, name: &str) -> Result<(), DriverError> {
        let guard = self.inner.lock().await;
        guard.as_ref().ok_or_else(Self::finished)?.drop_collection(name).await
    }

    async fn insert(&self, collection: &str, doc: Document) -> Result<Vec<String>, DriverError> {
        let guard = self.inner.lock().await;
        guard.as_ref().ok_or_else(Self::finished)?.insert(collection, doc).await
    }

    async fn find(&self, collection: &str, query: &Query) -> Result<Vec<Document>, DriverError> {
        let guard = self.inner.lock().await;
        guard.as_ref().ok_or_else(Self::finished)?.find(collection, query).await
    }

    async fn update_where(&self, collection: &str, filter: &Filter, patch: &Document) -> Result<u64, DriverError> {
        let guard = self.inner.lock().await;
        guard
            .as_ref()
            .ok_or_else(Self::finished)?
            .update_where(collection, filter, patch)
            .await
    }

    async fn delete_where(&self, collection: &str, filter: &Filter, allow_unsafe: bool) -> Result<u64, DriverError> {
        let guard = self.inner.lock().await;
        guard
            .as_ref()
            .ok_or_else(Self::finished)?
            .delete_where(collection, filter, allow_unsafe)
            .await
    }

    async fn collection_stats(&self, collection: &str) -> Result<Option<CollectionStats>, DriverError> {
        let guard = self.inner.lock().await;
        guard.as_ref().ok_or_else(Self::finished)?.collection_stats(collection).await
    }

    async fn start_transaction(&self) -> Result<Box<dyn TxDriver>, DriverError> {
        Err(DriverError::Backend("nested transactions are not supported".to_string()))
    }
}

/// The `Collection`-facing hook that persists a schema version bump into
/// the meta-collection (spec §4.2/§4.3).
struct FacadeMetaHandle {
    meta_executor: Executor,
    names: Arc<RwLock<HashMap<String, String>>>,
}

#[async_trait]
impl MetaHandle for FacadeMetaHandle {
    async fn record(&self, logical: &str) -> Result<SchemaRecord, PersistenceError> {
        let physical = self
            .names
            .read()
            .get(logical)
            .cloned()
            .ok_or_else(|| PersistenceError::NotFound(logical.to_string()))?;
        let filter = record_filter(&CollectionName {
            logical: logical.to_string(),
            physical,
        });
        let docs = self
            .meta_executor
            .find(&Query::matching(filter), None)
            .await
            .map_err(PersistenceError::Driver)?;
        let doc = docs.first().ok_or_else(|| PersistenceError::NotFound(logical.to_string()))?;
        document_to_record(doc)
    }

    async fn apply_migration(
        &self,
        logical: &str,
        schema: SchemaDefinition,
        history: SchemaHistoryEntry,
    ) -> Result<(), PersistenceError> {
        let mut record = self.record(logical).await?;
        let filter = record_filter(&record.name);
        record.version = schema.version.clone();
        record.schema = schema;
        record.history.push(history);

        let patch = record_to_document(&record)?;
        let (ok, issues) = Validator::new(&meta_schema(), &FunctionMap::default()).validate(&patch, false);
        if !ok {
            return Err(PersistenceError::Validation(issues));
        }
        self.meta_executor
            .update_where(&filter, &patch, None)
            .await
            .map_err(PersistenceError::Driver)?;
        Ok(())
    }
}
