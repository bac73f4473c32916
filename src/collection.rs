//! Per-collection CRUD + validate + migrate/rollback (component F).
//! Grounded on the `control/src/services/connectors.rs` +
//! `control/src/repo/connectors.rs` pairing: the service (here, `Collection`
//! itself) owns validation and event emission, while I/O is delegated to the
//! repo-equivalent (the [`Executor`]).

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use uuid::Uuid;

use crate::bus::{EventBus, EventType, PersistenceEvent};
use crate::driver::{Filter, Query};
use crate::error::PersistenceError;
use crate::executor::Executor;
use crate::schema::{FunctionMap, SchemaDefinition, SchemaHistoryEntry, SchemaRecord};
use crate::util;
use crate::validator::{Issue, Validator};
use crate::value::{document_to_json, Document, Value};

/// Read-side result shape (spec §4.2): `count == 1` implies the single-
/// document shape, matching how the source collapses a one-row result.
#[derive(Clone, Debug)]
pub enum ReadOutcome {
    Single(Document),
    Many(Vec<Document>),
}

#[derive(Clone, Debug)]
pub struct ReadResult {
    pub data: ReadOutcome,
    pub count: usize,
}

#[derive(Clone, Debug, Default)]
pub struct UpdateParams {
    pub filter: Filter,
    pub data: Document,
}

#[derive(Clone, Debug)]
pub struct MigrationOutcome {
    pub schema: SchemaDefinition,
    pub preview: Vec<Document>,
}

/// The facade-level hook `Collection` uses to persist a schema version bump
/// into the meta-collection (spec §4.2/§4.3). Injected so `Collection` stays
/// ignorant of the facade that constructed it — the meta-collection's own
/// `Collection` gets `None` here, since the schema-of-schemas can't migrate
/// itself (spec §9 treats the meta-schema as embedded/build-time).
#[async_trait]
pub trait MetaHandle: Send + Sync {
    async fn record(&self, logical: &str) -> Result<SchemaRecord, PersistenceError>;
    async fn apply_migration(
        &self,
        logical: &str,
        schema: SchemaDefinition,
        history: SchemaHistoryEntry,
    ) -> Result<(), PersistenceError>;
}

/// Component F: a named, schema-described container of documents.
pub struct Collection {
    logical: String,
    schema: SchemaDefinition,
    functions: FunctionMap,
    executor: Executor,
    bus: Arc<EventBus>,
    transaction_id: Option<Uuid>,
    meta: Option<Arc<dyn MetaHandle>>,
}

impl Collection {
    pub fn new(
        logical: impl Into<String>,
        schema: SchemaDefinition,
        functions: FunctionMap,
        executor: Executor,
        bus: Arc<EventBus>,
        transaction_id: Option<Uuid>,
        meta: Option<Arc<dyn MetaHandle>>,
    ) -> Self {
        Self {
            logical: logical.into(),
            schema,
            functions,
            executor,
            bus,
            transaction_id,
            meta,
        }
    }

    pub fn logical(&self) -> &str {
        &self.logical
    }

    pub fn schema(&self) -> &SchemaDefinition {
        &self.schema
    }

    pub fn physical(&self) -> &str {
        self.executor.physical()
    }

    /// Direct validator invocation: no events, no I/O (spec §4.2).
    pub fn validate(&self, data: &Document, loose: bool) -> (bool, Vec<Issue>) {
        Validator::new(&self.schema, &self.functions).validate(data, loose)
    }

    fn start_event(&self, event_type: EventType, operation: &str) -> PersistenceEvent {
        PersistenceEvent::new(event_type, operation)
            .with_collection(self.logical.clone())
            .with_transaction_id(self.transaction_id)
    }

    fn publish(&self, event: PersistenceEvent) {
        self.bus.publish(&event);
    }

    /// `Create(data)`: validate strictly, emit `document:create:{start,success,failed}`,
    /// insert via the executor.
    pub async fn create(&self, data: Document) -> Result<Vec<String>, PersistenceError> {
        self.publish(
            self.start_event(EventType::DocumentCreateStart, "create")
                .with_input(document_to_json(&data).into()),
        );

        let (ok, issues) = self.validate(&data, false);
        if !ok {
            self.publish(
                self.start_event(EventType::DocumentCreateFailed, "create")
                    .with_input(document_to_json(&data).into())
                    .with_issues(issues.clone()),
            );
            return Err(PersistenceError::Validation(issues));
        }

        let started = Instant::now();
        match self.executor.insert(data.clone(), None).await {
            Ok(ids) => {
                self.publish(
                    self.start_event(EventType::DocumentCreateSuccess, "create")
                        .with_output(Value::Sequence(ids.iter().cloned().map(Value::String).collect()))
                        .with_duration_ms(started.elapsed().as_millis() as i64),
                );
                Ok(ids)
            }
            Err(err) => {
                self.publish(
                    self.start_event(EventType::DocumentCreateFailed, "create")
                        .with_error(err.to_string())
                        .with_duration_ms(started.elapsed().as_millis() as i64),
                );
                Err(PersistenceError::Driver(err))
            }
        }
    }

    /// `Read(query)`: translate through the executor; `count == 1` collapses
    /// `data` to the single-document shape (spec §4.2).
    pub async fn read(&self, query: Query) -> Result<ReadResult, PersistenceError> {
        self.publish(self.start_event(EventType::DocumentReadStart, "read").with_query(query.clone()));

        let started = Instant::now();
        match self.executor.find(&query, None).await {
            Ok(mut docs) => {
                let count = docs.len();
                let data = if count == 1 {
                    ReadOutcome::Single(docs.pop().expect("len checked above"))
                } else {
                    ReadOutcome::Many(docs)
                };
                self.publish(
                    self.start_event(EventType::DocumentReadSuccess, "read")
                        .with_query(query)
                        .with_duration_ms(started.elapsed().as_millis() as i64),
                );
                Ok(ReadResult { data, count })
            }
            Err(err) => {
                self.publish(
                    self.start_event(EventType::DocumentReadFailed, "read")
                        .with_query(query)
                        .with_error(err.to_string())
                        .with_duration_ms(started.elapsed().as_millis() as i64),
                );
                Err(PersistenceError::Driver(err))
            }
        }
    }

    /// `Update(params)`: `data` is validated `loose=true` (partial update).
    pub async fn update(&self, params: UpdateParams) -> Result<u64, PersistenceError> {
        self.publish(
            self.start_event(EventType::DocumentUpdateStart, "update")
                .with_input(document_to_json(&params.data).into()),
        );

        let (ok, issues) = self.validate(&params.data, true);
        if !ok {
            self.publish(
                self.start_event(EventType::DocumentUpdateFailed, "update")
                    .with_input(document_to_json(&params.data).into())
                    .with_issues(issues.clone()),
            );
            return Err(PersistenceError::Validation(issues));
        }

        let started = Instant::now();
        match self
            .executor
            .update_where(&params.filter, &params.data, None)
            .await
        {
            Ok(count) => {
                self.publish(
                    self.start_event(EventType::DocumentUpdateSuccess, "update")
                        .with_output(Value::Number(count.into()))
                        .with_duration_ms(started.elapsed().as_millis() as i64),
                );
                Ok(count)
            }
            Err(err) => {
                self.publish(
                    self.start_event(EventType::DocumentUpdateFailed, "update")
                        .with_error(err.to_string())
                        .with_duration_ms(started.elapsed().as_millis() as i64),
                );
                Err(PersistenceError::Driver(err))
            }
        }
    }

    /// `Delete(filter, unsafe)`: when `allow_unsafe=false`, an empty filter
    /// is refused outright (spec §4.2 "refuse mass-delete").
    pub async fn delete(&self, filter: Filter, allow_unsafe: bool) -> Result<u64, PersistenceError> {
        self.publish(self.start_event(EventType::DocumentDeleteStart, "delete"));

        if !allow_unsafe && filter.is_empty() {
            self.publish(
                self.start_event(EventType::DocumentDeleteFailed, "delete")
                    .with_error(PersistenceError::UnsafeDelete.to_string()),
            );
            return Err(PersistenceError::UnsafeDelete);
        }

        let started = Instant::now();
        match self.executor.delete_where(&filter, allow_unsafe, None).await {
            Ok(count) => {
                self.publish(
                    self.start_event(EventType::DocumentDeleteSuccess, "delete")
                        .with_output(Value::Number(count.into()))
                        .with_duration_ms(started.elapsed().as_millis() as i64),
                );
                Ok(count)
            }
            Err(err) => {
                self.publish(
                    self.start_event(EventType::DocumentDeleteFailed, "delete")
                        .with_error(err.to_string())
                        .with_duration_ms(started.elapsed().as_millis() as i64),
                );
                Err(PersistenceError::Driver(err))
            }
        }
    }

    /// `Migrate(description, transform, dryRun)` (spec §4.2). The transform
    /// callback is the contract the embedder's migration tooling fulfills;
    /// this core only drives the preview/dry-run/history-append mechanics —
    /// the transformer's internals are out of scope (spec §1).
    pub async fn migrate(
        &self,
        description: impl Into<String>,
        to_version: impl Into<String>,
        transform: impl Fn(&mut Document) -> Result<(), PersistenceError>,
        dry_run: bool,
    ) -> Result<MigrationOutcome, PersistenceError> {
        let Some(meta) = &self.meta else {
            return Err(PersistenceError::MetaCollectionImmutable);
        };
        let description = description.into();
        let to_version = to_version.into();

        self.publish(self.start_event(EventType::MigrateStart, "migrate"));

        let current = self.executor.find(&Query::default(), None).await.map_err(|err| {
            self.publish(
                self.start_event(EventType::MigrateFailed, "migrate").with_error(err.to_string()),
            );
            PersistenceError::Driver(err)
        })?;

        let mut preview = Vec::with_capacity(current.len());
        for doc in &current {
            let mut transformed = doc.clone();
            if let Err(err) = transform(&mut transformed) {
                self.publish(
                    self.start_event(EventType::MigrateFailed, "migrate").with_error(err.to_string()),
                );
                return Err(err);
            }
            preview.push(transformed);
        }

        let new_schema = SchemaDefinition {
            version: to_version.clone(),
            ..self.schema.clone()
        };

        if dry_run {
            self.publish(self.start_event(EventType::MigrateSuccess, "migrate"));
            return Ok(MigrationOutcome {
                schema: new_schema,
                preview,
            });
        }

        for (original, transformed) in current.iter().zip(preview.iter()) {
            let filter = Filter(Value::Mapping(original.clone()));
            self.executor
                .delete_where(&filter, true, None)
                .await
                .map_err(PersistenceError::Driver)?;
            self.executor
                .insert(transformed.clone(), None)
                .await
                .map_err(PersistenceError::Driver)?;
        }

        let history = SchemaHistoryEntry {
            from_version: self.schema.version.clone(),
            to_version: to_version.clone(),
            description,
            applied_at_ms: crate::bus::now_ms(),
            schema: self.schema.clone(),
        };
        meta.apply_migration(&self.logical, new_schema.clone(), history).await?;

        self.publish(self.start_event(EventType::MigrateSuccess, "migrate"));
        Ok(MigrationOutcome {
            schema: new_schema,
            preview,
        })
    }

    /// `Rollback(version?, dryRun?)` (spec §4.2). Restores a previously
    /// recorded schema snapshot; data is left untouched (forward transforms
    /// aren't reversible in general, and the transformer internals are out
    /// of scope per spec §1 — rolling back the *schema* is what this core
    /// can faithfully guarantee).
    pub async fn rollback(
        &self,
        version: Option<String>,
        dry_run: bool,
    ) -> Result<MigrationOutcome, PersistenceError> {
        let Some(meta) = &self.meta else {
            return Err(PersistenceError::MetaCollectionImmutable);
        };

        self.publish(self.start_event(EventType::RollbackStart, "rollback"));

        let record = meta.record(&self.logical).await.map_err(|err| {
            self.publish(self.start_event(EventType::RollbackFailed, "rollback").with_error(err.to_string()));
            err
        })?;

        let target = match &version {
            Some(v) => record.history.iter().rev().find(|h| &h.to_version == v),
            None => record.history.last(),
        };

        let Some(target) = target else {
            self.publish(
                self.start_event(EventType::RollbackFailed, "rollback")
                    .with_error(PersistenceError::NoMigrationHistory.to_string()),
            );
            return Err(PersistenceError::NoMigrationHistory);
        };

        let restored_schema = target.schema.clone();
        let preview = self.executor.find(&Query::default(), None).await.map_err(|err| {
            self.publish(self.start_event(EventType::RollbackFailed, "rollback").with_error(err.to_string()));
            PersistenceError::Driver(err)
        })?;

        if dry_run {
            self.publish(self.start_event(EventType::RollbackSuccess, "rollback"));
            return Ok(MigrationOutcome {
                schema: restored_schema,
                preview,
            });
        }

        let history = SchemaHistoryEntry {
            from_version: self.schema.version.clone(),
            to_version: restored_schema.version.clone(),
            description: format!("rollback to {}", restored_schema.version),
            applied_at_ms: crate::bus::now_ms(),
            schema: self.schema.clone(),
        };
        meta.apply_migration(&self.logical, restored_schema.clone(), history).await?;

        self.publish(self.start_event(EventType::RollbackSuccess, "rollback"));
        Ok(MigrationOutcome {
            schema: restored_schema,
            preview,
        })
    }
}

/// Marshals a [`SchemaRecord`] to/from the document the meta-collection
/// actually stores (pairs with [`util::marshal`]/[`util::unmarshal`]).
pub fn record_to_document(record: &SchemaRecord) -> Result<Document, PersistenceError> {
    util::marshal(record).map_err(|err| {
        PersistenceError::Driver(crate::driver::DriverError::Backend(format!(
            "schema record did not marshal to a document: {err}"
        )))
    })
}

pub fn document_to_record(doc: &Document) -> Result<SchemaRecord, PersistenceError> {
    util::unmarshal(doc).map_err(|err| {
        PersistenceError::Driver(crate::driver::DriverError::Backend(format!(
            "document did not unmarshal to a schema record: {err}"
        )))
    })
}
