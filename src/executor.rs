//! Binds a driver (or transactional driver) to a single physical
//! collection's CRUD surface (component D). Grounded on `control`'s
//! `services/connectors.rs` pattern of a thin layer over a `repo` — here the
//! "repo" is the [`Driver`] trait object and the service wrapping it is this
//! `Executor`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::driver::{CollectionStats, Driver, DriverError, Filter, Query};
use crate::value::Document;

/// An ambient cancellation/deadline token (spec §5), propagated by the
/// caller down to the driver. Cheap to clone; cancelling any clone cancels
/// every clone sharing the same source.
#[derive(Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Component D: fixes a physical collection name against a driver handle
/// and exposes the CRUD primitives the collection layer needs, checking the
/// cancellation token before every call that would otherwise block on I/O.
#[derive(Clone)]
pub struct Executor {
    driver: Arc<dyn Driver>,
    physical: String,
}

impl Executor {
    pub fn new(driver: Arc<dyn Driver>, physical: impl Into<String>) -> Self {
        Self {
            driver,
            physical: physical.into(),
        }
    }

    pub fn physical(&self) -> &str {
        &self.physical
    }

    pub fn driver(&self) -> &Arc<dyn Driver> {
        &self.driver
    }

    fn check_cancelled(token: Option<&CancellationToken>) -> Result<(), DriverError> {
        if token.map(CancellationToken::is_cancelled).unwrap_or(false) {
            return Err(DriverError::Cancelled);
        }
        Ok(())
    }

    pub async fn exists(&self) -> Result<bool, DriverError> {
        self.driver.collection_exists(&self.physical).await
    }

    pub async fn insert(
        &self,
        doc: Document,
        token: Option<&CancellationToken>,
    ) -> Result<Vec<String>, DriverError> {
        Self::check_cancelled(token)?;
        self.driver.insert(&self.physical, doc).await
    }

    pub async fn find(
        &self,
        query: &Query,
        token: Option<&CancellationToken>,
    ) -> Result<Vec<Document>, DriverError> {
        Self::check_cancelled(token)?;
        self.driver.find(&self.physical, query).await
    }

    pub async fn update_where(
        &self,
        filter: &Filter,
        patch: &Document,
        token: Option<&CancellationToken>,
    ) -> Result<u64, DriverError> {
        Self::check_cancelled(token)?;
        self.driver.update_where(&self.physical, filter, patch).await
    }

    pub async fn delete_where(
        &self,
        filter: &Filter,
        allow_unsafe: bool,
        token: Option<&CancellationToken>,
    ) -> Result<u64, DriverError> {
        Self::check_cancelled(token)?;
        self.driver.delete_where(&self.physical, filter, allow_unsafe).await
    }

    pub async fn stats(&self) -> Result<Option<CollectionStats>, DriverError> {
        self.driver.collection_stats(&self.physical).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::memory::MemoryDriver;
    use crate::driver::CollectionSpec;

    #[tokio::test]
    async fn cancelled_token_short_circuits_before_driver_call() {
        let driver: Arc<dyn Driver> = Arc::new(MemoryDriver::new());
        driver
            .create_collection(&CollectionSpec {
                physical: "p1".into(),
                logical: "posts".into(),
            })
            .await
            .unwrap();
        let executor = Executor::new(driver, "p1");

        let token = CancellationToken::new();
        token.cancel();

        let err = executor.find(&Query::default(), Some(&token)).await.unwrap_err();
        assert!(matches!(err, DriverError::Cancelled));
    }
}
