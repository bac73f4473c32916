//! The crate-wide error taxonomy (spec §7): validation issues, not-found,
//! conflict, driver errors, transaction failures, and programmer errors are
//! all folded into one enum per `control/src/error.rs`'s one-enum-per-crate
//! convention — but without the HTTP `IntoResponse` layer, since this core
//! has no outer web surface.

use crate::driver::DriverError;
use crate::validator::Issue;

/// Errors surfaced by every persistence operation (spec §7).
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    /// Validation issues, never thrown mid-operation — always returned
    /// in-band as the `Err` of a `Result`.
    #[error("validation failed with {} issue(s)", .0.len())]
    Validation(Vec<Issue>),

    #[error("collection `{0}` not found")]
    NotFound(String),

    #[error("collection `{0}` already exists")]
    Conflict(String),

    #[error("driver error")]
    Driver(#[from] DriverError),

    /// Rollback succeeded but the callback's own error is what's returned
    /// (spec §7.5); commit failures are reported as `Driver` instead, since
    /// they are not followed by an automatic re-rollback.
    #[error("transaction failed: {0}")]
    Transaction(String),

    #[error("operation was cancelled")]
    Cancelled,

    #[error("refused to delete without a filter; pass allow_unsafe to override")]
    UnsafeDelete,

    #[error("the meta-collection cannot be migrated or rolled back")]
    MetaCollectionImmutable,

    #[error("no migration history entry to roll back to")]
    NoMigrationHistory,
}

impl PersistenceError {
    pub fn issues(&self) -> Option<&[Issue]> {
        match self {
            PersistenceError::Validation(issues) => Some(issues),
            _ => None,
        }
    }
}
