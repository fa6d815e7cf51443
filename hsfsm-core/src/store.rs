//! Store boundary.
//!
//! The engine only needs two primitives from a durable store: execute a
//! statement and report the affected rows, and read one column of at most
//! one row. Implementations must evaluate each [`Statement`] atomically;
//! that is the only concurrency control in the system.

use crate::definition::State;
use crate::error::StoreError;
use crate::statement::Statement;
use async_trait::async_trait;
use std::sync::Arc;

/// A durable keyed store.
#[async_trait]
pub trait Store: Send + Sync {
    /// Executes an insert or conditional-update statement and returns the
    /// number of affected rows as reported by the backend.
    ///
    /// Must return [`StoreError::DuplicateKey`] when a plain insert hits an
    /// existing row.
    async fn execute(&self, statement: &Statement) -> Result<u64, StoreError>;

    /// Runs a read statement, returning `None` when no row matches.
    async fn query_one(&self, statement: &Statement) -> Result<Option<State>, StoreError>;
}

#[async_trait]
impl<S: Store + ?Sized> Store for Arc<S> {
    async fn execute(&self, statement: &Statement) -> Result<u64, StoreError> {
        (**self).execute(statement).await
    }

    async fn query_one(&self, statement: &Statement) -> Result<Option<State>, StoreError> {
        (**self).query_one(statement).await
    }
}

#[async_trait]
impl<S: Store + ?Sized> Store for &S {
    async fn execute(&self, statement: &Statement) -> Result<u64, StoreError> {
        (**self).execute(statement).await
    }

    async fn query_one(&self, statement: &Statement) -> Result<Option<State>, StoreError> {
        (**self).query_one(statement).await
    }
}
