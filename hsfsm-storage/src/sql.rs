//! SQL stores backed by a caller-owned `sqlx` pool.
//!
//! The pool is borrowed for statement execution only; connecting, sizing and
//! closing it stay with the caller. The entity table must already exist with
//! a unique key on the id column, e.g.
//!
//! ```sql
//! CREATE TABLE task (id VARCHAR(64) NOT NULL UNIQUE, state VARCHAR(64) NOT NULL)
//! ```

use async_trait::async_trait;
use hsfsm_core::{Dialect, RenderedStatement, State, Statement, StatementKind, Store, StoreError};
use sqlx::{Database, Pool};

/// A store executing rendered statements on a `sqlx` pool.
pub struct SqlStore<DB: Database> {
    pool: Pool<DB>,
    dialect: Dialect,
}

impl<DB: Database> Clone for SqlStore<DB> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            dialect: self.dialect,
        }
    }
}

impl<DB: Database> SqlStore<DB> {
    pub fn pool(&self) -> &Pool<DB> {
        &self.pool
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Fails unless this store speaks `expected`, typically
    /// `config.store.dialect`.
    pub fn ensure_dialect(&self, expected: Dialect) -> Result<(), StoreError> {
        if self.dialect != expected {
            return Err(StoreError::Unsupported(format!(
                "configured for {} but the pool is {}",
                expected, self.dialect
            )));
        }
        Ok(())
    }

    fn render(&self, statement: &Statement, read: bool) -> Result<RenderedStatement, StoreError> {
        let is_read = matches!(statement.kind(), StatementKind::Read);
        if is_read != read {
            return Err(StoreError::Unsupported(format!(
                "{} statement passed to {}",
                statement.operation(),
                if read { "query_one" } else { "execute" }
            )));
        }

        let rendered = statement.render(self.dialect);
        tracing::trace!(
            dialect = %self.dialect,
            sql = %rendered.sql,
            params = ?rendered.params,
            "rendered statement"
        );
        Ok(rendered)
    }
}

#[cfg(feature = "sqlite")]
impl SqlStore<sqlx::Sqlite> {
    pub fn sqlite(pool: sqlx::SqlitePool) -> Self {
        Self {
            pool,
            dialect: Dialect::Sqlite,
        }
    }
}

#[cfg(feature = "mysql")]
impl SqlStore<sqlx::MySql> {
    pub fn mysql(pool: sqlx::MySqlPool) -> Self {
        Self {
            pool,
            dialect: Dialect::MySql,
        }
    }
}

#[cfg(feature = "postgres")]
impl SqlStore<sqlx::Postgres> {
    pub fn postgres(pool: sqlx::PgPool) -> Self {
        Self {
            pool,
            dialect: Dialect::Postgres,
        }
    }
}

fn map_error(e: sqlx::Error) -> StoreError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::DuplicateKey(db.message().to_string())
        }
        _ => StoreError::Backend(e.to_string()),
    }
}

macro_rules! impl_sql_store {
    ($db:ty) => {
        #[async_trait]
        impl Store for SqlStore<$db> {
            async fn execute(&self, statement: &Statement) -> Result<u64, StoreError> {
                let rendered = self.render(statement, false)?;
                let mut query = sqlx::query::<$db>(&rendered.sql);
                for param in rendered.params {
                    query = query.bind(param);
                }
                let result = query.execute(&self.pool).await.map_err(map_error)?;
                Ok(result.rows_affected())
            }

            async fn query_one(&self, statement: &Statement) -> Result<Option<State>, StoreError> {
                let rendered = self.render(statement, true)?;
                let mut query = sqlx::query_scalar::<$db, String>(&rendered.sql);
                for param in rendered.params {
                    query = query.bind(param);
                }
                let state = query.fetch_optional(&self.pool).await.map_err(map_error)?;
                Ok(state.map(State::from))
            }
        }
    };
}

#[cfg(feature = "sqlite")]
impl_sql_store!(sqlx::Sqlite);

#[cfg(feature = "mysql")]
impl_sql_store!(sqlx::MySql);

#[cfg(feature = "postgres")]
impl_sql_store!(sqlx::Postgres);
