//! Traced pool and connection wrappers.
//!
//! Every statement the Postgres store sends goes through [`TracedObject`],
//! which runs it inside a `db.execute` / `db.query` debug span carrying the
//! SQL text, the parameter count and the row count.

use std::ops::Deref;

use tokio_postgres::types::ToSql;
use tokio_postgres::{Error, Row};
use tracing::Instrument;

/// A connection pool that hands out [`TracedObject`]s.
#[derive(Clone)]
pub struct TracedPool {
    inner: deadpool_postgres::Pool,
}

impl TracedPool {
    pub fn new(pool: deadpool_postgres::Pool) -> Self {
        Self { inner: pool }
    }

    /// Get a traced connection from the pool.
    pub async fn get(&self) -> Result<TracedObject, deadpool_postgres::PoolError> {
        let conn = self.inner.get().await?;
        Ok(TracedObject { inner: conn })
    }

    pub fn inner(&self) -> &deadpool_postgres::Pool {
        &self.inner
    }
}

/// A pooled connection whose statements are logged via tracing.
pub struct TracedObject {
    inner: deadpool_postgres::Object,
}

impl TracedObject {
    fn client(&self) -> &tokio_postgres::Client {
        self.inner.deref()
    }

    /// Execute a statement, returning the number of rows affected.
    pub async fn execute(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> Result<u64, Error> {
        let span = tracing::debug_span!(
            "db.execute",
            sql = %sql,
            params = params.len(),
            affected = tracing::field::Empty,
        );
        let affected = self
            .client()
            .execute(sql, params)
            .instrument(span.clone())
            .await?;
        span.record("affected", affected);
        Ok(affected)
    }

    /// Execute a query, returning all rows.
    pub async fn query(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<Vec<Row>, Error> {
        let span = tracing::debug_span!(
            "db.query",
            sql = %sql,
            params = params.len(),
            rows = tracing::field::Empty,
        );
        let rows = self
            .client()
            .query(sql, params)
            .instrument(span.clone())
            .await?;
        span.record("rows", rows.len());
        Ok(rows)
    }

    /// Run several parameterless statements in one round trip.
    pub async fn batch_execute(&self, sql: &str) -> Result<(), Error> {
        let span = tracing::debug_span!("db.execute", sql = %sql, params = 0usize);
        self.client().batch_execute(sql).instrument(span).await
    }

    /// Take the connection out of the pool and close it.
    ///
    /// Postgres aborts any transaction still open on it.
    pub fn detach(self) {
        let client = deadpool_postgres::Object::take(self.inner);
        drop(client);
    }
}
