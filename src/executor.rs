//! Connection seam between the worker pool and the store
//!
//! Every worker owns exactly one `ShardConnection` for its whole lifetime.
//! `Connector` produces them; the PostgreSQL implementation is backed by a
//! dedicated `sqlx::PgConnection` rather than a shared pool.

use crate::config::StoreConfig;
use crate::error::{Result, TablesplitError};
use async_trait::async_trait;
use sqlx::postgres::PgConnection;
use sqlx::Connection;
use tracing::debug;

/// A live connection owned by a single worker.
#[async_trait]
pub trait ShardConnection: Send {
    /// Run a single-row, single-column count query.
    async fn count(&mut self, sql: &str) -> Result<u64>;

    /// Run a statement for its side effect; returns rows affected.
    async fn execute(&mut self, sql: &str) -> Result<u64>;

    /// Close gracefully. Dropping the connection also releases it.
    async fn close(self: Box<Self>) -> Result<()>;
}

#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn ShardConnection>>;
}

/// Opens one PostgreSQL connection per call.
#[derive(Debug, Clone)]
pub struct PgConnector {
    database_url: String,
    statement_timeout_ms: Option<u64>,
}

impl PgConnector {
    pub fn new(store: &StoreConfig) -> Self {
        Self {
            database_url: store.database_url.clone(),
            statement_timeout_ms: store.statement_timeout_ms,
        }
    }
}

#[async_trait]
impl Connector for PgConnector {
    async fn connect(&self) -> Result<Box<dyn ShardConnection>> {
        let mut conn = PgConnection::connect(&self.database_url).await?;

        if let Some(ms) = self.statement_timeout_ms {
            let set_timeout = format!("SET statement_timeout = {}", ms);
            sqlx::Executor::execute(&mut conn, sqlx::raw_sql(&set_timeout)).await?;
            debug!(statement_timeout_ms = ms, "statement timeout applied");
        }

        Ok(Box::new(PgShardConnection { conn }))
    }
}

pub struct PgShardConnection {
    conn: PgConnection,
}

#[async_trait]
impl ShardConnection for PgShardConnection {
    async fn count(&mut self, sql: &str) -> Result<u64> {
        let count = sqlx::query_scalar::<_, i64>(sql).fetch_one(&mut self.conn).await?;
        u64::try_from(count)
            .map_err(|_| TablesplitError::Execution(format!("negative count {} from '{}'", count, sql)))
    }

    async fn execute(&mut self, sql: &str) -> Result<u64> {
        let done = sqlx::Executor::execute(&mut self.conn, sqlx::raw_sql(sql)).await?;
        Ok(done.rows_affected())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.conn.close().await?;
        Ok(())
    }
}
