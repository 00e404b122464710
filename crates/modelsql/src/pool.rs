//! Pooled execution over `deadpool-postgres` (feature `pool`).

use crate::db::{ExecutionChannel, RowData};
use crate::error::{ModelError, ModelResult};
use crate::pg::row_data;
use crate::value::SqlValue;
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use tokio_postgres::NoTls;
use tokio_postgres::types::ToSql;

pub const DEFAULT_POOL_SIZE: usize = 16;

/// Build a pool from a libpq-style connection string.
pub fn create_pool(config: &str, max_size: usize) -> ModelResult<Pool> {
    let pg_config: tokio_postgres::Config = config.parse()?;
    let manager = Manager::from_config(
        pg_config,
        NoTls,
        ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        },
    );
    Pool::builder(manager)
        .max_size(max_size)
        .build()
        .map_err(|e| ModelError::Pool(e.to_string()))
}

/// An execution channel that checks a client out of the pool per statement.
pub struct PooledChannel {
    pool: Pool,
}

impl PooledChannel {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Connect with the default pool size.
    pub fn connect(config: &str) -> ModelResult<Self> {
        Ok(Self::new(create_pool(config, DEFAULT_POOL_SIZE)?))
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }
}

impl ExecutionChannel for PooledChannel {
    async fn execute(&self, sql: &str, args: &[SqlValue]) -> ModelResult<Vec<RowData>> {
        let client = self.pool.get().await?;
        let params: Vec<&(dyn ToSql + Sync)> =
            args.iter().map(|v| v as &(dyn ToSql + Sync)).collect();
        let rows = client.query(sql, &params).await?;
        rows.iter().map(row_data).collect()
    }

    async fn run_script(&self, sql: &str) -> ModelResult<()> {
        let client = self.pool.get().await?;
        client.batch_execute(sql).await?;
        Ok(())
    }
}
