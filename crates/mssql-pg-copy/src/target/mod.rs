//! PostgreSQL target database operations.

pub mod tls;
mod value;

pub use value::SqlValue;

use crate::config::TargetConfig;
use crate::error::{MigrateError, Result, RowError};
use crate::identifier::{column_list_pg, qualify_pg, target_table_name};
use crate::source::TableSchema;
use async_trait::async_trait;
use deadpool_postgres::{Manager, ManagerConfig, Object, Pool, RecyclingMethod};
use tokio_postgres::error::SqlState;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Config as PgConfig, NoTls, Statement};
use tracing::{debug, info, warn};

/// Connections in the target pool. Batches of one job run sequentially, the
/// rest serves catalog queries.
const TARGET_POOL_SIZE: usize = 4;

/// Target-side operations used by the provisioner and the batch copier.
#[async_trait]
pub trait TargetPool: Send + Sync {
    /// Whether the target table for source table `table` exists.
    ///
    /// The lookup uses the lower-cased name, so `Users` finds `users`.
    async fn table_exists(&self, table: &str) -> Result<bool>;

    /// Execute a DDL statement.
    async fn execute_ddl(&self, sql: &str) -> Result<()>;

    /// Open a transaction for one batch of rows destined for `schema`'s table.
    async fn begin_batch(&self, schema: &TableSchema) -> Result<Box<dyn BatchWriter>>;

    /// Target schema name.
    fn schema(&self) -> &str;

    /// Server version banner.
    async fn server_version(&self) -> Result<String>;

    /// Release the connection.
    async fn close(&self);
}

/// One open batch transaction.
///
/// Each row is isolated: a rejected row leaves the rows already inserted in the
/// batch intact. Nothing is visible to other sessions until `commit`.
#[async_trait]
pub trait BatchWriter: Send {
    /// Insert one row, values in column order.
    async fn insert_row(&mut self, row: &[SqlValue]) -> std::result::Result<(), RowError>;

    /// Commit the batch. On failure the batch is rolled back and nothing persists.
    async fn commit(self: Box<Self>) -> Result<()>;
}

/// PostgreSQL target backed by a `deadpool-postgres` pool.
pub struct PgPool {
    pool: Pool,
    config: TargetConfig,
}

impl PgPool {
    /// Connect and verify the connection with `SELECT 1`.
    pub async fn connect(config: TargetConfig) -> Result<Self> {
        let mut pg_config = PgConfig::new();
        pg_config.host(&config.host);
        pg_config.port(config.port);
        pg_config.dbname(&config.database);
        pg_config.user(&config.user);
        pg_config.password(&config.password);

        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Clean,
        };

        let ssl_mode = config.effective_ssl_mode()?;
        let mgr = match tls::make_connector(ssl_mode) {
            Some(connector) => {
                pg_config.ssl_mode(tokio_postgres::config::SslMode::Require);
                Manager::from_config(pg_config, connector, mgr_config)
            }
            None => Manager::from_config(pg_config, NoTls, mgr_config),
        };

        let pool = Pool::builder(mgr)
            .max_size(TARGET_POOL_SIZE)
            .build()
            .map_err(|e| MigrateError::pool(e.to_string(), "building PostgreSQL pool"))?;

        let target = Self { pool, config };
        let client = target.pool.get().await.map_err(|e| {
            MigrateError::Connectivity(format!(
                "PostgreSQL {}:{}/{}: {}",
                target.config.host, target.config.port, target.config.database, e
            ))
        })?;
        client.simple_query("SELECT 1").await?;
        drop(client);

        info!(
            "Connected to PostgreSQL: {}:{}/{} (ssl_mode={:?})",
            target.config.host, target.config.port, target.config.database, ssl_mode
        );
        Ok(target)
    }

    async fn get_client(&self) -> Result<Object> {
        self.pool.get().await.map_err(|e| {
            MigrateError::pool(e.to_string(), format!("PostgreSQL connection to {}", self.config.host))
        })
    }
}

#[async_trait]
impl TargetPool for PgPool {
    async fn table_exists(&self, table: &str) -> Result<bool> {
        let client = self.get_client().await?;

        let row = client
            .query_one(
                "SELECT EXISTS (
                    SELECT 1 FROM information_schema.tables
                    WHERE table_schema = $1 AND table_name = $2
                )",
                &[&self.config.schema, &target_table_name(table)],
            )
            .await?;

        Ok(row.get(0))
    }

    async fn execute_ddl(&self, sql: &str) -> Result<()> {
        let client = self.get_client().await?;
        client.batch_execute(sql).await?;
        Ok(())
    }

    async fn begin_batch(&self, schema: &TableSchema) -> Result<Box<dyn BatchWriter>> {
        let sql = insert_sql(&self.config.schema, schema)?;
        let client = self.get_client().await?;

        let statement = client.prepare(&sql).await?;
        client.batch_execute("BEGIN").await?;

        Ok(Box::new(PgBatchWriter {
            client,
            statement,
            table: schema.table_name.clone(),
        }))
    }

    fn schema(&self) -> &str {
        &self.config.schema
    }

    async fn server_version(&self) -> Result<String> {
        let client = self.get_client().await?;
        let row = client.query_one("SELECT version()", &[]).await?;
        Ok(row.get(0))
    }

    async fn close(&self) {
        self.pool.close();
        debug!("Closed PostgreSQL pool for {}", self.config.host);
    }
}

/// Batch transaction on a dedicated pooled connection.
///
/// Every row runs under `SAVEPOINT copy_row` so a failed INSERT does not abort
/// the enclosing transaction.
struct PgBatchWriter {
    client: Object,
    statement: Statement,
    table: String,
}

#[async_trait]
impl BatchWriter for PgBatchWriter {
    async fn insert_row(&mut self, row: &[SqlValue]) -> std::result::Result<(), RowError> {
        self.client
            .batch_execute("SAVEPOINT copy_row")
            .await
            .map_err(|e| RowError::Rejected(e.to_string()))?;

        let params: Vec<&(dyn ToSql + Sync)> =
            row.iter().map(|v| v as &(dyn ToSql + Sync)).collect();

        match self.client.execute(&self.statement, &params).await {
            Ok(_) => {
                self.client
                    .batch_execute("RELEASE SAVEPOINT copy_row")
                    .await
                    .map_err(|e| RowError::Rejected(e.to_string()))?;
                Ok(())
            }
            Err(e) => {
                if let Err(rollback) = self.client.batch_execute("ROLLBACK TO SAVEPOINT copy_row").await {
                    warn!("{}: rollback to savepoint failed: {}", self.table, rollback);
                }
                Err(classify_row_error(&e))
            }
        }
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        match self.client.batch_execute("COMMIT").await {
            Ok(()) => Ok(()),
            Err(e) => {
                if let Err(rollback) = self.client.batch_execute("ROLLBACK").await {
                    debug!("{}: rollback after failed commit: {}", self.table, rollback);
                }
                Err(MigrateError::transaction(&self.table, e.to_string()))
            }
        }
    }
}

fn classify_row_error(e: &tokio_postgres::Error) -> RowError {
    let message = e
        .as_db_error()
        .map(|db| db.message().to_string())
        .unwrap_or_else(|| e.to_string());

    if e.code() == Some(&SqlState::UNIQUE_VIOLATION) {
        RowError::UniqueViolation(message)
    } else {
        RowError::Rejected(message)
    }
}

/// Positional INSERT for every column of `schema`, in ordinal order.
pub(crate) fn insert_sql(target_schema: &str, schema: &TableSchema) -> Result<String> {
    let placeholders: Vec<String> = (1..=schema.columns.len()).map(|i| format!("${}", i)).collect();

    Ok(format!(
        "INSERT INTO {} ({}) VALUES ({})",
        qualify_pg(target_schema, &target_table_name(&schema.table_name))?,
        column_list_pg(schema.column_names())?,
        placeholders.join(", ")
    ))
}
