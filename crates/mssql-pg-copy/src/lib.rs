//! # mssql-pg-copy
//!
//! Table-by-table data migration from Microsoft SQL Server to PostgreSQL.
//!
//! For each table the library reads the column layout from the source,
//! creates a matching target table when none exists, then copies rows in
//! fixed-size batches with one transaction per batch. Row failures are counted
//! and skipped, table failures are recorded and the job moves on.
//!
//! - **Type mapping** from SQL Server column types to PostgreSQL
//! - **Duplicate-tolerant reruns** with `skip_existing_rows`
//! - **Cooperative cancellation** at batch boundaries
//! - **HTTP job control** (start, poll, cancel) on top of the same engine
//!
//! ## Example
//!
//! ```rust,no_run
//! use mssql_pg_copy::{Config, InMemoryJobStore, MigrationJob, MssqlPool, Orchestrator, PgPool};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> mssql_pg_copy::Result<()> {
//!     let config = Config::from_env()?;
//!     let source = MssqlPool::connect(config.source.clone()).await?;
//!     let target = PgPool::connect(config.target.clone()).await?;
//!
//!     let job = MigrationJob::new(config.source, config.target)
//!         .with_tables(config.migration.tables)
//!         .with_batch_size(config.migration.batch_size);
//!
//!     let orchestrator = Orchestrator::new(Arc::new(InMemoryJobStore::new()));
//!     let job = orchestrator
//!         .run(job, &source, &target, &CancellationToken::new())
//!         .await?;
//!     println!("Migrated {} rows", job.totals.rows_migrated);
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod identifier;
pub mod orchestrator;
pub mod provision;
pub mod report;
pub mod source;
pub mod state;
pub mod target;
pub mod transfer;
pub mod typemap;

#[cfg(test)]
mod testing;

// Re-exports for convenient access
pub use api::{router, ApiState};
pub use config::{Config, MigrationOptions, SourceConfig, TargetConfig};
pub use error::{MigrateError, Result, RowError};
pub use orchestrator::{Connector, DatabaseConnector, Orchestrator};
pub use provision::{ProvisionOutcome, TableProvisioner};
pub use report::render_summary;
pub use source::{ColumnDescriptor, MssqlPool, SourcePool, TableSchema};
pub use state::{
    InMemoryJobStore, JobStatus, JobStore, MigrationJob, TableMigrationResult, TableStatus,
};
pub use target::{BatchWriter, PgPool, SqlValue, TargetPool};
pub use transfer::{BatchCopier, CopyOptions, CopyProgress};
pub use typemap::map_type;
