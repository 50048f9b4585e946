//! Migration orchestrator - coordinates the migration workflow.
//!
//! A job runs its tables one after the other: describe, provision, copy. A
//! table that fails at any step is recorded as failed and the job moves on to
//! the next table. Only a failure to list the source tables fails the job.

mod pools;

pub use pools::{Connector, DatabaseConnector};

use crate::error::{MigrateError, Result};
use crate::provision::TableProvisioner;
use crate::source::SourcePool;
use crate::state::{
    unique_tables, JobStatus, JobStore, MigrationJob, TableMigrationResult, TableStatus,
};
use crate::target::TargetPool;
use crate::transfer::{BatchCopier, CopyOptions, CopyProgress};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Starts jobs, reports their status and cancels them.
pub struct Orchestrator {
    store: Arc<dyn JobStore>,
    tokens: Arc<Mutex<HashMap<String, CancellationToken>>>,
}

impl Orchestrator {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self {
            store,
            tokens: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Start `job` in the background and return its id.
    ///
    /// The job owns `source` and `target` and closes both when it ends.
    pub async fn start(
        &self,
        mut job: MigrationJob,
        source: Arc<dyn SourcePool>,
        target: Arc<dyn TargetPool>,
    ) -> Result<String> {
        let id = job.id.clone();
        let token = CancellationToken::new();
        self.register(&id, token.clone());
        if let Err(e) = self.mark_running(&mut job).await {
            self.unregister(&id);
            return Err(e);
        }

        let store = Arc::clone(&self.store);
        let tokens = Arc::clone(&self.tokens);
        let task_id = id.clone();
        tokio::spawn(async move {
            drive(store, job, source.as_ref(), target.as_ref(), &token).await;
            source.close().await;
            target.close().await;
            if let Ok(mut tokens) = tokens.lock() {
                tokens.remove(&task_id);
            }
        });

        Ok(id)
    }

    /// Run `job` to completion on the current task.
    ///
    /// The caller keeps ownership of the pools and of `cancel`.
    pub async fn run(
        &self,
        mut job: MigrationJob,
        source: &dyn SourcePool,
        target: &dyn TargetPool,
        cancel: &CancellationToken,
    ) -> Result<MigrationJob> {
        let id = job.id.clone();
        self.register(&id, cancel.clone());
        if let Err(e) = self.mark_running(&mut job).await {
            self.unregister(&id);
            return Err(e);
        }

        let finished = drive(Arc::clone(&self.store), job, source, target, cancel).await;
        self.unregister(&id);
        Ok(finished)
    }

    /// Current snapshot of a job.
    pub async fn status(&self, id: &str) -> Result<MigrationJob> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| MigrateError::JobNotFound(id.to_string()))
    }

    /// Request cancellation. Returns true only if the job was running.
    pub async fn cancel(&self, id: &str) -> Result<bool> {
        let job = self.status(id).await?;
        if job.status != JobStatus::Running {
            return Ok(false);
        }

        let token = self
            .tokens
            .lock()
            .map_err(|_| MigrateError::JobState("cancellation registry poisoned".into()))?
            .get(id)
            .cloned();

        match token {
            Some(token) => {
                info!("Cancellation requested for job {}", id);
                token.cancel();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn mark_running(&self, job: &mut MigrationJob) -> Result<()> {
        if job.status != JobStatus::Pending {
            return Err(MigrateError::JobState(format!(
                "job {} is {:?}, expected Pending",
                job.id, job.status
            )));
        }
        if job.batch_size == 0 {
            return Err(MigrateError::Config("batch_size must be greater than 0".into()));
        }

        job.status = JobStatus::Running;
        job.started_at = Some(Utc::now());
        self.store.set(job).await
    }

    /// Tokens are registered before the job is published as running, so a
    /// running job always has one.
    fn register(&self, id: &str, token: CancellationToken) {
        if let Ok(mut tokens) = self.tokens.lock() {
            tokens.insert(id.to_string(), token);
        }
    }

    fn unregister(&self, id: &str) {
        if let Ok(mut tokens) = self.tokens.lock() {
            tokens.remove(id);
        }
    }
}

/// Drive a running job through all of its tables.
async fn drive(
    store: Arc<dyn JobStore>,
    mut job: MigrationJob,
    source: &dyn SourcePool,
    target: &dyn TargetPool,
    cancel: &CancellationToken,
) -> MigrationJob {
    info!(
        "Starting migration job {} ({} -> {})",
        job.id, job.source.database, job.target.database
    );

    let tables = if job.tables.is_empty() {
        match source.list_tables().await {
            Ok(tables) => unique_tables(tables),
            Err(e) => {
                error!("Job {}: listing tables failed: {}", job.id, e);
                job.error = Some(e.to_string());
                job.finish(JobStatus::Failed);
                publish(store.as_ref(), &job).await;
                return job;
            }
        }
    } else {
        unique_tables(job.tables.clone())
    };

    job.totals.tables_total = tables.len();
    publish(store.as_ref(), &job).await;

    let options = CopyOptions {
        batch_size: job.batch_size,
        skip_existing: job.skip_existing_rows,
    };
    let tracker = JobTracker {
        store: Arc::clone(&store),
        job: Mutex::new(job),
    };

    let mut cancelled = false;
    for table in &tables {
        if cancel.is_cancelled() {
            cancelled = true;
            break;
        }

        tracker.begin_table(table).await;
        let result = migrate_table(source, target, table, &options, cancel, &tracker).await;
        let stopped = result.status == TableStatus::Cancelled;
        tracker.finish_table(result).await;

        if stopped {
            cancelled = true;
            break;
        }
    }

    let status = if cancelled {
        JobStatus::Cancelled
    } else {
        JobStatus::Completed
    };
    let job = tracker.finish(status).await;

    info!(
        "Job {} {:?}: {}/{} tables, {} rows migrated, {} skipped, {} errors",
        job.id,
        job.status,
        job.totals.tables_completed,
        job.totals.tables_total,
        job.totals.rows_migrated,
        job.totals.rows_skipped,
        job.totals.error_count
    );
    job
}

/// Describe, provision and copy one table. Never fails; errors become a
/// failed result.
async fn migrate_table(
    source: &dyn SourcePool,
    target: &dyn TargetPool,
    table: &str,
    options: &CopyOptions,
    cancel: &CancellationToken,
    progress: &dyn CopyProgress,
) -> TableMigrationResult {
    let schema = match source.describe_table(table).await {
        Ok(schema) => schema,
        Err(e) => {
            warn!("{}: describe failed: {}", table, e);
            return TableMigrationResult::failed(table, e.to_string());
        }
    };

    if let Err(e) = TableProvisioner::new(target).ensure_table(&schema).await {
        warn!("{}: provisioning failed: {}", table, e);
        return TableMigrationResult::failed(table, e.to_string());
    }

    BatchCopier::new(source, target)
        .copy_table(&schema, options, cancel, progress)
        .await
}

async fn publish(store: &dyn JobStore, job: &MigrationJob) {
    if let Err(e) = store.set(job).await {
        warn!("Job {}: failed to publish status: {}", job.id, e);
    }
}

/// Owns the job while it runs and republishes it on every change.
struct JobTracker {
    store: Arc<dyn JobStore>,
    job: Mutex<MigrationJob>,
}

impl JobTracker {
    fn snapshot<F: FnOnce(&mut MigrationJob)>(&self, update: F) -> Option<MigrationJob> {
        let mut job = self.job.lock().ok()?;
        update(&mut job);
        Some(job.clone())
    }

    async fn begin_table(&self, table: &str) {
        if let Some(job) = self.snapshot(|job| job.current_table = Some(table.to_string())) {
            publish(self.store.as_ref(), &job).await;
        }
    }

    async fn finish_table(&self, result: TableMigrationResult) {
        if let Some(job) = self.snapshot(|job| job.record_table(result)) {
            publish(self.store.as_ref(), &job).await;
        }
    }

    async fn finish(self, status: JobStatus) -> MigrationJob {
        let mut job = match self.job.into_inner() {
            Ok(job) => job,
            Err(poisoned) => poisoned.into_inner(),
        };
        job.finish(status);
        publish(self.store.as_ref(), &job).await;
        job
    }
}

#[async_trait]
impl CopyProgress for JobTracker {
    /// Publish the committed totals plus the running table's partial counts.
    async fn batch_committed(&self, progress: &TableMigrationResult) {
        let live = self.snapshot(|_| {}).map(|mut job| {
            job.totals.rows_total += progress.rows_total;
            job.totals.rows_migrated += progress.rows_migrated;
            job.totals.rows_skipped += progress.rows_skipped;
            job.totals.error_count += progress.errors;
            job.per_table_results
                .insert(progress.table_name.clone(), progress.clone());
            job
        });
        if let Some(job) = live {
            publish(self.store.as_ref(), &job).await;
        }
    }
}
