//! Migration job model and job storage.

mod backend;
mod memory;

pub use backend::JobStore;
pub use memory::InMemoryJobStore;

use crate::config::{SourceConfig, TargetConfig, DEFAULT_BATCH_SIZE};
use crate::error::MigrateError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use uuid::Uuid;

/// Job lifecycle. `Completed`, `Cancelled` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Cancelled | JobStatus::Failed
        )
    }
}

/// Outcome of copying one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableStatus {
    Completed,
    Failed,
    /// Copy stopped at a batch boundary; counts cover the committed batches.
    Cancelled,
}

/// Per-table counters.
///
/// Rows skipped as duplicates under `skip_existing_rows` count in neither
/// `rows_migrated` nor `errors`; they are reported in `rows_skipped`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableMigrationResult {
    pub table_name: String,
    pub rows_total: i64,
    pub rows_migrated: i64,
    pub rows_skipped: i64,
    pub errors: i64,
    pub status: TableStatus,
    pub failure_reason: Option<String>,
}

impl TableMigrationResult {
    /// Completed result with zero counters.
    pub fn new(table_name: impl Into<String>, rows_total: i64) -> Self {
        Self {
            table_name: table_name.into(),
            rows_total,
            rows_migrated: 0,
            rows_skipped: 0,
            errors: 0,
            status: TableStatus::Completed,
            failure_reason: None,
        }
    }

    /// Failed result for a table that never reached the copy phase.
    pub fn failed(table_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            status: TableStatus::Failed,
            failure_reason: Some(reason.into()),
            ..Self::new(table_name, 0)
        }
    }
}

/// Job-wide counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobTotals {
    pub tables_total: usize,
    pub tables_completed: usize,
    pub rows_total: i64,
    pub rows_migrated: i64,
    pub rows_skipped: i64,
    pub error_count: i64,
}

/// A migration job and its live status.
///
/// Connection settings never leave the process: they are skipped when the
/// job is serialized for status responses.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationJob {
    pub id: String,

    #[serde(skip)]
    pub source: SourceConfig,

    #[serde(skip)]
    pub target: TargetConfig,

    /// Requested tables; empty means every base table of the source schema.
    pub tables: Vec<String>,

    pub batch_size: usize,
    pub skip_existing_rows: bool,
    pub status: JobStatus,
    pub per_table_results: BTreeMap<String, TableMigrationResult>,
    pub totals: JobTotals,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,

    /// Table being copied right now.
    pub current_table: Option<String>,

    /// Job-level failure reason.
    pub error: Option<String>,
}

impl MigrationJob {
    /// New pending job with a fresh id.
    pub fn new(source: SourceConfig, target: TargetConfig) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            source,
            target,
            tables: Vec::new(),
            batch_size: DEFAULT_BATCH_SIZE,
            skip_existing_rows: false,
            status: JobStatus::Pending,
            per_table_results: BTreeMap::new(),
            totals: JobTotals::default(),
            started_at: None,
            ended_at: None,
            current_table: None,
            error: None,
        }
    }

    /// Set the requested tables. Repeats are dropped, first spelling wins.
    pub fn with_tables(mut self, tables: Vec<String>) -> Self {
        self.tables = unique_tables(tables);
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_skip_existing(mut self, skip: bool) -> Self {
        self.skip_existing_rows = skip;
        self
    }

    /// Record a finished table and fold its counters into the totals.
    pub fn record_table(&mut self, result: TableMigrationResult) {
        self.totals.rows_total += result.rows_total;
        self.totals.rows_migrated += result.rows_migrated;
        self.totals.rows_skipped += result.rows_skipped;
        self.totals.error_count += result.errors;
        match result.status {
            TableStatus::Completed => self.totals.tables_completed += 1,
            TableStatus::Failed => self.totals.error_count += 1,
            TableStatus::Cancelled => {}
        }
        self.per_table_results
            .insert(result.table_name.clone(), result);
    }

    /// Error a caller should surface for this job's final status, if any.
    ///
    /// Table failures do not make the job fail; only a cancelled or failed job
    /// maps to an error.
    pub fn outcome_error(&self) -> Option<MigrateError> {
        match self.status {
            JobStatus::Cancelled => Some(MigrateError::Cancelled),
            JobStatus::Failed => Some(MigrateError::JobFailed {
                id: self.id.clone(),
                reason: self
                    .error
                    .clone()
                    .unwrap_or_else(|| "unknown cause".to_string()),
            }),
            _ => None,
        }
    }

    /// Move to a terminal status and stamp `ended_at`.
    pub fn finish(&mut self, status: JobStatus) {
        self.status = status;
        self.current_table = None;
        self.ended_at = Some(Utc::now());
    }
}

/// Drop repeated table names, keeping order. Names that differ only by case are
/// the same table: both land in the same lower-cased target table.
pub(crate) fn unique_tables(tables: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    tables
        .into_iter()
        .filter(|t| seen.insert(t.to_lowercase()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{source_config, target_config};

    #[test]
    fn test_outcome_error_carries_job_failure_cause() {
        let mut job = MigrationJob::new(source_config(), target_config());
        job.record_table(TableMigrationResult::failed("Users", "boom"));
        job.finish(JobStatus::Completed);
        assert!(job.outcome_error().is_none());

        let mut job = MigrationJob::new(source_config(), target_config());
        job.error = Some("Source database error: The SELECT permission was denied".into());
        job.finish(JobStatus::Failed);
        let err = job.outcome_error().unwrap();
        assert!(matches!(err, MigrateError::JobFailed { .. }));
        assert!(err.to_string().contains("SELECT permission was denied"));
        assert_eq!(err.exit_code(), 5);

        job.status = JobStatus::Cancelled;
        assert!(matches!(job.outcome_error(), Some(MigrateError::Cancelled)));
    }

    #[test]
    fn test_with_tables_drops_repeats() {
        let job = MigrationJob::new(source_config(), target_config()).with_tables(vec![
            "Users".into(),
            "Messages".into(),
            "Users".into(),
            "users".into(),
        ]);
        assert_eq!(job.tables, vec!["Users", "Messages"]);
    }

    #[test]
    fn test_record_table_accumulates_totals() {
        let mut job = MigrationJob::new(source_config(), target_config());

        let mut users = TableMigrationResult::new("Users", 10);
        users.rows_migrated = 9;
        users.errors = 1;
        job.record_table(users);
        job.record_table(TableMigrationResult::failed("Photos", "describe failed"));

        assert_eq!(job.totals.rows_total, 10);
        assert_eq!(job.totals.rows_migrated, 9);
        assert_eq!(job.totals.tables_completed, 1);
        assert_eq!(job.totals.error_count, 2);
        assert_eq!(
            job.per_table_results["Photos"].failure_reason.as_deref(),
            Some("describe failed")
        );
    }

    #[test]
    fn test_serialized_job_hides_connections() {
        let job = MigrationJob::new(source_config(), target_config());
        let json = serde_json::to_value(&job).unwrap();

        assert_eq!(json["status"], "pending");
        assert_eq!(json["batchSize"], 1000);
        assert!(json.get("source").is_none());
        assert!(!json.to_string().contains("secret"));
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }
}
