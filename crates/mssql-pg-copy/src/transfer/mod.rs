//! Batch copier: moves one table's rows from source to target.
//!
//! Pages are read with OFFSET/FETCH in the source's natural order and written
//! one transaction per page. Batches are strictly sequential because the
//! offset is a running counter, not a stable cursor.
//!
//! Failure isolation:
//! - a rejected row is counted and skipped, the batch goes on;
//! - a failed commit, page read or transaction start stops this table only.

use crate::error::{MigrateError, Result, RowError};
use crate::source::{SourcePool, TableSchema};
use crate::state::{TableMigrationResult, TableStatus};
use crate::target::TargetPool;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

/// Per-copy settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyOptions {
    /// Rows per page and per transaction.
    pub batch_size: usize,

    /// Treat duplicate-key rows as already migrated instead of as errors.
    pub skip_existing: bool,
}

/// Receives the running result after each committed batch.
#[async_trait]
pub trait CopyProgress: Send + Sync {
    async fn batch_committed(&self, progress: &TableMigrationResult);
}

/// Progress sink that drops every update.
pub struct NoProgress;

#[async_trait]
impl CopyProgress for NoProgress {
    async fn batch_committed(&self, _progress: &TableMigrationResult) {}
}

#[derive(Debug, Default)]
struct BatchCounts {
    migrated: i64,
    skipped: i64,
    errors: i64,
}

/// Copies tables between one source and one target.
pub struct BatchCopier<'a> {
    source: &'a dyn SourcePool,
    target: &'a dyn TargetPool,
}

impl<'a> BatchCopier<'a> {
    pub fn new(source: &'a dyn SourcePool, target: &'a dyn TargetPool) -> Self {
        Self { source, target }
    }

    /// Copy every row of `schema`'s table.
    ///
    /// Never returns an error: failures are reported through the result's
    /// status and `failure_reason`. Cancellation is observed before each
    /// batch, so a batch in flight always commits or rolls back first.
    pub async fn copy_table(
        &self,
        schema: &TableSchema,
        options: &CopyOptions,
        cancel: &CancellationToken,
        progress: &dyn CopyProgress,
    ) -> TableMigrationResult {
        let span = info_span!("copy_table", table = %schema.table_name);
        self.copy_inner(schema, options, cancel, progress)
            .instrument(span)
            .await
    }

    async fn copy_inner(
        &self,
        schema: &TableSchema,
        options: &CopyOptions,
        cancel: &CancellationToken,
        progress: &dyn CopyProgress,
    ) -> TableMigrationResult {
        let table = &schema.table_name;

        let rows_total = match self.source.row_count(table).await {
            Ok(n) => n,
            Err(e) => {
                warn!("{}: row count failed: {}", table, e);
                return TableMigrationResult::failed(table, e.to_string());
            }
        };

        let mut result = TableMigrationResult::new(table, rows_total);
        if rows_total == 0 {
            info!("{}: empty table", table);
            return result;
        }

        let batch_size = options.batch_size.max(1);
        info!("{}: copying {} rows in batches of {}", table, rows_total, batch_size);

        let mut offset: i64 = 0;
        while offset < rows_total {
            if cancel.is_cancelled() {
                info!("{}: cancelled at offset {}", table, offset);
                result.status = TableStatus::Cancelled;
                return result;
            }

            let page = match self.source.fetch_page(schema, offset, batch_size).await {
                Ok(page) => page,
                Err(e) => return fail(result, e),
            };
            if page.is_empty() {
                break;
            }

            let counts = match self.write_batch(schema, &page, options).await {
                Ok(counts) => counts,
                Err(e) => return fail(result, e),
            };

            result.rows_migrated += counts.migrated;
            result.rows_skipped += counts.skipped;
            result.errors += counts.errors;
            debug!(
                "{}: batch at offset {} committed ({} migrated, {} skipped, {} errors)",
                table,
                offset,
                counts.migrated,
                counts.skipped,
                counts.errors
            );

            offset += batch_size as i64;
            progress.batch_committed(&result).await;
        }

        info!(
            "{}: done ({} migrated, {} skipped, {} errors of {})",
            table, result.rows_migrated, result.rows_skipped, result.errors, rows_total
        );
        result
    }

    /// Insert one page inside one transaction.
    async fn write_batch(
        &self,
        schema: &TableSchema,
        page: &[Vec<crate::target::SqlValue>],
        options: &CopyOptions,
    ) -> Result<BatchCounts> {
        let mut writer = self.target.begin_batch(schema).await?;
        let mut counts = BatchCounts::default();

        for row in page {
            match writer.insert_row(row).await {
                Ok(()) => counts.migrated += 1,
                Err(RowError::UniqueViolation(_)) if options.skip_existing => counts.skipped += 1,
                Err(e) => {
                    warn!("{}: {}", schema.table_name, e);
                    counts.errors += 1;
                }
            }
        }

        writer.commit().await?;
        Ok(counts)
    }
}

fn fail(mut result: TableMigrationResult, err: MigrateError) -> TableMigrationResult {
    warn!("{}: copy aborted: {}", result.table_name, err);
    result.status = TableStatus::Failed;
    result.failure_reason = Some(err.to_string());
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::ColumnDescriptor;
    use crate::target::SqlValue;
    use crate::testing::{MemorySource, MemoryTarget, RecordingProgress};

    fn schema(name: &str) -> TableSchema {
        TableSchema::new(
            name,
            vec![
                ColumnDescriptor::new("id", "int").not_null(),
                ColumnDescriptor::new("name", "nvarchar(50)"),
            ],
        )
    }

    fn rows(n: usize) -> Vec<Vec<SqlValue>> {
        (0..n)
            .map(|i| vec![SqlValue::I32(i as i32), SqlValue::from(format!("user{}", i))])
            .collect()
    }

    fn options(batch_size: usize, skip_existing: bool) -> CopyOptions {
        CopyOptions {
            batch_size,
            skip_existing,
        }
    }

    #[tokio::test]
    async fn test_batches_cover_every_row() {
        let source = MemorySource::new().with_table(schema("Users"), rows(2500));
        let target = MemoryTarget::new().with_existing_table("users");
        let copier = BatchCopier::new(&source, &target);

        let result = copier
            .copy_table(&schema("Users"), &options(1000, false), &CancellationToken::new(), &NoProgress)
            .await;

        assert_eq!(result.status, TableStatus::Completed);
        assert_eq!(result.rows_total, 2500);
        assert_eq!(result.rows_migrated, 2500);
        assert_eq!(target.batch_sizes(), vec![1000, 1000, 500]);
        assert_eq!(target.row_count("Users"), 2500);
    }

    #[tokio::test]
    async fn test_empty_table_opens_no_transaction() {
        let source = MemorySource::new().with_table(schema("Empty"), vec![]);
        let target = MemoryTarget::new().with_existing_table("users");

        let result = BatchCopier::new(&source, &target)
            .copy_table(&schema("Empty"), &options(1000, false), &CancellationToken::new(), &NoProgress)
            .await;

        assert_eq!(result, TableMigrationResult::new("Empty", 0));
        assert_eq!(target.begin_count(), 0);
        assert_eq!(source.fetch_count(), 0);
    }

    #[tokio::test]
    async fn test_bad_row_is_isolated() {
        let mut data = rows(10);
        data[4][1] = SqlValue::from("bad");
        let source = MemorySource::new().with_table(schema("Users"), data);
        let target = MemoryTarget::new().with_existing_table("users");

        let result = BatchCopier::new(&source, &target)
            .copy_table(&schema("Users"), &options(10, false), &CancellationToken::new(), &NoProgress)
            .await;

        assert_eq!(result.status, TableStatus::Completed);
        assert_eq!(result.rows_migrated, 9);
        assert_eq!(result.errors, 1);
        assert_eq!(target.begin_count(), 1);
    }

    #[tokio::test]
    async fn test_rerun_with_skip_existing() {
        let source = MemorySource::new().with_table(schema("Users"), rows(25));
        let target = MemoryTarget::new().with_existing_table("users");
        let copier = BatchCopier::new(&source, &target);
        let token = CancellationToken::new();

        let first = copier.copy_table(&schema("Users"), &options(10, true), &token, &NoProgress).await;
        let second = copier.copy_table(&schema("Users"), &options(10, true), &token, &NoProgress).await;

        assert_eq!(first.rows_migrated, 25);
        assert_eq!(second.status, TableStatus::Completed);
        assert_eq!(second.rows_migrated, 0);
        assert_eq!(second.errors, 0);
        assert_eq!(second.rows_skipped, 25);
        assert_eq!(target.row_count("Users"), 25);
    }

    #[tokio::test]
    async fn test_duplicates_are_errors_without_skip_existing() {
        let source = MemorySource::new().with_table(schema("Users"), rows(5));
        let target = MemoryTarget::new().with_existing_table("users");
        let copier = BatchCopier::new(&source, &target);
        let token = CancellationToken::new();

        copier.copy_table(&schema("Users"), &options(10, false), &token, &NoProgress).await;
        let second = copier.copy_table(&schema("Users"), &options(10, false), &token, &NoProgress).await;

        assert_eq!(second.rows_migrated, 0);
        assert_eq!(second.errors, 5);
        assert_eq!(second.rows_skipped, 0);
    }

    #[tokio::test]
    async fn test_commit_failure_fails_table() {
        let source = MemorySource::new().with_table(schema("Users"), rows(30));
        let target = MemoryTarget::new()
            .with_existing_table("users")
            .fail_commit_on_batch(2);

        let result = BatchCopier::new(&source, &target)
            .copy_table(&schema("Users"), &options(10, false), &CancellationToken::new(), &NoProgress)
            .await;

        assert_eq!(result.status, TableStatus::Failed);
        assert_eq!(result.rows_migrated, 10);
        assert!(result.failure_reason.unwrap().contains("commit"));
        assert_eq!(target.row_count("Users"), 10);
        assert_eq!(target.begin_count(), 2);
    }

    #[tokio::test]
    async fn test_cancellation_lets_current_batch_finish() {
        let token = CancellationToken::new();
        let source = MemorySource::new().with_table(schema("Users"), rows(50));
        let target = MemoryTarget::new()
            .with_existing_table("users")
            .cancel_after_rows(15, token.clone());

        let result = BatchCopier::new(&source, &target)
            .copy_table(&schema("Users"), &options(10, false), &token, &NoProgress)
            .await;

        // cancelled during the second batch, which still commits in full
        assert_eq!(result.status, TableStatus::Cancelled);
        assert_eq!(result.rows_migrated, 20);
        assert_eq!(target.begin_count(), 2);
    }

    #[tokio::test]
    async fn test_progress_reported_per_batch() {
        let source = MemorySource::new().with_table(schema("Users"), rows(25));
        let target = MemoryTarget::new().with_existing_table("users");
        let progress = RecordingProgress::default();

        BatchCopier::new(&source, &target)
            .copy_table(&schema("Users"), &options(10, false), &CancellationToken::new(), &progress)
            .await;

        assert_eq!(progress.migrated_snapshots(), vec![10, 20, 25]);
    }

    #[tokio::test]
    async fn test_batch_size_one() {
        let source = MemorySource::new().with_table(schema("Users"), rows(3));
        let target = MemoryTarget::new().with_existing_table("users");

        let result = BatchCopier::new(&source, &target)
            .copy_table(&schema("Users"), &options(1, false), &CancellationToken::new(), &NoProgress)
            .await;

        assert_eq!(result.rows_migrated, 3);
        assert_eq!(target.batch_sizes(), vec![1, 1, 1]);
    }

    #[tokio::test]
    async fn test_missing_target_table_fails_table() {
        let source = MemorySource::new().with_table(schema("Users"), rows(5));
        let target = MemoryTarget::new();

        let result = BatchCopier::new(&source, &target)
            .copy_table(&schema("Users"), &options(10, false), &CancellationToken::new(), &NoProgress)
            .await;

        assert_eq!(result.status, TableStatus::Failed);
        assert_eq!(result.rows_migrated, 0);
        assert!(result.failure_reason.unwrap().contains("does not exist"));
    }
}
