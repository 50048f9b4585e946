//! Human-readable job summary for the CLI.

use crate::state::{JobStatus, MigrationJob, TableStatus};
use std::fmt::Write;

/// Render the final summary: headline counts, then one line per table.
pub fn render_summary(job: &MigrationJob) -> String {
    let mut out = String::new();

    let headline = match job.status {
        JobStatus::Completed => "Migration completed",
        JobStatus::Cancelled => "Migration cancelled",
        JobStatus::Failed => "Migration failed",
        JobStatus::Pending | JobStatus::Running => "Migration in progress",
    };
    let _ = writeln!(out, "\n{}", headline);
    let _ = writeln!(out, "  Migration ID: {}", job.id);
    if let (Some(start), Some(end)) = (job.started_at, job.ended_at) {
        let secs = (end - start).num_milliseconds() as f64 / 1000.0;
        let _ = writeln!(out, "  Duration: {:.2}s", secs);
    }
    let _ = writeln!(
        out,
        "  Tables migrated: {}/{}",
        job.totals.tables_completed, job.totals.tables_total
    );
    let _ = writeln!(out, "  Total rows: {}", job.totals.rows_total);
    let _ = writeln!(out, "  Rows migrated: {}", job.totals.rows_migrated);
    if job.totals.rows_skipped > 0 {
        let _ = writeln!(out, "  Rows skipped (existing): {}", job.totals.rows_skipped);
    }
    let _ = writeln!(out, "  Total errors: {}", job.totals.error_count);
    if let Some(err) = &job.error {
        let _ = writeln!(out, "  Error: {}", err);
    }

    if job.per_table_results.is_empty() {
        return out;
    }

    let width = job
        .per_table_results
        .keys()
        .map(String::len)
        .max()
        .unwrap_or(0)
        .max("Table".len());

    let _ = writeln!(
        out,
        "\n  {:<width$}  {:>10}  {:>10}  {:>10}  {:>8}  Status",
        "Table",
        "Rows",
        "Migrated",
        "Skipped",
        "Errors",
        width = width
    );
    for result in job.per_table_results.values() {
        let status = match result.status {
            TableStatus::Completed => "completed".to_string(),
            TableStatus::Cancelled => "cancelled".to_string(),
            TableStatus::Failed => format!(
                "failed: {}",
                result.failure_reason.as_deref().unwrap_or("unknown error")
            ),
        };
        let _ = writeln!(
            out,
            "  {:<width$}  {:>10}  {:>10}  {:>10}  {:>8}  {}",
            result.table_name,
            result.rows_total,
            result.rows_migrated,
            result.rows_skipped,
            result.errors,
            status,
            width = width
        );
    }

    out
}
