//! Job store trait.
//!
//! The orchestrator holds an `Arc<dyn JobStore>` and never knows where jobs
//! live. [`InMemoryJobStore`](super::InMemoryJobStore) is the only
//! implementation; job history is lost on restart.

use async_trait::async_trait;

use super::MigrationJob;
use crate::error::Result;

/// Storage for migration job snapshots.
///
/// Implementations must be `Send + Sync`: the orchestrator task writes while
/// HTTP handlers read.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Snapshot of the job, or `None` if the id is unknown.
    async fn get(&self, id: &str) -> Result<Option<MigrationJob>>;

    /// Insert or replace a job.
    ///
    /// Replacing a job that already reached a terminal status is a
    /// [`JobState`](crate::error::MigrateError::JobState) error.
    async fn set(&self, job: &MigrationJob) -> Result<()>;

    /// Remove a job. Returns whether it existed.
    async fn delete(&self, id: &str) -> Result<bool>;
}
