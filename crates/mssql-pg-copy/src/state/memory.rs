//! Process-local job store.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{JobStore, MigrationJob};
use crate::error::{MigrateError, Result};

/// Jobs kept in a map behind an async `RwLock`.
#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<String, MigrationJob>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored jobs.
    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn get(&self, id: &str) -> Result<Option<MigrationJob>> {
        Ok(self.jobs.read().await.get(id).cloned())
    }

    async fn set(&self, job: &MigrationJob) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        if let Some(existing) = jobs.get(&job.id) {
            if existing.status.is_terminal() {
                return Err(MigrateError::JobState(format!(
                    "job {} is already {:?}",
                    job.id, existing.status
                )));
            }
        }
        jobs.insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        Ok(self.jobs.write().await.remove(id).is_some())
    }
}
