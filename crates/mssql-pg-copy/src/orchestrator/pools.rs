//! Connection factory for jobs.
//!
//! Every job connects its own source and target and releases them when it
//! ends. The HTTP layer and the tests swap the factory, not the pools.

use crate::config::{SourceConfig, TargetConfig};
use crate::error::Result;
use crate::source::{MssqlPool, SourcePool};
use crate::target::{PgPool, TargetPool};
use async_trait::async_trait;
use std::sync::Arc;

/// Opens source and target pools from connection settings.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn source(&self, config: &SourceConfig) -> Result<Arc<dyn SourcePool>>;
    async fn target(&self, config: &TargetConfig) -> Result<Arc<dyn TargetPool>>;
}

/// Connects to real MSSQL and PostgreSQL servers.
#[derive(Debug, Default, Clone, Copy)]
pub struct DatabaseConnector;

#[async_trait]
impl Connector for DatabaseConnector {
    async fn source(&self, config: &SourceConfig) -> Result<Arc<dyn SourcePool>> {
        let pool = MssqlPool::connect(config.clone()).await?;
        Ok(Arc::new(pool))
    }

    async fn target(&self, config: &TargetConfig) -> Result<Arc<dyn TargetPool>> {
        let pool = PgPool::connect(config.clone()).await?;
        Ok(Arc::new(pool))
    }
}
