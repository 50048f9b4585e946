//! Configuration type definitions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Default number of rows per batch.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Source database configuration (MSSQL).
    pub source: SourceConfig,

    /// Target database configuration (PostgreSQL).
    pub target: TargetConfig,

    /// Migration behavior configuration.
    #[serde(default)]
    pub migration: MigrationOptions,
}

/// Source database (MSSQL) configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Database host.
    #[serde(alias = "server")]
    pub host: String,

    /// Database port (default: 1433).
    #[serde(default = "default_mssql_port")]
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// Source schema (default: "dbo").
    #[serde(default = "default_dbo_schema")]
    pub schema: String,

    /// Encrypt connection (default: true).
    #[serde(default = "default_true")]
    pub encrypt: bool,

    /// Trust server certificate (default: false).
    #[serde(default, alias = "trustServerCertificate", alias = "trust_server_certificate")]
    pub trust_server_cert: bool,
}

impl fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("schema", &self.schema)
            .field("encrypt", &self.encrypt)
            .field("trust_server_cert", &self.trust_server_cert)
            .finish()
    }
}

/// Target database (PostgreSQL) configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Database host.
    pub host: String,

    /// Database port (default: 5432).
    #[serde(default = "default_pg_port")]
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// Target schema (default: "public").
    #[serde(default = "default_public_schema")]
    pub schema: String,

    /// Use TLS (default: false). Means `require` unless `ssl_mode` says otherwise.
    #[serde(default)]
    pub ssl: bool,

    /// Explicit SSL mode: disable, require, verify-ca, verify-full.
    #[serde(default, alias = "sslMode", skip_serializing_if = "Option::is_none")]
    pub ssl_mode: Option<String>,
}

impl fmt::Debug for TargetConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("schema", &self.schema)
            .field("ssl", &self.ssl)
            .field("ssl_mode", &self.ssl_mode)
            .finish()
    }
}

/// What to migrate and how.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationOptions {
    /// Tables to copy. Empty means every base table in the source schema.
    #[serde(default)]
    pub tables: Vec<String>,

    /// Rows per batch (default: 1000).
    #[serde(default = "default_batch_size", alias = "batchSize")]
    pub batch_size: usize,

    /// Treat duplicate-key inserts as already migrated rows.
    #[serde(default, alias = "skipExisting", alias = "skip_existing_rows")]
    pub skip_existing: bool,
}

impl Default for MigrationOptions {
    fn default() -> Self {
        Self {
            tables: Vec::new(),
            batch_size: DEFAULT_BATCH_SIZE,
            skip_existing: false,
        }
    }
}

// Default value functions for serde
pub(crate) fn default_mssql_port() -> u16 {
    1433
}

pub(crate) fn default_pg_port() -> u16 {
    5432
}

pub(crate) fn default_dbo_schema() -> String {
    "dbo".to_string()
}

pub(crate) fn default_public_schema() -> String {
    "public".to_string()
}

pub(crate) fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_true() -> bool {
    true
}
