//! Configuration loading and validation.
//!
//! Configuration comes from the environment (`Config::from_env`, with `.env`
//! support) or from a YAML file (`Config::load`). The HTTP API deserializes the
//! same `SourceConfig`/`TargetConfig` types from request bodies.

mod types;
mod validation;

pub use types::*;
pub use validation::{validate_options, validate_source, validate_target};

use crate::error::{MigrateError, Result};
use crate::target::tls::SslMode;
use std::path::Path;

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables, reading `.env` first if present.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &str| {
            get(key).ok_or_else(|| MigrateError::Config(format!("{} must be set", key)))
        };

        let source = SourceConfig {
            host: get("MSSQL_HOST")
                .or_else(|| get("MSSQL_SERVER"))
                .ok_or_else(|| MigrateError::Config("MSSQL_HOST must be set".into()))?,
            port: parse_port(get("MSSQL_PORT"), "MSSQL_PORT", default_mssql_port())?,
            database: required("MSSQL_DATABASE")?,
            user: required("MSSQL_USER")?,
            password: get("MSSQL_PASSWORD").unwrap_or_default(),
            schema: get("MSSQL_SCHEMA").unwrap_or_else(default_dbo_schema),
            encrypt: parse_flag(get("MSSQL_ENCRYPT"), true),
            trust_server_cert: parse_flag(get("MSSQL_TRUST_CERT"), false),
        };

        let target = TargetConfig {
            host: get("PG_HOST").unwrap_or_else(|| "localhost".to_string()),
            port: parse_port(get("PG_PORT"), "PG_PORT", default_pg_port())?,
            database: get("PG_DATABASE").unwrap_or_else(|| "postgres".to_string()),
            user: get("PG_USER").unwrap_or_else(|| "postgres".to_string()),
            password: get("PG_PASSWORD").unwrap_or_default(),
            schema: get("PG_SCHEMA").unwrap_or_else(default_public_schema),
            ssl: parse_flag(get("PG_SSL"), false),
            ssl_mode: get("PG_SSL_MODE"),
        };

        let batch_size = match get("MIGRATION_BATCH_SIZE") {
            Some(raw) => raw.trim().parse::<usize>().map_err(|_| {
                MigrateError::Config(format!("MIGRATION_BATCH_SIZE must be a number, got '{}'", raw))
            })?,
            None => default_batch_size(),
        };

        let migration = MigrationOptions {
            tables: get("MIGRATION_TABLES")
                .map(|raw| parse_table_list(&raw))
                .unwrap_or_default(),
            batch_size,
            skip_existing: parse_flag(get("MIGRATION_SKIP_EXISTING"), false),
        };

        let config = Config {
            source,
            target,
            migration,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }
}

impl TargetConfig {
    /// Effective SSL mode: an explicit `ssl_mode` wins, otherwise the `ssl` flag.
    pub fn effective_ssl_mode(&self) -> Result<SslMode> {
        match &self.ssl_mode {
            Some(mode) => SslMode::parse(mode),
            None if self.ssl => Ok(SslMode::Require),
            None => Ok(SslMode::Disable),
        }
    }
}

/// Split a comma-separated table list, dropping blanks.
pub fn parse_table_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect()
}

fn parse_flag(value: Option<String>, default: bool) -> bool {
    match value.as_deref().map(|v| v.trim().to_lowercase()) {
        Some(v) => matches!(v.as_str(), "true" | "yes" | "1" | "on"),
        None => default,
    }
}

fn parse_port(value: Option<String>, key: &str, default: u16) -> Result<u16> {
    match value {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| MigrateError::Config(format!("{} must be a valid port, got '{}'", key, raw))),
        None => Ok(default),
    }
}
