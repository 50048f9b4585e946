//! Configuration validation.

use super::{Config, MigrationOptions, SourceConfig, TargetConfig};
use crate::error::{MigrateError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    validate_source(&config.source)?;
    validate_target(&config.target)?;

    // Cannot migrate to the same database
    if config.source.host == config.target.host
        && config.source.port == config.target.port
        && config.source.database == config.target.database
    {
        return Err(MigrateError::Config(
            "source and target cannot be the same database".into(),
        ));
    }

    validate_options(&config.migration)
}

/// Validate the MSSQL connection settings.
pub fn validate_source(source: &SourceConfig) -> Result<()> {
    if source.host.is_empty() {
        return Err(MigrateError::Config("source.host is required".into()));
    }
    if source.database.is_empty() {
        return Err(MigrateError::Config("source.database is required".into()));
    }
    if source.user.is_empty() {
        return Err(MigrateError::Config("source.user is required".into()));
    }
    Ok(())
}

/// Validate the PostgreSQL connection settings.
pub fn validate_target(target: &TargetConfig) -> Result<()> {
    if target.host.is_empty() {
        return Err(MigrateError::Config("target.host is required".into()));
    }
    if target.database.is_empty() {
        return Err(MigrateError::Config("target.database is required".into()));
    }
    if target.user.is_empty() {
        return Err(MigrateError::Config("target.user is required".into()));
    }
    Ok(())
}

/// Validate batch settings.
pub fn validate_options(options: &MigrationOptions) -> Result<()> {
    if options.batch_size == 0 {
        return Err(MigrateError::Config(
            "migration.batch_size must be at least 1".into(),
        ));
    }
    Ok(())
}
