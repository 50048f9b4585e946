//! Error types for the migration library.

use thiserror::Error;

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (missing environment variables, invalid YAML, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Source database connection or query error
    #[error("Source database error: {0}")]
    Source(#[from] tiberius::error::Error),

    /// Target database connection or query error
    #[error("Target database error: {0}")]
    Target(#[from] tokio_postgres::Error),

    /// Connection pool error with context
    #[error("Pool error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

    /// Cannot reach one of the databases
    #[error("Connection failed: {0}")]
    Connectivity(String),

    /// Introspection or table creation failed for one table
    #[error("Schema error for table {table}: {message}")]
    Schema { table: String, message: String },

    /// A batch transaction could not be committed
    #[error("Transaction failed for table {table}: {message}")]
    Transaction { table: String, message: String },

    /// No job with this id is known to the job store
    #[error("Migration not found: {0}")]
    JobNotFound(String),

    /// The job stopped before any table ran, e.g. the source tables could not
    /// be listed. `reason` is the underlying error message.
    #[error("Migration {id} failed: {reason}")]
    JobFailed { id: String, reason: String },

    /// Illegal job state transition
    #[error("Invalid job state: {0}")]
    JobState(String),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Migration was cancelled (SIGINT, API request)
    #[error("Migration cancelled")]
    Cancelled,
}

impl MigrateError {
    /// Create a Pool error with context about where it occurred
    pub fn pool(message: impl Into<String>, context: impl Into<String>) -> Self {
        MigrateError::Pool {
            message: message.into(),
            context: context.into(),
        }
    }

    /// Create a Schema error
    pub fn schema(table: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Schema {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Create a Transaction error
    pub fn transaction(table: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Transaction {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Process exit code for the CLI.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_) | MigrateError::Yaml(_) => 1,
            MigrateError::Source(_)
            | MigrateError::Target(_)
            | MigrateError::Pool { .. }
            | MigrateError::Connectivity(_) => 2,
            MigrateError::Schema { .. } | MigrateError::Transaction { .. } => 3,
            MigrateError::JobFailed { .. } => 5,
            MigrateError::Io(_) => 7,
            MigrateError::Cancelled => 130,
            MigrateError::JobNotFound(_) | MigrateError::JobState(_) | MigrateError::Json(_) => 4,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;

/// Failure of a single row insert.
///
/// Kept apart from [`MigrateError`]: a row failure is counted by the copier,
/// never propagated.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RowError {
    /// The row collides with an existing unique key.
    #[error("duplicate key: {0}")]
    UniqueViolation(String),

    /// The target refused the row for any other reason.
    #[error("row rejected: {0}")]
    Rejected(String),
}
