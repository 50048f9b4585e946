//! Identifier validation and quoting shared by every SQL builder in the crate.
//!
//! Table and column names cannot be bound as statement parameters, so they are
//! interpolated. Every interpolation goes through this module: the introspector
//! quotes with brackets for SQL Server, the provisioner and the batch writer
//! quote with double quotes for PostgreSQL. Row values are always bound.
//!
//! Target table names are folded to lower case; column names keep the source
//! spelling.

use crate::error::{MigrateError, Result};

/// Maximum identifier length accepted on either side.
/// SQL Server allows 128 characters, PostgreSQL truncates at 63 bytes.
const MAX_IDENTIFIER_LENGTH: usize = 128;

/// Reject empty identifiers, embedded null bytes and overlong names.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(MigrateError::Config("Identifier cannot be empty".to_string()));
    }

    if name.contains('\0') {
        return Err(MigrateError::Config(format!(
            "Identifier contains null byte: {:?}",
            name
        )));
    }

    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(MigrateError::Config(format!(
            "Identifier exceeds maximum length of {} bytes (got {} bytes): {:?}",
            MAX_IDENTIFIER_LENGTH,
            name.len(),
            name
        )));
    }

    Ok(())
}

/// Quote a PostgreSQL identifier, doubling embedded double quotes.
pub fn quote_pg(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}

/// Quote a SQL Server identifier with brackets, doubling closing brackets.
pub fn quote_mssql(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("[{}]", name.replace(']', "]]")))
}

/// Target-side name of a source table, folded to PostgreSQL's lower-case
/// convention. Existence checks, DDL and inserts all use this name.
pub fn target_table_name(source_table: &str) -> String {
    source_table.to_lowercase()
}

/// `"schema"."table"` for PostgreSQL.
pub fn qualify_pg(schema: &str, table: &str) -> Result<String> {
    Ok(format!("{}.{}", quote_pg(schema)?, quote_pg(table)?))
}

/// `[schema].[table]` for SQL Server.
pub fn qualify_mssql(schema: &str, table: &str) -> Result<String> {
    Ok(format!("{}.{}", quote_mssql(schema)?, quote_mssql(table)?))
}

/// Comma-separated quoted PostgreSQL column list, in the given order.
pub fn column_list_pg<'a, I>(columns: I) -> Result<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let quoted = columns
        .into_iter()
        .map(quote_pg)
        .collect::<Result<Vec<_>>>()?;
    Ok(quoted.join(", "))
}
