//! Target table provisioning.
//!
//! Only column-level structure is reproduced: names, mapped types, NOT NULL and
//! defaults. An existing table is left untouched.

use crate::error::{MigrateError, Result};
use crate::identifier::{qualify_pg, quote_pg, target_table_name};
use crate::source::TableSchema;
use crate::target::TargetPool;
use crate::typemap::map_type;
use serde::Serialize;
use tracing::{debug, info};

/// Result of [`TableProvisioner::ensure_table`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProvisionOutcome {
    /// Whether the table was created by this call.
    pub created: bool,
}

/// Creates target tables that do not exist yet.
pub struct TableProvisioner<'a> {
    target: &'a dyn TargetPool,
}

impl<'a> TableProvisioner<'a> {
    pub fn new(target: &'a dyn TargetPool) -> Self {
        Self { target }
    }

    /// Create the target table for `schema` unless it already exists.
    pub async fn ensure_table(&self, schema: &TableSchema) -> Result<ProvisionOutcome> {
        let table = &schema.table_name;

        if self.target.table_exists(table).await? {
            debug!("Table {}.{} already exists", self.target.schema(), table);
            return Ok(ProvisionOutcome { created: false });
        }

        let ddl = create_table_sql(self.target.schema(), schema)?;
        self.target
            .execute_ddl(&ddl)
            .await
            .map_err(|e| MigrateError::schema(table, format!("CREATE TABLE failed: {}", e)))?;

        info!("Created table {}.{}", self.target.schema(), table);
        Ok(ProvisionOutcome { created: true })
    }
}

/// Generate `CREATE TABLE IF NOT EXISTS` for `schema` in `target_schema`.
///
/// Default expressions are copied verbatim; SQL Server syntax such as
/// `(getdate())` is not translated.
pub fn create_table_sql(target_schema: &str, schema: &TableSchema) -> Result<String> {
    if schema.columns.is_empty() {
        return Err(MigrateError::schema(&schema.table_name, "table has no columns"));
    }

    let mut columns = Vec::with_capacity(schema.columns.len());
    for col in &schema.columns {
        let mut def = format!("{} {}", quote_pg(&col.name)?, map_type(&col.source_type));
        if !col.nullable {
            def.push_str(" NOT NULL");
        }
        if let Some(expr) = &col.default_expression {
            def.push_str(" DEFAULT ");
            def.push_str(expr);
        }
        columns.push(def);
    }

    Ok(format!(
        "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
        qualify_pg(target_schema, &target_table_name(&schema.table_name))?,
        columns.join(",\n    ")
    ))
}
