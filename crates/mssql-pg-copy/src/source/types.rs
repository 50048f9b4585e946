//! Schema metadata types.

use serde::{Deserialize, Serialize};

/// Column metadata as read from the source catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDescriptor {
    /// Column name.
    pub name: String,

    /// Engine-native type descriptor, e.g. `nvarchar(50)` or `decimal(18,2)`.
    pub source_type: String,

    /// Whether the column accepts NULL.
    pub nullable: bool,

    /// Default expression text, verbatim from the source catalog.
    pub default_expression: Option<String>,

    /// Numeric precision, when the catalog reports one.
    pub precision: Option<i32>,

    /// Numeric scale, when the catalog reports one.
    pub scale: Option<i32>,
}

impl ColumnDescriptor {
    /// Shorthand for a nullable column without default.
    pub fn new(name: impl Into<String>, source_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source_type: source_type.into(),
            nullable: true,
            default_expression: None,
            precision: None,
            scale: None,
        }
    }

    /// Mark the column NOT NULL.
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Attach a default expression.
    pub fn with_default(mut self, expr: impl Into<String>) -> Self {
        self.default_expression = Some(expr.into());
        self
    }

    /// Lower-cased type name without its length/precision arguments.
    pub fn base_type(&self) -> String {
        let lowered = self.source_type.trim().to_lowercase();
        match lowered.find('(') {
            Some(idx) => lowered[..idx].trim().to_string(),
            None => lowered,
        }
    }
}

/// A table and its columns in physical ordinal order.
///
/// Column order drives positional INSERT generation and must never be changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSchema {
    /// Table name as stored in the source.
    pub table_name: String,

    /// Columns ordered by ordinal position.
    pub columns: Vec<ColumnDescriptor>,
}

impl TableSchema {
    pub fn new(table_name: impl Into<String>, columns: Vec<ColumnDescriptor>) -> Self {
        Self {
            table_name: table_name.into(),
            columns,
        }
    }

    /// Column names in insert order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }
}

/// Compose the full type descriptor from catalog fields.
///
/// `max_length` of -1 is SQL Server's marker for `(max)`.
pub fn compose_source_type(
    data_type: &str,
    max_length: Option<i32>,
    precision: Option<i32>,
    scale: Option<i32>,
) -> String {
    let base = data_type.to_lowercase();
    match base.as_str() {
        "char" | "nchar" | "varchar" | "nvarchar" | "binary" | "varbinary" => match max_length {
            Some(-1) => format!("{}(max)", base),
            Some(len) if len > 0 => format!("{}({})", base, len),
            _ => base,
        },
        "decimal" | "numeric" => match (precision, scale) {
            (Some(p), Some(s)) => format!("{}({},{})", base, p, s),
            (Some(p), None) => format!("{}({})", base, p),
            _ => base,
        },
        _ => base,
    }
}
