//! Type mapping between MSSQL and PostgreSQL.
//!
//! [`map_type`] is total: anything it does not recognise becomes `TEXT`.

/// Target type for unrecognised or unbounded inputs.
pub const FALLBACK_TYPE: &str = "TEXT";

/// Length used for fixed-length character types declared without one.
const DEFAULT_CHAR_LENGTH: u32 = 255;

/// Map an MSSQL type descriptor such as `nvarchar(50)` or `decimal(18,2)`
/// to PostgreSQL type syntax.
pub fn map_type(source_type: &str) -> String {
    let lowered = source_type.trim().to_lowercase();
    let (base, args) = split_type(&lowered);

    match base {
        // Variable-length strings
        "varchar" | "nvarchar" => match args.first() {
            Some(&"max") | Some(&"-1") | None => FALLBACK_TYPE.to_string(),
            Some(len) => match len.parse::<u32>() {
                Ok(n) if n > 0 => format!("VARCHAR({})", n),
                _ => FALLBACK_TYPE.to_string(),
            },
        },

        // Fixed-length strings
        "char" | "nchar" => {
            let len = args
                .first()
                .and_then(|l| l.parse::<u32>().ok())
                .filter(|n| *n > 0)
                .unwrap_or(DEFAULT_CHAR_LENGTH);
            format!("CHAR({})", len)
        }

        // Exact numerics
        "decimal" | "numeric" => {
            let precision = args.first().and_then(|p| p.parse::<u32>().ok());
            let scale = args.get(1).and_then(|s| s.parse::<u32>().ok());
            match (precision, scale) {
                (Some(p), Some(s)) => format!("NUMERIC({},{})", p, s),
                (Some(p), None) => format!("NUMERIC({})", p),
                _ => "NUMERIC".to_string(),
            }
        }

        other => lookup(other).unwrap_or(FALLBACK_TYPE).to_string(),
    }
}

/// One-to-one mappings for types whose parameters do not matter.
fn lookup(base: &str) -> Option<&'static str> {
    let mapped = match base {
        // Integers
        "bigint" => "BIGINT",
        "int" | "integer" => "INTEGER",
        "smallint" => "SMALLINT",
        "tinyint" => "SMALLINT",

        // Boolean
        "bit" => "BOOLEAN",

        // Floating point
        "float" => "DOUBLE PRECISION",
        "real" => "REAL",

        // Monetary
        "money" => "DECIMAL(19,4)",
        "smallmoney" => "DECIMAL(10,4)",

        // Date/time
        "date" => "DATE",
        "time" => "TIME",
        "datetime" | "datetime2" | "smalldatetime" => "TIMESTAMP",
        "datetimeoffset" => "TIMESTAMPTZ",

        // GUID
        "uniqueidentifier" => "UUID",

        // Binary
        "binary" | "varbinary" | "image" | "timestamp" | "rowversion" => "BYTEA",

        // Large text
        "text" | "ntext" => "TEXT",

        _ => return None,
    };
    Some(mapped)
}

/// Split `name(a, b)` into `("name", ["a", "b"])`.
fn split_type(type_str: &str) -> (&str, Vec<&str>) {
    match type_str.find('(') {
        Some(open) => {
            let base = type_str[..open].trim();
            let inner = type_str[open + 1..].trim_end().trim_end_matches(')');
            let args = inner
                .split(',')
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .collect();
            (base, args)
        }
        None => (type_str, Vec::new()),
    }
}
