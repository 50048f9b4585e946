//! MSSQL source database operations: schema introspection and paged reads.

mod types;

pub use types::*;

use crate::config::SourceConfig;
use crate::error::{MigrateError, Result};
use crate::identifier::{qualify_mssql, quote_mssql};
use crate::target::SqlValue;
use async_trait::async_trait;
use bb8::{Pool, PooledConnection};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use tiberius::{AuthMethod, Client, Config, EncryptionLevel, Query, Row};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, info};
use uuid::Uuid;

/// Source-side operations used by the migration engine.
///
/// `list_tables` and `describe_table` form the schema introspector; `row_count`
/// and `fetch_page` feed the batch copier.
#[async_trait]
pub trait SourcePool: Send + Sync {
    /// Base tables of the configured schema, alphabetically.
    async fn list_tables(&self) -> Result<Vec<String>>;

    /// Columns of one table in physical ordinal order.
    async fn describe_table(&self, table: &str) -> Result<TableSchema>;

    /// Exact number of rows in the table.
    async fn row_count(&self, table: &str) -> Result<i64>;

    /// Up to `limit` rows starting at `offset`, in the engine's natural order.
    /// Values are positional, matching `schema.columns`.
    async fn fetch_page(
        &self,
        schema: &TableSchema,
        offset: i64,
        limit: usize,
    ) -> Result<Vec<Vec<SqlValue>>>;

    /// Server version banner.
    async fn server_version(&self) -> Result<String>;

    /// Release the connection.
    async fn close(&self);
}

/// Types tiberius cannot decode; they are read as text.
const TEXT_CONVERTED_TYPES: &[&str] = &["xml", "sql_variant", "hierarchyid", "geography", "geometry"];

/// Connection manager for bb8 pool with tiberius.
#[derive(Clone)]
struct TiberiusConnectionManager {
    config: SourceConfig,
}

impl TiberiusConnectionManager {
    fn new(config: SourceConfig) -> Self {
        Self { config }
    }

    fn build_config(&self) -> Config {
        let mut config = Config::new();
        config.host(&self.config.host);
        config.port(self.config.port);
        config.database(&self.config.database);
        config.authentication(AuthMethod::sql_server(&self.config.user, &self.config.password));

        if self.config.encrypt {
            config.encryption(EncryptionLevel::Required);
        } else {
            config.encryption(EncryptionLevel::NotSupported);
        }
        if self.config.trust_server_cert {
            config.trust_cert();
        }

        config
    }
}

#[async_trait]
impl bb8::ManageConnection for TiberiusConnectionManager {
    type Connection = Client<Compat<TcpStream>>;
    type Error = tiberius::error::Error;

    async fn connect(&self) -> std::result::Result<Self::Connection, Self::Error> {
        let config = self.build_config();
        let tcp = TcpStream::connect(config.get_addr())
            .await
            .map_err(|e| tiberius::error::Error::Io {
                kind: e.kind(),
                message: e.to_string(),
            })?;

        tcp.set_nodelay(true).ok();

        Client::connect(config, tcp.compat_write()).await
    }

    async fn is_valid(&self, conn: &mut Self::Connection) -> std::result::Result<(), Self::Error> {
        conn.simple_query("SELECT 1").await?.into_row().await?;
        Ok(())
    }

    fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
        false
    }
}

/// MSSQL source backed by a single pooled connection.
pub struct MssqlPool {
    pool: Pool<TiberiusConnectionManager>,
    config: SourceConfig,
}

impl MssqlPool {
    /// Connect and verify the connection with `SELECT 1`.
    pub async fn connect(config: SourceConfig) -> Result<Self> {
        let manager = TiberiusConnectionManager::new(config.clone());
        let pool = Pool::builder()
            .max_size(1)
            .min_idle(Some(1))
            .build(manager)
            .await
            .map_err(|e| {
                MigrateError::Connectivity(format!(
                    "MSSQL {}:{}/{}: {}",
                    config.host, config.port, config.database, e
                ))
            })?;

        let source = Self { pool, config };
        {
            let mut conn = source.get_client().await?;
            conn.simple_query("SELECT 1").await?.into_row().await?;
        }

        info!(
            "Connected to MSSQL: {}:{}/{}",
            source.config.host, source.config.port, source.config.database
        );
        Ok(source)
    }

    async fn get_client(&self) -> Result<PooledConnection<'_, TiberiusConnectionManager>> {
        self.pool.get().await.map_err(|e| {
            MigrateError::pool(e.to_string(), format!("MSSQL connection to {}", self.config.host))
        })
    }

    fn qualified(&self, table: &str) -> Result<String> {
        qualify_mssql(&self.config.schema, table)
    }
}

#[async_trait]
impl SourcePool for MssqlPool {
    async fn list_tables(&self) -> Result<Vec<String>> {
        let mut client = self.get_client().await?;

        let mut query = Query::new(
            r#"
            SELECT TABLE_NAME
            FROM INFORMATION_SCHEMA.TABLES
            WHERE TABLE_TYPE = 'BASE TABLE'
              AND TABLE_SCHEMA = @P1
            ORDER BY TABLE_NAME
            "#,
        );
        query.bind(self.config.schema.as_str());

        let rows = query.query(&mut client).await?.into_first_result().await?;
        let mut tables = Vec::with_capacity(rows.len());
        for row in rows {
            if let Some(name) = row.try_get::<&str, _>(0)? {
                tables.push(name.to_string());
            }
        }

        info!("Found {} tables in schema '{}'", tables.len(), self.config.schema);
        Ok(tables)
    }

    async fn describe_table(&self, table: &str) -> Result<TableSchema> {
        let mut client = self.get_client().await?;

        let mut query = Query::new(
            r#"
            SELECT
                COLUMN_NAME,
                DATA_TYPE,
                CAST(CHARACTER_MAXIMUM_LENGTH AS INT),
                CAST(NUMERIC_PRECISION AS INT),
                CAST(NUMERIC_SCALE AS INT),
                IS_NULLABLE,
                COLUMN_DEFAULT
            FROM INFORMATION_SCHEMA.COLUMNS
            WHERE TABLE_SCHEMA = @P1 AND TABLE_NAME = @P2
            ORDER BY ORDINAL_POSITION
            "#,
        );
        query.bind(self.config.schema.as_str());
        query.bind(table);

        let rows = query.query(&mut client).await?.into_first_result().await?;

        let mut columns = Vec::with_capacity(rows.len());
        for row in rows {
            let name = row.try_get::<&str, _>(0)?.unwrap_or_default().to_string();
            let data_type = row.try_get::<&str, _>(1)?.unwrap_or_default();
            let max_length = row.try_get::<i32, _>(2)?;
            let precision = row.try_get::<i32, _>(3)?;
            let scale = row.try_get::<i32, _>(4)?;
            let nullable = row.try_get::<&str, _>(5)?.map(|v| v == "YES").unwrap_or(true);
            let default_expression = row.try_get::<&str, _>(6)?.map(String::from);

            columns.push(ColumnDescriptor {
                name,
                source_type: compose_source_type(data_type, max_length, precision, scale),
                nullable,
                default_expression,
                precision,
                scale,
            });
        }

        if columns.is_empty() {
            return Err(MigrateError::schema(
                table,
                format!("table not found in schema '{}'", self.config.schema),
            ));
        }

        debug!("Loaded {} columns for {}", columns.len(), table);
        Ok(TableSchema::new(table, columns))
    }

    async fn row_count(&self, table: &str) -> Result<i64> {
        let mut client = self.get_client().await?;

        let sql = format!("SELECT COUNT_BIG(*) FROM {}", self.qualified(table)?);
        let row = client.simple_query(sql).await?.into_row().await?;

        Ok(row
            .map(|r| r.try_get::<i64, _>(0))
            .transpose()?
            .flatten()
            .unwrap_or(0))
    }

    async fn fetch_page(
        &self,
        schema: &TableSchema,
        offset: i64,
        limit: usize,
    ) -> Result<Vec<Vec<SqlValue>>> {
        let sql = build_page_query(&self.config.schema, schema)?;
        let mut client = self.get_client().await?;

        let mut query = Query::new(sql);
        query.bind(offset);
        query.bind(limit as i64);

        let rows = query.query(&mut client).await?.into_first_result().await?;

        let base_types: Vec<String> = schema.columns.iter().map(|c| c.base_type()).collect();
        let mut page = Vec::with_capacity(rows.len());
        for row in rows {
            let mut values = Vec::with_capacity(base_types.len());
            for (idx, base) in base_types.iter().enumerate() {
                values.push(convert_row_value(&row, idx, base)?);
            }
            page.push(values);
        }

        Ok(page)
    }

    async fn server_version(&self) -> Result<String> {
        let mut client = self.get_client().await?;
        let row = client.simple_query("SELECT @@VERSION").await?.into_row().await?;
        Ok(row
            .and_then(|r| r.try_get::<&str, _>(0).ok().flatten().map(String::from))
            .unwrap_or_default())
    }

    async fn close(&self) {
        // Dropping the pool closes the connection; nothing to flush.
        debug!("Closing MSSQL source {}", self.config.host);
    }
}

/// Page query in natural order: no business key is imposed on OFFSET/FETCH.
fn build_page_query(source_schema: &str, schema: &TableSchema) -> Result<String> {
    let mut select = Vec::with_capacity(schema.columns.len());
    for col in &schema.columns {
        let quoted = quote_mssql(&col.name)?;
        if TEXT_CONVERTED_TYPES.contains(&col.base_type().as_str()) {
            select.push(format!("CONVERT(NVARCHAR(MAX), {0}) AS {0}", quoted));
        } else {
            select.push(quoted);
        }
    }

    Ok(format!(
        "SELECT {} FROM {} ORDER BY (SELECT NULL) OFFSET @P1 ROWS FETCH NEXT @P2 ROWS ONLY",
        select.join(", "),
        qualify_mssql(source_schema, &schema.table_name)?
    ))
}

/// Convert a row value to SqlValue based on the column's base type.
fn convert_row_value(row: &Row, idx: usize, base_type: &str) -> Result<SqlValue> {
    let value = match base_type {
        "bit" => row.try_get::<bool, _>(idx)?.into(),
        "tinyint" => row.try_get::<u8, _>(idx)?.map(i16::from).into(),
        "smallint" => row.try_get::<i16, _>(idx)?.into(),
        "int" => row.try_get::<i32, _>(idx)?.into(),
        "bigint" => row.try_get::<i64, _>(idx)?.into(),
        "real" => row.try_get::<f32, _>(idx)?.into(),
        "float" => row.try_get::<f64, _>(idx)?.into(),
        "decimal" | "numeric" => row.try_get::<Decimal, _>(idx)?.into(),
        // tiberius surfaces money as f64
        "money" | "smallmoney" => match row.try_get::<f64, _>(idx)? {
            Some(f) => Decimal::try_from(f)
                .map(|d| SqlValue::Decimal(d.round_dp(4)))
                .unwrap_or(SqlValue::F64(f)),
            None => SqlValue::Null,
        },
        "uniqueidentifier" => row.try_get::<Uuid, _>(idx)?.into(),
        "date" => row.try_get::<NaiveDate, _>(idx)?.into(),
        "time" => row.try_get::<NaiveTime, _>(idx)?.into(),
        "datetime" | "datetime2" | "smalldatetime" => row.try_get::<NaiveDateTime, _>(idx)?.into(),
        "datetimeoffset" => row.try_get::<DateTime<FixedOffset>, _>(idx)?.into(),
        "binary" | "varbinary" | "image" | "timestamp" | "rowversion" => row
            .try_get::<&[u8], _>(idx)?
            .map(|b| SqlValue::Bytes(b.to_vec()))
            .unwrap_or(SqlValue::Null),
        // varchar, nvarchar, char, nchar, text, ntext and text-converted types
        _ => row.try_get::<&str, _>(idx)?.into(),
    };
    Ok(value)
}
