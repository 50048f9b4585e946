//! In-memory source and target used by unit tests.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::config::{SourceConfig, TargetConfig};
use crate::error::{MigrateError, Result, RowError};
use crate::orchestrator::Connector;
use crate::source::{SourcePool, TableSchema};
use crate::state::TableMigrationResult;
use crate::identifier::target_table_name;
use crate::target::{insert_sql, BatchWriter, SqlValue, TargetPool};
use crate::transfer::CopyProgress;

pub fn source_config() -> SourceConfig {
    SourceConfig {
        host: "mssql.test".into(),
        port: 1433,
        database: "dating".into(),
        user: "sa".into(),
        password: "secret".into(),
        schema: "dbo".into(),
        encrypt: false,
        trust_server_cert: true,
    }
}

pub fn target_config() -> TargetConfig {
    TargetConfig {
        host: "pg.test".into(),
        port: 5432,
        database: "dating".into(),
        user: "postgres".into(),
        password: "secret".into(),
        schema: "public".into(),
        ssl: false,
        ssl_mode: None,
    }
}

/// Source tables held in memory, listed alphabetically.
#[derive(Default)]
pub struct MemorySource {
    tables: BTreeMap<String, (TableSchema, Vec<Vec<SqlValue>>)>,
    failing_describe: HashSet<String>,
    failing_list: bool,
    fetches: AtomicUsize,
    closes: AtomicUsize,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, schema: TableSchema, rows: Vec<Vec<SqlValue>>) -> Self {
        self.tables
            .insert(schema.table_name.clone(), (schema, rows));
        self
    }

    /// Make `describe_table` fail for `table`.
    pub fn fail_describe(mut self, table: &str) -> Self {
        self.failing_describe.insert(table.to_string());
        self
    }

    /// Make `list_tables` fail.
    pub fn fail_list_tables(mut self) -> Self {
        self.failing_list = true;
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    fn table(&self, name: &str) -> Result<&(TableSchema, Vec<Vec<SqlValue>>)> {
        self.tables
            .get(name)
            .ok_or_else(|| MigrateError::schema(name, "table not found in schema 'dbo'"))
    }
}

#[async_trait]
impl SourcePool for MemorySource {
    async fn list_tables(&self) -> Result<Vec<String>> {
        if self.failing_list {
            return Err(MigrateError::Connectivity("MSSQL connection reset".into()));
        }
        Ok(self.tables.keys().cloned().collect())
    }

    async fn describe_table(&self, table: &str) -> Result<TableSchema> {
        if self.failing_describe.contains(table) {
            return Err(MigrateError::schema(table, "permission denied"));
        }
        Ok(self.table(table)?.0.clone())
    }

    async fn row_count(&self, table: &str) -> Result<i64> {
        Ok(self.table(table)?.1.len() as i64)
    }

    async fn fetch_page(
        &self,
        schema: &TableSchema,
        offset: i64,
        limit: usize,
    ) -> Result<Vec<Vec<SqlValue>>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let rows = &self.table(&schema.table_name)?.1;
        Ok(rows
            .iter()
            .skip(offset as usize)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn server_version(&self) -> Result<String> {
        Ok("Microsoft SQL Server (memory)".to_string())
    }

    async fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct TargetState {
    /// Table names as the catalog stores them (case-sensitive).
    existing: HashSet<String>,
    ddl: Vec<String>,
    /// Committed rows and their key (column 0) per table.
    rows: HashMap<String, Vec<Vec<SqlValue>>>,
    keys: HashMap<String, HashSet<String>>,
    begins: usize,
    batch_sizes: Vec<usize>,
    rows_attempted: usize,
}

/// Target with a unique key on the first column of every table.
///
/// A string value `"bad"` is rejected like a malformed value. Batches for a
/// table the catalog does not hold fail like a missing relation.
#[derive(Default)]
pub struct MemoryTarget {
    state: Arc<Mutex<TargetState>>,
    fail_commit_on: Option<usize>,
    cancel_after: Option<(usize, CancellationToken)>,
    gate: Option<Arc<Semaphore>>,
    gate_arrivals: AtomicUsize,
    closes: AtomicUsize,
}

impl MemoryTarget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the commit of the `n`th batch (1-based) fail.
    pub fn fail_commit_on_batch(mut self, n: usize) -> Self {
        self.fail_commit_on = Some(n);
        self
    }

    /// Cancel `token` once `rows` inserts have been attempted.
    pub fn cancel_after_rows(mut self, rows: usize, token: CancellationToken) -> Self {
        self.cancel_after = Some((rows, token));
        self
    }

    /// Every batch waits for one permit of `gate` before it opens.
    pub fn with_gate(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Batches that have reached the gate, admitted or not.
    pub fn gate_arrivals(&self) -> usize {
        self.gate_arrivals.load(Ordering::SeqCst)
    }

    /// Register `table` in the catalog under exactly this name.
    pub fn add_existing_table(&self, table: &str) {
        self.lock().existing.insert(table.to_string());
    }

    pub fn with_existing_table(self, table: &str) -> Self {
        self.add_existing_table(table);
        self
    }

    pub fn ddl_statements(&self) -> Vec<String> {
        self.lock().ddl.clone()
    }

    pub fn begin_count(&self) -> usize {
        self.lock().begins
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.lock().batch_sizes.clone()
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.lock().rows.get(table).map(Vec::len).unwrap_or(0)
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TargetState> {
        self.state.lock().unwrap()
    }
}

#[async_trait]
impl TargetPool for MemoryTarget {
    async fn table_exists(&self, table: &str) -> Result<bool> {
        Ok(self.lock().existing.contains(&target_table_name(table)))
    }

    async fn execute_ddl(&self, sql: &str) -> Result<()> {
        let mut state = self.lock();
        // CREATE TABLE IF NOT EXISTS "schema"."table" (...)
        if let Some(table) = sql.split('"').nth(3) {
            state.existing.insert(table.to_string());
        }
        state.ddl.push(sql.to_string());
        Ok(())
    }

    async fn begin_batch(&self, schema: &TableSchema) -> Result<Box<dyn BatchWriter>> {
        if let Some(gate) = &self.gate {
            self.gate_arrivals.fetch_add(1, Ordering::SeqCst);
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        // INSERT INTO "schema"."table" (...)
        let sql = insert_sql(self.schema(), schema)?;
        let relation = sql.split('"').nth(3).unwrap_or_default().to_string();

        let batch_no = {
            let mut state = self.lock();
            state.begins += 1;
            if !state.existing.contains(&relation) {
                return Err(MigrateError::transaction(
                    &schema.table_name,
                    format!("relation \"public.{}\" does not exist", relation),
                ));
            }
            state.begins
        };
        Ok(Box::new(MemoryBatch {
            state: Arc::clone(&self.state),
            table: schema.table_name.clone(),
            pending: Vec::new(),
            pending_keys: HashSet::new(),
            attempted: 0,
            fail_commit: self.fail_commit_on == Some(batch_no),
            cancel_after: self.cancel_after.clone(),
        }))
    }

    fn schema(&self) -> &str {
        "public"
    }

    async fn server_version(&self) -> Result<String> {
        Ok("PostgreSQL 16 (memory)".to_string())
    }

    async fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

struct MemoryBatch {
    state: Arc<Mutex<TargetState>>,
    table: String,
    pending: Vec<Vec<SqlValue>>,
    pending_keys: HashSet<String>,
    attempted: usize,
    fail_commit: bool,
    cancel_after: Option<(usize, CancellationToken)>,
}

#[async_trait]
impl BatchWriter for MemoryBatch {
    async fn insert_row(&mut self, row: &[SqlValue]) -> std::result::Result<(), RowError> {
        self.attempted += 1;
        let mut state = self.state.lock().unwrap();
        state.rows_attempted += 1;
        if let Some((limit, token)) = &self.cancel_after {
            if state.rows_attempted >= *limit {
                token.cancel();
            }
        }

        if row.iter().any(|v| v == &SqlValue::from("bad")) {
            return Err(RowError::Rejected("invalid input syntax".into()));
        }

        let key = format!("{:?}", row.first());
        let committed = state
            .keys
            .get(&self.table)
            .map(|keys| keys.contains(&key))
            .unwrap_or(false);
        if committed || self.pending_keys.contains(&key) {
            return Err(RowError::UniqueViolation(format!("Key {} already exists", key)));
        }

        self.pending_keys.insert(key);
        self.pending.push(row.to_vec());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let MemoryBatch {
            state,
            table,
            pending,
            pending_keys,
            attempted,
            fail_commit,
            ..
        } = *self;

        let mut state = state.lock().unwrap();
        state.batch_sizes.push(attempted);
        if fail_commit {
            return Err(MigrateError::transaction(&table, "simulated commit failure"));
        }
        state.keys.entry(table.clone()).or_default().extend(pending_keys);
        state.rows.entry(table).or_default().extend(pending);
        Ok(())
    }
}

/// Records `rows_migrated` after every batch.
#[derive(Default)]
pub struct RecordingProgress {
    snapshots: Mutex<Vec<i64>>,
}

impl RecordingProgress {
    pub fn migrated_snapshots(&self) -> Vec<i64> {
        self.snapshots.lock().unwrap().clone()
    }
}

#[async_trait]
impl CopyProgress for RecordingProgress {
    async fn batch_committed(&self, progress: &TableMigrationResult) {
        self.snapshots.lock().unwrap().push(progress.rows_migrated);
    }
}

/// Hands out the same in-memory pools for every connection request.
pub struct MemoryConnector {
    pub source: Arc<MemorySource>,
    pub target: Arc<MemoryTarget>,
    pub source_down: bool,
}

impl MemoryConnector {
    pub fn new(source: MemorySource, target: MemoryTarget) -> Self {
        Self {
            source: Arc::new(source),
            target: Arc::new(target),
            source_down: false,
        }
    }

    /// Every source connection attempt fails.
    pub fn source_down(mut self) -> Self {
        self.source_down = true;
        self
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn source(&self, config: &SourceConfig) -> Result<Arc<dyn SourcePool>> {
        if self.source_down {
            return Err(MigrateError::Connectivity(format!(
                "MSSQL {}:{}/{}: connection refused",
                config.host, config.port, config.database
            )));
        }
        Ok(self.source.clone())
    }

    async fn target(&self, _config: &TargetConfig) -> Result<Arc<dyn TargetPool>> {
        Ok(self.target.clone())
    }
}
