//! Role: SQLite-backed `QueryExecutor`.
//!
//! Responsibilities:
//! - Connection pooling (r2d2), WAL mode for file databases
//! - Registering the `rarray` table-valued function on every connection
//! - Converting result rows into untyped JSON maps

use crate::config::{PoolConfig, DEFAULT_CONNECTION_TIMEOUT};
use crate::data::executor::{QueryExecutor, Row, SqlParam};
use crate::error::{DashboardError, Result};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection, ToSql};
use serde_json::{Number, Value};
use std::path::Path;
use std::rc::Rc;
use std::time::Duration;
use tracing::debug;

pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS runs (
    id TEXT PRIMARY KEY,
    datetime TEXT NOT NULL,
    params TEXT NOT NULL DEFAULT '{}'
);
CREATE TABLE IF NOT EXISTS buckets (
    run_id TEXT NOT NULL REFERENCES runs(id),
    time_offset_secs INTEGER NOT NULL,
    operations_total INTEGER,
    operations_success INTEGER,
    operations_failed INTEGER,
    duration_min_us INTEGER,
    duration_max_us INTEGER,
    duration_average_us REAL,
    duration_p50_us INTEGER,
    duration_p95_us INTEGER,
    duration_p99_us INTEGER,
    errors TEXT
);
CREATE INDEX IF NOT EXISTS buckets_run ON buckets(run_id, time_offset_secs);
CREATE TABLE IF NOT EXISTS metrics (
    run_id TEXT NOT NULL REFERENCES runs(id),
    time_offset_secs INTEGER NOT NULL,
    metrics TEXT NOT NULL DEFAULT '{}'
);
CREATE INDEX IF NOT EXISTS metrics_run ON metrics(run_id, time_offset_secs);
CREATE TABLE IF NOT EXISTS run_events (
    run_id TEXT NOT NULL REFERENCES runs(id),
    datetime_recorded TEXT NOT NULL,
    params TEXT NOT NULL DEFAULT '{}'
);
CREATE TABLE IF NOT EXISTS situational_runs (
    id TEXT PRIMARY KEY,
    datetime TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS situational_run_join (
    situational_id TEXT NOT NULL REFERENCES situational_runs(id),
    run_id TEXT NOT NULL REFERENCES runs(id)
);
";

/// Create the fixed schema. Ingestion owns it in production; this is for
/// local databases and tests.
pub fn create_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA)
}

fn init_connection(conn: &mut Connection, wal: bool) -> rusqlite::Result<()> {
    rusqlite::vtab::array::load_module(conn)?;
    if wal {
        let _mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    }
    Ok(())
}

#[derive(Clone)]
pub struct SqlitePool {
    pool: Pool<SqliteConnectionManager>,
}

impl SqlitePool {
    pub fn open(path: impl AsRef<Path>, config: &PoolConfig) -> Result<Self> {
        let manager = SqliteConnectionManager::file(path.as_ref())
            .with_init(|conn| init_connection(conn, true));
        let pool = Pool::builder()
            .max_size(config.max_size)
            .idle_timeout(Some(config.idle_timeout))
            .connection_timeout(config.connection_timeout)
            .build(manager)
            .map_err(|e| DashboardError::Pool(e.to_string()))?;
        Ok(Self { pool })
    }

    /// Single-connection pool over a private in-memory database, schema included.
    /// The connection is never recycled, so the data lives as long as the pool.
    pub fn in_memory() -> Result<Self> {
        Self::in_memory_with_checkout(DEFAULT_CONNECTION_TIMEOUT)
    }

    pub fn in_memory_with_checkout(connection_timeout: Duration) -> Result<Self> {
        let manager =
            SqliteConnectionManager::memory().with_init(|conn| init_connection(conn, false));
        let pool = Pool::builder()
            .max_size(1)
            .connection_timeout(connection_timeout)
            .min_idle(Some(1))
            .idle_timeout(None)
            .max_lifetime(None)
            .build(manager)
            .map_err(|e| DashboardError::Pool(e.to_string()))?;
        let this = Self { pool };
        create_schema(&*this.connection()?)
            .map_err(|e| DashboardError::query("create schema", e))?;
        Ok(this)
    }

    pub fn connection(&self) -> Result<PooledConnection<SqliteConnectionManager>> {
        self.pool
            .get()
            .map_err(|e| DashboardError::Pool(e.to_string()))
    }
}

fn bind(param: &SqlParam) -> Box<dyn ToSql> {
    match param {
        SqlParam::Text(s) => Box::new(s.clone()),
        SqlParam::Integer(i) => Box::new(*i),
        SqlParam::Real(f) => Box::new(*f),
        SqlParam::TextArray(values) => {
            let array: Rc<Vec<SqlValue>> =
                Rc::new(values.iter().cloned().map(SqlValue::Text).collect());
            Box::new(array)
        }
    }
}

fn to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        // No blob columns in the schema.
        ValueRef::Blob(_) => Value::Null,
    }
}

impl QueryExecutor for SqlitePool {
    fn execute(&self, sql: &str, params: &[SqlParam]) -> Result<Vec<Row>> {
        debug!(params = params.len(), sql = %sql.trim(), "executing query");
        let conn = self.connection()?;
        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| DashboardError::query("prepare", e))?;
        let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let bound: Vec<Box<dyn ToSql>> = params.iter().map(bind).collect();

        let mut rows = stmt
            .query(params_from_iter(bound.iter()))
            .map_err(|e| DashboardError::query("query", e))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(|e| DashboardError::query("step", e))? {
            let mut record = Row::new();
            for (i, name) in names.iter().enumerate() {
                let value = row
                    .get_ref(i)
                    .map_err(|e| DashboardError::query("read column", e))?;
                record.insert(name.clone(), to_json(value));
            }
            out.push(record);
        }
        Ok(out)
    }
}
