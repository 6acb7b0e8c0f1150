//! The single capability the core needs from the database: run a
//! parameterized statement and hand back untyped rows.

use crate::error::Result;
use serde_json::{Map, Value};

/// One result row, column name to value.
pub type Row = Map<String, Value>;

/// A bound statement parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Text(String),
    Integer(i64),
    Real(f64),
    /// Bound as one array value (SQLite `rarray(?)`), never spliced into the text.
    TextArray(Vec<String>),
}

impl From<&str> for SqlParam {
    fn from(value: &str) -> Self {
        SqlParam::Text(value.to_string())
    }
}

impl From<String> for SqlParam {
    fn from(value: String) -> Self {
        SqlParam::Text(value)
    }
}

impl From<i64> for SqlParam {
    fn from(value: i64) -> Self {
        SqlParam::Integer(value)
    }
}

impl From<f64> for SqlParam {
    fn from(value: f64) -> Self {
        SqlParam::Real(value)
    }
}

impl From<Vec<String>> for SqlParam {
    fn from(value: Vec<String>) -> Self {
        SqlParam::TextArray(value)
    }
}

/// Synthesized SQL text plus its positional parameters (`?1`, `?2`, ...).
#[derive(Debug, Clone, PartialEq)]
pub struct SqlQuery {
    pub sql: String,
    pub params: Vec<SqlParam>,
}

impl SqlQuery {
    pub fn new(sql: impl Into<String>, params: Vec<SqlParam>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }
}

pub trait QueryExecutor: Send + Sync {
    fn execute(&self, sql: &str, params: &[SqlParam]) -> Result<Vec<Row>>;

    fn run(&self, query: &SqlQuery) -> Result<Vec<Row>> {
        self.execute(&query.sql, &query.params)
    }
}
