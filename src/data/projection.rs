//! Typed projection of untyped result rows.
//!
//! Rows leave the database as `serde_json` maps. Everything downstream reads
//! these structs instead, so the defaults for missing or malformed fields
//! live here and nowhere else:
//!
//! | kind | default |
//! |---|---|
//! | number | `0.0` / `0` |
//! | string | `""` (numbers and booleans are stringified) |
//! | JSON document column | empty object |
//! | JSON array of run ids | empty list |

use crate::data::executor::Row;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

fn text(row: &Row, key: &str) -> String {
    match row.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

fn number(row: &Row, key: &str) -> f64 {
    match row.get(key) {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

fn integer(row: &Row, key: &str) -> i64 {
    match row.get(key) {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

/// A JSON document stored as text (or already decoded).
fn document(row: &Row, key: &str) -> Map<String, Value> {
    match row.get(key) {
        Some(Value::Object(map)) => map.clone(),
        Some(Value::String(s)) => match serde_json::from_str(s) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        },
        _ => Map::new(),
    }
}

fn string_list(row: &Row, key: &str) -> Vec<String> {
    let parsed = match row.get(key) {
        Some(Value::Array(items)) => items.clone(),
        Some(Value::String(s)) => serde_json::from_str::<Vec<Value>>(s).unwrap_or_default(),
        _ => Vec::new(),
    };
    parsed
        .into_iter()
        .filter_map(|v| match v {
            Value::String(s) => Some(s),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .collect()
}

fn lookup<'a>(doc: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = doc.get(parts.next()?)?;
    for part in parts {
        current = current.get(part)?;
    }
    Some(current)
}

fn doc_text(doc: &Map<String, Value>, path: &str) -> String {
    match lookup(doc, path) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

/// One column of a result set as strings, nulls dropped.
pub fn strings(rows: &[Row], key: &str) -> Vec<String> {
    rows.iter()
        .filter(|row| row.get(key).is_some_and(|v| !v.is_null()))
        .map(|row| text(row, key))
        .collect()
}

/// Display metadata derived from a run's parameter document.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunParams {
    /// `impl.language`
    pub language: String,
    /// `impl.version`
    pub version: String,
    /// `cluster.version`
    pub cluster_version: String,
    /// `cluster.csp`
    pub csp: String,
    /// `cluster.type`
    pub environment: String,
}

impl RunParams {
    pub fn from_document(doc: &Map<String, Value>) -> Self {
        Self {
            language: doc_text(doc, "impl.language"),
            version: doc_text(doc, "impl.version"),
            cluster_version: doc_text(doc, "cluster.version"),
            csp: doc_text(doc, "cluster.csp"),
            environment: doc_text(doc, "cluster.type"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub id: String,
    pub datetime: String,
    #[serde(flatten)]
    pub display: RunParams,
    pub params: Map<String, Value>,
}

impl RunSummary {
    pub fn from_row(row: &Row) -> Self {
        let params = document(row, "params");
        Self {
            id: text(row, "id"),
            datetime: text(row, "datetime"),
            display: RunParams::from_document(&params),
            params,
        }
    }
}

/// One group of a merged grouped aggregation. `cluster_versions` holds every
/// distinct cluster version among the group's runs, unordered.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupedRow {
    pub group_key: String,
    pub value: f64,
    pub run_ids: Vec<String>,
    pub cluster_versions: Vec<String>,
}

impl GroupedRow {
    pub fn from_row(row: &Row) -> Self {
        Self {
            group_key: text(row, "group_key"),
            value: number(row, "value"),
            run_ids: string_list(row, "run_ids"),
            cluster_versions: string_list(row, "cluster_versions"),
        }
    }
}

/// One run of a side-by-side grouped aggregation.
#[derive(Debug, Clone, PartialEq)]
pub struct SideBySideRow {
    pub run_id: String,
    pub group_key: String,
    pub value: f64,
    pub cluster_version: String,
    pub datetime: String,
}

impl SideBySideRow {
    pub fn from_row(row: &Row) -> Self {
        Self {
            run_id: text(row, "run_id"),
            group_key: text(row, "group_key"),
            value: number(row, "value"),
            cluster_version: text(row, "cluster_version"),
            datetime: text(row, "datetime"),
        }
    }
}

/// A bucket time-series sample. `values` holds whichever bucket columns the
/// query selected; `metrics` is empty when no metric sample lined up.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketPoint {
    pub run_id: String,
    pub time_offset_secs: i64,
    pub values: BTreeMap<String, f64>,
    pub error_count: i64,
    pub metrics: Map<String, Value>,
}

impl BucketPoint {
    pub fn from_row(row: &Row, columns: &[&str]) -> Self {
        Self {
            run_id: text(row, "run_id"),
            time_offset_secs: integer(row, "time_offset_secs"),
            values: columns
                .iter()
                .map(|c| (c.to_string(), number(row, c)))
                .collect(),
            error_count: integer(row, "error_count"),
            metrics: document(row, "metrics"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricPoint {
    pub run_id: String,
    pub time_offset_secs: i64,
    pub value: f64,
}

impl MetricPoint {
    pub fn from_row(row: &Row) -> Self {
        Self {
            run_id: text(row, "run_id"),
            time_offset_secs: integer(row, "time_offset_secs"),
            value: number(row, "value"),
        }
    }
}

/// A full metric document at one offset.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSample {
    pub time_offset_secs: i64,
    pub metrics: Map<String, Value>,
}

impl MetricSample {
    pub fn from_row(row: &Row) -> Self {
        Self {
            time_offset_secs: integer(row, "time_offset_secs"),
            metrics: document(row, "metrics"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SituationalRunSummary {
    pub id: String,
    pub datetime: String,
    pub run_count: i64,
    pub score: f64,
    /// Taken from any one member run.
    #[serde(flatten)]
    pub display: RunParams,
}

impl SituationalRunSummary {
    pub fn from_row(row: &Row) -> Self {
        Self {
            id: text(row, "id"),
            datetime: text(row, "datetime"),
            run_count: integer(row, "run_count"),
            score: number(row, "score"),
            display: RunParams::from_document(&document(row, "any_run_params")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SituationalRunMember {
    pub run_id: String,
    pub datetime: String,
    pub score: f64,
    pub error_count: i64,
    #[serde(flatten)]
    pub display: RunParams,
}

impl SituationalRunMember {
    pub fn from_row(row: &Row) -> Self {
        Self {
            run_id: text(row, "run_id"),
            datetime: text(row, "datetime"),
            score: number(row, "score"),
            error_count: integer(row, "error_count"),
            display: RunParams::from_document(&document(row, "params")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorSummaryRow {
    pub error: String,
    pub count: i64,
}

impl ErrorSummaryRow {
    pub fn from_row(row: &Row) -> Self {
        Self {
            error: text(row, "error"),
            count: integer(row, "count"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunEvent {
    pub run_id: String,
    pub datetime_recorded: String,
    pub params: Map<String, Value>,
}

impl RunEvent {
    pub fn from_row(row: &Row) -> Self {
        Self {
            run_id: text(row, "run_id"),
            datetime_recorded: text(row, "datetime_recorded"),
            params: document(row, "params"),
        }
    }
}
