//! Classify a chart request into the kind of query it needs.
//!
//! Tie-break order, first match wins:
//! horizontal scaling, system metric, transaction, reactive API, KV operation.

use serde::Serialize;
use serde_json::{Map, Value};

pub const SYSTEM_METRICS: &[&str] = &["processCpu", "memHeapUsedMB", "threadCount"];
pub const DEFAULT_SYSTEM_METRIC: &str = "processCpu";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum QueryIntent {
    HorizontalScaling,
    SystemMetric { metric: String },
    Transaction { threads: u32 },
    #[serde(rename = "reactiveAPI")]
    ReactiveApi,
    KvOperation,
}

/// The parts of a chart request the classifier looks at.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChartRequest {
    pub workload: Option<Value>,
    pub vars: Map<String, Value>,
    /// Requested y-axis columns, bucket column or metric key.
    pub y_axes: Vec<String>,
}

fn is_set(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) | Some(Value::Bool(false)) => false,
        Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Some(Value::String(s)) => !s.is_empty(),
        Some(_) => true,
    }
}

fn thread_count(value: Option<&Value>) -> Option<u32> {
    match value? {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
    .filter(|n| *n > 0)
}

fn has_transaction_ops(workload: Option<&Value>) -> bool {
    workload
        .and_then(|w| w.get("operations"))
        .and_then(Value::as_array)
        .map(|ops| {
            ops.iter()
                .any(|op| op.get("transaction").and_then(|t| t.get("ops")).is_some())
        })
        .unwrap_or(false)
}

pub fn classify(request: &ChartRequest) -> QueryIntent {
    let vars = &request.vars;

    if vars.get("experimentName").and_then(Value::as_str) == Some("horizontalScaling")
        && is_set(vars.get("horizontalScaling"))
    {
        return QueryIntent::HorizontalScaling;
    }

    if let Some(metric) = request
        .y_axes
        .iter()
        .find(|column| SYSTEM_METRICS.contains(&column.as_str()))
    {
        return QueryIntent::SystemMetric {
            metric: metric.clone(),
        };
    }

    if has_transaction_ops(request.workload.as_ref())
        || request.y_axes.iter().any(|c| c == "operations_total")
    {
        return QueryIntent::Transaction {
            threads: thread_count(vars.get("horizontalScaling")).unwrap_or(1),
        };
    }

    if vars.get("api").and_then(Value::as_str) == Some("ASYNC") {
        return QueryIntent::ReactiveApi;
    }

    QueryIntent::KvOperation
}

/// Free-text fallback for requests that only carry a chart title.
pub fn classify_title(title: &str) -> QueryIntent {
    let lower = title.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();

    if lower.contains("horizontal") || lower.contains("scaling") {
        return QueryIntent::HorizontalScaling;
    }

    // Checked before the system-metric keywords so "4 threads" reads as a
    // transaction thread count rather than the threadCount metric.
    if lower.contains("transaction") {
        let threads = words
            .windows(2)
            .find(|pair| pair[1].starts_with("thread"))
            .and_then(|pair| pair[0].parse::<u32>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(1);
        return QueryIntent::Transaction { threads };
    }

    let metric = if lower.contains("cpu") {
        Some(DEFAULT_SYSTEM_METRIC)
    } else if lower.contains("memory") {
        Some("memHeapUsedMB")
    } else if lower.contains("thread") {
        Some("threadCount")
    } else {
        None
    };
    if let Some(metric) = metric {
        return QueryIntent::SystemMetric {
            metric: metric.to_string(),
        };
    }

    QueryIntent::KvOperation
}

pub fn classify_request(request: Option<&ChartRequest>, title: &str) -> QueryIntent {
    match request {
        Some(request) => classify(request),
        None => classify_title(title),
    }
}
