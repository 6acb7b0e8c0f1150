//! Chart request validation.
//!
//! The raw request is inspected field by field and every problem is
//! collected, so callers get the complete list in one response.

use crate::data::utils::json_path;
use crate::error::ValidationError;
use crate::query::intent::ChartRequest;
use crate::query::merge::{resolve_merge_algorithm, MergeFunction};
use crate::query::synth::BucketColumn;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum MultipleResultsHandling {
    #[default]
    Merged,
    #[serde(rename = "Side-by-side")]
    SideBySide,
}

impl MultipleResultsHandling {
    fn parse(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().replace(['-', '_', ' '], "").as_str() {
            "merged" => Some(Self::Merged),
            "sidebyside" => Some(Self::SideBySide),
            _ => None,
        }
    }
}

/// How samples and runs are collapsed into chart values.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct InputSpec {
    pub merge: MergeFunction,
    /// Inclusive lower bound on `time_offset_secs`.
    pub trimming_seconds: f64,
    pub multiple_results: MultipleResultsHandling,
    /// Window width; values of 0 or 1 mean no windowing.
    pub bucketise_seconds: i64,
}

impl InputSpec {
    pub fn is_bucketised(&self) -> bool {
        self.bucketise_seconds > 1
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum YAxis {
    Buckets { column: BucketColumn },
    Metric { metric: String },
    Errors,
}

impl YAxis {
    /// Column or metric key this axis reads.
    pub fn column_name(&self) -> &str {
        match self {
            YAxis::Buckets { column } => column.as_str(),
            YAxis::Metric { metric } => metric,
            YAxis::Errors => BucketColumn::OperationsFailed.as_str(),
        }
    }
}

/// A validated `genGraph` request.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphInput {
    pub h_axis: String,
    pub y_axes: Vec<YAxis>,
    pub database_compare: Map<String, Value>,
    pub graph_type: String,
    pub spec: InputSpec,
    pub baseline_cluster_version: Option<String>,
}

impl GraphInput {
    /// The view of this request the intent classifier works on.
    pub fn chart_request(&self) -> ChartRequest {
        ChartRequest {
            workload: self.database_compare.get("workload").cloned(),
            vars: self
                .database_compare
                .get("vars")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default(),
            y_axes: self
                .y_axes
                .iter()
                .map(|axis| axis.column_name().to_string())
                .collect(),
        }
    }
}

/// Query for one run's full time series.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SingleRunRequest {
    pub run_id: Option<String>,
    pub trimming_seconds: Option<f64>,
    pub bucketise_seconds: Option<i64>,
    pub merging_type: Option<Value>,
}

impl SingleRunRequest {
    pub fn for_run(run_id: impl Into<String>) -> Self {
        Self {
            run_id: Some(run_id.into()),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(String, InputSpec), ValidationError> {
        let mut details = Vec::new();
        let run_id = self
            .run_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty());
        if run_id.is_none() {
            details.push("runId is required".to_string());
        }
        if self.bucketise_seconds.is_some_and(|b| b < 0) {
            details.push("bucketiseSeconds must not be negative".to_string());
        }
        match run_id {
            Some(run_id) if details.is_empty() => Ok((
                run_id.to_string(),
                InputSpec {
                    merge: resolve_merge_algorithm(self.merging_type.as_ref()),
                    trimming_seconds: self.trimming_seconds.unwrap_or(0.0),
                    multiple_results: MultipleResultsHandling::Merged,
                    bucketise_seconds: self.bucketise_seconds.unwrap_or(0),
                },
            )),
            _ => Err(ValidationError::new(details)),
        }
    }
}

/// A required, non-blank identifier from a path or query string.
pub fn require_id(value: &str, field: &str) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(ValidationError::single(format!("{field} is required")))
    } else {
        Ok(trimmed.to_string())
    }
}

fn non_blank<'a>(value: Option<&'a Value>) -> Option<&'a str> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn parse_y_axis(index: usize, axis: &Value, details: &mut Vec<String>) -> Option<YAxis> {
    let kind = axis.get("type").and_then(Value::as_str).unwrap_or_default();
    match kind {
        "buckets" => match non_blank(axis.get("databaseField")) {
            Some(field) => match BucketColumn::parse(field) {
                Some(column) => Some(YAxis::Buckets { column }),
                None => {
                    details.push(format!(
                        "yAxes[{index}].databaseField '{field}' is not a bucket column"
                    ));
                    None
                }
            },
            None => {
                details.push(format!("yAxes[{index}].databaseField is required"));
                None
            }
        },
        "metric" => match non_blank(axis.get("metric")) {
            Some(metric) if json_path(metric).is_some() => Some(YAxis::Metric {
                metric: metric.to_string(),
            }),
            Some(metric) => {
                details.push(format!("yAxes[{index}].metric '{metric}' is not a valid metric key"));
                None
            }
            None => {
                details.push(format!("yAxes[{index}].metric is required"));
                None
            }
        },
        "errors" => Some(YAxis::Errors),
        _ => {
            details.push(format!(
                "yAxes[{index}].type must be one of buckets, metric, errors"
            ));
            None
        }
    }
}

fn optional_number(value: Option<&Value>) -> Result<Option<f64>, ()> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n.as_f64().map(Some).ok_or(()),
        Some(_) => Err(()),
    }
}

/// Validate a raw chart request, reporting every violation together.
pub fn validate(raw: &Value) -> Result<GraphInput, ValidationError> {
    let Some(obj) = raw.as_object() else {
        return Err(ValidationError::single("request body must be a JSON object"));
    };
    let mut details = Vec::new();

    let h_axis = match non_blank(obj.get("hAxis").and_then(|h| h.get("databaseField"))) {
        Some(field) if json_path(field).is_some() => Some(field.to_string()),
        Some(field) => {
            details.push(format!("hAxis.databaseField '{field}' is not a valid field path"));
            None
        }
        None => {
            details.push("hAxis.databaseField is required".to_string());
            None
        }
    };

    let y_axes = match obj.get("yAxes").and_then(Value::as_array) {
        Some(axes) if !axes.is_empty() => axes
            .iter()
            .enumerate()
            .filter_map(|(i, axis)| parse_y_axis(i, axis, &mut details))
            .collect(),
        _ => {
            details.push("yAxes must contain at least one axis".to_string());
            Vec::new()
        }
    };

    let database_compare = match obj.get("databaseCompare") {
        Some(Value::Object(map)) => Some(map.clone()),
        _ => {
            details.push("databaseCompare is required".to_string());
            None
        }
    };

    let graph_type = non_blank(obj.get("graphType")).map(str::to_string);
    if graph_type.is_none() {
        details.push("graphType is required".to_string());
    }

    let trimming_seconds = match obj.get("trimmingSeconds") {
        Some(Value::Number(n)) => n.as_f64(),
        _ => None,
    };
    if trimming_seconds.is_none() {
        details.push("trimmingSeconds must be a number".to_string());
    }

    let bucketise_seconds = match optional_number(obj.get("bucketiseSeconds")) {
        Ok(Some(b)) if b.fract() != 0.0 || b < 0.0 => {
            details.push("bucketiseSeconds must be a whole, non-negative number".to_string());
            None
        }
        Ok(b) => b,
        Err(()) => {
            details.push("bucketiseSeconds must be a number".to_string());
            None
        }
    };

    let multiple_results = match obj.get("multipleResultsHandling") {
        None | Some(Value::Null) => Some(MultipleResultsHandling::default()),
        Some(Value::String(label)) => MultipleResultsHandling::parse(label),
        Some(_) => None,
    };
    if multiple_results.is_none() {
        details.push("multipleResultsHandling must be Merged or Side-by-side".to_string());
    }

    match (h_axis, database_compare, graph_type, trimming_seconds, multiple_results) {
        (Some(h_axis), Some(database_compare), Some(graph_type), Some(trimming), Some(multiple))
            if details.is_empty() =>
        {
            Ok(GraphInput {
                h_axis,
                y_axes,
                database_compare,
                graph_type,
                spec: InputSpec {
                    merge: resolve_merge_algorithm(obj.get("mergingType")),
                    trimming_seconds: trimming,
                    multiple_results: multiple,
                    bucketise_seconds: bucketise_seconds.map(|b| b as i64).unwrap_or(0),
                },
                baseline_cluster_version: non_blank(obj.get("baselineClusterVersion"))
                    .map(str::to_string),
            })
        }
        _ => Err(ValidationError::new(details)),
    }
}
