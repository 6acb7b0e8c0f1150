use perf_dashboard::query::input::SingleRunRequest;
use perf_dashboard::query::intent::ChartRequest;
use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilteredParams {
    pub axis_field: Option<String>,
}

/// Query string of the single-run views.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SingleRunParams {
    pub trimming_seconds: Option<f64>,
    pub bucketise_seconds: Option<i64>,
    pub merging_type: Option<String>,
}

impl SingleRunParams {
    pub fn for_run(self, run_id: String) -> SingleRunRequest {
        SingleRunRequest {
            run_id: Some(run_id),
            trimming_seconds: self.trimming_seconds,
            bucketise_seconds: self.bucketise_seconds,
            merging_type: self.merging_type.map(Value::String),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifyChart {
    pub workload: Option<Value>,
    #[serde(default)]
    pub vars: Map<String, Value>,
    #[serde(default)]
    pub y_axes: Vec<String>,
}

impl From<ClassifyChart> for ChartRequest {
    fn from(chart: ClassifyChart) -> Self {
        ChartRequest {
            workload: chart.workload,
            vars: chart.vars,
            y_axes: chart.y_axes,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ClassifyBody {
    pub request: Option<ClassifyChart>,
    #[serde(default)]
    pub title: String,
}
