use serde::Serialize;
use serde_json::Value;

/// Aggregate function applied when collapsing samples or runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeFunction {
    #[default]
    Avg,
    Max,
    Min,
    Sum,
}

impl MergeFunction {
    /// SQL aggregate name. These four are the only function names ever
    /// formatted into query text.
    pub fn sql(self) -> &'static str {
        match self {
            MergeFunction::Avg => "avg",
            MergeFunction::Max => "max",
            MergeFunction::Min => "min",
            MergeFunction::Sum => "sum",
        }
    }

    fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "average" | "avg" => Some(MergeFunction::Avg),
            "maximum" | "max" => Some(MergeFunction::Max),
            "minimum" | "min" => Some(MergeFunction::Min),
            "sum" => Some(MergeFunction::Sum),
            _ => None,
        }
    }

    /// Ordinal of the upstream enum: Average, Maximum, Minimum, Sum.
    fn from_ordinal(ordinal: i64) -> Option<Self> {
        match ordinal {
            0 => Some(MergeFunction::Avg),
            1 => Some(MergeFunction::Max),
            2 => Some(MergeFunction::Min),
            3 => Some(MergeFunction::Sum),
            _ => None,
        }
    }
}

/// Resolve a merge selection given either as its label or its enum ordinal.
/// Absent or unrecognised selections fall back to `avg`; this never fails.
pub fn resolve_merge_algorithm(selector: Option<&Value>) -> MergeFunction {
    let resolved = match selector {
        Some(Value::String(label)) => MergeFunction::from_label(label)
            .or_else(|| label.trim().parse().ok().and_then(MergeFunction::from_ordinal)),
        Some(Value::Number(n)) => n.as_i64().and_then(MergeFunction::from_ordinal),
        _ => None,
    };
    resolved.unwrap_or_default()
}
