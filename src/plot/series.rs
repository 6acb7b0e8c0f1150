//! Role: reshape aggregation rows into the chart-series contract the
//! frontend renders.
//!
//! - grouped and side-by-side rows become one point per group (or run)
//! - time-series rows become one series per run
//! - baseline flags and units are attached here

use crate::data::projection::{BucketPoint, GroupedRow, MetricPoint, SideBySideRow};
use crate::data::utils::compare_versions;
use itertools::Itertools;
use serde::Serialize;
use serde_json::{Map, Value};

/// Series colors, assigned by position.
pub const PALETTE: &[&str] = &[
    "#1f77b4", "#ff7f0e", "#2ca02c", "#d62728", "#9467bd", "#8c564b", "#e377c2", "#7f7f7f",
    "#bcbd22", "#17becf",
];

pub const ERRORS_SERIES: &str = "errors";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartSeriesPoint {
    pub group_key: String,
    pub value: f64,
    pub run_ids: Vec<String>,
    pub unit: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub cluster_version: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub is_baseline: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub has_different_cluster_version: bool,
    /// The point merges runs from more than one cluster version;
    /// `cluster_version` then shows the newest of them.
    #[serde(skip)]
    pub mixed_cluster_versions: bool,
}

impl ChartSeriesPoint {
    fn new(group_key: String, value: f64, run_ids: Vec<String>, unit: &str) -> Self {
        Self {
            group_key,
            value,
            run_ids,
            unit: unit.to_string(),
            cluster_version: String::new(),
            is_baseline: false,
            has_different_cluster_version: false,
            mixed_cluster_versions: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSeries {
    pub name: String,
    pub color: String,
    pub unit: String,
    pub points: Vec<ChartSeriesPoint>,
}

pub fn color_for(index: usize) -> &'static str {
    PALETTE[index % PALETTE.len()]
}

/// Unit shown for a bucket column or metric key.
pub fn unit_for(column: &str) -> &'static str {
    if column == ERRORS_SERIES {
        "errors"
    } else if column.ends_with("_us") {
        "μs"
    } else if column.starts_with("operations_") {
        "ops/sec"
    } else if column.to_ascii_lowercase().ends_with("cpu") || column.ends_with("Percent") {
        "%"
    } else if column.ends_with("MB") {
        "MB"
    } else {
        ""
    }
}

pub fn series(index: usize, name: &str, unit_column: &str, points: Vec<ChartSeriesPoint>) -> ChartSeries {
    ChartSeries {
        name: name.to_string(),
        color: color_for(index).to_string(),
        unit: unit_for(unit_column).to_string(),
        points,
    }
}

/// Stable sort by group key, version-aware.
fn sort_by_group(points: &mut [ChartSeriesPoint]) {
    points.sort_by(|a, b| compare_versions(&a.group_key, &b.group_key));
}

pub fn from_grouped(rows: Vec<GroupedRow>, column: &str) -> Vec<ChartSeriesPoint> {
    let unit = unit_for(column);
    let mut points: Vec<ChartSeriesPoint> = rows
        .into_iter()
        .map(|row| {
            let mut run_ids = row.run_ids;
            run_ids.sort();
            let mut versions = row.cluster_versions;
            versions.sort_by(|a, b| compare_versions(a, b));
            versions.dedup();
            let mut point = ChartSeriesPoint::new(row.group_key, row.value, run_ids, unit);
            point.mixed_cluster_versions = versions.len() > 1;
            point.cluster_version = versions.pop().unwrap_or_default();
            point
        })
        .collect();
    sort_by_group(&mut points);
    points
}

/// Runs keep their timestamp order within a group.
pub fn from_side_by_side(rows: Vec<SideBySideRow>, column: &str) -> Vec<ChartSeriesPoint> {
    let unit = unit_for(column);
    let mut points: Vec<ChartSeriesPoint> = rows
        .into_iter()
        .map(|row| {
            let mut point = ChartSeriesPoint::new(row.group_key, row.value, vec![row.run_id], unit);
            point.cluster_version = row.cluster_version;
            point
        })
        .collect();
    sort_by_group(&mut points);
    points
}

/// One list of time-offset points per run. `column` is a bucket column or
/// [`ERRORS_SERIES`].
pub fn bucket_time_series(rows: &[BucketPoint], column: &str) -> Vec<(String, Vec<ChartSeriesPoint>)> {
    let unit = unit_for(column);
    let per_run = rows
        .iter()
        .group_by(|row| row.run_id.clone())
        .into_iter()
        .map(|(run_id, group)| {
            let points = group
                .map(|row| {
                    let value = if column == ERRORS_SERIES {
                        row.error_count as f64
                    } else {
                        row.values.get(column).copied().unwrap_or(0.0)
                    };
                    ChartSeriesPoint::new(
                        row.time_offset_secs.to_string(),
                        value,
                        vec![row.run_id.clone()],
                        unit,
                    )
                })
                .collect();
            (run_id, points)
        })
        .collect();
    per_run
}

pub fn metric_time_series(rows: &[MetricPoint], metric: &str) -> Vec<(String, Vec<ChartSeriesPoint>)> {
    let unit = unit_for(metric);
    let per_run = rows
        .iter()
        .group_by(|row| row.run_id.clone())
        .into_iter()
        .map(|(run_id, group)| {
            let points = group
                .map(|row| {
                    ChartSeriesPoint::new(
                        row.time_offset_secs.to_string(),
                        row.value,
                        vec![row.run_id.clone()],
                        unit,
                    )
                })
                .collect();
            (run_id, points)
        })
        .collect();
    per_run
}

/// The cluster version points are compared against: the explicit one, else
/// the one pinned in the filter, else the most common among the points
/// (ties go to the newest version).
pub fn resolve_baseline(
    explicit: Option<&str>,
    database_compare: &Map<String, Value>,
    points: &[ChartSeriesPoint],
) -> Option<String> {
    if let Some(version) = explicit {
        return Some(version.to_string());
    }
    let pinned = database_compare
        .get("cluster")
        .and_then(|c| c.get("version"))
        .and_then(Value::as_str);
    if let Some(version) = pinned {
        return Some(version.to_string());
    }
    points
        .iter()
        .map(|p| p.cluster_version.as_str())
        .filter(|v| !v.is_empty())
        .counts()
        .into_iter()
        .max_by(|(va, ca), (vb, cb)| ca.cmp(cb).then_with(|| compare_versions(va, vb)))
        .map(|(version, _)| version.to_string())
}

/// Flag the baseline point(s) and every point whose cluster version differs.
/// A point spanning several cluster versions always differs.
pub fn apply_baseline(points: &mut [ChartSeriesPoint], baseline: Option<&str>) {
    let Some(baseline) = baseline else {
        return;
    };
    for point in points {
        point.is_baseline = !point.mixed_cluster_versions && point.cluster_version == baseline;
        point.has_different_cluster_version = !point.is_baseline;
    }
}
