//! Role: read-only query façade behind every dashboard endpoint.
//!
//! Each operation validates its request, synthesizes SQL, runs it on the
//! blocking pool under the request timeout and reshapes the rows into a
//! chart-ready response. Independent queries are issued together and joined.

use crate::config::DashboardConfig;
use crate::data::executor::{QueryExecutor, Row, SqlQuery};
use crate::data::projection::{
    self, BucketPoint, ErrorSummaryRow, GroupedRow, MetricPoint, MetricSample, RunEvent,
    RunSummary, SideBySideRow, SituationalRunMember, SituationalRunSummary,
};
use crate::data::utils::{compare_versions, GROUP_BY_FIELDS};
use crate::error::{DashboardError, Result};
use crate::plot::series::{self, ChartSeries, ChartSeriesPoint, ERRORS_SERIES};
use crate::query::input::{
    self, require_id, GraphInput, InputSpec, MultipleResultsHandling, SingleRunRequest, YAxis,
};
use crate::query::intent::{classify, QueryIntent};
use crate::query::synth::{self, BucketColumn};
use futures::future::try_join_all;
use ordered_float::OrderedFloat;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphResponse {
    pub graph_type: String,
    pub intent: QueryIntent,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub baseline_cluster_version: Option<String>,
    pub run_count: usize,
    pub series: Vec<ChartSeries>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SingleRunResponse {
    pub run: RunSummary,
    pub buckets: Vec<BucketPoint>,
    pub metrics: Vec<MetricSample>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SituationalRunDetails {
    pub id: String,
    pub score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lowest_scoring_run: Option<String>,
    pub runs: Vec<SituationalRunMember>,
}

/// Per-axis query plus how to read its rows back.
struct AxisQuery {
    name: String,
    column: String,
    query: SqlQuery,
}

pub struct DashboardService {
    executor: Arc<dyn QueryExecutor>,
    config: DashboardConfig,
}

impl DashboardService {
    pub fn new(executor: Arc<dyn QueryExecutor>, config: DashboardConfig) -> Self {
        Self { executor, config }
    }

    pub fn config(&self) -> &DashboardConfig {
        &self.config
    }

    /// Run one query on the blocking pool, bounded by the request timeout.
    async fn fetch(&self, query: SqlQuery) -> Result<Vec<Row>> {
        let executor = Arc::clone(&self.executor);
        let timeout = self.config.request_timeout;
        let sql = query.sql.clone();
        let task = tokio::task::spawn_blocking(move || executor.run(&query));

        let result = match tokio::time::timeout(timeout, task).await {
            Err(_) => Err(DashboardError::Timeout(timeout)),
            Ok(Err(join)) => Err(DashboardError::query("blocking task", join)),
            Ok(Ok(result)) => result,
        };
        if let Err(err) = &result {
            error!(error = %err, sql = %sql.trim(), "dashboard query failed");
        }
        result
    }

    async fn matching_run_ids(&self, input: &GraphInput) -> Result<Vec<String>> {
        let rows = self
            .fetch(synth::matching_runs(&input.database_compare)?)
            .await?;
        Ok(projection::strings(&rows, "id"))
    }

    /// Distinct values of a run-parameter field, for axis selection.
    pub async fn get_filtered(&self, axis_field: &str) -> Result<Vec<String>> {
        let field = require_id(axis_field, "axisField")?;
        let rows = self.fetch(synth::distinct_values(&field)?).await?;
        let mut values = projection::strings(&rows, "value");
        values.sort_by(|a, b| compare_versions(a, b));
        Ok(values)
    }

    pub fn get_group_by(&self) -> Vec<String> {
        GROUP_BY_FIELDS.iter().map(|f| f.to_string()).collect()
    }

    pub async fn get_available_metrics(&self) -> Result<Vec<String>> {
        let rows = self.fetch(synth::metric_keys()).await?;
        Ok(projection::strings(&rows, "key"))
    }

    fn axis_query(run_ids: &[String], input: &GraphInput, axis: &YAxis) -> Result<AxisQuery> {
        let (name, column, query) = match axis {
            YAxis::Buckets { column } => (
                column.as_str().to_string(),
                column.as_str().to_string(),
                synth::grouped_bucket_aggregation(run_ids, &input.h_axis, &input.spec, *column)?,
            ),
            YAxis::Errors => (
                ERRORS_SERIES.to_string(),
                ERRORS_SERIES.to_string(),
                synth::grouped_bucket_aggregation(
                    run_ids,
                    &input.h_axis,
                    &input.spec,
                    BucketColumn::OperationsFailed,
                )?,
            ),
            YAxis::Metric { metric } => (
                metric.clone(),
                metric.clone(),
                synth::grouped_metric_aggregation(run_ids, metric, &input.spec)?,
            ),
        };
        Ok(AxisQuery {
            name,
            column,
            query,
        })
    }

    /// One grouped series per y-axis over the runs matching
    /// `databaseCompare`, with baseline annotations.
    pub async fn gen_graph(&self, raw: &Value) -> Result<GraphResponse> {
        let input = input::validate(raw)?;
        // Unsupported axis combinations fail before any query runs.
        for axis in &input.y_axes {
            if let YAxis::Metric { metric } = axis {
                synth::grouped_metric_aggregation(&[], metric, &input.spec)?;
            }
        }
        let intent = classify(&input.chart_request());
        let run_ids = self.matching_run_ids(&input).await?;
        info!(?intent, runs = run_ids.len(), axes = input.y_axes.len(), "generating graph");

        let axes = input
            .y_axes
            .iter()
            .map(|axis| Self::axis_query(&run_ids, &input, axis))
            .collect::<Result<Vec<_>>>()?;

        let results = if run_ids.is_empty() {
            warn!("no runs match the comparison filter");
            vec![Vec::new(); axes.len()]
        } else {
            try_join_all(axes.iter().map(|axis| self.fetch(axis.query.clone()))).await?
        };

        let mut per_axis: Vec<(AxisQuery, Vec<ChartSeriesPoint>)> = axes
            .into_iter()
            .zip(results)
            .map(|(axis, rows)| {
                let points = match input.spec.multiple_results {
                    MultipleResultsHandling::Merged => series::from_grouped(
                        rows.iter().map(GroupedRow::from_row).collect(),
                        &axis.column,
                    ),
                    MultipleResultsHandling::SideBySide => series::from_side_by_side(
                        rows.iter().map(SideBySideRow::from_row).collect(),
                        &axis.column,
                    ),
                };
                (axis, points)
            })
            .collect();

        let all_points: Vec<ChartSeriesPoint> = per_axis
            .iter()
            .flat_map(|(_, points)| points.iter().cloned())
            .collect();
        let baseline = series::resolve_baseline(
            input.baseline_cluster_version.as_deref(),
            &input.database_compare,
            &all_points,
        );
        for (_, points) in per_axis.iter_mut() {
            series::apply_baseline(points, baseline.as_deref());
        }

        Ok(GraphResponse {
            graph_type: input.graph_type.clone(),
            intent,
            baseline_cluster_version: baseline,
            run_count: run_ids.len(),
            series: per_axis
                .into_iter()
                .enumerate()
                .map(|(i, (axis, points))| series::series(i, &axis.name, &axis.column, points))
                .collect(),
        })
    }

    /// Per-run time series for each y-axis over the matching runs.
    pub async fn gen_time_series(&self, raw: &Value) -> Result<GraphResponse> {
        let input = input::validate(raw)?;
        let intent = classify(&input.chart_request());
        let run_ids = self.matching_run_ids(&input).await?;

        let queries = input
            .y_axes
            .iter()
            .map(|axis| match axis {
                YAxis::Buckets { column } => Ok(synth::raw_bucket_series(
                    &run_ids,
                    &input.spec,
                    &[*column],
                    false,
                )),
                YAxis::Errors => Ok(synth::raw_bucket_series(&run_ids, &input.spec, &[], false)),
                YAxis::Metric { metric } => synth::raw_metric_series(&run_ids, metric, &input.spec),
            })
            .collect::<Result<Vec<_>>>()?;
        let results = if run_ids.is_empty() {
            vec![Vec::new(); queries.len()]
        } else {
            try_join_all(queries.into_iter().map(|q| self.fetch(q))).await?
        };

        let mut out = Vec::new();
        for (axis, rows) in input.y_axes.iter().zip(results) {
            let per_run = match axis {
                YAxis::Buckets { column } => {
                    let points: Vec<BucketPoint> = rows
                        .iter()
                        .map(|r| BucketPoint::from_row(r, &[column.as_str()]))
                        .collect();
                    series::bucket_time_series(&points, column.as_str())
                }
                YAxis::Errors => {
                    let points: Vec<BucketPoint> =
                        rows.iter().map(|r| BucketPoint::from_row(r, &[])).collect();
                    series::bucket_time_series(&points, ERRORS_SERIES)
                }
                YAxis::Metric { metric } => {
                    let points: Vec<MetricPoint> = rows.iter().map(MetricPoint::from_row).collect();
                    series::metric_time_series(&points, metric)
                }
            };
            let column = match axis {
                YAxis::Errors => ERRORS_SERIES,
                other => other.column_name(),
            };
            for (run_id, points) in per_run {
                let name = format!("{run_id} {column}");
                out.push(series::series(out.len(), &name, column, points));
            }
        }

        Ok(GraphResponse {
            graph_type: input.graph_type,
            intent,
            baseline_cluster_version: None,
            run_count: run_ids.len(),
            series: out,
        })
    }

    /// Run metadata, bucket series (metrics merged in when unbucketised) and
    /// every metric sample for one run, fetched concurrently.
    pub async fn gen_single(&self, request: &SingleRunRequest) -> Result<SingleRunResponse> {
        let (run_id, spec) = request.validate()?;
        self.single_run(&run_id, &spec).await
    }

    async fn single_run(&self, run_id: &str, spec: &InputSpec) -> Result<SingleRunResponse> {
        let ids = vec![run_id.to_string()];
        let columns: Vec<&str> = BucketColumn::ALL.iter().map(|c| c.as_str()).collect();
        let (run_rows, bucket_rows, metric_rows) = tokio::join!(
            self.fetch(synth::run_by_id(run_id)),
            self.fetch(synth::raw_bucket_series(
                &ids,
                spec,
                &BucketColumn::ALL,
                !spec.is_bucketised()
            )),
            self.fetch(synth::metric_samples(run_id, spec.trimming_seconds)),
        );

        let run = run_rows?
            .first()
            .map(RunSummary::from_row)
            .ok_or_else(|| DashboardError::NotFound(format!("run '{run_id}'")))?;
        let buckets = bucket_rows?
            .iter()
            .map(|row| BucketPoint::from_row(row, &columns))
            .collect();
        // Missing metrics do not fail the run view.
        let metrics = match metric_rows {
            Ok(rows) => rows.iter().map(MetricSample::from_row).collect(),
            Err(err) if !err.is_pool_failure() => {
                warn!(run_id, error = %err, "metrics unavailable, returning buckets only");
                Vec::new()
            }
            Err(err) => return Err(err),
        };
        Ok(SingleRunResponse {
            run,
            buckets,
            metrics,
        })
    }

    pub async fn gen_situational_runs(&self) -> Result<Vec<SituationalRunSummary>> {
        let rows = self.fetch(synth::situational_runs()).await?;
        Ok(rows.iter().map(SituationalRunSummary::from_row).collect())
    }

    pub async fn gen_situational_run(&self, situational_id: &str) -> Result<SituationalRunDetails> {
        let id = require_id(situational_id, "situationalRunId")?;
        let rows = self.fetch(synth::situational_run_members(&id)).await?;
        if rows.is_empty() {
            return Err(DashboardError::NotFound(format!("situational run '{id}'")));
        }
        let runs: Vec<SituationalRunMember> =
            rows.iter().map(SituationalRunMember::from_row).collect();
        let score = runs.iter().map(|r| r.score).sum::<f64>() / runs.len() as f64;
        let lowest_scoring_run = runs
            .iter()
            .min_by_key(|r| OrderedFloat(r.score))
            .map(|r| r.run_id.clone());
        Ok(SituationalRunDetails {
            id,
            score,
            lowest_scoring_run,
            runs,
        })
    }

    /// Single-run view of a run, only if it belongs to the situational run.
    pub async fn gen_situational_run_run(
        &self,
        situational_id: &str,
        request: &SingleRunRequest,
    ) -> Result<SingleRunResponse> {
        let id = require_id(situational_id, "situationalRunId")?;
        let (run_id, spec) = request.validate()?;
        let membership = self
            .fetch(synth::situational_run_membership(&id, &run_id))
            .await?;
        if membership.is_empty() {
            return Err(DashboardError::NotFound(format!(
                "run '{run_id}' in situational run '{id}'"
            )));
        }
        self.single_run(&run_id, &spec).await
    }

    pub async fn gen_situational_run_errors(
        &self,
        situational_id: &str,
    ) -> Result<Vec<ErrorSummaryRow>> {
        let id = require_id(situational_id, "situationalRunId")?;
        let rows = self.fetch(synth::situational_run_errors(&id)).await?;
        Ok(rows.iter().map(ErrorSummaryRow::from_row).collect())
    }

    pub async fn gen_situational_run_events(&self, situational_id: &str) -> Result<Vec<RunEvent>> {
        let id = require_id(situational_id, "situationalRunId")?;
        let rows = self.fetch(synth::situational_run_events(&id)).await?;
        Ok(rows.iter().map(RunEvent::from_row).collect())
    }

    /// Error code totals across the runs a chart request matches.
    pub async fn gen_error_summary(&self, raw: &Value) -> Result<Vec<ErrorSummaryRow>> {
        let input = input::validate(raw)?;
        let run_ids = self.matching_run_ids(&input).await?;
        if run_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = self
            .fetch(synth::error_summary(&run_ids, input.spec.trimming_seconds))
            .await?;
        Ok(rows.iter().map(ErrorSummaryRow::from_row).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::executor::SqlParam;
    use crate::data::sqlite::SqlitePool;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const SEED: &str = r#"
        INSERT INTO runs (id, datetime, params) VALUES
          ('r1', '2024-01-01', '{"impl":{"language":"Java","version":"3.5.0"},"cluster":{"version":"7.6.0","type":"capella","csp":"aws"},"vars":{"api":"DEFAULT"}}'),
          ('r2', '2024-01-02', '{"impl":{"language":"Java","version":"3.5.0"},"cluster":{"version":"7.6.0"},"vars":{"api":"DEFAULT"}}'),
          ('r3', '2024-01-03', '{"impl":{"language":"Java","version":"3.6.0"},"cluster":{"version":"7.2.0"},"vars":{"api":"DEFAULT"}}'),
          ('g1', '2024-01-04', '{"impl":{"language":"Go","version":"1.0.0"},"cluster":{"version":"7.6.0"}}');
        INSERT INTO buckets (run_id, time_offset_secs, operations_total, operations_success, operations_failed, duration_average_us, errors) VALUES
          ('r1', 0, 100, 50, 50, 9999, '{"Timeout": 40}'),
          ('r1', 10, 100, 100, 0, 10, NULL),
          ('r1', 11, 100, 90, 10, 10, '{"Timeout": 10}'),
          ('r2', 10, 200, 200, 0, 20, NULL),
          ('r3', 10, 300, 300, 0, 30, '{"Ambiguous": "4"}'),
          ('g1', 10, 1, 1, 0, 1, NULL);
        INSERT INTO metrics (run_id, time_offset_secs, metrics) VALUES
          ('r1', 10, '{"processCpu": 20}'),
          ('r2', 11, '{"processCpu": 40}'),
          ('r3', 10, '{"processCpu": 60}');
        INSERT INTO run_events (run_id, datetime_recorded, params) VALUES
          ('r2', '2024-01-02T00:00:05', '{"type": "failover"}'),
          ('r1', '2024-01-01T00:00:05', '{"type": "rebalance"}');
        INSERT INTO situational_runs (id, datetime) VALUES ('s1', '2024-02-01'), ('s2', '2024-02-02');
        INSERT INTO situational_run_join (situational_id, run_id) VALUES ('s1', 'r1'), ('s1', 'r2');
    "#;

    fn seeded_pool() -> SqlitePool {
        let pool = SqlitePool::in_memory().unwrap();
        pool.connection().unwrap().execute_batch(SEED).unwrap();
        pool
    }

    fn service() -> DashboardService {
        DashboardService::new(Arc::new(seeded_pool()), DashboardConfig::default())
    }

    /// Seeded pool whose per-run metric query fails with the given error.
    struct FailingMetrics {
        pool: SqlitePool,
        pool_failure: bool,
    }

    impl QueryExecutor for FailingMetrics {
        fn execute(&self, sql: &str, params: &[SqlParam]) -> Result<Vec<Row>> {
            if !sql.trim_start().starts_with("SELECT time_offset_secs, metrics") {
                return self.pool.execute(sql, params);
            }
            if self.pool_failure {
                Err(DashboardError::Pool("connection reset".into()))
            } else {
                Err(DashboardError::query(
                    "metric samples",
                    anyhow::anyhow!("malformed JSON"),
                ))
            }
        }
    }

    fn graph_request() -> Value {
        json!({
            "hAxis": {"databaseField": "impl.version"},
            "yAxes": [
                {"type": "buckets", "databaseField": "duration_average_us"},
                {"type": "metric", "metric": "processCpu"}
            ],
            "databaseCompare": {"impl": {"language": "Java"}},
            "graphType": "Simplified",
            "trimmingSeconds": 10,
            "mergingType": "Average",
            "multipleResultsHandling": "Merged"
        })
    }

    #[tokio::test]
    async fn graph_has_one_series_per_axis_with_baseline_flags() {
        let response = service().gen_graph(&graph_request()).await.unwrap();
        assert_eq!(response.run_count, 3);
        assert_eq!(response.intent, QueryIntent::SystemMetric { metric: "processCpu".into() });
        assert_eq!(response.series.len(), 2);

        let latency = &response.series[0];
        assert_eq!(latency.name, "duration_average_us");
        assert_eq!(latency.unit, "μs");
        assert_ne!(latency.color, response.series[1].color);
        assert_eq!(latency.points[0].group_key, "3.5.0");
        assert_eq!(latency.points[0].value, 15.0);
        assert_eq!(latency.points[0].run_ids, vec!["r1", "r2"]);

        // 7.6.0 and 7.2.0 tie on count; the newer one wins
        assert_eq!(response.baseline_cluster_version.as_deref(), Some("7.6.0"));
        assert!(latency.points[0].is_baseline);
        assert!(!latency.points[0].has_different_cluster_version);
        assert!(latency.points[1].has_different_cluster_version);

        let cpu = &response.series[1];
        assert_eq!(cpu.unit, "%");
        assert_eq!(cpu.points[0].value, 30.0);
    }

    #[tokio::test]
    async fn explicit_baseline_wins() {
        let mut request = graph_request();
        request["baselineClusterVersion"] = json!("7.2.0");
        let response = service().gen_graph(&request).await.unwrap();
        let points = &response.series[0].points;
        assert!(points[1].is_baseline);
        assert!(points[0].has_different_cluster_version);
    }

    #[tokio::test]
    async fn side_by_side_metric_graph_is_rejected_before_querying() {
        struct Counting(AtomicUsize, SqlitePool);
        impl QueryExecutor for Counting {
            fn execute(&self, sql: &str, params: &[SqlParam]) -> Result<Vec<Row>> {
                self.0.fetch_add(1, Ordering::SeqCst);
                self.1.execute(sql, params)
            }
        }
        let pool = SqlitePool::in_memory().unwrap();
        let counting = Arc::new(Counting(AtomicUsize::new(0), pool));
        let service = DashboardService::new(counting.clone(), DashboardConfig::default());

        let mut request = graph_request();
        request["multipleResultsHandling"] = json!("Side-by-side");
        let err = service.gen_graph(&request).await.unwrap_err();
        assert!(matches!(err, DashboardError::Unsupported(_)));
        assert_eq!(counting.0.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn side_by_side_buckets_list_each_run() {
        let mut request = graph_request();
        request["yAxes"] = json!([{"type": "buckets", "databaseField": "operations_total"}]);
        request["multipleResultsHandling"] = json!("Side-by-side");
        request["mergingType"] = json!("Sum");
        let response = service().gen_graph(&request).await.unwrap();
        let points = &response.series[0].points;
        let runs: Vec<&str> = points.iter().map(|p| p.run_ids[0].as_str()).collect();
        assert_eq!(runs, vec!["r1", "r2", "r3"]);
        assert_eq!(points[0].value, 200.0);
        assert_eq!(response.intent, QueryIntent::Transaction { threads: 1 });
    }

    #[tokio::test]
    async fn invalid_graph_request_never_reaches_the_database() {
        let err = service()
            .gen_graph(&json!({"yAxes": [], "trimmingSeconds": "x"}))
            .await
            .unwrap_err();
        match err {
            DashboardError::Validation(v) => assert_eq!(v.details.len(), 5),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_match_gives_empty_series() {
        let mut request = graph_request();
        request["databaseCompare"] = json!({"impl": {"language": "Rust"}});
        let response = service().gen_graph(&request).await.unwrap();
        assert_eq!(response.run_count, 0);
        assert!(response.series.iter().all(|s| s.points.is_empty()));
    }

    #[tokio::test]
    async fn time_series_per_run() {
        let mut request = graph_request();
        request["yAxes"] = json!([{"type": "errors"}]);
        request["trimmingSeconds"] = json!(0);
        request["databaseCompare"] = json!({"impl": {"version": "3.5.0"}});
        let response = service().gen_time_series(&request).await.unwrap();
        assert_eq!(response.series.len(), 2);
        assert_eq!(response.series[0].name, "r1 errors");
        let r1: Vec<f64> = response.series[0].points.iter().map(|p| p.value).collect();
        assert_eq!(r1, vec![40.0, 0.0, 10.0]);
    }

    #[tokio::test]
    async fn filtered_values_group_by_and_metrics() {
        let service = service();
        assert_eq!(
            service.get_filtered("impl.language").await.unwrap(),
            vec!["Go", "Java"]
        );
        assert!(matches!(
            service.get_filtered("  ").await.unwrap_err(),
            DashboardError::Validation(_)
        ));
        assert!(service.get_group_by().contains(&"impl.version".to_string()));
        assert_eq!(service.get_available_metrics().await.unwrap(), vec!["processCpu"]);
    }

    #[tokio::test]
    async fn single_run_merges_buckets_and_metrics() {
        let service = service();
        let response = service
            .gen_single(&SingleRunRequest::for_run("r1"))
            .await
            .unwrap();
        assert_eq!(response.run.display.csp, "aws");
        assert_eq!(response.buckets.len(), 3);
        assert_eq!(response.buckets[1].metrics["processCpu"], 20);
        assert!(response.buckets[0].metrics.is_empty());
        assert_eq!(response.metrics.len(), 1);

        let err = service
            .gen_single(&SingleRunRequest::for_run("missing"))
            .await
            .unwrap_err();
        assert!(matches!(err, DashboardError::NotFound(_)));
    }

    #[tokio::test]
    async fn single_run_keeps_buckets_when_metrics_fail() {
        let executor = FailingMetrics {
            pool: seeded_pool(),
            pool_failure: false,
        };
        let service = DashboardService::new(Arc::new(executor), DashboardConfig::default());
        let response = service
            .gen_single(&SingleRunRequest::for_run("r1"))
            .await
            .unwrap();
        assert_eq!(response.run.id, "r1");
        assert_eq!(response.buckets.len(), 3);
        assert!(response.metrics.is_empty());
    }

    #[tokio::test]
    async fn single_run_propagates_pool_failure_from_metrics() {
        let executor = FailingMetrics {
            pool: seeded_pool(),
            pool_failure: true,
        };
        let service = DashboardService::new(Arc::new(executor), DashboardConfig::default());
        let err = service
            .gen_single(&SingleRunRequest::for_run("r1"))
            .await
            .unwrap_err();
        assert!(err.is_pool_failure());
    }

    #[tokio::test]
    async fn held_connection_surfaces_as_pool_error() {
        let pool = SqlitePool::in_memory_with_checkout(Duration::from_millis(50)).unwrap();
        let service = DashboardService::new(Arc::new(pool.clone()), DashboardConfig::default());
        let _held = pool.connection().unwrap();
        let err = service.get_available_metrics().await.unwrap_err();
        assert!(matches!(err, DashboardError::Pool(_)));
    }

    #[tokio::test]
    async fn single_run_bucketised() {
        let mut request = SingleRunRequest::for_run("r1");
        request.bucketise_seconds = Some(10);
        request.merging_type = Some(json!("Sum"));
        let response = service().gen_single(&request).await.unwrap();
        assert_eq!(response.buckets.len(), 2);
        assert_eq!(response.buckets[1].time_offset_secs, 10);
        assert_eq!(response.buckets[1].values["operations_total"], 200.0);
        assert_eq!(response.buckets[1].error_count, 10);
    }

    #[tokio::test]
    async fn situational_runs_are_scored() {
        let service = service();
        let list = service.gen_situational_runs().await.unwrap();
        assert_eq!(list.len(), 2);
        let s1 = list.iter().find(|s| s.id == "s1").unwrap();
        assert_eq!(s1.run_count, 2);
        assert_eq!(s1.display.language, "Java");
        // r1: 240/300 = 80%, r2: 100%
        assert!((s1.score - 90.0).abs() < 1e-9);

        let details = service.gen_situational_run("s1").await.unwrap();
        assert_eq!(details.runs.len(), 2);
        assert_eq!(details.lowest_scoring_run.as_deref(), Some("r1"));
        assert_eq!(details.runs[0].error_count, 50);

        assert!(matches!(
            service.gen_situational_run("s2").await.unwrap_err(),
            DashboardError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn situational_run_scoped_views() {
        let service = service();
        let run = service
            .gen_situational_run_run("s1", &SingleRunRequest::for_run("r2"))
            .await
            .unwrap();
        assert_eq!(run.run.id, "r2");
        assert!(matches!(
            service
                .gen_situational_run_run("s1", &SingleRunRequest::for_run("r3"))
                .await
                .unwrap_err(),
            DashboardError::NotFound(_)
        ));

        let errors = service.gen_situational_run_errors("s1").await.unwrap();
        assert_eq!(errors, vec![ErrorSummaryRow { error: "Timeout".into(), count: 50 }]);

        let events = service.gen_situational_run_events("s1").await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].run_id, "r1");
        assert_eq!(events[0].params["type"], "rebalance");
    }

    #[tokio::test]
    async fn error_summary_over_matching_runs() {
        let mut request = graph_request();
        request["trimmingSeconds"] = json!(10);
        let rows = service().gen_error_summary(&request).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], ErrorSummaryRow { error: "Timeout".into(), count: 10 });
        assert_eq!(rows[1], ErrorSummaryRow { error: "Ambiguous".into(), count: 4 });
    }

    #[tokio::test]
    async fn stalled_query_times_out() {
        struct Stalled;
        impl QueryExecutor for Stalled {
            fn execute(&self, _sql: &str, _params: &[SqlParam]) -> Result<Vec<Row>> {
                std::thread::sleep(Duration::from_millis(500));
                Ok(Vec::new())
            }
        }
        let config = DashboardConfig {
            request_timeout: Duration::from_millis(20),
            ..DashboardConfig::default()
        };
        let service = DashboardService::new(Arc::new(Stalled), config);
        let err = service.get_available_metrics().await.unwrap_err();
        assert!(matches!(err, DashboardError::Timeout(_)));
    }
}
