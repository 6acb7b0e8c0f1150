//! SQL synthesis for chart queries.
//!
//! Query text only ever contains fixed SQL, aggregate names from
//! [`MergeFunction::sql`] and column names from [`BucketColumn`]. Run ids,
//! JSON paths, offsets and window widths are bound parameters; run-id lists
//! bind as a single array through `rarray(?)`.

use crate::data::executor::{SqlParam, SqlQuery};
use crate::data::utils::{json_path, SDK_VERSION_FIELD};
use crate::error::{DashboardError, Result, ValidationError};
use crate::query::input::{InputSpec, MultipleResultsHandling};
use serde_json::{Map, Value};

/// Allow-listed bucket columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BucketColumn {
    OperationsTotal,
    OperationsSuccess,
    OperationsFailed,
    DurationMinUs,
    DurationMaxUs,
    DurationAverageUs,
    DurationP50Us,
    DurationP95Us,
    DurationP99Us,
}

impl BucketColumn {
    pub const ALL: [BucketColumn; 9] = [
        BucketColumn::OperationsTotal,
        BucketColumn::OperationsSuccess,
        BucketColumn::OperationsFailed,
        BucketColumn::DurationMinUs,
        BucketColumn::DurationMaxUs,
        BucketColumn::DurationAverageUs,
        BucketColumn::DurationP50Us,
        BucketColumn::DurationP95Us,
        BucketColumn::DurationP99Us,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            BucketColumn::OperationsTotal => "operations_total",
            BucketColumn::OperationsSuccess => "operations_success",
            BucketColumn::OperationsFailed => "operations_failed",
            BucketColumn::DurationMinUs => "duration_min_us",
            BucketColumn::DurationMaxUs => "duration_max_us",
            BucketColumn::DurationAverageUs => "duration_average_us",
            BucketColumn::DurationP50Us => "duration_p50_us",
            BucketColumn::DurationP95Us => "duration_p95_us",
            BucketColumn::DurationP99Us => "duration_p99_us",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == name)
    }
}

const CLUSTER_VERSION_PATH: &str = "'$.cluster.version'";

/// Errors in one bucket row (alias `b`): sum of map values that are integers
/// or strings of digits. Anything else counts as zero.
const ERROR_COUNT: &str = "(SELECT coalesce(sum(CASE
        WHEN e.type = 'integer' THEN e.value
        WHEN e.type = 'text' AND e.value <> '' AND e.value NOT GLOB '*[^0-9]*' THEN CAST(e.value AS INTEGER)
        ELSE 0 END), 0)
     FROM json_each(CASE WHEN json_valid(b.errors) THEN b.errors ELSE '{}' END) e)";

fn field_path(field: &str, label: &str) -> Result<String> {
    json_path(field).ok_or_else(|| {
        ValidationError::single(format!("{label} '{field}' is not a valid field path")).into()
    })
}

fn metric_path(metric: &str) -> Result<String> {
    field_path(metric, "metric")
}

fn run_ids_param(run_ids: &[String]) -> SqlParam {
    SqlParam::TextArray(run_ids.to_vec())
}

/// Average (or other merge) of a bucket column per group of runs.
///
/// Merged: each run is reduced with the merge function first, then the runs
/// of a group are averaged, so every run weighs the same regardless of how
/// many buckets it has. Side-by-side: one row per run, ordered by group and
/// run timestamp.
pub fn grouped_bucket_aggregation(
    run_ids: &[String],
    group_by: &str,
    spec: &InputSpec,
    column: BucketColumn,
) -> Result<SqlQuery> {
    let group_path = field_path(group_by, "hAxis.databaseField")?;
    let merge = spec.merge.sql();
    let col = column.as_str();
    let params = vec![
        run_ids_param(run_ids),
        SqlParam::Real(spec.trimming_seconds),
        SqlParam::Text(group_path),
    ];

    let sql = match spec.multiple_results {
        MultipleResultsHandling::Merged => format!(
            "WITH per_run AS (
                SELECT b.run_id AS run_id, {merge}(b.{col}) AS value
                FROM buckets b
                WHERE b.run_id IN rarray(?1) AND b.time_offset_secs >= ?2
                GROUP BY b.run_id
            )
            SELECT json_group_array(p.run_id) AS run_ids,
                   avg(p.value) AS value,
                   json_extract(r.params, ?3) AS group_key,
                   json_group_array(DISTINCT json_extract(r.params, {CLUSTER_VERSION_PATH})) AS cluster_versions
            FROM per_run p
            JOIN runs r ON r.id = p.run_id
            GROUP BY json_extract(r.params, ?3)
            ORDER BY group_key"
        ),
        MultipleResultsHandling::SideBySide => format!(
            "SELECT b.run_id AS run_id,
                    {merge}(b.{col}) AS value,
                    json_extract(r.params, ?3) AS group_key,
                    json_extract(r.params, {CLUSTER_VERSION_PATH}) AS cluster_version,
                    r.datetime AS datetime
            FROM buckets b
            JOIN runs r ON r.id = b.run_id
            WHERE b.run_id IN rarray(?1) AND b.time_offset_secs >= ?2
            GROUP BY b.run_id
            ORDER BY group_key, r.datetime"
        ),
    };
    Ok(SqlQuery::new(sql, params))
}

/// Merge of one metric key per SDK version. Side-by-side is not supported
/// for metrics and fails before any SQL is produced.
pub fn grouped_metric_aggregation(
    run_ids: &[String],
    metric: &str,
    spec: &InputSpec,
) -> Result<SqlQuery> {
    if spec.multiple_results == MultipleResultsHandling::SideBySide {
        return Err(DashboardError::Unsupported(format!(
            "side-by-side results are not supported for metric '{metric}'"
        )));
    }
    let metric_path = metric_path(metric)?;
    let group_path = field_path(SDK_VERSION_FIELD, "group")?;
    let merge = spec.merge.sql();

    let sql = format!(
        "SELECT json_extract(r.params, ?4) AS group_key,
                {merge}(CAST(json_extract(m.metrics, ?2) AS REAL)) AS value,
                json_group_array(DISTINCT m.run_id) AS run_ids,
                json_group_array(DISTINCT json_extract(r.params, {CLUSTER_VERSION_PATH})) AS cluster_versions
        FROM metrics m
        JOIN runs r ON r.id = m.run_id
        WHERE m.run_id IN rarray(?1)
          AND m.time_offset_secs >= ?3
          AND json_extract(m.metrics, ?2) IS NOT NULL
        GROUP BY json_extract(r.params, ?4)
        ORDER BY group_key"
    );
    Ok(SqlQuery::new(
        sql,
        vec![
            run_ids_param(run_ids),
            SqlParam::Text(metric_path),
            SqlParam::Real(spec.trimming_seconds),
            SqlParam::Text(group_path),
        ],
    ))
}

/// Bucket time series per run.
///
/// Unbucketised: one row per bucket, optionally carrying the metric document
/// recorded at the same second or the one after. Bucketised: rows grouped
/// into `bucketise_seconds`-wide windows, each represented by its smallest
/// offset, with the merge function applied per column and errors summed.
pub fn raw_bucket_series(
    run_ids: &[String],
    spec: &InputSpec,
    columns: &[BucketColumn],
    with_metrics: bool,
) -> SqlQuery {
    let mut params = vec![run_ids_param(run_ids), SqlParam::Real(spec.trimming_seconds)];
    let trimmed = format!(
        "WITH trimmed AS (
            SELECT b.*, {ERROR_COUNT} AS error_count
            FROM buckets b
            WHERE b.run_id IN rarray(?1) AND b.time_offset_secs >= ?2
        )"
    );

    let sql = if spec.is_bucketised() {
        let merge = spec.merge.sql();
        let selected: String = columns
            .iter()
            .map(|c| format!(", {merge}(t.{0}) AS {0}", c.as_str()))
            .collect();
        params.push(SqlParam::Integer(spec.bucketise_seconds));
        format!(
            "{trimmed}
            SELECT t.run_id AS run_id, min(t.time_offset_secs) AS time_offset_secs{selected},
                   sum(t.error_count) AS error_count
            FROM trimmed t
            GROUP BY t.run_id, t.time_offset_secs / ?3
            ORDER BY 1, 2"
        )
    } else {
        let selected: String = columns
            .iter()
            .map(|c| format!(", t.{0} AS {0}", c.as_str()))
            .collect();
        let metrics = if with_metrics {
            ", (SELECT m.metrics FROM metrics m
                WHERE m.run_id = t.run_id
                  AND m.time_offset_secs BETWEEN t.time_offset_secs AND t.time_offset_secs + 1
                ORDER BY m.time_offset_secs LIMIT 1) AS metrics"
        } else {
            ""
        };
        format!(
            "{trimmed}
            SELECT t.run_id AS run_id, t.time_offset_secs AS time_offset_secs{selected},
                   t.error_count AS error_count{metrics}
            FROM trimmed t
            ORDER BY 1, 2"
        )
    };
    SqlQuery::new(sql, params)
}

/// Metric time series per run, with the same bucketised/unbucketised split
/// as [`raw_bucket_series`].
pub fn raw_metric_series(run_ids: &[String], metric: &str, spec: &InputSpec) -> Result<SqlQuery> {
    let path = metric_path(metric)?;
    let mut params = vec![
        run_ids_param(run_ids),
        SqlParam::Real(spec.trimming_seconds),
        SqlParam::Text(path),
    ];
    let filter = "WHERE m.run_id IN rarray(?1)
              AND m.time_offset_secs >= ?2
              AND json_extract(m.metrics, ?3) IS NOT NULL";

    let sql = if spec.is_bucketised() {
        let merge = spec.merge.sql();
        params.push(SqlParam::Integer(spec.bucketise_seconds));
        format!(
            "SELECT m.run_id AS run_id, min(m.time_offset_secs) AS time_offset_secs,
                    {merge}(CAST(json_extract(m.metrics, ?3) AS REAL)) AS value
            FROM metrics m
            {filter}
            GROUP BY m.run_id, m.time_offset_secs / ?4
            ORDER BY 1, 2"
        )
    } else {
        format!(
            "SELECT m.run_id AS run_id, m.time_offset_secs AS time_offset_secs,
                    CAST(json_extract(m.metrics, ?3) AS REAL) AS value
            FROM metrics m
            {filter}
            ORDER BY 1, 2"
        )
    };
    Ok(SqlQuery::new(sql, params))
}

fn leaf_conditions(
    prefix: &str,
    value: &Value,
    sql: &mut String,
    params: &mut Vec<SqlParam>,
) -> Result<()> {
    if let Value::Object(map) = value {
        for (key, child) in map {
            let field = if prefix.is_empty() {
                key.clone()
            } else {
                format!("{prefix}.{key}")
            };
            leaf_conditions(&field, child, sql, params)?;
        }
        return Ok(());
    }

    let path = field_path(prefix, "databaseCompare field")?;
    params.push(SqlParam::Text(path));
    let path_idx = params.len();
    let literal = match value {
        Value::Null => {
            sql.push_str(&format!(" AND json_extract(params, ?{path_idx}) IS NULL"));
            return Ok(());
        }
        Value::Bool(b) => SqlParam::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlParam::Integer(i),
            None => SqlParam::Real(n.as_f64().unwrap_or(0.0)),
        },
        Value::String(s) => SqlParam::Text(s.clone()),
        Value::Array(_) => {
            params.push(SqlParam::Text(value.to_string()));
            let value_idx = params.len();
            sql.push_str(&format!(
                " AND json_extract(params, ?{path_idx}) = json(?{value_idx})"
            ));
            return Ok(());
        }
        Value::Object(_) => unreachable!("objects are expanded above"),
    };
    params.push(literal);
    let value_idx = params.len();
    sql.push_str(&format!(
        " AND json_extract(params, ?{path_idx}) = ?{value_idx}"
    ));
    Ok(())
}

/// Runs whose parameter document matches every leaf of `filter`.
pub fn matching_runs(filter: &Map<String, Value>) -> Result<SqlQuery> {
    let mut sql = String::from("SELECT id FROM runs WHERE 1=1");
    let mut params = Vec::new();
    leaf_conditions("", &Value::Object(filter.clone()), &mut sql, &mut params)?;
    sql.push_str(" ORDER BY datetime");
    Ok(SqlQuery::new(sql, params))
}

pub fn distinct_values(field: &str) -> Result<SqlQuery> {
    let path = field_path(field, "axis field")?;
    Ok(SqlQuery::new(
        "SELECT DISTINCT json_extract(params, ?1) AS value
         FROM runs
         WHERE json_extract(params, ?1) IS NOT NULL
         ORDER BY value",
        vec![SqlParam::Text(path)],
    ))
}

pub fn metric_keys() -> SqlQuery {
    SqlQuery::new(
        "SELECT DISTINCT j.key AS key
         FROM metrics m,
              json_each(CASE WHEN json_valid(m.metrics) THEN m.metrics ELSE '{}' END) j
         ORDER BY key",
        Vec::new(),
    )
}

pub fn run_by_id(run_id: &str) -> SqlQuery {
    SqlQuery::new(
        "SELECT id, datetime, params FROM runs WHERE id = ?1",
        vec![SqlParam::from(run_id)],
    )
}

/// Every metric document of one run from `trimming_seconds` on.
pub fn metric_samples(run_id: &str, trimming_seconds: f64) -> SqlQuery {
    SqlQuery::new(
        "SELECT time_offset_secs, metrics
         FROM metrics
         WHERE run_id = ?1 AND time_offset_secs >= ?2
         ORDER BY time_offset_secs",
        vec![SqlParam::from(run_id), SqlParam::Real(trimming_seconds)],
    )
}

/// Per-run success percentage and error total for the runs selected by
/// `member_filter` (a condition on `j`, the join table).
fn run_scores(member_filter: &str) -> String {
    format!(
        "bucket_errors AS (
            SELECT b.run_id AS run_id, b.operations_total AS operations_total,
                   b.operations_success AS operations_success, {ERROR_COUNT} AS error_count
            FROM buckets b
        ),
        run_scores AS (
            SELECT j.situational_id AS situational_id, j.run_id AS run_id,
                   CASE WHEN coalesce(sum(be.operations_total), 0) = 0 THEN 0.0
                        ELSE 100.0 * sum(be.operations_success) / sum(be.operations_total)
                   END AS score,
                   coalesce(sum(be.error_count), 0) AS error_count
            FROM situational_run_join j
            LEFT JOIN bucket_errors be ON be.run_id = j.run_id
            WHERE {member_filter}
            GROUP BY j.situational_id, j.run_id
        )"
    )
}

pub fn situational_runs() -> SqlQuery {
    let scores = run_scores("1=1");
    SqlQuery::new(
        format!(
            "WITH {scores}
            SELECT s.id AS id, s.datetime AS datetime,
                   count(rs.run_id) AS run_count,
                   coalesce(avg(rs.score), 0.0) AS score,
                   (SELECT r.params FROM situational_run_join j2
                    JOIN runs r ON r.id = j2.run_id
                    WHERE j2.situational_id = s.id LIMIT 1) AS any_run_params
            FROM situational_runs s
            LEFT JOIN run_scores rs ON rs.situational_id = s.id
            GROUP BY s.id
            ORDER BY s.datetime DESC"
        ),
        Vec::new(),
    )
}

pub fn situational_run_members(situational_id: &str) -> SqlQuery {
    let scores = run_scores("j.situational_id = ?1");
    SqlQuery::new(
        format!(
            "WITH {scores}
            SELECT rs.run_id AS run_id, r.datetime AS datetime, r.params AS params,
                   rs.score AS score, rs.error_count AS error_count
            FROM run_scores rs
            JOIN runs r ON r.id = rs.run_id
            ORDER BY r.datetime"
        ),
        vec![SqlParam::from(situational_id)],
    )
}

pub fn situational_run_membership(situational_id: &str, run_id: &str) -> SqlQuery {
    SqlQuery::new(
        "SELECT run_id FROM situational_run_join
         WHERE situational_id = ?1 AND run_id = ?2
         LIMIT 1",
        vec![SqlParam::from(situational_id), SqlParam::from(run_id)],
    )
}

const ERROR_VALUE: &str = "CASE
        WHEN e.type = 'integer' THEN e.value
        WHEN e.type = 'text' AND e.value <> '' AND e.value NOT GLOB '*[^0-9]*' THEN CAST(e.value AS INTEGER)
        ELSE 0 END";

fn error_totals(run_filter: &str) -> String {
    format!(
        "SELECT e.key AS error, sum({ERROR_VALUE}) AS count
        FROM buckets b,
             json_each(CASE WHEN json_valid(b.errors) THEN b.errors ELSE '{{}}' END) e
        WHERE {run_filter}
        GROUP BY e.key
        HAVING sum({ERROR_VALUE}) > 0
        ORDER BY 2 DESC, 1"
    )
}

/// Error code totals across the given runs.
pub fn error_summary(run_ids: &[String], trimming_seconds: f64) -> SqlQuery {
    SqlQuery::new(
        error_totals("b.run_id IN rarray(?1) AND b.time_offset_secs >= ?2"),
        vec![run_ids_param(run_ids), SqlParam::Real(trimming_seconds)],
    )
}

pub fn situational_run_errors(situational_id: &str) -> SqlQuery {
    SqlQuery::new(
        error_totals(
            "b.run_id IN (SELECT run_id FROM situational_run_join WHERE situational_id = ?1)",
        ),
        vec![SqlParam::from(situational_id)],
    )
}

pub fn situational_run_events(situational_id: &str) -> SqlQuery {
    SqlQuery::new(
        "SELECT ev.run_id AS run_id, ev.datetime_recorded AS datetime_recorded, ev.params AS params
         FROM run_events ev
         JOIN situational_run_join j ON j.run_id = ev.run_id
         WHERE j.situational_id = ?1
         ORDER BY ev.datetime_recorded, ev.run_id",
        vec![SqlParam::from(situational_id)],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::executor::QueryExecutor;
    use crate::data::projection::GroupedRow;
    use crate::data::sqlite::SqlitePool;
    use crate::query::merge::MergeFunction;
    use serde_json::json;

    fn spec(merge: MergeFunction, trimming: f64, bucketise: i64) -> InputSpec {
        InputSpec {
            merge,
            trimming_seconds: trimming,
            multiple_results: MultipleResultsHandling::Merged,
            bucketise_seconds: bucketise,
        }
    }

    fn ids(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    fn seeded() -> SqlitePool {
        let pool = SqlitePool::in_memory().unwrap();
        pool.connection()
            .unwrap()
            .execute_batch(
                r#"
                INSERT INTO runs (id, datetime, params) VALUES
                  ('r1', '2024-01-01', '{"impl":{"language":"Java","version":"3.5.0"},"cluster":{"version":"7.6.0"}}'),
                  ('r2', '2024-01-02', '{"impl":{"language":"Java","version":"3.5.0"},"cluster":{"version":"7.6.0"}}'),
                  ('r3', '2024-01-03', '{"impl":{"language":"Java","version":"3.6.0"},"cluster":{"version":"7.2.0"}}');
                -- r1 buckets average 10, r2 buckets average 20 (three rows vs one)
                INSERT INTO buckets (run_id, time_offset_secs, duration_average_us, errors) VALUES
                  ('r1', 0, 1000, '{"Timeout": 50}'),
                  ('r1', 5, 5, NULL),
                  ('r1', 6, 10, '{"Timeout": 2, "Ambiguous": "3"}'),
                  ('r1', 7, 15, '{"Weird": "x", "Other": 1.5}'),
                  ('r2', 5, 20, NULL),
                  ('r3', 5, 40, NULL);
                INSERT INTO metrics (run_id, time_offset_secs, metrics) VALUES
                  ('r1', 5, '{"processCpu": 10}'),
                  ('r1', 6, '{"processCpu": 30, "threadCount": 4}'),
                  ('r2', 5, '{"processCpu": 50}'),
                  ('r3', 2, '{"processCpu": 99}');
                "#,
            )
            .unwrap();
        pool
    }

    #[test]
    fn merged_mode_averages_per_run_aggregates() {
        let pool = seeded();
        let q = grouped_bucket_aggregation(
            &ids(&["r1", "r2", "r3"]),
            "impl.version",
            &spec(MergeFunction::Avg, 5.0, 0),
            BucketColumn::DurationAverageUs,
        )
        .unwrap();
        let rows = pool.run(&q).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["group_key"], "3.5.0");
        // (avg(5,10,15) + avg(20)) / 2, not avg(5,10,15,20)
        assert_eq!(rows[0]["value"].as_f64().unwrap(), 15.0);
        assert_eq!(rows[1]["group_key"], "3.6.0");
        assert_eq!(GroupedRow::from_row(&rows[1]).cluster_versions, vec!["7.2.0"]);
    }

    #[test]
    fn merged_group_reports_every_cluster_version() {
        let pool = seeded();
        let q = grouped_bucket_aggregation(
            &ids(&["r1", "r2", "r3"]),
            "impl.language",
            &spec(MergeFunction::Avg, 5.0, 0),
            BucketColumn::DurationAverageUs,
        )
        .unwrap();
        let rows = pool.run(&q).unwrap();
        assert_eq!(rows.len(), 1);
        let mut versions = GroupedRow::from_row(&rows[0]).cluster_versions;
        versions.sort();
        assert_eq!(versions, vec!["7.2.0", "7.6.0"]);
    }

    #[test]
    fn trimmed_rows_never_contribute() {
        let pool = seeded();
        for merge in [MergeFunction::Max, MergeFunction::Sum, MergeFunction::Avg] {
            let q = grouped_bucket_aggregation(
                &ids(&["r1"]),
                "impl.version",
                &spec(merge, 5.0, 0),
                BucketColumn::DurationAverageUs,
            )
            .unwrap();
            let value = pool.run(&q).unwrap()[0]["value"].as_f64().unwrap();
            assert!(value < 1000.0, "{merge:?} saw the warm-up bucket");
        }
        let series = pool
            .run(&raw_bucket_series(&ids(&["r1"]), &spec(MergeFunction::Avg, 5.0, 0), &[], false))
            .unwrap();
        assert!(series.iter().all(|r| r["time_offset_secs"].as_i64().unwrap() >= 5));
    }

    #[test]
    fn side_by_side_bucket_rows_are_per_run() {
        let pool = seeded();
        let mut s = spec(MergeFunction::Max, 0.0, 0);
        s.multiple_results = MultipleResultsHandling::SideBySide;
        let q = grouped_bucket_aggregation(
            &ids(&["r2", "r1", "r3"]),
            "impl.version",
            &s,
            BucketColumn::DurationAverageUs,
        )
        .unwrap();
        let rows = pool.run(&q).unwrap();
        let runs: Vec<&str> = rows.iter().map(|r| r["run_id"].as_str().unwrap()).collect();
        assert_eq!(runs, vec!["r1", "r2", "r3"]);
        assert_eq!(rows[0]["value"].as_f64().unwrap(), 1000.0);
    }

    #[test]
    fn side_by_side_metrics_is_unsupported() {
        let mut s = spec(MergeFunction::Avg, 0.0, 0);
        s.multiple_results = MultipleResultsHandling::SideBySide;
        for _ in 0..3 {
            let err = grouped_metric_aggregation(&ids(&["r1"]), "processCpu", &s).unwrap_err();
            assert!(matches!(err, DashboardError::Unsupported(_)));
        }
    }

    #[test]
    fn metric_aggregation_groups_by_sdk_version() {
        let pool = seeded();
        let q = grouped_metric_aggregation(
            &ids(&["r1", "r2", "r3"]),
            "processCpu",
            &spec(MergeFunction::Max, 3.0, 0),
        )
        .unwrap();
        let rows = pool.run(&q).unwrap();
        assert_eq!(rows.len(), 1, "r3 only has a trimmed sample");
        assert_eq!(rows[0]["group_key"], "3.5.0");
        assert_eq!(rows[0]["value"].as_f64().unwrap(), 50.0);
    }

    #[test]
    fn bucketised_windows_use_min_offset() {
        let pool = SqlitePool::in_memory().unwrap();
        pool.connection()
            .unwrap()
            .execute_batch(
                r#"
                INSERT INTO runs (id, datetime) VALUES ('w', '2024-01-01');
                INSERT INTO buckets (run_id, time_offset_secs, operations_total, errors) VALUES
                  ('w', 0, 1, '{"A": 1}'), ('w', 3, 2, NULL), ('w', 7, 3, '{"A": "2"}'),
                  ('w', 11, 4, '{"B": 5, "C": "nope"}'), ('w', 14, 5, NULL);
                "#,
            )
            .unwrap();
        let q = raw_bucket_series(
            &ids(&["w"]),
            &spec(MergeFunction::Max, 0.0, 10),
            &[BucketColumn::OperationsTotal],
            false,
        );
        let rows = pool.run(&q).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["time_offset_secs"], 0);
        assert_eq!(rows[0]["operations_total"], 3);
        assert_eq!(rows[0]["error_count"], 3);
        assert_eq!(rows[1]["time_offset_secs"], 11);
        assert_eq!(rows[1]["operations_total"], 5);
        assert_eq!(rows[1]["error_count"], 5);
    }

    #[test]
    fn unbucketised_series_joins_metrics_at_same_or_next_second() {
        let pool = seeded();
        let q = raw_bucket_series(
            &ids(&["r1"]),
            &spec(MergeFunction::Avg, 5.0, 1),
            &[BucketColumn::DurationAverageUs],
            true,
        );
        let rows = pool.run(&q).unwrap();
        assert_eq!(rows.len(), 3);
        assert!(rows[0]["metrics"].as_str().unwrap().contains("10"));
        assert!(rows[1]["metrics"].as_str().unwrap().contains("threadCount"));
        assert!(rows[2]["metrics"].is_null());
        // integer and digit-string values only
        assert_eq!(rows[1]["error_count"], 5);
        assert_eq!(rows[2]["error_count"], 0);
    }

    #[test]
    fn metric_series_bucketised_and_plain() {
        let pool = seeded();
        let plain = raw_metric_series(&ids(&["r1"]), "processCpu", &spec(MergeFunction::Avg, 0.0, 0))
            .unwrap();
        assert_eq!(pool.run(&plain).unwrap().len(), 2);

        let windowed =
            raw_metric_series(&ids(&["r1"]), "processCpu", &spec(MergeFunction::Sum, 0.0, 10)).unwrap();
        let rows = pool.run(&windowed).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["time_offset_secs"], 5);
        assert_eq!(rows[0]["value"].as_f64().unwrap(), 40.0);
    }

    #[test]
    fn identifiers_never_come_from_input() {
        assert!(metric_path("cpu'); DROP TABLE runs; --").is_err());
        assert!(grouped_bucket_aggregation(
            &ids(&["x"]),
            "impl.version) --",
            &spec(MergeFunction::Avg, 0.0, 0),
            BucketColumn::DurationP99Us
        )
        .is_err());
        let q = grouped_bucket_aggregation(
            &ids(&["a'b"]),
            "impl.version",
            &spec(MergeFunction::Avg, 0.0, 0),
            BucketColumn::DurationP99Us,
        )
        .unwrap();
        assert!(!q.sql.contains("a'b"));
        assert_eq!(q.params[0], SqlParam::TextArray(ids(&["a'b"])));
    }

    #[test]
    fn filter_matches_every_leaf() {
        let pool = seeded();
        let filter = json!({"impl": {"language": "Java", "version": "3.5.0"}, "cluster": {"version": "7.6.0"}});
        let q = matching_runs(filter.as_object().unwrap()).unwrap();
        let rows = pool.run(&q).unwrap();
        let runs: Vec<&str> = rows.iter().map(|r| r["id"].as_str().unwrap()).collect();
        assert_eq!(runs, vec!["r1", "r2"]);

        let q = matching_runs(&Map::new()).unwrap();
        assert_eq!(pool.run(&q).unwrap().len(), 3);

        let bad = json!({"impl": {"bad key!": 1}});
        assert!(matching_runs(bad.as_object().unwrap()).is_err());
    }

    #[test]
    fn distinct_values_and_metric_keys() {
        let pool = seeded();
        let rows = pool.run(&distinct_values("impl.version").unwrap()).unwrap();
        assert_eq!(rows.len(), 2);
        let keys = pool.run(&metric_keys()).unwrap();
        let keys: Vec<&str> = keys.iter().map(|r| r["key"].as_str().unwrap()).collect();
        assert_eq!(keys, vec!["processCpu", "threadCount"]);
    }

    #[test]
    fn error_summary_counts_integer_values() {
        let pool = seeded();
        let rows = pool.run(&error_summary(&ids(&["r1", "r2"]), 0.0)).unwrap();
        assert_eq!(rows[0]["error"], "Timeout");
        assert_eq!(rows[0]["count"], 52);
        assert_eq!(rows[1]["error"], "Ambiguous");
        assert_eq!(rows[1]["count"], 3);
        assert_eq!(rows.len(), 2);
    }
}
