// backend/src/api.rs

//! Role: Define REST endpoints for the dashboard frontend.
//!
//! Endpoints:
//! - GET  /api/filtered?axisField=  distinct values of a run parameter
//! - GET  /api/group-by             grouping dimensions
//! - GET  /api/metrics              metric keys present in the data
//! - POST /api/graph                grouped chart series
//! - POST /api/time-series          per-run chart series
//! - POST /api/error-summary        error totals for a chart request
//! - POST /api/classify             query intent of a chart request or title
//! - GET  /api/runs/:id             one run's buckets and metrics
//! - GET  /api/situational-runs[/:id[/runs/:run_id | /errors | /events]]

use crate::model::{ClassifyBody, FilteredParams, SingleRunParams};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use perf_dashboard::data::projection::{ErrorSummaryRow, RunEvent, SituationalRunSummary};
use perf_dashboard::query::intent::{classify_request, ChartRequest, QueryIntent};
use perf_dashboard::service::dashboard::{GraphResponse, SingleRunResponse, SituationalRunDetails};
use perf_dashboard::{DashboardError, DashboardService, ServiceSlot};
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use tracing::error;

#[derive(Clone)]
pub struct AppState {
    pub slot: Arc<ServiceSlot>,
}

impl AppState {
    /// Run `op` against the live service; pool failures drop it for rebuild.
    async fn call<T, F, Fut>(&self, op: F) -> ApiResult<T>
    where
        F: FnOnce(Arc<DashboardService>) -> Fut,
        Fut: Future<Output = perf_dashboard::Result<T>>,
    {
        let service = self.slot.get().await.map_err(ApiError)?;
        let result = op(Arc::clone(&service)).await;
        self.slot.observe(&service, &result).await;
        result.map(Json).map_err(ApiError)
    }
}

pub struct ApiError(pub DashboardError);

type ApiResult<T> = Result<Json<T>, ApiError>;

fn body(status: StatusCode, message: &str) -> Value {
    json!({
        "message": message,
        "error": status.canonical_reason().unwrap_or_default(),
        "statusCode": status.as_u16(),
    })
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self.0 {
            DashboardError::Validation(v) => (StatusCode::BAD_REQUEST, Json(v)).into_response(),
            DashboardError::Unsupported(msg) => {
                (StatusCode::BAD_REQUEST, Json(body(StatusCode::BAD_REQUEST, &msg))).into_response()
            }
            DashboardError::NotFound(what) => (
                StatusCode::NOT_FOUND,
                Json(body(StatusCode::NOT_FOUND, &format!("{what} not found"))),
            )
                .into_response(),
            other => {
                error!(error = %other, "request failed");
                let status = StatusCode::INTERNAL_SERVER_ERROR;
                (status, Json(body(status, "Internal server error"))).into_response()
            }
        }
    }
}

/// Create all backend routes over the shared service slot
pub fn create_routes(state: AppState) -> Router {
    Router::new()
        .route("/api/filtered", get(get_filtered))
        .route("/api/group-by", get(get_group_by))
        .route("/api/metrics", get(get_metrics))
        .route("/api/graph", post(gen_graph))
        .route("/api/time-series", post(gen_time_series))
        .route("/api/error-summary", post(gen_error_summary))
        .route("/api/classify", post(classify))
        .route("/api/runs/:id", get(gen_single))
        .route("/api/situational-runs", get(gen_situational_runs))
        .route("/api/situational-runs/:id", get(gen_situational_run))
        .route("/api/situational-runs/:id/runs/:run_id", get(gen_situational_run_run))
        .route("/api/situational-runs/:id/errors", get(gen_situational_run_errors))
        .route("/api/situational-runs/:id/events", get(gen_situational_run_events))
        .with_state(state)
}

async fn get_filtered(
    State(state): State<AppState>,
    Query(params): Query<FilteredParams>,
) -> ApiResult<Vec<String>> {
    let field = params.axis_field.unwrap_or_default();
    state
        .call(|service| async move { service.get_filtered(&field).await })
        .await
}

async fn get_group_by(State(state): State<AppState>) -> ApiResult<Vec<String>> {
    state
        .call(|service| async move { Ok(service.get_group_by()) })
        .await
}

async fn get_metrics(State(state): State<AppState>) -> ApiResult<Vec<String>> {
    state
        .call(|service| async move { service.get_available_metrics().await })
        .await
}

async fn gen_graph(State(state): State<AppState>, Json(raw): Json<Value>) -> ApiResult<GraphResponse> {
    state
        .call(|service| async move { service.gen_graph(&raw).await })
        .await
}

async fn gen_time_series(
    State(state): State<AppState>,
    Json(raw): Json<Value>,
) -> ApiResult<GraphResponse> {
    state
        .call(|service| async move { service.gen_time_series(&raw).await })
        .await
}

async fn gen_error_summary(
    State(state): State<AppState>,
    Json(raw): Json<Value>,
) -> ApiResult<Vec<ErrorSummaryRow>> {
    state
        .call(|service| async move { service.gen_error_summary(&raw).await })
        .await
}

/// Structured request when present, title keywords otherwise.
async fn classify(Json(body): Json<ClassifyBody>) -> Json<QueryIntent> {
    let request: Option<ChartRequest> = body.request.map(Into::into);
    Json(classify_request(request.as_ref(), &body.title))
}

async fn gen_single(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<SingleRunParams>,
) -> ApiResult<SingleRunResponse> {
    let request = params.for_run(id);
    state
        .call(|service| async move { service.gen_single(&request).await })
        .await
}

async fn gen_situational_runs(
    State(state): State<AppState>,
) -> ApiResult<Vec<SituationalRunSummary>> {
    state
        .call(|service| async move { service.gen_situational_runs().await })
        .await
}

async fn gen_situational_run(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<SituationalRunDetails> {
    state
        .call(|service| async move { service.gen_situational_run(&id).await })
        .await
}

async fn gen_situational_run_run(
    State(state): State<AppState>,
    Path((id, run_id)): Path<(String, String)>,
    Query(params): Query<SingleRunParams>,
) -> ApiResult<SingleRunResponse> {
    let request = params.for_run(run_id);
    state
        .call(|service| async move { service.gen_situational_run_run(&id, &request).await })
        .await
}

async fn gen_situational_run_errors(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Vec<ErrorSummaryRow>> {
    state
        .call(|service| async move { service.gen_situational_run_errors(&id).await })
        .await
}

async fn gen_situational_run_events(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Vec<RunEvent>> {
    state
        .call(|service| async move { service.gen_situational_run_events(&id).await })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ClassifyChart;
    use perf_dashboard::config::DashboardConfig;
    use perf_dashboard::data::sqlite::SqlitePool;
    use perf_dashboard::ValidationError;
    use std::time::Duration;

    fn empty_state() -> AppState {
        let slot = ServiceSlot::new(|| {
            Ok(DashboardService::new(
                Arc::new(SqlitePool::in_memory()?),
                DashboardConfig::default(),
            ))
        });
        AppState {
            slot: Arc::new(slot),
        }
    }

    async fn status_and_body(err: DashboardError) -> (StatusCode, Value) {
        let response = ApiError(err).into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn errors_map_to_status_codes() {
        let (status, body) =
            status_and_body(ValidationError::single("graphType is required").into()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Validation failed");
        assert_eq!(body["statusCode"], 400);
        assert_eq!(body["details"][0], "graphType is required");

        let (status, _) = status_and_body(DashboardError::Unsupported("x".into())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = status_and_body(DashboardError::NotFound("run 'r9'".into())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Not Found");

        let (status, body) =
            status_and_body(DashboardError::Timeout(Duration::from_secs(30))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], "Internal server error");
    }

    #[tokio::test]
    async fn handlers_surface_validation_and_not_found() {
        let state = empty_state();
        let err = gen_graph(State(state.clone()), Json(json!({})))
            .await
            .err()
            .unwrap();
        assert!(matches!(err.0, DashboardError::Validation(_)));

        let err = gen_situational_run(State(state.clone()), Path("s1".into()))
            .await
            .err()
            .unwrap();
        assert!(matches!(err.0, DashboardError::NotFound(_)));

        let Json(fields) = get_group_by(State(state)).await.ok().unwrap();
        assert!(fields.contains(&"impl.version".to_string()));
    }

    #[tokio::test]
    async fn classify_prefers_structured_request() {
        let Json(intent) = classify(Json(ClassifyBody {
            request: Some(ClassifyChart {
                y_axes: vec!["threadCount".into()],
                ..ClassifyChart::default()
            }),
            title: "Horizontal scaling".into(),
        }))
        .await;
        assert_eq!(intent, QueryIntent::SystemMetric { metric: "threadCount".into() });

        let Json(intent) = classify(Json(ClassifyBody {
            request: None,
            title: "Horizontal scaling".into(),
        }))
        .await;
        assert_eq!(intent, QueryIntent::HorizontalScaling);
    }
}
