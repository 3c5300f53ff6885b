// Fin Insight - REST API with Axum
//
// Every request names its client in `x-client-id` (set by the auth proxy in
// front of us); the company context is resolved from it per request.

use crate::cache::SnapshotCache;
use crate::context::{resolve_context, save_company, CompanyContext, CompanySetup};
use crate::error::InsightError;
use crate::ingest::{ingest_upload, UploadOutcome};
use crate::kpi::{add_kpi, kpi_view, remove_kpi, NewKpi};
use crate::views::{benchmark_view, dashboard_view, metric_cards, MetricCard};
use crate::{db, metrics::FinancialMetrics};
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{delete, get},
    Router,
};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::error;

pub const CLIENT_HEADER: &str = "x-client-id";
pub const FILENAME_HEADER: &str = "x-filename";
const DEFAULT_UPLOAD_NAME: &str = "upload.csv";

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Mutex<Connection>>,
    pub cache: Arc<SnapshotCache>,
}

impl AppState {
    pub fn new(conn: Connection) -> Self {
        Self {
            db: Arc::new(Mutex::new(conn)),
            cache: Arc::new(SnapshotCache::new()),
        }
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.db.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// API Response wrapper
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        let status = match err.downcast_ref::<InsightError>() {
            Some(InsightError::NoCompany) => StatusCode::NOT_FOUND,
            Some(InsightError::UnknownMetric(_)) | Some(InsightError::MissingFields(_)) => {
                StatusCode::BAD_REQUEST
            }
            Some(_) => StatusCode::UNPROCESSABLE_ENTITY,
            None => {
                error!(error = %err, "request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        Self::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ApiResponse::<()>::err(self.message))).into_response()
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

fn client_id(headers: &HeaderMap) -> Result<i64, ApiError> {
    headers
        .get(CLIENT_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
        .ok_or_else(|| ApiError::new(StatusCode::UNAUTHORIZED, "Missing or invalid x-client-id header"))
}

fn context(conn: &Connection, headers: &HeaderMap) -> Result<CompanyContext, ApiError> {
    let client_id = client_id(headers)?;
    Ok(resolve_context(conn, client_id)?)
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MetricsResponse {
    pub company_name: String,
    /// None until an income statement is uploaded
    pub metrics: Option<FinancialMetrics>,
    pub cards: Vec<MetricCard>,
}

/// GET /api/metrics - Latest period metrics and headline cards
async fn get_metrics(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<MetricsResponse> {
    let conn = state.conn();
    let ctx = context(&conn, &headers)?;

    let metrics = dashboard_view(&conn, &state.cache, &ctx)?;
    let cards = metrics.as_ref().map(metric_cards).unwrap_or_default();

    Ok(Json(ApiResponse::ok(MetricsResponse {
        company_name: ctx.company_name,
        metrics,
        cards,
    })))
}

/// GET /api/benchmarks - Comparison against the company's sector
async fn get_benchmarks(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Vec<crate::benchmark::BenchmarkComparison>> {
    let conn = state.conn();
    let ctx = context(&conn, &headers)?;

    Ok(Json(ApiResponse::ok(benchmark_view(&conn, &state.cache, &ctx)?)))
}

#[derive(Debug, Deserialize)]
struct KpiQuery {
    limit: Option<usize>,
}

/// GET /api/kpis?limit=N - KPIs with current values
async fn get_kpis(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<KpiQuery>,
) -> ApiResult<Vec<crate::kpi::KpiProgress>> {
    let conn = state.conn();
    let ctx = context(&conn, &headers)?;

    Ok(Json(ApiResponse::ok(kpi_view(&conn, &state.cache, &ctx, query.limit)?)))
}

/// POST /api/kpis - Create a KPI
async fn create_kpi(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(new): Json<NewKpi>,
) -> Result<(StatusCode, Json<ApiResponse<db::KpiDefinition>>), ApiError> {
    let conn = state.conn();
    let ctx = context(&conn, &headers)?;

    let kpi = add_kpi(&conn, &ctx, &new)?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(kpi))))
}

/// DELETE /api/kpis/:id - Remove one of the company's KPIs
async fn delete_kpi(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(kpi_id): Path<i64>,
) -> ApiResult<i64> {
    let conn = state.conn();
    let ctx = context(&conn, &headers)?;

    if remove_kpi(&conn, &ctx, kpi_id)? {
        Ok(Json(ApiResponse::ok(kpi_id)))
    } else {
        Err(ApiError::new(StatusCode::NOT_FOUND, format!("KPI {} not found", kpi_id)))
    }
}

/// GET /api/uploads - Upload history
async fn get_uploads(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Vec<db::UploadRecord>> {
    let conn = state.conn();
    let ctx = context(&conn, &headers)?;

    Ok(Json(ApiResponse::ok(db::list_uploads(&conn, ctx.company_id)?)))
}

/// POST /api/uploads - CSV text body; file name in the x-filename header
async fn create_upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<(StatusCode, Json<ApiResponse<UploadOutcome>>), ApiError> {
    let conn = state.conn();
    let ctx = context(&conn, &headers)?;

    // Decode URL-encoded filename
    let filename = headers
        .get(FILENAME_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|raw| {
            urlencoding::decode(raw)
                .map(|decoded| decoded.into_owned())
                .unwrap_or_else(|_| raw.to_string())
        })
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_UPLOAD_NAME.to_string());

    let outcome = ingest_upload(&conn, &state.cache, &ctx, &filename, &body)?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(outcome))))
}

/// GET /api/company - The caller's company
async fn get_company(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<CompanyContext> {
    let conn = state.conn();
    Ok(Json(ApiResponse::ok(context(&conn, &headers)?)))
}

/// PUT /api/company - Create or update the caller's company
async fn put_company(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(setup): Json<CompanySetup>,
) -> ApiResult<CompanyContext> {
    let client_id = client_id(&headers)?;
    let conn = state.conn();

    let ctx = save_company(&conn, client_id, &setup)?;
    // Sector may have changed; statements are unaffected but views re-read
    state.cache.invalidate(ctx.company_id);

    Ok(Json(ApiResponse::ok(ctx)))
}

/// GET /api/sectors - Sector choices for company setup
async fn get_sectors(State(state): State<AppState>) -> ApiResult<Vec<db::Sector>> {
    let conn = state.conn();
    Ok(Json(ApiResponse::ok(db::list_sectors(&conn)?)))
}

// ============================================================================
// Router
// ============================================================================

pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(get_metrics))
        .route("/benchmarks", get(get_benchmarks))
        .route("/kpis", get(get_kpis).post(create_kpi))
        .route("/kpis/:id", delete(delete_kpi))
        .route("/uploads", get(get_uploads).post(create_upload))
        .route("/company", get(get_company).put(put_company))
        .route("/sectors", get(get_sectors))
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
