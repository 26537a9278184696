//! # API REST
//!
//! REST API implementation for the patient report service.
//!
//! Handles:
//! - HTTP endpoints with axum
//! - OpenAPI/Swagger documentation
//! - REST-specific concerns (JSON serialization, CORS, status mapping)
//!
//! Status mapping is the shell's whole job here: `PatientNotFound` becomes
//! 404, `Unavailable` (sources exhausted, timed out or circuit open)
//! becomes 503, and an id that fails validation becomes 400. The core never
//! sees HTTP.

#![warn(rust_2018_idioms)]

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path as AxumPath, State},
    http::StatusCode,
    response::Json,
    routing::{delete, get},
    Router,
};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use utoipa::{OpenApi, ToSchema};
use utoipa_swagger_ui::SwaggerUi;

use report_core::{CoreConfig, PatientId, Report, ReportError, ReportService, TemplateLocation};

/// Default address the REST server binds to.
pub const DEFAULT_REST_ADDR: &str = "0.0.0.0:3000";
/// Default base URL of the upstream patient service.
pub const DEFAULT_PATIENT_SERVICE_URL: &str = "http://localhost:8082";
/// Default packaged template path.
pub const DEFAULT_TEMPLATE_PATH: &str = "templates/patient_report.txt";

/// Application state shared across REST API handlers.
///
/// Holds the report service, which owns the resolver, the patient cache and
/// the template store.
#[derive(Clone)]
pub struct AppState {
    report_service: Arc<ReportService>,
}

impl AppState {
    pub fn new(report_service: Arc<ReportService>) -> Self {
        Self { report_service }
    }
}

/// Health check response.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthRes {
    pub ok: bool,
    pub message: String,
}

/// Generated patient report, as returned to API callers.
#[derive(Debug, Serialize, ToSchema)]
pub struct PatientReportRes {
    pub report_id: String,
    pub issue_date: String,
    pub generated_report: String,
    pub patient_id: String,
    pub patient_name: String,
    pub email: String,
}

impl From<Report> for PatientReportRes {
    fn from(report: Report) -> Self {
        Self {
            report_id: report.report_id,
            issue_date: report.issue_date.to_rfc3339(),
            generated_report: report.generated_report,
            patient_id: report.patient_id,
            patient_name: report.patient_name,
            email: report.email,
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(health, generate_report, invalidate_cache),
    components(schemas(HealthRes, PatientReportRes))
)]
struct ApiDoc;

/// Builds the REST router for the given state.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/reports/:id", get(generate_report))
        .route("/cache/:id", delete(invalidate_cache))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Binds the address and serves the REST API until the process exits.
pub async fn serve(addr: &str, state: AppState) -> anyhow::Result<()> {
    tracing::info!("-- Starting report REST API on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// Resolves the core configuration from environment variables.
///
/// # Environment Variables
/// - `PATIENT_SERVICE_URL`: primary patient source base URL
///   (default: "http://localhost:8082")
/// - `PATIENT_SERVICE_FALLBACK_URL`: optional direct fallback source
/// - `REPORT_TEMPLATE_URL`: remote template document; when unset,
///   `REPORT_TEMPLATE` names the packaged template file
///   (default: "templates/patient_report.txt")
/// - `REPORT_PRIMARY_DEADLINE_SECS` / `REPORT_FALLBACK_DEADLINE_SECS`:
///   per-source fetch deadlines
/// - `REPORT_BREAKER_THRESHOLD` / `REPORT_BREAKER_COOL_DOWN_SECS`:
///   circuit breaker knobs
pub fn config_from_env() -> anyhow::Result<CoreConfig> {
    let primary = std::env::var("PATIENT_SERVICE_URL")
        .unwrap_or_else(|_| DEFAULT_PATIENT_SERVICE_URL.into());
    let fallback = std::env::var("PATIENT_SERVICE_FALLBACK_URL")
        .ok()
        .filter(|v| !v.trim().is_empty());

    let template_location = match std::env::var("REPORT_TEMPLATE_URL") {
        Ok(url) if !url.trim().is_empty() => TemplateLocation::Remote(url),
        _ => TemplateLocation::File(
            std::env::var("REPORT_TEMPLATE")
                .unwrap_or_else(|_| DEFAULT_TEMPLATE_PATH.into())
                .into(),
        ),
    };

    let mut cfg = CoreConfig::new(primary, fallback, template_location)?;

    let primary_deadline =
        env_secs("REPORT_PRIMARY_DEADLINE_SECS").unwrap_or_else(|| cfg.primary_deadline());
    let fallback_deadline =
        env_secs("REPORT_FALLBACK_DEADLINE_SECS").unwrap_or_else(|| cfg.fallback_deadline());
    cfg = cfg.with_deadlines(primary_deadline, fallback_deadline);

    let threshold = env_u32("REPORT_BREAKER_THRESHOLD")
        .unwrap_or_else(|| cfg.breaker_failure_threshold());
    let cool_down =
        env_secs("REPORT_BREAKER_COOL_DOWN_SECS").unwrap_or_else(|| cfg.breaker_cool_down());
    cfg = cfg.with_breaker(threshold, cool_down);

    Ok(cfg)
}

fn env_secs(name: &str) -> Option<Duration> {
    std::env::var(name)
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

fn env_u32(name: &str) -> Option<u32> {
    std::env::var(name).ok()?.trim().parse::<u32>().ok()
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
/// Health check endpoint for the REST API
///
/// Returns the current health status of the report service.
/// This endpoint is used for monitoring and load balancer health checks.
///
/// # Returns
/// * `Json<HealthRes>` - Health status response containing service status
#[axum::debug_handler]
async fn health(State(_state): State<AppState>) -> Json<HealthRes> {
    Json(HealthRes {
        ok: true,
        message: "Report service is alive".into(),
    })
}

#[utoipa::path(
    get,
    path = "/reports/{id}",
    responses(
        (status = 200, description = "Generated patient report", body = PatientReportRes),
        (status = 400, description = "Invalid patient id"),
        (status = 404, description = "No patient found with the given id"),
        (status = 503, description = "Patient sources unavailable")
    )
)]
/// Generate a report for a patient
///
/// Resolves the patient (from cache or a remote source), renders the report
/// template and returns the assembled report.
///
/// # Arguments
/// * `id` - Patient identifier, as known to the upstream patient service
///
/// # Returns
/// * `Ok(Json<PatientReportRes>)` - The generated report
/// * `Err((StatusCode, &str))` - 400/404/503 per the failure kind
///
/// # Errors
/// Returns `404 Not Found` when no configured source knows the patient, and
/// `503 Service Unavailable` when every source was unreachable, timed out
/// or is circuit-broken.
#[axum::debug_handler]
async fn generate_report(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> Result<Json<PatientReportRes>, (StatusCode, &'static str)> {
    let patient_id = match PatientId::new(&id) {
        Ok(patient_id) => patient_id,
        Err(e) => {
            tracing::warn!(raw_id = %id, error = %e, "rejected patient id");
            return Err((StatusCode::BAD_REQUEST, "Invalid patient id"));
        }
    };

    match state.report_service.make_report(&patient_id).await {
        Ok(report) => Ok(Json(report.into())),
        Err(ReportError::PatientNotFound(_)) => {
            Err((StatusCode::NOT_FOUND, "No patient found with the given id"))
        }
        Err(ReportError::Unavailable(reason)) => {
            tracing::error!(patient_id = %patient_id, reason = %reason, "patient sources unavailable");
            Err((StatusCode::SERVICE_UNAVAILABLE, "Patient sources unavailable"))
        }
        Err(e) => {
            tracing::error!(patient_id = %patient_id, "report error: {:?}", e);
            Err((StatusCode::INTERNAL_SERVER_ERROR, "Internal error"))
        }
    }
}

#[utoipa::path(
    delete,
    path = "/cache/{id}",
    responses(
        (status = 204, description = "Cached patient evicted"),
        (status = 400, description = "Invalid patient id"),
        (status = 404, description = "Patient was not cached")
    )
)]
/// Evict a cached patient record
///
/// Administrative cache-busting: drops the cached record for the given id
/// so the next report request re-fetches it from the remote sources. The
/// report path itself never calls this.
///
/// # Returns
/// * `204 No Content` - The entry existed and was removed
/// * `404 Not Found` - Nothing was cached under the id
#[axum::debug_handler]
async fn invalidate_cache(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> Result<StatusCode, (StatusCode, &'static str)> {
    let patient_id = match PatientId::new(&id) {
        Ok(patient_id) => patient_id,
        Err(e) => {
            tracing::warn!(raw_id = %id, error = %e, "rejected patient id");
            return Err((StatusCode::BAD_REQUEST, "Invalid patient id"));
        }
    };

    if state.report_service.invalidate_cached_patient(&patient_id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err((StatusCode::NOT_FOUND, "Patient was not cached"))
    }
}
