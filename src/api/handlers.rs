use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::data::{table, Params};
use crate::engine::{Eye, MultiMode};
use crate::error::EyeError;
use crate::query::{ValidationRequest, Verdict};

/// Application state shared across handlers
pub struct AppState {
    pub eye: Arc<Eye>,
}

// ============================================================================
// Health Check
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub name: String,
    pub version: &'static str,
}

pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        name: state.eye.name().to_string(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ============================================================================
// Verdicts
// ============================================================================

/// 200 for a passing verdict, 406 for a failing one
pub struct VerdictResponse(pub Verdict);

impl IntoResponse for VerdictResponse {
    fn into_response(self) -> Response {
        let status = if self.0.passed() {
            StatusCode::OK
        } else {
            StatusCode::NOT_ACCEPTABLE
        };
        (status, Json(self.0)).into_response()
    }
}

/// Query string of the validation endpoints
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ValidateParams {
    pub query: String,
    #[serde(alias = "evalExpr")]
    pub eval_expr: String,
    #[serde(alias = "regExpr")]
    pub reg_expr: String,
    pub all: bool,
}

impl ValidateParams {
    fn into_request(self) -> ValidationRequest {
        ValidationRequest::new(self.query)
            .with_eval(self.eval_expr)
            .with_regex(self.reg_expr)
            .with_all(self.all)
    }
}

// ============================================================================
// Services
// ============================================================================

#[derive(Serialize)]
pub struct ServicesResponse {
    pub services: Vec<String>,
}

pub async fn list_services(State(state): State<Arc<AppState>>) -> Json<ServicesResponse> {
    Json(ServicesResponse {
        services: state.eye.service_names(),
    })
}

pub async fn ping_service(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<VerdictResponse, ApiError> {
    Ok(VerdictResponse(state.eye.ping(&name).await?))
}

pub async fn validate_service(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Query(params): Query<ValidateParams>,
) -> Result<VerdictResponse, ApiError> {
    let verdict = state.eye.validate(&name, &params.into_request()).await?;
    Ok(VerdictResponse(verdict))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct QueryParams {
    pub query: String,
    /// One row per element of nested lists
    pub explode: bool,
    /// Drop rows whose `changed_value` column repeats for the same key
    pub changed_key: Option<String>,
    pub changed_value: Option<String>,
}

#[derive(Serialize)]
pub struct QueryResponse {
    pub service: String,
    pub records: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub columns: Vec<String>,
    pub rows: Vec<serde_json::Value>,
}

pub async fn query_service(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Query(params): Query<QueryParams>,
) -> Result<Json<QueryResponse>, ApiError> {
    let req = ValidationRequest::new(params.query);
    let records = state.eye.query(&name, &req).await?;
    let count = records.len();

    let tabular = params.explode || params.changed_key.is_some();
    let (columns, rows) = if tabular {
        let mut rows = table::explode(&records);
        if let (Some(key), Some(value)) = (&params.changed_key, &params.changed_value) {
            rows = table::collapse_unchanged(rows, key, value);
        }
        let columns = table::columns(&rows);
        (columns, rows.into_iter().map(serde_json::Value::Object).collect())
    } else {
        (Vec::new(), records.into_iter().map(|r| r.into_info()).collect())
    };

    Ok(Json(QueryResponse {
        service: name,
        records: count,
        columns,
        rows,
    }))
}

// ============================================================================
// Named checks, exporters and executors
// ============================================================================

#[derive(Serialize)]
pub struct ChecksResponse {
    pub checks: Vec<String>,
    pub exporters: Vec<String>,
    pub executors: Vec<String>,
}

pub async fn list_checks(State(state): State<Arc<AppState>>) -> Json<ChecksResponse> {
    Json(ChecksResponse {
        checks: state.eye.check_names(),
        exporters: state.eye.exporter_names(),
        executors: state.eye.executor_names(),
    })
}

pub async fn run_check(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<VerdictResponse, ApiError> {
    Ok(VerdictResponse(state.eye.check(&name).await?))
}

#[derive(Serialize)]
pub struct ExportResponse {
    pub exporter: String,
    pub file: String,
}

pub async fn run_exporter(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(params): Json<Params>,
) -> Result<Json<ExportResponse>, ApiError> {
    let file = state.eye.export(&name, &params).await?;
    Ok(Json(ExportResponse {
        exporter: name,
        file: file.to_string_lossy().to_string(),
    }))
}

pub async fn run_executor(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(params): Json<Params>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.eye.execute(&name, &params).await?;
    Ok(Json(serde_json::json!({ "executed": name })))
}

// ============================================================================
// Multi-service checks
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct MultiParams {
    /// Comma separated service names
    pub services: String,
    pub query: String,
    #[serde(alias = "evalExpr")]
    pub eval_expr: String,
    #[serde(alias = "regExpr")]
    pub reg_expr: String,
    pub all: bool,
    pub timeout_ms: Option<u64>,
}

pub async fn run_multi(
    State(state): State<Arc<AppState>>,
    Path(mode): Path<String>,
    Query(params): Query<MultiParams>,
) -> Result<VerdictResponse, ApiError> {
    let mode: MultiMode = mode.parse()?;
    let services: Vec<String> = params
        .services
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect();

    let mut run_params = Params::new();
    if let Some(timeout_ms) = params.timeout_ms {
        run_params.insert("timeout_ms", timeout_ms);
    }
    let req = ValidationRequest::new(params.query)
        .with_eval(params.eval_expr)
        .with_regex(params.reg_expr)
        .with_all(params.all);

    let verdict = state.eye.run_multi(mode, &services, &req, &run_params).await?;
    Ok(VerdictResponse(verdict))
}

// ============================================================================
// Error Handling
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Unavailable(String),
    Conflict(String),
    Internal(String),
}

impl From<EyeError> for ApiError {
    fn from(e: EyeError) -> Self {
        let message = e.to_string();
        match e {
            EyeError::NotFound(_) => ApiError::NotFound(message),
            EyeError::InvalidRequest(_) | EyeError::InvalidParams(_) | EyeError::Evaluation(_) => {
                ApiError::BadRequest(message)
            }
            EyeError::Unavailable(_) | EyeError::Timeout(_) => ApiError::Unavailable(message),
            EyeError::Closed(_) => ApiError::Conflict(message),
            _ => ApiError::Internal(message),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        let cases = [
            (EyeError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (EyeError::InvalidParams("x".into()), StatusCode::BAD_REQUEST),
            (EyeError::Unavailable("x".into()), StatusCode::SERVICE_UNAVAILABLE),
            (EyeError::Closed("x".into()), StatusCode::CONFLICT),
            (EyeError::Backend("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (error, status) in cases {
            let response = ApiError::from(error).into_response();
            assert_eq!(response.status(), status);
        }
    }

    #[test]
    fn test_verdict_status() {
        let pass = VerdictResponse(Verdict::pass("a", "ok")).into_response();
        assert_eq!(pass.status(), StatusCode::OK);
        let fail = VerdictResponse(Verdict::fail("a", "no")).into_response();
        assert_eq!(fail.status(), StatusCode::NOT_ACCEPTABLE);
    }
}
