//! Report submission, status polling and downloads

use axum::body::{Body, Bytes};
use axum::extract::{Query, State};
use axum::http::{HeaderMap, header};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};

use super::{ReportsApiState, request_context};
use crate::api::auth::AuthUser;
use crate::api::types::ApiError;
use crate::data::artifacts::ArtifactKind;
use crate::domain::reports::{ReportSpec, ReportStatus};

const DOWNLOAD_PATH: &str = "/api/reports/download";

/// `POST /api/reports/execute` body: the report spec plus its datasource
#[derive(Debug, Deserialize)]
pub struct ExecuteRequest {
    #[serde(default)]
    pub datasource: String,
    #[serde(flatten)]
    pub spec: ReportSpec,
}

#[derive(Debug, Serialize)]
pub struct ExecuteResponse {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    pub id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: ReportStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub csv: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub excel: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

fn require_id(id: Option<String>) -> Result<String, ApiError> {
    id.filter(|i| !i.is_empty())
        .ok_or_else(|| ApiError::bad_request("MISSING_ID", "Query parameter 'id' is required"))
}

/// `csv` when absent; `excel` and `xlsx` both mean the workbook
fn parse_kind(kind: Option<&str>) -> Result<ArtifactKind, ApiError> {
    match kind.map(|k| k.to_ascii_lowercase()).as_deref() {
        None | Some("") | Some("csv") => Ok(ArtifactKind::Csv),
        Some("excel") | Some("xlsx") => Ok(ArtifactKind::Xlsx),
        Some(other) => Err(ApiError::bad_request(
            "INVALID_TYPE",
            format!("Unknown download type '{}', expected csv or excel", other),
        )),
    }
}

fn download_url(id: &str, kind: &str) -> String {
    format!("{}?id={}&type={}", DOWNLOAD_PATH, id, kind)
}

/// Queue a report. Returns as soon as the job is registered.
pub async fn execute(
    State(state): State<ReportsApiState>,
    Extension(user): Extension<AuthUser>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ExecuteResponse>, ApiError> {
    let request: ExecuteRequest = serde_json::from_slice(&body).map_err(|e| {
        tracing::debug!(user = %user.username, error = %e, "Invalid report request");
        ApiError::bad_request("INVALID_BODY", e.to_string())
    })?;
    if request.datasource.is_empty() {
        return Err(ApiError::bad_request(
            "DATASOURCE_MISSING",
            "Field 'datasource' is required",
        ));
    }

    let context = request_context(&headers, &state.contexts);
    let id = state.reports.submit(
        request.spec,
        &request.datasource,
        &user.username,
        user.is_admin,
        &context,
    )?;
    Ok(Json(ExecuteResponse { id }))
}

/// Poll a report. Download links are included once it is complete.
pub async fn status(
    State(state): State<ReportsApiState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<StatusResponse>, ApiError> {
    let id = require_id(query.id)?;
    let report = state.reports.status_for(&id, &user.username)?;

    let complete = report.status == ReportStatus::Complete;
    Ok(Json(StatusResponse {
        status: report.status,
        error: report.error,
        csv: complete.then(|| download_url(&id, "csv")),
        excel: complete.then(|| download_url(&id, "excel")),
    }))
}

/// Stream a finished artifact owned by the caller
pub async fn download(
    State(state): State<ReportsApiState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<DownloadQuery>,
) -> Result<Response, ApiError> {
    let id = require_id(query.id)?;
    let kind = parse_kind(query.kind.as_deref())?;
    let path = state.reports.artifact(&id, &user.username, kind)?;

    let bytes = tokio::fs::read(&path).await.map_err(|e| {
        tracing::error!(path = %path.display(), error = %e, "Failed to read report file");
        ApiError::internal("Could not read report file")
    })?;

    let file_name = format!("report_{}.{}", id.replace('"', ""), kind.extension());
    Ok((
        [
            (header::CONTENT_TYPE, kind.content_type().to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file_name),
            ),
        ],
        Body::from(bytes),
    )
        .into_response())
}
