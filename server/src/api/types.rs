//! Shared API types
//!
//! Every handler error goes through [`ApiError`], which renders the
//! `{error, code, message}` envelope. Internal details are logged, not
//! returned.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::domain::access::RightsProblem;
use crate::domain::reports::{LookupError, SubmitError, ValuesError};

/// Standard API error response
#[derive(Debug)]
pub enum ApiError {
    BadRequest { code: String, message: String },
    Unauthorized { code: String, message: String },
    Forbidden { code: String, message: String },
    NotFound { code: String, message: String },
    Conflict { code: String, message: String },
    Gone { code: String, message: String },
    /// Submission refused; every problem code is returned
    Rejected { problems: Vec<RightsProblem> },
    Internal { message: String },
}

impl ApiError {
    pub fn bad_request(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BadRequest {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn unauthorized(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Unauthorized {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn forbidden(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Forbidden {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn not_found(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::NotFound {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl From<SubmitError> for ApiError {
    fn from(e: SubmitError) -> Self {
        match e {
            SubmitError::Rejected(problems) => Self::Rejected { problems },
        }
    }
}

impl From<LookupError> for ApiError {
    fn from(e: LookupError) -> Self {
        let message = e.to_string();
        match e {
            LookupError::NotFound => Self::not_found("REPORT_NOT_FOUND", message),
            LookupError::Forbidden => Self::forbidden("REPORT_FORBIDDEN", message),
            LookupError::NotReady => Self::Conflict {
                code: "REPORT_NOT_READY".to_string(),
                message,
            },
            LookupError::Gone => Self::Gone {
                code: "REPORT_EXPIRED".to_string(),
                message,
            },
        }
    }
}

impl From<ValuesError> for ApiError {
    fn from(e: ValuesError) -> Self {
        let message = e.to_string();
        match e {
            ValuesError::UnknownDatasource(_) => Self::bad_request("DATASOURCE_NOT_FOUND", message),
            ValuesError::UnknownDimension(_) => Self::bad_request("DIMENSION_NOT_FOUND", message),
            ValuesError::Forbidden(_) => Self::forbidden("DIMENSION_FORBIDDEN", message),
            ValuesError::Compile(_) | ValuesError::Backend(_) => {
                tracing::error!(error = %message, "Dimension values lookup failed");
                Self::internal("Failed to fetch dimension values")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, code, message) = match self {
            Self::BadRequest { code, message } => {
                (StatusCode::BAD_REQUEST, "bad_request", code, message)
            }
            Self::Unauthorized { code, message } => {
                (StatusCode::UNAUTHORIZED, "unauthorized", code, message)
            }
            Self::Forbidden { code, message } => {
                (StatusCode::FORBIDDEN, "forbidden", code, message)
            }
            Self::NotFound { code, message } => (StatusCode::NOT_FOUND, "not_found", code, message),
            Self::Conflict { code, message } => (StatusCode::CONFLICT, "conflict", code, message),
            Self::Gone { code, message } => (StatusCode::GONE, "gone", code, message),
            Self::Rejected { problems } => {
                let message = format!("Report rejected ({} problem(s))", problems.len());
                return (
                    StatusCode::FORBIDDEN,
                    Json(json!({
                        "error": "forbidden",
                        "code": "REPORT_REJECTED",
                        "message": message,
                        "problems": problems,
                    })),
                )
                    .into_response();
            }
            Self::Internal { message } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "INTERNAL".to_string(),
                message,
            ),
        };
        (
            status,
            Json(json!({
                "error": error_type,
                "code": code,
                "message": message
            })),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::access::FieldKind;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_error_envelope() {
        let response = ApiError::bad_request("MISSING_ID", "Missing id").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"], "bad_request");
        assert_eq!(body["code"], "MISSING_ID");
        assert_eq!(body["message"], "Missing id");
    }

    #[tokio::test]
    async fn test_rejected_lists_problems() {
        let err: ApiError = SubmitError::Rejected(vec![
            RightsProblem::DatasourceNotFound,
            RightsProblem::Forbidden {
                kind: FieldKind::Metric,
                name: "margin".into(),
            },
        ])
        .into();
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = body_json(response).await;
        assert_eq!(
            body["problems"],
            json!(["datasource_not_found", "metric:margin:forbidden"])
        );
    }

    #[test]
    fn test_lookup_error_status() {
        let status = |e: LookupError| ApiError::from(e).into_response().status();
        assert_eq!(status(LookupError::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(status(LookupError::Forbidden), StatusCode::FORBIDDEN);
        assert_eq!(status(LookupError::NotReady), StatusCode::CONFLICT);
        assert_eq!(status(LookupError::Gone), StatusCode::GONE);
    }

    #[tokio::test]
    async fn test_values_error_mapping() {
        let status = |e: ValuesError| ApiError::from(e).into_response().status();
        assert_eq!(
            status(ValuesError::UnknownDimension("city".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status(ValuesError::Forbidden("partner".into())),
            StatusCode::FORBIDDEN
        );

        let response = ApiError::from(ValuesError::Backend(
            crate::data::druid::BackendError::Status {
                status: 500,
                body: "secret internals".into(),
            },
        ))
        .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["message"], "Failed to fetch dimension values");
    }
}
