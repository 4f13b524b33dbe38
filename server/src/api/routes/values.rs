//! Distinct dimension values for filter pickers

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};

use super::{ReportsApiState, request_context};
use crate::api::auth::AuthUser;
use crate::api::types::ApiError;
use crate::domain::reports::{DateRange, ValuesRequest};

/// `POST /api/filters/values` body. Dates apply only when both are set.
#[derive(Debug, Default, Deserialize)]
pub struct ValuesBody {
    #[serde(default)]
    pub datasource: String,
    #[serde(default)]
    pub dimension: String,
    #[serde(default)]
    pub date_start: Option<String>,
    #[serde(default)]
    pub date_end: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ValuesResponse {
    pub values: Vec<String>,
}

impl ValuesBody {
    fn into_request(self) -> Result<ValuesRequest, ApiError> {
        if self.datasource.is_empty() || self.dimension.is_empty() {
            return Err(ApiError::bad_request(
                "MISSING_FIELDS",
                "Fields 'datasource' and 'dimension' are required",
            ));
        }
        let dates = match (self.date_start.as_deref(), self.date_end.as_deref()) {
            (Some(start), Some(end)) if !start.is_empty() && !end.is_empty() => Some(
                DateRange::parse(start, end)
                    .map_err(|e| ApiError::bad_request("INVALID_DATES", e.to_string()))?,
            ),
            _ => None,
        };
        Ok(ValuesRequest {
            datasource: self.datasource,
            dimension: self.dimension,
            dates,
        })
    }
}

pub async fn dimension_values(
    State(state): State<ReportsApiState>,
    Extension(user): Extension<AuthUser>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ValuesResponse>, ApiError> {
    let body: ValuesBody = serde_json::from_slice(&body)
        .map_err(|e| ApiError::bad_request("INVALID_BODY", e.to_string()))?;
    let request = body.into_request()?;
    let context = request_context(&headers, &state.contexts);

    let values = state
        .values
        .values(&request, &user.username, user.is_admin, &context)
        .await?;
    Ok(Json(ValuesResponse { values }))
}
