//! Datasource schema listing

use std::collections::BTreeMap;

use axum::extract::State;
use axum::{Extension, Json};

use super::ReportsApiState;
use crate::api::auth::AuthUser;
use crate::domain::reports::DatasourceListing;

/// Datasources visible to the caller. Reserved fields only show for admins.
pub async fn list_schema(
    State(state): State<ReportsApiState>,
    Extension(user): Extension<AuthUser>,
) -> Json<BTreeMap<String, DatasourceListing>> {
    Json(state.reports.schema_listing(user.is_admin))
}
