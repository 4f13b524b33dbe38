//! Schema loading errors

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SchemaLoadError {
    #[error("IO error reading schema: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid schema JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid field {datasource}.{field}: {reason}")]
    InvalidField {
        datasource: String,
        field: String,
        reason: &'static str,
    },
}

impl SchemaLoadError {
    pub fn invalid(datasource: &str, field: &str, reason: &'static str) -> Self {
        Self::InvalidField {
            datasource: datasource.to_string(),
            field: field.to_string(),
            reason,
        }
    }
}
