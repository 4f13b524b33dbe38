//! Analytics backend transport
//!
//! The execution pipeline only sees [`BackendTransport`]; [`DruidClient`]
//! is the HTTP implementation.

mod client;
mod error;

pub use client::{DruidClient, flatten_rows};
pub use error::BackendError;

use async_trait::async_trait;

use crate::domain::query::CompiledQuery;

/// One flat result record keyed by output column name
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Single-shot query execution against the analytics backend
#[async_trait]
pub trait BackendTransport: Send + Sync {
    async fn execute(&self, query: &CompiledQuery) -> Result<Vec<Row>, BackendError>;
}
