//! Distinct dimension values for filter pickers
//!
//! Each lookup is a one-dimension groupBy compiled exactly like a report,
//! so the caller's access filters apply. Results are cached per user,
//! datasource, dimension and date range until the TTL runs out.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde_json::Value;
use thiserror::Error;

use super::spec::{DateRange, ReportSpec};
use crate::data::druid::{BackendError, BackendTransport, Row};
use crate::domain::access::AccessFilterResolver;
use crate::domain::query::{CompileError, compile_query};
use crate::domain::schema::SchemaStore;

#[derive(Error, Debug)]
pub enum ValuesError {
    #[error("unknown datasource: {0}")]
    UnknownDatasource(String),

    #[error("unknown dimension: {0}")]
    UnknownDimension(String),

    #[error("dimension {0} is reserved")]
    Forbidden(String),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValuesRequest {
    pub datasource: String,
    pub dimension: String,
    pub dates: Option<DateRange>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ValuesKey {
    username: String,
    is_admin: bool,
    datasource: String,
    dimension: String,
    dates: Option<DateRange>,
}

struct CachedValues {
    values: Vec<String>,
    expires_at: Instant,
}

pub struct DimensionValuesService {
    schemas: Arc<SchemaStore>,
    resolver: AccessFilterResolver,
    transport: Arc<dyn BackendTransport>,
    cache: DashMap<ValuesKey, CachedValues>,
    ttl: Duration,
}

impl DimensionValuesService {
    pub fn new(
        schemas: Arc<SchemaStore>,
        resolver: AccessFilterResolver,
        transport: Arc<dyn BackendTransport>,
        ttl: Duration,
    ) -> Self {
        Self {
            schemas,
            resolver,
            transport,
            cache: DashMap::new(),
            ttl,
        }
    }

    /// Sorted distinct values of one dimension as visible to `username`
    pub async fn values(
        &self,
        request: &ValuesRequest,
        username: &str,
        is_admin: bool,
        context: &str,
    ) -> Result<Vec<String>, ValuesError> {
        let catalog = self.schemas.snapshot();
        let schema = catalog
            .get_datasource(&request.datasource)
            .ok_or_else(|| ValuesError::UnknownDatasource(request.datasource.clone()))?;
        let field = schema
            .dimensions
            .get(&request.dimension)
            .ok_or_else(|| ValuesError::UnknownDimension(request.dimension.clone()))?;
        if field.reserved && !is_admin {
            return Err(ValuesError::Forbidden(request.dimension.clone()));
        }

        let key = ValuesKey {
            username: username.to_string(),
            is_admin,
            datasource: request.datasource.clone(),
            dimension: request.dimension.clone(),
            dates: request.dates,
        };
        if let Some(values) = self.cached(&key) {
            tracing::trace!(username, dimension = %request.dimension, "Dimension values from cache");
            return Ok(values);
        }

        let access = self
            .resolver
            .resolve(username, is_admin, &request.datasource, schema)
            .await
            .map_err(CompileError::from)?;
        let mut spec = ReportSpec::new(&[request.dimension.as_str()], &[]);
        spec.dates = request.dates;
        let query = compile_query(schema, &spec, access.as_ref(), Some(context))?;
        if tracing::enabled!(tracing::Level::DEBUG) {
            let document = serde_json::to_string(&query).unwrap_or_default();
            tracing::debug!(username, query = %document, "Dimension values query");
        }

        let rows = self.transport.execute(&query).await?;
        let values = distinct_values(&rows, &request.dimension);
        self.cache.insert(
            key,
            CachedValues {
                values: values.clone(),
                expires_at: Instant::now() + self.ttl,
            },
        );
        Ok(values)
    }

    fn cached(&self, key: &ValuesKey) -> Option<Vec<String>> {
        let now = Instant::now();
        if let Some(entry) = self.cache.get(key)
            && now < entry.expires_at
        {
            return Some(entry.values.clone());
        }
        self.cache.remove_if(key, |_, entry| now >= entry.expires_at);
        None
    }

    /// Drop expired entries, returning how many were removed
    pub fn evict_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.cache.len();
        self.cache.retain(|_, entry| now < entry.expires_at);
        before.saturating_sub(self.cache.len())
    }
}

/// Null and missing cells are skipped; non-string values use their JSON text
fn distinct_values(rows: &[Row], column: &str) -> Vec<String> {
    rows.iter()
        .filter_map(|row| match row.get(column)? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        })
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
