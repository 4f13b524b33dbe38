//! Per-user access filter resolution

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::data::grants::GrantError;
use crate::domain::schema::{DatasourceSchema, Field};

/// Allowed values per logical dimension, in dimension-name order
pub type AccessFilters = BTreeMap<String, Vec<String>>;

/// Where per-user grants come from (static file, SQL query, ...)
#[async_trait]
pub trait GrantSource: Send + Sync {
    async fn allowed_values(
        &self,
        username: &str,
        datasource: &str,
        dimension: &str,
        field: &Field,
    ) -> Result<Vec<String>, GrantError>;
}

/// Resolves the row-level restrictions that apply to one caller
#[derive(Clone)]
pub struct AccessFilterResolver {
    source: Arc<dyn GrantSource>,
}

impl AccessFilterResolver {
    pub fn new(source: Arc<dyn GrantSource>) -> Self {
        Self { source }
    }

    /// `None` means unrestricted (admins). Dimensions without grants are
    /// omitted, which leaves them unrestricted.
    pub async fn resolve(
        &self,
        username: &str,
        is_admin: bool,
        datasource: &str,
        schema: &DatasourceSchema,
    ) -> Result<Option<AccessFilters>, GrantError> {
        if is_admin {
            return Ok(None);
        }

        let mut filters = AccessFilters::new();
        for (dimension, field) in &schema.dimensions {
            let values = self
                .source
                .allowed_values(username, datasource, dimension, field)
                .await?;
            if !values.is_empty() {
                filters.insert(dimension.clone(), values);
            }
        }

        tracing::trace!(
            username,
            datasource,
            restricted = filters.len(),
            "Access filters resolved"
        );
        Ok(Some(filters))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct CountingSource {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl GrantSource for CountingSource {
        async fn allowed_values(
            &self,
            username: &str,
            _datasource: &str,
            dimension: &str,
            _field: &Field,
        ) -> Result<Vec<String>, GrantError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(match (username, dimension) {
                ("alice", "country") => vec!["FR".to_string(), "BE".to_string()],
                ("alice", "device") => vec![],
                _ => vec![],
            })
        }
    }

    fn schema() -> DatasourceSchema {
        DatasourceSchema::new("sales")
            .dimension("country", Field::physical("country_code"))
            .dimension("device", Field::physical("device"))
    }

    #[tokio::test]
    async fn test_admin_short_circuits() {
        let source = Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
        });
        let resolver = AccessFilterResolver::new(source.clone());

        let filters = resolver
            .resolve("alice", true, "sales", &schema())
            .await
            .unwrap();

        assert!(filters.is_none());
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_grants_omitted() {
        let source = Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
        });
        let resolver = AccessFilterResolver::new(source.clone());

        let filters = resolver
            .resolve("alice", false, "sales", &schema())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(filters.len(), 1);
        assert_eq!(filters["country"], vec!["FR", "BE"]);
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_user_without_grants_is_unrestricted_but_not_none() {
        let resolver = AccessFilterResolver::new(Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
        }));
        let filters = resolver
            .resolve("bob", false, "sales", &schema())
            .await
            .unwrap();
        assert_eq!(filters, Some(AccessFilters::new()));
    }
}
