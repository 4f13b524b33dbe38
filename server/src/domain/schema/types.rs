//! Datasource schema types
//!
//! Maps tenant-visible datasource, dimension and metric names to the
//! physical names the analytics backend knows about.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::error::SchemaLoadError;

/// One dimension or metric definition
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Field {
    /// Physical backend column name
    #[serde(default)]
    pub druid: String,
    /// Arithmetic definition over other metrics (metrics only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,
    /// Lookup table applied on read (dimensions only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lookup: Option<String>,
    /// Hidden from non-admin callers
    #[serde(default)]
    pub reserved: bool,
    /// Display hint ("bar", "line", ...)
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub display_type: Option<String>,
    /// Per-user grant query (dimensions only, SQL grant backend)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_query: Option<String>,
}

impl Field {
    pub fn physical(name: impl Into<String>) -> Self {
        Self {
            druid: name.into(),
            ..Default::default()
        }
    }

    pub fn with_formula(formula: impl Into<String>) -> Self {
        Self {
            formula: Some(formula.into()),
            ..Default::default()
        }
    }

    pub fn with_lookup(mut self, lookup: impl Into<String>) -> Self {
        self.lookup = Some(lookup.into());
        self
    }

    pub fn reserved(mut self) -> Self {
        self.reserved = true;
        self
    }

    /// Non-empty formula, if any
    pub fn formula(&self) -> Option<&str> {
        self.formula.as_deref().filter(|f| !f.trim().is_empty())
    }

    /// Non-empty lookup name, if any
    pub fn lookup(&self) -> Option<&str> {
        self.lookup.as_deref().filter(|l| !l.is_empty())
    }

    pub fn access_query(&self) -> Option<&str> {
        self.access_query.as_deref().filter(|q| !q.trim().is_empty())
    }
}

/// Schema of one datasource
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct DatasourceSchema {
    /// Physical datasource name in the backend
    #[serde(rename = "druid_name")]
    pub backend_name: String,
    #[serde(default)]
    pub dimensions: BTreeMap<String, Field>,
    #[serde(default)]
    pub metrics: BTreeMap<String, Field>,
}

impl DatasourceSchema {
    pub fn new(backend_name: impl Into<String>) -> Self {
        Self {
            backend_name: backend_name.into(),
            ..Default::default()
        }
    }

    pub fn dimension(mut self, name: impl Into<String>, field: Field) -> Self {
        self.dimensions.insert(name.into(), field);
        self
    }

    pub fn metric(mut self, name: impl Into<String>, field: Field) -> Self {
        self.metrics.insert(name.into(), field);
        self
    }
}

/// All datasources known to the service
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct SchemaCatalog {
    #[serde(default)]
    pub datasources: BTreeMap<String, DatasourceSchema>,
}

impl SchemaCatalog {
    pub fn get_datasource(&self, name: &str) -> Option<&DatasourceSchema> {
        self.datasources.get(name)
    }

    pub fn with_datasource(mut self, name: impl Into<String>, schema: DatasourceSchema) -> Self {
        self.datasources.insert(name.into(), schema);
        self
    }

    /// Parse and validate a catalog from JSON
    pub fn from_json(content: &str) -> Result<Self, SchemaLoadError> {
        let catalog: Self = serde_json::from_str(content)?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Every metric needs a formula or a physical name; every dimension a physical name
    pub fn validate(&self) -> Result<(), SchemaLoadError> {
        for (ds_name, ds) in &self.datasources {
            if ds.backend_name.is_empty() {
                return Err(SchemaLoadError::invalid(ds_name, "druid_name", "empty backend name"));
            }
            for (name, field) in &ds.metrics {
                if field.formula().is_none() && field.druid.is_empty() {
                    return Err(SchemaLoadError::invalid(
                        ds_name,
                        name,
                        "metric needs a formula or a druid name",
                    ));
                }
            }
            for (name, field) in &ds.dimensions {
                if field.druid.is_empty() {
                    return Err(SchemaLoadError::invalid(
                        ds_name,
                        name,
                        "dimension needs a druid name",
                    ));
                }
            }
        }
        Ok(())
    }
}
