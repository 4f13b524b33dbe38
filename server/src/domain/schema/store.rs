//! Reloadable schema snapshot holder
//!
//! Readers take an `Arc` snapshot and keep it for the whole compile, so a
//! reload swapping the pointer never exposes a half-updated catalog.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;

use super::error::SchemaLoadError;
use super::types::SchemaCatalog;

pub struct SchemaStore {
    current: RwLock<Arc<SchemaCatalog>>,
    path: Option<PathBuf>,
}

impl SchemaStore {
    /// In-memory store without a backing file (tests, embedding)
    pub fn new(catalog: SchemaCatalog) -> Self {
        Self {
            current: RwLock::new(Arc::new(catalog)),
            path: None,
        }
    }

    /// Load the catalog from a JSON file and remember the path for reloads
    pub fn load(path: &Path) -> Result<Self, SchemaLoadError> {
        let catalog = read_catalog(path)?;
        tracing::debug!(
            path = %path.display(),
            datasources = catalog.datasources.len(),
            "Schema loaded"
        );
        Ok(Self {
            current: RwLock::new(Arc::new(catalog)),
            path: Some(path.to_path_buf()),
        })
    }

    pub fn snapshot(&self) -> Arc<SchemaCatalog> {
        Arc::clone(&self.current.read())
    }

    pub fn replace(&self, catalog: SchemaCatalog) {
        *self.current.write() = Arc::new(catalog);
    }

    /// Re-read the backing file. On failure the previous snapshot stays active.
    pub fn reload(&self) -> Result<(), SchemaLoadError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let catalog = read_catalog(path)?;
        tracing::info!(
            path = %path.display(),
            datasources = catalog.datasources.len(),
            "Schema reloaded"
        );
        self.replace(catalog);
        Ok(())
    }
}

fn read_catalog(path: &Path) -> Result<SchemaCatalog, SchemaLoadError> {
    let content = fs::read_to_string(path)?;
    SchemaCatalog::from_json(&content)
}
