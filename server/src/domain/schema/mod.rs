//! Datasource schema: logical field names to backend names

mod error;
mod store;
mod types;

pub use error::SchemaLoadError;
pub use store::SchemaStore;
pub use types::{DatasourceSchema, Field, SchemaCatalog};
