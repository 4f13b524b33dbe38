//! Data layer
//!
//! External collaborators of the report pipeline:
//! - `grants` - per-user access grants (users file, SQLite, PostgreSQL)
//! - `druid` - analytics backend transport
//! - `artifacts` - CSV/XLSX report files

pub mod artifacts;
pub mod druid;
pub mod grants;

pub use artifacts::{ArtifactKind, ArtifactPaths, ArtifactSink, FileArtifactSink};
pub use druid::{BackendError, BackendTransport, DruidClient, Row};
pub use grants::{FileGrantSource, GrantError, SqlGrantSource};
