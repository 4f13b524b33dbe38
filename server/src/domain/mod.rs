//! Domain logic
//!
//! - `schema` - datasource schema catalog and hot-swappable store
//! - `formula` - metric formula parsing and compilation
//! - `access` - per-user access filters and submission rights
//! - `query` - report spec to backend query compilation
//! - `reports` - job registry, worker pool and report service

pub mod access;
pub mod formula;
pub mod query;
pub mod reports;
pub mod schema;
