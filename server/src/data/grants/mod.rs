//! Access-grant storage
//!
//! Two interchangeable [`GrantSource`](crate::domain::access::GrantSource)
//! implementations:
//! - `file` - static per-user grants from a users JSON file
//! - `sql` - per-dimension access queries run against SQLite or PostgreSQL

mod file;
mod sql;

pub use file::{FileGrantSource, UserEntry, UsersFile};
pub use sql::SqlGrantSource;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GrantError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid users file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Grant query failed for {dimension}: {source}")]
    Query {
        dimension: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}
