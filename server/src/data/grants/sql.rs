//! Grants from per-dimension SQL access queries
//!
//! Each dimension may carry an `access_query` in the schema. It is run with
//! the username as its only bound parameter and must return one text
//! column of allowed values.

use std::str::FromStr;

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

use super::GrantError;
use crate::core::constants::GRANTS_MAX_CONNECTIONS;
use crate::domain::access::GrantSource;
use crate::domain::schema::Field;

pub enum SqlGrantSource {
    Sqlite(SqlitePool),
    Postgres(PgPool),
}

impl SqlGrantSource {
    pub async fn connect_sqlite(url: &str) -> Result<Self, GrantError> {
        let options = SqliteConnectOptions::from_str(url)?.read_only(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(GRANTS_MAX_CONNECTIONS)
            .connect_with(options)
            .await?;
        tracing::debug!("SQLite grant source connected");
        Ok(Self::Sqlite(pool))
    }

    pub async fn connect_postgres(url: &str) -> Result<Self, GrantError> {
        let options = PgConnectOptions::from_str(url)?;
        let pool = PgPoolOptions::new()
            .max_connections(GRANTS_MAX_CONNECTIONS)
            .connect_with(options)
            .await?;
        tracing::debug!("PostgreSQL grant source connected");
        Ok(Self::Postgres(pool))
    }

    pub async fn close(&self) {
        match self {
            Self::Sqlite(pool) => pool.close().await,
            Self::Postgres(pool) => pool.close().await,
        }
    }
}

#[async_trait]
impl GrantSource for SqlGrantSource {
    async fn allowed_values(
        &self,
        username: &str,
        _datasource: &str,
        dimension: &str,
        field: &Field,
    ) -> Result<Vec<String>, GrantError> {
        let Some(query) = field.access_query() else {
            return Ok(Vec::new());
        };

        let result = match self {
            Self::Sqlite(pool) => {
                sqlx::query_scalar::<_, String>(query)
                    .bind(username)
                    .fetch_all(pool)
                    .await
            }
            Self::Postgres(pool) => {
                sqlx::query_scalar::<_, String>(query)
                    .bind(username)
                    .fetch_all(pool)
                    .await
            }
        };

        result.map_err(|source| {
            tracing::warn!(dimension, error = %source, "Access query failed");
            GrantError::Query {
                dimension: dimension.to_string(),
                source,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup() -> SqlGrantSource {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(":memory:")
            .await
            .unwrap();
        sqlx::query("CREATE TABLE grants (username TEXT NOT NULL, country TEXT NOT NULL)")
            .execute(&pool)
            .await
            .unwrap();
        for (user, country) in [("alice", "FR"), ("alice", "BE"), ("bob", "DE")] {
            sqlx::query("INSERT INTO grants (username, country) VALUES (?, ?)")
                .bind(user)
                .bind(country)
                .execute(&pool)
                .await
                .unwrap();
        }
        SqlGrantSource::Sqlite(pool)
    }

    fn country() -> Field {
        Field {
            access_query: Some(
                "SELECT country FROM grants WHERE username = ? ORDER BY country".into(),
            ),
            ..Field::physical("country_code")
        }
    }

    #[tokio::test]
    async fn test_query_binds_username() {
        let source = setup().await;
        let values = source
            .allowed_values("alice", "sales", "country", &country())
            .await
            .unwrap();
        assert_eq!(values, vec!["BE", "FR"]);
    }

    #[tokio::test]
    async fn test_dimension_without_query_has_no_grants() {
        let source = setup().await;
        let values = source
            .allowed_values("alice", "sales", "browser", &Field::physical("browser"))
            .await
            .unwrap();
        assert!(values.is_empty());
    }

    #[tokio::test]
    async fn test_broken_query_fails_closed() {
        let source = setup().await;
        let field = Field {
            access_query: Some("SELECT nope FROM missing_table WHERE username = ?".into()),
            ..Field::physical("country_code")
        };
        let err = source
            .allowed_values("alice", "sales", "country", &field)
            .await
            .unwrap_err();
        assert!(matches!(err, GrantError::Query { ref dimension, .. } if dimension == "country"));
    }
}
