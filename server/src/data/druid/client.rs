use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::{BackendError, BackendTransport, Row};
use crate::domain::query::CompiledQuery;

/// Query endpoint path below the backend base URL
const QUERY_PATH: &str = "/druid/v2/";

/// Longest error body kept in a [`BackendError::Status`]
const MAX_ERROR_BODY: usize = 512;

#[derive(Debug, Clone)]
pub struct DruidClient {
    client: reqwest::Client,
    endpoint: String,
}

impl DruidClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let endpoint = format!("{}{}", base_url.trim_end_matches('/'), QUERY_PATH);
        tracing::debug!(endpoint = %endpoint, timeout_secs = timeout.as_secs(), "Backend client initialized");
        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl BackendTransport for DruidClient {
    async fn execute(&self, query: &CompiledQuery) -> Result<Vec<Row>, BackendError> {
        let resp = self.client.post(&self.endpoint).json(query).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let mut body = resp.text().await.unwrap_or_default();
            if body.len() > MAX_ERROR_BODY {
                let cut = (0..=MAX_ERROR_BODY)
                    .rev()
                    .find(|i| body.is_char_boundary(*i))
                    .unwrap_or(0);
                body.truncate(cut);
            }
            return Err(BackendError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let payload: Value = resp
            .json()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))?;
        flatten_rows(payload)
    }
}

/// Unwrap groupBy rows (`[{version, timestamp, event: {...}}]`) into flat
/// records. Rows without an `event` object are taken as already flat.
pub fn flatten_rows(payload: Value) -> Result<Vec<Row>, BackendError> {
    let Value::Array(items) = payload else {
        return Err(BackendError::Decode("expected a JSON array".to_string()));
    };

    items
        .into_iter()
        .map(|item| match item {
            Value::Object(mut obj) => match obj.remove("event") {
                Some(Value::Object(event)) => Ok(event),
                Some(other) => {
                    obj.insert("event".to_string(), other);
                    Ok(obj)
                }
                None => Ok(obj),
            },
            other => Err(BackendError::Decode(format!(
                "expected an object row, got {}",
                other
            ))),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use parking_lot::Mutex;
    use serde_json::json;

    use super::*;
    use crate::domain::query::{ALL_TIME_INTERVAL, Aggregation};

    fn query() -> CompiledQuery {
        CompiledQuery {
            query_type: "groupBy",
            data_source: "sales_v2".into(),
            dimensions: vec![],
            aggregations: vec![Aggregation::double_sum("revenue", "rev_eur")],
            post_aggregations: vec![],
            filter: None,
            intervals: vec![ALL_TIME_INTERVAL.into()],
            granularity: "all".into(),
            context: None,
        }
    }

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[test]
    fn test_flatten_group_by_rows() {
        let rows = flatten_rows(json!([
            { "version": "v1", "timestamp": "2024-01-01T00:00:00Z", "event": { "revenue": 1.5 } },
            { "revenue": 2.5 }
        ]))
        .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["revenue"], json!(1.5));
        assert!(rows[0].get("version").is_none());
        assert_eq!(rows[1]["revenue"], json!(2.5));
    }

    #[test]
    fn test_flatten_rejects_non_array() {
        assert!(matches!(
            flatten_rows(json!({ "error": "boom" })),
            Err(BackendError::Decode(_))
        ));
        assert!(matches!(
            flatten_rows(json!([1, 2])),
            Err(BackendError::Decode(_))
        ));
    }

    #[test]
    fn test_endpoint_joins_base_url() {
        let client = DruidClient::new("http://broker:8082/", Duration::from_secs(5)).unwrap();
        assert_eq!(client.endpoint(), "http://broker:8082/druid/v2/");
    }

    #[tokio::test]
    async fn test_execute_posts_query_document() {
        let seen: Arc<Mutex<Option<Value>>> = Arc::default();
        let router = Router::new()
            .route(
                "/druid/v2/",
                post(
                    |State(seen): State<Arc<Mutex<Option<Value>>>>, Json(body): Json<Value>| async move {
                        *seen.lock() = Some(body);
                        Json(json!([{ "event": { "revenue": 42 } }]))
                    },
                ),
            )
            .with_state(seen.clone());
        let base = serve(router).await;

        let client = DruidClient::new(&base, Duration::from_secs(5)).unwrap();
        let rows = client.execute(&query()).await.unwrap();

        assert_eq!(rows[0]["revenue"], json!(42));
        let body = seen.lock().clone().unwrap();
        assert_eq!(body["queryType"], "groupBy");
        assert_eq!(body["dataSource"], "sales_v2");
    }

    #[tokio::test]
    async fn test_execute_maps_error_status() {
        let router = Router::new().route(
            "/druid/v2/",
            post(|| async { (StatusCode::BAD_REQUEST, "Unknown datasource") }),
        );
        let base = serve(router).await;

        let client = DruidClient::new(&base, Duration::from_secs(5)).unwrap();
        let err = client.execute(&query()).await.unwrap_err();
        assert!(matches!(
            err,
            BackendError::Status { status: 400, ref body } if body == "Unknown datasource"
        ));
    }
}
