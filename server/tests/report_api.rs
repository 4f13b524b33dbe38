//! HTTP round trip: submit, let the worker pool run, poll, download

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tower::ServiceExt;

use insight_server::api::auth::create_token;
use insight_server::api::{AuthState, ReportsApiState, build_router};
use insight_server::core::ShutdownService;
use insight_server::data::grants::UsersFile;
use insight_server::data::{BackendError, BackendTransport, FileArtifactSink, FileGrantSource, Row};
use insight_server::domain::access::AccessFilterResolver;
use insight_server::domain::query::{CompiledQuery, QueryCompiler};
use insight_server::domain::reports::{
    DimensionValuesService, JobExecutor, JobRegistry, ReportService, WorkerPool,
};
use insight_server::domain::schema::{DatasourceSchema, Field, SchemaCatalog, SchemaStore};

const SECRET: &str = "integration-secret";

/// Backend double answering every query with the same groupBy payload
struct CannedBackend {
    rows: Vec<Row>,
    seen: Mutex<Vec<CompiledQuery>>,
}

#[async_trait]
impl BackendTransport for CannedBackend {
    async fn execute(&self, query: &CompiledQuery) -> Result<Vec<Row>, BackendError> {
        self.seen.lock().push(query.clone());
        Ok(self.rows.clone())
    }
}

struct Harness {
    router: Router,
    shutdown: ShutdownService,
    backend: Arc<CannedBackend>,
    _dir: tempfile::TempDir,
}

async fn harness(rows: Vec<Row>) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let schemas = Arc::new(SchemaStore::new(SchemaCatalog::default().with_datasource(
        "sales",
        DatasourceSchema::new("sales_v2")
            .dimension("browser", Field::physical("browser"))
            .dimension("partner", Field::physical("partner_id").reserved())
            .metric("revenue", Field::physical("rev_eur")),
    )));
    let sink = FileArtifactSink::new(dir.path().to_path_buf());
    let users: UsersFile = serde_json::from_value(json!({
        "users": { "bob": { "access": { "sales": { "browser": ["firefox"] } } } }
    }))
    .unwrap();
    let resolver = AccessFilterResolver::new(Arc::new(FileGrantSource::new(users)));
    let backend = Arc::new(CannedBackend {
        rows,
        seen: Mutex::new(Vec::new()),
    });
    let values = Arc::new(DimensionValuesService::new(
        schemas.clone(),
        resolver.clone(),
        backend.clone(),
        Duration::from_secs(60),
    ));
    let executor = Arc::new(JobExecutor::new(
        schemas.clone(),
        QueryCompiler::new(resolver),
        backend.clone(),
        Arc::new(sink.clone()),
    ));
    let registry = Arc::new(JobRegistry::new());
    let reports = Arc::new(ReportService::new(
        registry.clone(),
        schemas,
        sink,
        None,
    ));

    let shutdown = ShutdownService::new();
    let pool = WorkerPool::new(registry, executor, 2, Duration::from_millis(10));
    shutdown
        .register_all(pool.start(shutdown.subscribe()))
        .await;

    let contexts = BTreeMap::from([("dash.example.com".to_string(), "dashboard".to_string())]);
    let state = ReportsApiState {
        reports,
        values,
        contexts: Arc::new(contexts),
    };
    Harness {
        router: build_router(state, AuthState::new(SECRET)),
        shutdown,
        backend,
        _dir: dir,
    }
}

fn bearer(user: &str) -> String {
    let token = create_token(SECRET.as_bytes(), user, false, chrono::Duration::minutes(5)).unwrap();
    format!("Bearer {}", token)
}

fn get(uri: &str, user: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::AUTHORIZATION, bearer(user))
        .body(Body::empty())
        .unwrap()
}

fn post_json(uri: &str, user: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::AUTHORIZATION, bearer(user))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, bytes.to_vec())
}

async fn send_json(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let (status, bytes) = send(router, request).await;
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn wait_for_terminal(router: &Router, id: &str, user: &str) -> Value {
    for _ in 0..200 {
        let (status, body) =
            send_json(router, get(&format!("/api/reports/status?id={}", id), user)).await;
        assert_eq!(status, StatusCode::OK);
        match body["status"].as_str() {
            Some("waiting") | Some("processing") => {
                tokio::time::sleep(Duration::from_millis(10)).await
            }
            _ => return body,
        }
    }
    panic!("report {} never finished", id);
}

fn row(value: Value) -> Row {
    value.as_object().unwrap().clone()
}

#[tokio::test]
async fn report_round_trip() {
    let h = harness(vec![
        row(json!({ "browser": "firefox", "revenue": 12.5 })),
        row(json!({ "browser": "chrome, mobile", "revenue": 3 })),
    ])
    .await;

    let (status, body) = send_json(
        &h.router,
        post_json(
            "/api/reports/execute",
            "alice",
            json!({ "datasource": "sales", "dimensions": ["browser"], "metrics": ["revenue"] }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let id = body["id"].as_str().unwrap().to_string();

    let finished = wait_for_terminal(&h.router, &id, "alice").await;
    assert_eq!(finished["status"], "complete");
    assert_eq!(
        finished["csv"],
        json!(format!("/api/reports/download?id={}&type=csv", id))
    );

    let (status, csv) = send(
        &h.router,
        get(&format!("/api/reports/download?id={}&type=csv", id), "alice"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        String::from_utf8(csv).unwrap(),
        "browser,revenue\nfirefox,12.5\n\"chrome, mobile\",3\n"
    );

    let (status, xlsx) = send(
        &h.router,
        get(&format!("/api/reports/download?id={}&type=excel", id), "alice"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(xlsx.starts_with(b"PK"));

    // Another user can neither poll nor download it
    let (status, _) = send(
        &h.router,
        get(&format!("/api/reports/status?id={}", id), "bob"),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    h.shutdown.shutdown().await;
}

#[tokio::test]
async fn zero_rows_still_produce_header_only_csv() {
    let h = harness(Vec::new()).await;

    let (_, body) = send_json(
        &h.router,
        post_json(
            "/api/reports/execute",
            "alice",
            json!({ "datasource": "sales", "dimensions": ["browser"], "metrics": ["revenue"] }),
        ),
    )
    .await;
    let id = body["id"].as_str().unwrap().to_string();
    assert_eq!(wait_for_terminal(&h.router, &id, "alice").await["status"], "complete");

    let (status, csv) = send(
        &h.router,
        get(&format!("/api/reports/download?id={}", id), "alice"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(String::from_utf8(csv).unwrap(), "browser,revenue\n");

    h.shutdown.shutdown().await;
}

#[tokio::test]
async fn rejected_submission_lists_every_problem() {
    let h = harness(Vec::new()).await;

    let (status, body) = send_json(
        &h.router,
        post_json(
            "/api/reports/execute",
            "alice",
            json!({ "datasource": "sales", "dimensions": ["partner", "city"], "metrics": ["revenue"] }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(
        body["problems"],
        json!(["dimension:partner:forbidden", "dimension:city:unknown"])
    );

    h.shutdown.shutdown().await;
}

#[tokio::test]
async fn requests_without_token_are_unauthorized() {
    let h = harness(Vec::new()).await;

    let request = Request::builder()
        .uri("/api/schema")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send_json(&h.router, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "AUTH_REQUIRED");

    let request = Request::builder()
        .uri("/api/health")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&h.router, request).await;
    assert_eq!(status, StatusCode::OK);

    h.shutdown.shutdown().await;
}

#[tokio::test]
async fn bad_requests() {
    let h = harness(Vec::new()).await;

    let (status, body) = send_json(
        &h.router,
        post_json("/api/reports/execute", "alice", json!({ "metrics": ["revenue"] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "DATASOURCE_MISSING");

    let (status, body) = send_json(
        &h.router,
        post_json(
            "/api/reports/execute",
            "alice",
            json!({ "datasource": "sales", "dates": ["2024-02-01", "2024-01-01"] }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_BODY");

    let (status, _) = send(&h.router, get("/api/reports/status", "alice")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, body) = send_json(&h.router, get("/api/reports/status?id=nope", "alice")).await;
    assert_eq!(body["status"], "unknown");

    let (status, _) = send(
        &h.router,
        get("/api/reports/download?id=nope", "alice"),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    h.shutdown.shutdown().await;
}

#[tokio::test]
async fn schema_listing_hides_reserved_fields() {
    let h = harness(Vec::new()).await;

    let (status, body) = send_json(&h.router, get("/api/schema", "alice")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sales"]["dimensions"], json!(["browser"]));
    assert_eq!(body["sales"]["metrics"], json!([{ "name": "revenue" }]));

    h.shutdown.shutdown().await;
}

#[tokio::test]
async fn origin_header_sets_query_context() {
    let h = harness(Vec::new()).await;

    let spec = json!({ "datasource": "sales", "dimensions": ["browser"], "metrics": ["revenue"] });
    let mut request = post_json("/api/reports/execute", "alice", spec.clone());
    request
        .headers_mut()
        .insert(header::ORIGIN, "https://dash.example.com".parse().unwrap());
    let (_, body) = send_json(&h.router, request).await;
    let id = body["id"].as_str().unwrap().to_string();
    wait_for_terminal(&h.router, &id, "alice").await;

    let (_, body) = send_json(&h.router, post_json("/api/reports/execute", "alice", spec)).await;
    let id = body["id"].as_str().unwrap().to_string();
    wait_for_terminal(&h.router, &id, "alice").await;

    let contexts: Vec<String> = h
        .backend
        .seen
        .lock()
        .iter()
        .map(|q| q.context.as_ref().unwrap().application.clone())
        .collect();
    assert_eq!(contexts, vec!["dashboard", "direct"]);

    h.shutdown.shutdown().await;
}

#[tokio::test]
async fn filter_values_apply_grants_and_hide_reserved() {
    let h = harness(vec![
        row(json!({ "browser": "safari" })),
        row(json!({ "browser": "firefox" })),
        row(json!({ "browser": "safari" })),
    ])
    .await;

    let (status, body) = send_json(
        &h.router,
        post_json(
            "/api/filters/values",
            "bob",
            json!({ "datasource": "sales", "dimension": "browser", "date_start": "2024-01-01", "date_end": "2024-01-31" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["values"], json!(["firefox", "safari"]));
    {
        let seen = h.backend.seen.lock();
        let doc = serde_json::to_value(&seen[0]).unwrap();
        assert_eq!(
            doc["filter"],
            json!({ "type": "in", "dimension": "browser", "values": ["firefox"] })
        );
        assert_eq!(
            doc["intervals"],
            json!(["2024-01-01T00:00:00Z/2024-02-01T00:00:00Z"])
        );
    }

    let (status, body) = send_json(
        &h.router,
        post_json(
            "/api/filters/values",
            "alice",
            json!({ "datasource": "sales", "dimension": "partner" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "DIMENSION_FORBIDDEN");

    let (status, body) = send_json(
        &h.router,
        post_json("/api/filters/values", "alice", json!({ "datasource": "sales" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "MISSING_FIELDS");

    h.shutdown.shutdown().await;
}
