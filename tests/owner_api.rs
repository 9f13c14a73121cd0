#![allow(clippy::expect_used, clippy::unwrap_used)]

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header::AUTHORIZATION},
};
use http_body_util::BodyExt;
use relay::{
    dispatch::DeliveryConfig,
    notify::Notifier,
    router,
    state::AppState,
    vault::SecretVault,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::fs;
use tempfile::NamedTempFile;
use tower::ServiceExt;

struct TestDb {
    pool: sqlx::SqlitePool,
    _db_file: NamedTempFile,
}

async fn setup_db() -> TestDb {
    let db_file = NamedTempFile::new().expect("create temp sqlite file");
    let options = SqliteConnectOptions::new()
        .filename(db_file.path())
        .create_if_missing(true)
        .busy_timeout(std::time::Duration::from_millis(500));

    let mut conn = sqlx::SqliteConnection::connect_with(&options)
        .await
        .expect("connect sqlite");
    sqlx::query("PRAGMA foreign_keys = ON;")
        .execute(&mut conn)
        .await
        .expect("enable foreign keys");

    let mut entries: Vec<_> = fs::read_dir("migrations")
        .expect("read migrations dir")
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().and_then(|ext| ext.to_str()) == Some("sql"))
        .collect();
    entries.sort_by_key(|e| e.file_name());
    for entry in entries {
        let contents = fs::read_to_string(entry.path()).expect("read migration");
        for stmt in contents.split(';') {
            let stmt = stmt.trim();
            if !stmt.is_empty() {
                sqlx::query(stmt)
                    .execute(&mut conn)
                    .await
                    .expect("run migration");
            }
        }
    }

    use sqlx::Connection;
    conn.close().await.expect("close migration conn");

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .expect("connect pool");

    TestDb {
        pool,
        _db_file: db_file,
    }
}

fn test_state(pool: sqlx::SqlitePool, api_token: Option<&str>) -> AppState {
    let (notifier, _rx) = Notifier::channel(16);
    AppState {
        pool,
        vault: SecretVault::new([7u8; 32]),
        delivery: DeliveryConfig::default(),
        http: reqwest::Client::builder().build().expect("build client"),
        notifier,
        api_token: api_token.map(str::to_string),
        public_base_url: "http://relay.test".to_string(),
    }
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).expect("valid JSON body")
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: &serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn create_endpoint(app: &Router, name: &str) -> serde_json::Value {
    let response = app
        .clone()
        .oneshot(post_json(
            "/api/endpoints",
            &serde_json::json!({ "name": name }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    json_body(response).await
}

async fn ingest(app: &Router, path_token: &str, headers: &[(&str, &str)], body: &[u8]) -> serde_json::Value {
    let mut builder = Request::builder()
        .method("POST")
        .uri(format!("/webhook/{path_token}"));
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let response = app
        .clone()
        .oneshot(builder.body(Body::from(body.to_vec())).unwrap())
        .await
        .unwrap();
    json_body(response).await
}

// ─────────────────────────────────────────────────────────────────────────────
// Bearer-token guard
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn api_requires_token_when_configured() {
    let db = setup_db().await;
    let app = router::build(test_state(db.pool, Some("topsecret")));

    let response = app.clone().oneshot(get("/api/events")).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let wrong = Request::builder()
        .uri("/api/events")
        .header(AUTHORIZATION, "Bearer nope")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(wrong).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let right = Request::builder()
        .uri("/api/events")
        .header(AUTHORIZATION, "Bearer topsecret")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(right).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn receiver_stays_public_with_token_configured() {
    let db = setup_db().await;
    let state = test_state(db.pool.clone(), Some("topsecret"));
    let (endpoint, _secret) =
        relay::endpoints::store::create_endpoint(&state.pool, &state.vault, "o", "Hook", "")
            .await
            .unwrap();
    let app = router::build(state);

    let request = Request::builder()
        .method("POST")
        .uri(format!("/webhook/{}", endpoint.path_token))
        .body(Body::from("{}"))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn api_is_open_when_no_token_configured() {
    let db = setup_db().await;
    let app = router::build(test_state(db.pool, None));
    let response = app.oneshot(get("/api/events")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

// ─────────────────────────────────────────────────────────────────────────────
// Endpoint lifecycle and secret management
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn create_endpoint_returns_secret_exactly_once() {
    let db = setup_db().await;
    let app = router::build(test_state(db.pool.clone(), None));

    let created = create_endpoint(&app, "My Hook").await;
    let secret = created["secret"].as_str().unwrap();
    let path_token = created["endpoint"]["path_token"].as_str().unwrap();

    assert_eq!(created["endpoint"]["name"], "My Hook");
    assert_eq!(created["endpoint"]["status"], "active");
    assert_eq!(created["endpoint"]["owner_id"], "default");
    assert_eq!(secret.len(), 43);
    assert_eq!(
        created["webhook_url"],
        format!("http://relay.test/webhook/{path_token}")
    );
    assert_eq!(
        created["masked_secret"].as_str().unwrap(),
        format!("****{}", &secret[secret.len() - 4..])
    );

    // Only the encrypted form is persisted.
    let (stored,): (String,) = sqlx::query_as("SELECT encrypted_secret FROM endpoints")
        .fetch_one(&db.pool)
        .await
        .unwrap();
    assert_ne!(stored, secret);
    assert!(!stored.contains(secret));

    // The read path only exposes the masked form.
    let endpoint_id = created["endpoint"]["id"].as_str().unwrap();
    let fetched = app
        .clone()
        .oneshot(get(&format!("/api/endpoints/{endpoint_id}")))
        .await
        .unwrap();
    let fetched = json_body(fetched).await;
    assert_eq!(fetched["masked_secret"], created["masked_secret"]);
    assert!(fetched.get("secret").is_none());
}

#[tokio::test]
async fn create_endpoint_requires_name() {
    let db = setup_db().await;
    let app = router::build(test_state(db.pool, None));

    let response = app
        .oneshot(post_json(
            "/api/endpoints",
            &serde_json::json!({ "name": "  " }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["code"], "validation");
}

#[tokio::test]
async fn reveal_returns_current_plaintext() {
    let db = setup_db().await;
    let app = router::build(test_state(db.pool, None));

    let created = create_endpoint(&app, "Hook").await;
    let endpoint_id = created["endpoint"]["id"].as_str().unwrap().to_string();

    let revealed = app
        .oneshot(get(&format!("/api/endpoints/{endpoint_id}/secret")))
        .await
        .unwrap();
    assert_eq!(json_body(revealed).await["secret"], created["secret"]);
}

#[tokio::test]
async fn rotate_replaces_secret_and_masks_it() {
    let db = setup_db().await;
    let app = router::build(test_state(db.pool, None));

    let created = create_endpoint(&app, "Hook").await;
    let endpoint_id = created["endpoint"]["id"].as_str().unwrap().to_string();
    let old_secret = created["secret"].as_str().unwrap().to_string();

    let rotated = app
        .clone()
        .oneshot(post_json(
            &format!("/api/endpoints/{endpoint_id}/rotate-secret"),
            &serde_json::json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(rotated.status(), StatusCode::OK);
    let rotated = json_body(rotated).await;
    let new_secret = rotated["new_secret"].as_str().unwrap();
    assert_ne!(new_secret, old_secret);
    assert_eq!(
        rotated["masked_secret"].as_str().unwrap(),
        format!("****{}", &new_secret[new_secret.len() - 4..])
    );

    let revealed = app
        .oneshot(get(&format!("/api/endpoints/{endpoint_id}/secret")))
        .await
        .unwrap();
    assert_eq!(json_body(revealed).await["secret"], *new_secret);
}

#[tokio::test]
async fn rotate_unknown_endpoint_is_404() {
    let db = setup_db().await;
    let app = router::build(test_state(db.pool, None));

    let response = app
        .clone()
        .oneshot(post_json(
            &format!("/api/endpoints/{}/rotate-secret", uuid::Uuid::new_v4()),
            &serde_json::json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .oneshot(post_json(
            "/api/endpoints/not-a-uuid/rotate-secret",
            &serde_json::json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn list_endpoints_returns_all() {
    let db = setup_db().await;
    let app = router::build(test_state(db.pool, None));

    create_endpoint(&app, "First").await;
    create_endpoint(&app, "Second").await;

    let response = app.oneshot(get("/api/endpoints")).await.unwrap();
    let body = json_body(response).await;
    assert_eq!(body["endpoints"].as_array().unwrap().len(), 2);
}

// ─────────────────────────────────────────────────────────────────────────────
// Event listing and inspection
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn list_events_paginates_with_cursor() {
    let db = setup_db().await;
    let app = router::build(test_state(db.pool, None));

    let created = create_endpoint(&app, "Hook").await;
    let path_token = created["endpoint"]["path_token"].as_str().unwrap();

    let mut ingested = std::collections::HashSet::new();
    for i in 0..3 {
        let body = format!("{{\"n\":{i}}}");
        let accepted = ingest(&app, path_token, &[], body.as_bytes()).await;
        ingested.insert(accepted["event_id"].as_str().unwrap().to_string());
    }

    let response = app
        .clone()
        .oneshot(get("/api/events?limit=2"))
        .await
        .unwrap();
    let page_one = json_body(response).await;
    let first_batch = page_one["events"].as_array().unwrap();
    assert_eq!(first_batch.len(), 2);
    let cursor = page_one["next_before"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(get(&format!("/api/events?limit=2&before={cursor}")))
        .await
        .unwrap();
    let page_two = json_body(response).await;
    let second_batch = page_two["events"].as_array().unwrap();
    assert_eq!(second_batch.len(), 1);
    assert!(page_two["next_before"].is_null());

    let mut seen = std::collections::HashSet::new();
    for event in first_batch.iter().chain(second_batch.iter()) {
        seen.insert(event["id"].as_str().unwrap().to_string());
    }
    assert_eq!(seen, ingested);
}

#[tokio::test]
async fn list_events_filters_by_endpoint_status_and_duplicate() {
    let db = setup_db().await;
    let app = router::build(test_state(db.pool, None));

    let first = create_endpoint(&app, "First").await;
    let second = create_endpoint(&app, "Second").await;
    let first_token = first["endpoint"]["path_token"].as_str().unwrap();
    let second_token = second["endpoint"]["path_token"].as_str().unwrap();
    let first_id = first["endpoint"]["id"].as_str().unwrap();

    ingest(&app, first_token, &[], b"one").await;
    ingest(&app, first_token, &[], b"one").await; // duplicate by hash
    ingest(&app, second_token, &[("x-signature", "sha256=bogus")], b"two").await; // failed

    let response = app
        .clone()
        .oneshot(get(&format!("/api/events?endpoint_id={first_id}")))
        .await
        .unwrap();
    let body = json_body(response).await;
    assert_eq!(body["events"].as_array().unwrap().len(), 2);

    let response = app
        .clone()
        .oneshot(get("/api/events?status=failed"))
        .await
        .unwrap();
    let body = json_body(response).await;
    let failed = body["events"].as_array().unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0]["status"], "failed");

    let response = app
        .clone()
        .oneshot(get("/api/events?is_duplicate=true"))
        .await
        .unwrap();
    let body = json_body(response).await;
    let duplicates = body["events"].as_array().unwrap();
    assert_eq!(duplicates.len(), 1);
    assert_eq!(duplicates[0]["is_duplicate"], true);

    let response = app
        .oneshot(get("/api/events?limit=0"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn get_event_returns_full_audit_record() {
    let db = setup_db().await;
    let app = router::build(test_state(db.pool, None));

    let created = create_endpoint(&app, "Hook").await;
    let path_token = created["endpoint"]["path_token"].as_str().unwrap();

    let accepted = ingest(
        &app,
        path_token,
        &[
            ("content-type", "application/json"),
            ("x-event-type", "order.created"),
            ("x-request-id", "req-9"),
            ("x-forwarded-for", "203.0.113.9, 10.0.0.1"),
        ],
        br#"{"x":1}"#,
    )
    .await;
    let event_id = accepted["event_id"].as_str().unwrap();

    let response = app
        .clone()
        .oneshot(get(&format!("/api/events/{event_id}")))
        .await
        .unwrap();
    let event = json_body(response).await["event"].clone();

    assert_eq!(event["event_type"], "order.created");
    assert_eq!(event["raw_body"], r#"{"x":1}"#);
    assert_eq!(event["request_id"], "req-9");
    assert_eq!(event["source_ip"], "203.0.113.9");
    assert_eq!(event["content_type"], "application/json");
    assert_eq!(event["status"], "processed");
    assert_eq!(event["is_duplicate"], false);
    assert_eq!(event["body_size"], 7);
    assert_eq!(event["raw_headers"]["x-event-type"], "order.created");
    assert!(event["processed_at"].is_string());

    let response = app
        .oneshot(get(&format!("/api/events/{}", uuid::Uuid::new_v4())))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn attempts_for_unknown_event_is_404() {
    let db = setup_db().await;
    let app = router::build(test_state(db.pool, None));

    let response = app
        .oneshot(get(&format!(
            "/api/events/{}/attempts",
            uuid::Uuid::new_v4()
        )))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
