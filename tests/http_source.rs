use std::collections::HashMap;

use axum::extract::Query;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::get;
use axum::{Json, Router};
use invguard::entity::Entity;
use invguard::error::InvguardError;
use invguard::session::{Credentials, Session};
use invguard::source::{HttpSource, RecordSource};
use serde_json::{json, Value};

const TOKEN: &str = "t0k3n";

async fn items(headers: HeaderMap) -> Result<Json<Value>, StatusCode> {
    let expected = format!("Bearer {TOKEN}");
    match headers.get("authorization").and_then(|v| v.to_str().ok()) {
        Some(auth) if auth == expected => Ok(Json(json!([
            {"id": 1, "sku": "W-1", "name": "Widget", "quantity": 3},
            {"id": 2, "sku": "G-2", "name": "Gadget", "quantity": 9},
        ]))),
        _ => Err(StatusCode::UNAUTHORIZED),
    }
}

/// Echoes the requested page size back as a record.
async fn transactions(Query(params): Query<HashMap<String, String>>) -> Json<Value> {
    let limit = params.get("limit").and_then(|l| l.parse::<i64>().ok());
    Json(json!([{"id": 1, "limit": limit}]))
}

async fn audit() -> StatusCode {
    StatusCode::INTERNAL_SERVER_ERROR
}

/// Stands up a stand-in InvGuard API on an ephemeral port and returns its `/api` base URL.
async fn spawn_api() -> String {
    let api = Router::new()
        .route("/items", get(items))
        .route("/transactions", get(transactions))
        .route("/audit", get(audit));
    let app = Router::new().nest("/api", api);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{address}/api")
}

fn signed_in(token: &str) -> Session {
    Session::new(Credentials { token: Some(token.into()), user: None })
}

#[tokio::test]
async fn items_are_fetched_with_the_bearer_token() {
    let base = spawn_api().await;
    let source = HttpSource::new(&format!("{base}/"), signed_in(TOKEN), 50);
    let records = source.fetch(Entity::Items).await.unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[1].text("name").as_deref(), Some("Gadget"));
}

#[tokio::test]
async fn transactions_ask_for_the_configured_window() {
    let base = spawn_api().await;
    let source = HttpSource::new(&base, signed_in(TOKEN), 25);
    let records = source.fetch(Entity::Transactions).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].number("limit"), 25.0);
}

#[tokio::test]
async fn server_errors_become_fetch_errors_with_status() {
    let base = spawn_api().await;
    let session = signed_in(TOKEN);
    let source = HttpSource::new(&base, session.clone(), 50);
    match source.fetch(Entity::AuditLog).await {
        Err(InvguardError::Fetch { status, message }) => {
            assert_eq!(status, Some(500));
            assert!(message.contains("/api/audit"), "got {message}");
        }
        other => panic!("expected a fetch error, got {other:?}"),
    }
    assert!(session.is_authenticated(), "only a 401 clears the session");
}

#[tokio::test]
async fn rejected_token_clears_the_session_and_its_file() {
    let base = spawn_api().await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");
    let session = Session::load(&path).unwrap();
    session.store(Credentials { token: Some("expired".into()), user: None }).unwrap();
    assert!(path.exists());

    let source = HttpSource::new(&base, session.clone(), 50);
    assert!(matches!(source.fetch(Entity::Items).await, Err(InvguardError::Unauthorized)));
    assert!(!session.is_authenticated());
    assert!(!path.exists(), "the stored session must be removed");

    // without a token the next request goes out anonymous and is rejected again
    assert!(matches!(source.fetch(Entity::Items).await, Err(InvguardError::Unauthorized)));
}
