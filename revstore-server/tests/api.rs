//! HTTP API tests
//!
//! Drives the axum router directly (no socket) against a temporary database,
//! covering the end-to-end store/retrieve/tag/delete/clear/mappings flows
//! and the error statuses.

use std::collections::HashMap;

use axum::body::Body;
use axum::Router;
use http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use revstore_core::config::DatabaseConfig;
use revstore_core::{Database, ObjectStore};
use revstore_server::{router, AppState};

const CLIENT: &str = "client-a";
const TOKEN: &str = "token-a";

fn test_app() -> (TempDir, Router) {
    let dir = TempDir::new().unwrap();
    let config = DatabaseConfig {
        path: dir.path().join("revstore.db"),
        busy_timeout_ms: 1000,
    };
    let db = Database::open(&config).unwrap();
    let store = ObjectStore::new(db);

    let auth = HashMap::from([(CLIENT.to_string(), TOKEN.to_string())]);
    (dir, router(AppState::new(store, auth)))
}

/// Send an authenticated request; returns (status, parsed body).
///
/// Non-JSON bodies come back as `Value::String`.
async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-client-id", CLIENT)
        .header("x-client-token", TOKEN);

    let request = match body {
        Some(value) => builder
            .header("content-type", "application/json")
            .body(Body::from(value.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = serde_json::from_slice(&bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
    (status, value)
}

fn as_string_set(value: &Value) -> Vec<String> {
    let mut items: Vec<String> = value
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect();
    items.sort();
    items
}

// ============================================
// Store, dedup, retrieve
// ============================================

#[tokio::test]
async fn test_store_dedup_and_revisions() {
    let (_dir, app) = test_app();

    // First store mints an object and a revision.
    let (status, first) = send(&app, "POST", "/svc/v1/store/n1", Some(json!({"a": 1}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["status"], "OK");
    assert_eq!(first["new_version"], json!(true));
    let object_id = first["object_id"].as_str().unwrap().to_string();
    let r1 = first["revision_id"].as_str().unwrap().to_string();

    // Same payload again: same revision, no new version.
    let (status, dedup) = send(
        &app,
        "POST",
        &format!("/svc/v1/n1/{}", object_id),
        Some(json!({"a": 1})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(dedup["revision_id"].as_str().unwrap(), r1);
    assert_eq!(dedup["new_version"], json!(false));

    // Changed payload: new revision.
    let (status, second) = send(
        &app,
        "POST",
        &format!("/svc/v1/n1/{}", object_id),
        Some(json!({"a": 2})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["new_version"], json!(true));
    let r2 = second["revision_id"].as_str().unwrap().to_string();
    assert_ne!(r1, r2);

    // Head is the latest payload.
    let (status, head) = send(&app, "GET", &format!("/svc/v1/n1/{}", object_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(head["object"], json!({"a": 2}));
    assert_eq!(head["revision_id"].as_str().unwrap(), r2);

    // The first revision stays addressable.
    let (status, old) = send(
        &app,
        "GET",
        &format!("/svc/v1/n1/{}?revision_id={}", object_id, r1),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(old["object"], json!({"a": 1}));

    // Revision history, newest first.
    let (status, listed) = send(
        &app,
        "GET",
        &format!("/svc/v1/query/n1/{}", object_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let revisions = listed["revisions"].as_array().unwrap();
    assert_eq!(revisions.len(), 2);
    assert_eq!(revisions[0]["revision_id"].as_str().unwrap(), r2);
}

#[tokio::test]
async fn test_store_accepts_json_string_body() {
    let (_dir, app) = test_app();

    let (status, stored) = send(
        &app,
        "POST",
        "/svc/v1/store/n1",
        Some(json!(r#"{"wrapped": true}"#)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let object_id = stored["object_id"].as_str().unwrap();
    let (_, head) = send(&app, "GET", &format!("/svc/v1/n1/{}", object_id), None).await;
    assert_eq!(head["object"], json!({"wrapped": true}));
}

#[tokio::test]
async fn test_store_rejects_bad_json_string() {
    let (_dir, app) = test_app();

    let (status, body) = send(
        &app,
        "POST",
        "/svc/v1/store/n1",
        Some(json!("not a document")),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "ERROR");
}

#[tokio::test]
async fn test_retrieve_missing_is_404() {
    let (_dir, app) = test_app();

    // Provision the namespace first so the miss is on the object.
    send(&app, "POST", "/svc/v1/store/n1", Some(json!({"a": 1}))).await;

    let (status, body) = send(&app, "GET", "/svc/v1/n1/no-such-object", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], "ERROR");
    assert!(body["message"].as_str().unwrap().contains("no-such-object"));
}

#[tokio::test]
async fn test_retrieve_unknown_revision_is_404() {
    let (_dir, app) = test_app();

    let (_, stored) = send(&app, "POST", "/svc/v1/store/n1", Some(json!({"a": 1}))).await;
    let object_id = stored["object_id"].as_str().unwrap();

    let (status, _) = send(
        &app,
        "GET",
        &format!("/svc/v1/n1/{}?revision_id=bogus", object_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ============================================
// Retrieve props
// ============================================

#[tokio::test]
async fn test_retrieve_props() {
    let (_dir, app) = test_app();

    let (_, stored) = send(&app, "POST", "/svc/v1/store/n1", Some(json!({"a": 1}))).await;
    let object_id = stored["object_id"].as_str().unwrap().to_string();
    send(
        &app,
        "POST",
        &format!("/svc/v1/n1/{}", object_id),
        Some(json!({"a": 2})),
    )
    .await;

    // "revisions" yields the bare history array.
    let (status, revisions) = send(
        &app,
        "GET",
        &format!("/svc/v1/n1/{}/revisions", object_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(revisions.as_array().unwrap().len(), 2);

    // A scalar prop comes back as plain text.
    let (status, revision_id) = send(
        &app,
        "GET",
        &format!("/svc/v1/n1/{}/revision_id", object_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(revision_id.as_str().unwrap().len() > 10);

    // The document itself is a valid prop.
    let (status, object) = send(
        &app,
        "GET",
        &format!("/svc/v1/retrieve/n1/{}/object", object_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(object, json!({"a": 2}));

    // Unknown props are a client error.
    let (status, body) = send(
        &app,
        "GET",
        &format!("/svc/v1/n1/{}/bogus", object_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("bogus"));
}

// ============================================
// Tags
// ============================================

#[tokio::test]
async fn test_tag_lifecycle() {
    let (_dir, app) = test_app();

    let (_, stored) = send(
        &app,
        "POST",
        "/svc/v1/store/n1?tags=alpha,beta",
        Some(json!({"k": true})),
    )
    .await;
    let object_id = stored["object_id"].as_str().unwrap().to_string();

    let (status, tags) = send(&app, "GET", &format!("/svc/v1/tags/n1/{}", object_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(as_string_set(&tags["tags"]), vec!["alpha", "beta"]);

    // Tag-filtered namespace query finds the object.
    let (status, queried) = send(&app, "GET", "/svc/v1/n1?tag=alpha", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(as_string_set(&queried["object_ids"]).contains(&object_id));

    // PATCH adds.
    let (status, patched) = send(
        &app,
        "PATCH",
        &format!("/svc/v1/tags/n1/{}?tags=gamma", object_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        as_string_set(&patched["tags"]),
        vec!["alpha", "beta", "gamma"]
    );

    // PUT replaces.
    let (status, replaced) = send(
        &app,
        "PUT",
        &format!("/svc/v1/tags/n1/{}?tags=delta", object_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(as_string_set(&replaced["tags"]), vec!["delta"]);

    // The retrieve envelope reflects the replacement on every revision.
    let (_, head) = send(&app, "GET", &format!("/svc/v1/n1/{}", object_id), None).await;
    assert_eq!(head["object_tags"], json!(["delta"]));

    // DELETE with names removes those, without removes all.
    let (status, removed) = send(
        &app,
        "DELETE",
        &format!("/svc/v1/tags/n1/{}?tags=delta", object_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(removed["tags"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_tags_accept_json_list_param() {
    let (_dir, app) = test_app();

    let (_, stored) = send(&app, "POST", "/svc/v1/store/n1", Some(json!({"k": 1}))).await;
    let object_id = stored["object_id"].as_str().unwrap();

    let (status, added) = send(
        &app,
        "POST",
        &format!(
            "/svc/v1/tags/add/n1/{}?tags=%5B%22alpha%22,%22beta%22%5D",
            object_id
        ),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(as_string_set(&added["tags"]), vec!["alpha", "beta"]);
}

#[tokio::test]
async fn test_invalid_tag_is_400() {
    let (_dir, app) = test_app();

    let (status, body) = send(
        &app,
        "POST",
        "/svc/v1/store/n1?tags=bad%20tag",
        Some(json!({"k": 1})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "ERROR");
}

#[tokio::test]
async fn test_tag_ops_on_missing_object_are_404() {
    let (_dir, app) = test_app();

    send(&app, "POST", "/svc/v1/store/n1", Some(json!({"k": 1}))).await;

    let (status, _) = send(&app, "GET", "/svc/v1/tags/n1/missing", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, "PATCH", "/svc/v1/tags/n1/missing?tags=x", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ============================================
// Delete and clear
// ============================================

#[tokio::test]
async fn test_delete_object_and_tags() {
    let (_dir, app) = test_app();

    let (_, stored) = send(
        &app,
        "POST",
        "/svc/v1/store/n1?tags=alpha",
        Some(json!({"k": 1})),
    )
    .await;
    let object_id = stored["object_id"].as_str().unwrap().to_string();

    let (status, deleted) = send(&app, "DELETE", &format!("/svc/v1/n1/{}", object_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(deleted["message"].as_str().unwrap().contains("deleted"));

    let (status, _) = send(&app, "GET", &format!("/svc/v1/n1/{}", object_id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Tag bindings are purged with the last revision.
    let (status, _) = send(&app, "GET", &format!("/svc/v1/tags/n1/{}", object_id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_single_revision() {
    let (_dir, app) = test_app();

    let (_, first) = send(&app, "POST", "/svc/v1/store/n1", Some(json!({"v": 1}))).await;
    let object_id = first["object_id"].as_str().unwrap().to_string();
    let r1 = first["revision_id"].as_str().unwrap().to_string();
    let (_, second) = send(
        &app,
        "POST",
        &format!("/svc/v1/n1/{}", object_id),
        Some(json!({"v": 2})),
    )
    .await;
    let r2 = second["revision_id"].as_str().unwrap().to_string();

    let (status, _) = send(
        &app,
        "DELETE",
        &format!("/svc/v1/delete/n1/{}?revision_id={}", object_id, r1),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, head) = send(&app, "GET", &format!("/svc/v1/n1/{}", object_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(head["revision_id"].as_str().unwrap(), r2);
}

#[tokio::test]
async fn test_clear_requires_confirm() {
    let (_dir, app) = test_app();

    let (_, stored) = send(&app, "POST", "/svc/v1/store/n1", Some(json!({"k": 1}))).await;
    let object_id = stored["object_id"].as_str().unwrap().to_string();

    let (status, body) = send(&app, "DELETE", "/svc/v1/n1", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("confirm"));

    // Nothing was deleted.
    let (status, _) = send(&app, "GET", &format!("/svc/v1/n1/{}", object_id), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_clear_namespace_by_tag() {
    let (_dir, app) = test_app();

    let (_, hit) = send(
        &app,
        "POST",
        "/svc/v1/store/n1?tags=alpha",
        Some(json!({"n": 1})),
    )
    .await;
    let (_, miss) = send(
        &app,
        "POST",
        "/svc/v1/store/n1?tags=beta",
        Some(json!({"n": 2})),
    )
    .await;
    let hit_id = hit["object_id"].as_str().unwrap().to_string();
    let miss_id = miss["object_id"].as_str().unwrap().to_string();

    let (status, cleared) = send(
        &app,
        "DELETE",
        "/svc/v1/clear/n1?confirm=true&tags=alpha",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(cleared["message"].as_str().unwrap().contains("alpha"));

    let (_, remaining) = send(&app, "GET", "/svc/v1/n1", None).await;
    let ids = as_string_set(&remaining["object_ids"]);
    assert!(!ids.contains(&hit_id));
    assert!(ids.contains(&miss_id));
}

#[tokio::test]
async fn test_clear_namespace_all() {
    let (_dir, app) = test_app();

    send(&app, "POST", "/svc/v1/store/n1", Some(json!({"n": 1}))).await;
    send(&app, "POST", "/svc/v1/store/n1", Some(json!({"n": 2}))).await;

    let (status, _) = send(&app, "DELETE", "/svc/v1/n1?confirm=true", None).await;
    assert_eq!(status, StatusCode::OK);

    let (_, remaining) = send(&app, "GET", "/svc/v1/n1", None).await;
    assert!(remaining["object_ids"].as_array().unwrap().is_empty());
}

// ============================================
// Mappings
// ============================================

#[tokio::test]
async fn test_list_mappings() {
    let (_dir, app) = test_app();

    let (status, body) = send(&app, "GET", "/svc/v1/mappings", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], "ERROR");

    send(&app, "POST", "/svc/v1/store/n2", Some(json!({"k": 1}))).await;
    send(&app, "POST", "/svc/v1/store/n1", Some(json!({"k": 1}))).await;

    let (status, body) = send(&app, "GET", "/svc/v1/mappings", None).await;
    assert_eq!(status, StatusCode::OK);
    let data = body["data"].as_array().unwrap();
    assert_eq!(data.len(), 2);
    // Ordered by (client_id, namespace_id).
    assert_eq!(data[0]["namespace_id"], "n1");
    assert_eq!(data[1]["namespace_id"], "n2");
    assert!(data[0]["identifier_name"].as_str().unwrap().len() == 6);

    let (status, body) = send(&app, "GET", "/svc/v1/mappings?namespace_id=n2", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

// ============================================
// Authentication and status
// ============================================

#[tokio::test]
async fn test_missing_or_bad_credentials_are_401() {
    let (_dir, app) = test_app();

    let request = Request::builder()
        .method("GET")
        .uri("/svc/v1/n1")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let request = Request::builder()
        .method("GET")
        .uri("/svc/v1/n1")
        .header("x-client-id", CLIENT)
        .header("x-client-token", "wrong")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_query_parameter_credentials() {
    let (_dir, app) = test_app();

    let request = Request::builder()
        .method("GET")
        .uri(format!(
            "/svc/v1/n1?client_id={}&client_token={}",
            CLIENT, TOKEN
        ))
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_status_needs_no_auth() {
    let (_dir, app) = test_app();

    let request = Request::builder()
        .method("GET")
        .uri("/status")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"Running!");
}
