//! Route table and request handlers
//!
//! All object-store routes live under `/svc/v1` behind the client auth
//! middleware. Handlers are thin: they parse the request surface, run the
//! engine call on the blocking pool, and wrap the outcome in the response
//! envelope (status, echoed request keys, operation fields).

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Extension, Path, Query, State};
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use revstore_core::ObjectStore;

use crate::auth::{self, ClientId};
use crate::error::ApiError;

/// Shared state for all handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<ObjectStore>,
    pub auth: Arc<HashMap<String, String>>,
}

impl AppState {
    pub fn new(store: ObjectStore, auth: HashMap<String, String>) -> Self {
        Self {
            store: Arc::new(store),
            auth: Arc::new(auth),
        }
    }

    /// Run an engine call on the blocking pool.
    async fn run<T, F>(&self, f: F) -> Result<T, ApiError>
    where
        F: FnOnce(&ObjectStore) -> revstore_core::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || f(&store))
            .await
            .map_err(ApiError::internal)?
            .map_err(ApiError::from)
    }
}

/// Build the full application router.
pub fn router(state: AppState) -> Router {
    let svc = Router::new()
        .route("/mappings", get(list_mappings))
        .route(
            "/tags/:namespace_id/:object_id",
            get(get_tags)
                .patch(add_tags)
                .put(replace_tags)
                .delete(remove_tags),
        )
        .route("/tags/get/:namespace_id/:object_id", get(get_tags))
        .route("/tags/add/:namespace_id/:object_id", post(add_tags))
        .route("/tags/remove/:namespace_id/:object_id", post(remove_tags))
        .route("/store/:namespace_id", post(store_to_namespace))
        .route("/retrieve/:namespace_id/:object_id", get(retrieve_object))
        .route(
            "/retrieve/:namespace_id/:object_id/:object_prop",
            get(retrieve_object_prop),
        )
        .route("/delete/:namespace_id/:object_id", delete(delete_object))
        .route("/query/:namespace_id", get(namespace_query))
        .route("/query/:namespace_id/:object_id", get(object_revisions))
        .route("/clear/:namespace_id", delete(clear_namespace))
        .route(
            "/:namespace_id",
            get(namespace_query)
                .post(store_to_namespace)
                .delete(clear_namespace),
        )
        .route(
            "/:namespace_id/:object_id",
            get(retrieve_object)
                .post(store_with_object_id)
                .delete(delete_object),
        )
        .route("/:namespace_id/:object_id/:object_prop", get(retrieve_object_prop))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_client_auth,
        ))
        .layer(CorsLayer::permissive());

    Router::new()
        .route("/status", get(status))
        .nest("/svc/v1", svc)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn status() -> &'static str {
    "Running!"
}

// ============================================
// Store
// ============================================

#[derive(Debug, Deserialize)]
struct StoreQuery {
    object_id: Option<String>,
    tags: Option<String>,
}

/// The body is a JSON document, or a JSON string that itself contains one.
fn parse_payload(body: &[u8]) -> Result<Value, ApiError> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| ApiError::bad_request(format!("invalid JSON document: {}", e)))?;
    match value {
        Value::String(s) => serde_json::from_str(&s)
            .map_err(|_| ApiError::bad_request(format!("Invalid JSON string: {}", s))),
        other => Ok(other),
    }
}

async fn store_to_namespace(
    State(state): State<AppState>,
    Extension(ClientId(client_id)): Extension<ClientId>,
    Path(namespace_id): Path<String>,
    Query(query): Query<StoreQuery>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    store_common(state, client_id, namespace_id, query.object_id, query.tags, &body).await
}

async fn store_with_object_id(
    State(state): State<AppState>,
    Extension(ClientId(client_id)): Extension<ClientId>,
    Path((namespace_id, object_id)): Path<(String, String)>,
    Query(query): Query<StoreQuery>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    store_common(state, client_id, namespace_id, Some(object_id), query.tags, &body).await
}

async fn store_common(
    state: AppState,
    client_id: String,
    namespace_id: String,
    object_id: Option<String>,
    tags: Option<String>,
    body: &[u8],
) -> Result<Json<Value>, ApiError> {
    let payload = parse_payload(body)?;

    let (c, n) = (client_id.clone(), namespace_id.clone());
    let outcome = state
        .run(move |store| store.store(&c, &n, object_id.as_deref(), tags.as_deref(), &payload))
        .await?;

    let message = if outcome.new_version {
        format!(
            "Document stored: {}/{} with new revision_id: {}",
            namespace_id, outcome.object_id, outcome.revision_id
        )
    } else {
        format!(
            "Document exists: {}/{} with revision_id: {}",
            namespace_id, outcome.object_id, outcome.revision_id
        )
    };

    Ok(Json(json!({
        "status": "OK",
        "message": message,
        "client_id": client_id,
        "namespace_id": namespace_id,
        "object_id": outcome.object_id,
        "revision_id": outcome.revision_id,
        "new_version": outcome.new_version,
        "tags": outcome.tags,
        "object_timestamp": outcome.object_timestamp,
    })))
}

// ============================================
// Retrieve
// ============================================

#[derive(Debug, Deserialize)]
struct RetrieveQuery {
    revision_id: Option<String>,
    tag: Option<String>,
}

async fn retrieve_object(
    State(state): State<AppState>,
    Extension(ClientId(client_id)): Extension<ClientId>,
    Path((namespace_id, object_id)): Path<(String, String)>,
    Query(query): Query<RetrieveQuery>,
) -> Result<Response, ApiError> {
    retrieve_common(state, client_id, namespace_id, object_id, query, None).await
}

async fn retrieve_object_prop(
    State(state): State<AppState>,
    Extension(ClientId(client_id)): Extension<ClientId>,
    Path((namespace_id, object_id, object_prop)): Path<(String, String, String)>,
    Query(query): Query<RetrieveQuery>,
) -> Result<Response, ApiError> {
    retrieve_common(state, client_id, namespace_id, object_id, query, Some(object_prop)).await
}

async fn retrieve_common(
    state: AppState,
    client_id: String,
    namespace_id: String,
    object_id: String,
    query: RetrieveQuery,
    object_prop: Option<String>,
) -> Result<Response, ApiError> {
    let include_revisions = object_prop.as_deref() == Some("revisions");

    let retrieved = state
        .run(move |store| {
            store.retrieve(
                &client_id,
                &namespace_id,
                &object_id,
                query.revision_id.as_deref(),
                query.tag.as_deref(),
                include_revisions,
            )
        })
        .await?;

    let mut envelope = serde_json::to_value(&retrieved).map_err(ApiError::internal)?;
    envelope["status"] = json!("OK");

    match object_prop {
        None => Ok(Json(envelope).into_response()),
        Some(prop) => match envelope.get(&prop) {
            Some(value) if value.is_object() || value.is_array() => {
                Ok(Json(value.clone()).into_response())
            }
            Some(Value::String(s)) => Ok(s.clone().into_response()),
            Some(value) => Ok(value.to_string().into_response()),
            None => Err(ApiError::bad_request(format!(
                "Property '{}' not valid",
                prop
            ))),
        },
    }
}

// ============================================
// Delete
// ============================================

#[derive(Debug, Deserialize)]
struct DeleteQuery {
    revision_id: Option<String>,
}

async fn delete_object(
    State(state): State<AppState>,
    Extension(ClientId(client_id)): Extension<ClientId>,
    Path((namespace_id, object_id)): Path<(String, String)>,
    Query(query): Query<DeleteQuery>,
) -> Result<Json<Value>, ApiError> {
    let revision_id = query.revision_id;

    let (c, n, o, r) = (
        client_id.clone(),
        namespace_id.clone(),
        object_id.clone(),
        revision_id.clone(),
    );
    state
        .run(move |store| store.delete(&c, &n, &o, r.as_deref()))
        .await?;

    let message = match &revision_id {
        Some(rev) => format!(
            "Object '{}/{}' deleted revision: {}",
            namespace_id, object_id, rev
        ),
        None => format!("Object '{}/{}' deleted", namespace_id, object_id),
    };

    Ok(Json(json!({
        "status": "OK",
        "message": message,
        "client_id": client_id,
        "namespace_id": namespace_id,
        "object_id": object_id,
        "revision_id": revision_id,
    })))
}

// ============================================
// Revisions
// ============================================

async fn object_revisions(
    State(state): State<AppState>,
    Extension(ClientId(client_id)): Extension<ClientId>,
    Path((namespace_id, object_id)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let (c, n, o) = (client_id.clone(), namespace_id.clone(), object_id.clone());
    let revisions = state
        .run(move |store| store.object_revisions(&c, &n, &o))
        .await?;

    Ok(Json(json!({
        "status": "OK",
        "client_id": client_id,
        "namespace_id": namespace_id,
        "object_id": object_id,
        "revisions": revisions,
    })))
}

// ============================================
// Tags
// ============================================

#[derive(Debug, Deserialize)]
struct TagsQuery {
    tags: Option<String>,
}

fn require_tags_param(tags: Option<String>) -> Result<String, ApiError> {
    tags.filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::bad_request("Missing required parameter: tags"))
}

async fn get_tags(
    State(state): State<AppState>,
    Extension(ClientId(client_id)): Extension<ClientId>,
    Path((namespace_id, object_id)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let (c, n, o) = (client_id.clone(), namespace_id.clone(), object_id.clone());
    let tags = state.run(move |store| store.get_tags(&c, &n, &o)).await?;

    Ok(Json(json!({
        "status": "OK",
        "client_id": client_id,
        "namespace_id": namespace_id,
        "object_id": object_id,
        "tags": tags,
    })))
}

async fn add_tags(
    State(state): State<AppState>,
    Extension(ClientId(client_id)): Extension<ClientId>,
    Path((namespace_id, object_id)): Path<(String, String)>,
    Query(query): Query<TagsQuery>,
) -> Result<Json<Value>, ApiError> {
    let raw_tags = require_tags_param(query.tags)?;

    let (c, n, o) = (client_id.clone(), namespace_id.clone(), object_id.clone());
    let tags = state
        .run(move |store| store.add_tags(&c, &n, &o, &raw_tags))
        .await?;

    Ok(Json(json!({
        "status": "OK",
        "message": format!("Tags added successfully: {:?}", tags),
        "client_id": client_id,
        "namespace_id": namespace_id,
        "object_id": object_id,
        "tags": tags,
    })))
}

async fn replace_tags(
    State(state): State<AppState>,
    Extension(ClientId(client_id)): Extension<ClientId>,
    Path((namespace_id, object_id)): Path<(String, String)>,
    Query(query): Query<TagsQuery>,
) -> Result<Json<Value>, ApiError> {
    let raw_tags = require_tags_param(query.tags)?;

    let (c, n, o) = (client_id.clone(), namespace_id.clone(), object_id.clone());
    let tags = state
        .run(move |store| store.replace_tags(&c, &n, &o, &raw_tags))
        .await?;

    Ok(Json(json!({
        "status": "OK",
        "message": format!("Tags replaced successfully: {:?}", tags),
        "client_id": client_id,
        "namespace_id": namespace_id,
        "object_id": object_id,
        "tags": tags,
    })))
}

async fn remove_tags(
    State(state): State<AppState>,
    Extension(ClientId(client_id)): Extension<ClientId>,
    Path((namespace_id, object_id)): Path<(String, String)>,
    Query(query): Query<TagsQuery>,
) -> Result<Json<Value>, ApiError> {
    let raw_tags = query.tags.filter(|t| !t.is_empty());

    let message = match &raw_tags {
        Some(tags) => format!("Tags removed successfully from {}: {}", object_id, tags),
        None => format!("All tags removed successfully from {}", object_id),
    };

    let (c, n, o) = (client_id.clone(), namespace_id.clone(), object_id.clone());
    let tags = state
        .run(move |store| store.remove_tags(&c, &n, &o, raw_tags.as_deref()))
        .await?;

    Ok(Json(json!({
        "status": "OK",
        "message": message,
        "client_id": client_id,
        "namespace_id": namespace_id,
        "object_id": object_id,
        "tags": tags,
    })))
}

// ============================================
// Namespace query and clear
// ============================================

#[derive(Debug, Deserialize)]
struct NamespaceQuery {
    tag: Option<String>,
}

async fn namespace_query(
    State(state): State<AppState>,
    Extension(ClientId(client_id)): Extension<ClientId>,
    Path(namespace_id): Path<String>,
    Query(query): Query<NamespaceQuery>,
) -> Result<Json<Value>, ApiError> {
    let (c, n) = (client_id.clone(), namespace_id.clone());
    let object_ids = state
        .run(move |store| store.namespace_query(&c, &n, query.tag.as_deref()))
        .await?;

    Ok(Json(json!({
        "status": "OK",
        "client_id": client_id,
        "namespace_id": namespace_id,
        "object_ids": object_ids,
    })))
}

#[derive(Debug, Deserialize)]
struct ClearQuery {
    tags: Option<String>,
    confirm: Option<String>,
}

fn parse_bool(value: Option<&str>) -> bool {
    matches!(
        value.map(str::to_ascii_lowercase).as_deref(),
        Some("true") | Some("1") | Some("yes")
    )
}

async fn clear_namespace(
    State(state): State<AppState>,
    Extension(ClientId(client_id)): Extension<ClientId>,
    Path(namespace_id): Path<String>,
    Query(query): Query<ClearQuery>,
) -> Result<Json<Value>, ApiError> {
    let confirm = parse_bool(query.confirm.as_deref());
    let tags = query.tags;

    let message = match &tags {
        Some(tags) if !tags.is_empty() => {
            format!("Namespace '{}' cleared for tags: {}", namespace_id, tags)
        }
        _ => format!("Namespace '{}' cleared for all tags", namespace_id),
    };

    let (c, n) = (client_id.clone(), namespace_id.clone());
    state
        .run(move |store| store.clear_namespace(&c, &n, tags.as_deref(), confirm))
        .await?;

    Ok(Json(json!({
        "status": "OK",
        "message": message,
        "client_id": client_id,
        "namespace_id": namespace_id,
    })))
}

// ============================================
// Mappings
// ============================================

#[derive(Debug, Deserialize)]
struct MappingsQuery {
    namespace_id: Option<String>,
}

async fn list_mappings(
    State(state): State<AppState>,
    Extension(ClientId(client_id)): Extension<ClientId>,
    Query(query): Query<MappingsQuery>,
) -> Result<Json<Value>, ApiError> {
    let mappings = state
        .run(move |store| store.list_mappings(query.namespace_id.as_deref()))
        .await?;

    let data: Vec<Value> = mappings
        .iter()
        .map(|m| {
            json!({
                "client_id": m.client_id,
                "namespace_id": m.namespace_id,
                "identifier_name": m.identifier_name,
                "timestamp": m.created_at,
            })
        })
        .collect();

    Ok(Json(json!({
        "status": "OK",
        "client_id": client_id,
        "data": data,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool(Some("true")));
        assert!(parse_bool(Some("True")));
        assert!(parse_bool(Some("1")));
        assert!(parse_bool(Some("yes")));

        assert!(!parse_bool(Some("false")));
        assert!(!parse_bool(Some("0")));
        assert!(!parse_bool(None));
    }

    #[test]
    fn test_parse_payload_accepts_document_and_string() {
        let doc = parse_payload(br#"{"a": 1}"#).unwrap();
        assert_eq!(doc, json!({"a": 1}));

        // A JSON string containing a document is unwrapped.
        let wrapped = parse_payload(br#""{\"a\": 1}""#).unwrap();
        assert_eq!(wrapped, json!({"a": 1}));

        assert!(parse_payload(b"not json").is_err());
        assert!(parse_payload(br#""not a document""#).is_err());
    }
}
