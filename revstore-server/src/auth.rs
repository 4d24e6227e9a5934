//! Client authentication middleware
//!
//! Requests carry an (id, token) pair either as `x-client-id` /
//! `x-client-token` headers or as `client_id` / `client_token` query
//! parameters (query wins). The pair is checked against the map loaded at
//! startup; on success the validated [`ClientId`] is attached to the request
//! for handlers to extract.

use axum::extract::{Query, Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::routes::AppState;

/// The authenticated client id, attached as a request extension.
#[derive(Debug, Clone)]
pub struct ClientId(pub String);

#[derive(Debug, Deserialize, Default)]
struct AuthParams {
    client_id: Option<String>,
    client_token: Option<String>,
}

fn header_value(request: &Request, name: &str) -> Option<String> {
    request
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(String::from)
}

/// Reject the request unless it carries a known (client_id, token) pair.
pub async fn require_client_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let params = Query::<AuthParams>::try_from_uri(request.uri())
        .map(|q| q.0)
        .unwrap_or_default();

    let client_id = params
        .client_id
        .or_else(|| header_value(&request, "x-client-id"));
    let client_token = params
        .client_token
        .or_else(|| header_value(&request, "x-client-token"));

    let client_id = match (client_id, client_token) {
        (Some(id), Some(token)) if state.auth.get(&id) == Some(&token) => id,
        (id, _) => {
            tracing::debug!(
                uri = %request.uri(),
                client_id = id.as_deref().unwrap_or("<missing>"),
                "Client not authenticated"
            );
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({
                    "status": "ERROR",
                    "message": "Client not authenticated",
                })),
            )
                .into_response();
        }
    };

    request.extensions_mut().insert(ClientId(client_id));

    next.run(request).await
}
