//! Endpoint handlers for `/proxy/v1`.
//!
//! # Request Flow
//! ```text
//! bearer token → authenticate (401)
//!     → JSON object body (400)
//!     → model + endpoint permission (403)
//!     → Dispatcher forward / open_stream
//! ```

use std::collections::BTreeSet;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use serde_json::{json, Value};

use crate::auth::unix_now;
use crate::dispatch::{CallOptions, ChannelSink};
use crate::error::ProxyError;
use crate::http::request::{bearer_token, call_options, parse_json_object, validation_context, MISSING_AUTH};
use crate::http::response;
use crate::http::server::AppState;

/// Frames buffered between the relay task and the response body.
const SSE_CHANNEL_CAPACITY: usize = 32;

/// Validate the caller and return their token.
async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<String, ProxyError> {
    let token = bearer_token(headers).ok_or_else(|| ProxyError::AuthFailure(MISSING_AUTH.to_string()))?;

    let result = state.authenticator.validate(&token, &validation_context(headers)).await;
    if !result.valid {
        return Err(ProxyError::AuthFailure(
            result.error.unwrap_or_else(|| "Invalid token".to_string()),
        ));
    }
    Ok(token)
}

async fn proxy_endpoint(
    state: &AppState,
    headers: &HeaderMap,
    body: &Bytes,
    endpoint: &str,
    streamable: bool,
) -> Result<Response, ProxyError> {
    let token = authenticate(state, headers).await?;
    let payload = parse_json_object(body)?;
    let model = state.dispatcher.model_of(&payload);

    if !state.authenticator.can_use_model(&token, &model).await {
        return Err(ProxyError::PermissionDenied("Model not allowed".to_string()));
    }
    if !state.authenticator.can_access_endpoint(&token, endpoint).await {
        return Err(ProxyError::PermissionDenied("Endpoint not allowed".to_string()));
    }

    let options = call_options(headers);
    let stream = streamable && payload.get("stream").and_then(Value::as_bool).unwrap_or(false);
    if stream {
        return Ok(stream_response(state, endpoint, &payload, options).await);
    }

    let upstream = state.dispatcher.forward(endpoint, &payload, options).await?;
    Ok(response::upstream(upstream))
}

async fn stream_response(state: &AppState, endpoint: &str, payload: &Value, options: CallOptions) -> Response {
    let relay = match state.dispatcher.open_stream(endpoint, payload, options).await {
        Ok(relay) => relay,
        Err(err) => return response::sse_error(&err),
    };

    let (mut sink, body) = ChannelSink::pair(SSE_CHANNEL_CAPACITY);
    tokio::spawn(async move {
        relay.run(&mut sink).await;
    });
    response::sse_stream(body)
}

/// `POST /proxy/v1/chat/completions`
pub async fn chat_completions(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    proxy_endpoint(&state, &headers, &body, "/chat/completions", true)
        .await
        .unwrap_or_else(IntoResponse::into_response)
}

/// `POST /proxy/v1/completions`
pub async fn completions(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    proxy_endpoint(&state, &headers, &body, "/completions", false)
        .await
        .unwrap_or_else(IntoResponse::into_response)
}

/// `POST /proxy/v1/embeddings`
pub async fn embeddings(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    proxy_endpoint(&state, &headers, &body, "/embeddings", false)
        .await
        .unwrap_or_else(IntoResponse::into_response)
}

/// `GET /proxy/v1/models`: distinct models of healthy backends.
pub async fn models(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<Value>, ProxyError> {
    authenticate(&state, &headers).await?;

    let status = state.dispatcher.pool_status().await;
    let models: BTreeSet<&str> = status
        .backends
        .iter()
        .filter(|b| b.is_healthy)
        .flat_map(|b| b.models.iter().map(|m| m.trim()))
        .filter(|m| !m.is_empty())
        .collect();

    let created = unix_now();
    let data: Vec<Value> = models
        .into_iter()
        .map(|id| json!({ "id": id, "object": "model", "created": created, "owned_by": "proxy" }))
        .collect();

    Ok(Json(json!({ "object": "list", "data": data })))
}

/// `GET /proxy/v1/status`: pool overview and usage metrics.
pub async fn status(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<Value>, ProxyError> {
    authenticate(&state, &headers).await?;

    let pool_status = state.dispatcher.pool_status().await;
    Ok(Json(json!({
        "pool_status": pool_status,
        "metrics": state.dispatcher.usage_summary(),
    })))
}
