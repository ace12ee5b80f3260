//! Inbound RPC Listener
//!
//! The `/invoke` endpoint: decode the envelope, resolve and verify the
//! sender's identity, check the signature over the exact payload bytes,
//! and only then dispatch to the application handler. 400 on malformed
//! input, 403 on any authentication failure, 500 on handler errors.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, warn};

use crate::identity::signing;
use crate::registry::RecordRegistry;
use crate::types::{MessageHandler, Payload, SignedEnvelope};

struct ListenerState {
    records: RecordRegistry,
    handler: Arc<dyn MessageHandler>,
}

/// Build the agent's listener router around `handler`. Sender records are
/// resolved through `records`, which carries the identity verification.
pub fn router(records: RecordRegistry, handler: Arc<dyn MessageHandler>) -> Router {
    let state = Arc::new(ListenerState { records, handler });
    Router::new()
        .route("/invoke", post(handle_invoke))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn handle_invoke(
    State(state): State<Arc<ListenerState>>,
    Json(envelope): Json<SignedEnvelope>,
) -> Response {
    let payload_bytes = match BASE64.decode(&envelope.payload) {
        Ok(bytes) => bytes,
        Err(_) => return reject(StatusCode::BAD_REQUEST, "invalid payload encoding"),
    };
    let signature = match BASE64.decode(&envelope.signature) {
        Ok(bytes) => bytes,
        Err(_) => return reject(StatusCode::BAD_REQUEST, "invalid signature encoding"),
    };
    let payload: Payload = match serde_json::from_slice(&payload_bytes) {
        Ok(payload) => payload,
        Err(_) => return reject(StatusCode::BAD_REQUEST, "invalid message format"),
    };

    // The fetch verifies the DID binding; an unresolvable or tampered
    // sender record means the sender cannot be authenticated.
    let sender = match state.records.fetch(&payload.sender_did).await {
        Some(record) => record,
        None => {
            warn!("Could not resolve or verify sender {}", payload.sender_did);
            return reject(StatusCode::FORBIDDEN, "could not authenticate sender");
        }
    };

    if !signing::verify(&sender.public_key_pem, &payload_bytes, &signature) {
        warn!("Security: invalid signature from {}", payload.sender_did);
        return reject(StatusCode::FORBIDDEN, "invalid signature");
    }

    debug!("Received valid message from {}", payload.sender_did);
    match state.handler.handle(&payload.sender_did, payload.body).await {
        Ok(value) => (StatusCode::OK, Json(value)).into_response(),
        Err(e) => {
            error!("Handler failed for {}: {:#}", payload.sender_did, e);
            reject(StatusCode::INTERNAL_SERVER_ERROR, "handler error")
        }
    }
}

fn reject(status: StatusCode, detail: &str) -> Response {
    (status, Json(json!({"error": detail}))).into_response()
}
