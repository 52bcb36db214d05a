/// HTTP surface of the webhook pipeline.
///
/// `POST /_webhooks/<plugin>/<path...>` validates the delivery and enqueues
/// it; the 202 goes out before any handler runs. Handler failures are an
/// observability concern, never an HTTP one.
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde_json::{json, Value as JsonValue};
use tracing::debug;

use super::AppState;
use crate::webhooks::{WebhookRequest, WebhookWorkItem};

/// `POST /_webhooks/:plugin/*path` handler.
pub async fn webhook_handler(
    State(state): State<AppState>,
    Path((plugin, path)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<JsonValue>) {
    let Some(registration) = state.runtime.webhooks().lookup(&plugin, &path) else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "Webhook not registered" })),
        );
    };

    let parsed_body: JsonValue = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(_) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "Invalid JSON body" })),
            );
        }
    };

    let request = WebhookRequest {
        method: "POST".into(),
        path: format!("/_webhooks/{plugin}/{path}"),
        headers: headers
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_ascii_lowercase(),
                    value.to_str().unwrap_or_default().to_string(),
                )
            })
            .collect(),
    };

    if let Some(verify) = &registration.verify_signature {
        if !verify(&request, &body) {
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "Invalid signature" })),
            );
        }
    }

    debug!(plugin = %plugin, path = %path, "webhook queued");
    state.runtime.webhook_queue().enqueue(WebhookWorkItem {
        plugin_name: plugin,
        path,
        request,
        raw_body: body.to_vec(),
        parsed_body,
    });

    (StatusCode::ACCEPTED, Json(json!({ "queued": true })))
}
